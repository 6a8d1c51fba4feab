// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use layout_cli::{Policy, config, logging, output};
use layout_types::{PartitionTable, builtin_template, builtin_template_names, bytes_to_pretty};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[command(name = "disk-layout")]
#[command(about = "Build OS image partition tables from layout customizations")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build a partition table and print it
    Build(BuildArgs),
    /// Build a partition table and print the features it uses
    Features(BuildArgs),
    /// List the built-in base templates
    Templates {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
struct BuildArgs {
    /// Build config file (.toml or .json)
    #[arg(long)]
    config: PathBuf,

    /// Disk customization file, overriding the one named in the config
    #[arg(long)]
    customizations: Option<PathBuf>,

    /// Seed for generated identifiers, overriding the config
    #[arg(long)]
    seed: Option<u64>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,

    /// How spare capacity is distributed
    #[arg(long, value_enum, default_value_t = Policy::Equal)]
    policy: Policy,
}

fn build(args: &BuildArgs) -> anyhow::Result<PartitionTable> {
    let config = config::load(&args.config)
        .with_context(|| format!("loading build config {}", args.config.display()))?;
    let base = config.base_table()?;
    let customizations = config.disk_customizations(args.customizations.as_deref())?;

    let seed = args
        .seed
        .or(config.seed)
        .unwrap_or_else(rand::random::<u64>);
    debug!(seed, "seeding identifier generator");
    let mut rng = StdRng::seed_from_u64(seed);

    let table = layout_engine::build_with_policy(
        &base,
        &config.filesystem,
        config.image_size,
        config.partitioning_mode,
        customizations.as_ref(),
        &mut rng,
        args.policy.growth_policy(),
    )
    .context("building partition table")?;

    info!(
        partitions = table.partitions.len(),
        size = %bytes_to_pretty(&table.size, false),
        "partition table ready"
    );
    Ok(table)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Command::Build(args) => {
            let table = build(&args)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&table)?);
            } else {
                print!("{}", output::TableView(&table));
            }
        }
        Command::Features(args) => {
            let features = build(&args)?.features();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&features)?);
            } else {
                println!("{}", output::render_features(&features));
            }
        }
        Command::Templates { json } => {
            let names = builtin_template_names();
            if json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else {
                for name in names {
                    let features = builtin_template(name)
                        .map(|table| output::render_features(&table.features()))
                        .unwrap_or_default();
                    println!("{name:<10} {features}");
                }
            }
        }
    }
    Ok(())
}
