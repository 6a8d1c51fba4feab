//! Two-phase decoding of partition customizations
//!
//! 1. Sniff the `type` discriminant (default `plain`).
//! 2. Decode the rest of the object strictly against the fields owned by that
//!    variant. `type` and `minsize` are stripped first; `minsize` goes through
//!    the size parser once the body has been accepted.
//!
//! Logical volumes carry their own `minsize` and are decoded the same way.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use super::{
    BtrfsSubvolumeCustomization, BtrfsVolumeCustomization, DiskCustomization,
    EncryptionCustomization, FilesystemTypedCustomization, LVCustomization,
    PartitionCustomization, PartitionPayload, PartitionType, VGCustomization,
};
use crate::filesystem::FilesystemType;
use crate::size::{InvalidSize, parse_size};

const DISK_FIELDS: &[&str] = &["minsize", "encryption", "partitions"];
const PLAIN_FIELDS: &[&str] = &["mountpoint", "label", "fs_type"];
const LVM_FIELDS: &[&str] = &["name", "logical_volumes"];
const BTRFS_FIELDS: &[&str] = &["subvolumes"];
const LV_FIELDS: &[&str] = &["name", "mountpoint", "label", "fs_type"];

/// Error raised while decoding a customization document
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid document: {0}")]
    Syntax(String),

    #[error("{0} is not an object")]
    NotAnObject(&'static str),

    #[error("partition type must be a string, got {0}")]
    InvalidType(String),

    #[error("unknown partition type: {0}")]
    UnknownPartitionType(String),

    #[error("unknown field \"{field}\" in {context}")]
    UnknownField { context: String, field: String },

    #[error("unknown filesystem type \"{fs_type}\" in {context}")]
    UnknownFilesystemType { context: String, fs_type: String },

    #[error("error decoding minsize for {context}: {source}")]
    InvalidMinSize {
        context: String,
        #[source]
        source: InvalidSize,
    },

    #[error("error decoding {context}: {reason}")]
    Malformed { context: String, reason: String },
}

fn as_object<'a>(
    value: &'a Value,
    what: &'static str,
) -> Result<&'a Map<String, Value>, DecodeError> {
    value.as_object().ok_or(DecodeError::NotAnObject(what))
}

/// Reject any key outside `allowed` and strictly decode the rest into `T`.
fn decode_body<T: DeserializeOwned>(
    object: &Map<String, Value>,
    allowed: &[&str],
    context: &str,
) -> Result<T, DecodeError> {
    let mut body = Map::new();
    for (key, value) in object {
        if key == "type" || key == "minsize" {
            continue;
        }
        if !allowed.contains(&key.as_str()) {
            return Err(DecodeError::UnknownField {
                context: context.to_string(),
                field: key.clone(),
            });
        }
        body.insert(key.clone(), value.clone());
    }

    serde_json::from_value(Value::Object(body)).map_err(|e| DecodeError::Malformed {
        context: context.to_string(),
        reason: e.to_string(),
    })
}

fn decode_min_size(object: &Map<String, Value>, context: &str) -> Result<u64, DecodeError> {
    match object.get("minsize") {
        None | Some(Value::Null) => Ok(0),
        Some(value) => parse_size(value).map_err(|source| DecodeError::InvalidMinSize {
            context: context.to_string(),
            source,
        }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn parse_fs_type(
    fs_type: Option<String>,
    context: &str,
) -> Result<Option<FilesystemType>, DecodeError> {
    match non_empty(fs_type) {
        None => Ok(None),
        Some(name) => name
            .parse()
            .map(Some)
            .map_err(|_| DecodeError::UnknownFilesystemType {
                context: context.to_string(),
                fs_type: name,
            }),
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FilesystemBody {
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    fs_type: Option<String>,
}

impl FilesystemBody {
    fn into_customization(
        self,
        context: &str,
    ) -> Result<FilesystemTypedCustomization, DecodeError> {
        Ok(FilesystemTypedCustomization {
            mountpoint: non_empty(self.mountpoint),
            label: non_empty(self.label),
            fs_type: parse_fs_type(self.fs_type, context)?,
        })
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LvmBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    logical_volumes: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LvBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    fs_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BtrfsBody {
    #[serde(default)]
    subvolumes: Vec<Value>,
}

/// Decode one logical volume of an `lvm` partition
pub fn decode_logical_volume(value: &Value) -> Result<LVCustomization, DecodeError> {
    const CONTEXT: &str = "logical volume";

    let object = as_object(value, CONTEXT)?;
    if object.contains_key("type") {
        return Err(DecodeError::UnknownField {
            context: CONTEXT.to_string(),
            field: "type".to_string(),
        });
    }

    let body: LvBody = decode_body(object, LV_FIELDS, CONTEXT)?;
    let fs = FilesystemBody {
        mountpoint: body.mountpoint,
        label: body.label,
        fs_type: body.fs_type,
    }
    .into_customization(CONTEXT)?;

    Ok(LVCustomization {
        name: non_empty(body.name),
        min_size: decode_min_size(object, CONTEXT)?,
        fs,
    })
}

fn decode_subvolume(value: &Value) -> Result<BtrfsSubvolumeCustomization, DecodeError> {
    const CONTEXT: &str = "btrfs subvolume";

    let object = as_object(value, CONTEXT)?;
    let allowed = ["name", "mountpoint"];
    if let Some(field) = object.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(DecodeError::UnknownField {
            context: CONTEXT.to_string(),
            field: field.clone(),
        });
    }

    serde_json::from_value(value.clone()).map_err(|e| DecodeError::Malformed {
        context: CONTEXT.to_string(),
        reason: e.to_string(),
    })
}

/// Decode one partition customization from a generic document value
pub fn decode_partition(value: &Value) -> Result<PartitionCustomization, DecodeError> {
    let object = as_object(value, "partition customization")?;

    let partition_type = match object.get("type") {
        None | Some(Value::Null) => PartitionType::Plain,
        Some(Value::String(name)) => PartitionType::parse(name)
            .ok_or_else(|| DecodeError::UnknownPartitionType(name.clone()))?,
        Some(other) => return Err(DecodeError::InvalidType(other.to_string())),
    };
    let context = format!("partition with type \"{partition_type}\"");

    let payload = match partition_type {
        PartitionType::Plain => {
            let body: FilesystemBody = decode_body(object, PLAIN_FIELDS, &context)?;
            PartitionPayload::Plain(body.into_customization(&context)?)
        }
        PartitionType::Lvm => {
            let body: LvmBody = decode_body(object, LVM_FIELDS, &context)?;
            let logical_volumes = body
                .logical_volumes
                .iter()
                .map(decode_logical_volume)
                .collect::<Result<Vec<_>, _>>()?;
            PartitionPayload::Lvm(VGCustomization {
                name: non_empty(body.name),
                logical_volumes,
            })
        }
        PartitionType::Btrfs => {
            let body: BtrfsBody = decode_body(object, BTRFS_FIELDS, &context)?;
            let subvolumes = body
                .subvolumes
                .iter()
                .map(decode_subvolume)
                .collect::<Result<Vec<_>, _>>()?;
            PartitionPayload::Btrfs(BtrfsVolumeCustomization { subvolumes })
        }
    };

    Ok(PartitionCustomization {
        min_size: decode_min_size(object, "partition")?,
        payload,
    })
}

/// Decode a whole disk customization
pub fn decode_disk(value: &Value) -> Result<DiskCustomization, DecodeError> {
    const CONTEXT: &str = "disk customization";

    let object = as_object(value, CONTEXT)?;
    if let Some(field) = object.keys().find(|k| !DISK_FIELDS.contains(&k.as_str())) {
        return Err(DecodeError::UnknownField {
            context: CONTEXT.to_string(),
            field: field.clone(),
        });
    }

    let encryption = match object.get("encryption") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            serde_json::from_value::<EncryptionCustomization>(value.clone()).map_err(|e| {
                DecodeError::Malformed {
                    context: "disk encryption".to_string(),
                    reason: e.to_string(),
                }
            })?,
        ),
    };

    let partitions = match object.get("partitions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(decode_partition)
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(DecodeError::Malformed {
                context: CONTEXT.to_string(),
                reason: format!("partitions must be a list, got {other}"),
            });
        }
    };

    Ok(DiskCustomization {
        min_size: decode_min_size(object, CONTEXT)?,
        encryption,
        partitions,
    })
}
