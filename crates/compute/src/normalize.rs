//! Boundary normalization of task parameters into wire shapes.

use converge::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::api::{AttachedDisk, DiskMode, Metadata, MetadataEntry};

/// Convert a metadata literal (a JSON object string) into the key/value
/// pair list the API expects. Scalar values are coerced to strings; anything
/// that does not parse as a flat mapping is rejected before any remote call.
pub fn metadata_items(literal: &str) -> Result<Metadata> {
    let value: Value =
        serde_json::from_str(literal).map_err(|e| Error::Validation(format!("bad metadata: {e}")))?;
    let Value::Object(map) = value else {
        return Err(Error::Validation(
            "bad metadata: metadata must be a mapping".to_string(),
        ));
    };

    let mut items = Vec::with_capacity(map.len());
    for (key, value) in map {
        let value = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => {
                return Err(Error::Validation(format!(
                    "bad metadata: value for {key:?} must be a scalar"
                )));
            }
        };
        items.push(MetadataEntry { key, value });
    }
    Ok(Metadata { items })
}

/// One entry of the `disks` parameter after normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum DiskSpec {
    /// Pre-2.0 shape (a bare name, or a name/mode pair). The name is
    /// resolved against the remote system before the create call.
    Legacy {
        name: String,
        mode: DiskMode,
        boot: bool,
    },
    /// Current attached-disk shape, passed through as-is apart from
    /// partial-name expansion.
    Attached(AttachedDisk),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DiskParam {
    Name(String),
    Named(NamedDisk),
    Attached(Box<AttachedDisk>),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NamedDisk {
    name: String,
    mode: DiskMode,
}

/// Normalize the `disks` parameter. The first entry is implicitly the boot
/// disk; bare names default to `READ_WRITE` for it and `READ_ONLY` for the
/// rest.
pub fn convert_disk_params(entries: &[Value]) -> Result<Vec<DiskSpec>> {
    let mut specs = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let param: DiskParam = serde_json::from_value(entry.clone())
            .map_err(|_| Error::Validation("invalid value found in disks parameter".to_string()))?;
        let spec = match param {
            DiskParam::Name(name) => DiskSpec::Legacy {
                name,
                mode: if i == 0 {
                    DiskMode::ReadWrite
                } else {
                    DiskMode::ReadOnly
                },
                boot: i == 0,
            },
            DiskParam::Named(NamedDisk { name, mode }) => DiskSpec::Legacy {
                name,
                mode,
                boot: i == 0,
            },
            DiskParam::Attached(disk) => DiskSpec::Attached(*disk),
        };
        specs.push(spec);
    }
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn metadata_becomes_key_value_pairs() {
        let md = metadata_items(r#"{"db":"postgres","group":"qa"}"#).unwrap();
        assert_eq!(md.items.len(), 2);
        for (key, value) in [("db", "postgres"), ("group", "qa")] {
            assert!(
                md.items.iter().any(|e| e.key == key && e.value == value),
                "missing {key}={value}"
            );
        }
    }

    #[test]
    fn metadata_scalars_are_stringified() {
        let md = metadata_items(r#"{"id":500,"debug":true}"#).unwrap();
        assert!(md.items.iter().any(|e| e.key == "id" && e.value == "500"));
        assert!(md.items.iter().any(|e| e.key == "debug" && e.value == "true"));
    }

    #[test]
    fn metadata_must_parse_as_a_mapping() {
        assert!(matches!(metadata_items("not-a-dict"), Err(Error::Validation(_))));
        assert!(matches!(metadata_items(r#"["db"]"#), Err(Error::Validation(_))));
    }

    #[test]
    fn metadata_rejects_nested_values() {
        assert!(matches!(
            metadata_items(r#"{"db":{"host":"pg"}}"#),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn bare_names_make_the_first_disk_the_boot_disk() {
        let specs = convert_disk_params(&[json!("disk1"), json!("disk2")]).unwrap();
        assert_eq!(
            specs,
            vec![
                DiskSpec::Legacy {
                    name: "disk1".to_string(),
                    mode: DiskMode::ReadWrite,
                    boot: true,
                },
                DiskSpec::Legacy {
                    name: "disk2".to_string(),
                    mode: DiskMode::ReadOnly,
                    boot: false,
                },
            ]
        );
    }

    #[test]
    fn name_mode_pairs_keep_the_given_mode() {
        let specs =
            convert_disk_params(&[json!({"name": "d1", "mode": "READ_ONLY"})]).unwrap();
        assert_eq!(
            specs,
            vec![DiskSpec::Legacy {
                name: "d1".to_string(),
                mode: DiskMode::ReadOnly,
                boot: true,
            }]
        );
    }

    #[test]
    fn modern_entries_pass_through() {
        let specs = convert_disk_params(&[json!({
            "type": "SCRATCH",
            "autoDelete": true,
            "initializeParams": {"diskType": "local-ssd"},
        })])
        .unwrap();
        match &specs[0] {
            DiskSpec::Attached(disk) => {
                assert_eq!(disk.kind.as_deref(), Some("SCRATCH"));
                assert_eq!(disk.auto_delete, Some(true));
                assert_eq!(
                    disk.initialize_params.as_ref().unwrap().disk_type.as_deref(),
                    Some("local-ssd")
                );
            }
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn junk_entries_are_rejected() {
        assert!(matches!(
            convert_disk_params(&[json!(5)]),
            Err(Error::Validation(_))
        ));
    }
}
