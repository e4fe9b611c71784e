//! On-disk config document: parsing, rendering and atomic writes.
//!
//! ```json
//! {
//!   "_metadata": {"description": "...", "format_version": "1.0", "last_updated": "2026-01-01 12:00:00"},
//!   "flags": {
//!     "max_conn": {"value": 100, "description": "...", "owner_module": "owner", "access_permissions": "read_only"}
//!   }
//! }
//! ```

use crate::{FlagOwnership, FlagValue, PermissionLevel};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use streambot_error::{FlagError, FlagErrorKind, FlagResult};
use tracing::{debug, warn};

/// Version written into `_metadata.format_version`.
pub const FORMAT_VERSION: &str = "1.0";

const METADATA_DESCRIPTION: &str =
    "Feature flags configuration with integrated ownership information";

/// Flag values, descriptions and ownership for one config file.
#[derive(Debug, Clone, Default, PartialEq, derive_getters::Getters)]
pub struct FlagTables {
    /// Current value per flag
    pub(crate) values: HashMap<String, FlagValue>,
    /// Description per flag
    pub(crate) descriptions: HashMap<String, String>,
    /// Ownership record per flag
    pub(crate) ownership: HashMap<String, FlagOwnership>,
}

impl FlagTables {
    /// Assemble tables from their parts.
    pub fn from_parts(
        values: HashMap<String, FlagValue>,
        descriptions: HashMap<String, String>,
        ownership: HashMap<String, FlagOwnership>,
    ) -> Self {
        Self {
            values,
            descriptions,
            ownership,
        }
    }

    /// Whether no flag has a value.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Metadata {
    description: String,
    format_version: String,
    last_updated: String,
}

#[derive(Debug, Serialize)]
struct FlagEntry<'a> {
    value: &'a FlagValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_module: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_permissions: Option<PermissionLevel>,
}

#[derive(Debug, Serialize)]
struct Document<'a> {
    #[serde(rename = "_metadata")]
    metadata: Metadata,
    flags: BTreeMap<&'a str, FlagEntry<'a>>,
}

/// Render the config document. Flags are written in name order.
pub fn render_document(tables: &FlagTables) -> FlagResult<String> {
    let flags = tables
        .values
        .iter()
        .map(|(name, value)| {
            let ownership = tables.ownership.get(name);
            let entry = FlagEntry {
                value,
                description: tables
                    .descriptions
                    .get(name)
                    .map(String::as_str)
                    .filter(|d| !d.is_empty()),
                owner_module: ownership.map(|o| o.owner_module().as_str()),
                access_permissions: ownership.map(|o| *o.access_permissions()),
            };
            (name.as_str(), entry)
        })
        .collect();

    let document = Document {
        metadata: Metadata {
            description: METADATA_DESCRIPTION.to_string(),
            format_version: FORMAT_VERSION.to_string(),
            last_updated: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        },
        flags,
    };

    let mut text = serde_json::to_string_pretty(&document).map_err(|e| {
        FlagError::new(FlagErrorKind::Persistence {
            path: String::new(),
            message: format!("Failed to serialize config: {}", e),
        })
    })?;
    text.push('\n');
    Ok(text)
}

/// Parse a config document.
///
/// A document without a `flags` object yields empty tables. Entries lacking
/// a `value` key are legacy bare values and are taken whole. Only invalid
/// JSON is an error.
pub fn parse_document(text: &str) -> Result<FlagTables, serde_json::Error> {
    let root: Value = serde_json::from_str(text)?;
    let mut tables = FlagTables::default();

    let Some(Value::Object(flags)) = root.get("flags") else {
        debug!("Config has no flags map; treating as empty");
        return Ok(tables);
    };

    for (name, entry) in flags {
        match entry {
            Value::Object(fields) if fields.contains_key("value") => {
                if let Some(value) = fields.get("value").cloned().and_then(FlagValue::from_json) {
                    tables.values.insert(name.clone(), value);
                }
                if let Some(Value::String(description)) = fields.get("description") {
                    tables.descriptions.insert(name.clone(), description.clone());
                }
                if let Some(ownership) = parse_ownership(name, fields) {
                    tables.ownership.insert(name.clone(), ownership);
                }
            }
            other => {
                if let Some(value) = FlagValue::from_json(other.clone()) {
                    tables.values.insert(name.clone(), value);
                }
            }
        }
    }

    Ok(tables)
}

fn parse_ownership(name: &str, fields: &serde_json::Map<String, Value>) -> Option<FlagOwnership> {
    let owner = fields.get("owner_module")?.as_str()?;
    let raw_level = fields.get("access_permissions")?.as_str()?;
    match PermissionLevel::from_str(raw_level) {
        Ok(level) => Some(FlagOwnership::new(owner, level)),
        Err(_) => {
            warn!(flag = %name, access_permissions = %raw_level, "Ignoring unknown access level");
            None
        }
    }
}

/// Sibling temp file used for atomic writes: `<file>.tmp`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `contents` to `path` atomically.
///
/// Writes the sibling temp file, syncs it, then renames it over the target,
/// so readers see either the old file or the new one. The parent directory
/// is created if absent. On failure the temp file is removed best-effort.
pub fn write_atomic(path: &Path, contents: &[u8]) -> FlagResult<()> {
    let tmp = temp_path(path);
    let result = (|| -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, path)
    })();

    result.map_err(|e| {
        if tmp.exists() {
            let _ = std::fs::remove_file(&tmp);
        }
        FlagError::new(FlagErrorKind::Persistence {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tables() -> FlagTables {
        let mut tables = FlagTables::default();
        tables.values.insert("max_conn".to_string(), FlagValue::Int(100));
        tables
            .descriptions
            .insert("max_conn".to_string(), "Maximum connections".to_string());
        tables.ownership.insert(
            "max_conn".to_string(),
            FlagOwnership::new("owner", PermissionLevel::ReadOnly),
        );
        tables.values.insert("bare".to_string(), FlagValue::Bool(true));
        tables
    }

    #[test]
    fn test_render_layout() {
        let text = render_document(&sample_tables()).unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(doc["_metadata"]["format_version"], json!("1.0"));
        assert_eq!(doc["flags"]["max_conn"]["value"], json!(100));
        assert_eq!(doc["flags"]["max_conn"]["owner_module"], json!("owner"));
        assert_eq!(doc["flags"]["max_conn"]["access_permissions"], json!("read_only"));
        assert_eq!(doc["flags"]["bare"], json!({"value": true}));
        let stamp = doc["_metadata"]["last_updated"].as_str().unwrap();
        assert_eq!(stamp.len(), "YYYY-MM-DD HH:MM:SS".len());
    }

    #[test]
    fn test_parse_reads_what_render_writes() {
        let tables = sample_tables();
        let text = render_document(&tables).unwrap();
        assert_eq!(parse_document(&text).unwrap(), tables);
    }

    #[test]
    fn test_parse_legacy_and_partial_entries() {
        let text = json!({
            "flags": {
                "legacy_bool": true,
                "legacy_obj": {"threshold": 3},
                "partial": {"value": "x", "owner_module": "only_owner"},
                "bad_level": {"value": 1, "owner_module": "m", "access_permissions": "everyone"},
                "nulled": {"value": null, "description": "kept"}
            }
        })
        .to_string();
        let tables = parse_document(&text).unwrap();

        assert_eq!(tables.values["legacy_bool"], FlagValue::Bool(true));
        assert_eq!(tables.values["legacy_obj"], FlagValue::Json(json!({"threshold": 3})));
        assert_eq!(tables.values["partial"], FlagValue::from("x"));
        assert!(!tables.ownership.contains_key("partial"));
        assert!(!tables.ownership.contains_key("bad_level"));
        assert!(!tables.values.contains_key("nulled"));
        assert_eq!(tables.descriptions["nulled"], "kept");
    }

    #[test]
    fn test_parse_unrecognized_shape_is_empty() {
        assert!(parse_document("{}").unwrap().is_empty());
        assert!(parse_document("[1, 2]").unwrap().is_empty());
        assert!(parse_document(r#"{"flags": 5}"#).unwrap().is_empty());
        assert!(parse_document("{not json").is_err());
    }

    #[test]
    fn test_write_atomic_creates_dirs_and_cleans_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("flags.json");

        write_atomic(&path, b"{}\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");
        assert!(!temp_path(&path).exists());
        assert_eq!(temp_path(&path).file_name().unwrap(), "flags.json.tmp");
    }

    #[test]
    fn test_write_atomic_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A directory squatting on the target path makes the rename fail.
        let path = dir.path().join("flags.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let err = write_atomic(&path, b"{}").unwrap_err();
        assert!(matches!(err.kind, FlagErrorKind::Persistence { .. }));
        assert!(!temp_path(&path).exists());
    }
}
