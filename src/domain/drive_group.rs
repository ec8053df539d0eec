//! Drive Group Specification
//!
//! Declarative description of which devices on which hosts should be turned
//! into OSDs. Payloads arrive as free-form JSON and are validated here before
//! they are handed to the orchestrator.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Component tag for drive group failures
pub const OSD_COMPONENT: &str = "osd";

// =============================================================================
// Object Store
// =============================================================================

/// OSD object store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStore {
    #[default]
    Bluestore,
    Filestore,
}

impl std::fmt::Display for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectStore::Bluestore => write!(f, "bluestore"),
            ObjectStore::Filestore => write!(f, "filestore"),
        }
    }
}

// =============================================================================
// Device Selection
// =============================================================================

/// Filter selecting devices on matching hosts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceSelection {
    /// Explicit device paths
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// Size filter: `10G`, `10G:40G`, `:40G` or `10G:`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotational: Option<bool>,
    /// Maximum number of devices to take
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Take every available device
    #[serde(default)]
    pub all: bool,
}

impl DeviceSelection {
    fn has_filters(&self) -> bool {
        self.model.is_some()
            || self.vendor.is_some()
            || self.size.is_some()
            || self.rotational.is_some()
            || self.limit.is_some()
    }

    fn validate(&self, field: &str) -> Result<()> {
        if self.all && (self.has_filters() || !self.paths.is_empty()) {
            return Err(invalid(format!(
                "{}: `all` cannot be combined with other filters",
                field
            )));
        }
        if !self.paths.is_empty() && self.has_filters() {
            return Err(invalid(format!(
                "{}: `paths` cannot be combined with other filters",
                field
            )));
        }
        if !self.all && self.paths.is_empty() && !self.has_filters() {
            return Err(invalid(format!("{}: empty device selection", field)));
        }
        if self.paths.iter().any(|p| p.is_empty()) {
            return Err(invalid(format!("{}: empty device path", field)));
        }
        if self.limit == Some(0) {
            return Err(invalid(format!("{}: limit must be greater than 0", field)));
        }
        if let Some(size) = &self.size {
            parse_size_range(size).map_err(|e| invalid(format!("{}: {}", field, e)))?;
        }
        Ok(())
    }
}

// =============================================================================
// Drive Group Spec
// =============================================================================

/// Drive group specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriveGroupSpec {
    /// Glob matched against hostnames
    pub host_pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_devices: Option<DeviceSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_devices: Option<DeviceSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wal_devices: Option<DeviceSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_devices: Option<DeviceSelection>,
    #[serde(default)]
    pub objectstore: ObjectStore,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osds_per_device: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_slots: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wal_slots: Option<u32>,
}

impl DriveGroupSpec {
    /// Parse and validate a drive group from its JSON representation
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let spec: DriveGroupSpec =
            serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Check the drive group for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.host_pattern.trim().is_empty() {
            return Err(invalid("host_pattern must not be empty"));
        }
        glob::Pattern::new(&self.host_pattern)
            .map_err(|e| invalid(format!("host_pattern: {}", e)))?;

        let data = self
            .data_devices
            .as_ref()
            .ok_or_else(|| invalid("data_devices is required"))?;
        data.validate("data_devices")?;

        for (field, selection) in [
            ("db_devices", &self.db_devices),
            ("wal_devices", &self.wal_devices),
            ("journal_devices", &self.journal_devices),
        ] {
            if let Some(selection) = selection {
                selection.validate(field)?;
            }
        }

        match self.objectstore {
            ObjectStore::Bluestore if self.journal_devices.is_some() => {
                return Err(invalid("journal_devices requires objectstore filestore"));
            }
            ObjectStore::Filestore
                if self.db_devices.is_some() || self.wal_devices.is_some() =>
            {
                return Err(invalid("db_devices/wal_devices require objectstore bluestore"));
            }
            _ => {}
        }

        for (field, value) in [
            ("osds_per_device", self.osds_per_device),
            ("db_slots", self.db_slots),
            ("wal_slots", self.wal_slots),
        ] {
            if value == Some(0) {
                return Err(invalid(format!("{} must be greater than 0", field)));
            }
        }

        Ok(())
    }

    /// Whether the host pattern selects the given hostname
    pub fn matches_host(&self, hostname: &str) -> bool {
        glob::Pattern::new(&self.host_pattern)
            .map(|p| p.matches(hostname))
            .unwrap_or(false)
    }
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::validation(OSD_COMPONENT, reason)
}

// =============================================================================
// Size Filters
// =============================================================================

/// Parse a size filter into `(min, max)` byte bounds.
///
/// An exact size yields equal bounds.
pub fn parse_size_range(s: &str) -> std::result::Result<(Option<u64>, Option<u64>), String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size filter".into());
    }

    match s.split_once(':') {
        None => {
            let exact = parse_size(s)?;
            Ok((Some(exact), Some(exact)))
        }
        Some((low, high)) => {
            let low = if low.is_empty() { None } else { Some(parse_size(low)?) };
            let high = if high.is_empty() { None } else { Some(parse_size(high)?) };
            match (low, high) {
                (None, None) => Err(format!("open size range: {}", s)),
                (Some(l), Some(h)) if l > h => Err(format!("inverted size range: {}", s)),
                bounds => Ok(bounds),
            }
        }
    }
}

/// Parse a size string (e.g. "100G", "1.5TB") to bytes
fn parse_size(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();

    // Find where the number ends and unit begins
    let num_end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    let num_str = &s[..num_end];
    let unit_str = s[num_end..].trim();

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("invalid number: {:?}", num_str))?;

    let multiplier: u64 = match unit_str.to_uppercase().as_str() {
        "" | "B" => 1,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        "T" | "TB" => 1024 * 1024 * 1024 * 1024,
        _ => return Err(format!("unknown unit: {:?}", unit_str)),
    };

    Ok((num * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_from_json_minimal() {
        let spec = DriveGroupSpec::from_json(json!({
            "host_pattern": "node*",
            "data_devices": {"paths": ["vdb", "vdc"]}
        }))
        .unwrap();

        assert_eq!(spec.objectstore, ObjectStore::Bluestore);
        assert!(!spec.encrypted);
        assert!(spec.matches_host("node1"));
        assert!(!spec.matches_host("storage1"));
    }

    #[test]
    fn test_missing_host_pattern_is_validation_error() {
        let err = DriveGroupSpec::from_json(json!({"data_devices": {"all": true}})).unwrap_err();
        assert_matches!(err, Error::Validation { ref component, .. } if component == "osd");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = DriveGroupSpec::from_json(json!({
            "host_pattern": "*",
            "data_devices": {"all": true},
            "bogus": 1
        }))
        .unwrap_err();
        assert_matches!(err, Error::Validation { .. });
    }

    #[test]
    fn test_data_devices_required() {
        let err = DriveGroupSpec::from_json(json!({"host_pattern": "*"})).unwrap_err();
        assert!(err.to_string().contains("data_devices"));
    }

    #[test]
    fn test_selection_exclusivity() {
        let err = DriveGroupSpec::from_json(json!({
            "host_pattern": "*",
            "data_devices": {"all": true, "rotational": true}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("`all`"));

        let err = DriveGroupSpec::from_json(json!({
            "host_pattern": "*",
            "data_devices": {"paths": ["sda"], "model": "X"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("`paths`"));

        let err = DriveGroupSpec::from_json(json!({
            "host_pattern": "*",
            "data_devices": {}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("empty device selection"));
    }

    #[test]
    fn test_objectstore_constraints() {
        let err = DriveGroupSpec::from_json(json!({
            "host_pattern": "*",
            "data_devices": {"rotational": true},
            "journal_devices": {"rotational": false}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("journal_devices"));

        let spec = DriveGroupSpec::from_json(json!({
            "host_pattern": "*",
            "objectstore": "filestore",
            "data_devices": {"rotational": true},
            "journal_devices": {"rotational": false}
        }))
        .unwrap();
        assert_eq!(spec.objectstore, ObjectStore::Filestore);

        let err = DriveGroupSpec::from_json(json!({
            "host_pattern": "*",
            "objectstore": "filestore",
            "data_devices": {"all": true},
            "db_devices": {"rotational": false}
        }))
        .unwrap_err();
        assert_matches!(err, Error::Validation { .. });
    }

    #[test]
    fn test_zero_counts_rejected() {
        let err = DriveGroupSpec::from_json(json!({
            "host_pattern": "*",
            "data_devices": {"all": true},
            "osds_per_device": 0
        }))
        .unwrap_err();
        assert!(err.to_string().contains("osds_per_device"));
    }

    #[test]
    fn test_invalid_host_pattern() {
        let err = DriveGroupSpec::from_json(json!({
            "host_pattern": "node[",
            "data_devices": {"all": true}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("host_pattern"));
    }

    #[test]
    fn test_parse_size_range() {
        let gib = 1024 * 1024 * 1024;
        assert_eq!(parse_size_range("10G").unwrap(), (Some(10 * gib), Some(10 * gib)));
        assert_eq!(parse_size_range("10G:40G").unwrap(), (Some(10 * gib), Some(40 * gib)));
        assert_eq!(parse_size_range(":1T").unwrap(), (None, Some(1024 * gib)));
        assert_eq!(parse_size_range("500MB:").unwrap().1, None);

        assert!(parse_size_range("").is_err());
        assert!(parse_size_range(":").is_err());
        assert!(parse_size_range("40G:10G").is_err());
        assert!(parse_size_range("10X").is_err());
        assert!(parse_size_range("abc").is_err());
    }
}
