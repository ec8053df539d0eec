//! Device Ownership Mapping
//!
//! Resolves which devices on which hosts are claimed by which OSDs, from the
//! raw per-OSD metadata feed, and annotates host inventories with the result.
//!
//! One device may be shared by several OSDs (e.g. a DB device), so every
//! `(hostname, device)` pair maps to a list of OSD ids:
//!
//! ```text
//! node1 ─┬─ nvme0n1 → [0, 1]
//!        ├─ vdc     → [0]
//!        └─ vdb     → [1]
//! node2 ─── vdc     → [2]
//! ```

use crate::domain::ports::{InventoryNode, OsdMetadataFeed};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Devices of one host and the OSDs claiming each of them
pub type HostDevices = BTreeMap<String, Vec<u32>>;

/// Hostname → device name → OSD ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnershipMap {
    hosts: BTreeMap<String, HostDevices>,
}

impl OwnershipMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `osd_id` claims `device` on `hostname`
    pub fn record(&mut self, hostname: &str, device: &str, osd_id: u32) {
        self.hosts
            .entry(hostname.to_string())
            .or_default()
            .entry(device.to_string())
            .or_default()
            .push(osd_id);
    }

    /// Devices recorded for a host
    pub fn host(&self, hostname: &str) -> Option<&HostDevices> {
        self.hosts.get(hostname)
    }

    /// OSD ids recorded for a device, in feed order
    pub fn osd_ids(&self, hostname: &str, device: &str) -> Option<&[u32]> {
        self.host(hostname)
            .and_then(|devices| devices.get(device))
            .map(Vec::as_slice)
    }

    /// Number of hosts with at least one recorded device
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HostDevices)> {
        self.hosts.iter()
    }
}

/// Build the ownership map from an OSD metadata feed.
///
/// Records without a hostname or without devices are skipped. Device lists
/// are split on `,` verbatim: tokens are neither trimmed nor de-duplicated.
/// A non-numeric OSD id fails the whole build.
pub fn build_ownership_map(feed: &OsdMetadataFeed) -> Result<OwnershipMap> {
    let mut map = OwnershipMap::new();

    for (osd_id, metadata) in feed {
        let (hostname, devices) = match (metadata.hostname.as_deref(), metadata.devices.as_deref())
        {
            (Some(h), Some(d)) if !h.is_empty() && !d.is_empty() => (h, d),
            _ => {
                debug!("Skipping OSD {} without hostname or devices", osd_id);
                continue;
            }
        };

        let id = parse_osd_id(osd_id)?;
        for device in devices.split(',') {
            map.record(hostname, device, id);
        }
    }

    Ok(map)
}

/// Annotate every inventory device with the OSDs that claim it.
///
/// Devices on unknown hosts, or never recorded, get an empty list. Recorded
/// ids are sorted ascending.
pub fn merge_into_inventory(nodes: &mut [InventoryNode], map: &OwnershipMap) {
    for node in nodes.iter_mut() {
        let host_devices = map.host(&node.name);
        for device in node.devices.iter_mut() {
            device.osd_ids = host_devices
                .and_then(|devices| devices.get(&device.path))
                .map(|ids| {
                    let mut ids = ids.clone();
                    ids.sort_unstable();
                    ids
                })
                .unwrap_or_default();
        }
    }
}

fn parse_osd_id(raw: &str) -> Result<u32> {
    raw.parse().map_err(|_| Error::OsdIdParse {
        osd_id: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{InventoryDevice, OsdMetadataRecord};
    use assert_matches::assert_matches;

    fn feed(entries: &[(&str, Option<&str>, Option<&str>)]) -> OsdMetadataFeed {
        entries
            .iter()
            .map(|(id, host, devices)| {
                (
                    id.to_string(),
                    OsdMetadataRecord {
                        hostname: host.map(str::to_string),
                        devices: devices.map(str::to_string),
                    },
                )
            })
            .collect()
    }

    fn node(name: &str, paths: &[&str]) -> InventoryNode {
        InventoryNode {
            name: name.to_string(),
            addr: None,
            devices: paths.iter().map(|p| InventoryDevice::new(*p)).collect(),
        }
    }

    #[test]
    fn test_build_example_feed() {
        let feed = feed(&[
            ("0", Some("node1"), Some("nvme0n1,vdc")),
            ("1", Some("node1"), Some("vdb")),
            ("2", Some("node2"), Some("vdc")),
        ]);

        let map = build_ownership_map(&feed).unwrap();

        assert_eq!(
            serde_json::to_value(&map).unwrap(),
            serde_json::json!({
                "node1": {"nvme0n1": [0], "vdc": [0], "vdb": [1]},
                "node2": {"vdc": [2]}
            })
        );
    }

    #[test]
    fn test_records_missing_fields_are_skipped() {
        let feed = feed(&[
            ("0", None, Some("vdb")),
            ("1", Some("node1"), None),
            ("2", Some(""), Some("vdc")),
            ("3", Some("node1"), Some("")),
            ("4", None, None),
        ]);

        let map = build_ownership_map(&feed).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_skipped_record_with_bad_id_does_not_fail() {
        let feed = feed(&[("x", None, Some("vdb")), ("1", Some("node1"), Some("vdb"))]);
        let map = build_ownership_map(&feed).unwrap();
        assert_eq!(map.osd_ids("node1", "vdb"), Some(&[1][..]));
    }

    #[test]
    fn test_shared_device_keeps_feed_order() {
        let feed = feed(&[
            ("5", Some("node1"), Some("nvme0n1,vdc")),
            ("1", Some("node1"), Some("nvme0n1,vdb")),
        ]);

        let map = build_ownership_map(&feed).unwrap();
        assert_eq!(map.osd_ids("node1", "nvme0n1"), Some(&[5, 1][..]));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_tokens_are_not_trimmed_or_deduplicated() {
        let feed = feed(&[("0", Some("node1"), Some("vdc, vdc,vdc"))]);

        let map = build_ownership_map(&feed).unwrap();
        assert_eq!(map.osd_ids("node1", "vdc"), Some(&[0, 0][..]));
        assert_eq!(map.osd_ids("node1", " vdc"), Some(&[0][..]));
    }

    #[test]
    fn test_non_numeric_id_fails() {
        let feed = feed(&[("osd.0", Some("node1"), Some("vdb"))]);
        let err = build_ownership_map(&feed).unwrap_err();
        assert_matches!(err, Error::OsdIdParse { ref osd_id } if osd_id == "osd.0");
    }

    #[test]
    fn test_merge_shared_device_sorted() {
        let feed = feed(&[
            ("1", Some("node1"), Some("vdc")),
            ("0", Some("node1"), Some("nvme0n1,vdc")),
        ]);
        let map = build_ownership_map(&feed).unwrap();

        let mut nodes = vec![node("node1", &["nvme0n1", "vdc", "vdd"])];
        merge_into_inventory(&mut nodes, &map);

        assert_eq!(nodes[0].devices[0].osd_ids, vec![0]);
        assert_eq!(nodes[0].devices[1].osd_ids, vec![0, 1]);
        assert!(nodes[0].devices[2].osd_ids.is_empty());
    }

    #[test]
    fn test_merge_unknown_host_gets_empty_lists() {
        let feed = feed(&[("0", Some("node1"), Some("vdc"))]);
        let map = build_ownership_map(&feed).unwrap();

        let mut nodes = vec![node("node3", &["vdc", "vdb"])];
        nodes[0].devices[0].osd_ids = vec![42];
        merge_into_inventory(&mut nodes, &map);

        assert!(nodes[0].devices.iter().all(|d| d.osd_ids.is_empty()));
    }

    #[test]
    fn test_merge_matches_recorded_set_for_every_device() {
        let feed = feed(&[
            ("3", Some("a"), Some("sda,sdb")),
            ("1", Some("a"), Some("sdb")),
            ("2", Some("b"), Some("sda")),
            ("0", Some("a"), Some("sdb,sdc")),
        ]);
        let map = build_ownership_map(&feed).unwrap();

        let mut nodes = vec![node("a", &["sda", "sdb", "sdc"]), node("b", &["sda", "sdb"])];
        merge_into_inventory(&mut nodes, &map);

        for n in &nodes {
            for d in &n.devices {
                let mut expected: Vec<u32> = feed
                    .iter()
                    .filter(|(_, m)| m.hostname.as_deref() == Some(n.name.as_str()))
                    .filter(|(_, m)| {
                        m.devices
                            .as_deref()
                            .map(|s| s.split(',').any(|t| t == d.path))
                            .unwrap_or(false)
                    })
                    .map(|(id, _)| id.parse().unwrap())
                    .collect();
                expected.sort_unstable();
                assert_eq!(d.osd_ids, expected, "{}:{}", n.name, d.path);
            }
        }
        assert_eq!(nodes[0].devices[1].osd_ids, vec![0, 1, 3]);
    }
}
