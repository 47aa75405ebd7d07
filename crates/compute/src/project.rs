use std::collections::BTreeMap;

use serde::Serialize;

use crate::api::{AttachedDisk, Instance};

/// The minimal public view of an instance surfaced in task results.
#[derive(Debug, Serialize)]
pub struct InstanceInfo {
    pub image: Option<String>,
    pub disks: Vec<String>,
    pub machine_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub name: String,
    pub network: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub status: Option<String>,
    pub tags: Vec<String>,
    pub zone: Option<String>,
}

/// Project a richly-attributed remote instance down to [`InstanceInfo`].
/// Total: absent fields degrade to `None`/empty rather than failing.
pub fn instance_info(instance: &Instance) -> InstanceInfo {
    let metadata = instance
        .metadata
        .as_ref()
        .map(|m| {
            m.items
                .iter()
                .map(|e| (e.key.clone(), e.value.clone()))
                .collect()
        })
        .unwrap_or_default();

    // Disk names in declared-index order; the sort is stable, so entries
    // sharing an index keep their insertion order.
    let mut disks: Vec<&AttachedDisk> = instance.disks.iter().collect();
    disks.sort_by_key(|d| d.index.unwrap_or(0));
    let disks = disks
        .iter()
        .map(|d| {
            d.source
                .as_deref()
                .map(short_name)
                .unwrap_or("scratch")
                .to_string()
        })
        .collect();

    let first_nic = instance.network_interfaces.first();
    let public_ip = instance
        .network_interfaces
        .iter()
        .flat_map(|n| &n.access_configs)
        .find_map(|a| a.nat_ip.clone());

    InstanceInfo {
        image: instance.image.as_deref().map(|i| short_name(i).to_string()),
        disks,
        machine_type: instance
            .machine_type
            .as_deref()
            .map(|m| short_name(m).to_string()),
        metadata,
        name: instance.name.clone(),
        network: first_nic
            .and_then(|n| n.network.as_deref())
            .map(|n| short_name(n).to_string()),
        private_ip: first_nic.and_then(|n| n.network_ip.clone()),
        public_ip,
        status: instance.status.clone(),
        tags: instance
            .tags
            .as_ref()
            .map(|t| t.items.clone())
            .unwrap_or_default(),
        zone: instance.zone.as_deref().map(|z| short_name(z).to_string()),
    }
}

fn short_name(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}
