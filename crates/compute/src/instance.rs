use std::str::FromStr;

use converge::{Error, Result, engine::Gateway};

use crate::{
    api::{
        AccessConfig, AttachedDisk, Disk, DiskMode, InitializeParams, Instance, Metadata,
        NetworkInterface, Tags, Zone,
    },
    client::ComputeClient,
    normalize::DiskSpec,
};

/// How the instance is exposed to the outside network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExternalIp {
    #[default]
    Ephemeral,
    None,
}

impl FromStr for ExternalIp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ephemeral" => Ok(ExternalIp::Ephemeral),
            "none" => Ok(ExternalIp::None),
            other => Err(Error::Validation(format!(
                "unknown external_ip {other:?}, expected ephemeral or none"
            ))),
        }
    }
}

/// Instance parameters as read from the task: boundary-normalized already
/// (metadata and disk literals are parsed before any remote call), but with
/// references still unresolved.
#[derive(Debug, Clone)]
pub struct InstanceParams {
    pub image: String,
    pub machine_type: String,
    pub zone: String,
    pub network: String,
    pub metadata: Option<Metadata>,
    pub tags: Vec<String>,
    pub disks: Vec<DiskSpec>,
    pub boot_disk: Option<String>,
    pub boot_disk_size_gb: Option<i64>,
    pub boot_disk_type: String,
    pub boot_disk_auto_delete: bool,
    pub boot_disk_use_existing: bool,
    pub ip_forward: bool,
    pub external_ip: ExternalIp,
}

/// Desired instance attributes with every reference resolved to a canonical
/// link. Resolved once per invocation and shared by every name in a batch.
/// The default value is only suitable for deletion flows, which never reach
/// `create`.
#[derive(Debug, Clone, Default)]
pub struct InstanceDescriptor {
    pub zone: String,
    pub machine_type: String,
    pub image: String,
    pub network: String,
    pub metadata: Option<Metadata>,
    pub tags: Vec<String>,
    pub disks: Vec<AttachedDisk>,
    pub boot_disk: Option<Disk>,
    pub boot_disk_auto_delete: bool,
    pub can_ip_forward: bool,
    pub external_ip: ExternalIp,
}

impl InstanceDescriptor {
    /// Resolve task parameters against the remote catalog. A missing
    /// referent (image, machine type, network, disk) is fatal here, before
    /// any instance is touched.
    pub async fn resolve(
        client: &ComputeClient,
        zone: &Zone,
        params: &InstanceParams,
    ) -> Result<Self> {
        let image = client.get_image(&params.image).await?;
        let machine_type = client.get_machine_type(&zone.name, &params.machine_type).await?;
        let network = client.get_network(&params.network).await?;

        let disks = resolve_disks(client, &zone.name, params.disks.clone()).await?;

        let image_link = image.self_link.unwrap_or(image.name);
        let boot_disk = boot_disk(client, &zone.name, params, &image_link).await?;

        Ok(InstanceDescriptor {
            zone: zone.name.clone(),
            machine_type: machine_type.self_link.unwrap_or(machine_type.name),
            image: image_link,
            network: network.self_link.unwrap_or(network.name),
            metadata: params.metadata.clone(),
            tags: params.tags.clone(),
            disks,
            boot_disk,
            boot_disk_auto_delete: params.boot_disk_auto_delete,
            can_ip_forward: params.ip_forward,
            external_ip: params.external_ip,
        })
    }
}

/// Resolve legacy disk entries to their canonical source links and expand
/// partial names inside modern entries.
async fn resolve_disks(
    client: &ComputeClient,
    zone: &str,
    specs: Vec<DiskSpec>,
) -> Result<Vec<AttachedDisk>> {
    let mut disks = Vec::with_capacity(specs.len());
    for spec in specs {
        match spec {
            DiskSpec::Legacy { name, mode, boot } => {
                let disk = client.get_disk(zone, &name).await?.ok_or(Error::NotFound {
                    kind: "disk",
                    name: name.clone(),
                })?;
                disks.push(AttachedDisk {
                    source: disk.self_link.or(Some(disk.name)),
                    mode: Some(mode),
                    boot: boot.then_some(true),
                    ..Default::default()
                });
            }
            DiskSpec::Attached(mut disk) => {
                expand_partial_names(client, zone, &mut disk).await?;
                disks.push(disk);
            }
        }
    }
    Ok(disks)
}

async fn expand_partial_names(
    client: &ComputeClient,
    zone: &str,
    disk: &mut AttachedDisk,
) -> Result<()> {
    let Some(params) = disk.initialize_params.as_mut() else {
        return Ok(());
    };
    if let Some(image) = params.source_image.clone() {
        if !image.contains('/') {
            let resolved = client.get_image(&image).await?;
            params.source_image = resolved.self_link.or(Some(resolved.name));
        }
    }
    if let Some(disk_type) = params.disk_type.clone() {
        if !disk_type.contains('/') {
            params.disk_type = Some(format!(
                "projects/{}/zones/{}/diskTypes/{}",
                client.project(),
                zone,
                disk_type
            ));
        }
    }
    Ok(())
}

/// Get-or-create the named boot disk. With `use_existing` an existing disk
/// of that name is reused; otherwise a same-name collision surfaces as
/// fatal.
async fn boot_disk(
    client: &ComputeClient,
    zone: &str,
    params: &InstanceParams,
    image_link: &str,
) -> Result<Option<Disk>> {
    let Some(name) = &params.boot_disk else {
        return Ok(None);
    };
    if params.boot_disk_use_existing {
        if let Some(disk) = client.get_disk(zone, name).await? {
            return Ok(Some(disk));
        }
    }
    let init = Disk {
        name: name.clone(),
        kind: Some(format!(
            "projects/{}/zones/{}/diskTypes/{}",
            client.project(),
            zone,
            params.boot_disk_type
        )),
        size_gb: params.boot_disk_size_gb,
        source_image: Some(image_link.to_string()),
        ..Default::default()
    };
    client.insert_disk(zone, &init).await.map(Some)
}

pub struct InstanceGateway<'a> {
    client: &'a ComputeClient,
    zone: String,
}

impl<'a> InstanceGateway<'a> {
    pub fn new(client: &'a ComputeClient, zone: impl Into<String>) -> Self {
        InstanceGateway {
            client,
            zone: zone.into(),
        }
    }
}

impl Gateway for InstanceGateway<'_> {
    type Descriptor = InstanceDescriptor;
    type Resource = Instance;

    fn kind(&self) -> &'static str {
        "instance"
    }

    async fn fetch(&self, name: &str) -> Result<Option<Instance>> {
        self.client.get_instance(&self.zone, name).await
    }

    async fn create(&self, name: &str, descriptor: &InstanceDescriptor) -> Result<Instance> {
        self.client
            .insert_instance(&self.zone, &build_payload(name, descriptor))
            .await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.client.delete_instance(&self.zone, name).await
    }
}

/// Assemble the create payload for one name from the shared descriptor.
fn build_payload(name: &str, descriptor: &InstanceDescriptor) -> Instance {
    let access_configs = match descriptor.external_ip {
        ExternalIp::Ephemeral => vec![AccessConfig {
            name: Some("External NAT".to_string()),
            kind: Some("ONE_TO_ONE_NAT".to_string()),
            nat_ip: None,
        }],
        ExternalIp::None => Vec::new(),
    };

    let disks = if !descriptor.disks.is_empty() {
        descriptor.disks.clone()
    } else if let Some(boot) = &descriptor.boot_disk {
        vec![AttachedDisk {
            source: boot.self_link.clone().or(Some(boot.name.clone())),
            mode: Some(DiskMode::ReadWrite),
            boot: Some(true),
            auto_delete: Some(descriptor.boot_disk_auto_delete),
            ..Default::default()
        }]
    } else {
        // No explicit disks: a fresh boot disk from the image.
        vec![AttachedDisk {
            boot: Some(true),
            auto_delete: Some(descriptor.boot_disk_auto_delete),
            initialize_params: Some(InitializeParams {
                source_image: Some(descriptor.image.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }]
    };

    Instance {
        name: name.to_string(),
        machine_type: Some(descriptor.machine_type.clone()),
        image: Some(descriptor.image.clone()),
        can_ip_forward: descriptor.can_ip_forward.then_some(true),
        network_interfaces: vec![NetworkInterface {
            network: Some(descriptor.network.clone()),
            network_ip: None,
            access_configs,
        }],
        disks,
        metadata: descriptor.metadata.clone(),
        tags: if descriptor.tags.is_empty() {
            None
        } else {
            Some(Tags {
                items: descriptor.tags.clone(),
            })
        },
        ..Default::default()
    }
}
