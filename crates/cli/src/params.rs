//! Flat task parameters and their validation.
//!
//! Every parameter is parsed and every mutual-exclusion constraint enforced
//! here, before a single remote call is made. Core logic downstream never
//! re-parses strings.

use std::{collections::BTreeMap, path::PathBuf};

use clap::Args;
use compute::{
    client::ComputeConfig,
    instance::{ExternalIp, InstanceParams},
    normalize::{convert_disk_params, metadata_items},
};
use converge::{DesiredState, Error, Result};
use kube_resources::{
    pod::PodDescriptor, replication_controller::ReplicationControllerDescriptor,
    service::ServiceDescriptor,
};
use serde_json::Value;

#[derive(Debug, Args)]
pub struct ComputeConnection {
    /// Base URL of the compute API
    #[arg(long, env = "CONVERGE_COMPUTE_ENDPOINT")]
    pub endpoint: String,
    /// Project to operate in
    #[arg(long, env = "CONVERGE_PROJECT")]
    pub project: String,
    /// Path to a file holding a bearer token
    #[arg(long, env = "CONVERGE_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,
}

impl ComputeConnection {
    fn into_config(self) -> Result<ComputeConfig> {
        let token = match &self.token_file {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::Validation(format!("cannot read token file {}: {e}", path.display()))
                })?;
                Some(raw.trim().to_string())
            }
            None => None,
        };
        Ok(ComputeConfig {
            endpoint: self.endpoint,
            project: self.project,
            token,
        })
    }
}

#[derive(Debug, Args)]
pub struct InstanceArgs {
    #[command(flatten)]
    pub connection: ComputeConnection,

    /// Identifier when working with a single instance
    #[arg(long)]
    pub name: Option<String>,
    /// Comma-separated list of instance names to create or destroy
    #[arg(long)]
    pub instance_names: Option<String>,
    /// Desired state of the resource
    #[arg(long, default_value = "present")]
    pub state: String,
    /// Image to boot the instance from
    #[arg(long, default_value = "debian-7")]
    pub image: String,
    #[arg(long, default_value = "n1-standard-1")]
    pub machine_type: String,
    #[arg(long, default_value = "us-central1-a")]
    pub zone: String,
    #[arg(long, default_value = "default")]
    pub network: String,
    /// Custom instance metadata, as a JSON object literal
    #[arg(long)]
    pub metadata: Option<String>,
    /// Comma-separated list of tags
    #[arg(long)]
    pub tags: Option<String>,
    /// Disk list, as a YAML/JSON fragment
    #[arg(long)]
    pub disks: Option<String>,
    /// Name to use for the boot disk
    #[arg(long)]
    pub boot_disk: Option<String>,
    /// Boot disk size in GB
    #[arg(long)]
    pub boot_disk_size: Option<i64>,
    /// Boot disk type (pd-standard, pd-ssd)
    #[arg(long)]
    pub boot_disk_type: Option<String>,
    /// Remove the boot disk when the instance is destroyed
    #[arg(long)]
    pub boot_disk_auto_delete: Option<bool>,
    /// Reuse an existing disk of the same name instead of creating one
    #[arg(long)]
    pub boot_disk_use_existing: Option<bool>,
    /// Let the instance forward IP packets
    #[arg(long)]
    pub ip_forward: bool,
    /// Type of external IP (ephemeral, none)
    #[arg(long)]
    pub external_ip: Option<String>,
    /// Number of instances to create from a base name
    #[arg(long)]
    pub count: Option<i64>,
}

/// Which instances one invocation targets.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug)]
pub struct InstanceTask {
    pub state: DesiredState,
    /// The state string as the task spelled it, echoed in the result.
    pub state_label: String,
    pub target: Target,
    pub config: ComputeConfig,
    pub params: InstanceParams,
}

impl InstanceArgs {
    pub fn validate(self) -> Result<InstanceTask> {
        if self.disks.is_some() {
            let boot_flags = self.boot_disk.is_some()
                || self.boot_disk_size.is_some()
                || self.boot_disk_type.is_some()
                || self.boot_disk_auto_delete.is_some()
                || self.boot_disk_use_existing.is_some();
            if boot_flags {
                return Err(Error::Validation(
                    "disks cannot be combined with boot_disk options".to_string(),
                ));
            }
        }

        let target = match (self.name, self.instance_names) {
            (Some(_), Some(_)) => {
                return Err(Error::Validation(
                    "name and instance_names are mutually exclusive".to_string(),
                ));
            }
            (Some(name), None) => Target::One(name),
            (None, Some(csv)) => Target::Many(split_csv(&csv)?),
            (None, None) => {
                return Err(Error::Validation(
                    "one of name or instance_names is required".to_string(),
                ));
            }
        };

        if self.count.is_some() {
            if matches!(target, Target::Many(_)) {
                return Err(Error::Validation(
                    "count and instance_names are mutually exclusive".to_string(),
                ));
            }
            if self.boot_disk.is_some() {
                return Err(Error::Validation(
                    "count and boot_disk are mutually exclusive".to_string(),
                ));
            }
            // Exact-count reconciliation has no implementation; fail loudly
            // rather than silently creating a single instance.
            return Err(Error::NotImplemented("create-by-count"));
        }

        let state = self.state.parse::<DesiredState>()?;

        let metadata = match &self.metadata {
            Some(literal) => Some(metadata_items(literal)?),
            None => None,
        };
        let disks = match &self.disks {
            Some(fragment) => convert_disk_params(&parse_value_list("disks", fragment)?)?,
            None => Vec::new(),
        };
        let tags = match &self.tags {
            Some(csv) => split_csv(csv)?,
            None => Vec::new(),
        };
        let external_ip = match &self.external_ip {
            Some(s) => s.parse()?,
            None => ExternalIp::Ephemeral,
        };

        Ok(InstanceTask {
            state,
            state_label: self.state,
            target,
            config: self.connection.into_config()?,
            params: InstanceParams {
                image: self.image,
                machine_type: self.machine_type,
                zone: self.zone,
                network: self.network,
                metadata,
                tags,
                disks,
                boot_disk: self.boot_disk,
                boot_disk_size_gb: self.boot_disk_size,
                boot_disk_type: self
                    .boot_disk_type
                    .unwrap_or_else(|| "pd-standard".to_string()),
                boot_disk_auto_delete: self.boot_disk_auto_delete.unwrap_or(true),
                boot_disk_use_existing: self.boot_disk_use_existing.unwrap_or(true),
                ip_forward: self.ip_forward,
                external_ip,
            },
        })
    }
}

#[derive(Debug, Args)]
pub struct NamespaceArgs {
    /// Name that will be given to the namespace
    #[arg(long)]
    pub name: String,
    /// Desired state of the resource
    #[arg(long, default_value = "present")]
    pub state: String,
}

#[derive(Debug)]
pub struct NamespaceTask {
    pub state: DesiredState,
    pub name: String,
}

impl NamespaceArgs {
    pub fn validate(self) -> Result<NamespaceTask> {
        Ok(NamespaceTask {
            state: self.state.parse()?,
            name: self.name,
        })
    }
}

#[derive(Debug, Args)]
pub struct PodArgs {
    /// Name that will be given to the pod
    #[arg(long)]
    pub name: String,
    /// Desired state of the resource
    #[arg(long, default_value = "present")]
    pub state: String,
    /// Namespace the pod lives in
    #[arg(long, default_value = "default")]
    pub namespace: String,
    /// Container list, as a YAML/JSON fragment
    #[arg(long)]
    pub containers: Option<String>,
    /// Label mapping, as a YAML/JSON fragment
    #[arg(long)]
    pub labels: Option<String>,
}

#[derive(Debug)]
pub struct PodTask {
    pub state: DesiredState,
    pub name: String,
    pub namespace: String,
    pub descriptor: PodDescriptor,
}

impl PodArgs {
    pub fn validate(self) -> Result<PodTask> {
        let state = self.state.parse()?;
        let containers = match &self.containers {
            Some(fragment) => parse_value_list("containers", fragment)?,
            None => Vec::new(),
        };
        let labels = parse_str_map("labels", self.labels.as_deref())?;
        Ok(PodTask {
            state,
            name: self.name,
            namespace: self.namespace,
            descriptor: PodDescriptor::from_params(&containers, labels)?,
        })
    }
}

#[derive(Debug, Args)]
pub struct ReplicationControllerArgs {
    /// Name that will be given to the replication controller
    #[arg(long)]
    pub name: String,
    /// Desired state of the resource
    #[arg(long, default_value = "present")]
    pub state: String,
    /// Namespace the controller lives in
    #[arg(long, default_value = "default")]
    pub namespace: String,
    /// Container list, as a YAML/JSON fragment
    #[arg(long)]
    pub containers: Option<String>,
    /// Label mapping, as a YAML/JSON fragment
    #[arg(long)]
    pub labels: Option<String>,
    /// Number of replicas to maintain
    #[arg(long, default_value_t = 1)]
    pub replicas: i32,
    /// Selector mapping, as a YAML/JSON fragment
    #[arg(long)]
    pub selector: Option<String>,
}

#[derive(Debug)]
pub struct ReplicationControllerTask {
    pub state: DesiredState,
    pub name: String,
    pub namespace: String,
    pub descriptor: ReplicationControllerDescriptor,
}

impl ReplicationControllerArgs {
    pub fn validate(self) -> Result<ReplicationControllerTask> {
        let state = self.state.parse()?;
        let containers = match &self.containers {
            Some(fragment) => parse_value_list("containers", fragment)?,
            None => Vec::new(),
        };
        let labels = parse_str_map("labels", self.labels.as_deref())?;
        let selector = parse_str_map("selector", self.selector.as_deref())?;
        Ok(ReplicationControllerTask {
            state,
            name: self.name,
            namespace: self.namespace,
            descriptor: ReplicationControllerDescriptor::from_params(
                &containers,
                labels,
                self.replicas,
                selector,
            )?,
        })
    }
}

#[derive(Debug, Args)]
pub struct ServiceArgs {
    /// Name that will be given to the service
    #[arg(long)]
    pub name: String,
    /// Desired state of the resource
    #[arg(long, default_value = "present")]
    pub state: String,
    /// Namespace the service lives in
    #[arg(long, default_value = "default")]
    pub namespace: String,
    /// Selector mapping, as a YAML/JSON fragment
    #[arg(long)]
    pub selector: Option<String>,
    /// Port list, as a YAML/JSON fragment
    #[arg(long)]
    pub ports: Option<String>,
}

#[derive(Debug)]
pub struct ServiceTask {
    pub state: DesiredState,
    pub name: String,
    pub namespace: String,
    pub descriptor: ServiceDescriptor,
}

impl ServiceArgs {
    pub fn validate(self) -> Result<ServiceTask> {
        let state = self.state.parse()?;
        let ports = match &self.ports {
            Some(fragment) => parse_value_list("ports", fragment)?,
            None => Vec::new(),
        };
        let selector = parse_str_map("selector", self.selector.as_deref())?;
        Ok(ServiceTask {
            state,
            name: self.name,
            namespace: self.namespace,
            descriptor: ServiceDescriptor::from_params(&ports, selector)?,
        })
    }
}

fn split_csv(csv: &str) -> Result<Vec<String>> {
    let items: Vec<String> = csv
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        return Err(Error::Validation(
            "expected a comma-separated list of names".to_string(),
        ));
    }
    Ok(items)
}

fn parse_value_list(field: &str, fragment: &str) -> Result<Vec<Value>> {
    serde_yaml_ng::from_str(fragment).map_err(|e| Error::Validation(format!("bad {field}: {e}")))
}

fn parse_str_map(field: &str, fragment: Option<&str>) -> Result<BTreeMap<String, String>> {
    match fragment {
        Some(fragment) => serde_yaml_ng::from_str(fragment)
            .map_err(|e| Error::Validation(format!("bad {field}: {e}"))),
        None => Ok(BTreeMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> InstanceArgs {
        InstanceArgs {
            connection: ComputeConnection {
                endpoint: "https://compute.example.com/v1".to_string(),
                project: "p".to_string(),
                token_file: None,
            },
            name: Some("foo".to_string()),
            instance_names: None,
            state: "present".to_string(),
            image: "debian-7".to_string(),
            machine_type: "n1-standard-1".to_string(),
            zone: "us-central1-a".to_string(),
            network: "default".to_string(),
            metadata: None,
            tags: None,
            disks: None,
            boot_disk: None,
            boot_disk_size: None,
            boot_disk_type: None,
            boot_disk_auto_delete: None,
            boot_disk_use_existing: None,
            ip_forward: false,
            external_ip: None,
            count: None,
        }
    }

    #[test]
    fn name_and_instance_names_are_mutually_exclusive() {
        let err = InstanceArgs {
            instance_names: Some("foo,bar".to_string()),
            ..base()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn one_of_name_or_instance_names_is_required() {
        let err = InstanceArgs {
            name: None,
            ..base()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn instance_names_csv_is_trimmed_and_ordered() {
        let task = InstanceArgs {
            name: None,
            instance_names: Some(" foo, bar,baz ".to_string()),
            ..base()
        }
        .validate()
        .unwrap();
        assert_eq!(
            task.target,
            Target::Many(vec![
                "foo".to_string(),
                "bar".to_string(),
                "baz".to_string()
            ])
        );
    }

    #[test]
    fn disks_conflict_with_boot_disk_options() {
        let err = InstanceArgs {
            disks: Some("[disk1]".to_string()),
            boot_disk: Some("my-boot".to_string()),
            ..base()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn count_is_a_loud_stub() {
        let err = InstanceArgs {
            count: Some(3),
            ..base()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
    }

    #[test]
    fn count_conflicts_with_instance_names() {
        let err = InstanceArgs {
            name: None,
            instance_names: Some("foo,bar".to_string()),
            count: Some(3),
            ..base()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn bad_metadata_fails_validation_before_any_remote_call() {
        let err = InstanceArgs {
            metadata: Some("not-a-dict".to_string()),
            ..base()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn boot_disk_defaults_apply() {
        let task = base().validate().unwrap();
        assert_eq!(task.params.boot_disk_type, "pd-standard");
        assert!(task.params.boot_disk_auto_delete);
        assert!(task.params.boot_disk_use_existing);
        assert_eq!(task.params.external_ip, ExternalIp::Ephemeral);
    }

    #[test]
    fn pod_containers_parse_from_a_yaml_fragment() {
        let task = PodArgs {
            name: "nginx".to_string(),
            state: "present".to_string(),
            namespace: "default".to_string(),
            containers: Some(
                "- name: nginx\n  image: nginx\n  ports:\n  - containerPort: 8080".to_string(),
            ),
            labels: Some("app: frontend".to_string()),
        }
        .validate()
        .unwrap();
        assert_eq!(task.descriptor.containers.len(), 1);
        assert_eq!(
            task.descriptor.labels.get("app").map(String::as_str),
            Some("frontend")
        );
    }
}
