use std::collections::BTreeMap;

use converge::{Result, engine::Gateway};
use k8s_openapi::api::core::v1::{
    Container, PodSpec, PodTemplateSpec, ReplicationController, ReplicationControllerSpec,
};
use kube::{
    Api, Client,
    api::{DeleteParams, ObjectMeta, PostParams},
};
use serde::Serialize;
use serde_json::Value;

use crate::{ignore_absent, map_kube_err, parse_containers};

/// Desired replication controller shape. The pod template reuses the label
/// map so the selector can match what it stamps out.
#[derive(Debug, Clone)]
pub struct ReplicationControllerDescriptor {
    pub containers: Vec<Container>,
    pub labels: BTreeMap<String, String>,
    pub replicas: i32,
    pub selector: BTreeMap<String, String>,
}

impl ReplicationControllerDescriptor {
    pub fn from_params(
        containers: &[Value],
        labels: BTreeMap<String, String>,
        replicas: i32,
        selector: BTreeMap<String, String>,
    ) -> Result<Self> {
        Ok(ReplicationControllerDescriptor {
            containers: parse_containers(containers)?,
            labels,
            replicas,
            selector,
        })
    }
}

pub struct ReplicationControllerGateway {
    api: Api<ReplicationController>,
}

impl ReplicationControllerGateway {
    pub fn new(client: Client, namespace: &str) -> Self {
        ReplicationControllerGateway {
            api: Api::namespaced(client, namespace),
        }
    }
}

impl Gateway for ReplicationControllerGateway {
    type Descriptor = ReplicationControllerDescriptor;
    type Resource = ReplicationController;

    fn kind(&self) -> &'static str {
        "replication controller"
    }

    async fn fetch(&self, name: &str) -> Result<Option<ReplicationController>> {
        self.api
            .get_opt(name)
            .await
            .map_err(|e| map_kube_err("replication controller", name, e))
    }

    async fn create(
        &self,
        name: &str,
        descriptor: &ReplicationControllerDescriptor,
    ) -> Result<ReplicationController> {
        self.api
            .create(&PostParams::default(), &build_controller(name, descriptor))
            .await
            .map_err(|e| map_kube_err("replication controller", name, e))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        ignore_absent(
            self.api.delete(name, &DeleteParams::default()).await,
            "replication controller",
            name,
        )
    }
}

fn build_controller(
    name: &str,
    descriptor: &ReplicationControllerDescriptor,
) -> ReplicationController {
    ReplicationController {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: (!descriptor.labels.is_empty()).then(|| descriptor.labels.clone()),
            ..Default::default()
        },
        spec: Some(ReplicationControllerSpec {
            replicas: Some(descriptor.replicas),
            selector: (!descriptor.selector.is_empty()).then(|| descriptor.selector.clone()),
            template: Some(PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: (!descriptor.labels.is_empty()).then(|| descriptor.labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: descriptor.containers.clone(),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[derive(Debug, Serialize)]
pub struct ReplicationControllerInfo {
    pub name: Option<String>,
    pub replicas: Option<i32>,
    pub ready_replicas: Option<i32>,
    pub labels: BTreeMap<String, String>,
}

pub fn replication_controller_info(rc: &ReplicationController) -> ReplicationControllerInfo {
    ReplicationControllerInfo {
        name: rc.metadata.name.clone(),
        replicas: rc.spec.as_ref().and_then(|s| s.replicas),
        ready_replicas: rc.status.as_ref().and_then(|s| s.ready_replicas),
        labels: rc.metadata.labels.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn template_labels_match_the_selector_labels() {
        let labels = BTreeMap::from([("app".to_string(), "frontend".to_string())]);
        let descriptor = ReplicationControllerDescriptor::from_params(
            &[json!({"name": "nginx", "image": "nginx"})],
            labels.clone(),
            3,
            labels.clone(),
        )
        .unwrap();
        let rc = build_controller("nginx", &descriptor);

        let spec = rc.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.selector.as_ref(), Some(&labels));
        let template = spec.template.unwrap();
        assert_eq!(template.metadata.unwrap().labels.as_ref(), Some(&labels));
        assert_eq!(template.spec.unwrap().containers.len(), 1);
    }

    #[test]
    fn info_reads_replica_counts() {
        let descriptor = ReplicationControllerDescriptor::from_params(
            &[json!({"name": "nginx", "image": "nginx"})],
            BTreeMap::new(),
            2,
            BTreeMap::new(),
        )
        .unwrap();
        let rc = build_controller("nginx", &descriptor);
        let info = replication_controller_info(&rc);
        assert_eq!(info.name.as_deref(), Some("nginx"));
        assert_eq!(info.replicas, Some(2));
        assert_eq!(info.ready_replicas, None);
    }
}
