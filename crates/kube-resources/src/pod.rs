use std::collections::BTreeMap;

use converge::{Result, engine::Gateway};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use kube::{
    Api, Client,
    api::{DeleteParams, ObjectMeta, PostParams},
};
use serde::Serialize;
use serde_json::Value;

use crate::{ignore_absent, map_kube_err, parse_containers};

/// Desired pod shape: container list plus labels.
#[derive(Debug, Clone, Default)]
pub struct PodDescriptor {
    pub containers: Vec<Container>,
    pub labels: BTreeMap<String, String>,
}

impl PodDescriptor {
    pub fn from_params(containers: &[Value], labels: BTreeMap<String, String>) -> Result<Self> {
        Ok(PodDescriptor {
            containers: parse_containers(containers)?,
            labels,
        })
    }
}

pub struct PodGateway {
    api: Api<Pod>,
}

impl PodGateway {
    pub fn new(client: Client, namespace: &str) -> Self {
        PodGateway {
            api: Api::namespaced(client, namespace),
        }
    }
}

impl Gateway for PodGateway {
    type Descriptor = PodDescriptor;
    type Resource = Pod;

    fn kind(&self) -> &'static str {
        "pod"
    }

    async fn fetch(&self, name: &str) -> Result<Option<Pod>> {
        self.api
            .get_opt(name)
            .await
            .map_err(|e| map_kube_err("pod", name, e))
    }

    async fn create(&self, name: &str, descriptor: &PodDescriptor) -> Result<Pod> {
        self.api
            .create(&PostParams::default(), &build_pod(name, descriptor))
            .await
            .map_err(|e| map_kube_err("pod", name, e))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        ignore_absent(
            self.api.delete(name, &DeleteParams::default()).await,
            "pod",
            name,
        )
    }
}

fn build_pod(name: &str, descriptor: &PodDescriptor) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: (!descriptor.labels.is_empty()).then(|| descriptor.labels.clone()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: descriptor.containers.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[derive(Debug, Serialize)]
pub struct PodInfo {
    pub name: Option<String>,
    pub phase: Option<String>,
    pub pod_ip: Option<String>,
    pub host_ip: Option<String>,
    pub labels: BTreeMap<String, String>,
}

pub fn pod_info(pod: &Pod) -> PodInfo {
    let status = pod.status.as_ref();
    PodInfo {
        name: pod.metadata.name.clone(),
        phase: status.and_then(|s| s.phase.clone()),
        pod_ip: status.and_then(|s| s.pod_ip.clone()),
        host_ip: status.and_then(|s| s.host_ip.clone()),
        labels: pod.metadata.labels.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn build_carries_labels_and_containers() {
        let descriptor = PodDescriptor::from_params(
            &[json!({"name": "nginx", "image": "nginx", "ports": [{"containerPort": 8080}]})],
            BTreeMap::from([("app".to_string(), "frontend".to_string())]),
        )
        .unwrap();
        let pod = build_pod("nginx", &descriptor);

        assert_eq!(pod.metadata.name.as_deref(), Some("nginx"));
        assert_eq!(
            pod.metadata.labels.as_ref().unwrap().get("app").map(String::as_str),
            Some("frontend")
        );
        let spec = pod.spec.unwrap();
        assert_eq!(spec.containers.len(), 1);
        assert_eq!(spec.containers[0].image.as_deref(), Some("nginx"));
    }

    #[test]
    fn empty_labels_are_omitted_from_metadata() {
        let pod = build_pod("nginx", &PodDescriptor::default());
        assert!(pod.metadata.labels.is_none());
    }

    #[test]
    fn info_is_total_on_a_bare_pod() {
        let info = pod_info(&Pod::default());
        assert!(info.name.is_none());
        assert!(info.phase.is_none());
        assert!(info.labels.is_empty());
    }
}
