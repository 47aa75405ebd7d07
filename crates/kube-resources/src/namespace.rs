use converge::{Result, engine::Gateway};
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    Api, Client,
    api::{DeleteParams, ObjectMeta, PostParams},
};
use serde::Serialize;

use crate::{ignore_absent, map_kube_err};

/// Namespaces carry no desired attributes beyond their name.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamespaceDescriptor;

pub struct NamespaceGateway {
    api: Api<Namespace>,
}

impl NamespaceGateway {
    pub fn new(client: Client) -> Self {
        NamespaceGateway {
            api: Api::all(client),
        }
    }
}

impl Gateway for NamespaceGateway {
    type Descriptor = NamespaceDescriptor;
    type Resource = Namespace;

    fn kind(&self) -> &'static str {
        "namespace"
    }

    async fn fetch(&self, name: &str) -> Result<Option<Namespace>> {
        self.api
            .get_opt(name)
            .await
            .map_err(|e| map_kube_err("namespace", name, e))
    }

    async fn create(&self, name: &str, _descriptor: &NamespaceDescriptor) -> Result<Namespace> {
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.api
            .create(&PostParams::default(), &namespace)
            .await
            .map_err(|e| map_kube_err("namespace", name, e))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        ignore_absent(
            self.api.delete(name, &DeleteParams::default()).await,
            "namespace",
            name,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct NamespaceInfo {
    pub name: Option<String>,
    pub phase: Option<String>,
}

pub fn namespace_info(namespace: &Namespace) -> NamespaceInfo {
    NamespaceInfo {
        name: namespace.metadata.name.clone(),
        phase: namespace.status.as_ref().and_then(|s| s.phase.clone()),
    }
}
