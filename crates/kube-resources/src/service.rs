use std::collections::BTreeMap;

use converge::{Error, Result, engine::Gateway};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use kube::{
    Api, Client,
    api::{DeleteParams, ObjectMeta, PostParams},
};
use serde::Serialize;
use serde_json::Value;

use crate::{ignore_absent, map_kube_err};

/// Desired service shape: selector plus port list.
#[derive(Debug, Clone, Default)]
pub struct ServiceDescriptor {
    pub selector: BTreeMap<String, String>,
    pub ports: Vec<ServicePort>,
}

impl ServiceDescriptor {
    pub fn from_params(ports: &[Value], selector: BTreeMap<String, String>) -> Result<Self> {
        let ports = ports
            .iter()
            .map(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| Error::Validation(format!("bad port entry: {e}")))
            })
            .collect::<Result<Vec<ServicePort>>>()?;
        Ok(ServiceDescriptor { selector, ports })
    }
}

pub struct ServiceGateway {
    api: Api<Service>,
}

impl ServiceGateway {
    pub fn new(client: Client, namespace: &str) -> Self {
        ServiceGateway {
            api: Api::namespaced(client, namespace),
        }
    }
}

impl Gateway for ServiceGateway {
    type Descriptor = ServiceDescriptor;
    type Resource = Service;

    fn kind(&self) -> &'static str {
        "service"
    }

    async fn fetch(&self, name: &str) -> Result<Option<Service>> {
        self.api
            .get_opt(name)
            .await
            .map_err(|e| map_kube_err("service", name, e))
    }

    async fn create(&self, name: &str, descriptor: &ServiceDescriptor) -> Result<Service> {
        self.api
            .create(&PostParams::default(), &build_service(name, descriptor))
            .await
            .map_err(|e| map_kube_err("service", name, e))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        ignore_absent(
            self.api.delete(name, &DeleteParams::default()).await,
            "service",
            name,
        )
    }
}

fn build_service(name: &str, descriptor: &ServiceDescriptor) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: (!descriptor.selector.is_empty()).then(|| descriptor.selector.clone()),
            ports: (!descriptor.ports.is_empty()).then(|| descriptor.ports.clone()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: Option<String>,
    pub cluster_ip: Option<String>,
    pub ports: Vec<i32>,
    pub selector: BTreeMap<String, String>,
}

pub fn service_info(service: &Service) -> ServiceInfo {
    let spec = service.spec.as_ref();
    ServiceInfo {
        name: service.metadata.name.clone(),
        cluster_ip: spec.and_then(|s| s.cluster_ip.clone()),
        ports: spec
            .and_then(|s| s.ports.as_ref())
            .map(|ports| ports.iter().map(|p| p.port).collect())
            .unwrap_or_default(),
        selector: spec.and_then(|s| s.selector.clone()).unwrap_or_default(),
    }
}
