/// Namespace gateway
pub mod namespace;

/// Pod gateway
pub mod pod;

/// Replication controller gateway
pub mod replication_controller;

/// Service gateway
pub mod service;

use converge::{Error, Result};
use k8s_openapi::api::core::v1::Container;
use serde_json::Value;

/// Map a kube client error onto the shared taxonomy. The target's absence
/// never reaches this point (`get_opt` folds 404 into `None`); everything
/// here is fatal except the create race, which the engine recovers from.
pub(crate) fn map_kube_err(kind: &'static str, name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(resp) if resp.code == 409 => Error::AlreadyExists {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(resp) if resp.code == 403 => Error::PermissionDenied(resp.message),
        kube::Error::Api(resp) => Error::Transport(format!("{}: {}", resp.code, resp.message)),
        other => Error::Transport(other.to_string()),
    }
}

/// Deleting a resource that is already gone is a no-op, not a failure.
pub(crate) fn ignore_absent<T>(
    result: std::result::Result<T, kube::Error>,
    kind: &'static str,
    name: &str,
) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
        Err(e) => Err(map_kube_err(kind, name, e)),
    }
}

/// Parse a task's `containers` fragment (a list of container mappings) into
/// typed objects, once, at the boundary.
pub(crate) fn parse_containers(values: &[Value]) -> Result<Vec<Container>> {
    values
        .iter()
        .map(|v| {
            serde_json::from_value(v.clone())
                .map_err(|e| Error::Validation(format!("bad container entry: {e}")))
        })
        .collect()
}
