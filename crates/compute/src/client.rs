use converge::{Error, Result};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::api::{Disk, Image, Instance, MachineType, Network, Zone};

/// Connection parameters for one invocation. Built once at the boundary and
/// passed in explicitly; nothing is read from the environment past this
/// point.
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    /// Base URL of the compute API, e.g. `https://compute.example.com/v1`.
    pub endpoint: String,
    pub project: String,
    /// Bearer token; unauthenticated when absent (local emulators).
    pub token: Option<String>,
}

pub struct ComputeClient {
    http: reqwest::Client,
    config: ComputeConfig,
}

impl ComputeClient {
    pub fn new(config: ComputeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(ComputeClient { http, config })
    }

    pub fn project(&self) -> &str {
        &self.config.project
    }

    pub async fn get_instance(&self, zone: &str, name: &str) -> Result<Option<Instance>> {
        self.get_opt("instance", name, &format!("zones/{zone}/instances/{name}"))
            .await
    }

    /// Stores a new instance and returns its full remote representation.
    pub async fn insert_instance(&self, zone: &str, instance: &Instance) -> Result<Instance> {
        let name = instance.name.clone();
        self.post("instance", &name, &format!("zones/{zone}/instances"), instance)
            .await?;
        // The insert response is an operation handle; re-read the stored
        // resource so callers see server-assigned fields.
        self.get_instance(zone, &name)
            .await?
            .ok_or(Error::NotFound {
                kind: "instance",
                name,
            })
    }

    pub async fn delete_instance(&self, zone: &str, name: &str) -> Result<()> {
        let url = self.url(&format!("zones/{zone}/instances/{name}"));
        tracing::debug!(%url, "DELETE");
        let resp = self.send(self.http.request(Method::DELETE, &url)).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            // Deleting an absent instance is a no-op.
            return Ok(());
        }
        check("instance", name, resp).await.map(|_| ())
    }

    pub async fn get_image(&self, name: &str) -> Result<Image> {
        self.get_required("image", name, &format!("global/images/{name}"))
            .await
    }

    pub async fn get_machine_type(&self, zone: &str, name: &str) -> Result<MachineType> {
        self.get_required(
            "machine type",
            name,
            &format!("zones/{zone}/machineTypes/{name}"),
        )
        .await
    }

    pub async fn get_network(&self, name: &str) -> Result<Network> {
        self.get_required("network", name, &format!("global/networks/{name}"))
            .await
    }

    pub async fn get_zone(&self, name: &str) -> Result<Zone> {
        self.get_required("zone", name, &format!("zones/{name}")).await
    }

    pub async fn get_disk(&self, zone: &str, name: &str) -> Result<Option<Disk>> {
        self.get_opt("disk", name, &format!("zones/{zone}/disks/{name}"))
            .await
    }

    pub async fn insert_disk(&self, zone: &str, disk: &Disk) -> Result<Disk> {
        let name = disk.name.clone();
        self.post("disk", &name, &format!("zones/{zone}/disks"), disk)
            .await?;
        self.get_disk(zone, &name)
            .await?
            .ok_or(Error::NotFound { kind: "disk", name })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/projects/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.project,
            path
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let request = match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        request
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn get_opt<T: DeserializeOwned>(
        &self,
        kind: &'static str,
        name: &str,
        path: &str,
    ) -> Result<Option<T>> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let resp = self.send(self.http.request(Method::GET, &url)).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(kind, name, resp).await?;
        resp.json()
            .await
            .map(Some)
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn get_required<T: DeserializeOwned>(
        &self,
        kind: &'static str,
        name: &str,
        path: &str,
    ) -> Result<T> {
        self.get_opt(kind, name, path).await?.ok_or(Error::NotFound {
            kind,
            name: name.to_string(),
        })
    }

    async fn post<B: Serialize>(
        &self,
        kind: &'static str,
        name: &str,
        path: &str,
        body: &B,
    ) -> Result<()> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");
        let resp = self
            .send(self.http.request(Method::POST, &url).json(body))
            .await?;
        check(kind, name, resp).await.map(|_| ())
    }
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Deserialize)]
struct ApiErrorItem {
    reason: Option<String>,
}

async fn check(
    kind: &'static str,
    name: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(api_error(kind, name, status, &body))
}

/// Map a non-success response to the error taxonomy, keeping the remote
/// message verbatim.
fn api_error(kind: &'static str, name: &str, status: StatusCode, body: &str) -> Error {
    let (message, reasons) = match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => {
            let reasons: Vec<String> = envelope
                .error
                .errors
                .into_iter()
                .filter_map(|e| e.reason)
                .collect();
            (envelope.error.message, reasons)
        }
        Err(_) => (body.trim().to_string(), Vec::new()),
    };
    let message = if message.is_empty() {
        status.to_string()
    } else {
        message
    };

    match status.as_u16() {
        404 => Error::NotFound {
            kind,
            name: name.to_string(),
        },
        409 => Error::AlreadyExists {
            kind,
            name: name.to_string(),
        },
        403 => {
            let quota = reasons.iter().any(|r| r.eq_ignore_ascii_case("quotaExceeded"))
                || message.to_ascii_lowercase().contains("quota");
            if quota {
                Error::QuotaExceeded(message)
            } else {
                Error::PermissionDenied(message)
            }
        }
        code => Error::Transport(format!("{code}: {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ComputeClient {
        ComputeClient::new(ComputeConfig {
            endpoint: "https://compute.example.com/v1/".to_string(),
            project: "proj-1".to_string(),
            token: None,
        })
        .unwrap()
    }

    #[test]
    fn urls_are_rooted_at_the_project() {
        let c = client();
        assert_eq!(
            c.url("zones/us-central1-a/instances/foo"),
            "https://compute.example.com/v1/projects/proj-1/zones/us-central1-a/instances/foo"
        );
    }

    #[test]
    fn conflict_maps_to_already_exists() {
        let err = api_error("instance", "foo", StatusCode::CONFLICT, "");
        assert!(matches!(err, Error::AlreadyExists { kind: "instance", .. }));
    }

    #[test]
    fn quota_reason_maps_to_quota_exceeded() {
        let body = r#"{"error":{"message":"Quota 'CPUS' exceeded","errors":[{"reason":"quotaExceeded"}]}}"#;
        let err = api_error("instance", "foo", StatusCode::FORBIDDEN, body);
        assert!(matches!(err, Error::QuotaExceeded(_)));
    }

    #[test]
    fn plain_forbidden_maps_to_permission_denied() {
        let body = r#"{"error":{"message":"Required 'compute.instances.create' permission"}}"#;
        let err = api_error("instance", "foo", StatusCode::FORBIDDEN, body);
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[test]
    fn other_failures_carry_the_remote_message() {
        let err = api_error("instance", "foo", StatusCode::BAD_GATEWAY, "upstream sad");
        match err {
            Error::Transport(msg) => assert!(msg.contains("upstream sad")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
