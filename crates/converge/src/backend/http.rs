//! Kubernetes REST API backend.
//!
//! A blocking client over `ureq`. Connection parameters are taken as given;
//! there is no kubeconfig loading and no local retry.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use ureq::tls::{Certificate, ClientCert, PrivateKey, RootCerts, TlsConfig};
use ureq::{Agent, Body, RequestBuilder};

use crate::backend::{Backend, Operation, StatusClass, classify};
use crate::document::{ResourceDocument, ResourceRef};
use crate::error::{Error, ErrorKind, Result};

/// Default timeout for a single API call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Prefix of the environment variables that back connection parameters.
pub const ENV_PREFIX: &str = "K8S_AUTH_";

const MERGE_PATCH: &str = "application/merge-patch+json";

/// Cluster connection parameters.
///
/// `kubeconfig` and `context` are carried through for callers that resolve
/// them; this backend only uses the explicit values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionParams {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssl_ca_cert: Option<PathBuf>,
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub verify_ssl: Option<bool>,
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
    #[serde(default)]
    pub context: Option<String>,
    /// Per-call timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl ConnectionParams {
    /// Fill unset parameters from `K8S_AUTH_<NAME>` lookups.
    ///
    /// The lookup is injected so callers decide where values come from
    /// (normally the process environment).
    pub fn fill_missing(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name.to_uppercase()));

        fill(&mut self.host, || get("host"));
        fill(&mut self.api_key, || get("api_key"));
        fill(&mut self.username, || get("username"));
        fill(&mut self.password, || get("password"));
        fill(&mut self.ssl_ca_cert, || get("ssl_ca_cert").map(PathBuf::from));
        fill(&mut self.cert_file, || get("cert_file").map(PathBuf::from));
        fill(&mut self.key_file, || get("key_file").map(PathBuf::from));
        fill(&mut self.kubeconfig, || get("kubeconfig").map(PathBuf::from));
        fill(&mut self.context, || get("context"));
        fill(&mut self.verify_ssl, || get("verify_ssl").and_then(|v| parse_bool(&v)));
        fill(&mut self.timeout, || get("timeout").and_then(|v| v.parse().ok()));
    }

    /// Value for the Authorization header, if credentials were given
    pub fn authorization(&self) -> Option<String> {
        if let Some(token) = &self.api_key {
            return Some(format!("Bearer {}", token));
        }
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", user, pass));
                Some(format!("Basic {}", encoded))
            }
            _ => None,
        }
    }
}

fn fill<T>(slot: &mut Option<T>, value: impl FnOnce() -> Option<T>) {
    if slot.is_none() {
        *slot = value();
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Backend that talks to a Kubernetes API server
pub struct HttpBackend {
    agent: Agent,
    host: String,
    authorization: Option<String>,
}

impl HttpBackend {
    /// Build a backend from connection parameters.
    ///
    /// # Errors
    ///
    /// `Error::Validation` when no host is given, `Error::Io` when a
    /// certificate file cannot be read, `Error::ApiConnection` when a
    /// certificate cannot be parsed.
    pub fn new(params: &ConnectionParams) -> Result<Self> {
        let host = params
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                Error::Validation(format!(
                    "no API host given (set host or {}HOST)",
                    ENV_PREFIX
                ))
            })?
            .trim_end_matches('/')
            .to_string();

        let timeout = Duration::from_secs(params.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .tls_config(tls_config(params)?)
            .build();
        let agent = Agent::new_with_config(config);

        log::debug!("Using API server {}", host);
        Ok(Self {
            agent,
            host,
            authorization: params.authorization(),
        })
    }

    /// URL of the collection holding the resource
    fn collection_url(&self, target: &ResourceRef) -> String {
        let base = match target.api_version.split_once('/') {
            Some((group, version)) => format!("{}/apis/{}/{}", self.host, group, version),
            None => format!("{}/api/{}", self.host, target.api_version),
        };
        match &target.namespace {
            Some(ns) => format!("{}/namespaces/{}/{}", base, ns, target.plural),
            None => format!("{}/{}", base, target.plural),
        }
    }

    /// URL of the resource itself
    fn object_url(&self, target: &ResourceRef) -> String {
        format!("{}/{}", self.collection_url(target), target.name)
    }

    fn authorize<B>(&self, request: RequestBuilder<B>) -> RequestBuilder<B> {
        let request = request.header("Accept", "application/json");
        match &self.authorization {
            Some(auth) => request.header("Authorization", auth),
            None => request,
        }
    }

    /// Turn a mutation response into a document or a typed error
    fn read_mutation(
        &self,
        op: Operation,
        response: std::result::Result<ureq::http::Response<Body>, ureq::Error>,
    ) -> Result<ResourceDocument> {
        let mut response = response.map_err(transport_error)?;
        let status = response.status().as_u16();
        if let StatusClass::Failed(kind) = classify(op, status) {
            return Err(status_error(op, kind, status, &mut response));
        }
        let value: Value = response.body_mut().read_json().map_err(transport_error)?;
        ResourceDocument::from_value(value)
    }
}

impl Backend for HttpBackend {
    fn get(&self, target: &ResourceRef) -> Result<Option<ResourceDocument>> {
        let url = self.object_url(target);
        log::trace!("GET {}", url);

        let mut response = self
            .authorize(self.agent.get(&url))
            .call()
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        match classify(Operation::Get, status) {
            StatusClass::Success => {}
            StatusClass::Missing => return Ok(None),
            StatusClass::Failed(kind) => {
                return Err(status_error(Operation::Get, kind, status, &mut response));
            }
        }

        let value: Value = response.body_mut().read_json().map_err(transport_error)?;
        ResourceDocument::from_value(value).map(Some)
    }

    fn create(&self, target: &ResourceRef, doc: &ResourceDocument) -> Result<ResourceDocument> {
        let url = self.collection_url(target);
        log::trace!("POST {}", url);

        let response = self.authorize(self.agent.post(&url)).send_json(doc);
        self.read_mutation(Operation::Create, response)
    }

    fn patch(&self, target: &ResourceRef, merge_patch: &Value) -> Result<ResourceDocument> {
        let url = self.object_url(target);
        log::trace!("PATCH {}", url);

        let body = serde_json::to_string(merge_patch)?;
        let response = self
            .authorize(self.agent.patch(&url))
            .content_type(MERGE_PATCH)
            .send(body.as_str());
        self.read_mutation(Operation::Patch, response)
    }

    fn delete(&self, target: &ResourceRef) -> Result<()> {
        let url = self.object_url(target);
        log::trace!("DELETE {}", url);

        let mut response = self
            .authorize(self.agent.delete(&url))
            .call()
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        match classify(Operation::Delete, status) {
            StatusClass::Success | StatusClass::Missing => Ok(()),
            StatusClass::Failed(kind) => {
                Err(status_error(Operation::Delete, kind, status, &mut response))
            }
        }
    }
}

/// Build TLS settings from CA, client certificate and verification flags
fn tls_config(params: &ConnectionParams) -> Result<TlsConfig> {
    let mut builder = TlsConfig::builder();

    if let Some(ca) = &params.ssl_ca_cert {
        let pem = read_pem(ca)?;
        let cert = Certificate::from_pem(&pem).map_err(|e| pem_error(ca, &e))?;
        builder = builder.root_certs(RootCerts::new_with_certs(&[cert]));
    }

    match (&params.cert_file, &params.key_file) {
        (Some(cert_path), Some(key_path)) => {
            let cert_pem = read_pem(cert_path)?;
            let key_pem = read_pem(key_path)?;
            let cert = Certificate::from_pem(&cert_pem).map_err(|e| pem_error(cert_path, &e))?;
            let key = PrivateKey::from_pem(&key_pem).map_err(|e| pem_error(key_path, &e))?;
            builder = builder.client_cert(Some(ClientCert::new_with_certs(&[cert], key)));
        }
        (None, None) => {}
        _ => {
            return Err(Error::Validation(
                "cert_file and key_file must be given together".to_string(),
            ));
        }
    }

    if params.verify_ssl == Some(false) {
        log::warn!("TLS certificate verification is disabled");
        builder = builder.disable_verification(true);
    }

    Ok(builder.build())
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());
    fs::read(&expanded).map_err(|e| Error::io(expanded, e))
}

fn pem_error(path: &Path, err: &ureq::Error) -> Error {
    Error::connection(format!("invalid PEM in {}: {}", path.display(), err), None)
}

/// Transport-level failures (DNS, TLS, timeout, broken body)
fn transport_error(err: ureq::Error) -> Error {
    match err {
        ureq::Error::Timeout(_) => Error::connection(format!("request timed out: {}", err), None),
        other => Error::connection(other.to_string(), None),
    }
}

/// Build the error for a failed call, with the server's message if any
fn status_error(
    op: Operation,
    kind: ErrorKind,
    status: u16,
    response: &mut ureq::http::Response<Body>,
) -> Error {
    let body = response.body_mut().read_to_string().unwrap_or_default();
    let message = server_message(&body).unwrap_or_else(|| format!("HTTP {}", status));

    match kind {
        ErrorKind::ApiMutation => Error::mutation(op.name(), Some(status), message),
        _ => Error::connection(message, Some(status)),
    }
}

/// Extract `message` from a Kubernetes `Status` body
fn server_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(trimmed.to_string())),
        Err(_) => Some(trimmed.to_string()),
    }
}
