//! A minimal client for the two Cloud SQL Admin API operations the connector
//! needs: reading an instance's connect settings and minting an ephemeral
//! client certificate.
//!
//! The [`ApiClient`] wraps an arbitrary HTTP [`Service`] so the transport can
//! be swapped out (and mocked in tests); [`ApiClient::https`] builds the
//! production hyper stack.
use bytes::Bytes;
use futures::future::BoxFuture;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Full};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower::{buffer::Buffer, util::BoxService, BoxError, Layer, Service, ServiceExt};
use tower_http::map_response_body::MapResponseBodyLayer;

use crate::{
    config::ConnectorConfig,
    error::Error,
    instance::InstanceName,
    Result,
};

const DEFAULT_ROOT_URL: &str = "https://sqladmin.googleapis.com/";
const DEFAULT_SERVICE_PATH: &str = "sql/v1beta4/";
const USER_AGENT: &str = concat!("cloud-sql-connector/", env!("CARGO_PKG_VERSION"));

pub(crate) const CONNECT_SETTINGS_CONTEXT: &str = "Failed to fetch instance metadata";
pub(crate) const EPHEMERAL_CERT_CONTEXT: &str = "Failed to create ephemeral certificate";

type RequestBody = Full<Bytes>;
type ResponseBody = UnsyncBoxBody<Bytes, BoxError>;
type ServiceFuture = BoxFuture<'static, Result<Response<ResponseBody>, BoxError>>;

/// Cloud SQL Admin API client.
///
/// Cheap to clone and safe for concurrent use; all clones share one buffered
/// service. Must be constructed inside a tokio runtime.
#[derive(Clone)]
pub struct ApiClient {
    inner: Buffer<Request<RequestBody>, ServiceFuture>,
    base: String,
}

impl ApiClient {
    /// Wrap a custom HTTP `Service` stack.
    ///
    /// The service sees fully-formed requests with absolute URIs; anything
    /// that speaks `http` works, including a `tower_test` mock.
    pub fn new<S, B>(service: S, config: &ConnectorConfig) -> Self
    where
        S: Service<Request<RequestBody>, Response = Response<B>> + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Into<BoxError>,
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        // Erase the response body and error types so transports are
        // interchangeable behind one service type.
        let service = MapResponseBodyLayer::new(|body: B| body.map_err(Into::into).boxed_unsync())
            .layer(service)
            .map_err(Into::into);
        Self {
            inner: Buffer::new(BoxService::new(service), 1024),
            base: api_base(config),
        }
    }

    /// Build a client over HTTPS with the platform trust roots.
    pub fn https(config: &ConnectorConfig) -> Result<Self> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(Error::NativeRoots)?
            .https_only()
            .enable_http1()
            .build();
        let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
            .build(connector);
        Ok(Self::new(client, config))
    }

    /// `GET projects/{project}/instances/{instance}/connectSettings`
    pub async fn get_connect_settings(&self, instance: &InstanceName) -> Result<ConnectSettings> {
        let uri = format!(
            "{}projects/{}/instances/{}/connectSettings",
            self.base,
            instance.project(),
            instance.instance(),
        );
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::USER_AGENT, USER_AGENT)
            .body(RequestBody::from(Bytes::new()))
            .map_err(Error::BuildRequest)?;
        self.request(request, instance, CONNECT_SETTINGS_CONTEXT).await
    }

    /// `POST projects/{project}/instances/{instance}:generateEphemeralCert`
    pub async fn generate_ephemeral_cert(
        &self,
        instance: &InstanceName,
        body: &GenerateEphemeralCertRequest,
    ) -> Result<GenerateEphemeralCertResponse> {
        let uri = format!(
            "{}projects/{}/instances/{}:generateEphemeralCert",
            self.base,
            instance.project(),
            instance.instance(),
        );
        let payload = serde_json::to_vec(body).map_err(Error::Serde)?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, USER_AGENT)
            .body(RequestBody::from(payload))
            .map_err(Error::BuildRequest)?;
        self.request(request, instance, EPHEMERAL_CERT_CONTEXT).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        request: Request<RequestBody>,
        instance: &InstanceName,
        context: &'static str,
    ) -> Result<T> {
        let response = self
            .send(request)
            .await
            .map_err(|cause| Error::Transport { context, cause })?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|cause| Error::Transport { context, cause })?
            .to_bytes();
        if !status.is_success() {
            return Err(api_error(status, &body, instance, context));
        }
        serde_json::from_slice(&body).map_err(Error::Serde)
    }

    async fn send(&self, request: Request<RequestBody>) -> Result<Response<ResponseBody>, BoxError> {
        let mut service = self.inner.clone();
        service.ready().await?.call(request).await
    }
}

/// Effective API base: configured root + service path, slash-normalized.
fn api_base(config: &ConnectorConfig) -> String {
    let root = config.admin_root_url().unwrap_or(DEFAULT_ROOT_URL);
    let path = config
        .admin_service_path()
        .unwrap_or(DEFAULT_SERVICE_PATH)
        .trim_matches('/');
    let mut base = String::with_capacity(root.len() + path.len() + 2);
    base.push_str(root.trim_end_matches('/'));
    base.push('/');
    if !path.is_empty() {
        base.push_str(path);
        base.push('/');
    }
    base
}

/// Map a non-2xx Admin API response onto the connector error taxonomy.
///
/// The interesting reasons are `accessNotConfigured` (API never enabled for
/// the project) and `notAuthorized` (instance hidden from the caller); both
/// deserve actionable messages. Everything else keeps the operation's
/// fallback description and is assumed retryable.
fn api_error(
    status: StatusCode,
    body: &[u8],
    instance: &InstanceName,
    context: &'static str,
) -> Error {
    let detail = serde_json::from_slice::<ApiErrorBody>(body)
        .ok()
        .and_then(|body| body.error)
        .unwrap_or_default();
    let reason = detail
        .errors
        .iter()
        .find_map(|item| item.reason.as_deref());
    match reason {
        Some("accessNotConfigured") => Error::ApiNotEnabled {
            project: instance.project().to_owned(),
        },
        Some("notAuthorized") => Error::NotAuthorized {
            project: instance.project().to_owned(),
            instance: instance.to_string(),
        },
        _ => Error::Api {
            context,
            status,
            message: detail
                .message
                .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned()),
        },
    }
}

/// Instance attributes returned by `connectSettings`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectSettings {
    /// Region the instance actually lives in.
    pub region: String,
    /// Backend generation, `"SECOND_GEN"` for supported instances.
    pub backend_type: String,
    /// Database engine and version, e.g. `"POSTGRES_14"`.
    pub database_version: String,
    /// Assigned addresses by type.
    pub ip_addresses: Vec<IpMapping>,
    /// DNS name of the Private Service Connect endpoint, if configured.
    pub dns_name: Option<String>,
    /// The instance's server CA certificate.
    pub server_ca_cert: Option<SslCert>,
}

/// One assigned address.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpMapping {
    /// Address type as reported by the API, e.g. `"PRIMARY"` or `"PRIVATE"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The address itself.
    pub ip_address: Option<String>,
}

/// A PEM certificate as the Admin API wraps it.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SslCert {
    /// PEM-encoded X.509 certificate.
    pub cert: String,
}

/// Request body for `generateEphemeralCert`.
#[derive(Clone, Debug, Serialize)]
pub struct GenerateEphemeralCertRequest {
    /// Public key to sign, in the connector's PEM envelope.
    pub public_key: String,
    /// OAuth2 access token; present only under IAM authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// Response body of `generateEphemeralCert`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateEphemeralCertResponse {
    /// The minted certificate.
    pub ephemeral_cert: Option<SslCert>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct ApiErrorDetail {
    message: Option<String>,
    errors: Vec<ApiErrorItem>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct ApiErrorItem {
    reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn config_with(root: Option<&str>, path: Option<&str>) -> ConnectorConfig {
        let mut builder = ConnectorConfig::builder();
        if let Some(root) = root {
            builder = builder.admin_root_url(root);
        }
        if let Some(path) = path {
            builder = builder.admin_service_path(path);
        }
        builder.build().unwrap()
    }

    #[test]
    fn api_base_defaults() {
        assert_eq!(
            api_base(&config_with(None, None)),
            "https://sqladmin.googleapis.com/sql/v1beta4/"
        );
    }

    #[test]
    fn api_base_normalizes_slashes() {
        assert_eq!(
            api_base(&config_with(Some("https://example.invalid"), Some("/sql/v1/"))),
            "https://example.invalid/sql/v1/"
        );
        assert_eq!(
            api_base(&config_with(Some("https://example.invalid/"), Some(""))),
            "https://example.invalid/"
        );
    }

    #[test]
    fn ephemeral_cert_request_omits_absent_token() {
        let body = GenerateEphemeralCertRequest {
            public_key: "PEM".into(),
            access_token: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"public_key": "PEM"})
        );

        let body = GenerateEphemeralCertRequest {
            public_key: "PEM".into(),
            access_token: Some("tok".into()),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"public_key": "PEM", "access_token": "tok"})
        );
    }

    #[test]
    fn api_error_maps_known_reasons() {
        let instance: InstanceName = "myproj:us-central1:db".parse().unwrap();
        let body = serde_json::to_vec(&serde_json::json!({
            "error": {
                "code": 403,
                "message": "Access Not Configured",
                "errors": [{"domain": "usageLimits", "reason": "accessNotConfigured"}]
            }
        }))
        .unwrap();
        let err = api_error(StatusCode::FORBIDDEN, &body, &instance, EPHEMERAL_CERT_CONTEXT);
        assert_eq!(err.kind(), ErrorKind::ApiDisabled);
        assert!(err
            .to_string()
            .contains("https://console.cloud.google.com/apis/api/sqladmin/overview?project=myproj"));

        let body = serde_json::to_vec(&serde_json::json!({
            "error": {"errors": [{"reason": "notAuthorized"}]}
        }))
        .unwrap();
        let err = api_error(StatusCode::FORBIDDEN, &body, &instance, EPHEMERAL_CERT_CONTEXT);
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        let message = err.to_string();
        assert!(message.contains("myproj"));
        assert!(message.contains("may not exist"));
    }

    #[test]
    fn api_error_falls_back_to_transient() {
        let instance: InstanceName = "myproj:us-central1:db".parse().unwrap();
        let err = api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            b"backend exploded",
            &instance,
            CONNECT_SETTINGS_CONTEXT,
        );
        assert_eq!(err.kind(), ErrorKind::Transient);
        let message = err.to_string();
        assert!(message.contains(CONNECT_SETTINGS_CONTEXT));
        assert!(message.contains("backend exploded"));
    }
}
