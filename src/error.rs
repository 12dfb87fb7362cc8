//! Error handling for the connector.
use http::StatusCode;
use thiserror::Error;
use tower::BoxError;

use crate::instance::InstanceName;

/// Possible errors when refreshing connection info for an instance.
///
/// Errors surfaced by [`Connector::connection_info`][crate::Connector::connection_info]
/// are wrapped in [`Error::Instance`] so the message carries the
/// `[project:region:instance]` prefix of the instance they pertain to.
#[derive(Error, Debug)]
pub enum Error {
    /// The connection name was not a `project:region:instance` triple
    #[error("invalid instance connection name \"{0}\", expected <PROJECT>:<REGION>:<INSTANCE>")]
    MalformedInstanceName(String),

    /// The Admin API reported the instance under a different region
    #[error("the region \"{got}\" reported by the Admin API does not match the region \"{want}\" of the connection name")]
    RegionMismatch {
        /// Region from the connection name
        want: String,
        /// Region from the Admin API response
        got: String,
    },

    /// More than one credential source was configured
    #[error("at most one of a credentials file path, in-memory credentials, or a credentials supplier may be configured")]
    MultipleCredentialSources,

    /// The instance is not a second generation instance
    #[error("unsupported backend type \"{0}\", only second generation instances are supported")]
    UnsupportedBackend(String),

    /// IAM authentication was requested against a SQL Server instance
    #[error("IAM Authentication is not supported for SQL Server instances ({0})")]
    IamSqlServer(String),

    /// The TLS provider cannot negotiate TLS 1.3, which IAM requires
    #[error("TLSv1.3 is required for IAM authentication")]
    IamRequiresTls13,

    /// IAM authentication without an access token
    #[error("IAM authentication was requested, but the token source did not produce an access token")]
    MissingAccessToken,

    /// The token source itself failed
    #[error("failed to fetch an access token: {0}")]
    TokenSource(BoxError),

    /// The instance has no usable endpoint
    #[error("instance does not have an assigned IP address")]
    NoIpAddresses,

    /// A certificate from the Admin API could not be parsed
    #[error("invalid certificate: {0}")]
    CertificateParse(String),

    /// The caller is not allowed to see the instance
    #[error("the instance \"{instance}\" may not exist, or the account may be missing the Cloud SQL Admin API permission for project \"{project}\"")]
    NotAuthorized {
        /// Project from the connection name
        project: String,
        /// Full connection name
        instance: String,
    },

    /// The Admin API has not been enabled for the project
    #[error("the Cloud SQL Admin API is not enabled for project \"{project}\": visit https://console.cloud.google.com/apis/api/sqladmin/overview?project={project} to enable it, then retry")]
    ApiNotEnabled {
        /// Project from the connection name
        project: String,
    },

    /// The Admin API answered with an error the connector has no mapping for
    #[error("{context}: HTTP status {status}: {message}")]
    Api {
        /// What the connector was doing
        context: &'static str,
        /// HTTP status of the response
        status: StatusCode,
        /// Error message from the response body
        message: String,
    },

    /// The HTTP exchange itself failed
    #[error("{context}: {cause}")]
    Transport {
        /// What the connector was doing
        context: &'static str,
        /// Underlying transport error
        cause: BoxError,
    },

    /// An Admin API payload could not be serialized or deserialized
    #[error("failed to decode Admin API payload: {0}")]
    Serde(#[source] serde_json::Error),

    /// Error building a request
    #[error("failed to build request: {0}")]
    BuildRequest(#[source] http::Error),

    /// The TLS configuration rejected the key material
    #[error("failed to configure TLS: {0}")]
    Tls(#[source] rustls::Error),

    /// No valid native root CA certificates found
    #[error("no valid native root CA certificates found: {0}")]
    NativeRoots(#[source] std::io::Error),

    /// The refresh cycle was cancelled before it completed
    #[error("operation was cancelled")]
    Cancelled,

    /// Any other error, scoped to the instance it pertains to
    #[error("[{instance}] {source}")]
    Instance {
        /// Canonical connection name
        instance: String,
        /// The underlying error
        #[source]
        source: Box<Error>,
    },
}

/// Coarse classification of an [`Error`], independent of the concrete variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A caller-supplied value was rejected
    InvalidArgument,
    /// The instance or environment cannot support the requested mode
    Unsupported,
    /// Authentication material was required but missing
    AuthRequired,
    /// The instance has nothing to connect to
    NotAvailable,
    /// Certificate material failed to parse or was rejected
    CertificateInvalid,
    /// The caller lacks permission on the instance
    AccessDenied,
    /// The Admin API is disabled for the project
    ApiDisabled,
    /// A transient transport or serialization failure; retrying may help
    Transient,
    /// The operation was cancelled
    Cancelled,
}

impl Error {
    /// Classify this error. [`Error::Instance`] wrappers are transparent.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedInstanceName(_)
            | Error::RegionMismatch { .. }
            | Error::MultipleCredentialSources => ErrorKind::InvalidArgument,
            Error::UnsupportedBackend(_) | Error::IamSqlServer(_) | Error::IamRequiresTls13 => {
                ErrorKind::Unsupported
            }
            Error::MissingAccessToken => ErrorKind::AuthRequired,
            Error::NoIpAddresses => ErrorKind::NotAvailable,
            Error::CertificateParse(_) | Error::Tls(_) => ErrorKind::CertificateInvalid,
            Error::NotAuthorized { .. } => ErrorKind::AccessDenied,
            Error::ApiNotEnabled { .. } => ErrorKind::ApiDisabled,
            Error::TokenSource(_)
            | Error::Api { .. }
            | Error::Transport { .. }
            | Error::Serde(_)
            | Error::BuildRequest(_)
            | Error::NativeRoots(_) => ErrorKind::Transient,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Instance { source, .. } => source.kind(),
        }
    }

    /// Scope this error to an instance, adding the diagnostic prefix.
    /// Already-scoped errors are left untouched.
    pub(crate) fn for_instance(self, instance: &InstanceName) -> Self {
        match self {
            Error::Instance { .. } => self,
            source => Error::Instance {
                instance: instance.to_string(),
                source: Box::new(source),
            },
        }
    }
}
