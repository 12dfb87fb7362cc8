//! Connector configuration.
//!
//! A [`ConnectorConfig`] is built once, validated, and then shared immutably
//! by every connection to the same target. It carries the impersonation and
//! Admin API overrides consumed by the outer connector, and at most one
//! source of Google credentials.
use std::{
    fmt,
    hash::{Hash, Hasher},
    path::PathBuf,
    sync::Arc,
};

use secrecy::{ExposeSecret, SecretString};
use tower::BoxError;

use crate::error::Error;

/// Raw credential material, usually a service account key in JSON form.
///
/// The connector never interprets it; it is handed to whichever token
/// machinery the caller wires up.
#[derive(Clone)]
pub struct Credentials {
    json: SecretString,
}

impl Credentials {
    /// Wrap credential material held in memory.
    pub fn from_json(json: impl Into<String>) -> Self {
        Self {
            json: SecretString::from(json.into()),
        }
    }

    /// The raw material. Handle with care.
    pub fn expose_json(&self) -> &str {
        self.json.expose_secret()
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.json.expose_secret() == other.json.expose_secret()
    }
}

impl Eq for Credentials {}

impl Hash for Credentials {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.json.expose_secret().hash(state);
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

/// Produces credentials on demand, for callers that derive or rotate them.
pub trait CredentialsSupplier: Send + Sync {
    /// Produce the current credentials.
    fn credentials(&self) -> Result<Credentials, BoxError>;
}

/// Where the connector obtains its Google credentials.
#[derive(Clone)]
pub enum CredentialSource {
    /// Read a service account key file from this path.
    Path(PathBuf),
    /// Use credentials already held in memory.
    Value(Credentials),
    /// Call the supplier whenever credentials are needed.
    Supplier(Arc<dyn CredentialsSupplier>),
}

impl PartialEq for CredentialSource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CredentialSource::Path(a), CredentialSource::Path(b)) => a == b,
            (CredentialSource::Value(a), CredentialSource::Value(b)) => a == b,
            // Suppliers are interchangeable only when they are the same object;
            // behavioral equivalence of two closures is undecidable.
            (CredentialSource::Supplier(a), CredentialSource::Supplier(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for CredentialSource {}

impl Hash for CredentialSource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            CredentialSource::Path(path) => {
                state.write_u8(0);
                path.hash(state);
            }
            CredentialSource::Value(credentials) => {
                state.write_u8(1);
                credentials.hash(state);
            }
            CredentialSource::Supplier(supplier) => {
                state.write_u8(2);
                (Arc::as_ptr(supplier) as *const () as usize).hash(state);
            }
        }
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            CredentialSource::Value(credentials) => {
                f.debug_tuple("Value").field(credentials).finish()
            }
            CredentialSource::Supplier(_) => f.write_str("Supplier(..)"),
        }
    }
}

/// Immutable connector configuration.
///
/// Equality and hashing are structural across every field, so a config can
/// key a cache of connectors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ConnectorConfig {
    target_principal: Option<String>,
    delegates: Vec<String>,
    admin_root_url: Option<String>,
    admin_service_path: Option<String>,
    credentials: Option<CredentialSource>,
}

impl ConnectorConfig {
    /// Start building a config.
    pub fn builder() -> ConnectorConfigBuilder {
        ConnectorConfigBuilder::default()
    }

    /// Service account to impersonate for API calls, if any.
    pub fn target_principal(&self) -> Option<&str> {
        self.target_principal.as_deref()
    }

    /// Chain of delegates for impersonation, in delegation order.
    pub fn delegates(&self) -> &[String] {
        &self.delegates
    }

    /// Override for the Admin API root URL.
    pub fn admin_root_url(&self) -> Option<&str> {
        self.admin_root_url.as_deref()
    }

    /// Override for the Admin API service path.
    pub fn admin_service_path(&self) -> Option<&str> {
        self.admin_service_path.as_deref()
    }

    /// The configured credential source, if any.
    pub fn credentials(&self) -> Option<&CredentialSource> {
        self.credentials.as_ref()
    }
}

/// Builder for [`ConnectorConfig`].
///
/// The three credential setters are mutually exclusive; [`build`] fails if
/// more than one was called.
///
/// [`build`]: ConnectorConfigBuilder::build
#[derive(Default)]
pub struct ConnectorConfigBuilder {
    target_principal: Option<String>,
    delegates: Vec<String>,
    admin_root_url: Option<String>,
    admin_service_path: Option<String>,
    credentials_path: Option<PathBuf>,
    credentials: Option<Credentials>,
    credentials_supplier: Option<Arc<dyn CredentialsSupplier>>,
}

impl ConnectorConfigBuilder {
    /// Impersonate this service account.
    pub fn target_principal(mut self, principal: impl Into<String>) -> Self {
        self.target_principal = Some(principal.into());
        self
    }

    /// Delegation chain for impersonation.
    pub fn delegates(mut self, delegates: Vec<String>) -> Self {
        self.delegates = delegates;
        self
    }

    /// Point the connector at a different Admin API deployment.
    pub fn admin_root_url(mut self, url: impl Into<String>) -> Self {
        self.admin_root_url = Some(url.into());
        self
    }

    /// Override the Admin API service path.
    pub fn admin_service_path(mut self, path: impl Into<String>) -> Self {
        self.admin_service_path = Some(path.into());
        self
    }

    /// Load credentials from a service account key file.
    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    /// Use credentials already held in memory.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Obtain credentials from a supplier on every refresh.
    pub fn credentials_supplier(mut self, supplier: Arc<dyn CredentialsSupplier>) -> Self {
        self.credentials_supplier = Some(supplier);
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<ConnectorConfig, Error> {
        let sources = usize::from(self.credentials_path.is_some())
            + usize::from(self.credentials.is_some())
            + usize::from(self.credentials_supplier.is_some());
        if sources > 1 {
            return Err(Error::MultipleCredentialSources);
        }
        let credentials = self
            .credentials_path
            .map(CredentialSource::Path)
            .or(self.credentials.map(CredentialSource::Value))
            .or(self.credentials_supplier.map(CredentialSource::Supplier));
        Ok(ConnectorConfig {
            target_principal: self.target_principal,
            delegates: self.delegates,
            admin_root_url: self.admin_root_url,
            admin_service_path: self.admin_service_path,
            credentials,
        })
    }
}
