//! Connection mediator for Cloud SQL instances.
//!
//! Given an instance connection name (`project:region:instance`) the crate
//! asks the Cloud SQL Admin API for the instance's endpoints and server CA,
//! has the control plane sign a caller-owned key pair into a short-lived
//! client certificate, and assembles a [`rustls`] client configuration for a
//! mutually-authenticated TLS session to the database.
//!
//! The crate performs no caching and no scheduling: each call to
//! [`Connector::connection_info`] is one refresh cycle, and the returned
//! [`ConnectionInfo::expires_at`] tells the caller when to come back.
//! Connection pooling and the database sockets themselves belong to the
//! caller.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cloud_sql_connector::{
//!     ApiClient, AuthType, ClientKeyPair, Connector, ConnectorConfig, InstanceName, NoToken,
//! };
//!
//! # async fn doc(key_pair: ClientKeyPair) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConnectorConfig::builder().build()?;
//! let connector = Connector::new(ApiClient::https(&config)?);
//!
//! let instance: InstanceName = "my-project:us-central1:my-instance".parse()?;
//! let info = connector
//!     .connection_info(&instance, AuthType::Password, Arc::new(NoToken), Arc::new(key_pair))
//!     .await?;
//! for (ip_type, endpoint) in &info.metadata.ip_addresses {
//!     println!("{ip_type:?} -> {endpoint}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
mod cert;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod instance;
pub mod keys;
pub mod metadata;
mod tls;

#[cfg(test)] mod test_fixtures;

pub use crate::{
    auth::{AccessToken, AuthType, NoToken, StaticToken, TokenSource},
    client::ApiClient,
    config::{
        ConnectorConfig, ConnectorConfigBuilder, CredentialSource, Credentials,
        CredentialsSupplier,
    },
    connection::{ConnectionInfo, Connector},
    error::{Error, ErrorKind},
    instance::InstanceName,
    keys::ClientKeyPair,
    metadata::{InstanceMetadata, IpType},
};
pub use tower::BoxError;

/// Convenience alias for `Result` with the crate error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
