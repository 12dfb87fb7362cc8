//! Access tokens and the token source abstraction.
//!
//! Under IAM authentication the connector submits an OAuth2 access token with
//! the ephemeral certificate request, and the token's expiry bounds how long
//! the resulting connection info may be used. Under password authentication
//! no token is involved and the source yields nothing.
use std::fmt;

use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt};
use secrecy::{ExposeSecret, SecretString};
use tower::BoxError;

/// How the connecting client authenticates to the database.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthType {
    /// Built-in database credentials, supplied by the driver out of band.
    Password,
    /// A Google identity, presented to the database as an OAuth2 token.
    Iam,
}

/// An OAuth2 access token and, when known, the instant it stops working.
#[derive(Clone, Debug)]
pub struct AccessToken {
    value: SecretString,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Wrap a token value minted elsewhere.
    pub fn new(value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: SecretString::from(value.into()),
            expires_at,
        }
    }

    /// When the token expires, if the issuer said.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// The token value as the Admin API accepts it.
    ///
    /// Some token sources mint values with trailing `'.'` padding which the
    /// Admin API's parser currently rejects; strip it before transmission.
    pub(crate) fn wire_value(&self) -> String {
        self.value.expose_secret().trim_end_matches('.').to_owned()
    }
}

/// Yields the current access token, if any.
///
/// Implementations are called once per refresh cycle and must be safe for
/// concurrent use. Returning `Ok(None)` is the normal answer under password
/// authentication; under IAM authentication it fails the refresh.
pub trait TokenSource: fmt::Debug + Send + Sync {
    /// Produce the current token.
    fn token(&self) -> BoxFuture<'_, Result<Option<AccessToken>, BoxError>>;
}

/// Token source that never yields a token, for password authentication.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoToken;

impl TokenSource for NoToken {
    fn token(&self) -> BoxFuture<'_, Result<Option<AccessToken>, BoxError>> {
        future::ready(Ok(None)).boxed()
    }
}

/// Token source that returns the same externally minted token on every call.
#[derive(Clone, Debug)]
pub struct StaticToken(AccessToken);

impl StaticToken {
    /// Wrap a fixed token.
    pub fn new(token: AccessToken) -> Self {
        Self(token)
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> BoxFuture<'_, Result<Option<AccessToken>, BoxError>> {
        future::ready(Ok(Some(self.0.clone()))).boxed()
    }
}
