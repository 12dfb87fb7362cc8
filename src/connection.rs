//! One refresh cycle: fetch, mint, assemble.
use std::{pin::pin, sync::Arc};

use chrono::{DateTime, Utc};
use futures::future::{self, Either};
use tokio::task::{AbortHandle, JoinError};
use tokio_util::sync::CancellationToken;

use crate::{
    auth::{AuthType, TokenSource},
    cert,
    client::ApiClient,
    error::Error,
    instance::InstanceName,
    keys::ClientKeyPair,
    metadata::{self, InstanceMetadata},
    tls, Result,
};

/// Everything a socket factory needs for one instance: endpoints, TLS
/// material, and how long both may be used.
///
/// Produced by [`Connector::connection_info`] on each refresh cycle and
/// replaced, never mutated. Connections opened before `expires_at` stay
/// valid; new connections need a fresh one.
#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    /// Validated endpoints and server CA.
    pub metadata: InstanceMetadata,
    /// Ready-to-use client TLS configuration for this instance.
    pub tls_config: Arc<rustls::ClientConfig>,
    /// Instant after which this material must not be used for new
    /// connections. Under IAM authentication this is clamped to the access
    /// token's expiry.
    pub expires_at: DateTime<Utc>,
}

/// Produces fresh [`ConnectionInfo`] on demand.
///
/// The connector holds no state beyond the shared [`ApiClient`] and a
/// shutdown flag; scheduling refreshes ahead of `expires_at` is the caller's
/// job.
#[derive(Clone)]
pub struct Connector {
    client: ApiClient,
    shutdown: CancellationToken,
}

impl Connector {
    /// Build a connector over an Admin API client.
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancel every in-flight refresh cycle, e.g. when the owning pool shuts
    /// down.
    ///
    /// Cancelled cycles fail with an error of kind
    /// [`Cancelled`](crate::ErrorKind::Cancelled), as do refreshes started
    /// after the call. Clones share the shutdown state.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Run one refresh cycle for `instance`.
    ///
    /// The token fetch and the metadata fetch run as parallel tasks; the
    /// certificate request waits for the token and runs alongside the
    /// metadata fetch; TLS assembly follows both. [`close`](Connector::close)
    /// cancels the cycle, and dropping the returned future likewise aborts
    /// whatever is still in flight (responses that already arrived are
    /// discarded).
    ///
    /// Every error is prefixed with the instance's connection name.
    pub async fn connection_info(
        &self,
        instance: &InstanceName,
        auth_type: AuthType,
        token_source: Arc<dyn TokenSource>,
        key_pair: Arc<ClientKeyPair>,
    ) -> Result<ConnectionInfo> {
        self.refresh(instance, auth_type, token_source, key_pair)
            .await
            .map_err(|err| err.for_instance(instance))
    }

    async fn refresh(
        &self,
        instance: &InstanceName,
        auth_type: AuthType,
        token_source: Arc<dyn TokenSource>,
        key_pair: Arc<ClientKeyPair>,
    ) -> Result<ConnectionInfo> {
        let token_task = tokio::spawn(async move {
            token_source.token().await.map_err(Error::TokenSource)
        });
        let _abort_token = AbortOnDrop(token_task.abort_handle());

        let metadata_task = tokio::spawn({
            let client = self.client.clone();
            let instance = instance.clone();
            async move { metadata::fetch_metadata(&client, &instance, auth_type).await }
        });
        let _abort_metadata = AbortOnDrop(metadata_task.abort_handle());

        let cert_task = tokio::spawn({
            let client = self.client.clone();
            let instance = instance.clone();
            let key_pair = Arc::clone(&key_pair);
            async move {
                let token = flatten(token_task.await)?;
                if auth_type == AuthType::Iam && token.is_none() {
                    return Err(Error::MissingAccessToken);
                }
                let token_expiry = token.as_ref().and_then(|token| token.expires_at());
                let cert =
                    cert::fetch_ephemeral_cert(&client, &key_pair, &instance, token.as_ref(), auth_type)
                        .await?;
                Ok((cert, token_expiry))
            }
        });
        let _abort_cert = AbortOnDrop(cert_task.abort_handle());

        // Let both branches finish, then surface failures in dependency
        // order: metadata first, then token/certificate. A close() wins the
        // race instead, and the guards above abort whatever is still running.
        let join = future::join(metadata_task, cert_task);
        let (metadata_result, cert_result) =
            match future::select(pin!(self.shutdown.cancelled()), pin!(join)).await {
                Either::Left(((), _)) => return Err(Error::Cancelled),
                Either::Right((results, _)) => results,
            };
        let metadata = flatten(metadata_result)?;
        let (ephemeral_cert, token_expiry) = flatten(cert_result)?;

        let tls_config = tls::assemble(&key_pair, &metadata, &ephemeral_cert, auth_type)?;

        // The certificate bounds the lifetime; under IAM the token may run
        // out first, and a connection without a live token is useless.
        let expires_at = match token_expiry {
            Some(token_expiry)
                if auth_type == AuthType::Iam && ephemeral_cert.not_after > token_expiry =>
            {
                token_expiry
            }
            _ => ephemeral_cert.not_after,
        };

        tracing::debug!(instance = %instance, %expires_at, "connection info refreshed");

        Ok(ConnectionInfo {
            metadata,
            tls_config,
            expires_at,
        })
    }
}

// The cert task can also observe a cancellation here: during close() the
// token task it awaits gets aborted out from under it.
fn flatten<T>(result: Result<Result<T>, JoinError>) -> Result<T> {
    match result {
        Ok(inner) => inner,
        Err(err) => {
            if err.is_panic() {
                std::panic::resume_unwind(err.into_panic());
            }
            Err(Error::Cancelled)
        }
    }
}

/// Aborts a task when the owning future is dropped mid-flight.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
