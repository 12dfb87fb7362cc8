//! Assembly of the per-instance client TLS configuration.
use std::sync::Arc;

use rustls::{
    crypto::CryptoProvider, version, ClientConfig, RootCertStore, SupportedCipherSuite,
    SupportedProtocolVersion,
};

use crate::{
    auth::AuthType, cert::EphemeralCertificate, error::Error, keys::ClientKeyPair,
    metadata::InstanceMetadata, Result,
};

static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&version::TLS13];
static TLS12_ONLY: &[&SupportedProtocolVersion] = &[&version::TLS12];

/// Bind the ephemeral certificate to the caller's private key and trust
/// exactly the instance's server CA. The result is shareable across
/// connections to the same instance until the certificate expires.
pub(crate) fn assemble(
    key_pair: &ClientKeyPair,
    metadata: &InstanceMetadata,
    ephemeral_cert: &EphemeralCertificate,
    auth_type: AuthType,
) -> Result<Arc<ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let versions = protocol_versions(&provider, auth_type)?;

    let mut roots = RootCertStore::empty();
    roots
        .add(metadata.server_ca_cert.clone())
        .map_err(Error::Tls)?;

    let config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(versions)
        .map_err(Error::Tls)?
        .with_root_certificates(roots)
        .with_client_auth_cert(vec![ephemeral_cert.der.clone()], key_pair.private_key())
        .map_err(Error::Tls)?;
    Ok(Arc::new(config))
}

/// TLS 1.3 when the provider offers it. IAM authentication hands the token to
/// the database inside the session and must not run over anything older;
/// password authentication may drop to TLS 1.2.
fn protocol_versions(
    provider: &CryptoProvider,
    auth_type: AuthType,
) -> Result<&'static [&'static SupportedProtocolVersion]> {
    let has_tls13 = provider
        .cipher_suites
        .iter()
        .any(|suite| matches!(suite, SupportedCipherSuite::Tls13(_)));
    if has_tls13 {
        return Ok(TLS13_ONLY);
    }
    match auth_type {
        AuthType::Iam => Err(Error::IamRequiresTls13),
        AuthType::Password => {
            tracing::warn!("TLSv1.3 is not available, falling back to TLSv1.2");
            Ok(TLS12_ONLY)
        }
    }
}
