//! Certificate and key material for tests.
use rcgen::{CertificateParams, KeyPair, PublicKeyData};
use rustls::pki_types::PrivateKeyDer;

use crate::keys::ClientKeyPair;

/// Self-signed CA certificate PEM for connect-settings responses.
pub(crate) fn server_ca_pem() -> String {
    let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).expect("generate CA key");
    let mut params = CertificateParams::default();
    params.not_after = rcgen::date_time_ymd(2035, 1, 1);
    params.self_signed(&key).expect("self-sign CA").pem()
}

/// A client key pair plus a matching certificate expiring at midnight UTC of
/// the given date, as the control plane would mint it.
pub(crate) fn key_pair_with_cert(not_after: (i32, u8, u8)) -> (ClientKeyPair, String) {
    let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).expect("generate client key");
    let client_key_pair = ClientKeyPair::new(
        PrivateKeyDer::Pkcs8(key.serialize_der().into()),
        key.subject_public_key_info(),
    );
    let (year, month, day) = not_after;
    let mut params = CertificateParams::default();
    params.not_after = rcgen::date_time_ymd(year, month, day);
    let cert = params.self_signed(&key).expect("self-sign cert");
    (client_key_pair, cert.pem())
}
