//! Ephemeral client certificates minted by the control plane.
use chrono::{DateTime, Utc};
use rustls::pki_types::CertificateDer;
use rustls_pemfile::Item;

use crate::{
    auth::{AccessToken, AuthType},
    client::{ApiClient, GenerateEphemeralCertRequest},
    error::Error,
    instance::InstanceName,
    keys::ClientKeyPair,
    Result,
};

/// A short-lived client certificate chaining to the instance CA.
#[derive(Clone, Debug)]
pub(crate) struct EphemeralCertificate {
    pub(crate) der: CertificateDer<'static>,
    /// Expiration of the certificate itself; the refresh deadline is at most
    /// this.
    pub(crate) not_after: DateTime<Utc>,
}

/// Submit the public key (and, under IAM, the access token) to be signed into
/// an ephemeral certificate.
pub(crate) async fn fetch_ephemeral_cert(
    client: &ApiClient,
    key_pair: &ClientKeyPair,
    instance: &InstanceName,
    token: Option<&AccessToken>,
    auth_type: AuthType,
) -> Result<EphemeralCertificate> {
    let request = GenerateEphemeralCertRequest {
        public_key: key_pair.public_key_pem(),
        access_token: match (auth_type, token) {
            (AuthType::Iam, Some(token)) => Some(token.wire_value()),
            _ => None,
        },
    };
    let response = client.generate_ephemeral_cert(instance, &request).await?;
    let pem = response
        .ephemeral_cert
        .map(|wrapped| wrapped.cert)
        .filter(|pem| !pem.is_empty())
        .ok_or_else(|| {
            Error::CertificateParse("no ephemeral certificate in Admin API response".into())
        })?;
    let (der, not_after) = parse_certificate_pem(&pem, "ephemeral certificate")?;
    Ok(EphemeralCertificate { der, not_after })
}

/// Decode a single PEM certificate and pull out its expiration.
pub(crate) fn parse_certificate_pem(
    pem: &str,
    what: &str,
) -> Result<(CertificateDer<'static>, DateTime<Utc>)> {
    let mut reader = std::io::Cursor::new(pem.as_bytes());
    let item = rustls_pemfile::read_one(&mut reader)
        .map_err(|err| Error::CertificateParse(format!("failed to parse {what}: {err}")))?
        .ok_or_else(|| Error::CertificateParse(format!("failed to parse {what}: no PEM block found")))?;
    let Item::X509Certificate(der) = item else {
        return Err(Error::CertificateParse(format!(
            "failed to parse {what}: PEM block is not a certificate"
        )));
    };
    let (_, parsed) = x509_parser::parse_x509_certificate(&der)
        .map_err(|err| Error::CertificateParse(format!("failed to parse {what}: {err}")))?;
    let not_after = DateTime::from_timestamp(parsed.validity().not_after.timestamp(), 0)
        .ok_or_else(|| {
            Error::CertificateParse(format!("failed to parse {what}: expiration out of range"))
        })?;
    Ok((der, not_after))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{error::ErrorKind, test_fixtures};

    #[test]
    fn extracts_the_expiration() {
        let (_, pem) = test_fixtures::key_pair_with_cert((2030, 1, 1));
        let (_, not_after) = parse_certificate_pem(&pem, "ephemeral certificate").unwrap();
        assert_eq!(not_after, Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn rejects_non_certificate_input() {
        for bad in ["", "garbage", "-----BEGIN CERTIFICATE-----\nnope\n-----END CERTIFICATE-----\n"] {
            let err = parse_certificate_pem(bad, "ephemeral certificate").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::CertificateInvalid, "input {bad:?}");
        }
    }

    #[test]
    fn rejects_pem_blocks_that_are_not_certificates() {
        let key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let err = parse_certificate_pem(&key.serialize_pem(), "ephemeral certificate").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CertificateInvalid);
    }
}
