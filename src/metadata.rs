//! Instance metadata: endpoints and the server CA.
use std::collections::HashMap;

use rustls::pki_types::CertificateDer;

use crate::{
    auth::AuthType,
    cert,
    client::{ApiClient, ConnectSettings},
    error::Error,
    instance::InstanceName,
    Result,
};

const SUPPORTED_BACKEND: &str = "SECOND_GEN";

/// Where an instance endpoint lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IpType {
    /// Internet-routable address.
    Public,
    /// VPC-internal address.
    Private,
    /// Private Service Connect. The endpoint is a DNS name, not an IP
    /// literal; the caller's socket layer resolves it.
    Psc,
}

/// Validated connection metadata for one instance.
#[derive(Clone, Debug)]
pub struct InstanceMetadata {
    /// Endpoint per type. Never empty.
    pub ip_addresses: HashMap<IpType, String>,
    /// The instance-specific CA that signs the database server's certificate.
    pub server_ca_cert: CertificateDer<'static>,
}

pub(crate) async fn fetch_metadata(
    client: &ApiClient,
    instance: &InstanceName,
    auth_type: AuthType,
) -> Result<InstanceMetadata> {
    let settings = client.get_connect_settings(instance).await?;
    validate_settings(settings, instance, auth_type)
}

/// Turn a raw `connectSettings` response into [`InstanceMetadata`], rejecting
/// instances the connector cannot serve.
pub(crate) fn validate_settings(
    settings: ConnectSettings,
    instance: &InstanceName,
    auth_type: AuthType,
) -> Result<InstanceMetadata> {
    if settings.region != instance.region() {
        return Err(Error::RegionMismatch {
            want: instance.region().to_owned(),
            got: settings.region,
        });
    }
    if settings.backend_type != SUPPORTED_BACKEND {
        return Err(Error::UnsupportedBackend(settings.backend_type));
    }
    if auth_type == AuthType::Iam && settings.database_version.contains("SQLSERVER") {
        return Err(Error::IamSqlServer(settings.database_version));
    }

    let mut ip_addresses = HashMap::new();
    for mapping in settings.ip_addresses {
        let ip_type = match mapping.kind.as_str() {
            "PRIMARY" => IpType::Public,
            "PRIVATE" => IpType::Private,
            // Other address types (outgoing, etc.) are not connectable.
            _ => continue,
        };
        if let Some(address) = mapping.ip_address {
            ip_addresses.insert(ip_type, address);
        }
    }
    if let Some(dns_name) = settings.dns_name.filter(|name| !name.is_empty()) {
        ip_addresses.insert(IpType::Psc, dns_name);
    }
    if ip_addresses.is_empty() {
        return Err(Error::NoIpAddresses);
    }

    let ca_pem = settings
        .server_ca_cert
        .map(|wrapped| wrapped.cert)
        .filter(|pem| !pem.is_empty())
        .ok_or_else(|| {
            Error::CertificateParse("connect settings did not include a server CA certificate".into())
        })?;
    let (server_ca_cert, _) = cert::parse_certificate_pem(&ca_pem, "server CA certificate")?;

    Ok(InstanceMetadata {
        ip_addresses,
        server_ca_cert,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::{IpMapping, SslCert},
        error::ErrorKind,
        test_fixtures,
    };

    fn instance() -> InstanceName {
        "p:us-central1:i".parse().unwrap()
    }

    fn settings() -> ConnectSettings {
        ConnectSettings {
            region: "us-central1".into(),
            backend_type: "SECOND_GEN".into(),
            database_version: "POSTGRES_14".into(),
            ip_addresses: vec![IpMapping {
                kind: "PRIMARY".into(),
                ip_address: Some("1.2.3.4".into()),
            }],
            dns_name: None,
            server_ca_cert: Some(SslCert {
                cert: test_fixtures::server_ca_pem(),
            }),
        }
    }

    #[test]
    fn accepts_a_healthy_response() {
        let metadata = validate_settings(settings(), &instance(), AuthType::Password).unwrap();
        assert_eq!(
            metadata.ip_addresses.get(&IpType::Public).map(String::as_str),
            Some("1.2.3.4")
        );
        assert_eq!(metadata.ip_addresses.len(), 1);
    }

    #[test]
    fn rejects_region_mismatch() {
        let mut response = settings();
        response.region = "europe-west1".into();
        let err = validate_settings(response, &instance(), AuthType::Password).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn rejects_first_generation_backends() {
        let mut response = settings();
        response.backend_type = "FIRST_GEN".into();
        let err = validate_settings(response, &instance(), AuthType::Password).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn rejects_iam_on_sql_server() {
        let mut response = settings();
        response.database_version = "SQLSERVER_2019_STANDARD".into();
        let err = validate_settings(response.clone(), &instance(), AuthType::Iam).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(err
            .to_string()
            .contains("IAM Authentication is not supported for SQL Server"));

        // Password auth against SQL Server is fine.
        validate_settings(response, &instance(), AuthType::Password).unwrap();
    }

    #[test]
    fn maps_address_types_and_ignores_unknown_ones() {
        let mut response = settings();
        response.ip_addresses = vec![
            IpMapping {
                kind: "PRIMARY".into(),
                ip_address: Some("1.2.3.4".into()),
            },
            IpMapping {
                kind: "PRIVATE".into(),
                ip_address: Some("10.0.0.4".into()),
            },
            IpMapping {
                kind: "OUTGOING".into(),
                ip_address: Some("8.8.8.8".into()),
            },
        ];
        let metadata = validate_settings(response, &instance(), AuthType::Password).unwrap();
        assert_eq!(metadata.ip_addresses.len(), 2);
        assert_eq!(
            metadata.ip_addresses.get(&IpType::Private).map(String::as_str),
            Some("10.0.0.4")
        );
    }

    #[test]
    fn dns_name_becomes_a_psc_endpoint() {
        let mut response = settings();
        response.ip_addresses.clear();
        response.dns_name = Some("abc.psc.example.".into());
        let metadata = validate_settings(response, &instance(), AuthType::Password).unwrap();
        assert_eq!(
            metadata.ip_addresses.get(&IpType::Psc).map(String::as_str),
            Some("abc.psc.example.")
        );
    }

    #[test]
    fn no_endpoints_at_all_is_an_error() {
        let mut response = settings();
        response.ip_addresses.clear();
        let err = validate_settings(response, &instance(), AuthType::Password).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAvailable);
        assert!(err
            .to_string()
            .contains("instance does not have an assigned IP address"));

        // An address entry without an address is just as empty.
        let mut response = settings();
        response.ip_addresses = vec![IpMapping {
            kind: "PRIMARY".into(),
            ip_address: None,
        }];
        let err = validate_settings(response, &instance(), AuthType::Password).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAvailable);
    }

    #[test]
    fn unparseable_server_ca_is_rejected() {
        let mut response = settings();
        response.server_ca_cert = Some(SslCert {
            cert: "not a certificate".into(),
        });
        let err = validate_settings(response, &instance(), AuthType::Password).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CertificateInvalid);

        let mut response = settings();
        response.server_ca_cert = None;
        let err = validate_settings(response, &instance(), AuthType::Password).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CertificateInvalid);
    }
}
