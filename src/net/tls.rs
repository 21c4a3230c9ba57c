//! Client TLS configuration and server name handling.

use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tokio_rustls::TlsConnector;

use crate::config::TlsClientConfig;
use crate::net::error::{EstablishError, TlsSetupError};

/// Build a TLS connector from the client TLS settings.
pub fn build_connector(config: &TlsClientConfig) -> Result<TlsConnector, TlsSetupError> {
    let mut roots = RootCertStore::empty();

    if config.use_native_roots {
        let native = rustls_native_certs::load_native_certs();
        for err in native.errors {
            tracing::debug!(error = %err, "Skipping unreadable native certificate");
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        tracing::debug!(added, ignored, "Loaded native root certificates");
    }

    for path in &config.extra_root_certs {
        for cert in read_pem_bundle(path)? {
            roots
                .add(cert)
                .map_err(|e| TlsSetupError::InvalidCertificate {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
        }
    }

    if roots.is_empty() {
        return Err(TlsSetupError::EmptyRootStore);
    }

    let mut client = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    client.alpn_protocols = config
        .alpn_protocols
        .iter()
        .map(|p| p.as_bytes().to_vec())
        .collect();

    Ok(TlsConnector::from(Arc::new(client)))
}

fn read_pem_bundle(path: &str) -> Result<Vec<CertificateDer<'static>>, TlsSetupError> {
    let file = File::open(path).map_err(|source| TlsSetupError::ReadBundle {
        path: path.to_string(),
        source,
    })?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsSetupError::ReadBundle {
            path: path.to_string(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsSetupError::InvalidCertificate {
            path: path.to_string(),
            reason: "no certificates found in PEM".to_string(),
        });
    }

    Ok(certs)
}

/// Convert a host name or IP literal to the name used for SNI and verification.
pub fn server_name(host: &str) -> Result<ServerName<'static>, EstablishError> {
    ServerName::try_from(host.to_string())
        .map_err(|_| EstablishError::InvalidServerName(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_name() {
        assert!(server_name("www.example.org").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(server_name("::1").is_ok());
        assert!(matches!(server_name(""), Err(EstablishError::InvalidServerName(_))));
    }

    #[test]
    fn test_missing_bundle() {
        let config = TlsClientConfig {
            use_native_roots: false,
            extra_root_certs: vec!["/nonexistent/ca.pem".to_string()],
            alpn_protocols: vec![],
        };
        assert!(matches!(
            build_connector(&config),
            Err(TlsSetupError::ReadBundle { .. })
        ));
    }

    #[test]
    fn test_no_roots() {
        let config = TlsClientConfig {
            use_native_roots: false,
            extra_root_certs: vec![],
            alpn_protocols: vec![],
        };
        assert!(matches!(build_connector(&config), Err(TlsSetupError::EmptyRootStore)));
    }

    #[test]
    fn test_extra_bundle_loaded() {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let path = std::env::temp_dir().join(format!("tls-dialer-ca-{}.pem", std::process::id()));
        std::fs::write(&path, cert.cert.pem()).unwrap();

        let config = TlsClientConfig {
            use_native_roots: false,
            extra_root_certs: vec![path.to_string_lossy().into_owned()],
            alpn_protocols: vec!["http/1.1".to_string()],
        };
        let result = build_connector(&config);
        let _ = std::fs::remove_file(&path);
        assert!(result.is_ok());
    }
}
