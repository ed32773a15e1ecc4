use super::any_server_cert::AnyServerCert;
use rustls::crypto::ring::{default_provider, DEFAULT_CIPHER_SUITES};
use rustls::{ClientConfig, RootCertStore};
use std::path::Path;
use std::sync::Arc;

/// Client TLS settings shared by every probe of a run.
///
/// Roots come from `ca_cert` (a PEM bundle) when given, from the bundled
/// Mozilla roots otherwise.
pub fn build_client_config(
    insecure: bool,
    ca_cert: Option<&Path>,
) -> Result<Arc<ClientConfig>, anyhow::Error> {
    let mut root_store = RootCertStore::empty();
    if let Some(file_path) = ca_cert {
        let f = std::fs::File::open(file_path)
            .map_err(|e| anyhow!("can not open {}: {}", file_path.display(), e))?;
        let mut rd = std::io::BufReader::new(f);
        for cert in rustls_pemfile::certs(&mut rd) {
            root_store.add(cert?)?;
        }
        ensure!(
            !root_store.is_empty(),
            "no certificates found in {}",
            file_path.display()
        );
    } else {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    };

    let provider = Arc::new(rustls::crypto::CryptoProvider {
        cipher_suites: DEFAULT_CIPHER_SUITES.to_vec(),
        ..default_provider()
    });
    let algorithms = provider.signature_verification_algorithms;

    let mut tls_config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(rustls::DEFAULT_VERSIONS)?
        .with_root_certificates(root_store)
        .with_no_client_auth();
    if insecure {
        warn!("Server certificates will not be verified");
        tls_config
            .dangerous()
            .set_certificate_verifier(Arc::new(AnyServerCert::new(algorithms)));
    }

    Ok(Arc::new(tls_config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roots() {
        assert!(build_client_config(false, None).is_ok());
        assert!(build_client_config(true, None).is_ok());
    }

    #[test]
    fn test_missing_ca_file_is_an_error() {
        let err = build_client_config(false, Some(Path::new("/nonexistent/ca.pem"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ca.pem"));
    }
}
