//! TLS material for API server connections
//!
//! The same material is applied to two transports:
//! - the `reqwest` client used for plain requests and streams
//! - the `rustls` connector used when a request is upgraded to the
//!   channel protocol
//!
//! # Certificate Verification
//!
//! - `ca_pem` set: server certificates are checked against that bundle in
//!   addition to the system roots
//! - `insecure_skip_tls_verify`: disable verification (testing only)
//!
//! # Client Certificates
//!
//! `client_cert_pem` and `client_key_pem` are combined into a PEM identity.
//! Encrypted keys are not supported by rustls.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ClientConfig;

use crate::errors::KubewireError;

/// Certificate material for talking to the API server
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM bundle of certificate authorities
    pub ca_pem: Option<Vec<u8>>,
    /// PEM client certificate (chain)
    pub client_cert_pem: Option<Vec<u8>>,
    /// PEM private key for the client certificate
    pub client_key_pem: Option<Vec<u8>>,
    /// Skip server certificate verification
    pub insecure_skip_tls_verify: bool,
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_pem", &self.ca_pem.as_ref().map(|c| c.len()))
            .field("client_cert_pem", &self.client_cert_pem.as_ref().map(|c| c.len()))
            .field("client_key_pem", &self.client_key_pem.as_ref().map(|_| "<redacted>"))
            .field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
            .finish()
    }
}

impl TlsConfig {
    /// Create a config that verifies against the system roots only
    pub fn new() -> Self {
        Self::default()
    }

    /// Load PEM material from files
    pub fn from_files(
        ca: Option<&Path>,
        client_cert: Option<&Path>,
        client_key: Option<&Path>,
    ) -> Result<Self, KubewireError> {
        Ok(Self {
            ca_pem: ca.map(read_pem).transpose()?,
            client_cert_pem: client_cert.map(read_pem).transpose()?,
            client_key_pem: client_key.map(read_pem).transpose()?,
            insecure_skip_tls_verify: false,
        })
    }

    /// Check if a client certificate is configured
    pub fn has_client_identity(&self) -> bool {
        self.client_cert_pem.is_some()
    }

    /// Apply the TLS material to a reqwest ClientBuilder
    pub fn apply_to_builder(
        &self,
        mut builder: reqwest::ClientBuilder,
    ) -> Result<reqwest::ClientBuilder, KubewireError> {
        if self.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ca) = &self.ca_pem {
            for cert in parse_certs(ca)? {
                let cert = reqwest::Certificate::from_der(&cert)
                    .map_err(|e| KubewireError::Tls(format!("Failed to parse CA certificate: {}", e)))?;
                builder = builder.add_root_certificate(cert);
            }
        }

        if let Some(identity) = self.reqwest_identity()? {
            builder = builder.identity(identity);
        }

        Ok(builder)
    }

    fn reqwest_identity(&self) -> Result<Option<reqwest::Identity>, KubewireError> {
        let Some(cert) = &self.client_cert_pem else {
            return Ok(None);
        };

        let mut combined = cert.clone();
        if let Some(key) = &self.client_key_pem {
            if is_key_encrypted(key) {
                return Err(KubewireError::Tls(
                    "Encrypted PEM private keys are not supported".to_string(),
                ));
            }
            combined.extend_from_slice(b"\n");
            combined.extend_from_slice(key);
        }

        reqwest::Identity::from_pem(&combined)
            .map(Some)
            .map_err(|e| KubewireError::Tls(format!("Failed to load PEM identity: {}", e)))
    }

    /// Build the rustls config used for upgraded (WebSocket) connections
    pub fn rustls_client_config(&self) -> Result<Arc<ClientConfig>, KubewireError> {
        if self.insecure_skip_tls_verify {
            let builder = ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier));
            let config = match self.rustls_identity()? {
                Some((certs, key)) => builder
                    .with_client_auth_cert(certs, key)
                    .map_err(|e| KubewireError::Tls(format!("Invalid client certificate: {}", e)))?,
                None => builder.with_no_client_auth(),
            };
            return Ok(Arc::new(config));
        }

        let mut root_store = rustls::RootCertStore::empty();
        for cert in rustls_native_certs::load_native_certs().certs {
            root_store.add(cert).ok();
        }
        if root_store.is_empty() {
            root_store = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        if let Some(ca) = &self.ca_pem {
            for cert in parse_certs(ca)? {
                root_store
                    .add(cert)
                    .map_err(|e| KubewireError::Tls(format!("Failed to add CA certificate: {}", e)))?;
            }
        }

        let builder = ClientConfig::builder().with_root_certificates(root_store);
        let config = match self.rustls_identity()? {
            Some((certs, key)) => builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| KubewireError::Tls(format!("Invalid client certificate: {}", e)))?,
            None => builder.with_no_client_auth(),
        };
        Ok(Arc::new(config))
    }

    fn rustls_identity(
        &self,
    ) -> Result<Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>, KubewireError> {
        let Some(cert) = &self.client_cert_pem else {
            return Ok(None);
        };
        let certs = parse_certs(cert)?;

        // The key may live in the certificate file
        let key_source = self.client_key_pem.as_deref().unwrap_or(cert);
        let mut reader = std::io::BufReader::new(key_source);
        let key = rustls_pemfile::private_key(&mut reader)
            .map_err(|e| KubewireError::Tls(format!("Failed to parse private key: {}", e)))?
            .ok_or_else(|| KubewireError::Tls("No private key found for client certificate".to_string()))?;

        Ok(Some((certs, key)))
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, KubewireError> {
    fs::read(path).map_err(|e| KubewireError::Tls(format!("Failed to read '{}': {}", path.display(), e)))
}

/// Parse every certificate in a PEM bundle
fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, KubewireError> {
    let mut reader = std::io::BufReader::new(pem);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| KubewireError::Tls(format!("Failed to parse PEM bundle: {}", e)))?;

    if certs.is_empty() {
        return Err(KubewireError::Tls("PEM bundle contains no certificates".to_string()));
    }
    Ok(certs)
}

/// Check if a PEM key file is encrypted
fn is_key_encrypted(data: &[u8]) -> bool {
    std::str::from_utf8(data)
        .map(|text| text.contains("ENCRYPTED"))
        .unwrap_or(false)
}

/// Certificate verifier that accepts all certificates (insecure)
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
