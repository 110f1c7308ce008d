//! TLS certificate and key loading for TLS/DTLS listeners.
//!
//! Listener configs carry the PEM material inline, base64-encoded (raw PEM is
//! accepted too). Only the PEM structure is checked here; the protocol engine
//! builds the actual TLS context.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Error type for TLS material loading.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("{0} is not valid base64")]
    Decode(&'static str),
    #[error("no certificate found in PEM data")]
    NoCertificate,
    #[error("no private key found in PEM data")]
    NoKey,
    #[error("malformed PEM data: {0}")]
    Pem(#[from] std::io::Error),
}

/// DER-encoded certificate chain and private key.
#[derive(Clone)]
pub struct TlsMaterial {
    pub cert_chain: Vec<Vec<u8>>,
    pub key: Vec<u8>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("cert_chain", &self.cert_chain.len())
            .field("key", &"<SECRET>")
            .finish()
    }
}

fn decode_pem(value: &str, what: &'static str) -> Result<Vec<u8>, TlsError> {
    let trimmed = value.trim();
    if trimmed.starts_with("-----BEGIN") {
        return Ok(trimmed.as_bytes().to_vec());
    }
    STANDARD.decode(trimmed).map_err(|_| TlsError::Decode(what))
}

/// Decode and parse a certificate chain and private key.
pub fn load_tls_material(cert: &str, key: &str) -> Result<TlsMaterial, TlsError> {
    let cert_pem = decode_pem(cert, "cert")?;
    let key_pem = decode_pem(key, "key")?;

    let cert_chain = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .map(|c| c.map(|der| der.to_vec()))
        .collect::<Result<Vec<_>, _>>()?;
    if cert_chain.is_empty() {
        return Err(TlsError::NoCertificate);
    }

    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())?
        .ok_or(TlsError::NoKey)?
        .secret_der()
        .to_vec();

    Ok(TlsMaterial { cert_chain, key })
}
