//! Caller-supplied client key pairs.
use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use rustls::pki_types::PrivateKeyDer;

const PEM_LINE_WIDTH: usize = 64;

/// A key pair generated by the caller, possibly lazily and shared across
/// refresh cycles. The public half is sent to the control plane to be signed
/// into an ephemeral certificate; the private half ends up in the assembled
/// TLS configuration.
pub struct ClientKeyPair {
    private_key: PrivateKeyDer<'static>,
    public_key_der: Vec<u8>,
}

impl ClientKeyPair {
    /// Bundle a DER private key with its SubjectPublicKeyInfo encoding.
    pub fn new(private_key: PrivateKeyDer<'static>, public_key_der: Vec<u8>) -> Self {
        Self {
            private_key,
            public_key_der,
        }
    }

    /// A copy of the private key for TLS client authentication.
    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        self.private_key.clone_key()
    }

    /// The public key in the PEM envelope the control plane accepts.
    ///
    /// The `RSA PUBLIC KEY` label is fixed: the Admin API accepts any
    /// supported key algorithm inside this envelope, but only under this
    /// label.
    pub fn public_key_pem(&self) -> String {
        let encoded = BASE64_STANDARD.encode(&self.public_key_der);
        let mut pem =
            String::with_capacity(encoded.len() + encoded.len() / PEM_LINE_WIDTH + 72);
        pem.push_str("-----BEGIN RSA PUBLIC KEY-----\n");
        let mut rest = encoded.as_str();
        while rest.len() > PEM_LINE_WIDTH {
            let (line, tail) = rest.split_at(PEM_LINE_WIDTH);
            pem.push_str(line);
            pem.push('\n');
            rest = tail;
        }
        pem.push_str(rest);
        pem.push('\n');
        pem.push_str("-----END RSA PUBLIC KEY-----\n");
        pem
    }
}

impl Clone for ClientKeyPair {
    fn clone(&self) -> Self {
        Self {
            private_key: self.private_key.clone_key(),
            public_key_der: self.public_key_der.clone(),
        }
    }
}

impl fmt::Debug for ClientKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientKeyPair").finish_non_exhaustive()
    }
}
