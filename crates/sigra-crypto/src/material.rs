#![forbid(unsafe_code)]

//! Signing material: certificate chain plus an opaque private-key handle.

use sigra_core::{Error, Result};

/// The type of the signing key. The signature algorithm is derived from
/// this tag and from nothing else; callers never pick an algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
    EllipticCurve,
}

/// An opaque private-key capability. It supports exactly one operation,
/// producing a signature over bytes, and is never serialized; its Debug
/// form is redacted so it cannot leak through logs.
pub enum PrivateKeyHandle {
    Rsa(rsa::RsaPrivateKey),
    EcP256(p256::ecdsa::SigningKey),
}

impl std::fmt::Debug for PrivateKeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsa(_) => write!(f, "PrivateKeyHandle::Rsa(<redacted>)"),
            Self::EcP256(_) => write!(f, "PrivateKeyHandle::EcP256(<redacted>)"),
        }
    }
}

impl PrivateKeyHandle {
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Rsa(_) => KeyType::Rsa,
            Self::EcP256(_) => KeyType::EllipticCurve,
        }
    }
}

/// Certificate chain and private key supplied per signing request.
/// Read-only for the duration of one operation; never cached.
#[derive(Debug)]
pub struct SigningMaterial {
    /// DER-encoded certificate chain, leaf first.
    chain: Vec<Vec<u8>>,
    key: PrivateKeyHandle,
}

impl SigningMaterial {
    /// Create signing material. The chain must contain at least the
    /// leaf (signing) certificate.
    pub fn new(chain: Vec<Vec<u8>>, key: PrivateKeyHandle) -> Result<Self> {
        if chain.is_empty() {
            return Err(Error::InvalidInput(
                "signing material requires at least a leaf certificate".into(),
            ));
        }
        Ok(Self { chain, key })
    }

    /// DER bytes of the leaf (signing) certificate.
    pub fn leaf_certificate(&self) -> &[u8] {
        &self.chain[0]
    }

    /// The full chain, leaf first.
    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    pub fn key(&self) -> &PrivateKeyHandle {
        &self.key
    }

    pub fn key_type(&self) -> KeyType {
        self.key.key_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_chain_rejected() {
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let material = SigningMaterial::new(Vec::new(), PrivateKeyHandle::Rsa(key));
        assert!(matches!(material, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn debug_never_prints_key_material() {
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let handle = PrivateKeyHandle::Rsa(key);
        assert_eq!(format!("{handle:?}"), "PrivateKeyHandle::Rsa(<redacted>)");
    }
}
