#![forbid(unsafe_code)]

//! Key material loading.
//!
//! Accepts PKCS#8 PEM private keys. The key type is detected from the
//! key itself, never from configuration: the signature algorithm is
//! derived from whatever the key turns out to be.

use sigra_core::{Error, Result};
use sigra_crypto::{PrivateKeyHandle, SigningMaterial};

/// Load signing material from a PKCS#8 PEM private key and a DER
/// certificate chain (leaf first).
pub fn load_signing_material(key_pem: &str, chain: Vec<Vec<u8>>) -> Result<SigningMaterial> {
    let key = parse_private_key(key_pem)?;
    SigningMaterial::new(chain, key)
}

fn parse_private_key(pem: &str) -> Result<PrivateKeyHandle> {
    {
        use rsa::pkcs8::DecodePrivateKey;
        if let Ok(key) = rsa::RsaPrivateKey::from_pkcs8_pem(pem) {
            return Ok(PrivateKeyHandle::Rsa(key));
        }
    }
    {
        use p256::pkcs8::DecodePrivateKey;
        if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_pem(pem) {
            return Ok(PrivateKeyHandle::EcP256(key));
        }
    }
    Err(Error::ParsingFailure(
        "private key is neither an RSA nor a P-256 PKCS#8 key".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigra_crypto::KeyType;

    const RSA_KEY: &str = include_str!("../tests/fixtures/key_pkcs8.pem");
    const EC_KEY: &str = include_str!("../tests/fixtures/ec_key_pkcs8.pem");
    const CERT: &[u8] = include_bytes!("../tests/fixtures/cert.der");

    #[test]
    fn detects_rsa_key() {
        let material = load_signing_material(RSA_KEY, vec![CERT.to_vec()]).unwrap();
        assert_eq!(material.key_type(), KeyType::Rsa);
    }

    #[test]
    fn detects_ec_key() {
        let material = load_signing_material(EC_KEY, vec![CERT.to_vec()]).unwrap();
        assert_eq!(material.key_type(), KeyType::EllipticCurve);
    }

    #[test]
    fn rejects_non_key_pem() {
        let result = load_signing_material("-----BEGIN JUNK-----\n-----END JUNK-----\n", vec![
            CERT.to_vec(),
        ]);
        assert!(matches!(result, Err(Error::ParsingFailure(_))));
    }

    #[test]
    fn rejects_empty_chain() {
        let result = load_signing_material(RSA_KEY, vec![]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
