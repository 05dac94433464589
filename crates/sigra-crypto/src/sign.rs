#![forbid(unsafe_code)]

//! Asymmetric signing over canonical bytes.
//!
//! The algorithm is a pure function of the key type: RSA keys sign with
//! SHA-256/RSA (PKCS#1 v1.5), EC keys with SHA-256/ECDSA over P-256.
//! ECDSA output uses the XML-DSig `r || s` form, not DER.

use crate::material::{KeyType, PrivateKeyHandle};
use sigra_core::{algorithm, Error, Result};

/// Signature algorithm URI for a key type. Never derived from caller
/// input, which rules out algorithm/key mismatch.
pub fn algorithm_uri(key_type: KeyType) -> &'static str {
    match key_type {
        KeyType::Rsa => algorithm::RSA_SHA256,
        KeyType::EllipticCurve => algorithm::ECDSA_SHA256,
    }
}

/// Sign canonical bytes with the given private key.
pub fn sign(key: &PrivateKeyHandle, data: &[u8]) -> Result<Vec<u8>> {
    match key {
        PrivateKeyHandle::Rsa(private_key) => {
            use signature::Signer;
            let sk = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(private_key.clone());
            let sig = sk
                .try_sign(data)
                .map_err(|e| Error::CryptoFailure(format!("RSA signing failed: {e}")))?;
            use signature::SignatureEncoding;
            Ok(sig.to_vec())
        }
        PrivateKeyHandle::EcP256(sk) => {
            use signature::Signer;
            let sig: p256::ecdsa::Signature = sk
                .try_sign(data)
                .map_err(|e| Error::CryptoFailure(format!("ECDSA signing failed: {e}")))?;
            Ok(p256_to_xmldsig(&sig))
        }
    }
}

/// Verify a signature produced by [`sign`], given the corresponding
/// public key material. Used by tests and by callers that want to check
/// a produced signature before returning it.
pub fn verify(key: &PrivateKeyHandle, data: &[u8], sig_bytes: &[u8]) -> Result<bool> {
    match key {
        PrivateKeyHandle::Rsa(private_key) => {
            use signature::Verifier;
            let vk = rsa::pkcs1v15::VerifyingKey::<sha2::Sha256>::new(private_key.to_public_key());
            let sig = rsa::pkcs1v15::Signature::try_from(sig_bytes)
                .map_err(|e| Error::CryptoFailure(format!("invalid RSA signature: {e}")))?;
            Ok(vk.verify(data, &sig).is_ok())
        }
        PrivateKeyHandle::EcP256(sk) => {
            use signature::Verifier;
            let vk = sk.verifying_key();
            let sig = xmldsig_to_p256(sig_bytes)?;
            Ok(vk.verify(data, &sig).is_ok())
        }
    }
}

/// Convert a P-256 signature to the XML-DSig `r || s` format.
pub fn p256_to_xmldsig(sig: &p256::ecdsa::Signature) -> Vec<u8> {
    let (r, s) = sig.split_bytes();
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&r);
    out.extend_from_slice(&s);
    out
}

/// Convert XML-DSig `r || s` bytes to a typed P-256 signature.
pub fn xmldsig_to_p256(rs: &[u8]) -> Result<p256::ecdsa::Signature> {
    if rs.len() != 64 {
        return Err(Error::CryptoFailure(format!(
            "P-256 signature must be 64 bytes, got {}",
            rs.len()
        )));
    }
    let r = p256::FieldBytes::from_slice(&rs[..32]);
    let s = p256::FieldBytes::from_slice(&rs[32..]);
    p256::ecdsa::Signature::from_scalars(*r, *s)
        .map_err(|e| Error::CryptoFailure(format!("invalid P-256 signature: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::KeyType;

    #[test]
    fn algorithm_is_pure_function_of_key_type() {
        assert_eq!(algorithm_uri(KeyType::Rsa), algorithm::RSA_SHA256);
        assert_eq!(algorithm_uri(KeyType::EllipticCurve), algorithm::ECDSA_SHA256);
    }

    #[test]
    fn rsa_sign_verify_round_trip() {
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let handle = PrivateKeyHandle::Rsa(key);
        let sig = sign(&handle, b"to-be-signed").unwrap();
        assert!(verify(&handle, b"to-be-signed", &sig).unwrap());
        assert!(!verify(&handle, b"tampered", &sig).unwrap());
    }

    #[test]
    fn ecdsa_sign_verify_round_trip() {
        let sk = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let handle = PrivateKeyHandle::EcP256(sk);
        let sig = sign(&handle, b"to-be-signed").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(verify(&handle, b"to-be-signed", &sig).unwrap());
        assert!(!verify(&handle, b"tampered", &sig).unwrap());
    }
}
