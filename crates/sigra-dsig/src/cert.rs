#![forbid(unsafe_code)]

//! Signing-certificate metadata.
//!
//! The serial number is carried as a decimal string because both the
//! BinarySecurityToken id and the XAdES IssuerSerial use the decimal
//! form; serials routinely exceed 128 bits, so the conversion works on
//! the raw big-endian bytes instead of a fixed-width integer.

use der::Decode;
use sigra_core::{Error, Result};
use x509_cert::Certificate;

/// Metadata extracted from the leaf signing certificate.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    serial_decimal: String,
    issuer: String,
}

impl CertificateInfo {
    /// Parse a DER-encoded certificate.
    pub fn parse(der_bytes: &[u8]) -> Result<Self> {
        let cert = Certificate::from_der(der_bytes)
            .map_err(|e| Error::ParsingFailure(format!("invalid signing certificate: {e}")))?;
        let serial_decimal = decimal_from_be_bytes(cert.tbs_certificate.serial_number.as_bytes());
        let issuer = cert.tbs_certificate.issuer.to_string();
        Ok(Self {
            serial_decimal,
            issuer,
        })
    }

    /// Certificate serial number as a decimal string.
    pub fn serial_decimal(&self) -> &str {
        &self.serial_decimal
    }

    /// Issuer distinguished name in RFC 4514 form.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Identifier for the BinarySecurityToken carrying this
    /// certificate: `X509-<serial>`.
    pub fn token_id(&self) -> String {
        format!("X509-{}", self.serial_decimal)
    }
}

/// Convert an unsigned big-endian integer to its decimal string.
pub fn decimal_from_be_bytes(bytes: &[u8]) -> String {
    let mut digits = vec![0u8];
    for &byte in bytes {
        // digits = digits * 256 + byte, base 10, little-endian digits
        let mut carry = byte as u32;
        for d in digits.iter_mut() {
            let v = (*d as u32) * 256 + carry;
            *d = (v % 10) as u8;
            carry = v / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }
    digits
        .iter()
        .rev()
        .map(|d| (b'0' + d) as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_conversion_small_values() {
        assert_eq!(decimal_from_be_bytes(&[]), "0");
        assert_eq!(decimal_from_be_bytes(&[0x00]), "0");
        assert_eq!(decimal_from_be_bytes(&[0x2A]), "42");
        assert_eq!(decimal_from_be_bytes(&[0x01, 0x00]), "256");
        assert_eq!(decimal_from_be_bytes(&[0xFF, 0xFF]), "65535");
    }

    #[test]
    fn decimal_conversion_wide_serial() {
        // 2^128 = 340282366920938463463374607431768211456
        let mut bytes = vec![0x01];
        bytes.extend(std::iter::repeat(0x00).take(16));
        assert_eq!(
            decimal_from_be_bytes(&bytes),
            "340282366920938463463374607431768211456"
        );
    }

    #[test]
    fn token_id_uses_decimal_serial() {
        let info = CertificateInfo {
            serial_decimal: "12345".into(),
            issuer: "CN=Test CA".into(),
        };
        assert_eq!(info.token_id(), "X509-12345");
    }

    #[test]
    fn garbage_der_is_a_parsing_failure() {
        let result = CertificateInfo::parse(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(matches!(result, Err(Error::ParsingFailure(_))));
    }
}
