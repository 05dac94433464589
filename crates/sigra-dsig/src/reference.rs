#![forbid(unsafe_code)]

//! Reference descriptors.
//!
//! The list of references is a fixed, profile-declared sequence. Its
//! order is semantically significant and is never sorted: the verifying
//! party reconstructs the same byte sequence, so any data-dependent
//! ordering would make verification non-deterministic.

/// What a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Document content addressed by identifier.
    Data,
    /// The XAdES SignedProperties block inside the signature itself.
    SignedProperties,
}

/// A reference to be digested, as declared by a profile.
#[derive(Debug, Clone)]
pub struct ReferenceSpec {
    /// Target identifier (without the leading `#`).
    pub target_id: String,
    pub kind: ReferenceKind,
}

impl ReferenceSpec {
    pub fn data(target_id: &str) -> Self {
        Self {
            target_id: target_id.to_owned(),
            kind: ReferenceKind::Data,
        }
    }

    pub fn signed_properties(target_id: &str) -> Self {
        Self {
            target_id: target_id.to_owned(),
            kind: ReferenceKind::SignedProperties,
        }
    }
}

/// A fully computed reference as it appears in SignedInfo.
#[derive(Debug, Clone)]
pub struct ReferenceDescriptor {
    /// Target identifier (without the leading `#`).
    pub target_id: String,
    pub kind: ReferenceKind,
    /// Canonicalization transform URIs, applied in order.
    pub transforms: Vec<String>,
    /// Digest algorithm URI.
    pub digest_method: String,
    /// Computed digest over the canonicalized target subtree.
    pub digest_value: Vec<u8>,
}

impl ReferenceDescriptor {
    /// The `URI` attribute value: `#target`.
    pub fn uri(&self) -> String {
        format!("#{}", self.target_id)
    }
}
