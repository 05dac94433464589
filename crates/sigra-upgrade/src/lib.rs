#![forbid(unsafe_code)]

//! Signature level upgrade: embedding validation material (certificate
//! chain, OCSP responses, CRLs) into an already-placed signature, and
//! the per-signature cache those artifacts pass through.

pub mod cache;
pub mod upgrade;

pub use cache::{RevocationArtifacts, RevocationCache, RevocationFetcher, DEFAULT_TTL};
pub use upgrade::{embed_validation_material, format_base64_folded};
