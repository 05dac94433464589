#![forbid(unsafe_code)]

//! Sigra: a server-side XML signature engine.
//!
//! Produces WS-Security signed SOAP messages and enveloped XAdES
//! signatures, with bounded signing concurrency and optional level
//! upgrade from a revocation artifact cache.

pub mod engine;
pub mod keys;

pub use engine::{EngineConfig, SignResult, SignatureEngine, XadesRequest};
pub use keys::load_signing_material;

pub use sigra_core::{Error, Result};
pub use sigra_crypto::{KeyType, PrivateKeyHandle, SigningMaterial};
pub use sigra_dsig::{
    PlacementProfile, PlaceholderReservation, ReferenceSpec, SlotPool,
};
pub use sigra_upgrade::{RevocationArtifacts, RevocationCache, RevocationFetcher};
pub use sigra_xml::SignableDocument;
