#![forbid(unsafe_code)]

//! Cryptographic primitives for the Sigra signature engine: digest
//! algorithms and the asymmetric signing operation.

pub mod digest;
pub mod material;
pub mod sign;

pub use material::{KeyType, PrivateKeyHandle, SigningMaterial};
