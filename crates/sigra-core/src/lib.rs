#![forbid(unsafe_code)]

//! Core types shared across the Sigra XML signature engine.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};
