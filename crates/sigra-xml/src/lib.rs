#![forbid(unsafe_code)]

//! XML document handling for the Sigra signature engine.
//!
//! A [`SignableDocument`] is an owned, mutable tree built from parsed XML.
//! One signing operation owns its document exclusively for the whole
//! pipeline: preparation (headers, timestamps, tokens), digesting,
//! signature placement and final serialization all mutate or read the
//! same tree, so digests computed from a subtree stay valid as long as
//! that subtree is not touched afterwards.

pub mod document;
pub mod resolver;
pub mod writer;

pub use document::{Attribute, NodeId, NodeKind, QName, SignableDocument};
pub use resolver::IdIndex;
