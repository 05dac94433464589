#![forbid(unsafe_code)]

/// Errors produced by the Sigra XML signature engine.
///
/// Every fatal variant aborts the whole signing operation; no partial
/// document or partial signature bytes are ever returned. `CacheFailure`
/// is the one non-fatal category: a failed level upgrade degrades to the
/// base-level signature with a warning attached to the result.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("XML parsing error: {0}")]
    ParsingFailure(String),

    #[error("reference target not found: {0}")]
    ReferenceNotFound(String),

    #[error("identifier resolves to more than one element: {0}")]
    ReferenceAmbiguous(String),

    #[error("canonicalization error: {0}")]
    CanonicalizationFailure(String),

    #[error("cryptographic error: {0}")]
    CryptoFailure(String),

    #[error("encoded signature exceeds reservation: {actual} > {reserved}")]
    SizeOverflow { reserved: usize, actual: usize },

    #[error("revocation cache error: {0}")]
    CacheFailure(String),

    #[error("signing capacity exceeded: no slot became free within {0:?}")]
    CapacityExceeded(std::time::Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
