#![forbid(unsafe_code)]

//! Revocation artifact cache.
//!
//! Artifacts are keyed by the signature id they were fetched for and
//! are expected to be consumed within the same signing operation. Two
//! removal paths keep the cache bounded: the owning operation removes
//! its own entry on every exit path, and a time-based sweep removes
//! entries whose owner never came back (a crashed worker, a batch job
//! that upgraded only some of its signatures).

use sigra_core::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Validation material fetched for one signature.
#[derive(Debug, Clone, Default)]
pub struct RevocationArtifacts {
    /// DER-encoded OCSP responses.
    pub ocsp_responses: Vec<Vec<u8>>,
    /// DER-encoded CRLs.
    pub crls: Vec<Vec<u8>>,
    /// DER-encoded certificates beyond the leaf (issuers, roots).
    pub certificates: Vec<Vec<u8>>,
}

impl RevocationArtifacts {
    pub fn is_empty(&self) -> bool {
        self.ocsp_responses.is_empty() && self.crls.is_empty() && self.certificates.is_empty()
    }
}

/// Source of revocation material for a certificate chain.
///
/// Implementations talk to OCSP responders and CRL distribution points;
/// tests substitute a canned fetcher.
pub trait RevocationFetcher: Send + Sync {
    fn fetch(&self, chain: &[Vec<u8>]) -> Result<RevocationArtifacts>;
}

struct Entry {
    artifacts: RevocationArtifacts,
    created: Instant,
}

/// Default retention for entries whose owner never cleaned up.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Shared cache of per-signature revocation artifacts.
#[derive(Clone)]
pub struct RevocationCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    ttl: Duration,
}

impl Default for RevocationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RevocationCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Store artifacts for a signature id, replacing any previous
    /// entry for the same id.
    pub fn insert(&self, signature_id: &str, artifacts: RevocationArtifacts) -> Result<()> {
        let mut entries = self.lock()?;
        entries.insert(
            signature_id.to_owned(),
            Entry {
                artifacts,
                created: Instant::now(),
            },
        );
        Ok(())
    }

    pub fn get(&self, signature_id: &str) -> Result<Option<RevocationArtifacts>> {
        let entries = self.lock()?;
        Ok(entries.get(signature_id).map(|e| e.artifacts.clone()))
    }

    /// Remove the entry for one signature. Runs on every exit path of
    /// a signing operation, successful or not.
    pub fn cleanup(&self, signature_id: &str) -> Result<()> {
        let mut entries = self.lock()?;
        if entries.remove(signature_id).is_some() {
            log::debug!("revocation cache entry {signature_id} removed");
        }
        Ok(())
    }

    /// Remove every entry older than the TTL. Returns how many were
    /// evicted.
    pub fn sweep(&self) -> Result<usize> {
        let mut entries = self.lock()?;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, e| e.created.elapsed() < ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            log::info!("revocation cache sweep evicted {evicted} stale entries");
        }
        Ok(evicted)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| Error::CacheFailure("revocation cache poisoned".into()))
    }
}
