#![forbid(unsafe_code)]

//! Bounded signing sessions.
//!
//! The private-key operation is the scarce resource: hardware tokens
//! and remote signing services serialize internally, so unbounded
//! concurrent callers only pile up latency. A [`SlotPool`] caps the
//! number of in-flight sessions; a [`SlotGuard`] ties slot release to
//! Drop, so a panic or early return inside the critical section cannot
//! leak a slot.

use crate::signedinfo::SignedInfoBlock;
use sigra_core::{Error, Result};
use sigra_crypto::{sign, SigningMaterial};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

struct PoolState {
    available: usize,
}

struct PoolInner {
    state: Mutex<PoolState>,
    freed: Condvar,
    capacity: usize,
}

/// Fixed-capacity admission pool for signing sessions.
///
/// Admission is not FIFO: a waiter woken by a release competes with
/// fresh callers for the freed slot. Callers that need fairness must
/// order requests upstream.
#[derive(Clone)]
pub struct SlotPool {
    inner: Arc<PoolInner>,
}

impl SlotPool {
    /// A pool admitting at most `capacity` concurrent sessions.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "slot pool capacity must be non-zero");
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    available: capacity,
                }),
                freed: Condvar::new(),
                capacity,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots currently free. Advisory only; the value may be stale by
    /// the time the caller acts on it.
    pub fn available(&self) -> usize {
        self.inner.state.lock().map(|s| s.available).unwrap_or(0)
    }

    /// Block until a slot is free, then take it.
    pub fn acquire(&self) -> Result<SlotGuard> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| Error::CryptoFailure("signing slot pool poisoned".into()))?;
        while state.available == 0 {
            state = self
                .inner
                .freed
                .wait(state)
                .map_err(|_| Error::CryptoFailure("signing slot pool poisoned".into()))?;
        }
        state.available -= 1;
        Ok(SlotGuard {
            pool: Arc::clone(&self.inner),
        })
    }

    /// Take a slot, waiting at most `limit`. Exceeding the limit is a
    /// load-shedding signal, not a signing failure.
    pub fn acquire_timeout(&self, limit: Duration) -> Result<SlotGuard> {
        let deadline = Instant::now() + limit;
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| Error::CryptoFailure("signing slot pool poisoned".into()))?;
        while state.available == 0 {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::CapacityExceeded(limit));
            }
            let (next, timed_out) = self
                .inner
                .freed
                .wait_timeout(state, deadline - now)
                .map_err(|_| Error::CryptoFailure("signing slot pool poisoned".into()))?;
            state = next;
            if timed_out.timed_out() && state.available == 0 {
                return Err(Error::CapacityExceeded(limit));
            }
        }
        state.available -= 1;
        Ok(SlotGuard {
            pool: Arc::clone(&self.inner),
        })
    }
}

/// An admitted session slot. Dropping it releases the slot.
pub struct SlotGuard {
    pool: Arc<PoolInner>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        // A poisoned mutex here means another holder panicked; the
        // count is still correct, so release anyway.
        let mut state = match self.pool.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.available += 1;
        self.pool.freed.notify_one();
    }
}

/// A signing session: key material admitted under a pool slot.
///
/// The slot is held for the whole lifetime of the session, which covers
/// signing and any follow-up work the caller does while the session is
/// alive (placement, level upgrade). It is released when the session is
/// dropped, on every path.
pub struct SigningSession<'a> {
    material: &'a SigningMaterial,
    _slot: SlotGuard,
}

impl<'a> SigningSession<'a> {
    /// Open a session, blocking until a slot is free.
    pub fn open(pool: &SlotPool, material: &'a SigningMaterial) -> Result<Self> {
        let slot = pool.acquire()?;
        log::debug!("signing session opened");
        Ok(Self {
            material,
            _slot: slot,
        })
    }

    /// Open a session with an admission wait limit.
    pub fn open_timeout(
        pool: &SlotPool,
        material: &'a SigningMaterial,
        limit: Duration,
    ) -> Result<Self> {
        let slot = pool.acquire_timeout(limit)?;
        log::debug!("signing session opened (bounded wait)");
        Ok(Self {
            material,
            _slot: slot,
        })
    }

    pub fn material(&self) -> &SigningMaterial {
        self.material
    }

    /// Sign the canonical SignedInfo bytes.
    ///
    /// The block's signature method must match the one derived from
    /// this session's key type; a mismatch means the block was built
    /// for different material and signing it would produce an
    /// unverifiable signature.
    pub fn sign(&self, block: &SignedInfoBlock) -> Result<Vec<u8>> {
        let expected = sign::algorithm_uri(self.material.key_type());
        if block.signature_method() != expected {
            return Err(Error::CryptoFailure(format!(
                "SignedInfo built for {} but session key requires {}",
                block.signature_method(),
                expected
            )));
        }
        sign::sign(self.material.key(), block.canonical_bytes())
    }
}
