//! Transaction id sources
//!
//! The coordinator never reaches for a static counter. It is handed an
//! [`IdSource`] at construction, which keeps id sequences deterministic in
//! tests and lets a hosting process pick counter or random ids.

use crate::types::TxnId;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Default wrap modulus for [`SequentialIds`]
pub const DEFAULT_ID_MODULUS: u64 = (1 << 31) - 1;

/// Source of transaction ids
pub trait IdSource: Send + Sync {
    /// Produce the next id
    fn next_id(&self) -> TxnId;
}

/// Monotonic counter that wraps at a large modulus
///
/// Ids run `1, 2, .., modulus - 1` and then start again at 1. Zero is never
/// produced.
#[derive(Debug)]
pub struct SequentialIds {
    last: AtomicU64,
    modulus: u64,
}

impl SequentialIds {
    /// Counter with [`DEFAULT_ID_MODULUS`]
    pub fn new() -> Self {
        Self::with_modulus(DEFAULT_ID_MODULUS)
    }

    /// Counter wrapping at `modulus` (clamped to at least 2)
    pub fn with_modulus(modulus: u64) -> Self {
        Self::starting_after(0, modulus)
    }

    /// Counter whose first id follows `last`
    pub fn starting_after(last: u64, modulus: u64) -> Self {
        let modulus = modulus.max(2);
        Self {
            last: AtomicU64::new(last % modulus),
            modulus,
        }
    }

    /// Wrap modulus
    pub fn modulus(&self) -> u64 {
        self.modulus
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self) -> TxnId {
        let modulus = self.modulus;
        let advance = |x: u64| if x + 1 >= modulus { 1 } else { x + 1 };
        // fetch_update with a total closure never fails
        let prev = match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |x| Some(advance(x)))
        {
            Ok(prev) | Err(prev) => prev,
        };
        TxnId::new(advance(prev))
    }
}

/// Random ids drawn from UUID v4
///
/// Uniqueness is probabilistic (64 random bits); useful when several
/// processes share a resource manager and must not collide.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&self) -> TxnId {
        let (hi, lo) = Uuid::new_v4().as_u64_pair();
        match hi ^ lo {
            0 => TxnId::new(1),
            raw => TxnId::new(raw),
        }
    }
}
