//! Approximate membership filter (Bloom filter).
//!
//! Sized once from the expected element count `n` and target false-positive
//! rate `p`:
//!
//! - bits `m = ceil(-n · ln p / ln² 2)`
//! - hash functions `k = max(1, round(m / n · ln 2))`
//!
//! Bit positions come from double hashing two cheap string hashes (FNV-1a 64
//! and djb2 64): position `i` is `(h1 + i · h2) mod m`. The filter never
//! resizes; inserting past `n` silently raises the false-positive rate.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_2;

const WORD_BITS: usize = 64;

/// Fixed-size Bloom filter over string tokens.
///
/// # Example
///
/// ```rust
/// use echoless::services::deduplication::MembershipFilter;
///
/// let mut filter = MembershipFilter::new(1_000, 0.01)?;
/// filter.add(" ke");
/// assert!(filter.contains(" ke"));
/// assert_eq!(filter.stats().hash_function_count, 7);
/// # Ok::<(), echoless::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipFilter {
    words: Vec<u64>,
    size: usize,
    hash_count: u32,
    element_count: u64,
}

/// Diagnostic snapshot of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterStats {
    /// Number of bits (`m`).
    pub size: usize,
    /// Number of hash functions (`k`).
    pub hash_function_count: u32,
    /// Number of `add` calls since creation or the last `clear`.
    pub element_count: u64,
    /// Number of bits currently set.
    pub bits_set: usize,
    /// `(bits_set / size)^k`.
    pub estimated_false_positive_rate: f64,
}

/// Serializable filter contents, used to persist and restore a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    /// Number of bits.
    pub size: usize,
    /// Number of hash functions.
    pub hash_function_count: u32,
    /// Observed element count.
    pub element_count: u64,
    /// Bit array packed into 64-bit words, least significant bit first.
    pub words: Vec<u64>,
}

impl MembershipFilter {
    /// Creates an empty filter sized for `expected_elements` at
    /// `false_positive_rate`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `expected_elements` is zero or the
    /// rate is not strictly between 0 and 1.
    pub fn new(expected_elements: usize, false_positive_rate: f64) -> Result<Self> {
        if expected_elements == 0 {
            return Err(Error::Configuration(
                "filter expected_elements must be > 0".to_string(),
            ));
        }
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(Error::Configuration(format!(
                "filter false_positive_rate must be in (0, 1), got {false_positive_rate}"
            )));
        }

        let size = optimal_size(expected_elements, false_positive_rate);
        let hash_count = optimal_hash_count(size, expected_elements);

        Ok(Self {
            words: vec![0; size.div_ceil(WORD_BITS)],
            size,
            hash_count,
            element_count: 0,
        })
    }

    /// Inserts a token.
    pub fn add(&mut self, token: &str) {
        let (h1, h2) = hash_pair(token);
        for i in 0..u64::from(self.hash_count) {
            let bit = self.position(h1, h2, i);
            self.words[bit / WORD_BITS] |= 1 << (bit % WORD_BITS);
        }
        self.element_count += 1;
    }

    /// Returns true if the token may have been inserted.
    ///
    /// Never returns false for an inserted token.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        let (h1, h2) = hash_pair(token);
        (0..u64::from(self.hash_count)).all(|i| {
            let bit = self.position(h1, h2, i);
            self.words[bit / WORD_BITS] & (1 << (bit % WORD_BITS)) != 0
        })
    }

    /// Returns a diagnostic snapshot.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
    pub fn stats(&self) -> FilterStats {
        let bits_set: usize = self.words.iter().map(|w| w.count_ones() as usize).sum();
        let fill = bits_set as f64 / self.size as f64;
        FilterStats {
            size: self.size,
            hash_function_count: self.hash_count,
            element_count: self.element_count,
            bits_set,
            estimated_false_positive_rate: fill.powi(self.hash_count as i32),
        }
    }

    /// Resets every bit and the element count. Size and hash count are kept.
    pub fn clear(&mut self) {
        self.words.fill(0);
        self.element_count = 0;
    }

    /// Returns the number of bits.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Returns the number of hash functions.
    #[must_use]
    pub const fn hash_function_count(&self) -> u32 {
        self.hash_count
    }

    /// Copies the filter into a serializable state.
    #[must_use]
    pub fn export(&self) -> FilterState {
        FilterState {
            size: self.size,
            hash_function_count: self.hash_count,
            element_count: self.element_count,
            words: self.words.clone(),
        }
    }

    /// Rebuilds a filter from an exported state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if the state is internally
    /// inconsistent (zero size or hash count, word count not matching the
    /// size, bits set past the end).
    pub fn import(state: FilterState) -> Result<Self> {
        if state.size == 0 || state.hash_function_count == 0 {
            return Err(Error::InvariantViolation(
                "filter state has zero size or hash count".to_string(),
            ));
        }
        let expected_words = state.size.div_ceil(WORD_BITS);
        if state.words.len() != expected_words {
            return Err(Error::InvariantViolation(format!(
                "filter state declares {} bits but carries {} words (expected {expected_words})",
                state.size,
                state.words.len()
            )));
        }
        let tail_bits = state.size % WORD_BITS;
        if tail_bits != 0
            && let Some(last) = state.words.last()
            && last >> tail_bits != 0
        {
            return Err(Error::InvariantViolation(
                "filter state has bits set past its declared size".to_string(),
            ));
        }

        Ok(Self {
            words: state.words,
            size: state.size,
            hash_count: state.hash_function_count,
            element_count: state.element_count,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn position(&self, h1: u64, h2: u64, i: u64) -> usize {
        // size fits in usize, so the remainder does too.
        (h1.wrapping_add(i.wrapping_mul(h2)) % self.size as u64) as usize
    }
}

/// Bits needed for `n` elements at false-positive rate `p`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn optimal_size(n: usize, p: f64) -> usize {
    let bits = (-(n as f64) * p.ln() / (LN_2 * LN_2)).ceil();
    (bits as usize).max(1)
}

/// Hash functions minimizing the false-positive rate for `m` bits and `n`
/// elements (at least one).
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn optimal_hash_count(m: usize, n: usize) -> u32 {
    let k = (m as f64 / n as f64 * LN_2).round();
    (k as u32).max(1)
}

fn hash_pair(token: &str) -> (u64, u64) {
    let bytes = token.as_bytes();
    // An even step can cycle through a fraction of an even-sized table.
    (fnv1a_64(bytes), djb2_64(bytes) | 1)
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(PRIME)
    })
}

fn djb2_64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(5381u64, |hash, &b| {
        hash.wrapping_mul(33).wrapping_add(u64::from(b))
    })
}
