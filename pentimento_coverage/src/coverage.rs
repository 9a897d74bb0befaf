// Copyright 2025 the Pentimento Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The coverage bit-vector and its bounded comparisons.

use alloc::vec::Vec;
use core::fmt;

const WORD_BITS: usize = u64::BITS as usize;

/// Set of leaf stroke indices covered by an interpretation.
///
/// Backed by a vector of 64-bit words. The vector grows on [`Coverage::set`]
/// and [`Coverage::union_with`]; missing trailing words are treated as zero,
/// so operands of different lengths compare as if zero-extended.
///
/// Comparisons take an index bound `n` and ignore every bit at or above it.
/// Callers pass the stroke count current at comparison time, which keeps old
/// coverage values comparable after new leaves are allocated.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Coverage {
    words: Vec<u64>,
}

impl Coverage {
    /// Create an empty coverage set. Does not allocate.
    pub const fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Create a singleton set covering one leaf index.
    pub fn leaf(index: u32) -> Self {
        let mut c = Self::new();
        c.set(index);
        c
    }

    /// Set the bit for a leaf index, growing the word vector as needed.
    pub fn set(&mut self, index: u32) {
        let w = index as usize / WORD_BITS;
        if self.words.len() <= w {
            self.words.resize(w + 1, 0);
        }
        self.words[w] |= 1_u64 << (index as usize % WORD_BITS);
    }

    /// Return whether the bit for a leaf index is set.
    pub fn get(&self, index: u32) -> bool {
        let w = index as usize / WORD_BITS;
        self.words
            .get(w)
            .is_some_and(|word| word & (1_u64 << (index as usize % WORD_BITS)) != 0)
    }

    /// OR another set into this one, growing as needed.
    ///
    /// This is the only mutation besides [`Coverage::set`]; coverage values
    /// are otherwise fixed once built.
    pub fn union_with(&mut self, other: &Self) {
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (dst, src) in self.words.iter_mut().zip(other.words.iter()) {
            *dst |= *src;
        }
    }

    /// Return the union of two sets.
    pub fn union(a: &Self, b: &Self) -> Self {
        let mut out = a.clone();
        out.union_with(b);
        out
    }

    /// Return whether `self AND other` has any bit set below `n`.
    ///
    /// False means the two supports are disjoint below `n`, which is the
    /// consistency condition for interpretations.
    pub fn intersects_below(&self, other: &Self, n: u32) -> bool {
        !both_below_empty(self, other, n, |a, b| a & b)
    }

    /// Return whether `self XOR other` has no bit set below `n`.
    ///
    /// True means the two supports are identical below `n`.
    pub fn same_below(&self, other: &Self, n: u32) -> bool {
        both_below_empty(self, other, n, |a, b| a ^ b)
    }

    /// Return whether `self OR mask` has every bit below `n` set.
    ///
    /// `mask` is typically the deleted-stroke set, so leaves that no longer
    /// exist do not count against covering.
    pub fn covers_all_below(&self, mask: &Self, n: u32) -> bool {
        let n = n as usize;
        let full = n / WORD_BITS;
        for i in 0..full {
            if self.word(i) | mask.word(i) != u64::MAX {
                return false;
            }
        }
        let rem = n % WORD_BITS;
        if rem != 0 {
            let m = (1_u64 << rem) - 1;
            if (self.word(full) | mask.word(full)) & m != m {
                return false;
            }
        }
        true
    }

    /// Return whether no bit below `n` is set.
    pub fn is_empty_below(&self, n: u32) -> bool {
        both_below_empty(self, &Self::new(), n, |a, _| a)
    }

    /// Iterate the set leaf indices in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            (0..WORD_BITS).filter_map(move |b| {
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "leaf indices are u32 by construction; words beyond u32::MAX indices are never allocated"
                )]
                (word & (1_u64 << b) != 0).then_some((w * WORD_BITS + b) as u32)
            })
        })
    }

    fn word(&self, i: usize) -> u64 {
        self.words.get(i).copied().unwrap_or(0)
    }
}

/// Apply `op` word-wise to both operands and return whether the result is
/// all-zero below bit index `n`.
fn both_below_empty(a: &Coverage, b: &Coverage, n: u32, op: impl Fn(u64, u64) -> u64) -> bool {
    let n = n as usize;
    let full = n / WORD_BITS;
    for i in 0..full {
        if op(a.word(i), b.word(i)) != 0 {
            return false;
        }
    }
    let rem = n % WORD_BITS;
    if rem != 0 {
        let m = (1_u64 << rem) - 1;
        if op(a.word(full), b.word(full)) & m != 0 {
            return false;
        }
    }
    true
}

impl fmt::Debug for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Coverage")?;
        f.debug_set().entries(self.ones()).finish()
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, one) in self.ones().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{one}")?;
        }
        write!(f, "}}")
    }
}
