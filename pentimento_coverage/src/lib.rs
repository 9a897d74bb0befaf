// Copyright 2025 the Pentimento Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pentimento Coverage: bit-vector support sets for ink interpretation.
//!
//! An interpretation of freehand pen strokes covers some subset of the leaf
//! strokes in a scene. This crate provides [`Coverage`], the identifier of
//! that subset: a growable bit-vector keyed by leaf stroke index, with the
//! word-wise comparisons the interpretation database is built on.
//!
//! - **Consistency**: two interpretations are consistent iff their supports
//!   are disjoint ([`Coverage::intersects_below`] is false).
//! - **Same support**: two interpretations compete for the same strokes iff
//!   their supports are identical ([`Coverage::same_below`]).
//! - **Covering**: an interpretation accounts for every live stroke iff its
//!   support, together with a deleted-stroke mask, has every index set
//!   ([`Coverage::covers_all_below`]).
//!
//! All comparisons are restricted to indices below a caller-supplied bound
//! (the stroke count at comparison time), so growing the leaf space never
//! retroactively changes an earlier comparison. Comparisons cost O(words),
//! never O(interpretation tree size).
//!
//! # Example
//!
//! ```rust
//! use pentimento_coverage::Coverage;
//!
//! let a = Coverage::union(&Coverage::leaf(0), &Coverage::leaf(1));
//! let b = Coverage::leaf(2);
//!
//! // Disjoint supports: consistent interpretations.
//! assert!(!a.intersects_below(&b, 3));
//! // Together they cover all three leaves.
//! assert!(Coverage::union(&a, &b).covers_all_below(&Coverage::new(), 3));
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod coverage;

pub use coverage::Coverage;
