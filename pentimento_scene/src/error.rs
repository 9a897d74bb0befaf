// Copyright 2025 the Pentimento Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for scene mutations.

use thiserror::Error;

/// Result type for scene mutations.
pub type SceneResult<T> = Result<T, SceneError>;

/// Rejected caller input. The scene is left unchanged in every case.
///
/// Internal-consistency faults (index desync, dangling bookkeeping) are not
/// represented here; those are bugs and panic.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum SceneError {
    /// A composite needs at least one child.
    #[error("composite needs at least one child")]
    NoChildren,

    /// Children and names must be parallel.
    #[error("children/names length mismatch: {children} children, {names} names")]
    ChildCountMismatch {
        /// Number of children supplied.
        children: usize,
        /// Number of names supplied.
        names: usize,
    },

    /// An element id refers to a removed or never-allocated element.
    #[error("stale element id")]
    StaleElement,

    /// The operation needs a composite element.
    #[error("element is not a composite")]
    NotAComposite,

    /// The operation needs a choice element.
    #[error("element is not a choice")]
    NotAChoice,

    /// Confidence must lie in `[0, 1]`.
    #[error("confidence out of range: {0}")]
    ConfidenceRange(f64),

    /// Choice option selection out of range.
    #[error("choice option {which} out of range, have {len}")]
    WhichOutOfRange {
        /// Requested option index.
        which: usize,
        /// Number of options available.
        len: usize,
    },
}
