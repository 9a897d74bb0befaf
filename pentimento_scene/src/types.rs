// Copyright 2025 the Pentimento Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the scene: element identifiers, semantic type keys, and
//! the seams to external stroke storage and classifiers.

use alloc::borrow::Cow;
use alloc::string::String;
use core::fmt;

use kurbo::Rect;

/// Identifier for an element in the scene (generational).
///
/// Removing an element retires its id; a stale id handed back to the scene
/// answers `None`, `false`, or an empty slice rather than aliasing whatever
/// element reused the slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ElementId(pub(crate) u32, pub(crate) u32);

impl ElementId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Semantic type key of recognized data.
///
/// Cheap to clone; `'static` names (the common case) do not allocate.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Type(Cow<'static, str>);

impl Type {
    /// Create a type key from a name.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// The type name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Type {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

/// Recognized semantic payload attached to composite elements.
///
/// Produced by classifiers outside this crate; the scene only needs the
/// payload's semantic type (for indexing and choice merging) and value
/// semantics for tests and duplicate detection.
pub trait SceneData: Clone + PartialEq + fmt::Debug {
    /// The semantic type of this payload.
    fn semantic_type(&self) -> Type;
}

/// Opaque handle to raw stroke geometry stored outside this crate.
///
/// The scene only ever asks a stroke for its bounding box.
pub trait StrokeGeometry: fmt::Debug {
    /// Axis-aligned bounding box of the stroke.
    fn bounds(&self) -> Rect;
}

/// One option of a choice element: a competing interpretation of the same
/// stroke support.
#[derive(Clone, Debug)]
pub struct ChoiceOption<D> {
    /// The recognized payload of this option.
    pub data: D,
    /// Confidence of this option, in `[0, 1]`.
    pub confidence: f64,
    /// The composite element this option wraps.
    pub child: ElementId,
    /// Name of the child within the option.
    pub name: String,
}

/// Result of [`Scene::add_or_merge_choice`](crate::Scene::add_or_merge_choice).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChoiceOutcome {
    /// The proposal was folded into an existing choice over the same
    /// `(type, support)` pair.
    Merged(ElementId),
    /// No mergeable choice existed; a new one was created.
    Created(ElementId),
}

impl ChoiceOutcome {
    /// The choice element the proposal ended up in.
    pub fn id(self) -> ElementId {
        match self {
            Self::Merged(id) | Self::Created(id) => id,
        }
    }
}
