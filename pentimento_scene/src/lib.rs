// Copyright 2025 the Pentimento Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pentimento Scene: an ambiguity database for freehand ink interpretation.
//!
//! ## Overview
//!
//! Recognizers propose competing, simultaneously-valid interpretations of a
//! stroke set, each with a confidence. This crate stores all of them at once
//! as a multi-parent interpretation graph and keeps the bookkeeping needed to
//! ask "what strokes does this interpretation cover", "do these two
//! interpretations conflict", and "what happens if the user accepts this
//! one".
//!
//! ## Elements
//!
//! The [`Scene`] owns three kinds of element, addressed by generational
//! [`ElementId`](types::ElementId) handles:
//!
//! - **Stroke**: a leaf wrapping one raw stroke handle (the
//!   [`StrokeGeometry`](types::StrokeGeometry) seam). Its coverage is a
//!   single bit, assigned from a counter that never reuses indices.
//! - **Composite**: an interior node holding recognized
//!   [`SceneData`](types::SceneData), a confidence, and an immutable child
//!   list. Its coverage is the union of its children's coverage, fixed at
//!   construction.
//! - **Choice**: a set of mutually exclusive same-type, same-support
//!   interpretations, used to bound combinatorial growth of the ambiguity
//!   forest. Options stay sorted by descending confidence and `which`
//!   selects the current best.
//!
//! A node may have any number of parents; ambiguity is exactly the case
//! where several competing parents reference the same child.
//!
//! ## Operations
//!
//! [`Scene::add_stroke`] and [`Scene::add_composite`] grow the graph.
//! [`Scene::add_or_merge_choice`] folds a proposal into an existing choice
//! over the same `(type, support)` pair, or creates one.
//! [`Scene::confirm`] accepts one interpretation as ground truth and removes
//! every interpretation that contradicts it (mark-and-sweep with a fresh
//! generation token per call). [`Scene::remove_element`] destroys an element
//! and cascades: a composite cannot survive the loss of a child, while a
//! choice survives until its last option is gone.
//!
//! Consistency queries ([`Scene::is_consistent`], [`Scene::same_support`],
//! [`Scene::is_covering_all`]) compare coverage bit-vectors and cost
//! O(words), never O(tree size).
//!
//! ## Errors and logging
//!
//! Rejected caller input returns [`SceneError`](error::SceneError) and
//! leaves the scene untouched. Internal-consistency faults panic.
//! Mutations emit `tracing` events at trace/debug level; no subscriber is
//! installed by this crate.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

pub mod error;
pub mod scene;
pub mod types;

pub use error::{SceneError, SceneResult};
pub use scene::Scene;
pub use types::{ChoiceOption, ChoiceOutcome, ElementId, SceneData, StrokeGeometry, Type};
