// Copyright 2025 the Pentimento Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pentimento Recognize: recognizer composition over an ambiguity scene.
//!
//! ## Overview
//!
//! Actual recognition engines live behind two seams. A
//! [`StrokeClassifier`] turns one raw stroke into a confidence-ordered
//! [`RecognitionSet`]; a [`SceneRecognizer`] reacts to a completed drawing
//! session by mutating the scene. This crate supplies the plumbing between
//! them: it adapts classifiers into recognizers, pools competing engines,
//! and keeps every proposal revocable.
//!
//! ## Deltas
//!
//! A [`SceneDelta`] is one revocable proposal. An additive delta describes
//! an element not yet in the scene; committing it performs the addition. A
//! subtractive delta describes elements already added; vetoing it rolls
//! them back. Either way a rejected proposal leaves no half-applied state
//! behind. [`SceneDeltaSet`] keeps proposals ordered by descending
//! confidence.
//!
//! ## Voting
//!
//! [`VotingStrokeClassifier`] pools several classifiers' readings of one
//! stroke. [`VotingSceneRecognizer`] pools several recognizers' deltas and
//! arbitrates: proposals below a confidence threshold or beyond an
//! n-highest cut are vetoed against the scene, the rest survive as the
//! accepted ambiguity.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

pub mod classify;
pub mod delta;
pub mod recognizer;

pub use classify::{Recognition, RecognitionSet, StrokeClassifier, VotingStrokeClassifier};
pub use delta::{SceneDelta, SceneDeltaSet};
pub use recognizer::{SceneRecognizer, StrokeSceneRecognizer, VotingSceneRecognizer};
