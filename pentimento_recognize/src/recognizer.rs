// Copyright 2025 the Pentimento Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recognizers that mutate a scene and report their work as deltas.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use pentimento_scene::{ElementId, Scene, SceneData, StrokeGeometry};
use tracing::debug;

use crate::classify::StrokeClassifier;
use crate::delta::{SceneDelta, SceneDeltaSet};

/// A recognizer over a whole drawing session.
///
/// Implementations may mutate the scene eagerly; everything they did must be
/// reported in the returned delta set so a caller (or a voting parent) can
/// veto it cleanly.
pub trait SceneRecognizer<S: StrokeGeometry, D: SceneData> {
    /// React to a completed session over the given strokes.
    fn session_completed(
        &mut self,
        scene: &mut Scene<S, D>,
        strokes: &[ElementId],
    ) -> SceneDeltaSet<D>;
}

/// Adapts a per-stroke classifier into a scene-mutating recognizer.
///
/// Every recognition becomes a single-child composite over the stroke,
/// added to the scene immediately and reported as a subtractive delta so
/// the caller can veto it. Recognitions whose semantic type an existing
/// parent of the stroke already claims are skipped; re-running the
/// recognizer over the same ink does not duplicate interpretations.
#[derive(Debug)]
pub struct StrokeSceneRecognizer<C> {
    classifier: C,
}

impl<C> StrokeSceneRecognizer<C> {
    /// Wrap a classifier.
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }

    /// React to one completed stroke.
    pub fn stroke_completed<S, D>(
        &mut self,
        scene: &mut Scene<S, D>,
        stroke: ElementId,
    ) -> SceneDeltaSet<D>
    where
        S: StrokeGeometry,
        D: SceneData,
        C: StrokeClassifier<S, D>,
    {
        let mut deltas = SceneDeltaSet::new();
        let Some(raw) = scene.stroke(stroke) else {
            return deltas;
        };
        let recognitions = self.classifier.classify(raw);
        for recognition in recognitions {
            let ty = recognition.data.semantic_type();
            let claimed = scene
                .parents(stroke)
                .iter()
                .any(|&p| scene.semantic_type(p).is_some_and(|t| t == ty));
            if claimed {
                continue;
            }
            match scene.add_composite(
                recognition.data,
                recognition.confidence,
                vec![stroke],
                vec![String::from("stroke")],
            ) {
                Ok(root) => {
                    deltas.add_delta(SceneDelta::subtractive(
                        root,
                        Vec::new(),
                        recognition.confidence,
                    ));
                }
                Err(err) => {
                    debug!(%err, "stroke proposal rejected");
                }
            }
        }
        deltas
    }
}

impl<S, D, C> SceneRecognizer<S, D> for StrokeSceneRecognizer<C>
where
    S: StrokeGeometry,
    D: SceneData,
    C: StrokeClassifier<S, D>,
{
    fn session_completed(
        &mut self,
        scene: &mut Scene<S, D>,
        strokes: &[ElementId],
    ) -> SceneDeltaSet<D> {
        let mut pooled = SceneDeltaSet::new();
        for &stroke in strokes {
            for delta in self.stroke_completed(scene, stroke) {
                pooled.add_delta(delta);
            }
        }
        pooled
    }
}

/// Polls several recognizers and arbitrates their proposals.
///
/// Children run in order and may mutate the scene as they go. Their pooled
/// deltas then pass through a minimum-confidence filter and an n-highest
/// cut; every losing delta is vetoed against the scene, so rejected
/// interpretations leave no residue.
pub struct VotingSceneRecognizer<S, D> {
    children: Vec<Box<dyn SceneRecognizer<S, D>>>,
    min_confidence: f64,
    n_highest: Option<usize>,
}

impl<S, D> fmt::Debug for VotingSceneRecognizer<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VotingSceneRecognizer")
            .field("children", &self.children.len())
            .field("min_confidence", &self.min_confidence)
            .field("n_highest", &self.n_highest)
            .finish_non_exhaustive()
    }
}

impl<S, D> VotingSceneRecognizer<S, D> {
    /// Create a voting recognizer with no children and no filtering.
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
            min_confidence: 0.0,
            n_highest: None,
        }
    }

    /// Add a child recognizer to poll.
    pub fn add_recognizer(&mut self, recognizer: Box<dyn SceneRecognizer<S, D>>) {
        self.children.push(recognizer);
    }

    /// Veto pooled deltas below `threshold`.
    pub fn set_min_confidence(&mut self, threshold: f64) {
        self.min_confidence = threshold;
    }

    /// Keep only the `n` most confident pooled deltas; `None` keeps all
    /// of them.
    pub fn set_n_highest(&mut self, n: Option<usize>) {
        self.n_highest = n;
    }
}

impl<S, D> Default for VotingSceneRecognizer<S, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StrokeGeometry, D: SceneData> SceneRecognizer<S, D> for VotingSceneRecognizer<S, D> {
    fn session_completed(
        &mut self,
        scene: &mut Scene<S, D>,
        strokes: &[ElementId],
    ) -> SceneDeltaSet<D> {
        let mut pooled = SceneDeltaSet::new();
        for child in &mut self.children {
            for delta in child.session_completed(scene, strokes) {
                pooled.add_delta(delta);
            }
        }
        let total = pooled.len();
        let keep = self.n_highest.unwrap_or(usize::MAX);
        let mut kept = SceneDeltaSet::new();
        for (i, delta) in pooled.into_iter().enumerate() {
            if i < keep && delta.confidence() >= self.min_confidence {
                kept.add_delta(delta);
            } else {
                delta.veto(scene);
            }
        }
        debug!(total, kept = kept.len(), "voting recognizer arbitrated");
        kept
    }
}
