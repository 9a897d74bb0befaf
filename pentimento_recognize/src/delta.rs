// Copyright 2025 the Pentimento Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Commit/veto protocol for recognizer proposals.

use alloc::string::String;
use alloc::vec::Vec;

use pentimento_scene::{ElementId, Scene, SceneData, SceneResult, StrokeGeometry};
use tracing::trace;

/// One proposed change to a scene.
///
/// The two variants differ in when the scene is touched. An additive delta
/// describes work not yet done: building it is free of side effects and
/// [`SceneDelta::commit`] performs the addition. A subtractive delta
/// describes work already done: the recognizer has mutated the scene up
/// front and [`SceneDelta::veto`] rolls the mutation back.
///
/// Either way, a delta that loses a vote can be discarded without leaking
/// half-applied state.
#[derive(Clone, Debug, PartialEq)]
pub enum SceneDelta<D> {
    /// A composite to add once the proposal is accepted.
    Additive {
        /// Recognized payload of the proposed composite.
        data: D,
        /// Confidence of the proposal, in `[0, 1]`.
        confidence: f64,
        /// Children of the proposed composite.
        children: Vec<ElementId>,
        /// Names parallel to `children`.
        names: Vec<String>,
        /// The materialized element, `None` until committed.
        root: Option<ElementId>,
    },
    /// Elements already added, to remove if the proposal is rejected.
    Subtractive {
        /// Root of the interpretation already in the scene.
        root: ElementId,
        /// Further elements created alongside the root.
        extras: Vec<ElementId>,
        /// Confidence of the proposal, in `[0, 1]`.
        confidence: f64,
    },
}

impl<D: SceneData> SceneDelta<D> {
    /// A proposal that has not touched the scene yet.
    pub fn additive(
        data: D,
        confidence: f64,
        children: Vec<ElementId>,
        names: Vec<String>,
    ) -> Self {
        Self::Additive {
            data,
            confidence,
            children,
            names,
            root: None,
        }
    }

    /// A proposal whose elements are already in the scene.
    pub fn subtractive(root: ElementId, extras: Vec<ElementId>, confidence: f64) -> Self {
        Self::Subtractive {
            root,
            extras,
            confidence,
        }
    }

    /// Confidence of the proposal.
    pub fn confidence(&self) -> f64 {
        match self {
            Self::Additive { confidence, .. } | Self::Subtractive { confidence, .. } => *confidence,
        }
    }

    /// The root element of the proposal. For an additive delta this is
    /// `None` until [`SceneDelta::commit`] has run.
    pub fn root(&self) -> Option<ElementId> {
        match self {
            Self::Additive { root, .. } => *root,
            Self::Subtractive { root, .. } => Some(*root),
        }
    }

    /// Apply the proposal to the scene.
    ///
    /// Additive: perform the addition and record the new root; a second
    /// commit is a no-op. Subtractive: nothing to do, the scene already
    /// holds the elements.
    pub fn commit<S: StrokeGeometry>(&mut self, scene: &mut Scene<S, D>) -> SceneResult<()> {
        match self {
            Self::Additive {
                data,
                confidence,
                children,
                names,
                root,
            } => {
                if root.is_none() {
                    let id =
                        scene.add_composite(data.clone(), *confidence, children.clone(), names.clone())?;
                    trace!(?id, "committed additive delta");
                    *root = Some(id);
                }
                Ok(())
            }
            Self::Subtractive { .. } => Ok(()),
        }
    }

    /// Reject the proposal.
    ///
    /// Additive: nothing to undo, the scene was never touched. Subtractive:
    /// remove the root and every extra element.
    pub fn veto<S: StrokeGeometry>(&self, scene: &mut Scene<S, D>) {
        match self {
            Self::Additive { .. } => {}
            Self::Subtractive { root, extras, .. } => {
                trace!(root = ?*root, "vetoed subtractive delta");
                scene.remove_element(*root);
                for &extra in extras {
                    scene.remove_element(extra);
                }
            }
        }
    }
}

/// Proposals ordered by non-increasing confidence.
///
/// The empty set does not allocate, so "nothing recognized" is free to
/// build and return.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneDeltaSet<D> {
    deltas: Vec<SceneDelta<D>>,
}

impl<D: SceneData> SceneDeltaSet<D> {
    /// Create an empty set. Does not allocate.
    pub const fn new() -> Self {
        Self { deltas: Vec::new() }
    }

    /// Insert a delta before the first strictly less confident one; equal
    /// confidences keep insertion order.
    pub fn add_delta(&mut self, delta: SceneDelta<D>) {
        let pos = self
            .deltas
            .iter()
            .position(|d| delta.confidence() > d.confidence())
            .unwrap_or(self.deltas.len());
        self.deltas.insert(pos, delta);
    }

    /// The most confident proposal.
    pub fn best(&self) -> Option<&SceneDelta<D>> {
        self.deltas.first()
    }

    /// Number of proposals.
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// Whether the set holds no proposal.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Iterate the proposals, best first.
    pub fn iter(&self) -> core::slice::Iter<'_, SceneDelta<D>> {
        self.deltas.iter()
    }

    /// Commit every proposal, best first, stopping at the first error.
    pub fn commit_all<S: StrokeGeometry>(&mut self, scene: &mut Scene<S, D>) -> SceneResult<()> {
        for delta in &mut self.deltas {
            delta.commit(scene)?;
        }
        Ok(())
    }

    /// Veto every proposal.
    pub fn veto_all<S: StrokeGeometry>(&self, scene: &mut Scene<S, D>) {
        for delta in &self.deltas {
            delta.veto(scene);
        }
    }
}

impl<D: SceneData> Default for SceneDeltaSet<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> IntoIterator for SceneDeltaSet<D> {
    type Item = SceneDelta<D>;
    type IntoIter = alloc::vec::IntoIter<SceneDelta<D>>;

    fn into_iter(self) -> Self::IntoIter {
        self.deltas.into_iter()
    }
}

impl<'a, D> IntoIterator for &'a SceneDeltaSet<D> {
    type Item = &'a SceneDelta<D>;
    type IntoIter = core::slice::Iter<'a, SceneDelta<D>>;

    fn into_iter(self) -> Self::IntoIter {
        self.deltas.iter()
    }
}
