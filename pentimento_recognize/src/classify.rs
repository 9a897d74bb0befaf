// Copyright 2025 the Pentimento Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Classifier seam and pooled voting over classifier output.
//!
//! A [`StrokeClassifier`] is the boundary to whatever produces semantic
//! readings of a raw stroke. This crate never looks inside; it only orders,
//! filters, and pools the [`Recognition`]s that come back.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

/// One classifier verdict: a recognized payload with a confidence.
#[derive(Clone, Debug, PartialEq)]
pub struct Recognition<D> {
    /// Recognized payload.
    pub data: D,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Classifier output, ordered by non-increasing confidence.
///
/// The empty set does not allocate, so "nothing recognized" is free to
/// build and return.
#[derive(Clone, Debug, PartialEq)]
pub struct RecognitionSet<D> {
    recognitions: Vec<Recognition<D>>,
}

impl<D> RecognitionSet<D> {
    /// Create an empty set. Does not allocate.
    pub const fn new() -> Self {
        Self {
            recognitions: Vec::new(),
        }
    }

    /// Insert before the first strictly less confident entry; equal
    /// confidences keep insertion order.
    pub fn add_recognition(&mut self, recognition: Recognition<D>) {
        let pos = self
            .recognitions
            .iter()
            .position(|r| recognition.confidence > r.confidence)
            .unwrap_or(self.recognitions.len());
        self.recognitions.insert(pos, recognition);
    }

    /// The most confident recognition.
    pub fn best(&self) -> Option<&Recognition<D>> {
        self.recognitions.first()
    }

    /// Number of recognitions.
    pub fn len(&self) -> usize {
        self.recognitions.len()
    }

    /// Whether the set holds no recognition.
    pub fn is_empty(&self) -> bool {
        self.recognitions.is_empty()
    }

    /// Iterate the recognitions, best first.
    pub fn iter(&self) -> core::slice::Iter<'_, Recognition<D>> {
        self.recognitions.iter()
    }

    /// Drop every recognition whose confidence is below `threshold`.
    pub fn min_confidence(&mut self, threshold: f64) {
        self.recognitions.retain(|r| r.confidence >= threshold);
    }

    /// Keep only the `n` most confident recognitions.
    pub fn n_highest(&mut self, n: usize) {
        self.recognitions.truncate(n);
    }
}

impl<D> Default for RecognitionSet<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> IntoIterator for RecognitionSet<D> {
    type Item = Recognition<D>;
    type IntoIter = alloc::vec::IntoIter<Recognition<D>>;

    fn into_iter(self) -> Self::IntoIter {
        self.recognitions.into_iter()
    }
}

impl<'a, D> IntoIterator for &'a RecognitionSet<D> {
    type Item = &'a Recognition<D>;
    type IntoIter = core::slice::Iter<'a, Recognition<D>>;

    fn into_iter(self) -> Self::IntoIter {
        self.recognitions.iter()
    }
}

/// A per-stroke classifier.
///
/// `&mut self` because real classifiers keep feature caches and incremental
/// state between calls.
pub trait StrokeClassifier<S, D> {
    /// Classify one completed stroke.
    fn classify(&mut self, stroke: &S) -> RecognitionSet<D>;
}

/// Polls several classifiers and pools their output into one ordered set.
///
/// Pooled recognitions pass through a minimum-confidence filter and then an
/// n-highest cut. Both knobs are runtime-configurable; by default nothing
/// is filtered.
pub struct VotingStrokeClassifier<S, D> {
    children: Vec<Box<dyn StrokeClassifier<S, D>>>,
    min_confidence: f64,
    n_highest: Option<usize>,
}

impl<S, D> fmt::Debug for VotingStrokeClassifier<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VotingStrokeClassifier")
            .field("children", &self.children.len())
            .field("min_confidence", &self.min_confidence)
            .field("n_highest", &self.n_highest)
            .finish_non_exhaustive()
    }
}

impl<S, D> VotingStrokeClassifier<S, D> {
    /// Create a voting classifier with no children and no filtering.
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
            min_confidence: 0.0,
            n_highest: None,
        }
    }

    /// Add a child classifier to poll.
    pub fn add_classifier(&mut self, classifier: Box<dyn StrokeClassifier<S, D>>) {
        self.children.push(classifier);
    }

    /// Drop pooled recognitions below `threshold`.
    pub fn set_min_confidence(&mut self, threshold: f64) {
        self.min_confidence = threshold;
    }

    /// Keep only the `n` most confident pooled recognitions; `None` keeps
    /// all of them.
    pub fn set_n_highest(&mut self, n: Option<usize>) {
        self.n_highest = n;
    }
}

impl<S, D> Default for VotingStrokeClassifier<S, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, D> StrokeClassifier<S, D> for VotingStrokeClassifier<S, D> {
    fn classify(&mut self, stroke: &S) -> RecognitionSet<D> {
        let mut pooled = RecognitionSet::new();
        for child in &mut self.children {
            for recognition in child.classify(stroke) {
                pooled.add_recognition(recognition);
            }
        }
        pooled.min_confidence(self.min_confidence);
        if let Some(n) = self.n_highest {
            pooled.n_highest(n);
        }
        pooled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    fn rec(name: &'static str, confidence: f64) -> Recognition<&'static str> {
        Recognition {
            data: name,
            confidence,
        }
    }

    struct Canned(Vec<Recognition<&'static str>>);

    impl StrokeClassifier<(), &'static str> for Canned {
        fn classify(&mut self, _stroke: &()) -> RecognitionSet<&'static str> {
            let mut set = RecognitionSet::new();
            for r in self.0.clone() {
                set.add_recognition(r);
            }
            set
        }
    }

    #[test]
    fn recognition_set_orders_and_breaks_ties_by_insertion() {
        let mut set = RecognitionSet::new();
        assert!(set.is_empty());
        assert_eq!(set.best(), None);
        set.add_recognition(rec("mid", 0.5));
        set.add_recognition(rec("high", 0.9));
        set.add_recognition(rec("mid2", 0.5));
        set.add_recognition(rec("low", 0.1));
        let order: Vec<&'static str> = set.iter().map(|r| r.data).collect();
        assert_eq!(order, ["high", "mid", "mid2", "low"]);
        assert_eq!(set.best().unwrap().data, "high");
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn min_confidence_keeps_the_boundary() {
        let mut set = RecognitionSet::new();
        set.add_recognition(rec("a", 0.9));
        set.add_recognition(rec("b", 0.5));
        set.add_recognition(rec("c", 0.4));
        set.min_confidence(0.5);
        let kept: Vec<&'static str> = set.iter().map(|r| r.data).collect();
        // Strictly-below entries drop; the boundary itself survives.
        assert_eq!(kept, ["a", "b"]);
    }

    #[test]
    fn n_highest_truncates_in_order() {
        let mut set = RecognitionSet::new();
        for (name, conf) in [("a", 0.3), ("b", 0.9), ("c", 0.6)] {
            set.add_recognition(rec(name, conf));
        }
        set.n_highest(2);
        let kept: Vec<&'static str> = set.iter().map(|r| r.data).collect();
        assert_eq!(kept, ["b", "c"]);
        set.n_highest(10);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn voting_classifier_pools_children_and_filters() {
        let mut voting = VotingStrokeClassifier::new();
        voting.add_classifier(Box::new(Canned(vec![rec("square", 0.8), rec("blob", 0.2)])));
        voting.add_classifier(Box::new(Canned(vec![rec("line", 0.6)])));
        voting.set_min_confidence(0.5);

        let pooled = voting.classify(&());
        let kept: Vec<&'static str> = pooled.iter().map(|r| r.data).collect();
        assert_eq!(kept, ["square", "line"]);

        voting.set_n_highest(Some(1));
        let pooled = voting.classify(&());
        let kept: Vec<&'static str> = pooled.iter().map(|r| r.data).collect();
        assert_eq!(kept, ["square"]);
    }

    #[test]
    fn voting_classifier_with_no_children_answers_empty() {
        let mut voting: VotingStrokeClassifier<(), &'static str> = VotingStrokeClassifier::new();
        assert!(voting.classify(&()).is_empty());
    }
}
