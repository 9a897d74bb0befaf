// Copyright 2025 the Pentimento Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core scene implementation: element storage, mutation, and consistency
//! queries.

use alloc::string::String;
use alloc::{vec, vec::Vec};
use core::fmt;

use hashbrown::HashMap;
use kurbo::Rect;
use pentimento_coverage::Coverage;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::error::{SceneError, SceneResult};
use crate::types::{ChoiceOption, ChoiceOutcome, ElementId, SceneData, StrokeGeometry, Type};

/// One slot of the element arena.
#[derive(Debug)]
struct Node<S, D> {
    generation: u32,
    kind: Kind<S, D>,
    /// Leaf strokes reachable from this element. Fixed at construction for
    /// strokes and composites; grows on merge for choices.
    coverage: Coverage,
    /// Union of the bounding boxes of covered strokes.
    bounds: Rect,
    parents: SmallVec<[ElementId; 2]>,
    /// Confirm token of the most recent [`Scene::confirm`] that marked this
    /// node as part of the accepted interpretation.
    mark: u64,
}

impl<S, D> Node<S, D> {
    fn new(generation: u32, kind: Kind<S, D>, coverage: Coverage, bounds: Rect) -> Self {
        Self {
            generation,
            kind,
            coverage,
            bounds,
            parents: SmallVec::new(),
            mark: 0,
        }
    }
}

#[derive(Debug)]
enum Kind<S, D> {
    Stroke {
        stroke: S,
    },
    Composite {
        data: D,
        confidence: f64,
        children: Vec<ElementId>,
        names: Vec<String>,
    },
    Choice {
        data_type: Type,
        /// Competing options, sorted by non-increasing confidence.
        options: Vec<ChoiceOption<D>>,
        /// Mirror of `options[i].child`, kept so traversal hands out a
        /// uniform `&[ElementId]` for every interior kind.
        children: Vec<ElementId>,
        which: usize,
    },
}

/// The ambiguity database.
///
/// A scene stores every competing interpretation of a stroke set at once.
/// Stroke elements are leaves; composite elements group children under a
/// recognized payload and a confidence; choice elements hold mutually
/// exclusive same-type, same-support interpretations. Elements form a DAG
/// because several interpretations may claim the same child.
///
/// `S` is the raw stroke handle (see [`StrokeGeometry`]), `D` the recognized
/// payload (see [`SceneData`]).
///
/// Roots (elements with no parent) are kept sorted by non-increasing
/// confidence, so `roots()[0]` is always the current best top-level
/// interpretation.
///
/// ## Example
///
/// ```rust
/// use kurbo::Rect;
/// use pentimento_scene::{Scene, SceneData, StrokeGeometry, Type};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Shape(&'static str);
///
/// impl SceneData for Shape {
///     fn semantic_type(&self) -> Type {
///         Type::new(self.0)
///     }
/// }
///
/// #[derive(Debug)]
/// struct Dot(f64, f64);
///
/// impl StrokeGeometry for Dot {
///     fn bounds(&self) -> Rect {
///         Rect::new(self.0, self.1, self.0 + 1.0, self.1 + 1.0)
///     }
/// }
///
/// let mut scene: Scene<Dot, Shape> = Scene::new();
/// let s0 = scene.add_stroke(Dot(0.0, 0.0));
/// let s1 = scene.add_stroke(Dot(1.0, 0.0));
/// let square = scene
///     .add_composite(
///         Shape("square"),
///         0.9,
///         vec![s0, s1],
///         vec!["side".into(), "side".into()],
///     )
///     .unwrap();
///
/// assert_eq!(scene.roots(), [square]);
/// assert!(scene.is_covering_all(square));
/// ```
pub struct Scene<S: StrokeGeometry, D: SceneData> {
    /// slots
    nodes: Vec<Option<Node<S, D>>>,
    /// last generation per slot (persists across frees)
    generations: Vec<u32>,
    free_list: Vec<usize>,
    /// Elements with no parent, sorted by non-increasing confidence.
    /// Strokes are never listed here.
    roots: Vec<ElementId>,
    /// Live strokes in insertion order.
    strokes: Vec<ElementId>,
    /// Live composites and choices per semantic type, in insertion order.
    type_index: HashMap<Type, Vec<ElementId>>,
    /// Live choices per semantic type, for merge lookup.
    choice_index: HashMap<Type, Vec<ElementId>>,
    /// Leaf indices handed out so far. Never decremented; removing a stroke
    /// retires its index into `deleted_strokes` instead.
    stroke_count: u32,
    deleted_strokes: Coverage,
    composite_count: usize,
    confirm_epoch: u64,
}

impl<S: StrokeGeometry, D: SceneData> fmt::Debug for Scene<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.nodes.len();
        let alive = self.nodes.iter().filter(|n| n.is_some()).count();
        f.debug_struct("Scene")
            .field("nodes_total", &total)
            .field("nodes_alive", &alive)
            .field("free_list", &self.free_list.len())
            .field("stroke_count", &self.stroke_count)
            .field("composite_count", &self.composite_count)
            .finish_non_exhaustive()
    }
}

impl<S: StrokeGeometry, D: SceneData> Default for Scene<S, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StrokeGeometry, D: SceneData> Scene<S, D> {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            roots: Vec::new(),
            strokes: Vec::new(),
            type_index: HashMap::new(),
            choice_index: HashMap::new(),
            stroke_count: 0,
            deleted_strokes: Coverage::new(),
            composite_count: 0,
            confirm_epoch: 0,
        }
    }

    // --- growth ---

    /// Add a raw stroke as a new leaf element.
    ///
    /// The leaf gets the next coverage index; indices are never reused, so
    /// coverage values built before this call keep comparing the same.
    pub fn add_stroke(&mut self, stroke: S) -> ElementId {
        let leaf = self.stroke_count;
        self.stroke_count += 1;
        let coverage = Coverage::leaf(leaf);
        let bounds = stroke.bounds();
        let id = self.alloc_slot(Kind::Stroke { stroke }, coverage, bounds);
        self.strokes.push(id);
        trace!(?id, leaf, "added stroke");
        id
    }

    /// Add a recognized interpretation grouping `children` under `data`.
    ///
    /// `names` labels each child and must be parallel to `children`. The new
    /// element's coverage and bounds are the unions over the children, fixed
    /// here and never updated. The element becomes a root; each child gains
    /// it as a parent and loses root status if it had it.
    ///
    /// On error the scene is unchanged.
    pub fn add_composite(
        &mut self,
        data: D,
        confidence: f64,
        children: Vec<ElementId>,
        names: Vec<String>,
    ) -> SceneResult<ElementId> {
        if children.is_empty() {
            return Err(SceneError::NoChildren);
        }
        if children.len() != names.len() {
            return Err(SceneError::ChildCountMismatch {
                children: children.len(),
                names: names.len(),
            });
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(SceneError::ConfidenceRange(confidence));
        }
        let mut coverage = Coverage::new();
        let mut bounds: Option<Rect> = None;
        for &child in &children {
            let node = self.node_opt(child).ok_or(SceneError::StaleElement)?;
            coverage.union_with(&node.coverage);
            bounds = Some(match bounds {
                Some(b) => b.union(node.bounds),
                None => node.bounds,
            });
        }
        let bounds = bounds.expect("children are non-empty");
        let ty = data.semantic_type();
        let attach = children.clone();
        let id = self.alloc_slot(
            Kind::Composite {
                data,
                confidence,
                children,
                names,
            },
            coverage,
            bounds,
        );
        for child in attach {
            self.attach_parent(id, child);
        }
        debug!(?id, ty = %ty, confidence, "added composite");
        self.index_composite(id, ty, confidence);
        Ok(id)
    }

    /// Fold a competing interpretation into a choice, or create one.
    ///
    /// `child` must be a live composite. If a choice of the same semantic
    /// type over the same stroke support already exists, the proposal joins
    /// it as a new option (sorted by confidence, selection reset to the
    /// best); proposing a child the choice already holds is a no-op beyond
    /// re-attaching the parent link. Otherwise a fresh single-option choice
    /// is created and claims the child.
    ///
    /// On error the scene is unchanged.
    pub fn add_or_merge_choice(
        &mut self,
        data: D,
        confidence: f64,
        child: ElementId,
        name: String,
    ) -> SceneResult<ChoiceOutcome> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(SceneError::ConfidenceRange(confidence));
        }
        let child_node = self.node_opt(child).ok_or(SceneError::StaleElement)?;
        if !matches!(child_node.kind, Kind::Composite { .. }) {
            return Err(SceneError::NotAComposite);
        }
        let child_cov = child_node.coverage.clone();
        let child_bounds = child_node.bounds;
        let ty = data.semantic_type();

        let existing = self
            .choice_index
            .get(&ty)
            .into_iter()
            .flatten()
            .copied()
            .find(|&c| {
                self.node(c)
                    .coverage
                    .same_below(&child_cov, self.stroke_count)
            });

        let Some(choice_id) = existing else {
            let option = ChoiceOption {
                data,
                confidence,
                child,
                name,
            };
            let id = self.alloc_slot(
                Kind::Choice {
                    data_type: ty.clone(),
                    options: vec![option],
                    children: vec![child],
                    which: 0,
                },
                child_cov,
                child_bounds,
            );
            self.choice_index.entry(ty.clone()).or_default().push(id);
            self.attach_parent(id, child);
            debug!(?id, ty = %ty, confidence, "created choice");
            self.index_composite(id, ty, confidence);
            return Ok(ChoiceOutcome::Created(id));
        };

        let duplicate = match &self.node(choice_id).kind {
            Kind::Choice { options, .. } => options.iter().any(|o| o.child == child),
            _ => panic!("choice index entry is not a choice"),
        };
        if duplicate {
            self.attach_parent(choice_id, child);
            return Ok(ChoiceOutcome::Merged(choice_id));
        }

        let node = self.node_mut(choice_id);
        let Kind::Choice {
            options,
            children,
            which,
            ..
        } = &mut node.kind
        else {
            panic!("choice index entry is not a choice");
        };
        let pos = options
            .iter()
            .position(|o| confidence > o.confidence)
            .unwrap_or(options.len());
        options.insert(
            pos,
            ChoiceOption {
                data,
                confidence,
                child,
                name,
            },
        );
        children.insert(pos, child);
        *which = 0;
        node.bounds = node.bounds.union(child_bounds);
        self.attach_parent(choice_id, child);
        self.reposition_root(choice_id);
        debug!(?choice_id, ty = %ty, confidence, "merged choice option");
        Ok(ChoiceOutcome::Merged(choice_id))
    }

    /// Select option `which` of a choice as the current interpretation.
    ///
    /// The choice's reported confidence, data, and root position follow the
    /// selected option. On error the selection is unchanged.
    pub fn set_which(&mut self, choice: ElementId, which: usize) -> SceneResult<()> {
        let node = self.node_opt_mut(choice).ok_or(SceneError::StaleElement)?;
        match &mut node.kind {
            Kind::Choice {
                options,
                which: current,
                ..
            } => {
                if which >= options.len() {
                    return Err(SceneError::WhichOutOfRange {
                        which,
                        len: options.len(),
                    });
                }
                *current = which;
            }
            _ => return Err(SceneError::NotAChoice),
        }
        self.reposition_root(choice);
        Ok(())
    }

    // --- acceptance and removal ---

    /// Accept `elt` as ground truth and remove every interpretation that
    /// contradicts it.
    ///
    /// Marks `elt` and its descendants, then removes each unmarked parent of
    /// a marked node. With `collapse_choices` set, a marked choice keeps
    /// only its currently selected option; the others are removed like any
    /// contradicting interpretation. A stale `elt` is a no-op.
    pub fn confirm(&mut self, elt: ElementId, collapse_choices: bool) {
        if !self.is_alive(elt) {
            return;
        }
        self.confirm_epoch += 1;
        let token = self.confirm_epoch;
        self.mark_descendants(elt, token, collapse_choices);
        self.sweep(elt, token);
        debug!(?elt, collapse_choices, "confirmed interpretation");
    }

    fn mark_descendants(&mut self, elt: ElementId, token: u64, collapse_choices: bool) {
        let Some(node) = self.node_opt_mut(elt) else {
            return;
        };
        node.mark = token;
        let next: Vec<ElementId> = match &node.kind {
            Kind::Stroke { .. } => return,
            Kind::Choice { options, which, .. } if collapse_choices => {
                vec![options[*which].child]
            }
            Kind::Choice { children, .. } | Kind::Composite { children, .. } => children.clone(),
        };
        for child in next {
            self.mark_descendants(child, token, collapse_choices);
        }
    }

    /// Remove everything the marking pass rejected.
    ///
    /// An unmarked node reached here is an unselected choice option; it goes
    /// through the same cascade as a contradicting parent.
    fn sweep(&mut self, elt: ElementId, token: u64) {
        let Some(node) = self.node_opt(elt) else {
            return;
        };
        if node.mark != token {
            self.remove_element(elt);
            return;
        }
        let children: Vec<ElementId> = match &node.kind {
            Kind::Stroke { .. } => return,
            Kind::Composite { children, .. } | Kind::Choice { children, .. } => children.clone(),
        };
        for child in children {
            if !self.is_alive(child) {
                continue;
            }
            let doomed: Vec<ElementId> = self
                .node(child)
                .parents
                .iter()
                .copied()
                .filter(|&p| self.node_opt(p).is_some_and(|n| n.mark != token))
                .collect();
            for parent in doomed {
                self.remove_element(parent);
            }
            if self.is_alive(child) {
                self.sweep(child, token);
            }
        }
    }

    /// Remove an element and cascade through the graph.
    ///
    /// Children survive and are detached; a child left with no parent
    /// becomes a root again (strokes excepted). Parents cascade upward: a
    /// composite cannot survive the loss of a child, while a choice drops
    /// the matching option and survives until its last option is gone.
    /// Removing a stroke retires its coverage index into the deleted set.
    /// A stale `elt` is a no-op.
    pub fn remove_element(&mut self, elt: ElementId) {
        if !self.is_alive(elt) {
            return;
        }
        trace!(?elt, "removing element");

        let interior = match &self.node(elt).kind {
            Kind::Stroke { .. } => None,
            Kind::Composite { data, children, .. } => {
                Some((data.semantic_type(), children.clone(), false))
            }
            Kind::Choice {
                data_type,
                children,
                ..
            } => Some((data_type.clone(), children.clone(), true)),
        };

        if let Some((ty, children, is_choice)) = interior {
            let bucket = self
                .type_index
                .get_mut(&ty)
                .expect("type index entry for live composite");
            let pos = bucket
                .iter()
                .position(|&e| e == elt)
                .expect("live composite present in type index");
            bucket.remove(pos);
            if is_choice && let Some(bucket) = self.choice_index.get_mut(&ty) {
                bucket.retain(|&c| c != elt);
            }
            for child in children {
                let Some(child_node) = self.node_opt_mut(child) else {
                    continue;
                };
                child_node.parents.retain(|p| *p != elt);
                let orphaned = child_node.parents.is_empty();
                let is_stroke = matches!(child_node.kind, Kind::Stroke { .. });
                // The contains check matters: a cascade can visit the same
                // orphan twice when several of its parents die together.
                if orphaned && !is_stroke && !self.roots.contains(&child) {
                    let confidence = self
                        .confidence(child)
                        .expect("interior element has a confidence");
                    self.insert_root(child, confidence);
                }
            }
            self.composite_count -= 1;
        }

        let parents = core::mem::take(&mut self.node_mut(elt).parents);
        for parent in parents {
            if !self.is_alive(parent) {
                continue;
            }
            let emptied = {
                let parent_node = self.node_mut(parent);
                match &mut parent_node.kind {
                    Kind::Choice {
                        options,
                        children,
                        which,
                        ..
                    } => {
                        if let Some(pos) = options.iter().position(|o| o.child == elt) {
                            options.remove(pos);
                            children.remove(pos);
                            if !options.is_empty() {
                                *which = 0;
                            }
                        }
                        options.is_empty()
                    }
                    _ => true,
                }
            };
            if emptied {
                self.remove_element(parent);
            } else {
                self.reposition_root(parent);
            }
        }

        if let Some(pos) = self.roots.iter().position(|&r| r == elt) {
            self.roots.remove(pos);
        }
        if matches!(self.node(elt).kind, Kind::Stroke { .. }) {
            let coverage = self.node(elt).coverage.clone();
            self.deleted_strokes.union_with(&coverage);
            self.strokes.retain(|&s| s != elt);
        }

        self.nodes[elt.idx()] = None;
        self.free_list.push(elt.idx());
    }

    // --- consistency queries ---

    /// Return whether two interpretations can hold at the same time, i.e.
    /// their stroke supports are disjoint.
    ///
    /// `None` acts as the empty context and is consistent with everything.
    /// Stale ids answer `true` as well; a removed interpretation contradicts
    /// nothing.
    pub fn is_consistent(&self, a: Option<ElementId>, b: Option<ElementId>) -> bool {
        let (Some(a), Some(b)) = (a, b) else {
            return true;
        };
        let (Some(na), Some(nb)) = (self.node_opt(a), self.node_opt(b)) else {
            return true;
        };
        !na.coverage.intersects_below(&nb.coverage, self.stroke_count)
    }

    /// Return whether two elements cover exactly the same strokes.
    ///
    /// Stale ids answer `false`.
    pub fn same_support(&self, a: ElementId, b: ElementId) -> bool {
        let (Some(na), Some(nb)) = (self.node_opt(a), self.node_opt(b)) else {
            return false;
        };
        na.coverage.same_below(&nb.coverage, self.stroke_count)
    }

    /// Return whether a root element covers every live stroke.
    ///
    /// Deleted strokes do not count against covering. Non-root and stale
    /// ids answer `false`.
    pub fn is_covering_all(&self, elt: ElementId) -> bool {
        if !self.roots.contains(&elt) {
            return false;
        }
        self.node(elt)
            .coverage
            .covers_all_below(&self.deleted_strokes, self.stroke_count)
    }

    /// Live composites and choices of semantic type `ty`, in insertion
    /// order, restricted to those consistent with `context`.
    ///
    /// Pass `None` to get every element of the type.
    pub fn elements_of_type(&self, ty: &Type, context: Option<ElementId>) -> Vec<ElementId> {
        self.type_index
            .get(ty)
            .into_iter()
            .flatten()
            .copied()
            .filter(|&e| self.is_consistent(context, Some(e)))
            .collect()
    }

    // --- inspection ---

    /// Elements with no parent, sorted by non-increasing confidence.
    pub fn roots(&self) -> &[ElementId] {
        &self.roots
    }

    /// Live strokes in insertion order.
    pub fn strokes(&self) -> &[ElementId] {
        &self.strokes
    }

    /// Choices that still hold more than one option, i.e. the remaining
    /// ambiguity in the scene. Order is unspecified.
    pub fn choices(&self) -> Vec<ElementId> {
        self.choice_index
            .values()
            .flatten()
            .copied()
            .filter(|&c| {
                matches!(&self.node(c).kind, Kind::Choice { options, .. } if options.len() > 1)
            })
            .collect()
    }

    /// Number of coverage indices handed out so far, including indices of
    /// strokes that have since been removed.
    pub fn stroke_count(&self) -> u32 {
        self.stroke_count
    }

    /// Number of live interior elements (composites plus choices).
    pub fn composite_count(&self) -> usize {
        self.composite_count
    }

    /// Returns true if `id` refers to a live element.
    ///
    /// An `ElementId` is considered live if its slot exists and its
    /// generation matches the current generation stored in that slot.
    /// See [`ElementId`] docs for the generational semantics.
    pub fn is_alive(&self, id: ElementId) -> bool {
        self.node_opt(id).is_some()
    }

    /// The stroke support of an element, if live.
    pub fn coverage(&self, id: ElementId) -> Option<&Coverage> {
        self.node_opt(id).map(|n| &n.coverage)
    }

    /// The bounding box of an element, if live.
    pub fn bounds(&self, id: ElementId) -> Option<Rect> {
        self.node_opt(id).map(|n| n.bounds)
    }

    /// The parents of an element, or an empty slice for stale ids.
    pub fn parents(&self, id: ElementId) -> &[ElementId] {
        self.node_opt(id).map_or(&[], |n| n.parents.as_slice())
    }

    /// The children of an element, or an empty slice for strokes and stale
    /// ids. For a choice this lists every option's child.
    pub fn children(&self, id: ElementId) -> &[ElementId] {
        if let Some(n) = self.node_opt(id) {
            match &n.kind {
                Kind::Stroke { .. } => &[],
                Kind::Composite { children, .. } | Kind::Choice { children, .. } => children,
            }
        } else {
            &[]
        }
    }

    /// The child names of a composite, or an empty slice otherwise.
    pub fn child_names(&self, id: ElementId) -> &[String] {
        if let Some(n) = self.node_opt(id)
            && let Kind::Composite { names, .. } = &n.kind
        {
            return names;
        }
        &[]
    }

    /// The confidence of an interior element. For a choice this is the
    /// selected option's confidence. Strokes and stale ids answer `None`.
    pub fn confidence(&self, id: ElementId) -> Option<f64> {
        match &self.node_opt(id)?.kind {
            Kind::Stroke { .. } => None,
            Kind::Composite { confidence, .. } => Some(*confidence),
            Kind::Choice { options, which, .. } => options.get(*which).map(|o| o.confidence),
        }
    }

    /// The recognized payload of an interior element. For a choice this is
    /// the selected option's payload.
    pub fn data(&self, id: ElementId) -> Option<&D> {
        match &self.node_opt(id)?.kind {
            Kind::Stroke { .. } => None,
            Kind::Composite { data, .. } => Some(data),
            Kind::Choice { options, which, .. } => options.get(*which).map(|o| &o.data),
        }
    }

    /// The semantic type of an interior element.
    pub fn semantic_type(&self, id: ElementId) -> Option<Type> {
        match &self.node_opt(id)?.kind {
            Kind::Stroke { .. } => None,
            Kind::Composite { data, .. } => Some(data.semantic_type()),
            Kind::Choice { data_type, .. } => Some(data_type.clone()),
        }
    }

    /// The raw stroke handle of a stroke element.
    pub fn stroke(&self, id: ElementId) -> Option<&S> {
        if let Kind::Stroke { stroke } = &self.node_opt(id)?.kind {
            Some(stroke)
        } else {
            None
        }
    }

    /// The options of a choice, sorted by non-increasing confidence.
    pub fn options(&self, id: ElementId) -> Option<&[ChoiceOption<D>]> {
        if let Kind::Choice { options, .. } = &self.node_opt(id)?.kind {
            Some(options)
        } else {
            None
        }
    }

    /// The selected option index of a choice.
    pub fn which(&self, id: ElementId) -> Option<usize> {
        if let Kind::Choice { which, .. } = &self.node_opt(id)?.kind {
            Some(*which)
        } else {
            None
        }
    }

    /// Whether `id` is a live stroke element.
    pub fn is_stroke(&self, id: ElementId) -> bool {
        self.node_opt(id)
            .is_some_and(|n| matches!(n.kind, Kind::Stroke { .. }))
    }

    /// Whether `id` is a live composite element.
    pub fn is_composite(&self, id: ElementId) -> bool {
        self.node_opt(id)
            .is_some_and(|n| matches!(n.kind, Kind::Composite { .. }))
    }

    /// Whether `id` is a live choice element.
    pub fn is_choice(&self, id: ElementId) -> bool {
        self.node_opt(id)
            .is_some_and(|n| matches!(n.kind, Kind::Choice { .. }))
    }

    // --- internals ---

    fn alloc_slot(&mut self, kind: Kind<S, D>, coverage: Coverage, bounds: Rect) -> ElementId {
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.nodes[idx] = Some(Node::new(generation, kind, coverage, bounds));
            #[allow(
                clippy::cast_possible_truncation,
                reason = "ElementId uses 32-bit indices by design."
            )]
            (idx as u32, generation)
        } else {
            let generation = 1_u32;
            self.nodes
                .push(Some(Node::new(generation, kind, coverage, bounds)));
            self.generations.push(generation);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "ElementId uses 32-bit indices by design."
            )]
            ((self.nodes.len() - 1) as u32, generation)
        };
        ElementId::new(idx, generation)
    }

    fn node(&self, id: ElementId) -> &Node<S, D> {
        self.nodes[id.idx()].as_ref().expect("dangling ElementId")
    }

    fn node_mut(&mut self, id: ElementId) -> &mut Node<S, D> {
        self.nodes[id.idx()].as_mut().expect("dangling ElementId")
    }

    fn node_opt(&self, id: ElementId) -> Option<&Node<S, D>> {
        self.nodes
            .get(id.idx())
            .and_then(|slot| slot.as_ref())
            .filter(|n| n.generation == id.1)
    }

    fn node_opt_mut(&mut self, id: ElementId) -> Option<&mut Node<S, D>> {
        self.nodes
            .get_mut(id.idx())
            .and_then(|slot| slot.as_mut())
            .filter(|n| n.generation == id.1)
    }

    /// Make `child` a child of `parent`: record the parent link and strip
    /// the child's root status.
    fn attach_parent(&mut self, parent: ElementId, child: ElementId) {
        let child_node = self.node_mut(child);
        if !child_node.parents.contains(&parent) {
            child_node.parents.push(parent);
        }
        if let Some(pos) = self.roots.iter().position(|&r| r == child) {
            self.roots.remove(pos);
        }
    }

    /// Insert into the root list before the first strictly less confident
    /// root; equal confidences keep insertion order.
    fn insert_root(&mut self, id: ElementId, confidence: f64) {
        debug_assert!(!self.roots.contains(&id), "element already rooted");
        let pos = self
            .roots
            .iter()
            .position(|&r| {
                confidence
                    > self
                        .confidence(r)
                        .expect("rooted element has a confidence")
            })
            .unwrap_or(self.roots.len());
        self.roots.insert(pos, id);
    }

    /// Re-sort a root whose confidence changed. Non-roots are untouched.
    fn reposition_root(&mut self, id: ElementId) {
        if let Some(pos) = self.roots.iter().position(|&r| r == id) {
            self.roots.remove(pos);
            let confidence = self
                .confidence(id)
                .expect("rooted element has a confidence");
            self.insert_root(id, confidence);
        }
    }

    /// Register a fresh interior element in the type index and root list.
    fn index_composite(&mut self, id: ElementId, ty: Type, confidence: f64) {
        let bucket = self.type_index.entry(ty).or_default();
        debug_assert!(!bucket.contains(&id), "element already indexed");
        bucket.push(id);
        self.insert_root(id, confidence);
        self.composite_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::ToString;

    #[derive(Clone, Debug, PartialEq)]
    struct Labeled(&'static str);

    impl SceneData for Labeled {
        fn semantic_type(&self) -> Type {
            Type::new(self.0)
        }
    }

    #[derive(Debug)]
    struct Dot(f64, f64);

    impl StrokeGeometry for Dot {
        fn bounds(&self) -> Rect {
            Rect::new(self.0, self.1, self.0 + 1.0, self.1 + 1.0)
        }
    }

    fn scene() -> Scene<Dot, Labeled> {
        Scene::new()
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("part{i}")).collect()
    }

    fn composite(
        scene: &mut Scene<Dot, Labeled>,
        ty: &'static str,
        confidence: f64,
        children: &[ElementId],
    ) -> ElementId {
        scene
            .add_composite(Labeled(ty), confidence, children.to_vec(), names(children.len()))
            .expect("valid composite")
    }

    #[test]
    fn strokes_get_sequential_coverage_indices() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let s1 = s.add_stroke(Dot(2.0, 0.0));
        let s2 = s.add_stroke(Dot(4.0, 0.0));
        assert_eq!(s.stroke_count(), 3);
        assert_eq!(s.strokes(), [s0, s1, s2]);
        for (i, id) in [s0, s1, s2].into_iter().enumerate() {
            assert!(s.is_stroke(id));
            let cov = s.coverage(id).unwrap();
            assert!(cov.get(i as u32));
            assert!(!cov.get(((i + 1) % 3) as u32));
        }
        // Strokes are leaves: no confidence, no data, never rooted.
        assert_eq!(s.confidence(s0), None);
        assert_eq!(s.data(s0), None);
        assert!(s.roots().is_empty());
        assert_eq!(s.bounds(s1), Some(Rect::new(2.0, 0.0, 3.0, 1.0)));
    }

    #[test]
    fn composite_unions_child_coverage_and_bounds() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let s1 = s.add_stroke(Dot(3.0, 3.0));
        let c = composite(&mut s, "square", 0.8, &[s0, s1]);
        assert!(s.is_composite(c));
        let cov = s.coverage(c).unwrap();
        assert!(cov.get(0) && cov.get(1));
        assert_eq!(s.bounds(c), Some(Rect::new(0.0, 0.0, 4.0, 4.0)));
        assert_eq!(s.children(c), [s0, s1]);
        assert_eq!(s.child_names(c), ["part0", "part1"]);
        assert_eq!(s.parents(s0), [c]);
        assert_eq!(s.parents(s1), [c]);
        assert_eq!(s.confidence(c), Some(0.8));
        assert_eq!(s.data(c), Some(&Labeled("square")));
        assert_eq!(s.semantic_type(c), Some(Type::new("square")));
        assert_eq!(s.composite_count(), 1);
    }

    #[test]
    fn add_composite_rejects_bad_arguments() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        assert_eq!(
            s.add_composite(Labeled("x"), 0.5, vec![], vec![]),
            Err(SceneError::NoChildren)
        );
        assert_eq!(
            s.add_composite(Labeled("x"), 0.5, vec![s0, s0], vec!["a".to_string()]),
            Err(SceneError::ChildCountMismatch {
                children: 2,
                names: 1
            })
        );
        assert_eq!(
            s.add_composite(Labeled("x"), 1.5, vec![s0], names(1)),
            Err(SceneError::ConfidenceRange(1.5))
        );
        let stale = {
            let tmp = s.add_stroke(Dot(9.0, 9.0));
            s.remove_element(tmp);
            tmp
        };
        assert_eq!(
            s.add_composite(Labeled("x"), 0.5, vec![stale], names(1)),
            Err(SceneError::StaleElement)
        );
        // Rejected input leaves the scene untouched.
        assert_eq!(s.composite_count(), 0);
        assert!(s.roots().is_empty());
        assert!(s.parents(s0).is_empty());
    }

    #[test]
    fn roots_sorted_by_descending_confidence() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let s1 = s.add_stroke(Dot(2.0, 0.0));
        let s2 = s.add_stroke(Dot(4.0, 0.0));
        let a = composite(&mut s, "a", 0.5, &[s0]);
        let b = composite(&mut s, "b", 0.9, &[s1]);
        let c = composite(&mut s, "c", 0.7, &[s2]);
        // Equal confidence lands after the existing entry.
        let d = composite(&mut s, "d", 0.5, &[s0]);
        assert_eq!(s.roots(), [b, c, a, d]);
    }

    #[test]
    fn child_loses_root_status() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let a = composite(&mut s, "letter", 0.9, &[s0]);
        assert_eq!(s.roots(), [a]);
        let g = composite(&mut s, "word", 0.8, &[a]);
        assert_eq!(s.roots(), [g]);
        assert_eq!(s.parents(a), [g]);
    }

    #[test]
    fn consistency_is_support_disjointness() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let s1 = s.add_stroke(Dot(2.0, 0.0));
        let a = composite(&mut s, "a", 0.5, &[s0]);
        let b = composite(&mut s, "b", 0.5, &[s1]);
        let c = composite(&mut s, "c", 0.5, &[s0]);
        assert!(s.is_consistent(Some(a), Some(b)));
        assert!(s.is_consistent(Some(b), Some(a)));
        assert!(!s.is_consistent(Some(a), Some(c)));
        assert!(!s.is_consistent(Some(c), Some(a)));
        // An element overlaps itself.
        assert!(!s.is_consistent(Some(a), Some(a)));
        // The empty context is consistent with everything.
        assert!(s.is_consistent(None, Some(a)));
        assert!(s.is_consistent(Some(a), None));
        assert!(s.is_consistent(None, None));
        // Stale ids contradict nothing.
        s.remove_element(c);
        assert!(s.is_consistent(Some(c), Some(a)));
    }

    #[test]
    fn same_support_compares_coverage() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let s1 = s.add_stroke(Dot(2.0, 0.0));
        let a = composite(&mut s, "a", 0.5, &[s0]);
        let b = composite(&mut s, "b", 0.5, &[s0]);
        let c = composite(&mut s, "c", 0.5, &[s0, s1]);
        assert!(s.same_support(a, b));
        assert!(!s.same_support(a, c));
        s.remove_element(b);
        assert!(!s.same_support(a, b));
    }

    #[test]
    fn covering_ignores_deleted_strokes() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let s1 = s.add_stroke(Dot(2.0, 0.0));
        let a = composite(&mut s, "a", 0.9, &[s0]);
        assert!(!s.is_covering_all(a));
        // Deleting the uncovered stroke completes the cover; its index stays
        // retired rather than reused.
        s.remove_element(s1);
        assert_eq!(s.stroke_count(), 2);
        assert!(s.is_covering_all(a));
        // Only roots can cover the scene.
        let g = composite(&mut s, "g", 0.8, &[a]);
        assert!(!s.is_covering_all(a));
        assert!(s.is_covering_all(g));
    }

    #[test]
    fn elements_of_type_filters_by_context() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let s1 = s.add_stroke(Dot(2.0, 0.0));
        let sq0 = composite(&mut s, "square", 0.5, &[s0]);
        let sq1 = composite(&mut s, "square", 0.6, &[s1]);
        let line = composite(&mut s, "line", 0.7, &[s0]);
        let ty = Type::new("square");
        assert_eq!(s.elements_of_type(&ty, None), [sq0, sq1]);
        // In the context of the line, the square over the same stroke is
        // contradicted and drops out.
        assert_eq!(s.elements_of_type(&ty, Some(line)), [sq1]);
        assert!(s.elements_of_type(&Type::new("circle"), None).is_empty());
    }

    #[test]
    fn choice_created_then_merged_keeps_options_sorted() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let a = composite(&mut s, "square", 0.4, &[s0]);
        let created = s
            .add_or_merge_choice(Labeled("square"), 0.4, a, "first".to_string())
            .unwrap();
        let ChoiceOutcome::Created(ch) = created else {
            panic!("expected a fresh choice, got {created:?}");
        };
        assert!(s.is_choice(ch));
        assert_eq!(s.roots(), [ch]);

        let b = composite(&mut s, "square", 0.9, &[s0]);
        assert_eq!(s.roots(), [b, ch]);
        let merged = s
            .add_or_merge_choice(Labeled("square"), 0.9, b, "second".to_string())
            .unwrap();
        assert_eq!(merged, ChoiceOutcome::Merged(ch));
        assert_eq!(merged.id(), ch);

        let options = s.options(ch).unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].confidence, 0.9);
        assert_eq!(options[0].child, b);
        assert_eq!(options[1].confidence, 0.4);
        assert_eq!(options[1].child, a);
        // Merging resets the selection to the best option, and the choice's
        // reported confidence and root position follow it.
        assert_eq!(s.which(ch), Some(0));
        assert_eq!(s.confidence(ch), Some(0.9));
        assert_eq!(s.data(ch), Some(&Labeled("square")));
        assert_eq!(s.children(ch), [b, a]);
        assert_eq!(s.roots(), [ch]);
        assert_eq!(s.parents(a), [ch]);
        assert_eq!(s.parents(b), [ch]);
        assert_eq!(s.choices(), [ch]);
    }

    #[test]
    fn choice_merge_needs_same_type_and_support() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let s1 = s.add_stroke(Dot(2.0, 0.0));
        let a = composite(&mut s, "square", 0.5, &[s0]);
        let b = composite(&mut s, "square", 0.5, &[s1]);
        let c = composite(&mut s, "line", 0.5, &[s0]);
        let first = s
            .add_or_merge_choice(Labeled("square"), 0.5, a, "a".to_string())
            .unwrap();
        assert!(matches!(first, ChoiceOutcome::Created(_)));
        // Different support: a second choice, not a merge.
        let other_support = s
            .add_or_merge_choice(Labeled("square"), 0.5, b, "b".to_string())
            .unwrap();
        assert!(matches!(other_support, ChoiceOutcome::Created(_)));
        assert_ne!(other_support.id(), first.id());
        // Same support but different type: also a new choice.
        let other_type = s
            .add_or_merge_choice(Labeled("line"), 0.5, c, "c".to_string())
            .unwrap();
        assert!(matches!(other_type, ChoiceOutcome::Created(_)));
        assert_ne!(other_type.id(), first.id());
        // Single-option choices are not reported as open ambiguity.
        assert!(s.choices().is_empty());
    }

    #[test]
    fn choice_tolerates_duplicate_child() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let a = composite(&mut s, "square", 0.5, &[s0]);
        let ch = s
            .add_or_merge_choice(Labeled("square"), 0.5, a, "a".to_string())
            .unwrap()
            .id();
        let again = s
            .add_or_merge_choice(Labeled("square"), 0.7, a, "a again".to_string())
            .unwrap();
        assert_eq!(again, ChoiceOutcome::Merged(ch));
        assert_eq!(s.options(ch).unwrap().len(), 1);
        assert_eq!(s.parents(a), [ch]);
    }

    #[test]
    fn add_or_merge_choice_rejects_bad_arguments() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let a = composite(&mut s, "square", 0.5, &[s0]);
        assert_eq!(
            s.add_or_merge_choice(Labeled("square"), -0.1, a, "a".to_string()),
            Err(SceneError::ConfidenceRange(-0.1))
        );
        // Only composites can be options.
        assert_eq!(
            s.add_or_merge_choice(Labeled("square"), 0.5, s0, "s".to_string()),
            Err(SceneError::NotAComposite)
        );
        let ch = s
            .add_or_merge_choice(Labeled("square"), 0.5, a, "a".to_string())
            .unwrap()
            .id();
        assert_eq!(
            s.add_or_merge_choice(Labeled("square"), 0.5, ch, "ch".to_string()),
            Err(SceneError::NotAComposite)
        );
        s.remove_element(a);
        assert_eq!(
            s.add_or_merge_choice(Labeled("square"), 0.5, a, "a".to_string()),
            Err(SceneError::StaleElement)
        );
    }

    #[test]
    fn set_which_switches_the_selected_option() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let a = composite(&mut s, "glyph", 0.9, &[s0]);
        let b = composite(&mut s, "glyph", 0.4, &[s0]);
        let ch = s
            .add_or_merge_choice(Labeled("glyph"), 0.9, a, "a".to_string())
            .unwrap()
            .id();
        s.add_or_merge_choice(Labeled("glyph"), 0.4, b, "b".to_string())
            .unwrap();

        s.set_which(ch, 1).unwrap();
        assert_eq!(s.which(ch), Some(1));
        assert_eq!(s.confidence(ch), Some(0.4));
        assert_eq!(s.data(ch), Some(&Labeled("glyph")));

        assert_eq!(
            s.set_which(ch, 5),
            Err(SceneError::WhichOutOfRange { which: 5, len: 2 })
        );
        // A failed selection leaves the previous one in place.
        assert_eq!(s.which(ch), Some(1));
        assert_eq!(s.set_which(a, 0), Err(SceneError::NotAChoice));
        assert_eq!(s.set_which(s0, 0), Err(SceneError::NotAChoice));
    }

    #[test]
    fn removing_a_stroke_cascades_upward() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let s1 = s.add_stroke(Dot(2.0, 0.0));
        let a = composite(&mut s, "pair", 0.8, &[s0, s1]);
        let g = composite(&mut s, "group", 0.7, &[a]);
        s.remove_element(s0);
        // A composite cannot survive the loss of a child.
        assert!(!s.is_alive(a));
        assert!(!s.is_alive(g));
        assert!(!s.is_alive(s0));
        assert!(s.is_alive(s1));
        assert_eq!(s.strokes(), [s1]);
        assert!(s.roots().is_empty());
        assert_eq!(s.composite_count(), 0);
        // The retired index masks the deleted stroke out of covering checks.
        let b = composite(&mut s, "solo", 0.5, &[s1]);
        assert!(s.is_covering_all(b));
    }

    #[test]
    fn removing_a_composite_reroots_orphaned_children() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let s1 = s.add_stroke(Dot(2.0, 0.0));
        let a = composite(&mut s, "a", 0.9, &[s0]);
        let b = composite(&mut s, "b", 0.5, &[s1]);
        let g = composite(&mut s, "g", 0.7, &[a, b]);
        assert_eq!(s.roots(), [g]);
        s.remove_element(g);
        assert!(s.is_alive(a) && s.is_alive(b));
        assert!(s.parents(a).is_empty());
        assert_eq!(s.roots(), [a, b]);
        // Strokes stay unrooted leaves throughout.
        assert!(s.is_alive(s0));
        assert!(s.parents(s0) == [a]);
    }

    #[test]
    fn removal_cascade_stops_at_a_choice_with_options_left() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let a = composite(&mut s, "digit", 0.9, &[s0]);
        let b = composite(&mut s, "digit", 0.6, &[s0]);
        let ch = s
            .add_or_merge_choice(Labeled("digit"), 0.9, a, "a".to_string())
            .unwrap()
            .id();
        s.add_or_merge_choice(Labeled("digit"), 0.6, b, "b".to_string())
            .unwrap();
        s.set_which(ch, 1).unwrap();

        s.remove_element(a);
        // The choice drops the dead option and resets its selection.
        assert!(s.is_alive(ch));
        assert_eq!(s.options(ch).unwrap().len(), 1);
        assert_eq!(s.which(ch), Some(0));
        assert_eq!(s.confidence(ch), Some(0.6));
        assert_eq!(s.children(ch), [b]);

        // Losing the last option kills the choice itself.
        s.remove_element(b);
        assert!(!s.is_alive(ch));
        assert!(s.roots().is_empty());
        assert_eq!(s.composite_count(), 0);
    }

    #[test]
    fn confirm_removes_contradicting_interpretations() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let s1 = s.add_stroke(Dot(2.0, 0.0));
        let s2 = s.add_stroke(Dot(4.0, 0.0));
        let a = composite(&mut s, "square", 0.9, &[s0]);
        let b = composite(&mut s, "square", 0.4, &[s0]);
        let c = composite(&mut s, "line", 0.7, &[s1, s2]);
        assert_eq!(s.roots(), [a, c, b]);

        s.confirm(a, true);
        // The rival over the same stroke dies; the disjoint line survives.
        assert!(s.is_alive(a));
        assert!(!s.is_alive(b));
        assert!(s.is_alive(c));
        assert_eq!(s.roots(), [a, c]);
        assert_eq!(s.parents(s0), [a]);

        // Confirming twice changes nothing further.
        s.confirm(a, true);
        assert_eq!(s.roots(), [a, c]);
    }

    #[test]
    fn confirm_collapses_choices_to_the_selected_option() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let a = composite(&mut s, "glyph", 0.9, &[s0]);
        let b = composite(&mut s, "glyph", 0.4, &[s0]);
        let ch = s
            .add_or_merge_choice(Labeled("glyph"), 0.9, a, "a".to_string())
            .unwrap()
            .id();
        s.add_or_merge_choice(Labeled("glyph"), 0.4, b, "b".to_string())
            .unwrap();

        s.confirm(ch, true);
        assert!(s.is_alive(ch));
        assert!(s.is_alive(a));
        assert!(!s.is_alive(b));
        assert_eq!(s.options(ch).unwrap().len(), 1);
        assert_eq!(s.which(ch), Some(0));
        assert!(s.choices().is_empty());
    }

    #[test]
    fn confirm_without_collapse_keeps_every_option() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let a = composite(&mut s, "glyph", 0.9, &[s0]);
        let b = composite(&mut s, "glyph", 0.4, &[s0]);
        let ch = s
            .add_or_merge_choice(Labeled("glyph"), 0.9, a, "a".to_string())
            .unwrap()
            .id();
        s.add_or_merge_choice(Labeled("glyph"), 0.4, b, "b".to_string())
            .unwrap();

        s.confirm(ch, false);
        assert!(s.is_alive(a) && s.is_alive(b));
        assert_eq!(s.options(ch).unwrap().len(), 2);
        assert_eq!(s.choices(), [ch]);

        // A stale target is a no-op.
        s.remove_element(ch);
        s.confirm(ch, true);
        assert!(!s.is_alive(ch));
    }

    #[test]
    fn stale_ids_answer_conservatively() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let a = composite(&mut s, "a", 0.5, &[s0]);
        s.remove_element(a);
        assert!(!s.is_alive(a));
        assert_eq!(s.coverage(a), None);
        assert_eq!(s.bounds(a), None);
        assert_eq!(s.confidence(a), None);
        assert_eq!(s.data(a), None);
        assert_eq!(s.semantic_type(a), None);
        assert!(s.parents(a).is_empty());
        assert!(s.children(a).is_empty());
        assert!(s.child_names(a).is_empty());
        assert!(!s.is_stroke(a) && !s.is_composite(a) && !s.is_choice(a));
        assert!(!s.is_covering_all(a));
        assert!(s.elements_of_type(&Type::new("a"), None).is_empty());
        // Removing again is a no-op.
        s.remove_element(a);
        assert_eq!(s.composite_count(), 0);
    }

    #[test]
    fn slot_reuse_bumps_generation() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let a = composite(&mut s, "a", 0.5, &[s0]);
        s.remove_element(a);
        // Insert new element; might reuse slot but generation bumps.
        let b = composite(&mut s, "b", 0.5, &[s0]);
        assert!(!s.is_alive(a));
        assert!(s.is_alive(b));
        // Sanity: either same slot or different, but if same slot, generation must be greater.
        if a.0 == b.0 {
            assert!(b.1 > a.1, "generation must increase on reuse");
        }
        assert_eq!(s.data(b), Some(&Labeled("b")));
    }

    #[test]
    fn debug_output_summarizes_counts() {
        let mut s = scene();
        let s0 = s.add_stroke(Dot(0.0, 0.0));
        let _ = composite(&mut s, "a", 0.5, &[s0]);
        let out = format!("{s:?}");
        assert!(out.contains("nodes_alive: 2"), "unexpected debug: {out}");
        assert!(out.contains("stroke_count: 1"), "unexpected debug: {out}");
    }
}
