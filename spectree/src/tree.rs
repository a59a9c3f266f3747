//! The declared spec tree.
//!
//! Suites and specs live in two arenas owned by [`Tree`] and refer to each
//! other through typed ids. The tree is only reshaped while it is being
//! declared; execution borrows it immutably, so one finished tree can be run
//! from several threads at once.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::core::decorator::{DecoratorHandle, DecoratorScope, ScopeMode};
use crate::core::description::{Description, DescriptionKind};
use crate::core::hooks::{Around, HookChain, OnceHook};
use crate::core::naming::{UniqueNames, sanitise};
use crate::core::tags::TagState;
use crate::core::types::Block;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SuiteId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecId(usize);

/// Any child of a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Suite(SuiteId),
    Spec(SpecId),
}

impl From<SuiteId> for NodeId {
    fn from(id: SuiteId) -> Self {
        NodeId::Suite(id)
    }
}

impl From<SpecId> for NodeId {
    fn from(id: SpecId) -> Self {
        NodeId::Spec(id)
    }
}

/// How a suite runs its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildStrategy {
    /// Every child runs independently.
    #[default]
    RunAll,
    /// Once any child has failed, the remaining children report ignored.
    AbortOnFirstFailure,
}

/// Composite node grouping specs and nested suites.
pub struct SuiteNode {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) parent: Option<SuiteId>,
    pub(crate) depth: usize,
    pub(crate) atomic: bool,
    pub(crate) strategy: ChildStrategy,
    pub(crate) children: Vec<NodeId>,
    pub(crate) focused: HashSet<NodeId>,
    pub(crate) ignored: bool,
    ignore_next: bool,
    pending_tags: Vec<String>,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) tag_state: TagState,
    pub(crate) before_all: Vec<Arc<OnceHook>>,
    pub(crate) after_all: HookChain,
    pub(crate) before_each: HookChain,
    pub(crate) after_each: HookChain,
    pub(crate) around_each: Vec<Around>,
    pub(crate) around_all: Vec<Around>,
    pub(crate) decorators: Vec<DecoratorScope>,
    names: UniqueNames,
}

/// Leaf node: one behavior.
pub struct SpecNode {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) parent: SuiteId,
    pub(crate) block: Option<Block>,
    pub(crate) ignored: bool,
    pub(crate) tags: BTreeSet<String>,
}

/// Per-suite leaf counts taken from one tree; see [`Tree::leaf_counts`].
pub(crate) struct LeafCounts(Vec<usize>);

impl LeafCounts {
    pub(crate) fn of(&self, suite: SuiteId) -> usize {
        self.0[suite.0]
    }
}

pub struct Tree {
    pub(crate) suites: Vec<SuiteNode>,
    pub(crate) specs: Vec<SpecNode>,
    root: SuiteId,
}

impl Tree {
    /// Create a tree holding only its root suite.
    pub fn new(name: &str) -> Self {
        let name = sanitise(name);
        let root = SuiteNode {
            path: name.clone(),
            name,
            parent: None,
            depth: 0,
            atomic: false,
            strategy: ChildStrategy::RunAll,
            children: Vec::new(),
            focused: HashSet::new(),
            ignored: false,
            ignore_next: false,
            pending_tags: Vec::new(),
            tags: BTreeSet::new(),
            tag_state: TagState::default(),
            before_all: Vec::new(),
            after_all: HookChain::default(),
            before_each: HookChain::default(),
            after_each: HookChain::default(),
            around_each: Vec::new(),
            around_all: Vec::new(),
            decorators: Vec::new(),
            names: UniqueNames::default(),
        };
        Self {
            suites: vec![root],
            specs: Vec::new(),
            root: SuiteId(0),
        }
    }

    pub fn root(&self) -> SuiteId {
        self.root
    }

    pub(crate) fn suite(&self, id: SuiteId) -> &SuiteNode {
        &self.suites[id.0]
    }

    pub(crate) fn spec(&self, id: SpecId) -> &SpecNode {
        &self.specs[id.0]
    }

    fn suite_mut(&mut self, id: SuiteId) -> &mut SuiteNode {
        &mut self.suites[id.0]
    }

    /// Add a nested suite that runs its children independently.
    pub fn add_suite(&mut self, parent: SuiteId, name: &str) -> SuiteId {
        self.add_suite_with(parent, name, ChildStrategy::RunAll, false)
    }

    /// Add a suite reported and counted as one atomic test.
    pub fn add_composite(&mut self, parent: SuiteId, name: &str) -> SuiteId {
        self.add_suite_with(parent, name, ChildStrategy::AbortOnFirstFailure, true)
    }

    /// Add a suite with an explicit child strategy.
    ///
    /// The new suite starts from a copy of the parent's tag state and of the
    /// parent's inheritable decorator scopes.
    pub fn add_suite_with(
        &mut self,
        parent: SuiteId,
        name: &str,
        strategy: ChildStrategy,
        atomic: bool,
    ) -> SuiteId {
        let id = SuiteId(self.suites.len());
        let (name, tags) = self.claim_child(parent, name);
        let owner = self.suite(parent);
        let suite = SuiteNode {
            path: format!("{}/{}", owner.path, name),
            name,
            parent: Some(parent),
            depth: owner.depth + 1,
            atomic,
            strategy,
            children: Vec::new(),
            focused: HashSet::new(),
            ignored: false,
            ignore_next: false,
            pending_tags: Vec::new(),
            tags,
            tag_state: owner.tag_state.clone(),
            before_all: Vec::new(),
            after_all: HookChain::default(),
            before_each: HookChain::default(),
            after_each: HookChain::default(),
            around_each: Vec::new(),
            around_all: Vec::new(),
            decorators: owner
                .decorators
                .iter()
                .filter_map(DecoratorScope::for_child)
                .collect(),
            names: UniqueNames::default(),
        };
        self.suites.push(suite);
        self.attach(parent, NodeId::Suite(id));
        id
    }

    /// Add a spec; `None` declares a pending spec, which is always ignored.
    pub fn add_spec(&mut self, parent: SuiteId, name: &str, block: Option<Block>) -> SpecId {
        let id = SpecId(self.specs.len());
        let (name, tags) = self.claim_child(parent, name);
        let spec = SpecNode {
            path: format!("{}/{}", self.suite(parent).path, name),
            name,
            parent,
            ignored: block.is_none(),
            block,
            tags,
        };
        self.specs.push(spec);
        self.attach(parent, NodeId::Spec(id));
        id
    }

    /// Unique display name and effective tags for the next child of `parent`.
    fn claim_child(&mut self, parent: SuiteId, name: &str) -> (String, BTreeSet<String>) {
        let owner = self.suite_mut(parent);
        let name = owner.names.claim(name);
        let mut tags = owner.tags.clone();
        tags.extend(owner.pending_tags.drain(..));
        (name, tags)
    }

    fn attach(&mut self, parent: SuiteId, child: NodeId) {
        let owner = self.suite_mut(parent);
        owner.children.push(child);
        let ignore_next = std::mem::take(&mut owner.ignore_next);
        let inherit_ignore = owner.ignored;
        let tag_state = owner.tag_state.clone();

        let filtered_out = !tag_state.is_allowed(self.tags_of(child));
        if filtered_out {
            debug!(child = %self.path_of(child), "child filtered out by tags");
        }
        if ignore_next || inherit_ignore || filtered_out {
            self.ignore(child);
        }
    }

    /// Discard every child of `suite`, along with any `ignore_next` or
    /// `tag_next` still waiting for a child; used when its declaration fails.
    pub fn remove_all_children(&mut self, suite: SuiteId) {
        let owner = self.suite_mut(suite);
        owner.children.clear();
        owner.focused.clear();
        owner.names.clear();
        owner.ignore_next = false;
        owner.pending_tags.clear();
    }

    /// Mark a node ignored. Children added to an ignored suite afterwards are
    /// ignored too; children already attached keep their own state.
    pub fn ignore(&mut self, id: NodeId) {
        match id {
            NodeId::Suite(suite) => self.suite_mut(suite).ignored = true,
            NodeId::Spec(spec) => self.specs[spec.0].ignored = true,
        }
    }

    /// Ignore whichever child `suite` gains next.
    pub fn ignore_next(&mut self, suite: SuiteId) {
        self.suite_mut(suite).ignore_next = true;
    }

    /// Tag whichever child `suite` gains next.
    pub fn tag_next<I, S>(&mut self, suite: SuiteId, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suite_mut(suite)
            .pending_tags
            .extend(tags.into_iter().map(Into::into));
    }

    /// Focus a node: it and each of its ancestors become the only children
    /// their parents run. Ignored nodes cannot be focused.
    pub fn focus(&mut self, id: NodeId) {
        if self.is_ignored(id) {
            return;
        }
        let Some(parent) = self.parent(id) else {
            return;
        };
        self.suite_mut(parent).focused.insert(id);
        self.focus(NodeId::Suite(parent));
    }

    pub fn include_tags<I, S>(&mut self, suite: SuiteId, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suite_mut(suite).tag_state.include(tags);
    }

    pub fn exclude_tags<I, S>(&mut self, suite: SuiteId, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suite_mut(suite).tag_state.exclude(tags);
    }

    pub fn tag_state(&self, suite: SuiteId) -> &TagState {
        &self.suite(suite).tag_state
    }

    /// Register a one-shot setup for every spec under `suite`.
    pub fn before_all(&mut self, suite: SuiteId, block: Block) {
        self.suite_mut(suite)
            .before_all
            .push(Arc::new(OnceHook::new(block)));
    }

    pub fn after_all(&mut self, suite: SuiteId, block: Block) {
        self.suite_mut(suite).after_all.push(block);
    }

    pub fn before_each(&mut self, suite: SuiteId, block: Block) {
        self.suite_mut(suite).before_each.push(block);
    }

    pub fn after_each(&mut self, suite: SuiteId, block: Block) {
        self.suite_mut(suite).after_each.push(block);
    }

    pub fn around_each(&mut self, suite: SuiteId, wrapper: Around) {
        self.suite_mut(suite).around_each.push(wrapper);
    }

    pub fn around_all(&mut self, suite: SuiteId, wrapper: Around) {
        self.suite_mut(suite).around_all.push(wrapper);
    }

    /// Attach a decorator at `suite`; the newest attachment wraps innermost.
    pub fn apply_decorator(&mut self, suite: SuiteId, handle: DecoratorHandle, mode: ScopeMode) {
        let owner = self.suite_mut(suite);
        let scope = DecoratorScope::new(handle, owner.depth, mode);
        owner.decorators.insert(0, scope);
    }

    pub fn decorators(&self, suite: SuiteId) -> &[DecoratorScope] {
        &self.suite(suite).decorators
    }

    pub fn children(&self, suite: SuiteId) -> &[NodeId] {
        &self.suite(suite).children
    }

    pub fn parent(&self, id: NodeId) -> Option<SuiteId> {
        match id {
            NodeId::Suite(suite) => self.suite(suite).parent,
            NodeId::Spec(spec) => Some(self.spec(spec).parent),
        }
    }

    pub fn depth(&self, suite: SuiteId) -> usize {
        self.suite(suite).depth
    }

    pub fn name(&self, id: NodeId) -> &str {
        match id {
            NodeId::Suite(suite) => &self.suite(suite).name,
            NodeId::Spec(spec) => &self.spec(spec).name,
        }
    }

    pub(crate) fn path_of(&self, id: NodeId) -> &str {
        match id {
            NodeId::Suite(suite) => &self.suite(suite).path,
            NodeId::Spec(spec) => &self.spec(spec).path,
        }
    }

    fn tags_of(&self, id: NodeId) -> &BTreeSet<String> {
        match id {
            NodeId::Suite(suite) => &self.suite(suite).tags,
            NodeId::Spec(spec) => &self.spec(spec).tags,
        }
    }

    pub fn is_ignored(&self, id: NodeId) -> bool {
        match id {
            NodeId::Suite(suite) => self.suite(suite).ignored,
            NodeId::Spec(spec) => self.spec(spec).ignored,
        }
    }

    pub fn is_atomic(&self, suite: SuiteId) -> bool {
        self.suite(suite).atomic
    }

    /// Number of specs under `id` (a spec counts itself).
    pub fn leaf_count(&self, id: NodeId) -> usize {
        match id {
            NodeId::Spec(_) => 1,
            NodeId::Suite(suite) => self
                .children(suite)
                .iter()
                .map(|child| self.leaf_count(*child))
                .sum(),
        }
    }

    /// Number of reportable test units, counting each composite as one.
    pub fn unit_count(&self, id: NodeId) -> usize {
        match id {
            NodeId::Spec(_) => 1,
            NodeId::Suite(suite) if self.is_atomic(suite) => {
                usize::from(self.leaf_count(id) > 0)
            }
            NodeId::Suite(suite) => self
                .children(suite)
                .iter()
                .map(|child| self.unit_count(*child))
                .sum(),
        }
    }

    /// Description of `id` alone, without its children.
    pub fn header(&self, id: NodeId) -> Description {
        let (name, path, kind) = match id {
            NodeId::Spec(spec) => {
                let spec = self.spec(spec);
                (&spec.name, &spec.path, DescriptionKind::Test)
            }
            NodeId::Suite(suite) => {
                let suite = self.suite(suite);
                let kind = if suite.atomic {
                    DescriptionKind::Composite
                } else {
                    DescriptionKind::Suite
                };
                (&suite.name, &suite.path, kind)
            }
        };
        Description {
            name: name.clone(),
            path: path.clone(),
            kind,
            children: Vec::new(),
        }
    }

    /// Description of `id` and everything below it.
    pub fn description(&self, id: NodeId) -> Description {
        let mut description = self.header(id);
        if let NodeId::Suite(suite) = id {
            description.children = self
                .children(suite)
                .iter()
                .map(|child| self.description(*child))
                .collect();
        }
        description
    }

    /// Leaf count of every suite, in one pass over the arena.
    ///
    /// Children are always created after their parent, so walking the arena
    /// backwards sees every child suite before its parent.
    pub(crate) fn leaf_counts(&self) -> LeafCounts {
        let mut counts = vec![0; self.suites.len()];
        for (index, suite) in self.suites.iter().enumerate().rev() {
            let count = suite
                .children
                .iter()
                .map(|child| match child {
                    NodeId::Spec(_) => 1,
                    NodeId::Suite(nested) => counts[nested.0],
                })
                .sum();
            counts[index] = count;
        }
        LeafCounts(counts)
    }

    /// Description of the whole tree.
    pub fn root_description(&self) -> Description {
        self.description(NodeId::Suite(self.root))
    }

    /// `suite` and its ancestors, outermost first.
    pub(crate) fn lineage(&self, suite: SuiteId) -> Vec<&SuiteNode> {
        let mut chain = Vec::new();
        let mut current = Some(suite);
        while let Some(id) = current {
            let node = self.suite(id);
            chain.push(node);
            current = node.parent;
        }
        chain.reverse();
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::block;

    fn names(tree: &Tree, suite: SuiteId) -> Vec<String> {
        tree.children(suite)
            .iter()
            .map(|child| tree.name(*child).to_string())
            .collect()
    }

    #[test]
    fn sibling_names_are_sanitised_and_deduplicated() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        tree.add_suite(root, "A (complex) name");
        tree.add_suite(root, "A (complex) name");
        tree.add_spec(root, "A (complex) name", Some(block(|| {})));
        assert_eq!(
            names(&tree, root),
            vec!["A [complex] name", "A [complex] name_1", "A [complex] name_2"]
        );
    }

    #[test]
    fn ignore_propagates_only_to_children_attached_later() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        let suite = tree.add_suite(root, "suite");
        let early = tree.add_spec(suite, "early", Some(block(|| {})));
        tree.ignore(NodeId::Suite(suite));
        let late = tree.add_spec(suite, "late", Some(block(|| {})));
        let nested = tree.add_suite(suite, "nested");
        let deep = tree.add_spec(nested, "deep", Some(block(|| {})));

        assert!(!tree.is_ignored(early.into()));
        assert!(tree.is_ignored(late.into()));
        assert!(tree.is_ignored(deep.into()));
    }

    #[test]
    fn ignore_next_applies_to_a_single_child() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        tree.ignore_next(root);
        let first = tree.add_spec(root, "first", Some(block(|| {})));
        let second = tree.add_spec(root, "second", Some(block(|| {})));
        assert!(tree.is_ignored(first.into()));
        assert!(!tree.is_ignored(second.into()));
    }

    #[test]
    fn pending_spec_is_ignored() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        let pending = tree.add_spec(root, "later", None);
        assert!(tree.is_ignored(pending.into()));
    }

    #[test]
    fn focus_registers_every_ancestor() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        let outer = tree.add_suite(root, "outer");
        let inner = tree.add_suite(outer, "inner");
        let spec = tree.add_spec(inner, "spec", Some(block(|| {})));
        tree.add_spec(inner, "other", Some(block(|| {})));

        tree.focus(spec.into());

        assert!(tree.suite(inner).focused.contains(&NodeId::Spec(spec)));
        assert!(tree.suite(outer).focused.contains(&NodeId::Suite(inner)));
        assert!(tree.suite(root).focused.contains(&NodeId::Suite(outer)));
        assert_eq!(tree.suite(inner).focused.len(), 1);
    }

    #[test]
    fn focusing_an_ignored_node_is_a_no_op() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        let pending = tree.add_spec(root, "pending", None);
        tree.focus(pending.into());
        assert!(tree.suite(root).focused.is_empty());
    }

    #[test]
    fn tagged_child_outside_include_set_is_ignored() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        tree.include_tags(root, ["fast"]);
        tree.tag_next(root, ["slow"]);
        let slow = tree.add_suite(root, "slow");
        tree.tag_next(root, ["fast"]);
        let fast = tree.add_suite(root, "fast");
        let nested = tree.add_spec(fast, "nested", Some(block(|| {})));

        assert!(tree.is_ignored(slow.into()));
        assert!(!tree.is_ignored(fast.into()));
        assert!(!tree.is_ignored(nested.into()), "inherits the fast tag");
    }

    #[test]
    fn child_tag_state_is_a_snapshot() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        tree.exclude_tags(root, ["slow"]);
        let child = tree.add_suite(root, "child");
        tree.exclude_tags(child, Vec::<String>::new());
        assert!(tree.tag_state(root).excluded().contains("slow"));
        assert!(tree.tag_state(child).excluded().is_empty());
    }

    #[test]
    fn only_recursive_scopes_are_inherited() {
        struct Noop;
        impl crate::core::decorator::Decorator for Noop {}

        let mut tree = Tree::new("root");
        let root = tree.root();
        tree.apply_decorator(root, DecoratorHandle::shared(Noop), ScopeMode::Recursive);
        tree.apply_decorator(root, DecoratorHandle::shared(Noop), ScopeMode::NonRecursive);
        let child = tree.add_suite(root, "child");

        assert_eq!(tree.decorators(root).len(), 2);
        assert_eq!(tree.decorators(root)[0].mode(), ScopeMode::NonRecursive);
        assert_eq!(tree.decorators(child).len(), 1);
        assert_eq!(tree.decorators(child)[0].depth(), 0);
    }

    #[test]
    fn counts_treat_composites_as_one_unit() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        let steps = tree.add_composite(root, "scenario");
        for step in ["given", "when", "then"] {
            tree.add_spec(steps, step, Some(block(|| {})));
        }
        tree.add_spec(root, "plain", Some(block(|| {})));

        assert_eq!(tree.leaf_count(NodeId::Suite(root)), 4);
        assert_eq!(tree.unit_count(NodeId::Suite(root)), 2);
        let description = tree.root_description();
        assert_eq!(description.children[0].kind, DescriptionKind::Composite);
        assert_eq!(description.children[0].children[2].path, "root/scenario/then");
    }

    #[test]
    fn leaf_counts_match_the_recursive_count() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        let outer = tree.add_suite(root, "outer");
        let inner = tree.add_suite(outer, "inner");
        tree.add_spec(inner, "deep", Some(block(|| {})));
        tree.add_spec(outer, "shallow", Some(block(|| {})));
        let empty = tree.add_suite(root, "empty");

        let counts = tree.leaf_counts();
        for suite in [root, outer, inner, empty] {
            assert_eq!(counts.of(suite), tree.leaf_count(suite.into()));
        }
        assert_eq!(counts.of(root), 2);
        assert_eq!(counts.of(empty), 0);
    }

    #[test]
    fn header_matches_description_without_children() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        let steps = tree.add_composite(root, "scenario");
        tree.add_spec(steps, "given", Some(block(|| {})));

        let header = tree.header(steps.into());
        assert_eq!(header, tree.description(steps.into()).childless());
        assert_eq!(header.kind, DescriptionKind::Composite);
    }

    #[test]
    fn remove_all_children_clears_names_and_focus() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        let spec = tree.add_spec(root, "spec", Some(block(|| {})));
        tree.focus(spec.into());
        tree.remove_all_children(root);
        assert!(tree.children(root).is_empty());
        assert!(tree.suite(root).focused.is_empty());
        tree.add_spec(root, "spec", Some(block(|| {})));
        assert_eq!(names(&tree, root), vec!["spec"]);
    }

    #[test]
    fn remove_all_children_drops_state_queued_for_the_next_child() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        tree.exclude_tags(root, ["slow"]);
        tree.ignore_next(root);
        tree.tag_next(root, ["slow"]);
        tree.remove_all_children(root);

        let spec = tree.add_spec(root, "replacement", Some(block(|| {})));
        assert!(!tree.is_ignored(spec.into()));
        assert!(tree.spec(spec).tags.is_empty());
    }
}
