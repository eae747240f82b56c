//! Node views over a tree.
//!
//! Trees do not know their parents. A [`SyntaxNode`] pairs a tree or buffer position with
//! the chain of views it was reached through, so parent and sibling queries work without
//! back-links in the shared data.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::buffer::{BufferRecord, TreeBuffer, check_side, side};
use crate::cursor::TreeCursor;
use crate::node_type::NodeType;
use crate::tree::{Tree, TreeChild};

bitflags! {
    /// Options that change which nodes traversal visits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IterMode: u8 {
        /// Treat buffers as opaque leaves.
        const EXCLUDE_BUFFERS = 1;
        /// Visit anonymous nodes instead of passing through them to their children.
        const INCLUDE_ANONYMOUS = 1 << 1;
        /// Don't descend into mounted trees.
        const IGNORE_MOUNTS = 1 << 2;
        /// Don't enter overlay mounts when resolving positions.
        const IGNORE_OVERLAYS = 1 << 3;
    }
}

/// Shared interface of [`SyntaxNode`] and [`TreeCursor`].
pub trait SyntaxNodeRef {
    fn from(&self) -> u32;
    fn to(&self) -> u32;
    fn node_type(&self) -> &NodeType;

    fn name(&self) -> &str {
        self.node_type().name()
    }

    /// The tree backing this node, absent for nodes inside buffers.
    fn tree(&self) -> Option<Tree>;

    fn node(&self) -> SyntaxNode;

    /// Checks the names of this node's named ancestors, innermost last. Empty strings
    /// match any name.
    fn matches_context(&self, context: &[&str]) -> bool {
        match_context(self.node().parent(), context)
    }
}

fn match_context(mut node: Option<SyntaxNode>, context: &[&str]) -> bool {
    let mut remaining = context.len();
    while remaining > 0 {
        let Some(current) = node else { return false };
        if !current.node_type().is_anonymous() {
            let expected = context[remaining - 1];
            if !expected.is_empty() && expected != current.name() {
                return false;
            }
            remaining -= 1;
        }
        node = current.parent();
    }
    true
}

#[derive(Clone)]
pub(crate) struct TreeNode(Arc<TreeNodeData>);

struct TreeNodeData {
    tree: Tree,
    from: u32,
    /// Index in the parent's children. Overlay roots use -1.
    index: i32,
    parent: Option<TreeNode>,
}

impl TreeNode {
    pub(crate) fn new(tree: Tree, from: u32, index: i32, parent: Option<TreeNode>) -> Self {
        Self(Arc::new(TreeNodeData { tree, from, index, parent }))
    }

    pub(crate) fn root(tree: Tree, from: u32) -> Self {
        Self::new(tree, from, 0, None)
    }

    #[inline]
    pub(crate) fn tree(&self) -> &Tree {
        &self.0.tree
    }

    #[inline]
    pub(crate) fn ty(&self) -> &NodeType {
        self.0.tree.node_type()
    }

    #[inline]
    pub(crate) fn from(&self) -> u32 {
        self.0.from
    }

    #[inline]
    pub(crate) fn to(&self) -> u32 {
        self.0.from + self.0.tree.len()
    }

    #[inline]
    pub(crate) fn index(&self) -> i32 {
        self.0.index
    }

    /// The view this node was reached from, anonymous or not.
    #[inline]
    pub(crate) fn raw_parent(&self) -> Option<&TreeNode> {
        self.0.parent.as_ref()
    }

    pub(crate) fn parent(&self) -> Option<TreeNode> {
        self.raw_parent().map(TreeNode::next_significant_parent)
    }

    pub(crate) fn next_significant_parent(&self) -> TreeNode {
        let mut node = self;
        while node.ty().is_anonymous()
            && let Some(parent) = node.raw_parent()
        {
            node = parent;
        }
        node.clone()
    }

    /// Finds the next child at or after `i` in direction `dir` that passes the side test,
    /// passing through anonymous nodes unless `mode` includes them.
    pub(crate) fn next_child(
        &self,
        mut i: i32,
        dir: i32,
        pos: u32,
        side: i8,
        mode: IterMode,
    ) -> Option<SyntaxNode> {
        let mut parent = self.clone();
        loop {
            let tree = parent.tree().clone();
            let (children, positions) = (tree.children(), tree.positions());
            let end = if dir > 0 { children.len() as i32 } else { -1 };
            while i != end {
                let start = positions[i as usize] + parent.from();
                let child = &children[i as usize];
                if check_side(side, pos.into(), start.into(), (start + child.len()).into()) {
                    match child {
                        TreeChild::Buffer(buffer) if !mode.contains(IterMode::EXCLUDE_BUFFERS) => {
                            let count = buffer.records().len() as u32;
                            let rel = i64::from(pos) - i64::from(start);
                            if let Some(index) = buffer.find_child(0, count, dir, rel, side) {
                                let (parent, buffer) = (parent.clone(), buffer.clone());
                                let context = BufferContext::new(parent, buffer, i as u32, start);
                                return Some(BufferNode::new(context, None, index).into());
                            }
                        }
                        TreeChild::Buffer(_) => {}
                        TreeChild::Tree(next) => {
                            if mode.contains(IterMode::INCLUDE_ANONYMOUS)
                                || !next.node_type().is_anonymous()
                                || has_child(next)
                            {
                                if !mode.contains(IterMode::IGNORE_MOUNTS)
                                    && let Some(mounted) = next.mounted()
                                    && mounted.overlay.is_none()
                                {
                                    let node = TreeNode::new(
                                        mounted.tree.clone(),
                                        start,
                                        i,
                                        Some(parent.clone()),
                                    );
                                    return Some(node.into());
                                }
                                let inner =
                                    TreeNode::new(next.clone(), start, i, Some(parent.clone()));
                                if mode.contains(IterMode::INCLUDE_ANONYMOUS)
                                    || !inner.ty().is_anonymous()
                                {
                                    return Some(inner.into());
                                }
                                let first =
                                    if dir < 0 { next.children().len() as i32 - 1 } else { 0 };
                                return inner.next_child(first, dir, pos, side, mode);
                            }
                        }
                    }
                }
                i += dir;
            }
            if mode.contains(IterMode::INCLUDE_ANONYMOUS) || !parent.ty().is_anonymous() {
                return None;
            }
            let grand = parent.raw_parent()?.clone();
            i = if parent.index() >= 0 {
                parent.index() + dir
            } else if dir < 0 {
                -1
            } else {
                grand.tree().children().len() as i32
            };
            parent = grand;
        }
    }

    pub(crate) fn enter(&self, pos: u32, side: i8, mode: IterMode) -> Option<SyntaxNode> {
        if !mode.contains(IterMode::IGNORE_OVERLAYS)
            && let Some(mounted) = self.tree().mounted()
            && let Some(overlay) = &mounted.overlay
            && let Some(first) = overlay.first()
        {
            let rel = i64::from(pos) - i64::from(self.from());
            let covered = overlay.iter().any(|range| {
                let from = i64::from(u32::from(range.start()));
                let to = i64::from(u32::from(range.end()));
                (if side > 0 { from <= rel } else { from < rel })
                    && (if side < 0 { to >= rel } else { to > rel })
            });
            if covered {
                let from = u32::from(first.start()) + self.from();
                let root = TreeNode::new(mounted.tree.clone(), from, -1, Some(self.clone()));
                return Some(root.into());
            }
        }
        self.next_child(0, 1, pos, side, mode)
    }

    #[inline]
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

pub(crate) fn has_child(tree: &Tree) -> bool {
    tree.children().iter().any(|child| match child {
        TreeChild::Buffer(_) => true,
        TreeChild::Tree(tree) => !tree.node_type().is_anonymous() || has_child(tree),
    })
}

/// A buffer as seen from the tree node holding it.
#[derive(Clone)]
pub(crate) struct BufferContext(Arc<BufferContextData>);

struct BufferContextData {
    parent: TreeNode,
    buffer: Arc<TreeBuffer>,
    index: u32,
    start: u32,
}

impl BufferContext {
    pub(crate) fn new(parent: TreeNode, buffer: Arc<TreeBuffer>, index: u32, start: u32) -> Self {
        Self(Arc::new(BufferContextData { parent, buffer, index, start }))
    }

    #[inline]
    pub(crate) fn parent(&self) -> &TreeNode {
        &self.0.parent
    }

    #[inline]
    pub(crate) fn buffer(&self) -> &Arc<TreeBuffer> {
        &self.0.buffer
    }

    /// Index of the buffer among its parent's children.
    #[inline]
    pub(crate) fn index(&self) -> u32 {
        self.0.index
    }

    #[inline]
    pub(crate) fn start(&self) -> u32 {
        self.0.start
    }

    #[inline]
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Clone)]
pub(crate) struct BufferNode(Arc<BufferNodeData>);

struct BufferNodeData {
    context: BufferContext,
    parent: Option<BufferNode>,
    index: u32,
}

impl BufferNode {
    pub(crate) fn new(context: BufferContext, parent: Option<BufferNode>, index: u32) -> Self {
        Self(Arc::new(BufferNodeData { context, parent, index }))
    }

    #[inline]
    pub(crate) fn context(&self) -> &BufferContext {
        &self.0.context
    }

    #[inline]
    pub(crate) fn index(&self) -> u32 {
        self.0.index
    }

    #[inline]
    pub(crate) fn parent(&self) -> Option<&BufferNode> {
        self.0.parent.as_ref()
    }

    #[inline]
    fn record(&self) -> BufferRecord {
        self.0.context.buffer().record(self.0.index)
    }

    #[inline]
    pub(crate) fn ty(&self) -> &NodeType {
        self.0.context.buffer().node_type(self.0.index)
    }

    #[inline]
    pub(crate) fn from(&self) -> u32 {
        self.0.context.start() + self.record().start()
    }

    #[inline]
    pub(crate) fn to(&self) -> u32 {
        self.0.context.start() + self.record().end()
    }

    fn child(&self, dir: i32, pos: u32, side: i8) -> Option<BufferNode> {
        let context = self.context();
        let rel = i64::from(pos) - i64::from(context.start());
        let end = self.record().end_index();
        let index = context.buffer().find_child(self.index() + 1, end, dir, rel, side)?;
        Some(BufferNode::new(context.clone(), Some(self.clone()), index))
    }

    fn external_sibling(&self, dir: i32) -> Option<SyntaxNode> {
        if self.parent().is_some() {
            return None;
        }
        let context = self.context();
        let index = context.index() as i32 + dir;
        context.parent().next_child(index, dir, 0, side::DONT_CARE, IterMode::empty())
    }

    fn next_sibling(&self) -> Option<SyntaxNode> {
        let buffer = self.context().buffer();
        let after = self.record().end_index();
        let limit = match self.parent() {
            Some(parent) => parent.record().end_index(),
            None => buffer.records().len() as u32,
        };
        if after < limit {
            Some(BufferNode::new(self.context().clone(), self.0.parent.clone(), after).into())
        } else {
            self.external_sibling(1)
        }
    }

    fn prev_sibling(&self) -> Option<SyntaxNode> {
        let buffer = self.context().buffer();
        let parent_start = self.parent().map_or(0, |parent| parent.index() + 1);
        if self.index() == parent_start {
            return self.external_sibling(-1);
        }
        let index = buffer.find_child(parent_start, self.index(), -1, 0, side::DONT_CARE)?;
        Some(BufferNode::new(self.context().clone(), self.0.parent.clone(), index).into())
    }

    fn to_tree(&self) -> Tree {
        let buffer = self.context().buffer();
        let record = self.record();
        let (start, end) = (self.index() + 1, record.end_index());
        let mut children = Vec::new();
        let mut positions = Vec::new();
        if end > start {
            let from = record.start();
            children.push(TreeChild::Buffer(Arc::new(buffer.slice(start, end, from))));
            positions.push(0);
        }
        Tree::new(self.ty().clone(), children, positions, record.end() - record.start())
    }
}

/// A node in a tree, carrying the path it was reached through.
#[derive(Clone)]
pub struct SyntaxNode(pub(crate) Repr);

#[derive(Clone)]
pub(crate) enum Repr {
    Tree(TreeNode),
    Buffer(BufferNode),
}

impl From<TreeNode> for SyntaxNode {
    fn from(node: TreeNode) -> Self {
        SyntaxNode(Repr::Tree(node))
    }
}

impl From<BufferNode> for SyntaxNode {
    fn from(node: BufferNode) -> Self {
        SyntaxNode(Repr::Buffer(node))
    }
}

impl SyntaxNode {
    pub fn from(&self) -> u32 {
        match &self.0 {
            Repr::Tree(node) => node.from(),
            Repr::Buffer(node) => node.from(),
        }
    }

    pub fn to(&self) -> u32 {
        match &self.0 {
            Repr::Tree(node) => node.to(),
            Repr::Buffer(node) => node.to(),
        }
    }

    pub fn node_type(&self) -> &NodeType {
        match &self.0 {
            Repr::Tree(node) => node.ty(),
            Repr::Buffer(node) => node.ty(),
        }
    }

    pub fn name(&self) -> &str {
        self.node_type().name()
    }

    pub fn tree(&self) -> Option<Tree> {
        match &self.0 {
            Repr::Tree(node) => Some(node.tree().clone()),
            Repr::Buffer(_) => None,
        }
    }

    pub fn parent(&self) -> Option<SyntaxNode> {
        match &self.0 {
            Repr::Tree(node) => node.parent().map(Into::into),
            Repr::Buffer(node) => Some(match node.parent() {
                Some(parent) => parent.clone().into(),
                None => node.context().parent().next_significant_parent().into(),
            }),
        }
    }

    fn child(&self, dir: i32, pos: u32, side: i8) -> Option<SyntaxNode> {
        match &self.0 {
            Repr::Tree(node) => {
                let first = if dir > 0 { 0 } else { node.tree().children().len() as i32 - 1 };
                node.next_child(first, dir, pos, side, IterMode::empty())
            }
            Repr::Buffer(node) => node.child(dir, pos, side).map(Into::into),
        }
    }

    pub fn first_child(&self) -> Option<SyntaxNode> {
        self.child(1, 0, side::DONT_CARE)
    }

    pub fn last_child(&self) -> Option<SyntaxNode> {
        self.child(-1, 0, side::DONT_CARE)
    }

    /// The first child that ends after `pos`.
    pub fn child_after(&self, pos: u32) -> Option<SyntaxNode> {
        self.child(1, pos, side::AFTER)
    }

    /// The last child that starts before `pos`.
    pub fn child_before(&self, pos: u32) -> Option<SyntaxNode> {
        self.child(-1, pos, side::BEFORE)
    }

    /// Moves into the first child covering `pos` on the given side.
    pub fn enter(&self, pos: u32, side: i8, mode: IterMode) -> Option<SyntaxNode> {
        match &self.0 {
            Repr::Tree(node) => node.enter(pos, side, mode),
            Repr::Buffer(_) if mode.contains(IterMode::EXCLUDE_BUFFERS) => None,
            Repr::Buffer(node) => node.child(1, pos, side).map(Into::into),
        }
    }

    pub fn next_sibling(&self) -> Option<SyntaxNode> {
        match &self.0 {
            Repr::Tree(node) => {
                let parent = node.raw_parent()?;
                if node.index() < 0 {
                    return None;
                }
                parent.next_child(node.index() + 1, 1, 0, side::DONT_CARE, IterMode::empty())
            }
            Repr::Buffer(node) => node.next_sibling(),
        }
    }

    pub fn prev_sibling(&self) -> Option<SyntaxNode> {
        match &self.0 {
            Repr::Tree(node) => {
                let parent = node.raw_parent()?;
                if node.index() < 0 {
                    return None;
                }
                parent.next_child(node.index() - 1, -1, 0, side::DONT_CARE, IterMode::empty())
            }
            Repr::Buffer(node) => node.prev_sibling(),
        }
    }

    /// The innermost node at `pos`, searching from this node.
    pub fn resolve(&self, pos: u32, side: i8) -> SyntaxNode {
        resolve_node(self.clone(), pos, side, false)
    }

    pub fn resolve_inner(&self, pos: u32, side: i8) -> SyntaxNode {
        resolve_node(self.clone(), pos, side, true)
    }

    pub fn cursor(&self, mode: IterMode) -> TreeCursor {
        TreeCursor::new(self.clone(), mode)
    }

    pub fn get_child(&self, name: &str) -> Option<SyntaxNode> {
        self.get_children(name, None, None).into_iter().next()
    }

    /// Children matching `name`, optionally only those after a child matching `before`
    /// and before one matching `after`.
    pub fn get_children(
        &self,
        name: &str,
        before: Option<&str>,
        after: Option<&str>,
    ) -> Vec<SyntaxNode> {
        let mut cursor = self.cursor(IterMode::empty());
        let mut result = Vec::new();
        if !cursor.first_child() {
            return result;
        }
        if let Some(before) = before {
            loop {
                let found = cursor.node_type().is(before);
                if !cursor.next_sibling() {
                    return result;
                }
                if found {
                    break;
                }
            }
        }
        loop {
            if after.is_some_and(|after| cursor.node_type().is(after)) {
                return result;
            }
            if cursor.node_type().is(name) {
                result.push(cursor.node());
            }
            if !cursor.next_sibling() {
                return if after.is_none() { result } else { Vec::new() };
            }
        }
    }

    /// This node as a standalone tree. Cheap for tree nodes, copies for buffer nodes.
    pub fn to_tree(&self) -> Tree {
        match &self.0 {
            Repr::Tree(node) => node.tree().clone(),
            Repr::Buffer(node) => node.to_tree(),
        }
    }

    pub fn matches_context(&self, context: &[&str]) -> bool {
        match_context(self.parent(), context)
    }
}

impl PartialEq for SyntaxNode {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Repr::Tree(a), Repr::Tree(b)) => {
                a.ptr_eq(b) || (a.tree().ptr_eq(b.tree()) && a.from() == b.from())
            }
            (Repr::Buffer(a), Repr::Buffer(b)) => {
                Arc::ptr_eq(a.context().buffer(), b.context().buffer())
                    && a.context().start() == b.context().start()
                    && a.index() == b.index()
            }
            _ => false,
        }
    }
}

impl Eq for SyntaxNode {}

impl fmt::Debug for SyntaxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}..{}", self.name(), self.from(), self.to())
    }
}

impl fmt::Display for SyntaxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Tree(node) => node.tree().fmt(f),
            Repr::Buffer(node) => node.context().buffer().write_child(f, node.index()),
        }
    }
}

impl SyntaxNodeRef for SyntaxNode {
    fn from(&self) -> u32 {
        SyntaxNode::from(self)
    }

    fn to(&self) -> u32 {
        SyntaxNode::to(self)
    }

    fn node_type(&self) -> &NodeType {
        SyntaxNode::node_type(self)
    }

    fn tree(&self) -> Option<Tree> {
        SyntaxNode::tree(self)
    }

    fn node(&self) -> SyntaxNode {
        self.clone()
    }
}

pub(crate) fn resolve_node(mut node: SyntaxNode, pos: u32, side: i8, overlays: bool) -> SyntaxNode {
    // Move up to a node that actually covers the position.
    while node.from() == node.to()
        || (if side < 1 { node.from() >= pos } else { node.from() > pos })
        || (if side > -1 { node.to() <= pos } else { node.to() < pos })
    {
        let at_overlay_root = matches!(&node.0, Repr::Tree(tree) if tree.index() < 0);
        let parent = if !overlays && at_overlay_root { None } else { node.parent() };
        let Some(parent) = parent else { return node };
        node = parent;
    }

    let mode = if overlays { IterMode::empty() } else { IterMode::IGNORE_OVERLAYS };
    if overlays {
        // Leave overlays that don't cover the position on this side.
        let mut scan = node.clone();
        let mut parent = scan.parent();
        while let Some(current) = parent {
            if let (Repr::Tree(host), Repr::Tree(inner)) = (&current.0, &scan.0)
                && inner.index() < 0
                && host.enter(pos, side, mode).map(|entered| entered.from()) != Some(scan.from())
            {
                node = current.clone();
            }
            parent = current.parent();
            scan = current;
        }
    }

    while let Some(inner) = node.enter(pos, side, mode) {
        node = inner;
    }
    node
}

pub(crate) fn resolve_stack(tree: &Tree, pos: u32, side: i8) -> Vec<SyntaxNode> {
    let inner = tree.resolve_inner(pos, side);
    let mut layers = vec![inner.clone()];
    let mut scan = Some(match &inner.0 {
        Repr::Tree(node) => node.clone(),
        Repr::Buffer(node) => node.context().parent().clone(),
    });
    while let Some(node) = scan {
        if node.index() < 0 {
            let Some(parent) = node.parent() else { break };
            layers.push(resolve_node(parent.clone().into(), pos, side, false));
            scan = parent.parent();
            continue;
        }
        if let Some(mounted) = node.tree().mounted()
            && let Some(overlay) = &mounted.overlay
            && let (Some(first), Some(last)) = (overlay.first(), overlay.last())
            && u32::from(first.start()) <= pos
            && u32::from(last.end()) >= pos
        {
            let from = u32::from(first.start()) + node.from();
            let root = TreeNode::new(mounted.tree.clone(), from, -1, Some(node.clone()));
            layers.push(resolve_node(root.into(), pos, side, false));
        }
        scan = node.parent();
    }
    layers
}

#[cfg(test)]
pub(crate) mod tests {
    use expect_test::expect;

    use super::*;
    use crate::node_type::{NodeSet, NodeTypeSpec};

    // 0 anonymous, 1 Doc, 2 Call, 3 Name, 4 Args, 5 Number
    fn set() -> NodeSet {
        let names = [None, Some("Doc"), Some("Call"), Some("Name"), Some("Args"), Some("Number")];
        let types = names
            .into_iter()
            .enumerate()
            .map(|(id, name)| {
                NodeType::define(NodeTypeSpec {
                    id: id as u16,
                    name: name.map(str::to_owned),
                    ..Default::default()
                })
            })
            .collect();
        NodeSet::new(types).unwrap()
    }

    /// `f(1 2) g(3)`, with `f(1 2)` packed in a buffer and `g(3)` inside an anonymous node.
    pub(crate) fn sample() -> Tree {
        let set = set();
        let buffer = TreeBuffer::new(
            vec![
                BufferRecord::new(2, 0, 6, 5),
                BufferRecord::new(3, 0, 1, 2),
                BufferRecord::new(4, 1, 6, 5),
                BufferRecord::new(5, 2, 3, 4),
                BufferRecord::new(5, 4, 5, 5),
            ],
            6,
            set.clone(),
        );
        let ty = |id: usize| set.types()[id].clone();
        let leaf = |id, len| TreeChild::Tree(Tree::new(ty(id), Vec::new(), Vec::new(), len));
        let args = Tree::new(ty(4), vec![leaf(5, 1)], vec![1], 3);
        let call = Tree::new(ty(2), vec![leaf(3, 1), args.into()], vec![0, 1], 4);
        let group = Tree::new(ty(0), vec![call.into()], vec![0], 4);
        Tree::new(ty(1), vec![TreeChild::Buffer(Arc::new(buffer)), group.into()], vec![0, 7], 11)
    }

    #[test]
    fn children_and_siblings() {
        let tree = sample();
        let top = tree.top_node();
        let first = top.first_child().unwrap();
        let last = top.last_child().unwrap();
        assert_eq!(format!("{first:?} {last:?}"), "Call@0..6 Call@7..11");
        assert_eq!(first.next_sibling(), Some(last.clone()));
        assert_eq!(last.prev_sibling(), Some(first.clone()));
        assert_eq!(last.parent(), Some(top.clone()));
        assert_eq!(first.parent(), Some(top.clone()));

        let args = first.get_child("Args").unwrap();
        assert_eq!(args.get_children("Number", None, None).len(), 2);
        assert_eq!(args.parent(), Some(first.clone()));
        assert!(args.matches_context(&["Doc", "Call"]));
        assert!(args.matches_context(&["", "Call"]));
        assert!(!args.matches_context(&["Args"]));
        expect!["Args(Number,Number)"].assert_eq(&args.to_string());
        expect!["Args(Number,Number)"].assert_eq(&args.to_tree().to_string());
    }

    #[test]
    fn resolve_positions() {
        let tree = sample();
        let show = |node: SyntaxNode| format!("{node:?}");
        assert_eq!(show(tree.resolve(2, 1)), "Number@2..3");
        assert_eq!(show(tree.resolve(3, -1)), "Number@2..3");
        assert_eq!(show(tree.resolve(3, 0)), "Args@1..6");
        assert_eq!(show(tree.resolve(3, 1)), "Args@1..6");
        assert_eq!(show(tree.resolve(9, 0)), "Args@8..11");
        assert_eq!(show(tree.resolve(6, 1)), "Doc@0..11");
        assert_eq!(show(tree.resolve(6, -1)), "Args@1..6");

        let number = tree.resolve(2, 1);
        assert_eq!(show(number.resolve(9, 1)), "Number@9..10");
    }

    #[test]
    fn child_before_after() {
        let tree = sample();
        let top = tree.top_node();
        assert_eq!(format!("{:?}", top.child_after(6).unwrap()), "Call@7..11");
        assert_eq!(format!("{:?}", top.child_before(7).unwrap()), "Call@0..6");
        assert!(top.child_before(0).is_none());
    }
}
