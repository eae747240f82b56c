use std::fmt;
use std::sync::Arc;

use text_size::TextRange;

use crate::buffer::TreeBuffer;
use crate::build::{self, BufferCursor, BuildData};
use crate::cursor::TreeCursor;
use crate::node::{self, IterMode, SyntaxNode, TreeNode};
use crate::node_type::NodeType;
use crate::parse::Parser;
use crate::props::{self, NodeProp, PropId, PropValue};

/// An immutable syntax tree node with its children.
///
/// Child positions are stored relative to the node's start, so a tree can be reused at a
/// different document offset without copying.
#[derive(Clone)]
pub struct Tree(Arc<TreeData>);

struct TreeData {
    ty: NodeType,
    children: Box<[TreeChild]>,
    positions: Box<[u32]>,
    length: u32,
    props: Box<[(PropId, PropValue)]>,
}

#[derive(Clone)]
pub enum TreeChild {
    Tree(Tree),
    Buffer(Arc<TreeBuffer>),
}

impl TreeChild {
    #[inline]
    pub fn len(&self) -> u32 {
        match self {
            TreeChild::Tree(tree) => tree.len(),
            TreeChild::Buffer(buffer) => buffer.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            TreeChild::Tree(tree) => Some(tree),
            TreeChild::Buffer(_) => None,
        }
    }
}

impl From<Tree> for TreeChild {
    fn from(tree: Tree) -> Self {
        TreeChild::Tree(tree)
    }
}

impl fmt::Display for TreeChild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeChild::Tree(tree) => tree.fmt(f),
            TreeChild::Buffer(buffer) => buffer.fmt(f),
        }
    }
}

impl Tree {
    #[track_caller]
    pub fn new(ty: NodeType, children: Vec<TreeChild>, positions: Vec<u32>, length: u32) -> Self {
        Self::with_props(ty, children, positions, length, Vec::new())
    }

    /// # Panics
    ///
    /// Panics when `children` and `positions` differ in length.
    #[track_caller]
    pub fn with_props(
        ty: NodeType,
        children: Vec<TreeChild>,
        positions: Vec<u32>,
        length: u32,
        props: Vec<(PropId, PropValue)>,
    ) -> Self {
        assert_eq!(children.len(), positions.len(), "every child needs a position");
        debug_assert!(
            children.iter().zip(&positions).all(|(child, &pos)| pos + child.len() <= length),
            "children must fit inside their parent"
        );
        let data = TreeData {
            ty,
            children: children.into(),
            positions: positions.into(),
            length,
            props: props.into(),
        };
        Self(Arc::new(data))
    }

    /// An empty tree of the anonymous type.
    pub fn empty() -> Self {
        Self::new(NodeType::none(), Vec::new(), Vec::new(), 0)
    }

    /// Builds a tree from the flat postfix output of a parser.
    pub fn build<C: BufferCursor>(data: BuildData<C>) -> Tree {
        build::build_tree(data)
    }

    #[inline]
    pub fn node_type(&self) -> &NodeType {
        &self.0.ty
    }

    #[inline]
    pub fn children(&self) -> &[TreeChild] {
        &self.0.children
    }

    #[inline]
    pub fn positions(&self) -> &[u32] {
        &self.0.positions
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.0.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.length == 0
    }

    /// Reads a prop. Per-node props come from this node, others from its type.
    pub fn prop<T: 'static>(&self, prop: &NodeProp<T>) -> Option<&T> {
        if prop.is_per_node() {
            props::lookup(&self.0.props, prop)
        } else {
            self.0.ty.prop(prop)
        }
    }

    /// The per-node prop values stored on this tree.
    pub fn prop_values(&self) -> &[(PropId, PropValue)] {
        &self.0.props
    }

    #[inline]
    pub fn mounted(&self) -> Option<&MountedTree> {
        props::lookup(&self.0.props, props::mounted())
    }

    /// A copy of this node with `value` set, sharing the children.
    pub fn set_prop(&self, id: PropId, value: PropValue) -> Tree {
        let mut values = self.0.props.to_vec();
        props::set_value(&mut values, id, value);
        self.rebuild(self.0.children.to_vec(), values)
    }

    pub(crate) fn rebuild(
        &self,
        children: Vec<TreeChild>,
        props: Vec<(PropId, PropValue)>,
    ) -> Tree {
        let data = TreeData {
            ty: self.0.ty.clone(),
            children: children.into(),
            positions: self.0.positions.clone(),
            length: self.0.length,
            props: props.into(),
        };
        Tree(Arc::new(data))
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    #[inline]
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn top_node(&self) -> SyntaxNode {
        TreeNode::root(self.clone(), 0).into()
    }

    pub fn cursor(&self) -> TreeCursor {
        self.cursor_with(IterMode::empty())
    }

    pub fn cursor_with(&self, mode: IterMode) -> TreeCursor {
        TreeCursor::new(self.top_node(), mode)
    }

    /// A cursor pointed at the innermost node covering `pos`, see [`Tree::resolve`].
    pub fn cursor_at(&self, pos: u32, side: i8) -> TreeCursor {
        let mut cursor = TreeCursor::new(self.top_node(), IterMode::empty());
        cursor.move_to(pos, side);
        cursor
    }

    /// Finds the innermost node covering `pos`.
    ///
    /// With `side` -1 the node must end at or after `pos` and start before it, with 1 it
    /// must start at or before `pos` and end after it, and with 0 it must strictly contain
    /// it. Mounted overlays are not entered.
    pub fn resolve(&self, pos: u32, side: i8) -> SyntaxNode {
        node::resolve_node(self.top_node(), pos, side, false)
    }

    /// Like [`Tree::resolve`], but also enters overlay mounts covering `pos`.
    pub fn resolve_inner(&self, pos: u32, side: i8) -> SyntaxNode {
        node::resolve_node(self.top_node(), pos, side, true)
    }

    /// The innermost node at `pos` of every overlay layer stacked there, innermost first.
    pub fn resolve_stack(&self, pos: u32, side: i8) -> Vec<SyntaxNode> {
        node::resolve_stack(self, pos, side)
    }

    /// Walks the tree in pre-order, calling `enter` on every node overlapping
    /// `from..=to` and `leave` after a node's children are done. Returning false from
    /// `enter` skips the node's children.
    pub fn iterate(
        &self,
        mode: IterMode,
        from: u32,
        to: u32,
        mut enter: impl FnMut(&TreeCursor) -> bool,
        mut leave: impl FnMut(&TreeCursor),
    ) {
        let anonymous = mode.contains(IterMode::INCLUDE_ANONYMOUS);
        let mut cursor = self.cursor_with(mode | IterMode::INCLUDE_ANONYMOUS);
        loop {
            let mut entered = false;
            if cursor.from() <= to
                && cursor.to() >= from
                && ((!anonymous && cursor.node_type().is_anonymous()) || enter(&cursor))
            {
                if cursor.first_child() {
                    continue;
                }
                entered = true;
            }
            loop {
                if entered && (anonymous || !cursor.node_type().is_anonymous()) {
                    leave(&cursor);
                }
                if cursor.next_sibling() {
                    break;
                }
                if !cursor.parent() {
                    return;
                }
                entered = true;
            }
        }
    }

    /// Rebalances a flat run of children into a shallow tree of anonymous groups.
    pub fn balance(&self) -> Tree {
        if self.children().len() <= build::BRANCH_FACTOR {
            return self.clone();
        }
        let none = NodeType::none();
        let top = |children: Vec<TreeChild>, positions: Vec<u32>, length: u32| {
            Tree::with_props(
                self.node_type().clone(),
                children,
                positions,
                length,
                self.0.props.to_vec(),
            )
        };
        let inner = |children: Vec<TreeChild>, positions: Vec<u32>, length: u32| {
            Tree::new(none.clone(), children, positions, length)
        };
        build::balance_range(
            &none,
            self.children(),
            self.positions(),
            0,
            self.children().len(),
            0,
            self.len(),
            Some(&top as &build::MakeTree<'_>),
            &inner,
        )
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Prints names in nested parenthesized form, leaving anonymous nodes out.
impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(mounted) = self.mounted()
            && mounted.overlay.is_none()
        {
            return mounted.tree.fmt(f);
        }

        let mut children = String::new();
        for child in self.children() {
            let text = child.to_string();
            if !text.is_empty() {
                if !children.is_empty() {
                    children.push(',');
                }
                children.push_str(&text);
            }
        }
        let ty = self.node_type();
        if ty.name().is_empty() {
            return f.write_str(&children);
        }
        write_name(f, ty)?;
        if !children.is_empty() {
            write!(f, "({children})")?;
        }
        Ok(())
    }
}

pub(crate) fn write_name(f: &mut fmt::Formatter<'_>, ty: &NodeType) -> fmt::Result {
    let name = ty.name();
    if !ty.is_error() && name.chars().any(|c| !(c.is_ascii_alphanumeric() || c == '_')) {
        write!(f, "{name:?}")
    } else {
        f.write_str(name)
    }
}

/// A nested parse result attached to a host node through [`props::mounted`].
#[derive(Clone)]
pub struct MountedTree {
    pub tree: Tree,
    /// When present, the inner tree covers only these document ranges and the host's own
    /// children stay visible.
    pub overlay: Option<Vec<TextRange>>,
    pub parser: Arc<dyn Parser>,
    /// Overlay nodes keep the host node's full extent instead of just their ranges.
    pub bracketed: bool,
}

impl fmt::Debug for MountedTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountedTree")
            .field("tree", &self.tree)
            .field("overlay", &self.overlay)
            .field("bracketed", &self.bracketed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::node_type::{NodeSet, NodeTypeSpec};

    pub(crate) fn types() -> NodeSet {
        let names = [None, Some("Doc"), Some("Item"), Some("+"), Some("⚠")];
        let types = names
            .into_iter()
            .enumerate()
            .map(|(id, name)| {
                NodeType::define(NodeTypeSpec {
                    id: id as u16,
                    name: name.map(str::to_owned),
                    top: id == 1,
                    error: id == 4,
                    ..Default::default()
                })
            })
            .collect();
        NodeSet::new(types).unwrap()
    }

    #[test]
    fn display() {
        let set = types();
        let ty = |id: usize| set.types()[id].clone();
        let leaf = |id| TreeChild::Tree(Tree::new(ty(id), Vec::new(), Vec::new(), 1));
        let group = Tree::new(ty(0), vec![leaf(2), leaf(4)], vec![0, 1], 2);
        let tree = Tree::new(ty(1), vec![group.into(), leaf(3)], vec![0, 2], 3);
        expect![[r#"Doc(Item,⚠,"+")"#]].assert_eq(&tree.to_string());
        assert_eq!(Tree::empty().to_string(), "");
    }

    #[test]
    fn balance_flat_run() {
        let set = types();
        let item = Tree::new(set.types()[2].clone(), Vec::new(), Vec::new(), 1);
        let children = (0..20).map(|_| TreeChild::Tree(item.clone())).collect();
        let tree = Tree::new(set.types()[1].clone(), children, (0..20).collect(), 20);
        let balanced = tree.balance();

        assert!(balanced.children().len() <= build::BRANCH_FACTOR);
        assert_eq!(balanced.len(), 20);
        assert_eq!(balanced.to_string(), tree.to_string());

        let mut count = 0;
        let enter = |c: &TreeCursor| {
            count += usize::from(c.name() == "Item");
            true
        };
        balanced.iterate(IterMode::empty(), 0, 20, enter, |_| {});
        assert_eq!(count, 20);
    }

    #[test]
    fn per_node_props() {
        let tree = Tree::empty().set_prop(props::look_ahead().id(), Arc::new(7u32));
        assert_eq!(tree.prop(props::look_ahead()), Some(&7));
        assert_eq!(tree.prop(props::context_hash()), None);
        assert!(tree.mounted().is_none());
    }
}
