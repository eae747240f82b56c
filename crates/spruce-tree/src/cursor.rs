use std::cell::RefCell;

use crate::buffer::side;
use crate::mix::{BufferPath, NodePath};
use crate::node::{
    self, BufferContext, BufferNode, IterMode, Repr, SyntaxNode, SyntaxNodeRef, TreeNode,
};
use crate::node_type::NodeType;
use crate::tree::{Tree, TreeChild};

/// A mutable position in a tree.
///
/// Inside buffers the cursor only tracks record indices, so walking a whole tree allocates
/// a view per tree node but not per buffered node. [`TreeCursor::node`] materializes the
/// current position when needed.
pub struct TreeCursor {
    mode: IterMode,
    ty: NodeType,
    from: u32,
    to: u32,
    tree: TreeNode,
    buffer: Option<BufferContext>,
    /// Record indices of the buffer ancestors of the current node, outermost first.
    stack: Vec<u32>,
    index: u32,
    cached: RefCell<Option<BufferNode>>,
}

impl TreeCursor {
    pub(crate) fn new(node: SyntaxNode, mode: IterMode) -> Self {
        let tree = match &node.0 {
            Repr::Tree(tree) => tree.clone(),
            Repr::Buffer(buffer) => buffer.context().parent().clone(),
        };
        let mut cursor = TreeCursor {
            mode,
            ty: tree.ty().clone(),
            from: tree.from(),
            to: tree.to(),
            tree,
            buffer: None,
            stack: Vec::new(),
            index: 0,
            cached: RefCell::new(None),
        };
        cursor.yield_node(Some(node));
        cursor
    }

    #[inline]
    pub fn from(&self) -> u32 {
        self.from
    }

    #[inline]
    pub fn to(&self) -> u32 {
        self.to
    }

    #[inline]
    pub fn node_type(&self) -> &NodeType {
        &self.ty
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.ty.name()
    }

    #[inline]
    pub fn mode(&self) -> IterMode {
        self.mode
    }

    /// The tree at the current position, absent inside buffers.
    pub fn tree(&self) -> Option<Tree> {
        match self.buffer {
            Some(_) => None,
            None => Some(self.tree.tree().clone()),
        }
    }

    /// The child indices leading from the root to the current position.
    pub(crate) fn path(&self) -> NodePath {
        let mut trees = Vec::new();
        let mut node = &self.tree;
        while let Some(parent) = node.raw_parent() {
            trees.push(node.index() as u32);
            node = parent;
        }
        trees.reverse();
        let buffer = self.buffer.as_ref().map(|context| {
            let mut chain = self.stack.clone();
            chain.push(self.index);
            BufferPath { child: context.index(), chain }
        });
        NodePath { trees, buffer }
    }

    fn yield_tree(&mut self, node: Option<TreeNode>) -> bool {
        let Some(node) = node else { return false };
        self.ty = node.ty().clone();
        self.from = node.from();
        self.to = node.to();
        self.tree = node;
        self.buffer = None;
        true
    }

    fn yield_buf(&mut self, index: u32) -> bool {
        let Some(context) = &self.buffer else { return false };
        let buffer = context.buffer();
        let record = buffer.record(index);
        self.index = index;
        self.ty = buffer.node_type(index).clone();
        self.from = context.start() + record.start();
        self.to = context.start() + record.end();
        true
    }

    fn yield_node(&mut self, node: Option<SyntaxNode>) -> bool {
        match node.map(|node| node.0) {
            None => false,
            Some(Repr::Tree(node)) => self.yield_tree(Some(node)),
            Some(Repr::Buffer(node)) => {
                let context = node.context().clone();
                self.stack.clear();
                let mut parent = node.parent();
                while let Some(ancestor) = parent {
                    self.stack.push(ancestor.index());
                    parent = ancestor.parent();
                }
                self.stack.reverse();
                self.tree = context.parent().clone();
                self.buffer = Some(context);
                let index = node.index();
                *self.cached.get_mut() = Some(node);
                self.yield_buf(index)
            }
        }
    }

    fn enter_child(&mut self, dir: i32, pos: u32, side: i8) -> bool {
        let Some(context) = &self.buffer else {
            let first = if dir > 0 { 0 } else { self.tree.tree().children().len() as i32 - 1 };
            let child = self.tree.next_child(first, dir, pos, side, self.mode);
            return self.yield_node(child);
        };
        let buffer = context.buffer();
        let end = buffer.record(self.index).end_index();
        let rel = i64::from(pos) - i64::from(context.start());
        let Some(index) = buffer.find_child(self.index + 1, end, dir, rel, side) else {
            return false;
        };
        self.stack.push(self.index);
        self.yield_buf(index)
    }

    pub fn first_child(&mut self) -> bool {
        self.enter_child(1, 0, side::DONT_CARE)
    }

    pub fn last_child(&mut self) -> bool {
        self.enter_child(-1, 0, side::DONT_CARE)
    }

    /// Moves to the first child ending after `pos`.
    pub fn child_after(&mut self, pos: u32) -> bool {
        self.enter_child(1, pos, side::AFTER)
    }

    /// Moves to the last child starting before `pos`.
    pub fn child_before(&mut self, pos: u32) -> bool {
        self.enter_child(-1, pos, side::BEFORE)
    }

    /// Moves to the first child covering `pos` on `side`, see
    /// [`SyntaxNode::enter`].
    pub fn enter(&mut self, pos: u32, side: i8, mode: IterMode) -> bool {
        if self.buffer.is_some() {
            return !mode.contains(IterMode::EXCLUDE_BUFFERS) && self.enter_child(1, pos, side);
        }
        let child = self.tree.enter(pos, side, mode);
        self.yield_node(child)
    }

    pub fn parent(&mut self) -> bool {
        let anonymous = self.mode.contains(IterMode::INCLUDE_ANONYMOUS);
        let Some(context) = self.buffer.clone() else {
            let parent =
                if anonymous { self.tree.raw_parent().cloned() } else { self.tree.parent() };
            return self.yield_tree(parent);
        };
        if let Some(index) = self.stack.pop() {
            return self.yield_buf(index);
        }
        let parent = if anonymous {
            context.parent().clone()
        } else {
            context.parent().next_significant_parent()
        };
        self.yield_tree(Some(parent))
    }

    fn sibling(&mut self, dir: i32) -> bool {
        let Some(context) = self.buffer.clone() else {
            let Some(parent) = self.tree.raw_parent() else { return false };
            let index = self.tree.index();
            let next = if index < 0 {
                None
            } else {
                parent.next_child(index + dir, dir, 0, side::DONT_CARE, self.mode)
            };
            return self.yield_node(next);
        };

        let buffer = context.buffer();
        let parent = self.stack.last().copied();
        if dir < 0 {
            let parent_start = parent.map_or(0, |parent| parent + 1);
            if self.index != parent_start
                && let Some(index) =
                    buffer.find_child(parent_start, self.index, -1, 0, side::DONT_CARE)
            {
                return self.yield_buf(index);
            }
        } else {
            let after = buffer.record(self.index).end_index();
            let limit = match parent {
                Some(parent) => buffer.record(parent).end_index(),
                None => buffer.records().len() as u32,
            };
            if after < limit {
                return self.yield_buf(after);
            }
        }
        if parent.is_some() {
            return false;
        }
        let index = context.index() as i32 + dir;
        let next = context.parent().next_child(index, dir, 0, side::DONT_CARE, self.mode);
        self.yield_node(next)
    }

    pub fn next_sibling(&mut self) -> bool {
        self.sibling(1)
    }

    pub fn prev_sibling(&mut self) -> bool {
        self.sibling(-1)
    }

    /// True when no node visible in this mode follows the current one in pre-order,
    /// outside of its own children.
    fn at_last_node(&self) -> bool {
        let (mut index, mut parent) = match &self.buffer {
            Some(context) => {
                let buffer = context.buffer();
                if buffer.record(self.index).end_index() < buffer.records().len() as u32 {
                    return false;
                }
                (context.index() as i32, Some(context.parent().clone()))
            }
            None => (self.tree.index(), self.tree.raw_parent().cloned()),
        };
        while let Some(node) = parent {
            if index > -1 {
                let children = node.tree().children();
                let following = children.get(index as usize + 1..).unwrap_or_default();
                let visible = following.iter().any(|child| match child {
                    TreeChild::Buffer(_) => true,
                    TreeChild::Tree(tree) => {
                        self.mode.contains(IterMode::INCLUDE_ANONYMOUS)
                            || !tree.node_type().is_anonymous()
                            || node::has_child(tree)
                    }
                });
                if visible {
                    return false;
                }
            }
            index = node.index();
            parent = node.raw_parent().cloned();
        }
        true
    }

    /// Moves to the next node in pre-order. With `enter` false the current node's
    /// children are skipped. Returns false at the end of the tree.
    pub fn next(&mut self, enter: bool) -> bool {
        if enter && self.enter_child(1, 0, side::DONT_CARE) {
            return true;
        }
        loop {
            if self.sibling(1) {
                return true;
            }
            if self.at_last_node() || !self.parent() {
                return false;
            }
        }
    }

    /// Moves to the previous node in pre-order, the exact inverse of [`TreeCursor::next`].
    /// With `enter` false, a preceding sibling is visited without descending into it.
    pub fn prev(&mut self, enter: bool) -> bool {
        if self.sibling(-1) {
            if enter {
                while self.enter_child(-1, 0, side::DONT_CARE) {}
            }
            return true;
        }
        self.parent()
    }

    /// Moves to the innermost node covering `pos`, like [`Tree::resolve`].
    pub fn move_to(&mut self, pos: u32, side: i8) -> &mut Self {
        while self.from == self.to
            || (if side < 1 { self.from >= pos } else { self.from > pos })
            || (if side > -1 { self.to <= pos } else { self.to < pos })
        {
            if !self.parent() {
                break;
            }
        }
        while self.enter_child(1, pos, side) {}
        self
    }

    /// The current node as a [`SyntaxNode`]. Buffer nodes share the ancestor views built
    /// for earlier calls where the paths overlap.
    pub fn node(&self) -> SyntaxNode {
        let Some(context) = &self.buffer else { return self.tree.clone().into() };

        let cached = self.cached.borrow().clone();
        let mut result = None;
        let mut depth = 0;
        if let Some(cached) = cached
            && cached.context().ptr_eq(context)
        {
            let mut index = self.index;
            let mut level = self.stack.len();
            'scan: loop {
                let mut candidate = Some(&cached);
                while let Some(node) = candidate {
                    if node.index() == index {
                        if index == self.index {
                            return node.clone().into();
                        }
                        result = Some(node.clone());
                        depth = level + 1;
                        break 'scan;
                    }
                    candidate = node.parent();
                }
                if level == 0 {
                    break;
                }
                level -= 1;
                index = self.stack[level];
            }
        }

        for &index in &self.stack[depth..] {
            result = Some(BufferNode::new(context.clone(), result, index));
        }
        let node = BufferNode::new(context.clone(), result, self.index);
        *self.cached.borrow_mut() = Some(node.clone());
        node.into()
    }

    /// Walks the subtree in pre-order, hiding anonymous nodes. Returning false from `enter`
    /// skips the node's children. `leave` runs once the children are done.
    pub fn iterate(
        &mut self,
        mut enter: impl FnMut(&TreeCursor) -> bool,
        mut leave: impl FnMut(&TreeCursor),
    ) {
        let mut depth = 0usize;
        loop {
            let mut must_leave = false;
            if self.ty.is_anonymous() || enter(self) {
                if self.first_child() {
                    depth += 1;
                    continue;
                }
                if !self.ty.is_anonymous() {
                    must_leave = true;
                }
            }
            loop {
                if must_leave {
                    leave(self);
                }
                if depth == 0 {
                    return;
                }
                if self.next_sibling() {
                    break;
                }
                self.parent();
                depth -= 1;
                must_leave = !self.ty.is_anonymous();
            }
        }
    }
}

impl SyntaxNodeRef for TreeCursor {
    fn from(&self) -> u32 {
        self.from
    }

    fn to(&self) -> u32 {
        self.to
    }

    fn node_type(&self) -> &NodeType {
        &self.ty
    }

    fn tree(&self) -> Option<Tree> {
        TreeCursor::tree(self)
    }

    fn node(&self) -> SyntaxNode {
        TreeCursor::node(self)
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::node::tests::sample;

    fn walk(tree: &Tree, mode: IterMode) -> Vec<String> {
        let mut cursor = tree.cursor_with(mode);
        let mut seen = vec![format!("{}@{}", cursor.name(), cursor.from())];
        while cursor.next(true) {
            seen.push(format!("{}@{}", cursor.name(), cursor.from()));
        }
        seen
    }

    #[test]
    fn pre_order() {
        let tree = sample();
        expect![[r#"
            [
                "Doc@0",
                "Call@0",
                "Name@0",
                "Args@1",
                "Number@2",
                "Number@4",
                "Call@7",
                "Name@7",
                "Args@8",
                "Number@9",
            ]
        "#]]
        .assert_debug_eq(&walk(&tree, IterMode::empty()));

        let with_anonymous = walk(&tree, IterMode::INCLUDE_ANONYMOUS);
        assert_eq!(with_anonymous.len(), 11);
        assert_eq!(with_anonymous[6], "@7");
    }

    #[test]
    fn prev_reverses_next() {
        let tree = sample();
        for mode in [IterMode::empty(), IterMode::INCLUDE_ANONYMOUS] {
            let forward = walk(&tree, mode);
            let mut cursor = tree.cursor_with(mode);
            while cursor.last_child() {}
            let mut backward = vec![format!("{}@{}", cursor.name(), cursor.from())];
            while cursor.prev(true) {
                backward.push(format!("{}@{}", cursor.name(), cursor.from()));
            }
            backward.reverse();
            assert_eq!(forward, backward);
        }
    }

    #[test]
    fn move_to_and_node() {
        let tree = sample();
        let mut cursor = tree.cursor_at(4, 1);
        assert_eq!(format!("{:?}", cursor.node()), "Number@4..5");
        assert!(cursor.tree().is_none());

        cursor.move_to(9, 1);
        assert_eq!(format!("{:?}", cursor.node()), "Number@9..10");
        assert!(cursor.tree().is_some());

        cursor.move_to(2, 1);
        let first = cursor.node();
        assert!(cursor.next_sibling());
        let second = cursor.node();
        assert_eq!(first.parent(), second.parent());
        assert!(cursor.matches_context(&["Call", "Args"]));
        assert!(!cursor.next_sibling());
        assert!(cursor.parent());
        assert_eq!(cursor.name(), "Args");
    }

    fn enter_leave(mut cursor: TreeCursor) -> Vec<String> {
        let events = RefCell::new(Vec::new());
        cursor.iterate(
            |c| {
                events.borrow_mut().push(format!("+{}", c.name()));
                true
            },
            |c| events.borrow_mut().push(format!("-{}", c.name())),
        );
        events.into_inner()
    }

    #[test]
    fn iterate_hides_anonymous_parents() {
        let tree = sample();
        let events = enter_leave(tree.cursor());
        assert_eq!(enter_leave(tree.cursor_with(IterMode::INCLUDE_ANONYMOUS)), events);
        assert_eq!(events.iter().filter(|e| e.starts_with('+')).count(), 10);
        assert_eq!(events.last().map(String::as_str), Some("-Doc"));
    }

    #[test]
    fn iterate_enter_leave() {
        let tree = sample();
        let events = RefCell::new(Vec::new());
        tree.cursor().iterate(
            |c| {
                events.borrow_mut().push(format!("+{}", c.name()));
                c.name() != "Args"
            },
            |c| events.borrow_mut().push(format!("-{}", c.name())),
        );
        expect![[r#"
            [
                "+Doc",
                "+Call",
                "+Name",
                "-Name",
                "+Args",
                "-Call",
                "+Call",
                "+Name",
                "-Name",
                "+Args",
                "-Call",
                "-Doc",
            ]
        "#]]
        .assert_debug_eq(&events.into_inner());
    }
}
