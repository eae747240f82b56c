//! Turns the flat postfix node records a parser emits into a [`Tree`].
//!
//! Small subtrees are packed into [`TreeBuffer`]s, and long runs of a repeat node type are
//! split into balanced anonymous groups so no node ends up with thousands of children.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::buffer::{BufferRecord, TreeBuffer};
use crate::node_type::{NodeSet, NodeType};
use crate::props::{self, PropId, PropValue};
use crate::tree::{Tree, TreeChild};

/// Maximum span, in bytes, of nodes packed into a single buffer.
pub const DEFAULT_BUFFER_LENGTH: u32 = 1024;
/// Buffer records store offsets as `u16`, so no buffer may span more than this.
pub const MAX_BUFFER_LENGTH: u32 = u16::MAX as u32;

pub(crate) const BRANCH_FACTOR: usize = 8;
const MAX_DEPTH: usize = 2500;
/// Look-ahead distances below this are not worth recording on nodes.
const LOOK_AHEAD_MARGIN: i64 = 25;

/// Special values of [`BuildRecord::size`].
pub(crate) mod special {
    pub(crate) const REUSE: i32 = -1;
    pub(crate) const CONTEXT_CHANGE: i32 = -3;
    pub(crate) const LOOK_AHEAD: i32 = -4;
}

/// A node record in postfix order. `size` counts this record plus all records of its
/// descendants. Negative sizes mark the special records built by the constructors below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildRecord {
    pub id: u32,
    pub start: u32,
    pub end: u32,
    pub size: i32,
}

impl BuildRecord {
    #[inline]
    pub const fn node(id: u32, start: u32, end: u32, size: i32) -> Self {
        Self { id, start, end, size }
    }

    /// Refers to `BuildData::reused[index]`, placed at `start`.
    #[inline]
    pub const fn reuse(index: u32, start: u32, end: u32) -> Self {
        Self { id: index, start, end, size: special::REUSE }
    }

    /// Nodes preceding this record were created in a context with this hash.
    #[inline]
    pub const fn context_change(hash: u32, pos: u32) -> Self {
        Self { id: hash, start: pos, end: pos, size: special::CONTEXT_CHANGE }
    }

    /// Nodes preceding this record caused the tokenizer to look ahead to `look_ahead`.
    #[inline]
    pub const fn look_ahead(look_ahead: u32, pos: u32) -> Self {
        Self { id: look_ahead, start: pos, end: pos, size: special::LOOK_AHEAD }
    }

    /// True for the records built by [`reuse`](Self::reuse).
    #[inline]
    pub const fn is_reuse(&self) -> bool {
        self.size == special::REUSE
    }

    #[inline]
    pub const fn is_context_change(&self) -> bool {
        self.size == special::CONTEXT_CHANGE
    }

    #[inline]
    pub const fn is_look_ahead(&self) -> bool {
        self.size == special::LOOK_AHEAD
    }
}

/// Reads records backwards, from the end of the output towards its start.
pub trait BufferCursor: Clone {
    /// Number of records before the cursor.
    fn pos(&self) -> usize;
    /// The record just before the cursor.
    fn record(&self) -> BuildRecord;
    fn next(&mut self);
}

#[derive(Debug, Clone)]
pub struct FlatBufferCursor {
    records: Arc<[BuildRecord]>,
    pos: usize,
}

impl FlatBufferCursor {
    pub fn new(records: Arc<[BuildRecord]>) -> Self {
        let pos = records.len();
        Self { records, pos }
    }
}

impl BufferCursor for FlatBufferCursor {
    #[inline]
    fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    fn record(&self) -> BuildRecord {
        self.records[self.pos - 1]
    }

    #[inline]
    fn next(&mut self) {
        self.pos -= 1;
    }
}

pub struct BuildData<C> {
    pub buffer: C,
    pub node_set: NodeSet,
    pub top_id: u16,
    /// Document position of the tree's start.
    pub start: u32,
    /// Records before this cursor position are not part of the tree.
    pub buffer_start: usize,
    /// Defaults to the end of the last node.
    pub length: Option<u32>,
    pub max_buffer_length: u32,
    pub reused: Vec<Tree>,
    /// Node ids at or above this are repeat helpers and never appear in the tree.
    pub min_repeat_type: u32,
}

impl<C> BuildData<C> {
    pub fn new(buffer: C, node_set: NodeSet, top_id: u16) -> Self {
        let min_repeat_type = node_set.types().len() as u32;
        Self {
            buffer,
            node_set,
            top_id,
            start: 0,
            buffer_start: 0,
            length: None,
            max_buffer_length: DEFAULT_BUFFER_LENGTH,
            reused: Vec::new(),
            min_repeat_type,
        }
    }
}

struct BufferSize {
    size: usize,
    start: u32,
    skip: usize,
}

struct Builder<'d, C> {
    cursor: C,
    set: &'d NodeSet,
    reused: &'d [Tree],
    max_buffer_length: u32,
    min_repeat_type: u32,
    context_hash: u32,
    look_ahead: u32,
}

pub(crate) fn build_tree<C: BufferCursor>(data: BuildData<C>) -> Tree {
    let mut builder = Builder {
        cursor: data.buffer,
        set: &data.node_set,
        reused: &data.reused,
        max_buffer_length: data.max_buffer_length.min(MAX_BUFFER_LENGTH),
        min_repeat_type: data.min_repeat_type,
        context_hash: 0,
        look_ahead: 0,
    };
    let mut children = Vec::new();
    let mut positions = Vec::new();
    while builder.cursor.pos() > data.buffer_start {
        builder.take_node(data.start, data.buffer_start, &mut children, &mut positions, None, 0);
    }
    let length = data.length.unwrap_or_else(|| match (children.first(), positions.first()) {
        (Some(child), Some(pos)) => pos + child.len(),
        _ => 0,
    });
    children.reverse();
    positions.reverse();
    let ty = data.node_set.types()[data.top_id as usize].clone();
    Tree::new(ty, children, positions, length)
}

impl<C: BufferCursor> Builder<'_, C> {
    fn node_type(&self, id: u32) -> NodeType {
        self.set.types()[id as usize].clone()
    }

    fn take_node(
        &mut self,
        parent_start: u32,
        min_pos: usize,
        children: &mut Vec<TreeChild>,
        positions: &mut Vec<u32>,
        in_repeat: Option<u32>,
        depth: usize,
    ) {
        let BuildRecord { id, start, end, size } = self.cursor.record();
        let look_ahead_at_start = self.look_ahead;
        let context_at_start = self.context_hash;

        if size < 0 {
            self.cursor.next();
            match size {
                special::REUSE => {
                    children.push(TreeChild::Tree(self.reused[id as usize].clone()));
                    positions.push(start - parent_start);
                }
                special::CONTEXT_CHANGE => self.context_hash = id,
                special::LOOK_AHEAD => self.look_ahead = id,
                _ => panic!("unrecognized record size: {size}"),
            }
            return;
        }

        let mut start_pos = start - parent_start;
        let node = if end - start <= self.max_buffer_length
            && let Some(buffer) = self.find_buffer_size(self.cursor.pos() - min_pos, in_repeat)
        {
            let mut records = vec![BufferRecord::default(); buffer.size - buffer.skip];
            let end_pos = self.cursor.pos() - buffer.size;
            let mut index = records.len();
            while self.cursor.pos() > end_pos {
                index = self.copy_to_buffer(buffer.start, &mut records, index);
            }
            start_pos = buffer.start - parent_start;
            TreeChild::Buffer(Arc::new(TreeBuffer::new(
                records,
                end - buffer.start,
                self.set.clone(),
            )))
        } else {
            let ty = self.node_type(id);
            let end_pos = self.cursor.pos() - size as usize;
            self.cursor.next();
            let mut local_children = Vec::new();
            let mut local_positions = Vec::new();
            let local_in_repeat = (id >= self.min_repeat_type).then_some(id);
            let mut last_group = 0;
            let mut last_end = end;
            while self.cursor.pos() > end_pos {
                let record = self.cursor.record();
                if let Some(repeat) = local_in_repeat
                    && record.id == repeat
                    && record.size >= 0
                {
                    if record.end + self.max_buffer_length <= last_end {
                        self.make_repeat_leaf(
                            &mut local_children,
                            &mut local_positions,
                            start,
                            last_group,
                            record.end,
                            last_end,
                            repeat,
                            look_ahead_at_start,
                            context_at_start,
                        );
                        last_group = local_children.len();
                        last_end = record.end;
                    }
                    self.cursor.next();
                } else if depth > MAX_DEPTH {
                    self.take_flat_node(start, end_pos, &mut local_children, &mut local_positions);
                } else {
                    self.take_node(
                        start,
                        end_pos,
                        &mut local_children,
                        &mut local_positions,
                        local_in_repeat,
                        depth + 1,
                    );
                }
            }
            if let Some(repeat) = local_in_repeat
                && last_group > 0
                && last_group < local_children.len()
            {
                self.make_repeat_leaf(
                    &mut local_children,
                    &mut local_positions,
                    start,
                    last_group,
                    start,
                    last_end,
                    repeat,
                    look_ahead_at_start,
                    context_at_start,
                );
            }
            local_children.reverse();
            local_positions.reverse();

            if local_in_repeat.is_some() && last_group > 0 {
                let balanced = make_balanced(&ty, context_at_start);
                let count = local_children.len();
                TreeChild::Tree(balance_range(
                    &ty,
                    &local_children,
                    &local_positions,
                    0,
                    count,
                    0,
                    end - start,
                    Some(&balanced as &MakeTree<'_>),
                    &balanced,
                ))
            } else {
                TreeChild::Tree(make_tree(
                    ty,
                    local_children,
                    local_positions,
                    end - start,
                    i64::from(look_ahead_at_start) - i64::from(end),
                    context_at_start,
                ))
            }
        };

        children.push(node);
        positions.push(start_pos);
    }

    /// Collects leaves in a flat buffer when the tree gets too deep to recurse into.
    fn take_flat_node(
        &mut self,
        parent_start: u32,
        min_pos: usize,
        children: &mut Vec<TreeChild>,
        positions: &mut Vec<u32>,
    ) {
        let mut nodes: Vec<(u32, u32, u32)> = Vec::new();
        let mut stop_at: Option<i64> = None;
        while self.cursor.pos() > min_pos {
            let BuildRecord { id, start, end, size } = self.cursor.record();
            if size > 1 {
                self.cursor.next();
            } else if stop_at.is_some_and(|stop| i64::from(start) < stop) {
                break;
            } else {
                stop_at.get_or_insert(i64::from(end) - i64::from(self.max_buffer_length));
                nodes.push((id, start, end));
                self.cursor.next();
            }
        }
        let (Some(&(_, start, _)), Some(&(_, _, end))) = (nodes.last(), nodes.first()) else {
            return;
        };
        let records = nodes
            .iter()
            .rev()
            .enumerate()
            .map(|(index, &(id, from, to))| {
                let (from, to) = ((from - start) as u16, (to - start) as u16);
                BufferRecord::new(id as u16, from, to, index as u32 + 1)
            })
            .collect();
        let buffer = TreeBuffer::new(records, end - start, self.set.clone());
        children.push(TreeChild::Buffer(Arc::new(buffer)));
        positions.push(start - parent_start);
    }

    #[allow(clippy::too_many_arguments)]
    fn make_repeat_leaf(
        &mut self,
        children: &mut Vec<TreeChild>,
        positions: &mut Vec<u32>,
        base: u32,
        index: usize,
        from: u32,
        to: u32,
        repeat: u32,
        look_ahead: u32,
        context_hash: u32,
    ) {
        let mut local_children: Vec<_> = children.drain(index..).collect();
        let mut local_positions: Vec<_> = positions.drain(index..).collect();
        local_children.reverse();
        for pos in &mut local_positions {
            *pos = *pos + base - from;
        }
        local_positions.reverse();
        children.push(TreeChild::Tree(make_tree(
            self.node_type(repeat),
            local_children,
            local_positions,
            to - from,
            i64::from(look_ahead) - i64::from(to),
            context_hash,
        )));
        positions.push(from - base);
    }

    /// Scans backwards for the largest run of records that fits in one buffer. Returns
    /// `None` when packing would not cover more than a single node.
    fn find_buffer_size(&self, max_size: usize, in_repeat: Option<u32>) -> Option<BufferSize> {
        let mut fork = self.cursor.clone();
        let mut size = 0;
        let mut start = 0;
        let mut skip = 0;
        let min_start = i64::from(fork.record().end) - i64::from(self.max_buffer_length);
        let mut result = BufferSize { size: 0, start: 0, skip: 0 };
        let min_pos = fork.pos() - max_size;

        'scan: while fork.pos() > min_pos {
            let record = fork.record();
            if in_repeat == Some(record.id) && record.size >= 0 {
                // Skip repeat nodes, but remember the extent we had so far.
                result = BufferSize { size, start, skip };
                skip += 1;
                size += 1;
                fork.next();
                continue;
            }
            if record.size < 0 {
                break;
            }
            let node_size = record.size as usize;
            let start_pos = fork.pos() - node_size;
            if start_pos < min_pos || i64::from(record.start) < min_start {
                break;
            }
            let mut local_skipped = usize::from(record.id >= self.min_repeat_type);
            let node_start = record.start;
            fork.next();
            while fork.pos() > start_pos {
                let inner = fork.record();
                if inner.size < 0 {
                    if inner.size != special::CONTEXT_CHANGE {
                        break 'scan;
                    }
                    local_skipped += 1;
                } else if inner.id >= self.min_repeat_type {
                    local_skipped += 1;
                }
                fork.next();
            }
            start = node_start;
            size += node_size;
            skip += local_skipped;
        }

        if in_repeat.is_none() || size == max_size {
            result = BufferSize { size, start, skip };
        }
        (result.size > 1).then_some(result)
    }

    fn copy_to_buffer(
        &mut self,
        buffer_start: u32,
        records: &mut [BufferRecord],
        index: usize,
    ) -> usize {
        let BuildRecord { id, start, end, size } = self.cursor.record();
        self.cursor.next();
        if size >= 0 && id < self.min_repeat_type {
            let start_index = index;
            let mut index = index;
            if size > 1 {
                let end_pos = self.cursor.pos() - (size as usize - 1);
                while self.cursor.pos() > end_pos {
                    index = self.copy_to_buffer(buffer_start, records, index);
                }
            }
            index -= 1;
            records[index] = BufferRecord::new(
                id as u16,
                (start - buffer_start) as u16,
                (end - buffer_start) as u16,
                start_index as u32,
            );
            index
        } else {
            match size {
                special::CONTEXT_CHANGE => self.context_hash = id,
                special::LOOK_AHEAD => self.look_ahead = id,
                _ => {}
            }
            index
        }
    }
}

fn make_tree(
    ty: NodeType,
    children: Vec<TreeChild>,
    positions: Vec<u32>,
    length: u32,
    look_ahead: i64,
    context_hash: u32,
) -> Tree {
    let mut values: Vec<(PropId, PropValue)> = Vec::new();
    if context_hash != 0 {
        values.push(props::context_hash().value(context_hash));
    }
    if look_ahead > LOOK_AHEAD_MARGIN {
        values.push(props::look_ahead().value(look_ahead as u32));
    }
    Tree::with_props(ty, children, positions, length, values)
}

pub(crate) type MakeTree<'a> = dyn Fn(Vec<TreeChild>, Vec<u32>, u32) -> Tree + 'a;

fn make_balanced(
    ty: &NodeType,
    context_hash: u32,
) -> impl Fn(Vec<TreeChild>, Vec<u32>, u32) -> Tree + '_ {
    move |children, positions, length| {
        let mut look_ahead = 0;
        if let (Some(TreeChild::Tree(last)), Some(&pos)) = (children.last(), positions.last()) {
            if children.len() == 1 && last.node_type() == ty && last.len() == length {
                return last.clone();
            }
            if let Some(&ahead) = last.prop(props::look_ahead()) {
                look_ahead = i64::from(pos + last.len() + ahead) - i64::from(length);
            }
        }
        make_tree(ty.clone(), children, positions, length, look_ahead, context_hash)
    }
}

/// Counts how many leaf-level slots a node takes up once nested `balance_type` groups are
/// flattened.
fn node_size(
    balance_type: &NodeType,
    node: &TreeChild,
    cache: &mut FxHashMap<usize, usize>,
) -> usize {
    let TreeChild::Tree(tree) = node else { return 1 };
    if !balance_type.is_anonymous() || tree.node_type() != balance_type {
        return 1;
    }
    let key = tree.addr();
    if let Some(&size) = cache.get(&key) {
        return size;
    }
    let mut size = 1;
    for child in tree.children() {
        match child {
            TreeChild::Tree(inner) if inner.node_type() == balance_type => {
                size += node_size(balance_type, child, cache);
            }
            _ => {
                size = 1;
                break;
            }
        }
    }
    cache.insert(key, size);
    size
}

/// Groups `children[from..to]` into a shallow tree with at most [`BRANCH_FACTOR`] children
/// per level. `mk_top` builds the outermost node, `mk_tree` the groups below it.
#[allow(clippy::too_many_arguments)]
pub(crate) fn balance_range(
    balance_type: &NodeType,
    children: &[TreeChild],
    positions: &[u32],
    from: usize,
    to: usize,
    start: u32,
    length: u32,
    mk_top: Option<&MakeTree<'_>>,
    mk_tree: &MakeTree<'_>,
) -> Tree {
    let mut cache = FxHashMap::default();
    balance_range_cached(
        balance_type,
        children,
        positions,
        from,
        to,
        start,
        length,
        mk_top,
        mk_tree,
        &mut cache,
    )
}

#[allow(clippy::too_many_arguments)]
fn balance_range_cached(
    balance_type: &NodeType,
    children: &[TreeChild],
    positions: &[u32],
    from: usize,
    to: usize,
    start: u32,
    length: u32,
    mk_top: Option<&MakeTree<'_>>,
    mk_tree: &MakeTree<'_>,
    cache: &mut FxHashMap<usize, usize>,
) -> Tree {
    let total: usize =
        children[from..to].iter().map(|child| node_size(balance_type, child, cache)).sum();

    let mut balancer = Balancer {
        balance_type,
        max_child: (total * 3).div_ceil(2 * BRANCH_FACTOR),
        mk_tree,
        cache,
        children: Vec::new(),
        positions: Vec::new(),
    };
    balancer.divide(children, positions, from, to, 0, start);

    let Balancer { children: local_children, positions: local_positions, .. } = balancer;
    match mk_top {
        Some(mk_top) => mk_top(local_children, local_positions, length),
        None => mk_tree(local_children, local_positions, length),
    }
}

struct Balancer<'b, 'm> {
    balance_type: &'b NodeType,
    max_child: usize,
    mk_tree: &'b MakeTree<'m>,
    cache: &'b mut FxHashMap<usize, usize>,
    children: Vec<TreeChild>,
    positions: Vec<u32>,
}

impl Balancer<'_, '_> {
    fn divide(
        &mut self,
        children: &[TreeChild],
        positions: &[u32],
        from: usize,
        to: usize,
        offset: u32,
        start: u32,
    ) {
        let mut i = from;
        while i < to {
            let group_from = i;
            let group_start = positions[i];
            let mut group_size = node_size(self.balance_type, &children[i], self.cache);
            i += 1;
            while i < to {
                let next_size = node_size(self.balance_type, &children[i], self.cache);
                if group_size + next_size >= self.max_child {
                    break;
                }
                group_size += next_size;
                i += 1;
            }
            if i == group_from + 1 {
                if group_size > self.max_child
                    && let TreeChild::Tree(only) = &children[group_from]
                {
                    // Too big to keep as one child, splice its children in at this level.
                    let only = only.clone();
                    self.divide(
                        only.children(),
                        only.positions(),
                        0,
                        only.children().len(),
                        positions[group_from] + offset,
                        start,
                    );
                    continue;
                }
                self.children.push(children[group_from].clone());
            } else {
                let last = &children[i - 1];
                let length = positions[i - 1] + last.len() - group_start;
                let group = balance_range_cached(
                    self.balance_type,
                    children,
                    positions,
                    group_from,
                    i,
                    group_start,
                    length,
                    None,
                    self.mk_tree,
                    self.cache,
                );
                self.children.push(TreeChild::Tree(group));
            }
            self.positions.push(group_start + offset - start);
        }
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::node_type::NodeTypeSpec;

    // 0 ⚠, 1 Doc (top), 2 Item, 3 Pair, 4 the repeat helper for Item*
    fn set() -> NodeSet {
        let names = [Some("⚠"), Some("Doc"), Some("Item"), Some("Pair"), None];
        let types = names
            .into_iter()
            .enumerate()
            .map(|(id, name)| {
                NodeType::define(NodeTypeSpec {
                    id: id as u16,
                    name: name.map(str::to_owned),
                    top: id == 1,
                    error: id == 0,
                    ..Default::default()
                })
            })
            .collect();
        NodeSet::new(types).unwrap()
    }

    fn build(records: Vec<BuildRecord>, max_buffer_length: u32) -> Tree {
        let mut data = BuildData::new(FlatBufferCursor::new(records.into()), set(), 1);
        data.max_buffer_length = max_buffer_length;
        Tree::build(data)
    }

    #[test]
    fn packs_small_nodes() {
        // Pair(Item, Item) Item
        let records = vec![
            BuildRecord::node(2, 0, 1, 1),
            BuildRecord::node(2, 2, 3, 1),
            BuildRecord::node(3, 0, 3, 3),
            BuildRecord::node(2, 4, 5, 1),
        ];
        let tree = build(records, DEFAULT_BUFFER_LENGTH);
        expect!["Doc(Pair(Item,Item),Item)"].assert_eq(&tree.to_string());
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.children().len(), 1);
        assert!(matches!(tree.children()[0], TreeChild::Buffer(_)));
    }

    #[test]
    fn large_nodes_stay_trees() {
        let records = vec![
            BuildRecord::node(2, 0, 1, 1),
            BuildRecord::node(2, 2, 3, 1),
            BuildRecord::node(3, 0, 3, 3),
        ];
        let tree = build(records, 2);
        let TreeChild::Tree(pair) = &tree.children()[0] else { panic!("expected a tree node") };
        assert_eq!(pair.node_type().name(), "Pair");
        assert_eq!(pair.positions(), &[0, 2]);
        expect!["Doc(Pair(Item,Item))"].assert_eq(&tree.to_string());
    }

    #[test]
    fn buffer_length_is_capped() {
        let records = vec![
            BuildRecord::node(2, 0, 1, 1),
            BuildRecord::node(2, 69_999, 70_000, 1),
            BuildRecord::node(3, 0, 70_000, 3),
        ];
        let tree = build(records, u32::MAX);
        let TreeChild::Tree(pair) = &tree.children()[0] else { panic!("expected a tree node") };
        assert_eq!(pair.positions(), &[0, 69_999]);
        assert_eq!(tree.len(), 70_000);
    }

    #[test]
    fn repeats_are_balanced() {
        // Item* wrapping 40 items, nested left-recursively the way a parser emits them.
        let mut records = Vec::new();
        for i in 0..40u32 {
            records.push(BuildRecord::node(2, i, i + 1, 1));
            if i > 0 {
                let size = records.len() as i32 + 1;
                records.push(BuildRecord::node(4, 0, i + 1, size));
            }
        }
        let mut data = BuildData::new(FlatBufferCursor::new(records.into()), set(), 1);
        data.max_buffer_length = 4;
        data.min_repeat_type = 4;
        let tree = Tree::build(data);

        assert_eq!(tree.len(), 40);
        let mut items = 0;
        let mut max_children = 0;
        let mut stack = vec![tree.clone()];
        while let Some(node) = stack.pop() {
            max_children = max_children.max(node.children().len());
            for child in node.children() {
                match child {
                    TreeChild::Tree(inner) => stack.push(inner.clone()),
                    TreeChild::Buffer(buffer) => items += buffer.records().len(),
                }
            }
            items += usize::from(node.node_type().name() == "Item");
        }
        assert_eq!(items, 40);
        assert!(max_children <= BRANCH_FACTOR * 2, "{max_children}");
    }

    #[test]
    fn reused_nodes_and_props() {
        let reused = build(vec![BuildRecord::node(2, 0, 1, 1)], DEFAULT_BUFFER_LENGTH);
        let records = vec![
            BuildRecord::reuse(0, 0, 1),
            BuildRecord::node(2, 1, 2, 1),
            BuildRecord::look_ahead(60, 2),
            BuildRecord::context_change(9, 2),
            BuildRecord::node(3, 0, 2, 5),
        ];
        let mut data = BuildData::new(FlatBufferCursor::new(records.into()), set(), 1);
        data.reused = vec![reused.clone()];
        let tree = Tree::build(data);
        let TreeChild::Tree(pair) = &tree.children()[0] else { panic!("expected a tree node") };
        assert!(matches!(&pair.children()[0], TreeChild::Tree(t) if t.ptr_eq(&reused)));
        assert_eq!(pair.prop(props::context_hash()), None);

        // Special records apply to the nodes read after them, which precede them in the text.
        let TreeChild::Tree(item) = &pair.children()[1] else { panic!("expected a tree node") };
        assert_eq!(item.prop(props::context_hash()), Some(&9));
        assert_eq!(item.prop(props::look_ahead()), Some(&58));
    }
}
