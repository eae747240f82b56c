//! Running nested parsers over parts of a host tree.
//!
//! [`parse_mixed`] wraps a host parse. Once the host tree is done, it is scanned for nodes
//! the nest callback claims, each claimed region is parsed by its own parser, and the
//! results are attached to the host nodes through the [`mounted`](props::mounted) prop.
//! The host tree is rebuilt along the paths to mounted nodes, everything else is shared.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use text_size::TextRange;
use tracing::debug;

use crate::Error;
use crate::buffer::TreeBuffer;
use crate::cursor::TreeCursor;
use crate::fragment::TreeFragment;
use crate::input::Input;
use crate::node::{IterMode, SyntaxNodeRef, TreeNode};
use crate::node_type::NodeType;
use crate::parse::{ParseWrapper, Parser, PartialParse, WrapParse};
use crate::props::{self, NodeProp};
use crate::tree::{MountedTree, Tree, TreeChild};

/// Where a mixed parse that was stopped early stopped its inner parses. Fragments of such
/// trees are only trusted up to this position.
static STOPPED_INNER: LazyLock<NodeProp<u32>> = LazyLock::new(|| NodeProp::new().per_node());

pub type OverlayPredicate = dyn Fn(&dyn SyntaxNodeRef) -> OverlayMatch + Send + Sync;

/// The answer of an overlay predicate for one descendant of the overlay node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayMatch {
    No,
    /// The whole node belongs to the overlay.
    Node,
    Range(TextRange),
}

#[derive(Clone)]
pub enum Overlay {
    /// Document ranges, inside the claimed node, that the inner parser covers.
    Ranges(Vec<TextRange>),
    /// Asked for each descendant of the claimed node to collect the covered ranges.
    Predicate(Arc<OverlayPredicate>),
}

impl fmt::Debug for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Overlay::Ranges(ranges) => f.debug_tuple("Ranges").field(ranges).finish(),
            Overlay::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

/// What the nest callback returns for a node it wants parsed by another parser.
#[derive(Clone)]
pub struct NestedParse {
    pub parser: Arc<dyn Parser>,
    /// Without an overlay the inner tree replaces the node's content entirely.
    pub overlay: Option<Overlay>,
    pub bracketed: bool,
}

impl NestedParse {
    pub fn new(parser: Arc<dyn Parser>) -> Self {
        Self { parser, overlay: None, bracketed: false }
    }

    pub fn with_overlay(mut self, overlay: Overlay) -> Self {
        self.overlay = Some(overlay);
        self
    }
}

type NestFn = dyn Fn(&dyn SyntaxNodeRef, &dyn Input) -> Option<NestedParse> + Send + Sync;

/// Creates a parse wrapper that runs nested parses for the nodes `nest` claims.
pub fn parse_mixed(
    nest: impl Fn(&dyn SyntaxNodeRef, &dyn Input) -> Option<NestedParse> + Send + Sync + 'static,
) -> ParseWrapper {
    Arc::new(MixedWrapper { nest: Arc::new(nest) })
}

struct MixedWrapper {
    nest: Arc<NestFn>,
}

impl WrapParse for MixedWrapper {
    fn wrap<'a>(
        &self,
        inner: Box<dyn PartialParse + 'a>,
        input: &'a dyn Input,
        fragments: &[TreeFragment],
        ranges: &[TextRange],
    ) -> Box<dyn PartialParse + 'a> {
        Box::new(MixedParse {
            base_parse: Some(inner),
            nest: self.nest.clone(),
            input,
            fragments: fragments.to_vec(),
            ranges: ranges.to_vec(),
            inner: Vec::new(),
            inner_done: 0,
            base_tree: None,
            mounts: Vec::new(),
            stopped_at: None,
        })
    }
}

/// The position of a node relative to the root of the host tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodePath {
    /// Child indices from the root down to the innermost tree node.
    pub(crate) trees: Vec<u32>,
    pub(crate) buffer: Option<BufferPath>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BufferPath {
    /// Index of the buffer among the tree node's children.
    pub(crate) child: u32,
    /// Record indices from the outermost buffer ancestor down to the node.
    pub(crate) chain: Vec<u32>,
}

struct InnerParse<'a> {
    parser: Arc<dyn Parser>,
    parse: Box<dyn PartialParse + 'a>,
    overlay: Option<Vec<TextRange>>,
    bracketed: bool,
    target: NodePath,
    from: u32,
}

struct ActiveOverlay {
    parser: Arc<dyn Parser>,
    predicate: Arc<OverlayPredicate>,
    mounts: Vec<ReusableMount>,
    index: usize,
    start: u32,
    bracketed: bool,
    target: NodePath,
    depth: usize,
    ranges: Vec<TextRange>,
    prev: Option<Box<ActiveOverlay>>,
}

struct CoverInfo {
    ranges: Vec<TextRange>,
    depth: usize,
    prev: Option<Box<CoverInfo>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cover {
    None,
    Partial,
    Full,
}

#[derive(Clone)]
struct ReusableMount {
    fragment: TreeFragment,
    mount: MountedTree,
    pos: i64,
}

struct MixedParse<'a> {
    base_parse: Option<Box<dyn PartialParse + 'a>>,
    nest: Arc<NestFn>,
    input: &'a dyn Input,
    fragments: Vec<TreeFragment>,
    ranges: Vec<TextRange>,
    inner: Vec<InnerParse<'a>>,
    inner_done: usize,
    base_tree: Option<Tree>,
    mounts: Vec<(NodePath, MountedTree)>,
    stopped_at: Option<u32>,
}

impl PartialParse for MixedParse<'_> {
    fn advance(&mut self) -> Result<Option<Tree>, Error> {
        if let Some(base) = &mut self.base_parse {
            let Some(done) = base.advance()? else { return Ok(None) };
            self.base_parse = None;
            self.base_tree = Some(done);
            self.start_inner()?;
            if let Some(stop) = self.stopped_at {
                for inner in &mut self.inner {
                    inner.parse.stop_at(stop)?;
                }
            }
        }

        let Some(base) = &self.base_tree else { return Ok(None) };
        if self.inner_done == self.inner.len() {
            let mounts = std::mem::take(&mut self.mounts);
            let pending = mounts
                .iter()
                .map(|(path, mount)| PendingMount {
                    trees: &path.trees,
                    buffer: path.buffer.as_ref(),
                    mount: mount.clone(),
                })
                .collect::<Vec<_>>();
            let mut result = if pending.is_empty() { base.clone() } else { remount(base, pending) };
            if let Some(stop) = self.stopped_at {
                result = result.set_prop(STOPPED_INNER.id(), Arc::new(stop));
            }
            return Ok(Some(result));
        }

        let inner = &mut self.inner[self.inner_done];
        if let Some(done) = inner.parse.advance()? {
            self.inner_done += 1;
            let mount = MountedTree {
                tree: done,
                overlay: inner.overlay.clone(),
                parser: inner.parser.clone(),
                bracketed: inner.bracketed,
            };
            self.mounts.push((inner.target.clone(), mount));
        }
        Ok(None)
    }

    fn parsed_pos(&self) -> u32 {
        if self.base_parse.is_some() {
            return 0;
        }
        self.inner[self.inner_done..]
            .iter()
            .filter(|inner| inner.from < self.input.len())
            .fold(self.input.len(), |pos, inner| pos.min(inner.parse.parsed_pos()))
    }

    fn stop_at(&mut self, pos: u32) -> Result<(), Error> {
        self.stopped_at = Some(pos);
        match &mut self.base_parse {
            Some(base) => base.stop_at(pos),
            None => {
                for inner in &mut self.inner[self.inner_done..] {
                    inner.parse.stop_at(pos)?;
                }
                Ok(())
            }
        }
    }

    fn stopped_at(&self) -> Option<u32> {
        self.stopped_at
    }
}

impl<'a> MixedParse<'a> {
    fn start_inner(&mut self) -> Result<(), Error> {
        let Some(base) = self.base_tree.clone() else { return Ok(()) };
        let start = self.ranges.first().map_or(0, |range| range.start().into());
        let old = self.fragments.clone();
        let mut fragments = FragmentCursor::new(&old);
        let mut overlay: Option<Box<ActiveOverlay>> = None;
        let mut covered: Option<Box<CoverInfo>> = None;
        let mode = IterMode::INCLUDE_ANONYMOUS | IterMode::IGNORE_MOUNTS;
        let mut cursor = TreeCursor::new(TreeNode::root(base, start).into(), mode);

        'scan: loop {
            let mut enter = true;
            let cover = covered
                .as_ref()
                .map_or(Cover::None, |c| check_cover(&c.ranges, cursor.from(), cursor.to()));

            if self.stopped_at.is_some_and(|stop| cursor.from() >= stop) {
                enter = false;
            } else if fragments.has_node(&cursor) {
                if let Some(overlay) = &mut overlay {
                    reuse_overlay_ranges(overlay, &cursor);
                }
                enter = false;
            } else if cover != Cover::None {
                enter = cover != Cover::Full;
            } else if let Some(nest) = self.claim(&cursor) {
                let target = cursor.path();
                let mounts = fragments.find_mounts(cursor.from(), &nest.parser);
                match nest.overlay {
                    Some(Overlay::Predicate(predicate)) => {
                        debug!(from = cursor.from(), "starting overlay scan");
                        overlay = Some(Box::new(ActiveOverlay {
                            parser: nest.parser,
                            predicate,
                            mounts,
                            index: self.inner.len(),
                            start: cursor.from(),
                            bracketed: nest.bracketed,
                            target,
                            depth: 0,
                            ranges: Vec::new(),
                            prev: overlay.take(),
                        }));
                    }
                    overlay_ranges => {
                        let explicit = match &overlay_ranges {
                            Some(Overlay::Ranges(ranges)) => Some(ranges.clone()),
                            _ => None,
                        };
                        let claimed = explicit.clone().unwrap_or_else(|| {
                            if cursor.from() < cursor.to() {
                                vec![range(cursor.from(), cursor.to())]
                            } else {
                                Vec::new()
                            }
                        });
                        let ranges = punch_ranges(&self.ranges, &claimed);
                        if !ranges.is_empty() {
                            check_ranges(&ranges)?;
                        }
                        if !ranges.is_empty() || explicit.is_none() {
                            let parse = if ranges.is_empty() {
                                nest.parser.start_parse(&"", &[], None)
                            } else {
                                let reused = enter_fragments(&mounts, &ranges);
                                nest.parser.start_parse(self.input, &reused, Some(&ranges))
                            };
                            let from = cursor.from();
                            debug!(from, ranges = ranges.len(), "starting inner parse");
                            self.inner.push(InnerParse {
                                parser: nest.parser.clone(),
                                parse,
                                overlay: explicit.as_ref().map(|ranges| {
                                    ranges
                                        .iter()
                                        .map(|r| {
                                            let shift = |p: u32| p.saturating_sub(from);
                                            range(shift(start_of(r)), shift(end_of(r)))
                                        })
                                        .collect()
                                }),
                                bracketed: nest.bracketed,
                                target,
                                from: ranges.first().map_or(from, start_of),
                            });
                        }
                        if explicit.is_none() {
                            enter = false;
                        } else if !ranges.is_empty() {
                            let prev = covered.take();
                            covered = Some(Box::new(CoverInfo { ranges, depth: 0, prev }));
                        }
                    }
                }
            } else if let Some(active) = &mut overlay {
                let matched = match (active.predicate)(&cursor) {
                    OverlayMatch::No => None,
                    OverlayMatch::Node => Some(range(cursor.from(), cursor.to())),
                    OverlayMatch::Range(range) => Some(range),
                };
                if let Some(matched) = matched
                    && matched.start() < matched.end()
                {
                    match active.ranges.last_mut() {
                        Some(last) if last.end() == matched.start() => {
                            *last = TextRange::new(last.start(), matched.end());
                        }
                        _ => active.ranges.push(matched),
                    }
                }
            }

            if enter && cursor.first_child() {
                if let Some(overlay) = &mut overlay {
                    overlay.depth += 1;
                }
                if let Some(covered) = &mut covered {
                    covered.depth += 1;
                }
                continue;
            }
            loop {
                if cursor.next_sibling() {
                    break;
                }
                if !cursor.parent() {
                    break 'scan;
                }
                if let Some(mut active) = overlay.take() {
                    active.depth = active.depth.saturating_sub(1);
                    if active.depth == 0 {
                        self.finish_overlay(&mut active)?;
                        overlay = active.prev.take();
                    } else {
                        overlay = Some(active);
                    }
                }
                if let Some(mut cover) = covered.take() {
                    cover.depth = cover.depth.saturating_sub(1);
                    covered = if cover.depth == 0 { cover.prev.take() } else { Some(cover) };
                }
            }
        }
        Ok(())
    }

    fn claim(&self, cursor: &TreeCursor) -> Option<NestedParse> {
        if cursor.node_type().is_anonymous() {
            return None;
        }
        let nest = (self.nest)(cursor, self.input)?;
        (cursor.from() < cursor.to() || nest.overlay.is_none()).then_some(nest)
    }

    fn finish_overlay(&mut self, overlay: &mut ActiveOverlay) -> Result<(), Error> {
        let ranges = punch_ranges(&self.ranges, &overlay.ranges);
        if ranges.is_empty() {
            return Ok(());
        }
        check_ranges(&ranges)?;
        let reused = enter_fragments(&overlay.mounts, &ranges);
        let parse = overlay.parser.start_parse(self.input, &reused, Some(&ranges));
        let start = overlay.start;
        debug!(from = start, ranges = ranges.len(), "starting overlay parse");
        self.inner.insert(
            overlay.index,
            InnerParse {
                parser: overlay.parser.clone(),
                parse,
                overlay: Some(
                    overlay
                        .ranges
                        .iter()
                        .map(|r| {
                            let shift = |p: u32| p.saturating_sub(start);
                            range(shift(start_of(r)), shift(end_of(r)))
                        })
                        .collect(),
                ),
                bracketed: overlay.bracketed,
                target: overlay.target.clone(),
                from: start_of(&ranges[0]),
            },
        );
        Ok(())
    }
}

/// Adds the ranges of an old overlay mount that fall inside a reused node.
fn reuse_overlay_ranges(overlay: &mut ActiveOverlay, cursor: &TreeCursor) {
    let (node_from, node_to) = (i64::from(cursor.from()), i64::from(cursor.to()));
    let matched = overlay.mounts.iter().find(|reusable| {
        i64::from(reusable.fragment.from) <= node_from
            && i64::from(reusable.fragment.to) >= node_to
            && reusable.mount.overlay.is_some()
    });
    let Some(reusable) = matched else { return };
    let Some(ranges) = &reusable.mount.overlay else { return };
    for r in ranges {
        let from = i64::from(start_of(r)) + reusable.pos;
        let to = i64::from(end_of(r)) + reusable.pos;
        let overlaps = overlay.ranges.iter().any(|existing| {
            i64::from(start_of(existing)) < to && i64::from(end_of(existing)) > from
        });
        if from >= node_from && to <= node_to && !overlaps {
            overlay.ranges.push(range(from as u32, to as u32));
        }
    }
}

#[inline]
fn range(from: u32, to: u32) -> TextRange {
    TextRange::new(from.into(), to.into())
}

#[inline]
fn start_of(range: &TextRange) -> u32 {
    range.start().into()
}

#[inline]
fn end_of(range: &TextRange) -> u32 {
    range.end().into()
}

fn check_ranges(ranges: &[TextRange]) -> Result<(), Error> {
    if ranges.is_empty() || ranges.iter().any(|range| range.start() >= range.end()) {
        return Err(Error::InvalidRanges(ranges.to_vec()));
    }
    Ok(())
}

fn check_cover(covered: &[TextRange], from: u32, to: u32) -> Cover {
    for range in covered {
        if start_of(range) >= to {
            break;
        }
        if end_of(range) > from {
            return if start_of(range) <= from && end_of(range) >= to {
                Cover::Full
            } else {
                Cover::Partial
            };
        }
    }
    Cover::None
}

/// Removes the gaps between `outer` ranges from `ranges`.
fn punch_ranges(outer: &[TextRange], ranges: &[TextRange]) -> Vec<TextRange> {
    let mut current = ranges.to_vec();
    let mut j = 0;
    for gap in outer.windows(2) {
        let (gap_from, gap_to) = (gap[0].end(), gap[1].start());
        while let Some(&r) = current.get(j) {
            if r.start() >= gap_to {
                break;
            }
            if r.end() <= gap_from {
                j += 1;
                continue;
            }
            if r.start() < gap_from {
                current[j] = TextRange::new(r.start(), gap_from);
                if r.end() > gap_to {
                    current.insert(j + 1, TextRange::new(gap_to, r.end()));
                }
                j += 1;
            } else if r.end() > gap_to {
                current[j] = TextRange::new(gap_to, r.end());
            } else {
                current.remove(j);
            }
        }
    }
    current
}

/// Positions in `from..to` where exactly one of `a` and `b` covers the text.
fn find_cover_changes(a: &[TextRange], b: &[TextRange], from: i64, to: i64) -> Vec<(i64, i64)> {
    const FAR: i64 = i64::MAX;
    let (mut index_a, mut index_b) = (0, 0);
    let (mut in_a, mut in_b) = (false, false);
    let mut pos = i64::MIN;
    let mut result = Vec::new();
    loop {
        let next_a = match a.get(index_a) {
            None => FAR,
            Some(r) => i64::from(if in_a { end_of(r) } else { start_of(r) }),
        };
        let next_b = match b.get(index_b) {
            None => FAR,
            Some(r) => i64::from(if in_b { end_of(r) } else { start_of(r) }),
        };
        if in_a != in_b {
            let (start, end) = (pos.max(from), next_a.min(next_b).min(to));
            if start < end {
                result.push((start, end));
            }
        }
        pos = next_a.min(next_b);
        if pos == FAR {
            break;
        }
        if next_a == pos {
            if in_a {
                index_a += 1;
            }
            in_a = !in_a;
        }
        if next_b == pos {
            if in_b {
                index_b += 1;
            }
            in_b = !in_b;
        }
    }
    result
}

/// Fragments of old inner trees that can be reused by an inner parse over `ranges`.
fn enter_fragments(mounts: &[ReusableMount], ranges: &[TextRange]) -> Vec<TreeFragment> {
    let mut result = Vec::new();
    for ReusableMount { fragment, mount, pos } in mounts {
        let overlay_start = mount.overlay.as_ref().and_then(|o| o.first()).map_or(0, start_of);
        let start_pos = pos + i64::from(overlay_start);
        let end_pos = start_pos + i64::from(mount.tree.len());
        let from = i64::from(fragment.from).max(start_pos);
        let to = i64::from(fragment.to).min(end_pos);
        let piece = |from: i64, to: i64, open_start: bool, open_end: bool| TreeFragment {
            from: from as u32,
            to: to as u32,
            tree: mount.tree.clone(),
            offset: -start_pos,
            open_start,
            open_end,
        };
        match &mount.overlay {
            Some(overlay) => {
                let overlay: Vec<TextRange> = overlay
                    .iter()
                    .map(|r| {
                        let shift = |p: u32| (i64::from(p) + pos) as u32;
                        range(shift(start_of(r)), shift(end_of(r)))
                    })
                    .collect();
                let changes = find_cover_changes(ranges, &overlay, from, to);
                let mut at = from;
                for index in 0..=changes.len() {
                    let end = changes.get(index).map_or(to, |change| change.0);
                    if end > at {
                        result.push(piece(
                            at,
                            end,
                            i64::from(fragment.from) >= at || fragment.open_start,
                            i64::from(fragment.to) <= end || fragment.open_end,
                        ));
                    }
                    let Some(change) = changes.get(index) else { break };
                    at = change.1;
                }
            }
            None if from < to => result.push(piece(
                from,
                to,
                i64::from(fragment.from) >= start_pos || fragment.open_start,
                i64::from(fragment.to) <= end_pos || fragment.open_end,
            )),
            None => {}
        }
    }
    result
}

/// Walks a fragment's tree alongside the scan of the new tree, to tell which new nodes were
/// taken over unchanged from the old tree.
struct StructureCursor {
    cursor: TreeCursor,
    offset: i64,
    done: bool,
}

impl StructureCursor {
    fn new(root: &Tree, offset: i64) -> Self {
        let mode = IterMode::INCLUDE_ANONYMOUS | IterMode::IGNORE_MOUNTS;
        Self { cursor: root.cursor_with(mode), offset, done: false }
    }

    /// Moves to the first node, in pre-order, that starts at or after `pos`.
    fn move_to(&mut self, pos: u32) {
        let target = i64::from(pos) - self.offset;
        let mode = IterMode::IGNORE_OVERLAYS | IterMode::EXCLUDE_BUFFERS;
        while !self.done && i64::from(self.cursor.from()) < target {
            let entered = i64::from(self.cursor.to()) >= target
                && self.cursor.enter(target as u32, 1, mode);
            if !entered && !self.cursor.next(false) {
                self.done = true;
            }
        }
    }

    fn has_node(&mut self, cursor: &TreeCursor) -> bool {
        self.move_to(cursor.from());
        if self.done || i64::from(self.cursor.from()) + self.offset != i64::from(cursor.from()) {
            return false;
        }
        let (Some(mut tree), Some(target)) = (self.cursor.tree(), cursor.tree()) else {
            return false;
        };
        loop {
            if tree.ptr_eq(&target) {
                return true;
            }
            match (tree.children().first(), tree.positions().first()) {
                (Some(TreeChild::Tree(first)), Some(0)) => tree = first.clone(),
                _ => return false,
            }
        }
    }
}

struct FragmentCursor<'f> {
    fragments: &'f [TreeFragment],
    index: usize,
    current_to: u32,
    inner: Option<StructureCursor>,
}

impl<'f> FragmentCursor<'f> {
    fn new(fragments: &'f [TreeFragment]) -> Self {
        let mut cursor = Self { fragments, index: 0, current_to: 0, inner: None };
        cursor.load();
        cursor
    }

    fn load(&mut self) {
        self.inner = self.fragments.get(self.index).map(|fragment| {
            self.current_to = fragment.tree.prop(&STOPPED_INNER).copied().unwrap_or(fragment.to);
            StructureCursor::new(&fragment.tree, -fragment.offset)
        });
    }

    fn current(&self) -> Option<&'f TreeFragment> {
        self.inner.as_ref().and(self.fragments.get(self.index))
    }

    fn has_node(&mut self, node: &TreeCursor) -> bool {
        while self.current().is_some() && node.from() >= self.current_to {
            self.index += 1;
            self.load();
        }
        let Some(fragment) = self.current() else { return false };
        fragment.from <= node.from()
            && self.current_to >= node.to()
            && self.inner.as_mut().is_some_and(|inner| inner.has_node(node))
    }

    /// Old mounts by `parser` around `pos` in the current fragment.
    fn find_mounts(&mut self, pos: u32, parser: &Arc<dyn Parser>) -> Vec<ReusableMount> {
        let mut result = Vec::new();
        let Some(current) = self.current() else { return result };
        let Some(inner) = &mut self.inner else { return result };
        let target = (i64::from(pos) - inner.offset).max(0) as u32;
        inner.cursor.move_to(target, 1);
        let mut node = Some(inner.cursor.node());
        while let Some(at) = node {
            if let Some(tree) = at.tree()
                && let Some(mount) = tree.mounted()
                && same_parser(&mount.parser, parser)
            {
                for fragment in &self.fragments[self.index..] {
                    if fragment.from >= at.to() {
                        break;
                    }
                    if fragment.tree.ptr_eq(&current.tree) {
                        result.push(ReusableMount {
                            fragment: fragment.clone(),
                            pos: i64::from(at.from()) - fragment.offset,
                            mount: mount.clone(),
                        });
                    }
                }
            }
            node = at.parent();
        }
        result
    }
}

fn same_parser(a: &Arc<dyn Parser>, b: &Arc<dyn Parser>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

struct PendingMount<'p> {
    trees: &'p [u32],
    buffer: Option<&'p BufferPath>,
    mount: MountedTree,
}

/// Copies the nodes on the paths to `pending` targets, attaching the mounts.
fn remount(tree: &Tree, pending: Vec<PendingMount<'_>>) -> Tree {
    let mut own = None;
    let mut in_trees: BTreeMap<u32, Vec<PendingMount<'_>>> = BTreeMap::new();
    let mut in_buffers: BTreeMap<u32, Vec<(&[u32], MountedTree)>> = BTreeMap::new();
    for entry in pending {
        match entry.trees.split_first() {
            Some((&index, rest)) => {
                in_trees.entry(index).or_default().push(PendingMount { trees: rest, ..entry });
            }
            None => match entry.buffer {
                Some(path) => {
                    in_buffers.entry(path.child).or_default().push((&path.chain, entry.mount));
                }
                None => own = Some(entry.mount),
            },
        }
    }

    let mut children = tree.children().to_vec();
    for (index, pending) in in_trees {
        let TreeChild::Tree(child) = &children[index as usize] else { continue };
        let child = remount(child, pending);
        children[index as usize] = child.into();
    }
    for (index, targets) in in_buffers {
        let TreeChild::Buffer(buffer) = &children[index as usize] else { continue };
        let count = buffer.records().len() as u32;
        let length = buffer.len();
        let split = split_buffer(buffer, 0, count, NodeType::none(), 0, length, &targets, None);
        children[index as usize] = split.into();
    }

    let mut values = tree.prop_values().to_vec();
    if let Some(mount) = own {
        props::set_value(&mut values, props::mounted().id(), Arc::new(mount));
    }
    tree.rebuild(children, values)
}

/// Turns the records `start..end` of a buffer into a tree, splitting out the records on the
/// paths to `targets` as tree nodes and slicing the rest into smaller buffers.
#[allow(clippy::too_many_arguments)]
fn split_buffer(
    buffer: &TreeBuffer,
    start: u32,
    end: u32,
    ty: NodeType,
    offset: u32,
    length: u32,
    targets: &[(&[u32], MountedTree)],
    own: Option<MountedTree>,
) -> Tree {
    let mut groups: BTreeMap<u32, (Option<MountedTree>, Vec<(&[u32], MountedTree)>)> =
        BTreeMap::new();
    for (chain, mount) in targets {
        let Some((&index, rest)) = chain.split_first() else { continue };
        let group = groups.entry(index).or_default();
        if rest.is_empty() {
            group.0 = Some(mount.clone());
        } else {
            group.1.push((rest, mount.clone()));
        }
    }

    let mut children = Vec::new();
    let mut positions = Vec::new();
    let mut index = start;
    for (target, (mount, deeper)) in groups {
        slice_run(buffer, index, target, offset, &mut children, &mut positions);
        let record = buffer.record(target);
        let ty = buffer.node_type(target).clone();
        let (from, length) = (record.start(), record.end() - record.start());
        let end_index = record.end_index();
        let child = split_buffer(buffer, target + 1, end_index, ty, from, length, &deeper, mount);
        children.push(child.into());
        positions.push(from - offset);
        index = record.end_index();
    }
    slice_run(buffer, index, end, offset, &mut children, &mut positions);

    let values = own.map(|mount| vec![props::mounted().value(mount)]).unwrap_or_default();
    Tree::with_props(ty, children, positions, length, values)
}

fn slice_run(
    buffer: &TreeBuffer,
    start: u32,
    end: u32,
    offset: u32,
    children: &mut Vec<TreeChild>,
    positions: &mut Vec<u32>,
) {
    if start < end {
        let from = buffer.record(start).start();
        children.push(TreeChild::Buffer(Arc::new(buffer.slice(start, end, from))));
        positions.push(from - offset);
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::node::tests::sample;

    struct Done(Option<Tree>);

    impl PartialParse for Done {
        fn advance(&mut self) -> Result<Option<Tree>, Error> {
            Ok(self.0.take())
        }

        fn parsed_pos(&self) -> u32 {
            0
        }

        fn stop_at(&mut self, _: u32) -> Result<(), Error> {
            Ok(())
        }

        fn stopped_at(&self) -> Option<u32> {
            None
        }
    }

    /// Parses any ranges into a single leaf node.
    struct Leaf(NodeType);

    impl Parser for Leaf {
        fn create_parse<'a>(
            &self,
            _: &'a dyn Input,
            _: &[TreeFragment],
            ranges: &[TextRange],
        ) -> Box<dyn PartialParse + 'a> {
            let length = ranges.last().map_or(0, end_of) - ranges.first().map_or(0, start_of);
            Box::new(Done(Some(Tree::new(self.0.clone(), Vec::new(), Vec::new(), length))))
        }
    }

    fn run(stop: Option<u32>) -> Tree {
        let host = sample();
        let number = host.top_node().resolve(2, 1).node_type().clone();
        let parser: Arc<dyn Parser> = Arc::new(Leaf(number));
        let wrapper = parse_mixed(move |node, _| {
            (node.name() == "Args").then(|| NestedParse::new(parser.clone()))
        });
        let text = "f(1 2) g(3)";
        let mut parse = wrapper.wrap(Box::new(Done(Some(host))), &text, &[], &[r(0, 11)]);
        if let Some(stop) = stop {
            parse.stop_at(stop).unwrap();
        }
        loop {
            if let Some(tree) = parse.advance().unwrap() {
                return tree;
            }
        }
    }

    #[test]
    fn mounts_tree_and_buffer_nodes() {
        let tree = run(None);
        expect!["Doc(Call(Name,Number),Call(Name,Number))"].assert_eq(&tree.to_string());

        let args = tree.top_node().first_child().unwrap().get_child("Args").unwrap();
        let mounted = args.tree().unwrap();
        assert_eq!(mounted.mounted().map(|mount| mount.tree.len()), Some(5));
        assert!(tree.prop(&STOPPED_INNER).is_none());
        // The untouched host is left as it was.
        expect!["Doc(Call(Name,Args(Number,Number)),Call(Name,Args(Number)))"]
            .assert_eq(&sample().to_string());
    }

    #[test]
    fn stopped_parse_skips_later_nodes() {
        let tree = run(Some(4));
        expect!["Doc(Call(Name,Number),Call(Name,Args(Number)))"].assert_eq(&tree.to_string());
        assert_eq!(tree.prop(&STOPPED_INNER), Some(&4));
    }

    fn r(from: u32, to: u32) -> TextRange {
        range(from, to)
    }

    #[test]
    fn punching_gaps() {
        let outer = [r(0, 10), r(20, 30)];
        assert_eq!(punch_ranges(&outer, &[r(5, 25)]), vec![r(5, 10), r(20, 25)]);
        assert_eq!(punch_ranges(&outer, &[r(12, 18)]), vec![]);
        assert_eq!(punch_ranges(&outer, &[r(15, 28)]), vec![r(20, 28)]);
        assert_eq!(punch_ranges(&[r(0, 30)], &[r(5, 25)]), vec![r(5, 25)]);
    }

    #[test]
    fn covers() {
        let covered = [r(10, 20), r(30, 40)];
        assert_eq!(check_cover(&covered, 12, 18), Cover::Full);
        assert_eq!(check_cover(&covered, 15, 35), Cover::Partial);
        assert_eq!(check_cover(&covered, 20, 30), Cover::None);
    }

    #[test]
    fn invalid_ranges() {
        assert!(check_ranges(&[r(1, 4)]).is_ok());
        assert_eq!(check_ranges(&[r(4, 4)]), Err(Error::InvalidRanges(vec![r(4, 4)])));
        assert!(check_ranges(&[]).is_err());
    }

    #[test]
    fn cover_changes() {
        let a = [r(0, 10)];
        let b = [r(0, 4), r(6, 10)];
        assert_eq!(find_cover_changes(&a, &b, 0, 10), vec![(4, 6)]);
        assert_eq!(find_cover_changes(&a, &a, 0, 10), vec![]);
    }
}
