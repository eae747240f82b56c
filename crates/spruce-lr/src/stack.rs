//! A single parse stack and the node records it has produced so far.
//!
//! Stacks split whenever the parser has more than one way forward. The records written
//! before a split are frozen into a shared chunk so the copies don't duplicate them.

use std::fmt;
use std::sync::Arc;

use spruce_tree::{BufferCursor, BuildRecord, Tree};

use crate::context::ContextTracker;
use crate::parse::Shared;
use crate::parser::LrParser;
use crate::table::{action, parse_state, seq, state_flag, term};

const ERR: u32 = term::ERR as u32;

/// Reductions spanning less than this many bytes after the reduce position don't record
/// how far the tokenizer looked ahead.
const LOOK_AHEAD_MARGIN: i64 = 25;
const MAX_INSERT_STACK_DEPTH: usize = 100;
/// Past this depth, insert recovery only considers states that can shift the next token.
const DAMPEN_INSERT_STACK_DEPTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Frame {
    pub(crate) state: u32,
    /// Position where the node under construction in this frame starts.
    pub(crate) start: u32,
    /// Record count at the time the frame was pushed.
    pub(crate) buffer: usize,
}

/// Records frozen at a split, shared by every stack split off after them.
#[derive(Debug, Clone)]
pub(crate) struct BufferChunk {
    records: Vec<BuildRecord>,
    parent: Option<Arc<BufferChunk>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StackContext {
    context: u32,
    hash: u32,
}

pub(crate) struct Stack {
    pub(crate) frames: Vec<Frame>,
    pub(crate) state: u32,
    /// End of the last non-skipped node, where a reduction would end.
    pub(crate) reduce_pos: u32,
    pub(crate) pos: u32,
    /// Accumulated recovery penalties and dynamic precedences. Higher is better.
    pub(crate) score: i32,
    pub(crate) buffer: Vec<BuildRecord>,
    /// Number of records held by frozen chunks before `buffer`.
    pub(crate) buffer_base: usize,
    context: Option<StackContext>,
    pub(crate) look_ahead: u32,
    parent: Option<Arc<BufferChunk>>,
}

impl Stack {
    pub(crate) fn start(parser: &LrParser, state: u32, pos: u32) -> Self {
        let context = parser.context_tracker().map(|tracker| {
            let context = tracker.start();
            StackContext { context, hash: tracker.hash(context) }
        });
        Self::new(state, pos, context)
    }

    fn new(state: u32, pos: u32, context: Option<StackContext>) -> Self {
        Self {
            frames: Vec::new(),
            state,
            reduce_pos: pos,
            pos,
            score: 0,
            buffer: Vec::new(),
            buffer_base: 0,
            context,
            look_ahead: 0,
            parent: None,
        }
    }

    #[inline]
    pub(crate) fn context(&self) -> Option<u32> {
        self.context.map(|cx| cx.context)
    }

    /// Hash of the stack's context, zero without a context tracker.
    #[inline]
    pub(crate) fn context_hash(&self) -> u32 {
        self.context.map_or(0, |cx| cx.hash)
    }

    #[inline]
    pub(crate) fn has_context(&self) -> bool {
        self.context.is_some()
    }

    /// Total number of records, frozen ones included.
    #[inline]
    pub(crate) fn buffer_end(&self) -> usize {
        self.buffer_base + self.buffer.len()
    }

    pub(crate) fn push_state(&mut self, state: u32, start: u32) {
        self.frames.push(Frame { state: self.state, start, buffer: self.buffer_end() });
        self.state = state;
    }

    pub(crate) fn reduce(&mut self, action: u32, parser: &LrParser, shared: &mut Shared<'_>) {
        let depth = (action >> action::REDUCE_DEPTH_SHIFT) as usize;
        let ty = action & action::VALUE_MASK;

        let look_ahead_record =
            i64::from(self.reduce_pos) < i64::from(self.pos) - LOOK_AHEAD_MARGIN;
        if look_ahead_record {
            self.set_look_ahead(self.pos);
        }
        self.score += parser.dynamic_precedence(ty);

        if depth == 0 {
            // Nothing is popped, an empty node is pushed at the reduce position.
            self.push_state(parser.goto_loose(self.state, ty), self.reduce_pos);
            if ty < parser.min_repeat_term() {
                let size = if look_ahead_record { 2 } else { 1 };
                self.store_node(ty, self.reduce_pos, self.reduce_pos, size, true);
            }
            self.reduce_context(ty, self.reduce_pos, parser, shared);
            return;
        }

        // Stay reductions also consume the frames of the skipped wrapper and the state
        // being returned to.
        let stay = action & action::STAY_FLAG != 0;
        let base = self.frames.len().saturating_sub(depth - 1 + if stay { 2 } else { 0 });
        let start = base.checked_sub(1).map_or(shared.start, |index| self.frames[index].start);
        let size = self.reduce_pos.saturating_sub(start);
        if size >= parser.recovery().min_big_reduction
            && !parser.node_set().get(ty as u16).is_some_and(|ty| ty.is_anonymous())
        {
            shared.big_reductions.record(start, size);
        }

        let buffer_base = base.checked_sub(1).map_or(0, |index| self.frames[index].buffer);
        let count = self.buffer_end() - buffer_base;
        if ty < parser.min_repeat_term() || action & action::REPEAT_FLAG != 0 {
            let skipped = parser.state_flag(self.state, state_flag::SKIPPED);
            let end = if skipped { self.pos } else { self.reduce_pos };
            self.store_node(ty, start, end, count as i32 + 1, true);
        }
        self.state = if stay {
            self.frames.get(base).map_or(self.state, |frame| frame.state)
        } else {
            let base_state = base.checked_sub(1).map_or(0, |index| self.frames[index].state);
            parser.goto_loose(base_state, ty)
        };
        self.frames.truncate(base);
        self.reduce_context(ty, start, parser, shared);
    }

    /// Appends a node record. With `must_sink`, the record is placed before any trailing
    /// skipped nodes that end after it.
    pub(crate) fn store_node(
        &mut self,
        term: u32,
        start: u32,
        end: u32,
        size: i32,
        must_sink: bool,
    ) {
        if term == ERR && self.frames.last().is_none_or(|frame| frame.buffer < self.buffer_end()) {
            // Adjacent error nodes are merged, empty ones after an error dropped.
            let in_buffer = !self.buffer.is_empty() || self.parent.is_none();
            let last = match &self.parent {
                Some(parent) if !in_buffer => parent.records.last(),
                _ => self.buffer.last(),
            };
            if let Some(&last) = last
                && last.id == ERR
                && last.size > -1
            {
                if start == end {
                    return;
                }
                if last.end >= start {
                    let records = match &mut self.parent {
                        Some(parent) if !in_buffer => &mut Arc::make_mut(parent).records,
                        _ => &mut self.buffer,
                    };
                    if let Some(last) = records.last_mut() {
                        last.end = end;
                    }
                    return;
                }
            }
        }

        if !must_sink || self.pos == end {
            self.buffer.push(BuildRecord::node(term, start, end, size));
            return;
        }
        let mut size = size;
        let mut index = self.buffer.len();
        if index > 0 && self.buffer[index - 1].id != ERR {
            let must_move =
                self.buffer.iter().rev().take_while(|r| r.end > end).any(|r| r.size >= 0);
            if must_move {
                while index > 0 && self.buffer[index - 1].end > end {
                    index -= 1;
                    if size > 1 {
                        size -= 1;
                    }
                }
            }
        }
        self.buffer.insert(index, BuildRecord::node(term, start, end, size));
    }

    pub(crate) fn shift(
        &mut self,
        action: u32,
        ty: u32,
        start: u32,
        end: u32,
        parser: &LrParser,
        shared: &mut Shared<'_>,
    ) {
        if action & action::GOTO_FLAG != 0 {
            self.push_state(action & action::VALUE_MASK, self.pos);
        } else if action & action::STAY_FLAG == 0 {
            let next_state = action;
            if end > self.pos || ty <= parser.max_node() {
                self.pos = end;
                if !parser.state_flag(next_state, state_flag::SKIPPED) {
                    self.reduce_pos = end;
                }
            }
            self.push_state(next_state, start);
            self.shift_context(ty, start, parser, shared);
            if ty <= parser.max_node() {
                self.buffer.push(BuildRecord::node(ty, start, end, 1));
            }
        } else {
            // A skipped token, shifted without a state change.
            self.pos = end;
            self.shift_context(ty, start, parser, shared);
            if ty <= parser.max_node() {
                self.buffer.push(BuildRecord::node(ty, start, end, 1));
            }
        }
    }

    pub(crate) fn apply(
        &mut self,
        action: u32,
        next: u32,
        next_start: u32,
        next_end: u32,
        parser: &LrParser,
        shared: &mut Shared<'_>,
    ) {
        if action & action::REDUCE_FLAG != 0 {
            self.reduce(action, parser, shared);
        } else {
            self.shift(action, next, next_start, next_end, parser, shared);
        }
    }

    /// Shifts a whole node from an earlier tree, moving to state `next`.
    pub(crate) fn use_node(
        &mut self,
        value: &Tree,
        next: u32,
        parser: &LrParser,
        shared: &mut Shared<'_>,
    ) {
        if !shared.reused.last().is_some_and(|last| last.ptr_eq(value)) {
            shared.reused.push(value.clone());
        }
        let index = shared.reused.len() as u32 - 1;
        let start = self.pos;
        self.pos = start + value.len();
        self.reduce_pos = self.pos;
        self.push_state(next, start);
        self.buffer.push(BuildRecord::reuse(index, start, self.reduce_pos));
        if let Some(cx) = self.context
            && let Some(tracker) = parser.context_tracker()
        {
            let input = shared.stream.reset(start, None);
            let context = tracker.reuse(cx.context, value, StackRef::new(self, parser), input);
            self.update_context(context, tracker);
        }
    }

    /// Splits off a copy of this stack. Records that can no longer change are frozen first
    /// so both stacks share them.
    pub(crate) fn split(&mut self) -> Self {
        let off = self.buffer.iter().rposition(|r| r.end <= self.reduce_pos).map_or(0, |i| i + 1);
        if off > 0 {
            let records = self.buffer.drain(..off).collect();
            self.parent = Some(Arc::new(BufferChunk { records, parent: self.parent.take() }));
            self.buffer_base += off;
        }
        Self {
            frames: self.frames.clone(),
            state: self.state,
            reduce_pos: self.reduce_pos,
            pos: self.pos,
            score: self.score,
            buffer: self.buffer.clone(),
            buffer_base: self.buffer_base,
            context: self.context,
            look_ahead: self.look_ahead,
            parent: self.parent.clone(),
        }
    }

    /// Skips the next token, wrapping it in an error node.
    pub(crate) fn recover_by_delete(&mut self, next: u32, next_end: u32, parser: &LrParser) {
        let is_node = next <= parser.max_node();
        if is_node {
            self.store_node(next, self.pos, next_end, 1, false);
        }
        self.store_node(ERR, self.pos, next_end, if is_node { 2 } else { 1 }, false);
        self.pos = next_end;
        self.reduce_pos = next_end;
        self.score -= parser.recovery().delete;
    }

    /// Whether `term` could be shifted after doing the reductions the stack allows.
    pub(crate) fn can_shift(&self, term: u32, parser: &LrParser) -> bool {
        let mut sim = SimulatedStack::new(self);
        loop {
            let action = match parser.state_slot(sim.state, parse_state::DEFAULT_REDUCE) {
                0 => parser.has_action(sim.state, term),
                action => action,
            };
            if action == 0 {
                return false;
            }
            if action & action::REDUCE_FLAG == 0 {
                return true;
            }
            sim.reduce(action, parser);
        }
    }

    /// Stacks that pretend a token was present before `next`, one per state the current one
    /// could move to.
    pub(crate) fn recover_by_insert(
        &mut self,
        next: u32,
        parser: &LrParser,
        shared: &mut Shared<'_>,
    ) -> Vec<Self> {
        if self.frames.len() >= MAX_INSERT_STACK_DEPTH {
            return Vec::new();
        }
        let recovery = parser.recovery();
        let mut next_states = parser.next_states(self.state);
        if next_states.len() > recovery.max_next || self.frames.len() >= DAMPEN_INSERT_STACK_DEPTH {
            let mut best: Vec<_> = next_states
                .iter()
                .copied()
                .filter(|&(_, state)| state != self.state && parser.has_action(state, next) != 0)
                .collect();
            if self.frames.len() < DAMPEN_INSERT_STACK_DEPTH {
                for &(term, state) in &next_states {
                    if best.len() >= recovery.max_next {
                        break;
                    }
                    if !best.iter().any(|&(_, other)| other == state) {
                        best.push((term, state));
                    }
                }
            }
            next_states = best;
        }

        let mut result = Vec::new();
        for (term, state) in next_states {
            if result.len() >= recovery.max_next {
                break;
            }
            if state == self.state {
                continue;
            }
            let mut stack = self.split();
            stack.push_state(state, self.pos);
            stack.store_node(ERR, stack.pos, stack.pos, 1, true);
            stack.shift_context(term.into(), self.pos, parser, shared);
            stack.reduce_pos = self.pos;
            stack.score -= recovery.insert;
            result.push(stack);
        }
        result
    }

    /// Does the state's forced reduction, marking an error when the table didn't expect
    /// it. Returns false when no reduction is possible.
    pub(crate) fn force_reduce(&mut self, parser: &LrParser, shared: &mut Shared<'_>) -> bool {
        let mut reduce = parser.state_slot(self.state, parse_state::FORCED_REDUCE);
        if reduce & action::REDUCE_FLAG == 0 {
            return false;
        }
        if !parser.valid_action(self.state, reduce) {
            let depth = (reduce >> action::REDUCE_DEPTH_SHIFT) as usize;
            let term = reduce & action::VALUE_MASK;
            let fits = self
                .frames
                .len()
                .checked_sub(depth)
                .is_some_and(|target| parser.goto(self.frames[target].state, term).is_some());
            if !fits {
                let Some(backup) = self.find_forced_reduction(parser) else { return false };
                reduce = backup;
            }
            self.store_node(ERR, self.pos, self.pos, 1, true);
            self.score -= parser.recovery().reduce;
        }
        self.reduce_pos = self.pos;
        self.reduce(reduce, parser, shared);
        true
    }

    /// Looks through the states reachable by shifting for a reduction that fits the
    /// current stack.
    fn find_forced_reduction(&self, parser: &LrParser) -> Option<u32> {
        let mut seen = Vec::new();
        self.explore_reductions(parser, self.state, 0, &mut seen)
    }

    fn explore_reductions(
        &self,
        parser: &LrParser,
        state: u32,
        depth: usize,
        seen: &mut Vec<u32>,
    ) -> Option<u32> {
        if seen.contains(&state) {
            return None;
        }
        seen.push(state);
        for action in parser.all_actions(state) {
            if action & (action::STAY_FLAG | action::GOTO_FLAG) != 0 {
                continue;
            }
            if action & action::REDUCE_FLAG != 0 {
                let reduce_depth =
                    ((action >> action::REDUCE_DEPTH_SHIFT) as usize).saturating_sub(depth);
                if reduce_depth > 1 {
                    let term = action & action::VALUE_MASK;
                    if let Some(target) = self.frames.len().checked_sub(reduce_depth)
                        && parser.goto(self.frames[target].state, term).is_some()
                    {
                        return Some(
                            ((reduce_depth as u32) << action::REDUCE_DEPTH_SHIFT)
                                | action::REDUCE_FLAG
                                | term,
                        );
                    }
                }
            } else if let Some(found) = self.explore_reductions(parser, action, depth + 1, seen) {
                return Some(found);
            }
        }
        None
    }

    /// Reduces until the stack is in an accepting state.
    pub(crate) fn force_all(&mut self, parser: &LrParser, shared: &mut Shared<'_>) {
        while !parser.state_flag(self.state, state_flag::ACCEPTING) {
            if !self.force_reduce(parser, shared) {
                self.store_node(ERR, self.pos, self.pos, 1, true);
                break;
            }
        }
    }

    /// A stack at the top level in a state with no actions left.
    pub(crate) fn dead_end(&self, parser: &LrParser) -> bool {
        if self.frames.len() != 1 {
            return false;
        }
        let actions = parser.state_slot(self.state, parse_state::ACTIONS) as usize;
        parser.state_data()[actions] == seq::END
            && parser.state_slot(self.state, parse_state::DEFAULT_REDUCE) == 0
    }

    /// Drops everything back to the start state, keeping the records produced so far.
    pub(crate) fn restart(&mut self) {
        self.store_node(ERR, self.pos, self.pos, 1, true);
        if let Some(first) = self.frames.first() {
            self.state = first.state;
        }
        self.frames.clear();
    }

    pub(crate) fn same_state(&self, other: &Self) -> bool {
        self.state == other.state
            && self.frames.len() == other.frames.len()
            && self.frames.iter().zip(&other.frames).all(|(a, b)| a.state == b.state)
    }

    fn shift_context(&mut self, term: u32, start: u32, parser: &LrParser, shared: &mut Shared<'_>) {
        if let Some(cx) = self.context
            && let Some(tracker) = parser.context_tracker()
        {
            let input = shared.stream.reset(start, None);
            let stack = StackRef::new(self, parser);
            let context = tracker.shift(cx.context, term as u16, stack, input);
            self.update_context(context, tracker);
        }
    }

    fn reduce_context(
        &mut self,
        term: u32,
        start: u32,
        parser: &LrParser,
        shared: &mut Shared<'_>,
    ) {
        if let Some(cx) = self.context
            && let Some(tracker) = parser.context_tracker()
        {
            let input = shared.stream.reset(start, None);
            let stack = StackRef::new(self, parser);
            let context = tracker.reduce(cx.context, term as u16, stack, input);
            self.update_context(context, tracker);
        }
    }

    fn emit_context(&mut self) {
        let Some(cx) = self.context else { return };
        if !self.buffer.last().is_some_and(BuildRecord::is_context_change) {
            self.buffer.push(BuildRecord::context_change(cx.hash, self.pos));
        }
    }

    fn emit_look_ahead(&mut self) {
        if !self.buffer.last().is_some_and(BuildRecord::is_look_ahead) {
            self.buffer.push(BuildRecord::look_ahead(self.look_ahead, self.pos));
        }
    }

    fn update_context(&mut self, context: u32, tracker: &dyn ContextTracker) {
        let Some(current) = self.context else { return };
        if context != current.context {
            let hash = tracker.hash(context);
            if hash != current.hash {
                self.emit_context();
            }
            self.context = Some(StackContext { context, hash });
        }
    }

    pub(crate) fn set_look_ahead(&mut self, look_ahead: u32) {
        if look_ahead > self.look_ahead {
            self.emit_look_ahead();
            self.look_ahead = look_ahead;
        }
    }

    /// Writes the trailing context and look-ahead records before the stack becomes a tree.
    pub(crate) fn close(&mut self, parser: &LrParser) {
        if self.context.is_some() && parser.context_tracker().is_some_and(|t| t.strict()) {
            self.emit_context();
        }
        if self.look_ahead > 0 {
            self.emit_look_ahead();
        }
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            write!(f, "{},", frame.state)?;
        }
        write!(f, "{}@{}", self.state, self.pos)?;
        if self.score != 0 {
            write!(f, "!{}", self.score)?;
        }
        Ok(())
    }
}

/// Tracks the states of a stack through reductions without touching the stack itself.
struct SimulatedStack<'s> {
    start: &'s Stack,
    /// Copied from the stack on the first reduction that pushes.
    states: Option<Vec<u32>>,
    state: u32,
    base: usize,
}

impl<'s> SimulatedStack<'s> {
    fn new(start: &'s Stack) -> Self {
        Self { start, states: None, state: start.state, base: start.frames.len() }
    }

    fn state_at(&self, index: usize) -> u32 {
        match &self.states {
            Some(states) => states[index],
            None => self.start.frames[index].state,
        }
    }

    fn reduce(&mut self, action: u32, parser: &LrParser) {
        let term = action & action::VALUE_MASK;
        let depth = (action >> action::REDUCE_DEPTH_SHIFT) as usize;
        if depth == 0 {
            let frames = &self.start.frames;
            let states =
                self.states.get_or_insert_with(|| frames.iter().map(|frame| frame.state).collect());
            states.truncate(self.base);
            states.push(self.state);
            self.base += 1;
        } else {
            self.base = self.base.saturating_sub(depth - 1);
        }
        let below = self.base.checked_sub(1).map_or(0, |index| self.state_at(index));
        self.state = parser.goto_loose(below, term);
    }
}

/// What tokenizers and context trackers get to see of a stack.
#[derive(Clone, Copy)]
pub struct StackRef<'s> {
    stack: &'s Stack,
    parser: &'s LrParser,
}

impl<'s> StackRef<'s> {
    pub(crate) fn new(stack: &'s Stack, parser: &'s LrParser) -> Self {
        Self { stack, parser }
    }

    #[inline]
    pub fn parser(&self) -> &'s LrParser {
        self.parser
    }

    #[inline]
    pub fn state(&self) -> u32 {
        self.stack.state
    }

    #[inline]
    pub fn pos(&self) -> u32 {
        self.stack.pos
    }

    /// The stack's context, when the parser has a context tracker.
    #[inline]
    pub fn context(&self) -> Option<u32> {
        self.stack.context()
    }

    pub fn can_shift(&self, term: u16) -> bool {
        self.stack.can_shift(term.into(), self.parser)
    }

    pub fn dialect_enabled(&self, dialect: usize) -> bool {
        self.parser.dialect().enabled(dialect)
    }
}

/// Reads a stack's records backwards, moving into frozen chunks as it goes.
#[derive(Clone)]
pub(crate) struct StackBufferCursor<'s> {
    records: &'s [BuildRecord],
    parent: Option<&'s BufferChunk>,
    index: usize,
    pos: usize,
}

impl<'s> StackBufferCursor<'s> {
    pub(crate) fn new(stack: &'s Stack) -> Self {
        let mut cursor = Self {
            records: &stack.buffer,
            parent: stack.parent.as_deref(),
            index: stack.buffer.len(),
            pos: stack.buffer_end(),
        };
        cursor.enter_parent();
        cursor
    }

    fn enter_parent(&mut self) {
        while self.index == 0
            && let Some(chunk) = self.parent
        {
            self.records = &chunk.records;
            self.index = chunk.records.len();
            self.parent = chunk.parent.as_deref();
        }
    }
}

impl BufferCursor for StackBufferCursor<'_> {
    #[inline]
    fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    fn record(&self) -> BuildRecord {
        self.records[self.index - 1]
    }

    fn next(&mut self) {
        self.index -= 1;
        self.pos -= 1;
        self.enter_parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(stack: &Stack) -> Vec<(u32, u32, u32, i32)> {
        let mut cursor = StackBufferCursor::new(stack);
        let mut records = Vec::new();
        while cursor.pos() > 0 {
            let r = cursor.record();
            records.push((r.id, r.start, r.end, r.size));
            cursor.next();
        }
        records.reverse();
        records
    }

    #[test]
    fn split_shares_settled_records() {
        let mut stack = Stack::new(1, 0, None);
        stack.buffer.push(BuildRecord::node(2, 0, 1, 1));
        stack.buffer.push(BuildRecord::node(3, 1, 2, 1));
        stack.reduce_pos = 1;
        stack.pos = 2;

        let mut other = stack.split();
        assert_eq!(stack.buffer_base, 1);
        assert_eq!(stack.buffer.len(), 1);
        other.buffer.push(BuildRecord::node(4, 2, 3, 1));

        assert_eq!(collect(&stack), [(2, 0, 1, 1), (3, 1, 2, 1)]);
        assert_eq!(collect(&other), [(2, 0, 1, 1), (3, 1, 2, 1), (4, 2, 3, 1)]);
        assert_eq!(other.buffer_end(), 3);
    }

    #[test]
    fn adjacent_errors_merge() {
        let mut stack = Stack::new(1, 0, None);
        stack.store_node(ERR, 0, 2, 1, false);
        stack.store_node(ERR, 2, 4, 1, false);
        stack.store_node(ERR, 4, 4, 1, false);
        assert_eq!(stack.buffer, [BuildRecord::node(ERR, 0, 4, 1)]);

        // Merging into a frozen chunk leaves the other stack's copy alone.
        stack.reduce_pos = 4;
        let other = stack.split();
        stack.store_node(ERR, 4, 6, 1, false);
        assert_eq!(collect(&stack), [(ERR, 0, 6, 1)]);
        assert_eq!(collect(&other), [(ERR, 0, 4, 1)]);
    }

    #[test]
    fn sinking_moves_past_skipped_nodes() {
        let mut stack = Stack::new(1, 0, None);
        stack.buffer.push(BuildRecord::node(2, 0, 1, 1));
        stack.buffer.push(BuildRecord::node(8, 1, 2, 1));
        stack.pos = 2;
        stack.store_node(5, 0, 1, 3, true);
        assert_eq!(
            stack.buffer,
            [
                BuildRecord::node(2, 0, 1, 1),
                BuildRecord::node(5, 0, 1, 2),
                BuildRecord::node(8, 1, 2, 1),
            ]
        );
    }

    #[test]
    fn display() {
        let mut stack = Stack::new(0, 0, None);
        stack.push_state(4, 0);
        stack.pos = 3;
        stack.score = -200;
        assert_eq!(stack.to_string(), "0,4@3!-200");
    }
}
