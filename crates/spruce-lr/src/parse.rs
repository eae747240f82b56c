//! Driving a set of stacks over the input, one step at a time.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::mem;

use spruce_tree::props;
use spruce_tree::{
    BuildData, Error, Input, IterMode, PartialParse, TextRange, Tree, TreeChild, TreeFragment,
};
use tracing::{debug, trace};

use crate::parser::{LrParser, Recovery};
use crate::stack::{Stack, StackBufferCursor, StackRef};
use crate::table::{pair, parse_state, seq, state_flag, term};
use crate::token::{CachedToken, InputStream, Tokenizer, TokenizerFlags};

const ERR: u32 = term::ERR as u32;
/// Tokens that looked further than this past their end record the distance on their node.
const LOOK_AHEAD_MARGIN: u32 = 25;
/// Reuse near the open side of a fragment has to stay this far from the cut.
const CUT_MARGIN: i64 = 25;

/// State shared by all stacks of one parse.
pub(crate) struct Shared<'a> {
    pub(crate) stream: InputStream<'a>,
    /// Trees reused from fragments, referred to by index from the stack buffers.
    pub(crate) reused: Vec<Tree>,
    /// Start of the first parsed range.
    pub(crate) start: u32,
    pub(crate) big_reductions: BigReductions,
}

/// Tracks repeated large reductions starting at the same position, the sign of a deeply
/// left-associative construct the stack depth check doesn't catch.
#[derive(Debug, Default)]
pub(crate) struct BigReductions {
    start: Option<u32>,
    size: u32,
    count: u32,
}

impl BigReductions {
    pub(crate) fn record(&mut self, start: u32, size: u32) {
        if self.start == Some(start) {
            self.count += 1;
            self.size = size;
        } else if self.size < size {
            self.count = 1;
            self.start = Some(start);
            self.size = size;
        }
    }

    fn reset(&mut self) {
        self.count = 0;
        self.size = 0;
    }
}

/// The tokens each tokenizer last produced, and the actions they lead to for the current
/// stack.
struct TokenCache {
    tokens: Vec<CachedToken>,
    main_token: Option<CachedToken>,
    /// `(action, term, end)` triples.
    actions: Vec<(u32, u32, u32)>,
}

impl TokenCache {
    fn new(parser: &LrParser) -> Self {
        Self {
            tokens: vec![CachedToken::NONE; parser.tokenizers().len()],
            main_token: None,
            actions: Vec::new(),
        }
    }

    fn get_actions(&mut self, stack: &mut Stack, parser: &LrParser, shared: &mut Shared<'_>) {
        self.actions.clear();
        let mut main = None;
        let mask = parser.state_slot(stack.state, parse_state::TOKENIZER_MASK);
        let context = stack.context_hash();
        let mut look_ahead = 0;

        for (index, tokenizer) in parser.tokenizers().iter().enumerate() {
            if index >= 32 || (1 << index) & mask == 0 {
                continue;
            }
            let flags = tokenizer.flags();
            if main.is_some() && !flags.contains(TokenizerFlags::FALLBACK) {
                continue;
            }
            let mut token = self.tokens[index];
            if flags.contains(TokenizerFlags::CONTEXTUAL)
                || token.start != stack.pos
                || token.mask != mask
                || token.context != context
            {
                token = update_cached_token(token, tokenizer.as_ref(), stack, parser, shared);
                token.mask = mask;
                token.context = context;
                self.tokens[index] = token;
            }
            if token.look_ahead > token.end + LOOK_AHEAD_MARGIN {
                look_ahead = look_ahead.max(token.look_ahead);
            }

            if token.value != ERR as i32 {
                let before = self.actions.len();
                if let Ok(extended) = u32::try_from(token.extended) {
                    self.add_actions(stack.state, extended, token.end, parser);
                }
                self.add_actions(stack.state, token.value as u32, token.end, parser);
                if !flags.contains(TokenizerFlags::EXTEND) {
                    main = Some(token);
                    if self.actions.len() > before {
                        break;
                    }
                }
            }
        }

        if look_ahead > 0 {
            stack.set_look_ahead(look_ahead);
        }
        if main.is_none() && stack.pos == shared.stream.end() {
            let eof = CachedToken {
                start: stack.pos,
                end: stack.pos,
                value: parser.eof_term() as i32,
                ..CachedToken::NONE
            };
            self.add_actions(stack.state, parser.eof_term(), stack.pos, parser);
            main = Some(eof);
        }
        self.main_token = main;
    }

    /// The token that made the stack fail, for recovery to work with.
    fn get_main_token(&self, stack: &Stack, parser: &LrParser, shared: &Shared<'_>) -> CachedToken {
        if let Some(main) = self.main_token {
            return main;
        }
        let at_end = stack.pos == shared.stream.end();
        CachedToken {
            start: stack.pos,
            end: shared.stream.char_end(stack.pos),
            value: if at_end { parser.eof_term() as i32 } else { ERR as i32 },
            ..CachedToken::NONE
        }
    }

    fn add_actions(&mut self, state: u32, token: u32, end: u32, parser: &LrParser) {
        let data = parser.state_data();
        for slot in [parse_state::ACTIONS, parse_state::SKIP] {
            let mut i = parser.state_slot(state, slot) as usize;
            loop {
                if data[i] == seq::END {
                    if data[i + 1] == seq::NEXT {
                        i = pair(data, i + 2) as usize;
                    } else {
                        if self.actions.is_empty() && data[i + 1] == seq::OTHER {
                            self.put_action(pair(data, i + 2), token, end);
                        }
                        break;
                    }
                }
                if u32::from(data[i]) == token {
                    self.put_action(pair(data, i + 1), token, end);
                }
                i += 3;
            }
        }
    }

    fn put_action(&mut self, action: u32, token: u32, end: u32) {
        if !self.actions.iter().any(|&(other, _, _)| other == action) {
            self.actions.push((action, token, end));
        }
    }
}

fn update_cached_token(
    token: CachedToken,
    tokenizer: &dyn Tokenizer,
    stack: &Stack,
    parser: &LrParser,
    shared: &mut Shared<'_>,
) -> CachedToken {
    let stream = &mut shared.stream;
    let start = stream.clip_pos(stack.pos);
    stream.reset(start, Some(token));
    tokenizer.token(stream, StackRef::new(stack, parser));
    let mut token = stream.token;
    if token.value > -1 {
        let text = stream.read(token.start, token.end);
        let stack = StackRef::new(stack, parser);
        if let Some((specialized, extend)) = parser.specialize(token.value as u16, &text, stack) {
            if extend {
                token.extended = specialized.into();
            } else {
                token.value = specialized.into();
            }
        }
    } else {
        token.value = ERR as i32;
        token.end = stream.char_end(start);
    }
    token
}

/// Walks the trees of old fragments in document order, handing out nodes that can be
/// reused at a given position.
struct FragmentCursor {
    fragments: Vec<TreeFragment>,
    next_index: usize,
    fragment: Option<usize>,
    safe_from: i64,
    safe_to: i64,
    trees: Vec<Tree>,
    starts: Vec<i64>,
    indices: Vec<usize>,
    next_start: i64,
}

impl FragmentCursor {
    fn new(fragments: Vec<TreeFragment>) -> Self {
        let mut cursor = Self {
            fragments,
            next_index: 0,
            fragment: None,
            safe_from: -1,
            safe_to: -1,
            trees: Vec::new(),
            starts: Vec::new(),
            indices: Vec::new(),
            next_start: 0,
        };
        cursor.next_fragment();
        cursor
    }

    fn next_fragment(&mut self) {
        self.trees.clear();
        self.starts.clear();
        self.indices.clear();
        let Some(fragment) = self.fragments.get(self.next_index) else {
            self.fragment = None;
            self.next_start = i64::MAX;
            return;
        };
        self.fragment = Some(self.next_index);
        self.next_index += 1;
        let (from, to) = (i64::from(fragment.from), i64::from(fragment.to));
        self.safe_from = match fragment.open_start {
            true => cut_at(&fragment.tree, from + fragment.offset, 1) - fragment.offset,
            false => from,
        };
        self.safe_to = match fragment.open_end {
            true => cut_at(&fragment.tree, to + fragment.offset, -1) - fragment.offset,
            false => to,
        };
        self.trees.push(fragment.tree.clone());
        self.starts.push(-fragment.offset);
        self.indices.push(0);
        self.next_start = self.safe_from;
    }

    /// A node starting at `pos` that can be reused. Positions must not decrease between
    /// calls.
    fn node_at(&mut self, pos: u32) -> Option<Tree> {
        let pos = i64::from(pos);
        if pos < self.next_start {
            return None;
        }
        while self.fragment.is_some() && self.safe_to <= pos {
            self.next_fragment();
        }
        let fragment_to = i64::from(self.fragments[self.fragment?].to);

        loop {
            let Some(last) = self.trees.len().checked_sub(1) else {
                self.next_fragment();
                return None;
            };
            let top = &self.trees[last];
            let index = self.indices[last];
            if index == top.children().len() {
                self.trees.pop();
                self.starts.pop();
                self.indices.pop();
                continue;
            }
            let start = self.starts[last] + i64::from(top.positions()[index]);
            if start > pos {
                self.next_start = start;
                return None;
            }
            match top.children()[index].clone() {
                TreeChild::Tree(next) => {
                    let end = start + i64::from(next.len());
                    if start == pos {
                        if start < self.safe_from {
                            return None;
                        }
                        if end <= self.safe_to {
                            let look_ahead = next.prop(props::look_ahead()).copied().unwrap_or(0);
                            if look_ahead == 0 || end + i64::from(look_ahead) < fragment_to {
                                return Some(next);
                            }
                        }
                    }
                    self.indices[last] += 1;
                    if end >= self.safe_from.max(pos) {
                        self.trees.push(next);
                        self.starts.push(start);
                        self.indices.push(0);
                    }
                }
                TreeChild::Buffer(buffer) => {
                    self.indices[last] += 1;
                    self.next_start = start + i64::from(buffer.len());
                }
            }
        }
    }
}

/// The nearest position next to `pos` on `side` that is safely outside any node touching
/// `pos`.
fn cut_at(tree: &Tree, pos: i64, side: i8) -> i64 {
    let length = i64::from(tree.len());
    let target = pos.clamp(0, length) as u32;
    let mut cursor = tree.cursor_with(IterMode::INCLUDE_ANONYMOUS);
    cursor.move_to(target, 0);
    loop {
        let entered =
            if side < 0 { cursor.child_before(target) } else { cursor.child_after(target) };
        if entered {
            continue;
        }
        loop {
            let (from, to) = (i64::from(cursor.from()), i64::from(cursor.to()));
            let clear = if side < 0 { to < pos } else { from > pos };
            if clear && !cursor.node_type().is_error() {
                return if side < 0 {
                    (to - 1).min(pos - CUT_MARGIN).max(0)
                } else {
                    (from + 1).max(pos + CUT_MARGIN).min(length)
                };
            }
            let moved = if side < 0 { cursor.prev_sibling() } else { cursor.next_sibling() };
            if moved {
                break;
            }
            if !cursor.parent() {
                return if side < 0 { 0 } else { length };
            }
        }
    }
}

/// Stacks created by splitting: those that moved past the current position, and those that
/// still have to be advanced in this step.
type SplitTargets<'s> = (&'s mut Vec<Stack>, &'s mut VecDeque<Stack>);

/// An LR parse in progress.
pub(crate) struct Parse<'a> {
    parser: LrParser,
    shared: Shared<'a>,
    tokens: TokenCache,
    stacks: Vec<Stack>,
    /// Steps left before recovery ends, zero when not recovering.
    recovering: u32,
    fragments: Option<FragmentCursor>,
    min_stack_pos: u32,
    stopped_at: Option<u32>,
    top_term: u16,
}

impl<'a> Parse<'a> {
    pub(crate) fn new(
        parser: LrParser,
        input: &'a dyn Input,
        fragments: &[TreeFragment],
        ranges: &[TextRange],
    ) -> Self {
        let stream = InputStream::new(input, ranges);
        let start = ranges.first().map_or(0, |range| range.start().into());
        let (top_state, top_term) = parser.top();
        let stacks = vec![Stack::start(&parser, top_state, start)];
        let worth_reusing =
            u64::from(stream.end() - start) > u64::from(parser.buffer_length()) * 4;
        let fragments = (!fragments.is_empty() && worth_reusing)
            .then(|| FragmentCursor::new(fragments.to_vec()));
        Self {
            tokens: TokenCache::new(&parser),
            shared: Shared {
                stream,
                reused: Vec::new(),
                start,
                big_reductions: BigReductions::default(),
            },
            parser,
            stacks,
            recovering: 0,
            fragments,
            min_stack_pos: start,
            stopped_at: None,
            top_term,
        }
    }

    /// Moves a stack forward by one action, or by reusing a node. Actions after the first
    /// go to split-off copies. Returns false when the stack can't continue.
    fn advance_stack(&mut self, stack: &mut Stack, mut split: Option<SplitTargets<'_>>) -> bool {
        let start = stack.pos;
        let recovery = *self.parser.recovery();

        if self.stopped_at.is_some_and(|at| start > at) {
            return stack.force_reduce(&self.parser, &mut self.shared);
        }

        if let Some(fragments) = &mut self.fragments {
            let strict_hash = (stack.has_context()
                && self.parser.context_tracker().is_some_and(|tracker| tracker.strict()))
            .then(|| stack.context_hash());
            let mut cached = fragments.node_at(start);
            while let Some(node) = cached {
                let id = node.node_type().id();
                let same_type = self.parser.node_set().get(id) == Some(node.node_type());
                let goto = if same_type { self.parser.goto(stack.state, id.into()) } else { None };
                if let Some(next) = goto
                    && !node.is_empty()
                    && strict_hash.is_none_or(|hash| {
                        node.prop(props::context_hash()).copied().unwrap_or(0) == hash
                    })
                {
                    trace!("{stack} (via reuse of {})", self.parser.get_name(id));
                    stack.use_node(&node, next, &self.parser, &mut self.shared);
                    return true;
                }
                cached = match (node.children().first(), node.positions().first()) {
                    (Some(TreeChild::Tree(inner)), Some(0)) => Some(inner.clone()),
                    _ => None,
                };
            }
        }

        let default_reduce = self.parser.state_slot(stack.state, parse_state::DEFAULT_REDUCE);
        if default_reduce > 0 {
            stack.reduce(default_reduce, &self.parser, &mut self.shared);
            trace!("{stack} (via always-reduce)");
            return true;
        }

        if stack.frames.len() >= recovery.cut_depth {
            while stack.frames.len() > recovery.cut_to
                && stack.force_reduce(&self.parser, &mut self.shared)
            {}
        }

        self.tokens.get_actions(stack, &self.parser, &mut self.shared);
        let actions = mem::take(&mut self.tokens.actions);
        let main_start = self.tokens.main_token.map(|token| token.start);
        let mut advanced = false;
        for (index, &(action, term, end)) in actions.iter().enumerate() {
            if index + 1 == actions.len() || split.is_none() {
                let next_start = main_start.unwrap_or(stack.pos);
                stack.apply(action, term, next_start, end, &self.parser, &mut self.shared);
                trace!(
                    "{stack} (via {} for {})",
                    describe(action),
                    self.parser.get_name(term as u16)
                );
                advanced = true;
                break;
            }
            let mut local = stack.split();
            let next_start = main_start.unwrap_or(local.pos);
            local.apply(action, term, next_start, end, &self.parser, &mut self.shared);
            trace!(
                "{local} (via split {} for {})",
                describe(action),
                self.parser.get_name(term as u16)
            );
            if let Some((stacks, queue)) = &mut split {
                if local.pos > start {
                    stacks.push(local);
                } else {
                    queue.push_back(local);
                }
            }
        }
        self.tokens.actions = actions;
        advanced
    }

    /// Advances `stack` until it moves past its current position. Hands the stack back
    /// when it gets stuck.
    fn advance_fully(&mut self, mut stack: Stack, new_stacks: &mut Vec<Stack>) -> Option<Stack> {
        let pos = stack.pos;
        loop {
            if !self.advance_stack(&mut stack, None) {
                return Some(stack);
            }
            if stack.pos > pos {
                push_stack_dedup(stack, new_stacks);
                return None;
            }
        }
    }

    fn run_recovery(
        &mut self,
        stopped: Vec<(Stack, CachedToken)>,
        new_stacks: &mut Vec<Stack>,
    ) -> Option<Stack> {
        let recovery = *self.parser.recovery();
        let mut finished: Option<Stack> = None;
        let mut restarted = false;

        for (mut stack, token) in stopped {
            let mut token_term = u32::try_from(token.value).unwrap_or(ERR);
            let mut token_end = token.end;

            if stack.dead_end(&self.parser) {
                if restarted {
                    continue;
                }
                restarted = true;
                stack.restart();
                debug!("{stack} (restarted)");
                match self.advance_fully(stack, new_stacks) {
                    None => continue,
                    Some(back) => stack = back,
                }
            }

            let mut force = stack.split();
            for _ in 0..recovery.force_reduce_limit {
                if !force.force_reduce(&self.parser, &mut self.shared) {
                    break;
                }
                trace!("{force} (via force-reduce)");
                match self.advance_fully(force, new_stacks) {
                    None => break,
                    Some(back) => force = back,
                }
            }

            for insert in stack.recover_by_insert(token_term, &self.parser, &mut self.shared) {
                trace!("{insert} (via recover-insert)");
                self.advance_fully(insert, new_stacks);
            }

            if self.shared.stream.end() > stack.pos {
                if token_end == stack.pos {
                    token_end = self.shared.stream.char_end(stack.pos);
                    token_term = ERR;
                }
                stack.recover_by_delete(token_term, token_end, &self.parser);
                trace!("{stack} (via recover-delete {})", self.parser.get_name(token_term as u16));
                push_stack_dedup(stack, new_stacks);
            } else if finished.as_ref().is_none_or(|finished| finished.score < stack.score) {
                finished = Some(stack);
            }
        }
        finished
    }

    /// The best stack that reached the end, or the stop position, in an accepting state.
    fn find_finished(&self, stopped: &[(Stack, CachedToken)]) -> Option<usize> {
        let end = self.shared.stream.end();
        let mut best: Option<usize> = None;
        for (index, (stack, _)) in stopped.iter().enumerate() {
            let done = stack.pos == end || self.stopped_at.is_some_and(|at| stack.pos > at);
            if done
                && self.parser.state_flag(stack.state, state_flag::ACCEPTING)
                && best.is_none_or(|best| stopped[best].0.score < stack.score)
            {
                best = Some(index);
            }
        }
        best
    }

    fn stack_to_tree(&mut self, mut stack: Stack) -> Tree {
        stack.close(&self.parser);
        let mut data = BuildData::new(
            StackBufferCursor::new(&stack),
            self.parser.node_set().clone(),
            self.top_term,
        );
        data.start = self.shared.start;
        data.length = Some(stack.pos - self.shared.start);
        data.max_buffer_length = self.parser.buffer_length();
        data.reused = self.shared.reused.clone();
        data.min_repeat_type = self.parser.min_repeat_term();
        Tree::build(data)
    }
}

impl PartialParse for Parse<'_> {
    fn advance(&mut self) -> Result<Option<Tree>, Error> {
        let pos = self.min_stack_pos;
        let recovery = *self.parser.recovery();
        let mut queue: VecDeque<Stack> = mem::take(&mut self.stacks).into();
        let mut new_stacks = Vec::new();
        let mut stopped: Vec<(Stack, CachedToken)> = Vec::new();

        if self.shared.big_reductions.count > recovery.max_left_associative_reductions
            && queue.len() == 1
            && let Some(stack) = queue.front_mut()
        {
            let limit = self.shared.big_reductions.start;
            while stack.force_reduce(&self.parser, &mut self.shared)
                && stack
                    .frames
                    .last()
                    .is_some_and(|frame| limit.is_none_or(|limit| frame.start >= limit))
            {}
            self.shared.big_reductions.reset();
        }

        while let Some(mut stack) = queue.pop_front() {
            loop {
                self.tokens.main_token = None;
                if stack.pos > pos {
                    new_stacks.push(stack);
                } else if self.advance_stack(&mut stack, Some((&mut new_stacks, &mut queue))) {
                    continue;
                } else {
                    let token = self.tokens.get_main_token(&stack, &self.parser, &self.shared);
                    stopped.push((stack, token));
                }
                break;
            }
        }

        if new_stacks.is_empty() {
            if let Some(index) = self.find_finished(&stopped) {
                let (stack, _) = stopped.swap_remove(index);
                debug!("finish with {stack}");
                return Ok(Some(self.stack_to_tree(stack)));
            }
            if self.parser.is_strict() {
                debug!(pos, "stuck with a strict parser");
                return Err(Error::NoParse { pos });
            }
            if self.recovering == 0 {
                debug!(pos, "start recovery");
                self.recovering = recovery.distance;
            }
        }

        if self.recovering > 0 && !stopped.is_empty() {
            let finished = if self.stopped_at.is_some_and(|at| stopped[0].0.pos > at) {
                Some(stopped.swap_remove(0).0)
            } else {
                self.run_recovery(stopped, &mut new_stacks)
            };
            if let Some(mut finished) = finished {
                finished.force_all(&self.parser, &mut self.shared);
                debug!("force-finish {finished}");
                return Ok(Some(self.stack_to_tree(finished)));
            }
        }

        if self.recovering > 0 {
            let max_remaining = match self.recovering {
                1 => 1,
                steps => steps as usize * recovery.max_remaining_per_step,
            };
            if new_stacks.len() > max_remaining {
                new_stacks.sort_by(|a, b| b.score.cmp(&a.score));
                new_stacks.truncate(max_remaining);
            }
            if new_stacks.iter().any(|stack| stack.reduce_pos > pos) {
                self.recovering -= 1;
            }
        } else if new_stacks.len() > 1 {
            prune(&mut new_stacks, &recovery);
        }

        self.min_stack_pos = new_stacks.iter().map(|stack| stack.pos).min().unwrap_or(pos);
        self.stacks = new_stacks;
        Ok(None)
    }

    fn parsed_pos(&self) -> u32 {
        self.min_stack_pos
    }

    fn stop_at(&mut self, pos: u32) -> Result<(), Error> {
        if let Some(current) = self.stopped_at
            && current < pos
        {
            return Err(Error::StopAtForward { current, requested: pos });
        }
        self.stopped_at = Some(pos);
        Ok(())
    }

    fn stopped_at(&self) -> Option<u32> {
        self.stopped_at
    }
}

/// Drops stacks in the same state as a better one, and stacks that have both been running
/// for a while without being told apart.
fn prune(stacks: &mut Vec<Stack>, recovery: &Recovery) {
    let limit = recovery.min_buffer_length_prune;
    let mut i = 0;
    'outer: while i + 1 < stacks.len() {
        let mut j = i + 1;
        while j < stacks.len() {
            let (stack, other) = (&stacks[i], &stacks[j]);
            if stack.same_state(other) || stack.buffer_end() > limit && other.buffer_end() > limit {
                let order = stack
                    .score
                    .cmp(&other.score)
                    .then(stack.buffer_end().cmp(&other.buffer_end()));
                if order == Ordering::Greater {
                    stacks.remove(j);
                    continue;
                }
                debug!("prune {stack}");
                stacks.remove(i);
                continue 'outer;
            }
            j += 1;
        }
        i += 1;
    }
    stacks.truncate(recovery.max_stack_count);
}

/// Adds a stack unless one in the same state at the same position exists, keeping the one
/// with the better score.
fn push_stack_dedup(stack: Stack, stacks: &mut Vec<Stack>) {
    for other in stacks.iter_mut() {
        if other.pos == stack.pos && other.same_state(&stack) {
            if other.score < stack.score {
                *other = stack;
            }
            return;
        }
    }
    stacks.push(stack);
}

fn describe(action: u32) -> String {
    use crate::table::action as flags;
    if action & flags::REDUCE_FLAG != 0 {
        format!("reduce of {}", action & flags::VALUE_MASK)
    } else {
        "shift".to_owned()
    }
}
