//! Reading tokens from the parsed ranges of a document.

use std::borrow::Cow;
use std::sync::Arc;

use bitflags::bitflags;
use spruce_tree::{Input, TextRange};

use crate::stack::StackRef;
use crate::table::seq;

/// The token most recently produced by a tokenizer, along with what it looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CachedToken {
    pub(crate) start: u32,
    /// Term id, or -1 when nothing was accepted.
    pub(crate) value: i32,
    pub(crate) end: u32,
    /// Extra term from an extending specializer, or -1.
    pub(crate) extended: i32,
    /// One past the furthest position the tokenizer read.
    pub(crate) look_ahead: u32,
    pub(crate) mask: u32,
    pub(crate) context: u32,
}

impl CachedToken {
    pub(crate) const NONE: CachedToken = CachedToken {
        start: u32::MAX,
        value: -1,
        end: 0,
        extended: -1,
        look_ahead: 0,
        mask: 0,
        context: 0,
    };
}

/// Decodes the character at the start of `bytes`, falling back to the raw byte for
/// malformed or cut off sequences.
fn decode(bytes: &[u8]) -> Option<(i32, u32)> {
    let first = *bytes.first()?;
    let width = match first {
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    };
    let ch = bytes
        .get(..width)
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .and_then(|text| text.chars().next());
    Some(match ch {
        Some(ch) => (ch as i32, width as u32),
        None => (i32::from(first), 1),
    })
}

/// A view of the parsed ranges of a document as one continuous stream of characters.
///
/// Positions are document byte offsets. Offsets passed to [`peek`](Self::peek) and
/// [`accept_token`](Self::accept_token) count bytes of parsed text, skipping the gaps
/// between ranges.
pub struct InputStream<'a> {
    input: &'a dyn Input,
    ranges: Box<[(u32, u32)]>,
    chunk: &'a [u8],
    chunk_pos: u32,
    next: i32,
    next_len: u32,
    pos: u32,
    range_index: usize,
    range: (u32, u32),
    end: u32,
    pub(crate) token: CachedToken,
}

impl<'a> InputStream<'a> {
    pub(crate) fn new(input: &'a dyn Input, ranges: &[TextRange]) -> Self {
        let ranges: Box<[(u32, u32)]> =
            ranges.iter().map(|range| (range.start().into(), range.end().into())).collect();
        let range = ranges.first().copied().unwrap_or((0, 0));
        let end = ranges.last().map_or(0, |range| range.1);
        let mut stream = InputStream {
            input,
            ranges,
            chunk: &[],
            chunk_pos: range.0,
            next: -1,
            next_len: 1,
            pos: range.0,
            range_index: 0,
            range,
            end,
            token: CachedToken::NONE,
        };
        stream.read_next();
        stream
    }

    /// The character at the current position, or -1 at the end.
    #[inline]
    pub fn next(&self) -> i32 {
        self.next
    }

    /// Byte length of the current character.
    #[inline]
    pub fn next_len(&self) -> u32 {
        self.next_len
    }

    #[inline]
    pub fn pos(&self) -> u32 {
        self.pos
    }

    /// End of the last parsed range.
    #[inline]
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Where the token being read started.
    #[inline]
    pub fn token_start(&self) -> u32 {
        self.token.start
    }

    /// The document position `offset` parsed bytes away from the current position. With
    /// `assoc < 0` a position at the end of a range stays there instead of moving on to
    /// the next range.
    pub fn resolve_offset(&self, offset: i64, assoc: i8) -> Option<u32> {
        let mut index = self.range_index;
        let mut range = self.range;
        let mut pos = i64::from(self.pos) + offset;
        while pos < i64::from(range.0) {
            if index == 0 {
                return None;
            }
            index -= 1;
            let next = self.ranges[index];
            pos -= i64::from(range.0 - next.1);
            range = next;
        }
        while if assoc < 0 { pos > i64::from(range.1) } else { pos >= i64::from(range.1) } {
            if index + 1 == self.ranges.len() {
                return None;
            }
            index += 1;
            let next = self.ranges[index];
            pos += i64::from(next.0 - range.1);
            range = next;
        }
        u32::try_from(pos).ok()
    }

    /// Moves `pos` into the parsed ranges, to the start of the next range when it is in a
    /// gap.
    pub fn clip_pos(&self, pos: u32) -> u32 {
        if pos >= self.range.0 && pos < self.range.1 {
            return pos;
        }
        self.ranges.iter().find(|range| range.1 > pos).map_or(self.end, |range| pos.max(range.0))
    }

    /// The end of the character at `pos`, clipped to the parsed ranges.
    pub(crate) fn char_end(&self, pos: u32) -> u32 {
        let len = if pos < self.end {
            decode(self.input.chunk(pos)).map_or(1, |(_, len)| len)
        } else {
            1
        };
        self.clip_pos(pos + len).min(self.end)
    }

    /// Looks at the character `offset` bytes from the current position without moving.
    /// Records the read in the token's look-ahead.
    pub fn peek(&mut self, offset: i64) -> i32 {
        let target = i64::from(self.pos) + offset;
        let index = target - i64::from(self.chunk_pos);
        let (pos, result) = if index >= 0 && (index as usize) < self.chunk.len() {
            let ch = decode(&self.chunk[index as usize..]).map_or(-1, |(ch, _)| ch);
            (target as u32, ch)
        } else {
            let Some(pos) = self.resolve_offset(offset, 1) else { return -1 };
            let range_end = self.ranges[self.range_index..]
                .iter()
                .find(|range| range.1 > pos)
                .map_or(self.end, |range| range.1);
            let chunk = self.input.chunk(pos);
            let chunk = &chunk[..chunk.len().min((range_end - pos) as usize)];
            (pos, decode(chunk).map_or(-1, |(ch, _)| ch))
        };
        if pos >= self.token.look_ahead {
            self.token.look_ahead = pos + 1;
        }
        result
    }

    /// Accepts a token of type `term` ending `end_offset` bytes after the current
    /// position. Later calls override earlier ones.
    #[track_caller]
    pub fn accept_token(&mut self, term: u16, end_offset: i64) {
        let end =
            if end_offset == 0 { Some(self.pos) } else { self.resolve_offset(end_offset, -1) };
        match end {
            Some(end) if end >= self.token.start => {
                self.token.value = term.into();
                self.token.end = end;
            }
            _ => panic!("token end out of bounds"),
        }
    }

    /// Accepts a token ending at document position `end`.
    pub fn accept_token_to(&mut self, term: u16, end: u32) {
        self.token.value = term.into();
        self.token.end = end;
    }

    /// Moves to the next character and returns it.
    pub fn advance(&mut self) -> i32 {
        self.advance_by(self.next_len)
    }

    /// Moves `bytes` parsed bytes forward.
    pub fn advance_by(&mut self, mut bytes: u32) -> i32 {
        while self.pos + bytes >= self.range.1 {
            if self.range_index + 1 == self.ranges.len() {
                return self.set_done();
            }
            bytes -= self.range.1 - self.pos;
            self.range_index += 1;
            self.range = self.ranges[self.range_index];
            self.pos = self.range.0;
        }
        self.pos += bytes;
        if self.pos >= self.token.look_ahead {
            self.token.look_ahead = self.pos + 1;
        }
        self.read_next()
    }

    fn set_done(&mut self) -> i32 {
        self.pos = self.end;
        self.chunk_pos = self.end;
        self.range_index = self.ranges.len().saturating_sub(1);
        self.range = self.ranges.get(self.range_index).copied().unwrap_or((0, 0));
        self.chunk = &[];
        self.next = -1;
        self.next_len = 1;
        self.next
    }

    fn read_next(&mut self) -> i32 {
        let in_chunk = self.pos >= self.chunk_pos
            && ((self.pos - self.chunk_pos) as usize) < self.chunk.len();
        if !in_chunk {
            self.chunk = if self.pos < self.range.1 {
                let chunk = self.input.chunk(self.pos);
                &chunk[..chunk.len().min((self.range.1 - self.pos) as usize)]
            } else {
                &[]
            };
            self.chunk_pos = self.pos;
        }
        let offset = (self.pos - self.chunk_pos) as usize;
        (self.next, self.next_len) = decode(&self.chunk[offset..]).unwrap_or((-1, 1));
        self.next
    }

    /// Moves to `pos`, starting a fresh token there when `token` is given.
    pub(crate) fn reset(&mut self, pos: u32, token: Option<CachedToken>) -> &mut Self {
        self.token = match token {
            Some(token) => CachedToken {
                start: pos,
                look_ahead: pos + 1,
                value: -1,
                extended: -1,
                ..token
            },
            None => CachedToken::NONE,
        };
        if self.pos != pos {
            self.pos = pos;
            if pos == self.end {
                self.set_done();
                return self;
            }
            while pos < self.range.0 && self.range_index > 0 {
                self.range_index -= 1;
                self.range = self.ranges[self.range_index];
            }
            while pos >= self.range.1 && self.range_index + 1 < self.ranges.len() {
                self.range_index += 1;
                self.range = self.ranges[self.range_index];
            }
            self.read_next();
        }
        self
    }

    /// The parsed text between two document positions, leaving out gaps between ranges.
    pub fn read(&self, from: u32, to: u32) -> Cow<'a, str> {
        let chunk_end = self.chunk_pos + self.chunk.len() as u32;
        if from >= self.chunk_pos && to <= chunk_end {
            let start = (from - self.chunk_pos) as usize;
            let end = (to - self.chunk_pos) as usize;
            return String::from_utf8_lossy(&self.chunk[start..end]);
        }
        if from >= self.range.0 && to <= self.range.1 {
            return self.input.read(from, to);
        }
        let mut text = String::new();
        for &(start, end) in &self.ranges {
            if start >= to {
                break;
            }
            if end > from {
                text.push_str(&self.input.read(start.max(from), end.min(to)));
            }
        }
        Cow::Owned(text)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TokenizerFlags: u8 {
        /// Rerun at every position instead of reusing the cached token of an earlier run
        /// at the same position and state.
        const CONTEXTUAL = 1 << 0;
        /// Only consulted when the tokenizers before it found no token.
        const FALLBACK = 1 << 1;
        /// A token from this tokenizer adds to, instead of replacing, the tokens of the
        /// tokenizers after it.
        const EXTEND = 1 << 2;
    }
}

/// Produces tokens by calling [`InputStream::accept_token`] zero or more times. The last
/// accepted token wins.
pub trait Tokenizer: Send + Sync {
    fn token(&self, input: &mut InputStream<'_>, stack: StackRef<'_>);

    fn flags(&self) -> TokenizerFlags {
        TokenizerFlags::empty()
    }
}

/// One group of tokens from the grammar's compiled token automaton.
pub struct TokenGroup {
    data: Arc<[u16]>,
    id: u32,
}

impl TokenGroup {
    pub fn new(data: Arc<[u16]>, id: u32) -> Self {
        Self { data, id }
    }
}

impl Tokenizer for TokenGroup {
    fn token(&self, input: &mut InputStream<'_>, stack: StackRef<'_>) {
        let parser = stack.parser();
        let prec_offset = parser.token_prec_table();
        read_token(&self.data, input, stack, self.id, parser.state_data(), prec_offset);
    }
}

/// A token automaton compiled separately from the main one, with its own precedence table.
/// With an else token, text that matches nothing is gathered into that token up to the
/// next position where the automaton does match.
pub struct LocalTokenGroup {
    data: Arc<[u16]>,
    prec_table: u32,
    else_token: Option<u16>,
}

impl LocalTokenGroup {
    pub fn new(data: Arc<[u16]>, prec_table: u32, else_token: Option<u16>) -> Self {
        Self { data, prec_table, else_token }
    }
}

impl Tokenizer for LocalTokenGroup {
    fn token(&self, input: &mut InputStream<'_>, stack: StackRef<'_>) {
        let start = input.pos();
        let mut skipped = 0;
        loop {
            let at_eof = input.next() < 0;
            let step = input.next_len();
            let next_pos = input.resolve_offset(step.into(), 1);
            read_token(&self.data, input, stack, 0, &self.data, self.prec_table);
            if input.token.value > -1 {
                break;
            }
            if self.else_token.is_none() {
                return;
            }
            if !at_eof {
                skipped += step;
            }
            let Some(next_pos) = next_pos else { break };
            let token = input.token;
            input.reset(next_pos, Some(token));
        }
        if let Some(else_token) = self.else_token
            && skipped > 0
        {
            let token = input.token;
            input.reset(start, Some(token));
            input.accept_token(else_token, skipped.into());
        }
    }
}

type TokenFn = dyn Fn(&mut InputStream<'_>, StackRef<'_>) + Send + Sync;

/// A tokenizer written by hand rather than compiled from the grammar.
pub struct ExternalTokenizer {
    token: Box<TokenFn>,
    flags: TokenizerFlags,
}

impl ExternalTokenizer {
    pub fn new(
        flags: TokenizerFlags,
        token: impl Fn(&mut InputStream<'_>, StackRef<'_>) + Send + Sync + 'static,
    ) -> Self {
        Self { token: Box::new(token), flags }
    }
}

impl Tokenizer for ExternalTokenizer {
    fn token(&self, input: &mut InputStream<'_>, stack: StackRef<'_>) {
        (self.token)(input, stack)
    }

    fn flags(&self) -> TokenizerFlags {
        self.flags
    }
}

/// Runs the token automaton in `data` for `group` from the current position.
///
/// Each state is laid out as `[group mask, accept end, edge count, (term, group mask)*,
/// (from, to, target)*]`, with edges sorted by character. An edge with `to == 0` has no
/// upper bound and an edge starting at `seq::END` matches the end of input.
fn read_token(
    data: &[u16],
    input: &mut InputStream<'_>,
    stack: StackRef<'_>,
    group: u32,
    prec_table: &[u16],
    prec_offset: u32,
) {
    let group_mask = 1u16 << group;
    let dialect = stack.parser().dialect();
    let mut state = 0;
    'scan: loop {
        if group_mask & data[state] == 0 {
            break;
        }
        let accept_end = usize::from(data[state + 1]);
        for pair in data[state + 3..accept_end].chunks_exact(2) {
            if pair[1] & group_mask == 0 {
                continue;
            }
            let term = pair[0];
            let current = input.token.value;
            if dialect.allows(term)
                && (current == -1
                    || current == i32::from(term)
                    || overrides(term, current as u16, prec_table, prec_offset))
            {
                input.accept_token(term, 0);
                break;
            }
        }

        let next = input.next();
        let mut low = 0;
        let mut high = usize::from(data[state + 2]);
        if next < 0 && high > low && data[accept_end + high * 3 - 3] == seq::END {
            state = usize::from(data[accept_end + high * 3 - 1]);
            continue;
        }
        while low < high {
            let mid = (low + high) >> 1;
            let index = accept_end + mid * 3;
            let from = i32::from(data[index]);
            let to = match data[index + 1] {
                0 => 0x11_0000,
                to => i32::from(to),
            };
            if next < from {
                high = mid;
            } else if next >= to {
                low = mid + 1;
            } else {
                state = usize::from(data[index + 2]);
                input.advance();
                continue 'scan;
            }
        }
        break;
    }
}

fn find_offset(data: &[u16], start: u32, term: u16) -> Option<usize> {
    data[start as usize..].iter().take_while(|&&next| next != seq::END).position(|&t| t == term)
}

/// Whether `token` takes precedence over the already accepted `prev`.
fn overrides(token: u16, prev: u16, table: &[u16], offset: u32) -> bool {
    match find_offset(table, offset, prev) {
        None => true,
        Some(prev_index) => {
            find_offset(table, offset, token).is_none_or(|index| index < prev_index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(pairs: &[(u32, u32)]) -> Vec<TextRange> {
        pairs.iter().map(|&(from, to)| TextRange::new(from.into(), to.into())).collect()
    }

    #[test]
    fn walks_ranges() {
        let text = "ab|cd|ef";
        let mut stream = InputStream::new(&text, &ranges(&[(0, 2), (3, 5), (6, 8)]));
        let mut seen = String::new();
        while stream.next() >= 0 {
            seen.push(char::from_u32(stream.next() as u32).unwrap());
            stream.advance();
        }
        assert_eq!(seen, "abcdef");
        assert_eq!(stream.pos(), 8);
    }

    #[test]
    fn offsets_skip_gaps() {
        let text = "ab|cd|ef";
        let mut stream = InputStream::new(&text, &ranges(&[(0, 2), (3, 5)]));
        stream.reset(1, Some(CachedToken::NONE));
        assert_eq!(stream.resolve_offset(1, 1), Some(3));
        assert_eq!(stream.resolve_offset(1, -1), Some(2));
        assert_eq!(stream.peek(2), i32::from(b'd'));
        assert_eq!(stream.token.look_ahead, 5);
        assert_eq!(stream.resolve_offset(4, 1), None);
        assert_eq!(stream.clip_pos(2), 3);
        assert_eq!(stream.clip_pos(9), 5);
        assert_eq!(stream.read(1, 5), "bcd");
    }

    #[test]
    fn multibyte_characters() {
        let text = "é1";
        let mut stream = InputStream::new(&text, &ranges(&[(0, 3)]));
        assert_eq!(stream.next(), 'é' as i32);
        assert_eq!(stream.next_len(), 2);
        assert_eq!(stream.advance(), i32::from(b'1'));
        assert_eq!(stream.pos(), 2);
        assert_eq!(stream.char_end(0), 2);
    }

    #[test]
    fn token_precedence() {
        // Table: 7 before 5, then end.
        let table = [7, 5, seq::END];
        assert!(overrides(7, 5, &table, 0));
        assert!(!overrides(5, 7, &table, 0));
        assert!(overrides(5, 9, &table, 0));
        assert!(overrides(9, 5, &table, 0));
    }
}
