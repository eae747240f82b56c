use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use spruce_tree::props::{self, ErasedProp};
use spruce_tree::{
    DEFAULT_BUFFER_LENGTH, Input, MAX_BUFFER_LENGTH, NodePropSource, NodeSet, NodeType,
    NodeTypeSpec, ParseWrapper, Parser, PartialParse, TextRange, TreeFragment,
};

use crate::Error;
use crate::context::ContextTracker;
use crate::parse::Parse;
use crate::stack::StackRef;
use crate::table::{self, FILE_VERSION, action, pair, parse_state, seq, term};
use crate::token::{TokenGroup, Tokenizer};

/// A numeric table, either in the compact string form or as plain values.
#[derive(Debug, Clone)]
pub enum Table {
    Encoded(String),
    Values(Vec<u32>),
}

impl Table {
    fn decode(&self) -> Result<Vec<u32>, Error> {
        match self {
            Table::Encoded(text) => table::decode_array(text),
            Table::Values(values) => Ok(values.clone()),
        }
    }
}

impl Default for Table {
    fn default() -> Self {
        Table::Values(Vec::new())
    }
}

impl From<&str> for Table {
    fn from(text: &str) -> Self {
        Table::Encoded(text.to_owned())
    }
}

/// How a serialized table names a prop.
#[derive(Debug, Clone)]
pub enum PropKey {
    /// One of the built-in props, by name.
    Named(String),
    Prop(ErasedProp),
}

/// Assigns serialized prop values to node ids.
#[derive(Debug, Clone)]
pub struct NodePropSpec {
    pub prop: PropKey,
    pub values: Vec<(Vec<u16>, String)>,
}

#[derive(Clone)]
pub enum TokenizerSpec {
    /// A group of the grammar's token automaton.
    Group(u32),
    Custom(Arc<dyn Tokenizer>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopRule {
    pub name: String,
    pub state: u32,
    pub term: u16,
}

pub type ExternalSpecializer = dyn Fn(&str, StackRef<'_>) -> Option<u16> + Send + Sync;

#[derive(Clone)]
pub enum Specializer {
    /// Maps token text to the replacing term.
    Table(FxHashMap<String, u16>),
    External(Arc<ExternalSpecializer>),
}

/// Replaces (or, with `extend`, adds to) tokens of type `term` based on their text.
#[derive(Clone)]
pub struct SpecializerSpec {
    pub term: u16,
    pub extend: bool,
    pub specializer: Specializer,
}

impl SpecializerSpec {
    fn specialize(&self, text: &str, stack: StackRef<'_>) -> Option<u16> {
        match &self.specializer {
            Specializer::Table(table) => table.get(text).copied(),
            Specializer::External(specialize) => specialize(text, stack),
        }
    }
}

/// Everything needed to build an [`LrParser`], as emitted by a grammar compiler.
#[derive(Clone, Default)]
pub struct ParserSpec {
    pub version: u32,
    pub states: Table,
    pub state_data: Table,
    pub goto: Table,
    /// Space separated. Term 0 is the error term.
    pub node_names: String,
    pub max_term: u32,
    pub repeat_node_count: u32,
    pub node_props: Vec<NodePropSpec>,
    pub skipped_nodes: Vec<u16>,
    pub token_data: Table,
    pub tokenizers: Vec<TokenizerSpec>,
    /// The first rule is the default top.
    pub top_rules: Vec<TopRule>,
    /// Dialect names and the offset of their term list in the state data.
    pub dialects: Vec<(String, u32)>,
    pub dynamic_precedences: Vec<(u16, i32)>,
    pub specialized: Vec<SpecializerSpec>,
    /// Offset of the token precedence table in the state data.
    pub token_prec: u32,
    pub term_names: Option<FxHashMap<u16, String>>,
    pub context: Option<Arc<dyn ContextTracker>>,
    pub prop_sources: Vec<NodePropSource>,
}

/// Tuning constants of error recovery and stack pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recovery {
    pub insert: i32,
    pub delete: i32,
    pub reduce: i32,
    /// Most stacks a single insert recovery creates.
    pub max_next: usize,
    /// Steps that recovery stays active once started.
    pub distance: u32,
    pub max_remaining_per_step: usize,
    pub force_reduce_limit: usize,
    pub max_stack_count: usize,
    /// Stacks with more records than this are pruned even when in different states.
    pub min_buffer_length_prune: usize,
    /// Size in bytes above which a reduction counts as big.
    pub min_big_reduction: u32,
    pub max_left_associative_reductions: u32,
    /// Stacks deeper than this are force-reduced down to `cut_to` frames.
    pub cut_depth: usize,
    pub cut_to: usize,
}

impl Default for Recovery {
    fn default() -> Self {
        Self {
            insert: 200,
            delete: 190,
            reduce: 100,
            max_next: 4,
            distance: 5,
            max_remaining_per_step: 3,
            force_reduce_limit: 10,
            max_stack_count: 12,
            min_buffer_length_prune: 125,
            min_big_reduction: 2000,
            max_left_associative_reductions: 300,
            cut_depth: 2800,
            cut_to: 2000,
        }
    }
}

/// The dialects enabled for a parser, and the terms that are unavailable because of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    source: Option<String>,
    flags: Arc<[bool]>,
    disabled: Option<Arc<[bool]>>,
}

impl Dialect {
    #[inline]
    pub fn allows(&self, term: u16) -> bool {
        let term = usize::from(term);
        self.disabled.as_ref().is_none_or(|disabled| disabled.get(term) == Some(&false))
    }

    #[inline]
    pub fn enabled(&self, dialect: usize) -> bool {
        self.flags.get(dialect).copied().unwrap_or(false)
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

/// Changes applied by [`LrParser::configure`].
#[derive(Clone, Default)]
pub struct ParserConfig {
    pub props: Vec<NodePropSource>,
    /// Name of the top rule to parse with.
    pub top: Option<String>,
    /// Space separated dialect names.
    pub dialect: Option<String>,
    /// Pairs of tokenizers to replace, matched by identity.
    pub tokenizers: Vec<(Arc<dyn Tokenizer>, Arc<dyn Tokenizer>)>,
    pub specializers: Vec<(Arc<ExternalSpecializer>, Arc<ExternalSpecializer>)>,
    pub context_tracker: Option<Arc<dyn ContextTracker>>,
    /// Strict parsers fail instead of recovering from syntax errors.
    pub strict: Option<bool>,
    pub wrap: Option<ParseWrapper>,
    /// Maximum span of the nodes packed into one tree buffer.
    pub buffer_length: Option<u32>,
    pub recovery: Option<Recovery>,
}

/// A table-driven LR parser. Cheap to clone, the tables are shared.
#[derive(Clone)]
pub struct LrParser {
    states: Arc<[u32]>,
    data: Arc<[u16]>,
    goto: Arc<[u16]>,
    max_term: u32,
    min_repeat_term: u32,
    max_node: u32,
    node_set: NodeSet,
    tokenizers: Arc<[Arc<dyn Tokenizer>]>,
    top_rules: Arc<[TopRule]>,
    top: (u32, u16),
    dialects: Arc<[(String, u32)]>,
    dialect: Dialect,
    dynamic_precedences: Arc<FxHashMap<u32, i32>>,
    specializers: Arc<[SpecializerSpec]>,
    token_prec_table: u32,
    term_names: Option<Arc<FxHashMap<u16, String>>>,
    context: Option<Arc<dyn ContextTracker>>,
    strict: bool,
    wrappers: Vec<ParseWrapper>,
    buffer_length: u32,
    recovery: Recovery,
}

impl LrParser {
    pub fn deserialize(spec: ParserSpec) -> Result<Self, Error> {
        if spec.version != FILE_VERSION {
            return Err(Error::Version { found: spec.version, expected: FILE_VERSION });
        }
        let Some(first_top) = spec.top_rules.first() else {
            return Err(Error::UnknownTop(String::new()));
        };
        let top = (first_top.state, first_top.term);

        let mut names: Vec<&str> = spec.node_names.split(' ').collect();
        let min_repeat_term = names.len() as u32;
        names.extend((0..spec.repeat_node_count).map(|_| ""));

        let mut node_props = vec![Vec::new(); names.len()];
        for prop_spec in &spec.node_props {
            let prop = match &prop_spec.prop {
                PropKey::Named(name) => {
                    props::builtin(name).ok_or_else(|| Error::UnknownProp(name.clone()))?
                }
                PropKey::Prop(prop) => prop.clone(),
            };
            for (ids, text) in &prop_spec.values {
                let value = prop.deserialize(text).ok_or_else(|| Error::PropValue(text.clone()))?;
                for &id in ids {
                    let slot = node_props
                        .get_mut(usize::from(id))
                        .ok_or(Error::Table("prop assigned to unknown node"))?;
                    slot.push((prop.id(), value.clone()));
                }
            }
        }

        let types = names
            .iter()
            .zip(node_props)
            .enumerate()
            .map(|(index, (name, props))| {
                let id = index as u16;
                NodeType::define(NodeTypeSpec {
                    id,
                    name: (index < min_repeat_term as usize && !name.is_empty())
                        .then(|| (*name).to_owned()),
                    top: spec.top_rules.iter().any(|rule| rule.term == id),
                    skipped: spec.skipped_nodes.contains(&id),
                    error: index == 0,
                    props,
                })
            })
            .collect();
        let mut node_set = NodeSet::new(types)?;
        if !spec.prop_sources.is_empty() {
            node_set = node_set.extend(&spec.prop_sources);
        }

        let states: Arc<[u32]> = spec.states.decode()?.into();
        if states.len() % parse_state::SIZE as usize != 0 {
            return Err(Error::Table("state records cut off"));
        }
        let data: Arc<[u16]> = table::narrow(spec.state_data.decode()?)?.into();
        let goto: Arc<[u16]> = table::narrow(spec.goto.decode()?)?.into();
        if goto.is_empty() {
            return Err(Error::Table("empty goto table"));
        }
        let token_data: Arc<[u16]> = table::narrow(spec.token_data.decode()?)?.into();

        let tokenizers = spec
            .tokenizers
            .into_iter()
            .map(|tokenizer| match tokenizer {
                TokenizerSpec::Group(id) if id >= u16::BITS => Err(Error::TokenGroup(id)),
                TokenizerSpec::Group(id) => {
                    Ok(Arc::new(TokenGroup::new(token_data.clone(), id)) as Arc<dyn Tokenizer>)
                }
                TokenizerSpec::Custom(tokenizer) => Ok(tokenizer),
            })
            .collect::<Result<_, _>>()?;

        let max_node = node_set.types().len() as u32 - 1;
        let mut parser = Self {
            states,
            data,
            goto,
            max_term: spec.max_term,
            min_repeat_term,
            max_node,
            node_set,
            tokenizers,
            top_rules: spec.top_rules.into(),
            top,
            dialects: spec.dialects.into(),
            dialect: Dialect { source: None, flags: Arc::new([]), disabled: None },
            dynamic_precedences: Arc::new(
                spec.dynamic_precedences.into_iter().map(|(t, p)| (u32::from(t), p)).collect(),
            ),
            specializers: spec.specialized.into(),
            token_prec_table: spec.token_prec,
            term_names: spec.term_names.map(Arc::new),
            context: spec.context,
            strict: false,
            wrappers: Vec::new(),
            buffer_length: DEFAULT_BUFFER_LENGTH,
            recovery: Recovery::default(),
        };
        parser.dialect = parser.parse_dialect(None);
        Ok(parser)
    }

    /// A copy of this parser with `config` applied.
    pub fn configure(&self, config: ParserConfig) -> Result<Self, Error> {
        let mut copy = self.clone();
        if !config.props.is_empty() {
            copy.node_set = self.node_set.extend(&config.props);
        }
        if let Some(top) = &config.top {
            let rule = self
                .top_rules
                .iter()
                .find(|rule| rule.name == *top)
                .ok_or_else(|| Error::UnknownTop(top.clone()))?;
            copy.top = (rule.state, rule.term);
        }
        if !config.tokenizers.is_empty() {
            copy.tokenizers = self
                .tokenizers
                .iter()
                .map(|tokenizer| {
                    let same = |(from, _): &&(_, _)| {
                        std::ptr::addr_eq(Arc::as_ptr(from), Arc::as_ptr(tokenizer))
                    };
                    config
                        .tokenizers
                        .iter()
                        .find(same)
                        .map_or_else(|| tokenizer.clone(), |(_, to)| to.clone())
                })
                .collect();
        }
        if !config.specializers.is_empty() {
            copy.specializers = self
                .specializers
                .iter()
                .map(|spec| {
                    let Specializer::External(external) = &spec.specializer else {
                        return spec.clone();
                    };
                    match config.specializers.iter().find(|(from, _)| {
                        std::ptr::addr_eq(Arc::as_ptr(from), Arc::as_ptr(external))
                    }) {
                        Some((_, to)) => SpecializerSpec {
                            specializer: Specializer::External(to.clone()),
                            ..spec.clone()
                        },
                        None => spec.clone(),
                    }
                })
                .collect();
        }
        if let Some(tracker) = config.context_tracker {
            copy.context = Some(tracker);
        }
        if let Some(dialect) = &config.dialect {
            copy.dialect = self.parse_dialect(Some(dialect));
        }
        if let Some(strict) = config.strict {
            copy.strict = strict;
        }
        if let Some(wrap) = config.wrap {
            copy.wrappers.push(wrap);
        }
        if let Some(buffer_length) = config.buffer_length {
            if buffer_length > MAX_BUFFER_LENGTH {
                return Err(Error::BufferLength(buffer_length));
            }
            copy.buffer_length = buffer_length;
        }
        if let Some(recovery) = config.recovery {
            copy.recovery = recovery;
        }
        Ok(copy)
    }

    fn parse_dialect(&self, dialect: Option<&str>) -> Dialect {
        let mut flags = vec![false; self.dialects.len()];
        for part in dialect.into_iter().flat_map(|dialect| dialect.split(' ')) {
            if let Some(index) = self.dialects.iter().position(|(name, _)| name == part) {
                flags[index] = true;
            }
        }
        let mut disabled: Option<Vec<bool>> = None;
        for ((_, offset), _) in self.dialects.iter().zip(&flags).filter(|(_, enabled)| !**enabled) {
            let disabled = disabled.get_or_insert_with(|| vec![false; self.max_term as usize + 1]);
            for &id in self.data[*offset as usize..].iter().take_while(|&&id| id != seq::END) {
                if let Some(slot) = disabled.get_mut(usize::from(id)) {
                    *slot = true;
                }
            }
        }
        Dialect {
            source: dialect.map(str::to_owned),
            flags: flags.into(),
            disabled: disabled.map(Into::into),
        }
    }

    #[inline]
    pub fn node_set(&self) -> &NodeSet {
        &self.node_set
    }

    /// The type of the top node of parsed trees.
    pub fn top_node(&self) -> &NodeType {
        &self.node_set.types()[usize::from(self.top.1)]
    }

    #[inline]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn has_wrappers(&self) -> bool {
        !self.wrappers.is_empty()
    }

    #[inline]
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// The name of a term, for debugging output.
    pub fn get_name(&self, term: u16) -> String {
        if let Some(names) = &self.term_names {
            return names.get(&term).cloned().unwrap_or_default();
        }
        match self.node_set.get(term) {
            Some(ty) if u32::from(term) <= self.max_node && !ty.name().is_empty() => {
                ty.name().to_owned()
            }
            _ => term.to_string(),
        }
    }

    #[inline]
    pub fn eof_term(&self) -> u32 {
        self.max_node + 1
    }

    #[inline]
    pub(crate) fn max_node(&self) -> u32 {
        self.max_node
    }

    #[inline]
    pub(crate) fn min_repeat_term(&self) -> u32 {
        self.min_repeat_term
    }

    #[inline]
    pub(crate) fn top(&self) -> (u32, u16) {
        self.top
    }

    #[inline]
    pub(crate) fn buffer_length(&self) -> u32 {
        self.buffer_length
    }

    #[inline]
    pub(crate) fn recovery(&self) -> &Recovery {
        &self.recovery
    }

    #[inline]
    pub(crate) fn tokenizers(&self) -> &[Arc<dyn Tokenizer>] {
        &self.tokenizers
    }

    pub(crate) fn context_tracker(&self) -> Option<&dyn ContextTracker> {
        self.context.as_deref()
    }

    #[inline]
    pub(crate) fn state_data(&self) -> &[u16] {
        &self.data
    }

    #[inline]
    pub(crate) fn token_prec_table(&self) -> u32 {
        self.token_prec_table
    }

    #[inline]
    pub(crate) fn state_slot(&self, state: u32, slot: u32) -> u32 {
        self.states[(state * parse_state::SIZE + slot) as usize]
    }

    #[inline]
    pub(crate) fn state_flag(&self, state: u32, flag: u32) -> bool {
        self.state_slot(state, parse_state::FLAGS) & flag != 0
    }

    pub(crate) fn dynamic_precedence(&self, term: u32) -> i32 {
        self.dynamic_precedences.get(&term).copied().unwrap_or(0)
    }

    /// The state reached after reducing to `term` in `state`.
    pub(crate) fn goto(&self, state: u32, term: u32) -> Option<u32> {
        self.lookup_goto(state, term, false)
    }

    /// Like [`goto`](Self::goto), but trusts that the table has an entry, taking the
    /// fallback group without checking it.
    pub(crate) fn goto_loose(&self, state: u32, term: u32) -> u32 {
        // Only a malformed table lacks a group for a reduced term.
        self.lookup_goto(state, term, true).unwrap_or(0)
    }

    fn lookup_goto(&self, state: u32, term: u32, loose: bool) -> Option<u32> {
        let table = &*self.goto;
        if term >= u32::from(table[0]) {
            return None;
        }
        let mut pos = usize::from(*table.get(term as usize + 1)?);
        loop {
            let group_tag = table[pos];
            let last = group_tag & 1 != 0;
            let target = u32::from(table[pos + 1]);
            pos += 2;
            if last && loose {
                return Some(target);
            }
            let end = pos + usize::from(group_tag >> 1);
            if table[pos..end].iter().any(|&s| u32::from(s) == state) {
                return Some(target);
            }
            if last {
                return None;
            }
            pos = end;
        }
    }

    /// The action for `terminal` in `state`, looking in the skip table too. Zero when there
    /// is none.
    pub(crate) fn has_action(&self, state: u32, terminal: u32) -> u32 {
        let data = &*self.data;
        for slot in [parse_state::ACTIONS, parse_state::SKIP] {
            let mut i = self.state_slot(state, slot) as usize;
            loop {
                let mut next = data[i];
                if next == seq::END {
                    match data[i + 1] {
                        seq::NEXT => {
                            i = pair(data, i + 2) as usize;
                            next = data[i];
                        }
                        seq::OTHER => return pair(data, i + 2),
                        _ => break,
                    }
                }
                if u32::from(next) == terminal || next == term::ERR {
                    return pair(data, i + 1);
                }
                i += 3;
            }
        }
        0
    }

    /// The default reduction followed by every action in the state's action table.
    pub(crate) fn all_actions(&self, state: u32) -> impl Iterator<Item = u32> + '_ {
        let default = Some(self.state_slot(state, parse_state::DEFAULT_REDUCE)).filter(|&a| a != 0);
        let data = &*self.data;
        let mut i = self.state_slot(state, parse_state::ACTIONS) as usize;
        let table = std::iter::from_fn(move || {
            if data[i] == seq::END {
                if data[i + 1] != seq::NEXT {
                    return None;
                }
                i = pair(data, i + 2) as usize;
            }
            let action = pair(data, i + 1);
            i += 3;
            Some(action)
        });
        default.into_iter().chain(table)
    }

    pub(crate) fn valid_action(&self, state: u32, action: u32) -> bool {
        self.all_actions(state).any(|a| a == action)
    }

    /// `(term, state)` pairs for the states reachable by shifting in `state`.
    pub(crate) fn next_states(&self, state: u32) -> Vec<(u16, u32)> {
        let data = &*self.data;
        let mut result: Vec<(u16, u32)> = Vec::new();
        let mut i = self.state_slot(state, parse_state::ACTIONS) as usize;
        loop {
            if data[i] == seq::END {
                if data[i + 1] != seq::NEXT {
                    break;
                }
                i = pair(data, i + 2) as usize;
            }
            if u32::from(data[i + 2]) & (action::REDUCE_FLAG >> 16) == 0 {
                let value = u32::from(data[i + 1]);
                if !result.iter().any(|&(_, other)| other == value) {
                    result.push((data[i], value));
                }
            }
            i += 3;
        }
        result
    }

    /// Specializes a token of type `term` with text `text`. Returns the new term and
    /// whether it extends rather than replaces the token.
    pub(crate) fn specialize(
        &self,
        term: u16,
        text: &str,
        stack: StackRef<'_>,
    ) -> Option<(u16, bool)> {
        self.specializers.iter().filter(|spec| spec.term == term).find_map(|spec| {
            spec.specialize(text, stack)
                .filter(|&result| self.dialect.allows(result))
                .map(|result| (result, spec.extend))
        })
    }
}

impl Parser for LrParser {
    fn create_parse<'a>(
        &self,
        input: &'a dyn Input,
        fragments: &[TreeFragment],
        ranges: &[TextRange],
    ) -> Box<dyn PartialParse + 'a> {
        let mut parse: Box<dyn PartialParse + 'a> =
            Box::new(Parse::new(self.clone(), input, fragments, ranges));
        for wrapper in &self.wrappers {
            parse = wrapper.wrap(parse, input, fragments, ranges);
        }
        parse
    }
}

impl fmt::Debug for LrParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LrParser")
            .field("states", &(self.states.len() / parse_state::SIZE as usize))
            .field("top", &self.top_node())
            .field("dialect", &self.dialect)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}
