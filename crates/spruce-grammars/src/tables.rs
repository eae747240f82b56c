//! Helpers for laying out parse and token tables by hand.

use spruce_lr::table::{action, seq};

pub(crate) fn shift(state: u32) -> u32 {
    state
}

pub(crate) fn reduce(term: u16, depth: u32) -> u32 {
    (depth << action::REDUCE_DEPTH_SHIFT) | action::REDUCE_FLAG | u32::from(term)
}

/// Shifts a skipped token without leaving the state.
pub(crate) const STAY: u32 = action::STAY_FLAG;

/// One parse state, see `spruce_lr::table::parse_state`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct State {
    pub(crate) flags: u32,
    pub(crate) actions: u32,
    pub(crate) skip: u32,
    pub(crate) tokenizers: u32,
    pub(crate) default_reduce: u32,
    pub(crate) forced_reduce: u32,
}

#[derive(Default)]
pub(crate) struct Tables {
    states: Vec<u32>,
    data: Vec<u32>,
    gotos: Vec<(u16, u32, Vec<u32>)>,
}

pub(crate) struct Built {
    pub(crate) states: Vec<u32>,
    pub(crate) data: Vec<u32>,
    pub(crate) goto: Vec<u32>,
}

impl Tables {
    /// Adds a `(term, action)` list to the state data, returning its offset.
    pub(crate) fn actions(&mut self, actions: &[(u16, u32)]) -> u32 {
        let offset = self.data.len() as u32;
        for &(term, action) in actions {
            self.data.extend([u32::from(term), action & 0xffff, action >> 16]);
        }
        self.data.extend([u32::from(seq::END), u32::from(seq::DONE)]);
        offset
    }

    /// Adds a term list ended by `seq::END`, as used for token precedence and dialects.
    pub(crate) fn terms(&mut self, terms: &[u16]) -> u32 {
        let offset = self.data.len() as u32;
        self.data.extend(terms.iter().copied().map(u32::from));
        self.data.push(u32::from(seq::END));
        offset
    }

    /// Adds the next state and returns its id.
    pub(crate) fn state(&mut self, state: State) -> u32 {
        let id = (self.states.len() / 6) as u32;
        self.states.extend([
            state.flags,
            state.actions,
            state.skip,
            state.tokenizers,
            state.default_reduce,
            state.forced_reduce,
        ]);
        id
    }

    /// Reducing to `term` in any of `from` moves to `target`.
    pub(crate) fn goto(&mut self, term: u16, target: u32, from: &[u32]) {
        self.gotos.push((term, target, from.to_vec()));
    }

    pub(crate) fn build(self) -> Built {
        let terms = self.gotos.iter().map(|&(term, ..)| usize::from(term) + 1).max().unwrap_or(0);
        let mut goto = vec![0; terms + 1];
        goto[0] = terms as u32;
        // Terms without entries share a final group that matches nothing.
        let empty = goto.len() as u32;
        goto.extend([1, 0]);
        for term in 0..terms {
            let groups: Vec<_> =
                self.gotos.iter().filter(|(t, ..)| usize::from(*t) == term).collect();
            if groups.is_empty() {
                goto[term + 1] = empty;
                continue;
            }
            goto[term + 1] = goto.len() as u32;
            for (index, (_, target, from)) in groups.iter().enumerate() {
                let last = u32::from(index + 1 == groups.len());
                goto.push(((from.len() as u32) << 1) | last);
                goto.push(*target);
                goto.extend(from);
            }
        }
        Built { states: self.states, data: self.data, goto }
    }
}

/// A token automaton state: accepted terms, then `(from, to, target)` character edges
/// sorted by `from`. A `to` of zero means no upper bound.
pub(crate) struct TokenState {
    pub(crate) accept: &'static [u16],
    pub(crate) edges: &'static [(u16, u16, usize)],
}

/// Lays out token states for a single group. Edge targets are indices into `states`.
pub(crate) fn token_data(states: &[TokenState]) -> Vec<u32> {
    let mut offsets = Vec::with_capacity(states.len());
    let mut offset = 0;
    for state in states {
        offsets.push(offset);
        offset += 3 + state.accept.len() * 2 + state.edges.len() * 3;
    }
    let group_mask = 1;
    let mut data = Vec::with_capacity(offset);
    for (state, &start) in states.iter().zip(&offsets) {
        let accept_end = start + 3 + state.accept.len() * 2;
        data.extend([group_mask, accept_end as u32, state.edges.len() as u32]);
        for &term in state.accept {
            data.extend([u32::from(term), group_mask]);
        }
        for &(from, to, target) in state.edges {
            data.extend([u32::from(from), u32::from(to), offsets[target] as u32]);
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goto_layout() {
        let mut tables = Tables::default();
        tables.goto(2, 5, &[0, 3]);
        tables.goto(2, 6, &[4]);
        let built = tables.build();
        // Header, offsets for terms 0..3, the shared empty group, then term 2's groups.
        assert_eq!(built.goto, vec![3, 4, 4, 6, 1, 0, 4, 5, 0, 3, 3, 6, 4]);
    }

    #[test]
    fn token_layout() {
        let data = token_data(&[
            TokenState { accept: &[], edges: &[(48, 58, 1)] },
            TokenState { accept: &[2], edges: &[(48, 58, 1)] },
        ]);
        assert_eq!(data, vec![1, 3, 1, 48, 58, 6, 1, 11, 1, 2, 1, 48, 58, 6]);
    }
}
