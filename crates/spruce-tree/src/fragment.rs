use crate::tree::Tree;

/// A changed region, in the coordinates of the old (`a`) and new (`b`) document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedRange {
    pub from_a: u32,
    pub to_a: u32,
    pub from_b: u32,
    pub to_b: u32,
}

/// Records that `from..to` of the current document is still covered by an old tree.
///
/// Fragments with an open side were cut at that side by a change, so nodes touching the
/// cut can't be reused.
#[derive(Debug, Clone)]
pub struct TreeFragment {
    pub from: u32,
    pub to: u32,
    pub tree: Tree,
    /// Add to a document position to get the matching position in `tree`.
    pub offset: i64,
    pub open_start: bool,
    pub open_end: bool,
}

impl TreeFragment {
    pub fn new(from: u32, to: u32, tree: Tree, offset: i64) -> Self {
        Self { from, to, tree, offset, open_start: false, open_end: false }
    }

    /// Fragments for a freshly parsed `tree`, keeping old fragments past its end.
    ///
    /// `partial` marks trees that stopped before the end of the document.
    pub fn add_tree(tree: &Tree, fragments: &[TreeFragment], partial: bool) -> Vec<TreeFragment> {
        let mut result = vec![TreeFragment {
            open_end: partial,
            ..TreeFragment::new(0, tree.len(), tree.clone(), 0)
        }];
        result.extend(fragments.iter().filter(|fragment| fragment.to > tree.len()).cloned());
        result
    }

    /// Moves fragments through a sorted list of changes, dropping the parts that touch
    /// changed text and any piece shorter than `min_gap`.
    pub fn apply_changes(
        fragments: &[TreeFragment],
        changes: &[ChangedRange],
        min_gap: u32,
    ) -> Vec<TreeFragment> {
        if changes.is_empty() {
            return fragments.to_vec();
        }
        let mut result = Vec::new();
        let mut remaining = fragments.iter();
        let mut next_fragment = remaining.next();
        let mut pos = 0i64;
        let mut off = 0i64;

        for index in 0..=changes.len() {
            let change = changes.get(index);
            let next_pos = change.map_or(i64::MAX, |change| i64::from(change.from_a));
            if next_pos - pos >= i64::from(min_gap) {
                while let Some(fragment) = next_fragment
                    && i64::from(fragment.from) < next_pos
                {
                    let (from, to) = (i64::from(fragment.from), i64::from(fragment.to));
                    if pos >= from || next_pos <= to || off != 0 {
                        let cut_from = from.max(pos) - off;
                        let cut_to = to.min(next_pos) - off;
                        if cut_from < cut_to {
                            result.push(TreeFragment {
                                from: cut_from as u32,
                                to: cut_to as u32,
                                tree: fragment.tree.clone(),
                                offset: fragment.offset + off,
                                open_start: index > 0,
                                open_end: change.is_some(),
                            });
                        }
                    } else {
                        result.push(fragment.clone());
                    }
                    if to > next_pos {
                        break;
                    }
                    next_fragment = remaining.next();
                }
            }
            let Some(change) = change else { break };
            pos = i64::from(change.to_a);
            off = i64::from(change.to_a) - i64::from(change.to_b);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_type::NodeType;

    fn tree(length: u32) -> Tree {
        Tree::new(NodeType::none(), Vec::new(), Vec::new(), length)
    }

    fn change(from_a: u32, to_a: u32, from_b: u32, to_b: u32) -> ChangedRange {
        ChangedRange { from_a, to_a, from_b, to_b }
    }

    fn summary(fragments: &[TreeFragment]) -> Vec<(u32, u32, i64, bool, bool)> {
        fragments.iter().map(|f| (f.from, f.to, f.offset, f.open_start, f.open_end)).collect()
    }

    #[test]
    fn add_tree_keeps_trailing_fragments() {
        let old = TreeFragment::add_tree(&tree(100), &[], false);
        let fresh = TreeFragment::add_tree(&tree(40), &old, true);
        assert_eq!(summary(&fresh), vec![(0, 40, 0, false, true), (0, 100, 0, false, false)]);
    }

    #[test]
    fn insertion_splits_fragment() {
        let fragments = TreeFragment::add_tree(&tree(1000), &[], false);
        // Insert 10 bytes at 500.
        let moved = TreeFragment::apply_changes(&fragments, &[change(500, 500, 500, 510)], 128);
        assert_eq!(summary(&moved), vec![(0, 500, 0, false, true), (510, 1010, -10, true, false)]);
    }

    #[test]
    fn small_gaps_are_dropped() {
        let fragments = TreeFragment::add_tree(&tree(1000), &[], false);
        let changes = [change(100, 110, 100, 100), change(150, 160, 140, 140)];
        let moved = TreeFragment::apply_changes(&fragments, &changes, 128);
        assert_eq!(summary(&moved), vec![(140, 980, 20, true, false)]);

        let moved = TreeFragment::apply_changes(&fragments, &changes, 10);
        assert_eq!(
            summary(&moved),
            vec![(0, 100, 0, false, true), (100, 140, 10, true, true), (140, 980, 20, true, false)]
        );
    }

    #[test]
    fn no_changes() {
        let fragments = TreeFragment::add_tree(&tree(10), &[], false);
        assert_eq!(summary(&TreeFragment::apply_changes(&fragments, &[], 128)).len(), 1);
    }
}
