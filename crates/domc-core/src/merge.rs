use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use crate::node::{FillerKind, LEVEL_DAMPING, Node, NodeId, TEXT_NODE_COST};

/// How children left over after positional alignment are charged.
///
/// When one children list is longer than the other, the extra children have
/// no counterpart. Either side being childless is charged nothing under both
/// policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TailCost {
    /// Charge the unmatched tail of whichever side has one.
    #[default]
    Unmatched,
    /// Charge the first operand's tail twice and never the second's.
    ///
    /// Reproduces the historical scoring. Costs then depend on argument order
    /// and distances may exceed 1.0.
    Legacy,
}

/// How the children lists of two matching elements are paired up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Alignment {
    /// Pair children by index; leftovers are charged by [`TailCost`].
    #[default]
    Positional,
    /// Pair children along the cheapest sequence of edits. Deleting or
    /// inserting a child costs its edit weight, substituting one child for
    /// another costs their merge. [`TailCost`] does not apply.
    EditDistance,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOptions {
    pub tail_cost: TailCost,
    pub alignment: Alignment,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Delete,
    Insert,
    Substitute,
}

/// Result of merging two trees: the merged tree and its edit cost.
#[derive(Debug, Clone)]
pub struct Merged {
    pub node: Arc<Node>,
    pub cost: f64,
}

impl Merged {
    fn new(node: Node, cost: f64) -> Self {
        Self {
            node: Arc::new(node),
            cost,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Calls answered from the cache.
    pub cache_hits: usize,
    /// Merge steps actually computed.
    pub computed: usize,
    /// Distinct node pairs currently cached.
    pub cached_pairs: usize,
}

type PairKey = (NodeId, NodeId);

fn filler_for(node: &Node) -> Node {
    if node.is_text() {
        Node::text_filler()
    } else {
        Node::dom_filler()
    }
}

fn pair_key(a: &Node, b: &Node) -> PairKey {
    let (a, b) = (a.id(), b.id());
    if a <= b { (a, b) } else { (b, a) }
}

/// Recursive positional tree merger with a per-instance memo cache.
///
/// The cache is keyed by the unordered pair of node ids, so `merge(a, b)` and
/// `merge(b, a)` share one entry. It lives as long as the merger and is safe
/// to share across threads.
#[derive(Debug, Default)]
pub struct Merger {
    options: MergeOptions,
    cache: DashMap<PairKey, Merged, FxBuildHasher>,
    cache_hits: AtomicUsize,
    computed: AtomicUsize,
}

impl Merger {
    pub fn new(options: MergeOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Aligns `a` and `b` position by position and returns the merged tree
    /// together with the edit cost between them.
    pub fn merge(&self, a: &Node, b: &Node) -> Merged {
        let key = pair_key(a, b);

        if let Some(cached) = self.cache.get(&key) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return cached.value().clone();
        }

        // The shard lock is released before recursing; a concurrent writer of
        // the same key stores an identical result.
        let merged = self.merge_uncached(a, b);
        self.cache.insert(key, merged.clone());
        merged
    }

    fn merge_uncached(&self, a: &Node, b: &Node) -> Merged {
        self.computed.fetch_add(1, Ordering::Relaxed);

        if a.node_name() != b.node_name() {
            return Merged::new(Node::dom_filler(), a.edit_weight() + b.edit_weight());
        }

        if a.is_filler() && b.is_filler() {
            let kind = if a.is_text() {
                FillerKind::Text
            } else {
                FillerKind::Dom
            };
            return Merged::new(Node::filler(kind), 0.0);
        }

        if a.is_text() {
            return if a.text() == b.text() {
                Merged::new(a.shallow_copy(), 0.0)
            } else {
                Merged::new(Node::text_filler(), 2.0 * TEXT_NODE_COST)
            };
        }

        let (left, right) = (a.children(), b.children());
        if left.is_empty() || right.is_empty() {
            return Merged::new(a.copy_with_children(Vec::new()), 0.0);
        }

        let (children, cost) = match self.options.alignment {
            Alignment::Positional => self.merge_positional(left, right),
            Alignment::EditDistance => self.merge_aligned(left, right),
        };

        Merged::new(a.copy_with_children(children), cost * LEVEL_DAMPING)
    }

    fn merge_positional(&self, left: &[Arc<Node>], right: &[Arc<Node>]) -> (Vec<Arc<Node>>, f64) {
        let matched = left.len().min(right.len());
        let mut children = Vec::with_capacity(matched);
        let mut cost = 0.0;

        for (x, y) in left.iter().zip(right) {
            let merged = self.merge(x, y);
            cost += merged.cost;
            children.push(merged.node);
        }

        cost += self.tail_cost(&left[matched..], &right[matched..]);

        (children, cost)
    }

    /// Levenshtein alignment of two children lists. A child kept from one
    /// side only is replaced by a filler of its kind in the merged list.
    fn merge_aligned(&self, left: &[Arc<Node>], right: &[Arc<Node>]) -> (Vec<Arc<Node>>, f64) {
        let (n, m) = (left.len(), right.len());
        let width = m + 1;
        let mut costs = vec![0.0; (n + 1) * width];
        let mut steps = vec![Step::Substitute; (n + 1) * width];

        for i in 1..=n {
            costs[i * width] = costs[(i - 1) * width] + left[i - 1].edit_weight();
            steps[i * width] = Step::Delete;
        }
        for j in 1..=m {
            costs[j] = costs[j - 1] + right[j - 1].edit_weight();
            steps[j] = Step::Insert;
        }

        for i in 1..=n {
            for j in 1..=m {
                let delete = costs[(i - 1) * width + j] + left[i - 1].edit_weight();
                let insert = costs[i * width + j - 1] + right[j - 1].edit_weight();
                let substitute =
                    costs[(i - 1) * width + j - 1] + self.merge(&left[i - 1], &right[j - 1]).cost;

                let mut best = (Step::Delete, delete);
                if insert < best.1 {
                    best = (Step::Insert, insert);
                }
                if substitute < best.1 {
                    best = (Step::Substitute, substitute);
                }

                steps[i * width + j] = best.0;
                costs[i * width + j] = best.1;
            }
        }

        let mut children = Vec::with_capacity(n.max(m));
        let (mut i, mut j) = (n, m);

        while i > 0 || j > 0 {
            match steps[i * width + j] {
                Step::Delete => {
                    children.push(Arc::new(filler_for(&left[i - 1])));
                    i -= 1;
                }
                Step::Insert => {
                    children.push(Arc::new(filler_for(&right[j - 1])));
                    j -= 1;
                }
                Step::Substitute => {
                    children.push(self.merge(&left[i - 1], &right[j - 1]).node);
                    i -= 1;
                    j -= 1;
                }
            }
        }
        children.reverse();

        (children, costs[n * width + m])
    }

    fn tail_cost(&self, left: &[Arc<Node>], right: &[Arc<Node>]) -> f64 {
        let weight = |tail: &[Arc<Node>]| tail.iter().map(|n| n.edit_weight()).sum::<f64>();

        match self.options.tail_cost {
            TailCost::Unmatched => weight(left) + weight(right),
            TailCost::Legacy => weight(left) + weight(left),
        }
    }

    pub fn stats(&self) -> MergeStats {
        MergeStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            computed: self.computed.load(Ordering::Relaxed),
            cached_pairs: self.cache.len(),
        }
    }

    /// Drops every cached pair. Counters are kept.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ELEMENT_NODE_COST, TEXT_NODE_NAME};
    use rstest::rstest;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    fn text_div(text: &str) -> Node {
        Node::element("DIV", [Node::text_node(text)])
    }

    #[test]
    fn test_tag_mismatch() {
        let merger = Merger::default();
        let (div, span) = (Node::element("DIV", []), Node::element("SPAN", []));

        let merged = merger.merge(&div, &span);

        assert_eq!(merged.cost, 2.0 * ELEMENT_NODE_COST);
        assert_eq!(merged.node.filler_kind(), Some(FillerKind::Dom));
        assert!(merged.node.children().is_empty());
    }

    #[test]
    fn test_tag_mismatch_does_not_recurse() {
        let merger = Merger::default();
        let a = Node::element("DIV", [Node::element("P", []), Node::text_node("a")]);
        let b = Node::element("SPAN", [Node::element("P", [])]);

        let merged = merger.merge(&a, &b);

        assert_close(merged.cost, a.edit_weight() + b.edit_weight());
        assert_eq!(merger.stats().computed, 1);
    }

    #[rstest]
    #[case::equal("hello", "hello", 0.0)]
    #[case::different("hello", "world", 2.0 * TEXT_NODE_COST)]
    #[case::empty("", "", 0.0)]
    fn test_text_nodes(#[case] a: &str, #[case] b: &str, #[case] expected: f64) {
        let merger = Merger::default();
        let merged = merger.merge(&Node::text_node(a), &Node::text_node(b));
        assert_eq!(merged.cost, expected);
    }

    #[test]
    fn test_equal_text_returns_copy() {
        let merger = Merger::default();
        let (a, b) = (Node::text_node("same"), Node::text_node("same"));

        let merged = merger.merge(&a, &b);

        assert_eq!(merged.node.text(), Some("same"));
        assert_ne!(merged.node.id(), a.id());
        assert!(!merged.node.is_filler());
    }

    #[test]
    fn test_different_text_returns_filler() {
        let merger = Merger::default();
        let merged = merger.merge(&Node::text_node("a"), &Node::text_node("b"));

        assert_eq!(merged.node.filler_kind(), Some(FillerKind::Text));
        assert_eq!(merged.node.node_name(), Some(TEXT_NODE_NAME));
    }

    #[rstest]
    #[case::text(FillerKind::Text)]
    #[case::dom(FillerKind::Dom)]
    fn test_fillers_merge_for_free(#[case] kind: FillerKind) {
        let merger = Merger::default();
        let merged = merger.merge(&Node::filler(kind), &Node::filler(kind));

        assert_eq!(merged.cost, 0.0);
        assert_eq!(merged.node.filler_kind(), Some(kind));
    }

    #[test]
    fn test_text_filler_against_text() {
        let merger = Merger::default();
        let merged = merger.merge(&Node::text_filler(), &Node::text_node("x"));

        assert_eq!(merged.cost, 2.0 * TEXT_NODE_COST);
        assert_eq!(merged.node.filler_kind(), Some(FillerKind::Text));
    }

    #[test]
    fn test_text_difference_is_damped_once_per_level() {
        let merger = Merger::default();

        let shallow = merger.merge(&text_div("hi"), &text_div("bye"));
        assert_close(shallow.cost, 2.0 * LEVEL_DAMPING);

        let nested = merger.merge(
            &Node::element("DIV", [Node::element("P", [Node::text_node("hi")])]),
            &Node::element("DIV", [Node::element("P", [Node::text_node("bye")])]),
        );
        assert_close(nested.cost, 2.0 * LEVEL_DAMPING * LEVEL_DAMPING);
    }

    #[test]
    fn test_merged_tree_shape() {
        let merger = Merger::default();
        let a = Node::element(
            "DIV",
            [
                Node::text_node("same"),
                Node::text_node("left"),
                Node::element("P", []),
            ],
        );
        let b = Node::element(
            "DIV",
            [
                Node::text_node("same"),
                Node::text_node("right"),
                Node::element("SPAN", []),
            ],
        );

        let merged = merger.merge(&a, &b);
        let children = merged.node.children();

        assert_eq!(merged.node.node_name(), Some("DIV"));
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].text(), Some("same"));
        assert_eq!(children[1].filler_kind(), Some(FillerKind::Text));
        assert_eq!(children[2].filler_kind(), Some(FillerKind::Dom));
        assert_close(
            merged.cost,
            LEVEL_DAMPING * (2.0 * TEXT_NODE_COST + 2.0 * ELEMENT_NODE_COST),
        );
    }

    #[rstest]
    #[case::either_side_childless_unmatched(TailCost::Unmatched)]
    #[case::either_side_childless_legacy(TailCost::Legacy)]
    fn test_childless_side_is_free(#[case] tail_cost: TailCost) {
        let merger = Merger::new(MergeOptions {
            tail_cost,
            ..Default::default()
        });
        let bare = Node::element("DIV", []);
        let full = Node::element("DIV", [Node::element("P", []), Node::element("P", [])]);

        let merged = merger.merge(&bare, &full);

        assert_eq!(merged.cost, 0.0);
        assert!(merged.node.children().is_empty());
        let reversed = Merger::new(MergeOptions {
            tail_cost,
            ..Default::default()
        });
        assert_eq!(reversed.merge(&full, &bare).cost, 0.0);
    }

    fn long_and_short() -> (Node, Node) {
        let long = Node::element(
            "DIV",
            [
                Node::element("P", []),
                Node::element("P", []),
                Node::element("SPAN", []),
            ],
        );
        let short = Node::element("DIV", [Node::element("P", [])]);
        (long, short)
    }

    #[rstest]
    #[case::unmatched_long_first(TailCost::Unmatched, true, 2.0 * ELEMENT_NODE_COST * LEVEL_DAMPING)]
    #[case::unmatched_short_first(TailCost::Unmatched, false, 2.0 * ELEMENT_NODE_COST * LEVEL_DAMPING)]
    #[case::legacy_long_first(TailCost::Legacy, true, 4.0 * ELEMENT_NODE_COST * LEVEL_DAMPING)]
    #[case::legacy_short_first(TailCost::Legacy, false, 0.0)]
    fn test_unmatched_tail_policy(
        #[case] tail_cost: TailCost,
        #[case] long_first: bool,
        #[case] expected: f64,
    ) {
        let merger = Merger::new(MergeOptions {
            tail_cost,
            ..Default::default()
        });
        let (long, short) = long_and_short();

        let merged = if long_first {
            merger.merge(&long, &short)
        } else {
            merger.merge(&short, &long)
        };

        assert_close(merged.cost, expected);
        assert_eq!(merged.node.children().len(), 1);
    }

    #[test]
    fn test_legacy_tail_is_symmetric_through_cache() {
        let merger = Merger::new(MergeOptions {
            tail_cost: TailCost::Legacy,
            ..Default::default()
        });
        let (long, short) = long_and_short();

        let first = merger.merge(&long, &short);
        let second = merger.merge(&short, &long);

        assert_eq!(first.cost.to_bits(), second.cost.to_bits());
    }

    fn edit_distance_merger() -> Merger {
        Merger::new(MergeOptions {
            alignment: Alignment::EditDistance,
            ..Default::default()
        })
    }

    #[test]
    fn test_edit_distance_skips_inserted_child() {
        let with_extra = Node::element(
            "DIV",
            [
                Node::element("P", []),
                Node::element("SPAN", []),
                Node::element("UL", []),
            ],
        );
        let without = Node::element("DIV", [Node::element("P", []), Node::element("UL", [])]);

        let aligned = edit_distance_merger().merge(&with_extra, &without);
        let children = aligned.node.children();

        assert_close(aligned.cost, ELEMENT_NODE_COST * LEVEL_DAMPING);
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].node_name(), Some("P"));
        assert_eq!(children[1].filler_kind(), Some(FillerKind::Dom));
        assert_eq!(children[2].node_name(), Some("UL"));

        let reversed = edit_distance_merger().merge(&without, &with_extra);
        assert_eq!(reversed.cost.to_bits(), aligned.cost.to_bits());

        let positional = Merger::default().merge(&with_extra, &without);
        assert_close(positional.cost, 3.0 * ELEMENT_NODE_COST * LEVEL_DAMPING);
    }

    #[test]
    fn test_edit_distance_keeps_text_filler_kind() {
        let a = Node::element("DIV", [Node::text_node("x"), Node::element("P", [])]);
        let b = Node::element("DIV", [Node::element("P", [])]);

        let aligned = edit_distance_merger().merge(&a, &b);
        let children = aligned.node.children();

        assert_close(aligned.cost, TEXT_NODE_COST * LEVEL_DAMPING);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].filler_kind(), Some(FillerKind::Text));
        assert_eq!(children[1].node_name(), Some("P"));
    }

    #[rstest]
    #[case::positional(Alignment::Positional)]
    #[case::edit_distance(Alignment::EditDistance)]
    fn test_identical_children_cost_nothing(#[case] alignment: Alignment) {
        let merger = Merger::new(MergeOptions {
            alignment,
            ..Default::default()
        });
        let a = Node::element("UL", [text_div("a"), text_div("b"), Node::element("LI", [])]);
        let b = Node::element("UL", [text_div("a"), text_div("b"), Node::element("LI", [])]);

        let merged = merger.merge(&a, &b);

        assert_eq!(merged.cost, 0.0);
        assert_eq!(merged.node.children().len(), 3);
    }

    #[test]
    fn test_edit_distance_childless_side_is_free() {
        let bare = Node::element("DIV", []);
        let full = Node::element("DIV", [Node::element("P", [])]);

        let merged = edit_distance_merger().merge(&full, &bare);

        assert_eq!(merged.cost, 0.0);
        assert!(merged.node.children().is_empty());
    }

    #[test]
    fn test_memoization() {
        let merger = Merger::default();
        let a = Node::element("DIV", [Node::text_node("a"), Node::element("P", [])]);
        let b = Node::element("DIV", [Node::text_node("b"), Node::element("P", [])]);

        let first = merger.merge(&a, &b);
        let after_first = merger.stats();
        assert_eq!(after_first.computed, 3);
        assert_eq!(after_first.cached_pairs, 3);
        assert_eq!(after_first.cache_hits, 0);

        let second = merger.merge(&a, &b);
        let reversed = merger.merge(&b, &a);
        let after_repeat = merger.stats();

        assert_eq!(first.cost.to_bits(), second.cost.to_bits());
        assert_eq!(first.cost.to_bits(), reversed.cost.to_bits());
        assert!(Arc::ptr_eq(&first.node, &second.node));
        assert_eq!(after_repeat.computed, 3);
        assert_eq!(after_repeat.cache_hits, 2);
    }

    #[test]
    fn test_cache_distinguishes_identical_instances() {
        let merger = Merger::default();
        let a = text_div("x");
        let b = text_div("x");
        let c = text_div("x");

        merger.merge(&a, &b);
        merger.merge(&a, &c);

        assert_eq!(merger.stats().cache_hits, 0);
        assert_eq!(merger.stats().cached_pairs, 4);
    }

    #[test]
    fn test_clear_cache() {
        let merger = Merger::default();
        let (a, b) = (text_div("x"), text_div("y"));

        merger.merge(&a, &b);
        merger.clear_cache();
        assert_eq!(merger.stats().cached_pairs, 0);

        merger.merge(&a, &b);
        assert_eq!(merger.stats().computed, 4);
    }
}
