use crate::{merge::Merger, node::Node};

/// Scales a raw merge cost by the combined edit weight of both trees.
///
/// Two weightless trees are at distance 0.
pub fn normalize(cost: f64, weight_a: f64, weight_b: f64) -> f64 {
    let total = weight_a + weight_b;
    if total == 0.0 { 0.0 } else { cost / total }
}

impl Merger {
    /// Normalized distance between two trees: 0 for identical trees, 1 when
    /// nothing lines up.
    pub fn distance(&self, a: &Node, b: &Node) -> f64 {
        normalize(self.merge(a, b).cost, a.edit_weight(), b.edit_weight())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{MergeOptions, TailCost};
    use rstest::rstest;

    #[rstest]
    #[case::zero_weight(0.0, 0.0, 0.0, 0.0)]
    #[case::full_cost(200.0, 100.0, 100.0, 1.0)]
    #[case::half(50.0, 60.0, 40.0, 0.5)]
    fn test_normalize(
        #[case] cost: f64,
        #[case] weight_a: f64,
        #[case] weight_b: f64,
        #[case] expected: f64,
    ) {
        assert_eq!(normalize(cost, weight_a, weight_b), expected);
    }

    #[test]
    fn test_identical_trees() {
        let merger = Merger::default();
        let tree = || {
            Node::element(
                "DIV",
                [Node::element("P", [Node::text_node("x")]), Node::text_node("y")],
            )
        };
        let (a, b) = (tree(), tree());

        assert_eq!(merger.distance(&a, &a), 0.0);
        assert_eq!(merger.distance(&a, &b), 0.0);
    }

    #[test]
    fn test_root_mismatch() {
        let merger = Merger::default();
        let div = Node::element("DIV", [Node::text_node("x")]);
        let span = Node::element("SPAN", [Node::text_node("x")]);

        assert_eq!(merger.distance(&div, &span), 1.0);
        assert_eq!(merger.distance(&span, &div), 1.0);
    }

    #[test]
    fn test_single_text_difference_is_small() {
        let merger = Merger::default();
        let a = Node::element("DIV", [Node::text_node("hi")]);
        let b = Node::element("DIV", [Node::text_node("bye")]);

        let distance = merger.distance(&a, &b);

        assert!(distance > 0.0);
        assert!(distance < 0.2);
        assert_eq!(distance, merger.distance(&b, &a));
    }

    #[test]
    fn test_legacy_tail_can_exceed_one() {
        let merger = Merger::new(MergeOptions {
            tail_cost: TailCost::Legacy,
            ..Default::default()
        });
        let long = Node::element("DIV", (0..10).map(|_| Node::element("P", [])));
        let short = Node::element("DIV", [Node::element("P", [])]);

        assert!(merger.distance(&long, &short) > 1.0);
        assert!(Merger::default().distance(&long, &short) <= 1.0);
    }
}
