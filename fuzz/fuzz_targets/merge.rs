#![no_main]

use arbitrary::Arbitrary;
use domc_core::{Alignment, MergeOptions, Merger, Node, TailCost};
use libfuzzer_sys::fuzz_target;

const TAGS: [&str; 4] = ["DIV", "P", "SPAN", "UL"];

#[derive(Debug, Clone, Arbitrary)]
enum Tree {
    Text(String),
    Element(u8, Vec<Tree>),
}

impl Tree {
    fn to_node(&self, depth: usize) -> Node {
        match self {
            Tree::Text(text) => Node::text_node(text.clone()),
            Tree::Element(tag, _) if depth == 0 => Node::element(TAGS[*tag as usize % TAGS.len()], []),
            Tree::Element(tag, children) => Node::element(
                TAGS[*tag as usize % TAGS.len()],
                children.iter().map(|child| child.to_node(depth - 1)),
            ),
        }
    }
}

#[derive(Debug, Clone, Arbitrary)]
struct Context {
    a: Tree,
    b: Tree,
    legacy: bool,
    edit_distance: bool,
}

fuzz_target!(|context: Context| {
    let a = context.a.to_node(16);
    let b = context.b.to_node(16);
    let options = MergeOptions {
        tail_cost: if context.legacy {
            TailCost::Legacy
        } else {
            TailCost::Unmatched
        },
        alignment: if context.edit_distance {
            Alignment::EditDistance
        } else {
            Alignment::Positional
        },
    };

    if context.legacy && !context.edit_distance {
        let merger = Merger::new(options);
        assert_eq!(merger.distance(&a, &b), merger.distance(&b, &a));
        return;
    }

    let forward = Merger::new(options.clone()).distance(&a, &b);
    let backward = Merger::new(options.clone()).distance(&b, &a);

    assert_eq!(forward, backward);
    assert!((0.0..=1.0 + 1e-9).contains(&forward), "distance {forward} out of range");
    assert_eq!(Merger::new(options).distance(&a, &a), 0.0);
});
