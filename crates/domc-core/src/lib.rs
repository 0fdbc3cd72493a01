//! # domc-core: structural similarity and clustering of HTML DOM trees
//!
//! This crate measures how alike two DOM trees are by aligning them node by
//! node, and uses that measure to group crawled pages that share a layout.
//!
//! ## Features
//!
//! - **Merge**: align two trees positionally, producing a merged tree with
//!   filler nodes where they disagree, plus an edit cost
//! - **Alignment modes**: pair children by index, or along the cheapest
//!   sequence of insertions, deletions and substitutions
//! - **Distance**: normalize the edit cost into `[0, 1]`
//! - **Clustering**: greedy star clustering of pages under a distance cutoff
//! - **Pairwise report**: every pairwise distance, closest first
//! - **Templates**: fold a group of pages into one merged skeleton
//! - **Corpus loading**: read line-delimited JSON page records
//!
//! Differences near the root weigh more than deep ones: every level damps
//! costs by `1/e`, and element edits cost 100 times more than text edits.
//!
//! ## Quick Start
//!
//! ### Distance between two trees
//!
//! ```rust
//! use domc_core::{Merger, Node};
//!
//! let a = Node::element("DIV", [Node::text_node("hello")]);
//! let b = Node::element("DIV", [Node::text_node("world")]);
//! let c = Node::element("SPAN", []);
//!
//! let merger = Merger::default();
//! assert!(merger.distance(&a, &b) < 0.2);
//! assert_eq!(merger.distance(&a, &c), 1.0);
//! ```
//!
//! ### Clustering pages
//!
//! ```rust
//! use domc_core::{ClusterOptions, Merger, Node, cluster_pages};
//!
//! let pages = vec![
//!     ("/a", Node::element("DIV", [Node::text_node("one")])),
//!     ("/b", Node::element("DIV", [Node::text_node("two")])),
//!     ("/c", Node::element("TABLE", [])),
//! ];
//!
//! let merger = Merger::default();
//! let clusters = cluster_pages(&merger, &pages, &ClusterOptions::default());
//!
//! assert_eq!(clusters.len(), 2);
//! assert_eq!(clusters[0].members, vec!["/a", "/b"]);
//! ```
//!
//! ### Loading a corpus
//!
//! ```rust
//! use domc_core::read_corpus;
//!
//! let input = r##"{"url": "/a", "dom": {"nodeName": "DIV", "children": [{"nodeName": "#text", "text": "hi"}]}}"##;
//! let pages = read_corpus(input.as_bytes()).unwrap();
//!
//! assert_eq!(pages[0].url, "/a");
//! assert_eq!(pages[0].dom.children()[0].text(), Some("hi"));
//! ```
//!
//! ## Cargo features
//!
//! - `parallel` (default): compute cluster and pairwise distances on the
//!   rayon thread pool. The merge cache is shared between threads.
mod cluster;
mod corpus;
mod distance;
mod merge;
mod node;
mod pairwise;
mod template;

pub use cluster::{CLUSTER_CUTOFF, Cluster, ClusterOptions, cluster_pages};
pub use corpus::{
    CorpusError, CorpusOptions, MAX_DOM_DEPTH, Page, load_corpus, load_corpus_with, read_corpus,
    read_corpus_with,
};
pub use distance::normalize;
pub use merge::{Alignment, MergeOptions, MergeStats, Merged, Merger, TailCost};
pub use node::{
    Attrs, DOM_FILLER_NAME, Descendants, DomRecord, ELEMENT_NODE_COST, FillerKind, LEVEL_DAMPING,
    Node, NodeId, TEXT_NODE_COST, TEXT_NODE_NAME,
};
pub use pairwise::{PairDistance, pairwise_distances};
pub use template::{TEMPLATE_CUTOFF, Template, build_template};
