use std::sync::Arc;

use crate::{distance::normalize, merge::Merger, node::Node};

/// Default exclusive distance bound for folding a page into a template.
pub const TEMPLATE_CUTOFF: f64 = 0.3;

/// The merged skeleton shared by a group of pages.
///
/// Positions where the absorbed pages disagree hold filler nodes.
#[derive(Debug, Clone)]
pub struct Template {
    node: Arc<Node>,
    pages: usize,
}

impl Template {
    pub fn new(page: &Node) -> Self {
        Self {
            node: Arc::new(page.shallow_copy()),
            pages: 1,
        }
    }

    /// Folds `page` into the template if it is closer than `cutoff`.
    ///
    /// Returns whether the page was absorbed; a rejected page leaves the
    /// template untouched.
    pub fn absorb(&mut self, merger: &Merger, page: &Node, cutoff: f64) -> bool {
        let merged = merger.merge(&self.node, page);
        let distance = normalize(merged.cost, self.node.edit_weight(), page.edit_weight());

        if distance < cutoff {
            self.node = merged.node;
            self.pages += 1;
            true
        } else {
            tracing::trace!(distance, cutoff, "page rejected by template");
            false
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Number of pages folded in so far, the first one included.
    pub fn pages(&self) -> usize {
        self.pages
    }
}

/// Builds a template from the first page and absorbs the rest in order.
pub fn build_template<'a>(
    merger: &Merger,
    pages: impl IntoIterator<Item = &'a Node>,
    cutoff: f64,
) -> Option<Template> {
    let mut pages = pages.into_iter();
    let mut template = Template::new(pages.next()?);

    for page in pages {
        template.absorb(merger, page, cutoff);
    }

    Some(template)
}
