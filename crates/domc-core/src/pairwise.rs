use itertools::Itertools;
use serde::Serialize;

use crate::{merge::Merger, node::Node};

/// Distance between the pages at positions `i` and `j` (`i < j`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PairDistance {
    pub i: usize,
    pub j: usize,
    pub distance: f64,
}

/// Distance of every unordered pair of `pages`, closest pairs first.
///
/// Pairs at equal distance keep their `(i, j)` order.
pub fn pairwise_distances<P>(merger: &Merger, pages: &[P]) -> Vec<PairDistance>
where
    P: AsRef<Node> + Sync,
{
    let pairs = (0..pages.len())
        .tuple_combinations::<(usize, usize)>()
        .collect::<Vec<_>>();
    let mut report = measure(merger, pages, &pairs);

    report.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    tracing::debug!(pairs = report.len(), "pairwise distances computed");
    report
}

#[cfg(feature = "parallel")]
fn measure<P>(merger: &Merger, pages: &[P], pairs: &[(usize, usize)]) -> Vec<PairDistance>
where
    P: AsRef<Node> + Sync,
{
    use rayon::prelude::*;

    pairs
        .par_iter()
        .map(|&(i, j)| PairDistance {
            i,
            j,
            distance: merger.distance(pages[i].as_ref(), pages[j].as_ref()),
        })
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn measure<P>(merger: &Merger, pages: &[P], pairs: &[(usize, usize)]) -> Vec<PairDistance>
where
    P: AsRef<Node>,
{
    pairs
        .iter()
        .map(|&(i, j)| PairDistance {
            i,
            j,
            distance: merger.distance(pages[i].as_ref(), pages[j].as_ref()),
        })
        .collect()
}
