use serde::Serialize;

use crate::{merge::Merger, node::Node};

/// Default inclusive distance bound for joining a cluster.
pub const CLUSTER_CUTOFF: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterOptions {
    pub cutoff: f64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            cutoff: CLUSTER_CUTOFF,
        }
    }
}

/// A group of pages close to one representative page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster<K> {
    pub representative: K,
    /// Members in input order, representative included.
    pub members: Vec<K>,
}

impl<K> Cluster<K> {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool
    where
        K: PartialEq,
    {
        self.members.contains(key)
    }
}

/// Greedy star clustering of `pages`, taken in the order given.
///
/// The first page not yet clustered becomes a representative, and every other
/// unclustered page within `options.cutoff` of it joins its cluster for good.
/// Members are only ever compared with the representative, so two members of
/// one cluster may be further apart than the cutoff, and a page stays with
/// the first representative it matches even if a later one is closer.
///
/// Every entry of `pages` ends up in exactly one cluster.
pub fn cluster_pages<K, P>(
    merger: &Merger,
    pages: &[(K, P)],
    options: &ClusterOptions,
) -> Vec<Cluster<K>>
where
    K: Clone + Sync,
    P: AsRef<Node> + Sync,
{
    let mut clustered = vec![false; pages.len()];
    let mut clusters = Vec::new();

    while let Some(representative) = clustered.iter().position(|done| !done) {
        clustered[representative] = true;

        let candidates = (representative + 1..pages.len())
            .filter(|&i| !clustered[i])
            .collect::<Vec<_>>();
        let joined = within_cutoff(
            merger,
            pages[representative].1.as_ref(),
            pages,
            &candidates,
            options.cutoff,
        );

        let mut members = Vec::with_capacity(joined.len() + 1);
        members.push(pages[representative].0.clone());
        for i in joined {
            clustered[i] = true;
            members.push(pages[i].0.clone());
        }

        tracing::debug!(
            representative,
            members = members.len(),
            candidates = candidates.len(),
            "cluster formed"
        );

        clusters.push(Cluster {
            representative: pages[representative].0.clone(),
            members,
        });
    }

    clusters
}

#[cfg(feature = "parallel")]
fn within_cutoff<K, P>(
    merger: &Merger,
    representative: &Node,
    pages: &[(K, P)],
    candidates: &[usize],
    cutoff: f64,
) -> Vec<usize>
where
    K: Sync,
    P: AsRef<Node> + Sync,
{
    use rayon::prelude::*;

    candidates
        .par_iter()
        .copied()
        .filter(|&i| merger.distance(representative, pages[i].1.as_ref()) <= cutoff)
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn within_cutoff<K, P>(
    merger: &Merger,
    representative: &Node,
    pages: &[(K, P)],
    candidates: &[usize],
    cutoff: f64,
) -> Vec<usize>
where
    P: AsRef<Node>,
{
    candidates
        .iter()
        .copied()
        .filter(|&i| merger.distance(representative, pages[i].1.as_ref()) <= cutoff)
        .collect()
}
