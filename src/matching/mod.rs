pub mod kdtree;

use rayon::prelude::*;

use crate::config::{MatcherConfig, MatcherKind};
use crate::features::{Descriptors, l2_distance_squared};

pub use kdtree::KdForest;

/// One template descriptor paired with one frame descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DMatch {
    /// Row in the query (template) descriptors.
    pub query_idx: usize,
    /// Row in the train (frame) descriptors.
    pub train_idx: usize,
    /// Euclidean descriptor distance.
    pub distance: f32,
}

impl DMatch {
    pub fn new(query_idx: usize, train_idx: usize, distance: f32) -> DMatch {
        DMatch {
            query_idx,
            train_idx,
            distance,
        }
    }
}

pub trait Matcher: Sync {
    /// For every query row, up to `k` train rows ordered by distance.
    fn knn_match(&self, query: &Descriptors, train: &Descriptors, k: usize) -> Vec<Vec<DMatch>>;
}

/// Exact search over every train descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceMatcher;

impl Matcher for BruteForceMatcher {
    fn knn_match(&self, query: &Descriptors, train: &Descriptors, k: usize) -> Vec<Vec<DMatch>> {
        if query.is_empty() || train.is_empty() {
            return Vec::new();
        }
        (0..query.len())
            .into_par_iter()
            .map(|qi| {
                let q = query.row(qi);
                let mut all: Vec<(usize, f32)> = train
                    .rows()
                    .enumerate()
                    .map(|(ti, t)| (ti, l2_distance_squared(q, t)))
                    .collect();
                all.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
                all.into_iter()
                    .take(k)
                    .map(|(ti, d)| DMatch::new(qi, ti, d.sqrt()))
                    .collect()
            })
            .collect()
    }
}

/// Approximate search through a randomized kd-tree forest built per call
/// over the train set.
#[derive(Debug, Clone)]
pub struct KdForestMatcher {
    pub trees: usize,
    pub checks: usize,
    pub seed: u64,
}

impl Default for KdForestMatcher {
    fn default() -> Self {
        Self {
            trees: 5,
            checks: 50,
            seed: 0,
        }
    }
}

impl Matcher for KdForestMatcher {
    fn knn_match(&self, query: &Descriptors, train: &Descriptors, k: usize) -> Vec<Vec<DMatch>> {
        if query.is_empty() || train.is_empty() {
            return Vec::new();
        }
        let forest = KdForest::build(train, self.trees, self.seed);
        (0..query.len())
            .into_par_iter()
            .map(|qi| {
                forest
                    .knn(query.row(qi), k, self.checks)
                    .into_iter()
                    .map(|(ti, d)| DMatch::new(qi, ti, d.sqrt()))
                    .collect()
            })
            .collect()
    }
}

pub fn build_matcher(config: &MatcherConfig) -> Box<dyn Matcher> {
    match config.kind {
        MatcherKind::KdForest => Box::new(KdForestMatcher {
            trees: config.trees,
            checks: config.checks,
            seed: config.seed,
        }),
        MatcherKind::BruteForce => Box::new(BruteForceMatcher),
    }
}

/// Lowe's criterion: the best candidate must be clearly closer than the runner-up.
#[inline]
pub fn passes_ratio(best: f32, second: f32, ratio: f32) -> bool {
    best < ratio * second
}

/// Keeps the best candidate of every query whose two nearest neighbours pass
/// [`passes_ratio`]. Queries with fewer than two candidates are dropped.
pub fn ratio_test(knn: &[Vec<DMatch>], ratio: f32) -> Vec<DMatch> {
    knn.iter()
        .filter_map(|candidates| match candidates.as_slice() {
            [best, second, ..] if passes_ratio(best.distance, second.distance, ratio) => {
                Some(*best)
            }
            _ => None,
        })
        .collect()
}
