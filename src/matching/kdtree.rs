//! Randomized kd-tree forest for approximate nearest-neighbour search.
//!
//! Every tree splits on a dimension drawn at random from the few with the
//! highest variance, at the mean of that dimension. A query descends all
//! trees once and then keeps expanding the closest unexplored branches from
//! a shared priority queue until `checks` points have been examined.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::features::{Descriptors, l2_distance_squared};

const SAMPLE_MEAN: usize = 100;
const RAND_DIM: usize = 5;

#[derive(Debug, Clone)]
enum Node {
    Leaf(usize),
    Split {
        dim: usize,
        value: f32,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct KdTree {
    nodes: Vec<Node>,
    root: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Branch {
    bound: f32,
    tree: usize,
    node: usize,
}

impl Eq for Branch {}

impl PartialOrd for Branch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Branch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bound
            .total_cmp(&other.bound)
            .then(self.tree.cmp(&other.tree))
            .then(self.node.cmp(&other.node))
    }
}

pub struct KdForest<'a> {
    data: &'a Descriptors,
    trees: Vec<KdTree>,
}

impl<'a> KdForest<'a> {
    pub fn build(data: &'a Descriptors, trees: usize, seed: u64) -> KdForest<'a> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let trees = if data.is_empty() {
            Vec::new()
        } else {
            (0..trees.max(1))
                .map(|_| {
                    let mut indices: Vec<usize> = (0..data.len()).collect();
                    let mut nodes = Vec::with_capacity(2 * data.len());
                    let root = build_node(data, &mut indices, &mut nodes, &mut rng);
                    KdTree { nodes, root }
                })
                .collect()
        };
        KdForest { data, trees }
    }

    /// Up to `k` approximate nearest neighbours as `(index, squared distance)`,
    /// closest first.
    pub fn knn(&self, query: &[f32], k: usize, checks: usize) -> Vec<(usize, f32)> {
        if k == 0 {
            return Vec::new();
        }
        let mut search = Search {
            query,
            k,
            results: Vec::with_capacity(k + 1),
            visited: vec![false; self.data.len()],
            heap: BinaryHeap::new(),
            checks_done: 0,
        };
        for (t, tree) in self.trees.iter().enumerate() {
            self.descend(&mut search, t, tree.root);
        }
        while let Some(Reverse(branch)) = search.heap.pop() {
            let full = search.results.len() == k;
            if full && search.checks_done >= checks {
                break;
            }
            if full && branch.bound > search.worst() {
                break;
            }
            self.descend(&mut search, branch.tree, branch.node);
        }
        search.results
    }

    fn descend(&self, search: &mut Search, tree: usize, mut node: usize) {
        let nodes = &self.trees[tree].nodes;
        loop {
            match nodes[node] {
                Node::Leaf(point) => {
                    if !search.visited[point] {
                        search.visited[point] = true;
                        search.checks_done += 1;
                        let d = l2_distance_squared(search.query, self.data.row(point));
                        search.insert(point, d);
                    }
                    return;
                }
                Node::Split {
                    dim,
                    value,
                    left,
                    right,
                } => {
                    let diff = search.query[dim] - value;
                    let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };
                    search.heap.push(Reverse(Branch {
                        bound: diff * diff,
                        tree,
                        node: far,
                    }));
                    node = near;
                }
            }
        }
    }
}

struct Search<'q> {
    query: &'q [f32],
    k: usize,
    results: Vec<(usize, f32)>,
    visited: Vec<bool>,
    heap: BinaryHeap<Reverse<Branch>>,
    checks_done: usize,
}

impl Search<'_> {
    fn worst(&self) -> f32 {
        self.results.last().map(|r| r.1).unwrap_or(f32::INFINITY)
    }

    fn insert(&mut self, index: usize, dist: f32) {
        if self.results.len() == self.k && dist >= self.worst() {
            return;
        }
        let pos = self
            .results
            .iter()
            .position(|r| dist < r.1)
            .unwrap_or(self.results.len());
        self.results.insert(pos, (index, dist));
        self.results.truncate(self.k);
    }
}

fn build_node(
    data: &Descriptors,
    indices: &mut [usize],
    nodes: &mut Vec<Node>,
    rng: &mut ChaCha8Rng,
) -> usize {
    if indices.len() == 1 {
        nodes.push(Node::Leaf(indices[0]));
        return nodes.len() - 1;
    }
    let (dim, value) = choose_split(data, indices, rng);

    let mut split = partition(data, indices, dim, value);
    if split == 0 || split == indices.len() {
        split = indices.len() / 2;
    }

    let (lhs, rhs) = indices.split_at_mut(split);
    let left = build_node(data, lhs, nodes, rng);
    let right = build_node(data, rhs, nodes, rng);
    nodes.push(Node::Split {
        dim,
        value,
        left,
        right,
    });
    nodes.len() - 1
}

fn choose_split(data: &Descriptors, indices: &[usize], rng: &mut ChaCha8Rng) -> (usize, f32) {
    let dim = data.dim();
    let sample = &indices[..indices.len().min(SAMPLE_MEAN)];
    let n = sample.len() as f32;

    let mut mean = vec![0.0f32; dim];
    for &i in sample {
        for (m, v) in mean.iter_mut().zip(data.row(i)) {
            *m += v;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);

    let mut var = vec![0.0f32; dim];
    for &i in sample {
        for ((s, v), m) in var.iter_mut().zip(data.row(i)).zip(&mean) {
            *s += (v - m) * (v - m);
        }
    }

    let mut order: Vec<usize> = (0..dim).collect();
    order.sort_by(|&a, &b| var[b].total_cmp(&var[a]).then(a.cmp(&b)));
    let top = RAND_DIM.min(dim);
    let pick = order[rng.random_range(0..top)];
    (pick, mean[pick])
}

/// Moves everything below `value` on `dim` to the front; returns the split point.
fn partition(data: &Descriptors, indices: &mut [usize], dim: usize, value: f32) -> usize {
    let mut store = 0;
    for i in 0..indices.len() {
        if data.row(indices[i])[dim] < value {
            indices.swap(store, i);
            store += 1;
        }
    }
    store
}
