//! Random forest of CART trees (Gini impurity) with bootstrap bagging and
//! random feature subsets per split.
use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::reference::ReferenceSet;
use super::{Classifier, Model};
use crate::core::params::ForestParams;
use crate::error::{Error, Result};
use crate::types::OutputMode;

#[derive(Debug, Clone, Copy)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    Leaf {
        class: usize,
    },
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Index into the model's class list.
    fn predict(&self, row: &[f32]) -> usize {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { class } => return class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

fn majority(counts: &[usize]) -> usize {
    // Ties resolve to the lowest class index.
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    best
}

struct SplitChoice {
    feature: usize,
    threshold: f32,
    impurity: f64,
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f32>],
    labels: &'a [usize],
    n_classes: usize,
    mtry: usize,
    min_leaf: usize,
    max_nodes: Option<usize>,
}

impl TreeBuilder<'_> {
    fn counts(&self, samples: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &s in samples {
            counts[self.labels[s]] += 1;
        }
        counts
    }

    fn best_split(&self, samples: &[usize], rng: &mut StdRng) -> Option<SplitChoice> {
        let n_features = self.rows[0].len();
        let n = samples.len();
        let parent = gini(&self.counts(samples), n);
        let mut best: Option<SplitChoice> = None;

        for feature in sample(rng, n_features, self.mtry).into_iter() {
            let mut values: Vec<(f32, usize)> = samples
                .iter()
                .map(|&s| (self.rows[s][feature], self.labels[s]))
                .collect();
            values.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = vec![0usize; self.n_classes];
            let mut right = self.counts(samples);
            for i in 0..n - 1 {
                let (v, class) = values[i];
                left[class] += 1;
                right[class] -= 1;
                let next = values[i + 1].0;
                if v == next {
                    continue;
                }
                let n_left = i + 1;
                let n_right = n - n_left;
                if n_left < self.min_leaf || n_right < self.min_leaf {
                    continue;
                }
                let impurity = (n_left as f64 * gini(&left, n_left)
                    + n_right as f64 * gini(&right, n_right))
                    / n as f64;
                if impurity < parent - 1e-12 && best.as_ref().is_none_or(|b| impurity < b.impurity) {
                    best = Some(SplitChoice {
                        feature,
                        threshold: v + (next - v) / 2.0,
                        impurity,
                    });
                }
            }
        }
        best
    }

    fn build(&self, bag: Vec<usize>, rng: &mut StdRng) -> DecisionTree {
        let mut nodes = vec![Node::Leaf { class: 0 }];
        let mut queue = VecDeque::from([(0usize, bag)]);

        while let Some((id, samples)) = queue.pop_front() {
            let counts = self.counts(&samples);
            let class = majority(&counts);
            let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
            let room = self.max_nodes.is_none_or(|m| nodes.len() + 2 <= m);

            if !pure && room && samples.len() >= 2 * self.min_leaf {
                if let Some(split) = self.best_split(&samples, rng) {
                    let (l, r): (Vec<usize>, Vec<usize>) = samples
                        .iter()
                        .partition(|&&s| self.rows[s][split.feature] <= split.threshold);
                    let left = nodes.len();
                    let right = left + 1;
                    nodes.push(Node::Leaf { class });
                    nodes.push(Node::Leaf { class });
                    nodes[id] = Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left,
                        right,
                    };
                    queue.push_back((left, l));
                    queue.push_back((right, r));
                    continue;
                }
            }
            nodes[id] = Node::Leaf { class };
        }
        DecisionTree { nodes }
    }
}

/// Random forest trainer. The output mode decides what the trained model emits.
#[derive(Debug, Clone)]
pub struct RandomForest {
    pub params: ForestParams,
    pub mode: OutputMode,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            mode: OutputMode::Raw,
        }
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Classifier for RandomForest {
    type Model = RandomForestModel;

    fn train(&self, data: &ReferenceSet, label: &str, features: &[String]) -> Result<RandomForestModel> {
        if features.is_empty() {
            return Err(Error::InvalidArgument {
                arg: "features",
                value: "[]".to_string(),
            });
        }
        let mut rows = Vec::with_capacity(data.len());
        let mut raw_labels = Vec::with_capacity(data.len());
        let mut skipped = 0usize;
        for p in &data.points {
            match (p.feature_row(features), p.label(label)) {
                (Some(row), Some(l)) => {
                    rows.push(row);
                    raw_labels.push(l);
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!("Skipped {} training rows with missing `{}` or features", skipped, label);
        }
        if rows.is_empty() {
            return Err(Error::EmptyInput("no usable training rows".to_string()));
        }

        let mut classes = raw_labels.clone();
        classes.sort_unstable();
        classes.dedup();
        if self.mode == OutputMode::Probability && classes.iter().any(|c| !matches!(c, 0 | 1)) {
            return Err(Error::InvalidArgument {
                arg: "label",
                value: format!("probability mode needs binary labels, found {:?}", classes),
            });
        }
        let labels: Vec<usize> = raw_labels
            .iter()
            .map(|l| classes.binary_search(l).unwrap_or_default())
            .collect();

        let n = rows.len();
        let n_features = features.len();
        let mtry = self
            .params
            .variables_per_split
            .unwrap_or(((n_features as f64).sqrt().floor()) as usize)
            .clamp(1, n_features);
        let bag_size = ((n as f64 * self.params.bag_fraction).ceil() as usize).max(1);
        info!(
            "Training {} trees ({} mode) on {} rows, {} features, {} classes, mtry={}, bag={}",
            self.params.number_of_trees,
            self.mode,
            n,
            n_features,
            classes.len(),
            mtry,
            bag_size
        );

        let mut master = match self.params.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let seeds: Vec<u64> = (0..self.params.number_of_trees)
            .map(|_| master.r#gen())
            .collect();

        let builder = TreeBuilder {
            rows: &rows,
            labels: &labels,
            n_classes: classes.len(),
            mtry,
            min_leaf: self.params.min_leaf_population,
            max_nodes: self.params.max_nodes,
        };
        let grown: Vec<(DecisionTree, Vec<bool>)> = seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut in_bag = vec![false; n];
                let bag: Vec<usize> = (0..bag_size)
                    .map(|_| {
                        let i = rng.gen_range(0..n);
                        in_bag[i] = true;
                        i
                    })
                    .collect();
                (builder.build(bag, &mut rng), in_bag)
            })
            .collect();

        let oob_error = out_of_bag_error(&grown, &rows, &labels, classes.len());
        let trees: Vec<DecisionTree> = grown.into_iter().map(|(t, _)| t).collect();
        debug!(
            "Forest grown: {} nodes total, out-of-bag error {:?}",
            trees.iter().map(DecisionTree::node_count).sum::<usize>(),
            oob_error
        );

        Ok(RandomForestModel {
            features: features.to_vec(),
            classes,
            mode: self.mode,
            trees,
            oob_error,
        })
    }
}

fn out_of_bag_error(
    grown: &[(DecisionTree, Vec<bool>)],
    rows: &[Vec<f32>],
    labels: &[usize],
    n_classes: usize,
) -> Option<f64> {
    let mut evaluated = 0usize;
    let mut wrong = 0usize;
    for (i, row) in rows.iter().enumerate() {
        let mut votes = vec![0usize; n_classes];
        for (tree, in_bag) in grown {
            if !in_bag[i] {
                votes[tree.predict(row)] += 1;
            }
        }
        if votes.iter().sum::<usize>() == 0 {
            continue;
        }
        evaluated += 1;
        if majority(&votes) != labels[i] {
            wrong += 1;
        }
    }
    (evaluated > 0).then(|| wrong as f64 / evaluated as f64)
}

/// Trained forest. Raw mode predicts the majority-vote class; probability mode
/// predicts the fraction of trees voting for class 1.
#[derive(Debug, Clone)]
pub struct RandomForestModel {
    features: Vec<String>,
    classes: Vec<i64>,
    mode: OutputMode,
    trees: Vec<DecisionTree>,
    oob_error: Option<f64>,
}

impl RandomForestModel {
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Out-of-bag misclassification rate, if any row was out of bag.
    pub fn oob_error(&self) -> Option<f64> {
        self.oob_error
    }

    fn votes(&self, row: &[f32]) -> Vec<usize> {
        let mut votes = vec![0usize; self.classes.len()];
        for tree in &self.trees {
            votes[tree.predict(row)] += 1;
        }
        votes
    }
}

impl Model for RandomForestModel {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn feature_names(&self) -> &[String] {
        &self.features
    }

    fn predict(&self, row: &[f32]) -> f32 {
        if row.len() != self.features.len() || row.iter().any(|v| v.is_nan()) {
            return f32::NAN;
        }
        let votes = self.votes(row);
        match self.mode {
            OutputMode::Raw => self.classes[majority(&votes)] as f32,
            OutputMode::Probability => match self.classes.iter().position(|&c| c == 1) {
                Some(pos) => votes[pos] as f32 / self.trees.len() as f32,
                None => 0.0,
            },
        }
    }
}
