//! Least-squares regression trees grown best-first.

use ndarray::ArrayView2;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted regression tree. Samples with `x[feature] <= threshold` go left.
#[derive(Debug, Clone)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_leaf_nodes: usize,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// A leaf waiting to be split: its node index, member rows and best split.
struct OpenLeaf {
    node: usize,
    members: Vec<usize>,
    best: Option<SplitCandidate>,
}

/// Best variance-reducing split of `members`, if any beats zero gain.
fn best_split(
    x: ArrayView2<'_, f64>,
    target: &[f64],
    members: &[usize],
    min_leaf: usize,
) -> Option<SplitCandidate> {
    let n = members.len();
    if n < 2 * min_leaf {
        return None;
    }
    let total: f64 = members.iter().map(|&i| target[i]).sum();
    let parent_score = total * total / n as f64;

    let mut best: Option<SplitCandidate> = None;
    let mut order = members.to_vec();
    for feature in 0..x.ncols() {
        order.sort_unstable_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let mut left_sum = 0.0;
        for k in 0..n - 1 {
            left_sum += target[order[k]];
            let n_left = k + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }
            let (v, next) = (x[[order[k], feature]], x[[order[k + 1], feature]]);
            if v == next {
                continue;
            }
            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64
                - parent_score;
            if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (v + next) / 2.0,
                    gain,
                });
            }
        }
    }
    best
}

impl RegressionTree {
    /// Fit on rows `members` of `x` against `target`, splitting the open leaf
    /// with the largest gain until `max_leaf_nodes` leaves exist or no split
    /// improves the fit. Leaf outputs come from `leaf_value(members)`.
    pub(crate) fn fit<F>(
        x: ArrayView2<'_, f64>,
        target: &[f64],
        members: Vec<usize>,
        params: TreeParams,
        leaf_value: F,
    ) -> Self
    where
        F: Fn(&[usize]) -> f64,
    {
        let min_leaf = params.min_samples_leaf.max(1);
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let best = best_split(x, target, &members, min_leaf);
        let mut open = vec![OpenLeaf {
            node: 0,
            members,
            best,
        }];
        let mut leaves = 1;

        while leaves < params.max_leaf_nodes.max(1) {
            let pick = open
                .iter()
                .enumerate()
                .filter_map(|(i, leaf)| leaf.best.map(|b| (i, b.gain)))
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i);
            let Some(pick) = pick else { break };

            let leaf = open.swap_remove(pick);
            let Some(split) = leaf.best else { break };
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                .members
                .iter()
                .copied()
                .partition(|&i| x[[i, split.feature]] <= split.threshold);

            let left = nodes.len();
            nodes.push(Node::Leaf { value: 0.0 });
            let right = nodes.len();
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[leaf.node] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
            leaves += 1;

            for (node, rows) in [(left, left_rows), (right, right_rows)] {
                let best = best_split(x, target, &rows, min_leaf);
                open.push(OpenLeaf {
                    node,
                    members: rows,
                    best,
                });
            }
        }

        for leaf in &open {
            nodes[leaf.node] = Node::Leaf {
                value: leaf_value(&leaf.members),
            };
        }
        Self { nodes }
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Multiply every leaf output by `factor`.
    pub(crate) fn scale(&mut self, factor: f64) {
        for node in &mut self.nodes {
            if let Node::Leaf { value } = node {
                *value *= factor;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn mean(target: &[f64]) -> impl Fn(&[usize]) -> f64 + '_ {
        move |rows: &[usize]| rows.iter().map(|&i| target[i]).sum::<f64>() / rows.len() as f64
    }

    #[test]
    fn step_function_is_learned() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = [0.0, 0.0, 0.0, 5.0, 5.0, 5.0];
        let params = TreeParams {
            max_leaf_nodes: 4,
            min_samples_leaf: 1,
        };
        let tree = RegressionTree::fit(x.view(), &y, (0..6).collect(), params, mean(&y));
        assert_eq!(tree.leaf_count(), 2);
        assert_abs_diff_eq!(tree.predict(&[2.5]), 0.0);
        assert_abs_diff_eq!(tree.predict(&[9.0]), 5.0);
    }

    #[test]
    fn leaf_budget_is_respected() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0]];
        let y = [0.0, 1.0, 4.0, 9.0, 16.0, 25.0, 36.0, 49.0];
        let params = TreeParams {
            max_leaf_nodes: 3,
            min_samples_leaf: 1,
        };
        let tree = RegressionTree::fit(x.view(), &y, (0..8).collect(), params, mean(&y));
        assert_eq!(tree.leaf_count(), 3);
    }

    #[test]
    fn second_feature_used_when_it_separates() {
        let x = array![[1.0, 0.0], [1.0, 0.1], [1.0, 0.9], [1.0, 1.0]];
        let y = [-1.0, -1.0, 1.0, 1.0];
        let params = TreeParams {
            max_leaf_nodes: 8,
            min_samples_leaf: 1,
        };
        let tree = RegressionTree::fit(x.view(), &y, (0..4).collect(), params, mean(&y));
        assert_abs_diff_eq!(tree.predict(&[1.0, 0.2]), -1.0);
        assert_abs_diff_eq!(tree.predict(&[1.0, 0.8]), 1.0);
    }

    #[test]
    fn constant_target_stays_a_stump() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = [2.0, 2.0, 2.0];
        let params = TreeParams {
            max_leaf_nodes: 32,
            min_samples_leaf: 1,
        };
        let tree = RegressionTree::fit(x.view(), &y, (0..3).collect(), params, mean(&y));
        assert_eq!(tree.leaf_count(), 1);
        assert_abs_diff_eq!(tree.predict(&[100.0]), 2.0);
    }
}
