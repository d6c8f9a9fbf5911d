//! Fixed-depth prefix-tree template miner.
//!
//! Token sequences are bucketed by length at the first tree level, then
//! routed through up to `depth - 2` literal-or-wildcard edges; leaves hold a
//! flat bucket of clusters scanned by positional similarity. Nodes live in
//! an arena indexed by `usize`, with edges as ordered maps so removal and
//! traversal stay deterministic.

use std::collections::BTreeMap;

use crate::miner::{AddOutcome, LogCluster, TemplateMiner};

/// Reserved token standing for "any value here".
pub const WILDCARD: &str = "<*>";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum EdgeKey {
    /// First-level bucket: token count of the sequence.
    Length(usize),
    /// Literal token edge.
    Token(String),
    /// The overflow/digit edge all variable tokens route through.
    Wildcard,
}

#[derive(Debug, Default)]
struct TreeNode {
    children: BTreeMap<EdgeKey, usize>,
    /// Cluster bucket; populated only at terminal nodes.
    clusters: Vec<usize>,
}

pub struct DrainMiner {
    /// Internal token levels below the length bucket (`depth - 2`).
    depth: usize,
    st: f64,
    max_child: usize,
    nodes: Vec<TreeNode>,
    clusters: Vec<LogCluster>,
}

fn has_digit(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
}

impl DrainMiner {
    pub fn new(depth: usize, st: f64, max_child: usize) -> Self {
        Self {
            depth: depth.saturating_sub(2),
            st,
            max_child,
            nodes: vec![TreeNode::default()],
            clusters: Vec::new(),
        }
    }

    fn push_node(&mut self) -> usize {
        self.nodes.push(TreeNode::default());
        self.nodes.len() - 1
    }

    /// Walk the tree for `tokens`, returning the terminal node if every
    /// required edge exists.
    fn tree_search(&self, tokens: &[String]) -> Option<usize> {
        let seq_len = tokens.len();
        let mut node = *self.nodes[0].children.get(&EdgeKey::Length(seq_len))?;

        let mut current_depth = 1;
        for token in tokens {
            if current_depth >= self.depth || current_depth > seq_len {
                break;
            }
            let children = &self.nodes[node].children;
            if let Some(&child) = children.get(&EdgeKey::Token(token.clone())) {
                node = child;
            } else if let Some(&child) = children.get(&EdgeKey::Wildcard) {
                node = child;
            } else {
                return None;
            }
            current_depth += 1;
        }

        Some(node)
    }

    /// `(similarity, wildcard count)` of a template against a same-length
    /// sequence. Wildcard positions never count toward similarity.
    fn seq_dist(template: &[String], tokens: &[String]) -> (f64, usize) {
        let mut sim_tokens = 0;
        let mut num_wildcards = 0;

        for (t, token) in template.iter().zip(tokens) {
            if t == WILDCARD {
                num_wildcards += 1;
                continue;
            }
            if t == token {
                sim_tokens += 1;
            }
        }

        (sim_tokens as f64 / template.len() as f64, num_wildcards)
    }

    /// Scan a leaf bucket for the most similar cluster, preferring the more
    /// general one on ties.
    fn fast_match(&self, bucket: &[usize], tokens: &[String]) -> Option<usize> {
        let mut max_sim = -1.0;
        let mut max_wildcards = 0;
        let mut best = None;

        for &cid in bucket {
            let (sim, wildcards) = Self::seq_dist(&self.clusters[cid].template, tokens);
            if sim > max_sim || (sim == max_sim && wildcards > max_wildcards) {
                max_sim = sim;
                max_wildcards = wildcards;
                best = Some(cid);
            }
        }

        if max_sim >= self.st {
            best
        } else {
            None
        }
    }

    /// Position-wise generalization: keep a literal only where message and
    /// template agree.
    fn rebuild_template(tokens: &[String], template: &[String]) -> Vec<String> {
        tokens
            .iter()
            .zip(template)
            .map(|(token, t)| {
                if token == t {
                    token.clone()
                } else {
                    WILDCARD.to_string()
                }
            })
            .collect()
    }

    fn wildcard_child(&mut self, node: usize) -> usize {
        if let Some(&child) = self.nodes[node].children.get(&EdgeKey::Wildcard) {
            return child;
        }
        let child = self.push_node();
        self.nodes[node].children.insert(EdgeKey::Wildcard, child);
        child
    }

    fn token_child(&mut self, node: usize, token: &str) -> usize {
        let child = self.push_node();
        self.nodes[node]
            .children
            .insert(EdgeKey::Token(token.to_string()), child);
        child
    }

    /// Insert a new cluster along its template's bucket/edge path, attaching
    /// it to the terminal node.
    fn insert_into_tree(&mut self, cid: usize) {
        let template = self.clusters[cid].template.clone();
        let seq_len = template.len();

        let mut node = match self.nodes[0].children.get(&EdgeKey::Length(seq_len)).copied() {
            Some(bucket) => bucket,
            None => {
                let bucket = self.push_node();
                self.nodes[0].children.insert(EdgeKey::Length(seq_len), bucket);
                bucket
            }
        };

        let mut current_depth = 1;
        for token in &template {
            if current_depth >= self.depth || current_depth > seq_len {
                break;
            }

            let existing = self.nodes[node]
                .children
                .get(&EdgeKey::Token(token.clone()))
                .copied();
            node = match existing {
                Some(child) => child,
                None if has_digit(token) => self.wildcard_child(node),
                None => {
                    let child_count = self.nodes[node].children.len();
                    if self.nodes[node].children.contains_key(&EdgeKey::Wildcard) {
                        if child_count < self.max_child {
                            self.token_child(node, token)
                        } else {
                            self.wildcard_child(node)
                        }
                    } else if child_count + 1 < self.max_child {
                        self.token_child(node, token)
                    } else {
                        // One slot left: it becomes the wildcard edge, and
                        // every further overflow routes through it.
                        self.wildcard_child(node)
                    }
                }
            };
            current_depth += 1;
        }

        self.nodes[node].clusters.push(cid);
    }
}

impl TemplateMiner for DrainMiner {
    fn add(&mut self, line_id: usize, tokens: Vec<String>, level: &str) -> AddOutcome {
        let matched = self
            .tree_search(&tokens)
            .and_then(|node| self.fast_match(&self.nodes[node].clusters, &tokens));

        match matched {
            None => {
                let cid = self.clusters.len();
                self.clusters
                    .push(LogCluster::new(tokens, level.to_string(), line_id));
                self.insert_into_tree(cid);
                tracing::debug!(
                    cluster = cid,
                    template = %self.clusters[cid].template_text(),
                    "new cluster"
                );
                AddOutcome::New
            }
            Some(cid) => {
                let rebuilt = Self::rebuild_template(&tokens, &self.clusters[cid].template);
                let cluster = &mut self.clusters[cid];
                cluster.member_ids.push(line_id);
                if rebuilt != cluster.template {
                    cluster.template = rebuilt;
                    cluster.level = level.to_string();
                }
                AddOutcome::Matched
            }
        }
    }

    fn tokenize(&self, content: &str) -> Vec<String> {
        content.split_whitespace().map(str::to_string).collect()
    }

    fn clusters(&self) -> &[LogCluster] {
        &self.clusters
    }

    fn name(&self) -> &'static str {
        "drain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_variable_token_generalizes() {
        let mut miner = DrainMiner::new(4, 0.5, 100);

        let r1 = miner.add(1, toks("Connection timeout after 30 seconds"), "WARN");
        let r2 = miner.add(2, toks("Connection timeout after 45 seconds"), "WARN");

        assert_eq!(r1, AddOutcome::New);
        assert_eq!(r2, AddOutcome::Matched);
        assert_eq!(miner.clusters().len(), 1);

        let cluster = &miner.clusters()[0];
        assert_eq!(cluster.template, toks("Connection timeout after <*> seconds"));
        assert_eq!(cluster.occurrences(), 2);
    }

    #[test]
    fn test_similarity_threshold_boundary() {
        // One token of five differs: sim = 0.8.
        let mut merging = DrainMiner::new(4, 0.8, 100);
        merging.add(1, toks("user alice logged in ok"), "INFO");
        merging.add(2, toks("user bob logged in ok"), "INFO");
        assert_eq!(merging.clusters().len(), 1);

        let mut splitting = DrainMiner::new(4, 0.81, 100);
        splitting.add(1, toks("user alice logged in ok"), "INFO");
        splitting.add(2, toks("user bob logged in ok"), "INFO");
        assert_eq!(splitting.clusters().len(), 2);
    }

    #[test]
    fn test_identical_input_is_idempotent() {
        let mut miner = DrainMiner::new(4, 0.5, 100);
        miner.add(1, toks("service started on port 8080"), "INFO");
        miner.add(2, toks("service started on port 8080"), "INFO");

        assert_eq!(miner.clusters().len(), 1);
        let cluster = &miner.clusters()[0];
        assert_eq!(cluster.template, toks("service started on port 8080"));
        assert_eq!(cluster.occurrences(), 2);
    }

    #[test]
    fn test_membership_is_monotonic() {
        let mut miner = DrainMiner::new(4, 0.5, 100);
        miner.add(1, toks("worker 1 ready"), "INFO");
        miner.add(2, toks("worker 2 ready"), "INFO");
        miner.add(3, toks("totally different message here now"), "INFO");
        miner.add(4, toks("worker 9 ready"), "INFO");

        assert_eq!(miner.clusters()[0].member_ids, vec![1, 2, 4]);
        assert_eq!(miner.clusters()[1].member_ids, vec![3]);
    }

    #[test]
    fn test_wildcards_never_regress() {
        let mut miner = DrainMiner::new(4, 0.5, 100);
        miner.add(1, toks("read block A from disk"), "INFO");
        miner.add(2, toks("read block B from disk"), "INFO");
        assert_eq!(miner.clusters()[0].template, toks("read block <*> from disk"));

        // An exact repeat of the original literal must not bring it back.
        miner.add(3, toks("read block A from disk"), "INFO");
        assert_eq!(miner.clusters()[0].template, toks("read block <*> from disk"));
        assert_eq!(miner.clusters()[0].occurrences(), 3);
    }

    #[test]
    fn test_level_updates_only_on_generalization() {
        let mut miner = DrainMiner::new(4, 0.5, 100);
        miner.add(1, toks("cache miss for key alpha"), "INFO");
        // Exact re-match: template unchanged, level untouched.
        miner.add(2, toks("cache miss for key alpha"), "WARN");
        assert_eq!(miner.clusters()[0].level, "INFO");
        // Generalization event: last writer wins.
        miner.add(3, toks("cache miss for key beta"), "WARN");
        assert_eq!(miner.clusters()[0].level, "WARN");
    }

    #[test]
    fn test_digit_tokens_route_through_wildcard_edge() {
        let mut miner = DrainMiner::new(4, 0.5, 100);
        miner.add(1, toks("1024 bytes written"), "INFO");
        let r = miner.add(2, toks("2048 bytes written"), "INFO");

        assert_eq!(r, AddOutcome::Matched);
        assert_eq!(miner.clusters().len(), 1);
        assert_eq!(miner.clusters()[0].template, toks("<*> bytes written"));
    }

    #[test]
    fn test_max_child_overflow_creates_wildcard_route() {
        // max_child = 2 leaves room for one literal edge; the second
        // distinct token claims the wildcard slot.
        let mut miner = DrainMiner::new(4, 0.5, 2);
        miner.add(1, toks("alpha event fired"), "INFO");
        miner.add(2, toks("beta event fired"), "INFO");
        miner.add(3, toks("gamma event fired"), "INFO");
        assert_eq!(miner.clusters().len(), 2);

        // beta and gamma share the wildcard route and a leaf bucket.
        miner.add(4, toks("gamma event fired"), "INFO");
        assert_eq!(miner.clusters()[1].occurrences(), 3);
    }

    #[test]
    fn test_length_buckets_never_mix() {
        let mut miner = DrainMiner::new(4, 0.1, 100);
        miner.add(1, toks("job done"), "INFO");
        miner.add(2, toks("job done quickly today"), "INFO");
        assert_eq!(miner.clusters().len(), 2);
    }
}
