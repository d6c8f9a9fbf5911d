//! Longest-common-subsequence template miner.
//!
//! Three matchers run in order, each only when the previous found nothing:
//! an exact walk of the literal-token prefix tree, an unordered token-set
//! containment scan, and a full dynamic-programming LCS scan. The prefix
//! tree has unbounded depth and no length buckets; each edge carries a
//! reference count of the clusters routing through it so a stale chain can
//! be removed in O(depth) when a template is rebuilt.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;

use crate::miner::{AddOutcome, LogCluster, TemplateMiner};

/// Reserved token standing for "any value here".
pub const WILDCARD: &str = "*";

#[derive(Debug, Default)]
struct ChainNode {
    children: BTreeMap<String, usize>,
    /// Clusters currently routing through the edge into this node.
    ref_count: usize,
    /// At most one cluster may own a node.
    cluster: Option<usize>,
}

pub struct SpellMiner {
    tau: f64,
    nodes: Vec<ChainNode>,
    clusters: Vec<LogCluster>,
}

impl SpellMiner {
    pub fn new(tau: f64) -> Self {
        Self {
            tau,
            nodes: vec![ChainNode::default()],
            clusters: Vec::new(),
        }
    }

    /// Stage 1: follow literal edges matching successive input tokens; the
    /// first cluster-owning node reached decides, accepting iff its template
    /// keeps enough literal tokens relative to the input length. A node
    /// without a cluster is descended into and the walk never backtracks out
    /// of it.
    fn prefix_tree_match(&self, seq: &[String]) -> Option<usize> {
        let length = seq.len();
        let mut node = 0;
        let mut idx = 0;

        loop {
            let mut descended = false;
            for i in idx..length {
                let Some(&child) = self.nodes[node].children.get(&seq[i]) else {
                    continue;
                };
                if let Some(cid) = self.nodes[child].cluster {
                    let const_count = self.clusters[cid]
                        .template
                        .iter()
                        .filter(|w| *w != WILDCARD)
                        .count();
                    if const_count as f64 >= self.tau * length as f64 {
                        return Some(cid);
                    }
                    // Too generalized for this input; keep scanning later
                    // tokens from the same node.
                } else {
                    node = child;
                    idx = i + 1;
                    descended = true;
                    break;
                }
            }
            if !descended {
                return None;
            }
        }
    }

    /// Stage 2: unordered containment of every literal template token in the
    /// input token sequence, first hit in registry order wins. Deliberately
    /// not an ordered subsequence test.
    fn simple_loop_match(&self, seq: &[String]) -> Option<usize> {
        for (cid, cluster) in self.clusters.iter().enumerate() {
            if (cluster.template.len() as f64) < 0.5 * seq.len() as f64 {
                continue;
            }
            if cluster
                .template
                .iter()
                .all(|token| token == WILDCARD || seq.contains(token))
            {
                return Some(cid);
            }
        }
        None
    }

    /// Standard dynamic-programming LCS, backbone tokens in order.
    fn lcs(seq1: &[String], seq2: &[String]) -> Vec<String> {
        let rows = seq1.len();
        let cols = seq2.len();
        let mut lengths = vec![vec![0usize; cols + 1]; rows + 1];

        for i in 0..rows {
            for j in 0..cols {
                lengths[i + 1][j + 1] = if seq1[i] == seq2[j] {
                    lengths[i][j] + 1
                } else {
                    lengths[i + 1][j].max(lengths[i][j + 1])
                };
            }
        }

        let mut result = Vec::new();
        let mut i = rows;
        let mut j = cols;
        while i != 0 && j != 0 {
            if lengths[i][j] == lengths[i - 1][j] {
                i -= 1;
            } else if lengths[i][j] == lengths[i][j - 1] {
                j -= 1;
            } else {
                result.push(seq1[i - 1].clone());
                i -= 1;
                j -= 1;
            }
        }
        result.reverse();
        result
    }

    /// Stage 3: LCS against every cluster passing the token-set prefilter;
    /// longest backbone wins, ties broken by the shorter template.
    fn lcs_match(&self, seq: &[String]) -> Option<usize> {
        let mut max_len: i64 = -1;
        let mut best: Option<usize> = None;
        let seq_set: FxHashSet<&String> = seq.iter().collect();
        let size_seq = seq.len();

        for (cid, cluster) in self.clusters.iter().enumerate() {
            let template_set: FxHashSet<&String> = cluster.template.iter().collect();
            let common = seq_set.intersection(&template_set).count();
            if (common as f64) < 0.5 * size_seq as f64 {
                continue;
            }
            let len = Self::lcs(seq, &cluster.template).len() as i64;
            let better = match best {
                None => true,
                Some(b) => {
                    len > max_len
                        || (len == max_len
                            && cluster.template.len() < self.clusters[b].template.len())
                }
            };
            if better {
                max_len = len;
                best = Some(cid);
            }
        }

        if max_len as f64 >= self.tau * size_seq as f64 {
            best
        } else {
            None
        }
    }

    /// Rebuild a template over the input positions: backbone tokens stay
    /// literal where they land, everything else becomes a wildcard, and
    /// input left over once the backbone is exhausted collapses to a single
    /// trailing wildcard.
    fn rebuild_template(backbone: &[String], seq: &[String]) -> Vec<String> {
        let mut result = Vec::new();
        if backbone.is_empty() {
            return result;
        }

        let mut bi = 0;
        let mut consumed = 0;
        for token in seq {
            consumed += 1;
            if *token == backbone[bi] {
                result.push(token.clone());
                bi += 1;
            } else {
                result.push(WILDCARD.to_string());
            }
            if bi == backbone.len() {
                break;
            }
        }
        if consumed < seq.len() {
            result.push(WILDCARD.to_string());
        }
        result
    }

    /// Insert the cluster's literal tokens as a chain, bumping each edge's
    /// reference count; the terminal node adopts the cluster if unowned.
    fn insert_chain(&mut self, cid: usize) {
        let consts: Vec<String> = self.clusters[cid]
            .template
            .iter()
            .filter(|w| *w != WILDCARD)
            .cloned()
            .collect();

        let mut node = 0;
        for token in consts {
            let child = match self.nodes[node].children.get(&token).copied() {
                Some(child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(ChainNode::default());
                    self.nodes[node].children.insert(token, child);
                    child
                }
            };
            self.nodes[child].ref_count += 1;
            node = child;
        }

        if self.nodes[node].cluster.is_none() {
            self.nodes[node].cluster = Some(cid);
        }
    }

    /// Walk the cluster's literal chain, decrementing reference counts and
    /// cutting the first edge whose count reaches zero; the walk stops at
    /// the cut.
    fn remove_chain(&mut self, cid: usize) {
        let consts: Vec<String> = self.clusters[cid]
            .template
            .iter()
            .filter(|w| *w != WILDCARD)
            .cloned()
            .collect();

        let mut node = 0;
        for token in &consts {
            if let Some(child) = self.nodes[node].children.get(token).copied() {
                if self.nodes[child].ref_count == 1 {
                    self.nodes[node].children.remove(token);
                    break;
                }
                self.nodes[child].ref_count -= 1;
                node = child;
            }
        }
    }
}

impl TemplateMiner for SpellMiner {
    fn add(&mut self, line_id: usize, tokens: Vec<String>, level: &str) -> AddOutcome {
        let const_tokens: Vec<String> = tokens
            .iter()
            .filter(|w| *w != WILDCARD)
            .cloned()
            .collect();

        if let Some(cid) = self.prefix_tree_match(&const_tokens) {
            // Exact-chain confirmation: membership only, template and level
            // stay untouched.
            self.clusters[cid].member_ids.push(line_id);
            return AddOutcome::Matched;
        }

        let matched = self
            .simple_loop_match(&const_tokens)
            .or_else(|| self.lcs_match(&tokens));

        match matched {
            None => {
                let cid = self.clusters.len();
                self.clusters
                    .push(LogCluster::new(tokens, level.to_string(), line_id));
                self.insert_chain(cid);
                tracing::debug!(
                    cluster = cid,
                    template = %self.clusters[cid].template_text(),
                    "new cluster"
                );
                AddOutcome::New
            }
            Some(cid) => {
                let backbone = Self::lcs(&tokens, &self.clusters[cid].template);
                let rebuilt = Self::rebuild_template(&backbone, &tokens);
                if rebuilt != self.clusters[cid].template {
                    self.remove_chain(cid);
                    let cluster = &mut self.clusters[cid];
                    cluster.template = rebuilt;
                    cluster.level = level.to_string();
                    self.insert_chain(cid);
                }
                self.clusters[cid].member_ids.push(line_id);
                AddOutcome::Matched
            }
        }
    }

    fn tokenize(&self, content: &str) -> Vec<String> {
        content
            .split(|c: char| c.is_whitespace() || matches!(c, '=' | ':' | ','))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn clusters(&self) -> &[LogCluster] {
        &self.clusters
    }

    fn name(&self) -> &'static str {
        "spell"
    }
}
