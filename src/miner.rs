//! Shared template-mining types: the cluster registry entries, the
//! `TemplateMiner` trait both strategies implement, and the truncated-hex
//! template digests used as event ids in reports.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Result of feeding one token sequence to a miner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// No existing cluster accepted the sequence; a new one was created.
    New,
    /// The sequence was absorbed into an existing cluster.
    Matched,
}

/// One group of log lines sharing a template.
///
/// Membership is append-only; a line id recorded here is never removed or
/// moved to another cluster.
#[derive(Debug, Clone)]
pub struct LogCluster {
    pub template: Vec<String>,
    pub level: String,
    pub member_ids: Vec<usize>,
}

impl LogCluster {
    pub fn new(template: Vec<String>, level: String, line_id: usize) -> Self {
        Self {
            template,
            level,
            member_ids: vec![line_id],
        }
    }

    /// Space-joined template text, the input to [`template_id`].
    pub fn template_text(&self) -> String {
        self.template.join(" ")
    }

    pub fn occurrences(&self) -> usize {
        self.member_ids.len()
    }
}

/// First 8 hex characters of a stable content digest of the template text.
///
/// Two clusters with identical template text get identical ids but remain
/// distinct clusters; nothing merges on id collision.
pub fn template_id(template_text: &str) -> String {
    let digest = Sha256::digest(template_text.as_bytes());
    let mut id = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        id.push_str(&format!("{:02x}", byte));
    }
    id
}

/// A template-mining strategy over token sequences.
///
/// Implementations keep their own cluster registry and prefix tree; `add`
/// is the single mutation point, so one instance is safe to drive from one
/// thread without locking. Parallelism belongs across instances.
pub trait TemplateMiner {
    /// Route one line into the cluster registry.
    fn add(&mut self, line_id: usize, tokens: Vec<String>, level: &str) -> AddOutcome;

    /// Split a record's content the way this strategy expects.
    fn tokenize(&self, content: &str) -> Vec<String>;

    /// The evolving cluster registry, in creation order.
    fn clusters(&self) -> &[LogCluster];

    /// Strategy name for reporting.
    fn name(&self) -> &'static str;
}

/// Which mining strategy to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinerKind {
    Drain,
    Spell,
}

impl Default for MinerKind {
    fn default() -> Self {
        MinerKind::Drain
    }
}

/// Tunables for both strategies, defaulted to the values the pipeline ships
/// with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerParams {
    /// Drain: depth of all leaf nodes.
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// Drain: similarity threshold.
    #[serde(default = "default_st")]
    pub st: f64,
    /// Drain: max children of an internal node.
    #[serde(default = "default_max_child")]
    pub max_child: usize,
    /// Spell: fraction of tokens that must match to merge.
    #[serde(default = "default_tau")]
    pub tau: f64,
}

fn default_depth() -> usize {
    4
}

fn default_st() -> f64 {
    0.5
}

fn default_max_child() -> usize {
    100
}

fn default_tau() -> f64 {
    0.3
}

impl Default for MinerParams {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            st: default_st(),
            max_child: default_max_child(),
            tau: default_tau(),
        }
    }
}

/// Instantiate the configured strategy.
pub fn new_miner(kind: MinerKind, params: &MinerParams) -> Box<dyn TemplateMiner> {
    match kind {
        MinerKind::Drain => Box::new(crate::drain::DrainMiner::new(
            params.depth,
            params.st,
            params.max_child,
        )),
        MinerKind::Spell => Box::new(crate::spell::SpellMiner::new(params.tau)),
    }
}
