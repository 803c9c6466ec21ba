//! Prompt assembly (§4.I): filter/rank/coalesce the active-behavior list
//! into a compiled block that fits a token budget.

use serde::{Deserialize, Serialize};

use crate::model::{Behavior, BehaviorKind};
use crate::similarity::tag_sim;

/// Output format for the compiled prompt block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblyFormat {
    Markdown,
    Xml,
    Plain,
}

/// A behavior plus its activation/relevance, the unit assembly works over.
#[derive(Debug, Clone)]
pub struct ActiveBehavior {
    pub behavior: Behavior,
    pub activation: f64,
}

/// One entry in the compiled output: either a full behavior, or a
/// coalesced cluster summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum AssembledEntry {
    Full { behavior_id: String, text: String },
    ClusterSummary {
        representative_id: String,
        count: usize,
        names: Vec<String>,
    },
}

/// Result of a single assembly pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyResult {
    pub prompt: String,
    pub entries: Vec<AssembledEntry>,
    pub estimated_tokens: usize,
    pub truncated: bool,
}

const MIN_CLUSTER_SIZE: usize = 3;
const COALESCE_JACCARD_THRESHOLD: f64 = 0.5;

fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

fn kind_rank(kind: BehaviorKind) -> u8 {
    match kind {
        BehaviorKind::Constraint => 0,
        BehaviorKind::Directive => 1,
        BehaviorKind::Procedure => 2,
        BehaviorKind::Preference => 3,
        BehaviorKind::Forgotten => 4,
    }
}

/// Order behaviors per §4.I: constraints first, then directives, then
/// other kinds; within a kind, by priority then confidence.
fn ordered(mut behaviors: Vec<ActiveBehavior>) -> Vec<ActiveBehavior> {
    behaviors.sort_by(|a, b| {
        kind_rank(a.behavior.kind)
            .cmp(&kind_rank(b.behavior.kind))
            .then(b.behavior.priority.cmp(&a.behavior.priority))
            .then(b.behavior.confidence.total_cmp(&a.behavior.confidence))
    });
    behaviors
}

/// Group same-kind behaviors whose tag sets have pairwise Jaccard similarity
/// above the threshold into clusters of at least `MinClusterSize`; within a
/// cluster, the highest-activation member becomes the representative.
fn coalesce(behaviors: &[ActiveBehavior]) -> Vec<Vec<usize>> {
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut assigned = vec![false; behaviors.len()];

    for i in 0..behaviors.len() {
        if assigned[i] {
            continue;
        }
        let mut cluster = vec![i];
        for j in (i + 1)..behaviors.len() {
            if assigned[j] {
                continue;
            }
            if behaviors[i].behavior.kind != behaviors[j].behavior.kind {
                continue;
            }
            let sim = tag_sim(&behaviors[i].behavior.content.tags, &behaviors[j].behavior.content.tags);
            if sim > COALESCE_JACCARD_THRESHOLD {
                cluster.push(j);
            }
        }
        if cluster.len() >= MIN_CLUSTER_SIZE {
            for &idx in &cluster {
                assigned[idx] = true;
            }
            clusters.push(cluster);
        }
    }

    // Anything not absorbed into a cluster gets a singleton "cluster".
    for (i, was_assigned) in assigned.iter().enumerate() {
        if !was_assigned {
            clusters.push(vec![i]);
        }
    }
    clusters
}

fn render_full(behavior: &Behavior, format: AssemblyFormat, expanded: bool) -> String {
    let body = if expanded {
        behavior.content.expanded.as_deref().unwrap_or(&behavior.content.canonical)
    } else {
        &behavior.content.canonical
    };
    match format {
        AssemblyFormat::Markdown => format!("### {} [{}]\n{}\n", behavior.name, behavior.kind, body),
        AssemblyFormat::Xml => format!(
            "<behavior id=\"{}\" kind=\"{}\">{}</behavior>\n",
            behavior.id, behavior.kind, body
        ),
        AssemblyFormat::Plain => format!("[{}] {}: {}\n", behavior.kind, behavior.name, body),
    }
}

fn render_cluster_summary(representative: &Behavior, count: usize, format: AssemblyFormat) -> String {
    let others = count.saturating_sub(1);
    match format {
        AssemblyFormat::Markdown => format!(
            "### {} [{}] (+{} similar — see `show {}` for details)\n{}\n",
            representative.name, representative.kind, others, representative.id, representative.content.canonical
        ),
        AssemblyFormat::Xml => format!(
            "<behavior id=\"{}\" kind=\"{}\" clustered=\"{}\">{}</behavior>\n",
            representative.id, representative.kind, count, representative.content.canonical
        ),
        AssemblyFormat::Plain => format!(
            "[{}] {} (+{} similar): {}\n",
            representative.kind, representative.name, others, representative.content.canonical
        ),
    }
}

/// Compile the active-behavior list into a prompt block within
/// `budget_tokens` (estimated as `chars/4`), applying ordering and optional
/// coalescing. Behaviors that don't fit the remaining budget are dropped in
/// ranked order (least relevant first).
pub fn assemble(
    behaviors: Vec<ActiveBehavior>,
    budget_tokens: usize,
    format: AssemblyFormat,
    coalesce_enabled: bool,
) -> AssemblyResult {
    let ordered = ordered(behaviors);

    let clusters: Vec<Vec<usize>> = if coalesce_enabled {
        coalesce(&ordered)
    } else {
        (0..ordered.len()).map(|i| vec![i]).collect()
    };

    let mut prompt = String::new();
    let mut entries = Vec::new();
    let mut truncated = false;

    for cluster in &clusters {
        let representative_idx = *cluster
            .iter()
            .max_by(|&&a, &&b| ordered[a].activation.total_cmp(&ordered[b].activation))
            .unwrap();
        let representative = &ordered[representative_idx].behavior;

        let rendered = if cluster.len() >= MIN_CLUSTER_SIZE {
            render_cluster_summary(representative, cluster.len(), format)
        } else {
            render_full(representative, format, false)
        };

        if estimate_tokens(&prompt) + estimate_tokens(&rendered) > budget_tokens && !prompt.is_empty() {
            truncated = true;
            break;
        }

        prompt.push_str(&rendered);

        if cluster.len() >= MIN_CLUSTER_SIZE {
            entries.push(AssembledEntry::ClusterSummary {
                representative_id: representative.id.clone(),
                count: cluster.len(),
                names: cluster.iter().map(|&i| ordered[i].behavior.name.clone()).collect(),
            });
        } else {
            entries.push(AssembledEntry::Full {
                behavior_id: representative.id.clone(),
                text: rendered,
            });
        }
    }

    let estimated_tokens = estimate_tokens(&prompt);
    AssemblyResult {
        prompt,
        entries,
        estimated_tokens,
        truncated,
    }
}
