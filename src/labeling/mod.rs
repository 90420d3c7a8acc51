//! Human-readable cluster label synthesis.
//!
//! Selects the units nearest to each cluster centroid as representatives,
//! asks a text-generation provider for a concise label, and validates the
//! result. Every failure path lands on a deterministic term-frequency
//! fallback, so labeling can never block persistence.

use crate::clustering::cosine_distance;
use crate::config::LabelingConfig;
use crate::llm::LlmProvider;
use crate::models::{ClusterId, ContentUnit};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum words accepted in a label.
const MAX_LABEL_WORDS: usize = 3;
/// Label of last resort when no significant terms exist.
const EMPTY_FALLBACK_LABEL: &str = "uncategorized";
/// Minimum word length considered significant for fallback labels.
const MIN_TERM_LENGTH: usize = 3;
/// Maximum word length considered significant for fallback labels.
const MAX_TERM_LENGTH: usize = 30;

/// Where a label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSource {
    /// Produced by the text-generation provider and validated.
    Generated,
    /// Derived deterministically from representative summaries.
    Fallback,
}

/// A validated, run-unique cluster label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedLabel {
    /// The label text.
    pub label: String,
    /// Where the label came from.
    pub source: LabelSource,
}

/// Synthesizes labels for discovered clusters.
pub struct LabelSynthesizer {
    config: LabelingConfig,
    provider: Option<Arc<dyn LlmProvider>>,
}

impl LabelSynthesizer {
    /// Creates a synthesizer without a text-generation provider.
    ///
    /// All labels will come from the deterministic fallback.
    #[must_use]
    pub const fn new(config: LabelingConfig) -> Self {
        Self {
            config,
            provider: None,
        }
    }

    /// Attaches a text-generation provider.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Selects up to K members nearest to the centroid, by ascending cosine
    /// distance. Clusters smaller than K contribute all their members.
    #[must_use]
    pub fn select_representatives<'a>(
        &self,
        members: &[&'a ContentUnit],
        centroid: &[f32],
    ) -> Vec<&'a ContentUnit> {
        let mut ranked: Vec<(&ContentUnit, f32)> = members
            .iter()
            .map(|unit| (*unit, cosine_distance(&unit.embedding, centroid)))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked
            .into_iter()
            .take(self.config.representative_count.max(1))
            .map(|(unit, _)| unit)
            .collect()
    }

    /// Produces a validated, run-unique label for one cluster.
    ///
    /// `used` tracks labels already taken in this run (lowercased);
    /// collisions get a numeric disambiguating suffix.
    pub fn label_cluster(
        &self,
        cluster_id: &ClusterId,
        members: &[&ContentUnit],
        centroid: &[f32],
        used: &mut BTreeSet<String>,
    ) -> SynthesizedLabel {
        let representatives = self.select_representatives(members, centroid);
        let summaries: Vec<&str> = representatives
            .iter()
            .map(|unit| unit.summary.as_str())
            .collect();

        let (label, source) = self
            .generate_label(cluster_id, &summaries)
            .map_or_else(
                || (self.fallback_label(&summaries), LabelSource::Fallback),
                |label| (label, LabelSource::Generated),
            );

        let label = disambiguate(label, used);
        used.insert(label.to_lowercase());
        debug!(cluster_id = %cluster_id, label = %label, source = ?source, "label synthesized");
        SynthesizedLabel { label, source }
    }

    /// Asks the provider for a label; returns `None` on any failure so the
    /// caller falls back.
    fn generate_label(&self, cluster_id: &ClusterId, summaries: &[&str]) -> Option<String> {
        let provider = self.provider.as_ref()?;
        let prompt = build_prompt(summaries);

        match provider.complete(&prompt) {
            Ok(response) => {
                let validated = self.validate(&response);
                if validated.is_none() {
                    metrics::counter!("topicgraph_label_fallbacks_total").increment(1);
                    warn!(
                        cluster_id = %cluster_id,
                        provider = provider.name(),
                        response = %response,
                        "generated label failed validation, using fallback"
                    );
                }
                validated
            },
            Err(e) => {
                metrics::counter!("topicgraph_label_fallbacks_total").increment(1);
                warn!(
                    cluster_id = %cluster_id,
                    provider = provider.name(),
                    error = %e,
                    "label generation failed, using fallback"
                );
                None
            },
        }
    }

    /// Validates and normalizes a raw provider response.
    ///
    /// Accepts 1-3 words within the length bound, rejecting generic terms
    /// from the banned list.
    #[must_use]
    pub fn validate(&self, raw: &str) -> Option<String> {
        let stripped = raw
            .trim()
            .trim_matches(|c: char| "\"'`*.".contains(c))
            .trim();
        let normalized = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

        if normalized.is_empty() || normalized.chars().count() > self.config.max_label_chars {
            return None;
        }
        if normalized.split_whitespace().count() > MAX_LABEL_WORDS {
            return None;
        }
        if normalized.contains('\n') {
            return None;
        }

        let lowered = normalized.to_lowercase();
        if self
            .config
            .banned_terms
            .iter()
            .any(|banned| lowered == banned.to_lowercase())
        {
            return None;
        }

        Some(normalized)
    }

    /// Derives a deterministic label from the most frequent significant
    /// terms across the representative summaries.
    #[must_use]
    pub fn fallback_label(&self, summaries: &[&str]) -> String {
        let terms = significant_terms(summaries);
        let filtered: Vec<&String> = terms
            .iter()
            .filter(|term| {
                !self
                    .config
                    .banned_terms
                    .iter()
                    .any(|banned| banned.eq_ignore_ascii_case(term))
            })
            .take(MAX_LABEL_WORDS)
            .collect();

        if filtered.is_empty() {
            return EMPTY_FALLBACK_LABEL.to_string();
        }

        let mut label = String::new();
        for term in filtered {
            if !label.is_empty()
                && label.chars().count() + 1 + term.chars().count() > self.config.max_label_chars
            {
                break;
            }
            if !label.is_empty() {
                label.push(' ');
            }
            label.push_str(term);
        }
        label
    }
}

/// Builds the text-generation prompt for one cluster.
fn build_prompt(summaries: &[&str]) -> String {
    let mut prompt = String::from(
        "Propose a concise 1-3 word topic label for a group of related content.\n\n\
         Representative summaries:\n",
    );
    for summary in summaries {
        prompt.push_str("- ");
        prompt.push_str(summary);
        prompt.push('\n');
    }
    prompt.push_str("\nReply with only the label, no punctuation or explanation.");
    prompt
}

/// Appends a numeric suffix while the label collides with one already used
/// in this run (case-insensitive).
fn disambiguate(label: String, used: &BTreeSet<String>) -> String {
    if !used.contains(&label.to_lowercase()) {
        return label;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{label} {n}");
        if !used.contains(&candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

/// Extracts significant terms ordered by descending frequency, with an
/// alphabetical tie-break so the result is deterministic.
fn significant_terms(summaries: &[&str]) -> Vec<String> {
    static STOP_WORDS: &[&str] = &[
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
        "can", "need", "dare", "ought", "used", "to", "of", "in", "for", "on", "with", "at", "by",
        "from", "as", "into", "through", "during", "before", "after", "above", "below", "between",
        "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
        "how", "all", "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not",
        "only", "own", "same", "so", "than", "too", "very", "just", "also", "now", "and", "but",
        "or", "if", "because", "until", "while", "this", "that", "these", "those", "what", "which",
        "who", "whom", "whose", "it", "its", "they", "them", "their", "we", "us", "our", "you",
        "your", "i", "my", "me", "he", "him", "his", "she", "her", "about",
    ];

    let mut freq: HashMap<String, usize> = HashMap::new();
    for summary in summaries {
        for word in summary
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= MIN_TERM_LENGTH && w.len() <= MAX_TERM_LENGTH)
            .map(str::to_lowercase)
            .filter(|w| !STOP_WORDS.contains(&w.as_str()))
            .filter(|w| !w.chars().all(char::is_numeric))
        {
            *freq.entry(word).or_insert(0) += 1;
        }
    }

    let mut sorted: Vec<(String, usize)> = freq.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.into_iter().map(|(word, _)| word).collect()
}
