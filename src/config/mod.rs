//! Configuration management.
//!
//! All tunables are carried in an explicit [`TopicgraphConfig`] passed into
//! the pipeline, never in process-wide mutable state. The evolution
//! thresholds and confidence weights are heuristic constants from the
//! original design; they are exposed as named defaults and can be
//! overridden per run, but changing them changes classification behavior.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Default fraction of an old cluster that a destination must receive for a
/// split/merge edge to be emitted.
pub const DEFAULT_SPLIT_THRESHOLD: f32 = 0.2;
/// Default fraction a single old→new pair must capture for a continuation.
pub const DEFAULT_CONTINUATION_THRESHOLD: f32 = 0.8;
/// Default weight of proportion separation in edge confidence.
pub const DEFAULT_SEPARATION_WEIGHT: f32 = 0.4;
/// Default weight of unit count in edge confidence.
pub const DEFAULT_COUNT_WEIGHT: f32 = 0.3;
/// Default weight of centroid similarity in edge confidence.
pub const DEFAULT_CENTROID_WEIGHT: f32 = 0.3;
/// Unit count at which the count factor of edge confidence saturates.
pub const DEFAULT_COUNT_SATURATION: usize = 50;
/// Default outlier ratio above which a quality warning is raised.
pub const DEFAULT_OUTLIER_WARNING_RATIO: f32 = 0.3;
/// Default number of representative units used for labeling.
pub const DEFAULT_REPRESENTATIVE_COUNT: usize = 5;

/// Strategy for deriving the minimum cluster size.
///
/// Serialized as a string: `"5"` for a fixed size, `"sqrt/2"` for the
/// formula `max(2, round(sqrt(n) / divisor))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MinClusterSize {
    /// A fixed minimum size.
    Fixed(usize),
    /// `max(2, round(sqrt(n) / divisor))` for n units.
    SqrtFraction {
        /// Divisor applied to sqrt(n).
        divisor: f32,
    },
}

impl MinClusterSize {
    /// Resolves the minimum cluster size for a dataset of `n` units.
    #[must_use]
    pub fn resolve(&self, n: usize) -> usize {
        match self {
            Self::Fixed(size) => (*size).max(2),
            Self::SqrtFraction { divisor } => {
                #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let derived = ((n as f32).sqrt() / divisor.max(f32::EPSILON)).round() as usize;
                derived.max(2)
            },
        }
    }

    /// Parses a strategy from its string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(size) = s.parse::<usize>() {
            return Some(Self::Fixed(size));
        }
        if let Some(rest) = s.strip_prefix("sqrt/") {
            if let Ok(divisor) = rest.parse::<f32>() {
                if divisor > 0.0 {
                    return Some(Self::SqrtFraction { divisor });
                }
            }
        }
        None
    }
}

impl Default for MinClusterSize {
    fn default() -> Self {
        Self::Fixed(5)
    }
}

impl From<MinClusterSize> for String {
    fn from(value: MinClusterSize) -> Self {
        match value {
            MinClusterSize::Fixed(size) => size.to_string(),
            MinClusterSize::SqrtFraction { divisor } => format!("sqrt/{divisor}"),
        }
    }
}

impl TryFrom<String> for MinClusterSize {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid min_cluster_size: {value}"))
    }
}

/// Density-algorithm parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringParams {
    /// Minimum cluster size (fixed or formula-derived).
    pub min_cluster_size: MinClusterSize,
    /// Minimum neighbors for a point to be a core point.
    pub min_samples: usize,
    /// Maximum cosine distance between neighbors.
    pub epsilon: f32,
    /// Outlier ratio above which a quality warning is raised.
    pub outlier_warning_ratio: f32,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            min_cluster_size: MinClusterSize::default(),
            min_samples: 2,
            epsilon: 0.3,
            outlier_warning_ratio: DEFAULT_OUTLIER_WARNING_RATIO,
        }
    }
}

impl ClusteringParams {
    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if epsilon or min_samples are out of range.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 || self.epsilon > 2.0 {
            return Err(crate::Error::InvalidInput(format!(
                "epsilon must be in (0, 2], got {}",
                self.epsilon
            )));
        }
        if self.min_samples == 0 {
            return Err(crate::Error::InvalidInput(
                "min_samples must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.outlier_warning_ratio) {
            return Err(crate::Error::InvalidInput(format!(
                "outlier_warning_ratio must be in [0, 1], got {}",
                self.outlier_warning_ratio
            )));
        }
        Ok(())
    }
}

/// Evolution detection thresholds and confidence weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Fraction of an old cluster a destination must receive to count as a
    /// split branch (and, transposed, a merge source).
    pub split_threshold: f32,
    /// Fraction a single old→new pair must capture for a continuation.
    pub continuation_threshold: f32,
    /// Weight of proportion separation in edge confidence.
    pub separation_weight: f32,
    /// Weight of unit count in edge confidence.
    pub count_weight: f32,
    /// Weight of centroid similarity in edge confidence.
    pub centroid_weight: f32,
    /// Unit count at which the count factor saturates.
    pub count_saturation: usize,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            continuation_threshold: DEFAULT_CONTINUATION_THRESHOLD,
            separation_weight: DEFAULT_SEPARATION_WEIGHT,
            count_weight: DEFAULT_COUNT_WEIGHT,
            centroid_weight: DEFAULT_CENTROID_WEIGHT,
            count_saturation: DEFAULT_COUNT_SATURATION,
        }
    }
}

/// Label synthesis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelingConfig {
    /// Representatives selected per cluster (nearest to centroid).
    pub representative_count: usize,
    /// Maximum accepted label length in characters.
    pub max_label_chars: usize,
    /// Generic terms rejected as labels.
    pub banned_terms: Vec<String>,
    /// Timeout for one text-generation call, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            representative_count: DEFAULT_REPRESENTATIVE_COUNT,
            max_label_chars: 48,
            banned_terms: vec![
                "topic".to_string(),
                "topics".to_string(),
                "cluster".to_string(),
                "group".to_string(),
                "miscellaneous".to_string(),
                "misc".to_string(),
                "general".to_string(),
                "various".to_string(),
                "content".to_string(),
                "unknown".to_string(),
            ],
            timeout_ms: 10_000,
        }
    }
}

/// Retry policy for transient persistence failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts (including the first).
    pub max_attempts: u32,
    /// Backoff before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Multiplier applied to the backoff after each attempt.
    pub backoff_multiplier: f64,
    /// Upper bound on a single backoff, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            backoff_multiplier: 2.0,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Returns the backoff duration for the given zero-based attempt.
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: u32) -> std::time::Duration {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ms = (self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32))
            .min(self.max_backoff_ms as f64) as u64;
        std::time::Duration::from_millis(ms)
    }
}

/// Text-generation provider configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: currently only "ollama" is built in.
    pub provider: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Base URL for the provider.
    pub base_url: Option<String>,
}

/// Main configuration for topicgraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicgraphConfig {
    /// Path to the `SQLite` graph store.
    pub db_path: PathBuf,
    /// Density-algorithm parameters.
    pub clustering: ClusteringParams,
    /// Evolution detection thresholds and weights.
    pub evolution: EvolutionConfig,
    /// Label synthesis settings.
    pub labeling: LabelingConfig,
    /// Retry policy for transient persistence failures.
    pub retry: RetryPolicy,
    /// Text-generation provider settings.
    pub llm: LlmConfig,
}

impl Default for TopicgraphConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("topicgraph.db"),
            clustering: ClusteringParams::default(),
            evolution: EvolutionConfig::default(),
            labeling: LabelingConfig::default(),
            retry: RetryPolicy::default(),
            llm: LlmConfig::default(),
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Path to the graph store database.
    pub db_path: Option<String>,
    /// Clustering section.
    pub clustering: Option<ConfigFileClustering>,
    /// Evolution section.
    pub evolution: Option<ConfigFileEvolution>,
    /// Labeling section.
    pub labeling: Option<ConfigFileLabeling>,
    /// LLM section.
    pub llm: Option<LlmConfig>,
}

/// Clustering section in a config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileClustering {
    /// Minimum cluster size, `"5"` or `"sqrt/2"`.
    pub min_cluster_size: Option<String>,
    /// Minimum core-point neighbors.
    pub min_samples: Option<usize>,
    /// Maximum cosine distance between neighbors.
    pub epsilon: Option<f32>,
    /// Outlier warning ratio.
    pub outlier_warning_ratio: Option<f32>,
}

/// Evolution section in a config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileEvolution {
    /// Split/merge participation threshold.
    pub split_threshold: Option<f32>,
    /// Continuation capture threshold.
    pub continuation_threshold: Option<f32>,
}

/// Labeling section in a config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLabeling {
    /// Representatives per cluster.
    pub representative_count: Option<usize>,
    /// Text-generation timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl TopicgraphConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &std::path::Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::InvalidInput(format!("cannot read config file: {e}")))?;

        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| crate::Error::InvalidInput(format!("cannot parse config file: {e}")))?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir (`~/.config/topicgraph/config.toml`
    /// style) and falls back to defaults when no file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidate = base_dirs
            .config_dir()
            .join("topicgraph")
            .join("config.toml");
        if candidate.exists() {
            if let Ok(config) = Self::load_from_file(&candidate) {
                return config.with_env_overrides();
            }
        }

        Self::default().with_env_overrides()
    }

    /// Builds a configuration from a parsed config file.
    #[must_use]
    pub fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(db_path) = file.db_path {
            config.db_path = PathBuf::from(db_path);
        }
        if let Some(clustering) = file.clustering {
            if let Some(mcs) = clustering.min_cluster_size.as_deref().and_then(MinClusterSize::parse)
            {
                config.clustering.min_cluster_size = mcs;
            }
            if let Some(min_samples) = clustering.min_samples {
                config.clustering.min_samples = min_samples;
            }
            if let Some(epsilon) = clustering.epsilon {
                config.clustering.epsilon = epsilon;
            }
            if let Some(ratio) = clustering.outlier_warning_ratio {
                config.clustering.outlier_warning_ratio = ratio.clamp(0.0, 1.0);
            }
        }
        if let Some(evolution) = file.evolution {
            if let Some(t) = evolution.split_threshold {
                config.evolution.split_threshold = t.clamp(0.0, 1.0);
            }
            if let Some(t) = evolution.continuation_threshold {
                config.evolution.continuation_threshold = t.clamp(0.0, 1.0);
            }
        }
        if let Some(labeling) = file.labeling {
            if let Some(k) = labeling.representative_count {
                config.labeling.representative_count = k.max(1);
            }
            if let Some(timeout_ms) = labeling.timeout_ms {
                config.labeling.timeout_ms = timeout_ms;
            }
        }
        if let Some(llm) = file.llm {
            config.llm = llm;
        }

        config
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("TOPICGRAPH_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TOPICGRAPH_MIN_CLUSTER_SIZE") {
            if let Some(mcs) = MinClusterSize::parse(&v) {
                self.clustering.min_cluster_size = mcs;
            }
        }
        if let Ok(v) = std::env::var("TOPICGRAPH_MIN_SAMPLES") {
            if let Ok(parsed) = v.parse::<usize>() {
                self.clustering.min_samples = parsed.max(1);
            }
        }
        if let Ok(v) = std::env::var("TOPICGRAPH_EPSILON") {
            if let Ok(parsed) = v.parse::<f32>() {
                self.clustering.epsilon = parsed;
            }
        }
        if let Ok(v) = std::env::var("TOPICGRAPH_LABEL_TIMEOUT_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.labeling.timeout_ms = parsed;
            }
        }
        self
    }

    /// Returns a stable hash of the configuration, recorded on every run.
    #[must_use]
    pub fn config_hash(&self) -> String {
        let serialized = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        hex::encode(&hasher.finalize()[..8])
    }
}
