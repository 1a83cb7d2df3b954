use serde::{Deserialize, Serialize};

/// Main configuration structure for chorus
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Job lifecycle configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Collaboration session configuration
    #[serde(default)]
    pub session: SessionSettings,

    /// Challenge round configuration
    #[serde(default)]
    pub challenge: ChallengeSettings,

    /// Worker roster
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,

    /// Event bus configuration
    #[serde(default)]
    pub events: EventsConfig,

    /// Deployment target configuration
    #[serde(default)]
    pub deploy: DeployConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Job lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Judge automatically instead of waiting for an external judgment
    #[serde(default = "default_true")]
    pub auto_judge: bool,

    /// Hand the artifact to the deployer after assembly
    #[serde(default)]
    pub auto_deploy: bool,

    /// Number of terminal jobs kept in memory
    #[serde(default = "default_retention_limit")]
    pub retention_limit: usize,

    /// Artifact kinds routed to a collaboration session instead of a challenge round
    #[serde(default = "default_collaborative_kinds")]
    pub collaborative_kinds: Vec<String>,
}

const fn default_true() -> bool {
    true
}

const fn default_retention_limit() -> usize {
    100
}

fn default_collaborative_kinds() -> Vec<String> {
    [
        "application",
        "app",
        "service",
        "system",
        "platform",
        "architecture",
        "feature",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            auto_judge: true,
            auto_deploy: false,
            retention_limit: default_retention_limit(),
            collaborative_kinds: default_collaborative_kinds(),
        }
    }
}

/// Collaboration session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionSettings {
    /// Maximum worker calls in flight at once
    #[serde(default = "default_max_concurrent_workers")]
    pub max_concurrent_workers: usize,

    /// Per-call timeout in seconds
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,

    /// Run the debate phase
    #[serde(default = "default_true")]
    pub enable_debate: bool,

    /// Maximum number of debate pairs
    #[serde(default = "default_max_debates")]
    pub max_debates: usize,

    /// Wall-clock budget for all phases in seconds
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
}

const fn default_max_concurrent_workers() -> usize {
    5
}

const fn default_worker_timeout_secs() -> u64 {
    90
}

const fn default_max_debates() -> usize {
    3
}

const fn default_max_duration_secs() -> u64 {
    300
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_concurrent_workers: default_max_concurrent_workers(),
            worker_timeout_secs: default_worker_timeout_secs(),
            enable_debate: true,
            max_debates: default_max_debates(),
            max_duration_secs: default_max_duration_secs(),
        }
    }
}

/// Challenge round configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChallengeSettings {
    /// Per-call timeout in seconds
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,

    /// Keywords an implementation must reference to earn the signal bonus
    #[serde(default)]
    pub required_signals: Vec<String>,

    /// Visual identity tokens embedded in every prompt
    #[serde(default)]
    pub identity_tokens: Vec<String>,
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            worker_timeout_secs: default_worker_timeout_secs(),
            required_signals: Vec::new(),
            identity_tokens: Vec::new(),
        }
    }
}

/// How a configured worker is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    /// JSON over HTTP
    Http,
    /// In-process worker that echoes a templated answer, for offline runs
    Echo,
}

impl Default for WorkerKind {
    fn default() -> Self {
        Self::Http
    }
}

/// One configured worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    pub id: String,

    /// Display name, defaults to the id
    #[serde(default)]
    pub name: Option<String>,

    /// Free-form persona label, normalized on load
    #[serde(default)]
    pub persona: Option<String>,

    /// Artifact kind the worker is bound to
    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub kind: WorkerKind,

    /// Endpoint URL for http workers
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Model name forwarded to http workers
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EventsConfig {
    /// Broadcast channel capacity
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Keep an in-memory event history for replay
    #[serde(default = "default_true")]
    pub persist_events: bool,
}

const fn default_channel_capacity() -> usize {
    1024
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            persist_events: true,
        }
    }
}

/// Deployment target configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DeployConfig {
    /// Directory the file deployer writes artifacts into
    #[serde(default)]
    pub output_dir: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
