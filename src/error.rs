use thiserror::Error;

/// Failures surfaced by the environment, the learner and model persistence.
#[derive(Debug, Error)]
pub enum Error {
    // ── Caller protocol ──────────────────────────────────────────────────────
    #[error("environment stepped before reset")]
    NotStarted,
    #[error("environment stepped after the episode ended; call reset first")]
    EpisodeOver,
    #[error("cannot sample {requested} transitions from a store holding {available}")]
    InsufficientExperience { requested: usize, available: usize },
    #[error("a gradient update is still in flight")]
    LearnerBusy,
    #[error("gradient update panicked: {0}")]
    UpdatePanicked(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    // ── Model blobs ──────────────────────────────────────────────────────────
    #[error("model blob has no weight specs")]
    MissingWeightSpecs,
    #[error("model blob is malformed: {0}")]
    MalformedModel(String),
    #[error("model topology {found:?} does not match the expected {expected:?}")]
    TopologyMismatch { expected: Vec<usize>, found: Vec<usize> },
    #[error("no stored model named {0:?}")]
    ModelNotFound(String),

    // ── Backends ─────────────────────────────────────────────────────────────
    #[error("tensor backend: {0}")]
    Tensor(#[from] candle_core::Error),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
