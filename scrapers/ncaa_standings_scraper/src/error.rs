use thiserror::Error;

/// Failures the matching and writing pipeline can hit. All of these are
/// local to a single record; callers report them and move on.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("no candidates scored above zero for '{name}'")]
    NoCandidates { name: String },

    #[error("write limit reached, retry in ~{retry_after_secs:.0}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("failed to write to sheet at row {row} col {col}: {source}")]
    WriteFailed {
        row: usize,
        col: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid input: '{input}'")]
    AmbiguousInput { input: String },
}
