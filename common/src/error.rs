use thiserror::Error;

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("price request failed: {0}")]
    Transport(String),
    #[error("price source returned HTTP {0}")]
    Status(u16),
    #[error("malformed price response: {0}")]
    Malformed(String),
    #[error("price request timed out after {0} ms")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("model is infeasible")]
    Infeasible,
    #[error("model is unbounded")]
    Unbounded,
    #[error("invalid model input: {0}")]
    InvalidInput(String),
    #[error("solver failure: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum DeviceWriteError {
    #[error("device request failed: {0}")]
    Transport(String),
    #[error("device returned HTTP {0}")]
    Status(u16),
    #[error("device write timed out after {0} ms")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history store unavailable: {0}")]
    Unavailable(String),
    #[error("history query failed: {0}")]
    Query(String),
    #[error("history load timed out after {0} ms")]
    Timeout(u64),
}
