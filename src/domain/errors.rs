use thiserror::Error;

/// Errors surfaced by the vault HTTP facade.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault http error: {0}")]
    Http(String),

    #[error("vault returned non-success status for {action}: {detail}")]
    ActionFailed { action: String, detail: String },

    #[error("vault response missing expected field: {0}")]
    MissingField(String),
}

/// Errors surfaced by the execution pipeline while running a signal's steps.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("step {step} failed after {attempts} attempt(s): {source}")]
    StepFailed {
        step: String,
        attempts: u32,
        #[source]
        source: VaultError,
    },

    #[error("signal {strategy_id}/{ts} has no steps to execute")]
    EmptyPlan { strategy_id: String, ts: i64 },
}

/// Errors surfaced while reconciling a desired episode against live vault state.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("vault binding missing dex/alias for strategy {strategy_id}")]
    MissingBinding { strategy_id: String },

    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// Errors surfaced by the candle ingestion supervisor.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("websocket connection failed: {0}")]
    Connect(String),

    #[error("websocket stream closed unexpectedly")]
    StreamClosed,

    #[error("failed to parse kline message: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_failed_formats_with_source_chain() {
        let err = PipelineError::StepFailed {
            step: "SWAP_EXACT_IN".to_string(),
            attempts: 3,
            source: VaultError::Http("timeout".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("SWAP_EXACT_IN"));
        assert!(msg.contains('3'));
    }
}
