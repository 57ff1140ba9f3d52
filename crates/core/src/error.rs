/// Error kinds named in the governance error taxonomy. Transient and tool
/// errors stay local to the component that raised them; auth, config, and
/// internal errors propagate to the caller.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(String),

    #[error("token budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("finding without resolvable reference: {0}")]
    FindingWithoutReference(String),

    #[error("run deadline exceeded")]
    DeadlineExceeded,

    #[error("tool error: {0}")]
    Tool(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `DeadlineExceeded` and `BudgetExceeded` both resolve to an aggregate
    /// `BLOCK`; everything else is a pipeline abort.
    pub fn forces_block(&self) -> bool {
        matches!(self, CoreError::DeadlineExceeded)
    }
}

/// The council scheduler's error type (spec.md §4.9): a typed `CoreError`
/// where the failure maps onto the governance taxonomy, otherwise the
/// provider/runtime error that caused it.
#[derive(Debug, thiserror::Error)]
pub enum CouncilError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("provider error: {0}")]
    Provider(#[from] anyhow::Error),
}
