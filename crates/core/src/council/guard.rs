//! Bounds the number of role workers running at once and serializes access
//! to the shared AI service. Generalizes the depth/thread-count guard used
//! for sub-agent spawning into a semaphore-based concurrency limiter, since
//! a council run's parallelism is a fixed pool size rather than an unbounded
//! fan-out (spec.md §4.9 step 1).

use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

use anyhow::Result;
use warden_auth::Vault;
use warden_config::Config;
use warden_provider::{ChatRequest, ChatResponse};

pub const DEFAULT_MAX_PARALLEL: usize = 3;
/// Delegation is capped at one hop for the adk engine (spec.md §4.9 engines).
pub const MAX_DELEGATION_DEPTH: u32 = 2;

/// Shared handle a role worker acquires for the duration of its turn, then
/// releases while it does local (non-provider) work such as tool execution.
pub struct CouncilGuard {
    semaphore: Arc<Semaphore>,
    ai_lock: Arc<Mutex<()>>,
}

impl CouncilGuard {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_parallel.max(1))),
            ai_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn acquire_slot(&self) -> SemaphorePermit<'_> {
        self.semaphore
            .acquire()
            .await
            .expect("semaphore never closed during a council run")
    }

    /// Runs one provider call under the shared lock. The lock is held only
    /// for the call itself; tool execution and parsing happen outside it.
    pub async fn call(
        &self,
        config: &Config,
        vault: Option<&Vault>,
        request: &ChatRequest,
    ) -> Result<(String, ChatResponse)> {
        let _guard = self.ai_lock.lock().await;
        warden_provider::chat_with_fallback(config, vault, request).await
    }

    pub fn exceeds_delegation_depth(depth: u32) -> bool {
        depth > MAX_DELEGATION_DEPTH
    }
}

impl Clone for CouncilGuard {
    fn clone(&self) -> Self {
        Self {
            semaphore: self.semaphore.clone(),
            ai_lock: self.ai_lock.clone(),
        }
    }
}
