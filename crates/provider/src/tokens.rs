use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use warden_config::TokenBudgetConfig;

use crate::types::{ChatRequest, Message, Role};

/// Rough chars-per-token ratio used when a provider has no tokenizer of
/// its own available. English prose averages ~4 characters per token;
/// this is deliberately conservative (overestimates) so budget checks
/// err on the side of stopping early rather than overrunning a cap.
const BYTES_PER_TOKEN_ESTIMATE: f64 = 3.5;

/// Estimates the token count of a text span. Providers that expose a real
/// tokenizer should prefer that path; this is the fallback used when none
/// is wired up.
pub fn estimate_tokens(text: &str) -> u32 {
    ((text.len() as f64 / BYTES_PER_TOKEN_ESTIMATE).ceil() as u32).max(1)
}

pub fn estimate_request_tokens(request: &ChatRequest) -> u32 {
    let mut total = 0u32;
    if let Some(system) = &request.system {
        total += estimate_tokens(system);
    }
    for msg in &request.messages {
        total += estimate_tokens(msg.content.as_text());
    }
    total
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    Ok,
    Alert,
    HardStop,
}

/// Tracks token spend at request/session/day granularity and reports
/// whether a prospective request would cross the alert or hard-stop
/// thresholds. Counters are atomics so a single `TokenManager` can be
/// shared across concurrently running council members.
pub struct TokenManager {
    budget: TokenBudgetConfig,
    session_spent: AtomicU64,
    day_spent: AtomicU64,
}

pub type TokenManagerHandle = Arc<TokenManager>;

impl TokenManager {
    pub fn new(budget: TokenBudgetConfig) -> Self {
        Self {
            budget,
            session_spent: AtomicU64::new(0),
            day_spent: AtomicU64::new(0),
        }
    }

    pub fn handle(budget: TokenBudgetConfig) -> TokenManagerHandle {
        Arc::new(Self::new(budget))
    }

    /// Checks whether `estimated` additional tokens would breach the
    /// per-request cap outright, or push session/day spend past the
    /// alert or hard-stop ratio of their caps.
    pub fn check(&self, estimated: u32) -> BudgetStatus {
        if estimated > self.budget.per_request_cap {
            return BudgetStatus::HardStop;
        }

        let session_after = self.session_spent.load(Ordering::Relaxed) + estimated as u64;
        let day_after = self.day_spent.load(Ordering::Relaxed) + estimated as u64;

        let session_ratio = session_after as f64 / self.budget.per_session_cap as f64;
        let day_ratio = day_after as f64 / self.budget.per_day_cap as f64;
        let worst_ratio = session_ratio.max(day_ratio);

        if worst_ratio >= self.budget.hard_stop_ratio {
            BudgetStatus::HardStop
        } else if worst_ratio >= self.budget.alert_ratio {
            BudgetStatus::Alert
        } else {
            BudgetStatus::Ok
        }
    }

    pub fn record(&self, spent: u32) {
        self.session_spent.fetch_add(spent as u64, Ordering::Relaxed);
        self.day_spent.fetch_add(spent as u64, Ordering::Relaxed);
    }

    pub fn session_spent(&self) -> u64 {
        self.session_spent.load(Ordering::Relaxed)
    }

    pub fn day_spent(&self) -> u64 {
        self.day_spent.load(Ordering::Relaxed)
    }

    pub fn reset_session(&self) {
        self.session_spent.store(0, Ordering::Relaxed);
    }

    pub fn reset_day(&self) {
        self.day_spent.store(0, Ordering::Relaxed);
    }
}

/// Trims a message history to fit within `target_tokens`, preserving the
/// system turn (handled separately by the caller) and the most recent
/// user turn, dropping the oldest intermediate turns first (FIFO).
pub fn trim_to_budget(messages: &[Message], target_tokens: u32) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }

    let last_user_idx = messages
        .iter()
        .rposition(|m| m.role == Role::User)
        .unwrap_or(messages.len() - 1);

    let mut used = estimate_tokens(messages[last_user_idx].content.as_text());
    let mut kept_indices = vec![last_user_idx];

    for idx in (0..messages.len()).rev() {
        if idx == last_user_idx {
            continue;
        }
        let cost = estimate_tokens(messages[idx].content.as_text());
        if used + cost > target_tokens {
            continue;
        }
        used += cost;
        kept_indices.push(idx);
    }

    kept_indices.sort_unstable();
    kept_indices
        .into_iter()
        .map(|idx| messages[idx].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageContent;

    fn budget() -> TokenBudgetConfig {
        TokenBudgetConfig {
            per_request_cap: 1000,
            per_session_cap: 10_000,
            per_day_cap: 100_000,
            alert_ratio: 0.8,
            hard_stop_ratio: 0.95,
        }
    }

    #[test]
    fn request_over_cap_hard_stops_immediately() {
        let mgr = TokenManager::new(budget());
        assert_eq!(mgr.check(2000), BudgetStatus::HardStop);
    }

    #[test]
    fn session_spend_crosses_alert_then_hard_stop() {
        let mgr = TokenManager::new(budget());
        mgr.record(7500);
        assert_eq!(mgr.check(1000), BudgetStatus::Alert);
        mgr.record(1500);
        assert_eq!(mgr.check(100), BudgetStatus::HardStop);
    }

    #[test]
    fn estimate_tokens_is_never_zero_for_nonempty_text() {
        assert!(estimate_tokens("hi") >= 1);
    }

    #[test]
    fn trim_preserves_most_recent_user_turn() {
        let messages = vec![
            Message {
                role: Role::User,
                content: MessageContent::Text("a".repeat(50)),
            },
            Message {
                role: Role::Assistant,
                content: MessageContent::Text("b".repeat(50)),
            },
            Message {
                role: Role::User,
                content: MessageContent::Text("latest question".into()),
            },
        ];
        let trimmed = trim_to_budget(&messages, 5);
        assert!(trimmed
            .iter()
            .any(|m| m.content.as_text() == "latest question"));
    }
}
