//! Shared usage accounting for one top-level run.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// Point-in-time view of a run's consumption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub tool_calls: u64,
}

impl UsageSnapshot {
    pub fn total_tokens(&self) -> u64 {
        self.tokens_in.saturating_add(self.tokens_out)
    }
}

/// Cumulative counters shared by a run and all of its nested invocations.
///
/// Counters only ever grow. Every increment is applied under one short lock,
/// so concurrent branches never lose or double-count an update.
#[derive(Debug)]
pub struct UsageTracker {
    counters: Mutex<UsageSnapshot>,
    token_budget: Option<u64>,
}

impl UsageTracker {
    pub fn new(token_budget: Option<u64>) -> Self {
        Self {
            counters: Mutex::new(UsageSnapshot::default()),
            token_budget,
        }
    }

    /// Record consumption and return the updated totals.
    ///
    /// The increment is always applied, since it describes work already done.
    /// Fails with [`Error::BudgetExceeded`] once total tokens pass the budget.
    pub fn increment(&self, tokens_in: u64, tokens_out: u64, tool_calls: u64) -> Result<UsageSnapshot> {
        let snapshot = {
            let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
            counters.tokens_in = counters.tokens_in.saturating_add(tokens_in);
            counters.tokens_out = counters.tokens_out.saturating_add(tokens_out);
            counters.tool_calls = counters.tool_calls.saturating_add(tool_calls);
            *counters
        };

        match self.token_budget {
            Some(budget) if snapshot.total_tokens() > budget => Err(Error::BudgetExceeded {
                used: snapshot.total_tokens(),
                budget,
            }),
            _ => Ok(snapshot),
        }
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        *self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn token_budget(&self) -> Option<u64> {
        self.token_budget
    }
}
