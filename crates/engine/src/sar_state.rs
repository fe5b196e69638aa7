//! `SARTypeState` / `IterationRecord` (spec §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SarState {
    Pending,
    Searching,
    Assessing,
    Refining,
    Complete,
    Failed,
    Skipped,
}

impl SarState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SarState::Complete | SarState::Failed | SarState::Skipped)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub queries_generated: u32,
    pub queries_executed: u32,
    pub successful_queries: u32,
    pub new_facts: u32,
    pub cumulative_facts: u32,
    pub confidence_score: f64,
    pub gaps: Vec<String>,
    pub info_gain_rate: f64,
}

impl IterationRecord {
    pub fn gain_rate(new_facts: u32, queries_executed: u32) -> f64 {
        if queries_executed == 0 {
            0.0
        } else {
            new_facts as f64 / queries_executed as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarTypeState {
    pub state: SarState,
    pub iteration: u32,
    pub history: Vec<IterationRecord>,
    pub terminal_reason: Option<String>,
}

impl Default for SarTypeState {
    fn default() -> Self {
        Self {
            state: SarState::Pending,
            iteration: 0,
            history: Vec::new(),
            terminal_reason: None,
        }
    }
}

impl SarTypeState {
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.state = SarState::Skipped;
        self.terminal_reason = Some(reason.into());
    }

    pub fn cumulative_facts(&self) -> u32 {
        self.history.last().map(|r| r.cumulative_facts).unwrap_or(0)
    }
}
