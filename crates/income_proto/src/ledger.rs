use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub first_seen_height: u64,
}

impl Account {
    pub fn new(address: impl Into<String>, first_seen_height: u64) -> Self {
        Self {
            address: address.into(),
            first_seen_height,
        }
    }

    pub fn existed_at(&self, height: u64) -> bool {
        self.first_seen_height <= height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Ok,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Ok => "ok",
            RunStatus::Error => "error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reporting cycle, anchored to an immutable chain height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub target_timestamp: i64,
    pub height: u64,
    pub status: RunStatus,
}

impl Run {
    pub fn pending(height: u64, target_timestamp: i64) -> Self {
        Self {
            target_timestamp,
            height,
            status: RunStatus::Pending,
        }
    }

    /// First height whose transactions belong to this run when `prev` is the
    /// run before it.
    pub fn window_start(prev: Option<&Run>) -> u64 {
        prev.map(|prev| prev.height.saturating_add(1)).unwrap_or(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeBreakdown {
    pub pending_rewards: u128,
    pub pending_commission: u128,
    pub withdrawals: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub address: String,
    pub run_height: u64,
    pub pending_rewards: u128,
    pub pending_commission: u128,
    pub withdrawals: u128,
}

impl Report {
    pub fn from_breakdown(address: impl Into<String>, run: &Run, income: &IncomeBreakdown) -> Self {
        Self {
            address: address.into(),
            run_height: run.height,
            pending_rewards: income.pending_rewards,
            pending_commission: income.pending_commission,
            withdrawals: income.withdrawals,
        }
    }

    pub fn income(&self) -> IncomeBreakdown {
        IncomeBreakdown {
            pending_rewards: self.pending_rewards,
            pending_commission: self.pending_commission,
            withdrawals: self.withdrawals,
        }
    }
}
