//! Periodic staking income reports: pending rewards, pending validator
//! commission and reward withdrawals per account and run.

pub mod address_codec;
pub mod calculator;
pub mod chain_api;
pub mod config;
pub mod eligibility;
mod error;
pub mod lcd_client;
pub mod orchestrator;
pub mod store;

pub use address_codec::{to_validator_operator, validator_operator_for};
pub use calculator::IncomeCalculator;
pub use chain_api::{ChainApi, TransactionFilter, ValidatorDistributionInfo};
pub use config::{IncomeConfig, ReporterConfig};
pub use eligibility::select_accounts;
pub use error::ReportError;
pub use income_proto::{
    Account, Coin, IncomeBreakdown, Network, Report, Run, RunStatus, Transaction, TransferEvent,
};
pub use lcd_client::LcdChainClient;
pub use orchestrator::{
    NoopProgress, RunBatchSummary, RunOrchestrator, RunOutcome, RunProgressObserver,
};
pub use store::{JsonFileReportStore, ReportLedger, ReportStore};
