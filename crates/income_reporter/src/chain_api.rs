use income_proto::{Coin, Transaction};
use serde::{Deserialize, Serialize};

use crate::ReportError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorDistributionInfo {
    #[serde(default)]
    pub val_commission: Option<Vec<Coin>>,
}

/// Selects transactions credited to `recipient`. The height bounds are a
/// hint; callers re-check heights themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionFilter {
    pub recipient: String,
    pub min_height: Option<u64>,
    pub max_height: Option<u64>,
}

impl TransactionFilter {
    pub fn recipient(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            min_height: None,
            max_height: None,
        }
    }

    pub fn with_height_range(mut self, min_height: u64, max_height: u64) -> Self {
        self.min_height = Some(min_height);
        self.max_height = Some(max_height);
        self
    }

    pub fn admits_height(&self, height: u64) -> bool {
        self.min_height.map_or(true, |min| height >= min)
            && self.max_height.map_or(true, |max| height <= max)
    }
}

/// Read-only view of the chain at a given height.
pub trait ChainApi {
    fn get_pending_rewards(
        &self,
        address: &str,
        height: u64,
    ) -> Result<Option<Vec<Coin>>, ReportError>;

    fn get_validator_distribution_info(
        &self,
        operator_address: &str,
        height: u64,
    ) -> Result<Option<ValidatorDistributionInfo>, ReportError>;

    fn get_transactions(&self, filter: &TransactionFilter)
        -> Result<Vec<Transaction>, ReportError>;
}

impl<T: ChainApi + ?Sized> ChainApi for &T {
    fn get_pending_rewards(
        &self,
        address: &str,
        height: u64,
    ) -> Result<Option<Vec<Coin>>, ReportError> {
        (**self).get_pending_rewards(address, height)
    }

    fn get_validator_distribution_info(
        &self,
        operator_address: &str,
        height: u64,
    ) -> Result<Option<ValidatorDistributionInfo>, ReportError> {
        (**self).get_validator_distribution_info(operator_address, height)
    }

    fn get_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, ReportError> {
        (**self).get_transactions(filter)
    }
}
