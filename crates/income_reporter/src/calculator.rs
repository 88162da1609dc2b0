use income_proto::{
    find_denom_amount, parse_integer_amount, parse_leading_digits, IncomeBreakdown, Run,
};
use tracing::debug;

use crate::address_codec::validator_operator_for;
use crate::chain_api::{ChainApi, TransactionFilter};
use crate::config::IncomeConfig;
use crate::ReportError;

/// Computes pending rewards, pending commission and reward withdrawals for
/// one account at one run.
#[derive(Debug, Clone)]
pub struct IncomeCalculator<C> {
    chain: C,
    config: IncomeConfig,
}

impl<C: ChainApi> IncomeCalculator<C> {
    pub fn new(chain: C, config: IncomeConfig) -> Self {
        Self { chain, config }
    }

    pub fn generate(
        &self,
        address: &str,
        run: &Run,
        prev_run: Option<&Run>,
    ) -> Result<IncomeBreakdown, ReportError> {
        let income = IncomeBreakdown {
            pending_rewards: self.pending_rewards(address, run)?,
            pending_commission: self.pending_commission(address, run)?,
            withdrawals: self.withdrawals(address, run, prev_run)?,
        };
        debug!(
            address,
            height = run.height,
            pending_rewards = %income.pending_rewards,
            pending_commission = %income.pending_commission,
            withdrawals = %income.withdrawals,
            "income computed"
        );
        Ok(income)
    }

    pub fn pending_rewards(&self, address: &str, run: &Run) -> Result<u128, ReportError> {
        let rewards = self
            .chain
            .get_pending_rewards(address, run.height)?
            .unwrap_or_default();
        let Some(coin) = find_denom_amount(&rewards, &self.config.denom) else {
            return Ok(0);
        };
        parse_integer_amount(&coin.amount).map_err(|reason| ReportError::Parse {
            field: "pending_rewards".to_string(),
            value: coin.amount.clone(),
            reason,
        })
    }

    pub fn pending_commission(&self, address: &str, run: &Run) -> Result<u128, ReportError> {
        let operator = validator_operator_for(address, self.config.validator_prefix.as_deref())?;
        let commission = self
            .chain
            .get_validator_distribution_info(&operator, run.height)?
            .and_then(|info| info.val_commission);
        let Some(commission) = commission else {
            return Ok(0);
        };
        let Some(coin) = find_denom_amount(&commission, &self.config.denom) else {
            return Ok(0);
        };
        parse_leading_digits(&coin.amount).map_err(|reason| ReportError::Parse {
            field: "pending_commission".to_string(),
            value: coin.amount.clone(),
            reason,
        })
    }

    /// Reward payouts received in `(prev_run.height, run.height]`, or
    /// `[1, run.height]` for the first run.
    pub fn withdrawals(
        &self,
        address: &str,
        run: &Run,
        prev_run: Option<&Run>,
    ) -> Result<u128, ReportError> {
        let start_height = Run::window_start(prev_run);
        let filter =
            TransactionFilter::recipient(address).with_height_range(start_height, run.height);
        let transactions = self.chain.get_transactions(&filter)?;

        let mut total: u128 = 0;
        for tx in transactions.iter().filter(|tx| {
            tx.succeeded
                && tx.is_between(start_height, run.height)
                && tx.is_reward_disbursement(self.config.network)
        }) {
            let amount = tx
                .disbursement(address, &self.config.denom)
                .map_err(|reason| ReportError::Parse {
                    field: "withdrawals".to_string(),
                    value: tx.hash.clone(),
                    reason,
                })?;
            total = total
                .checked_add(amount)
                .ok_or_else(|| ReportError::Parse {
                    field: "withdrawals".to_string(),
                    value: tx.hash.clone(),
                    reason: "withdrawal total overflow".to_string(),
                })?;
        }
        Ok(total)
    }
}
