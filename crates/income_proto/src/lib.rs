//! Data model shared by the income reporter: accounts, runs, reports,
//! chain coins and the transactions that carry reward payouts.

pub mod coin;
pub mod ledger;
pub mod transaction;

pub use coin::{
    find_denom_amount, parse_coin_list, parse_integer_amount, parse_leading_digits,
    truncate_dec_amount, Coin,
};
pub use ledger::{Account, IncomeBreakdown, Report, Run, RunStatus};
pub use transaction::{Network, Transaction, TransferEvent};
