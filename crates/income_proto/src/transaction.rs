use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::coin::{parse_integer_amount, Coin};

const COSMOSHUB_3_REWARD_MESSAGE_TYPES: &[&str] = &[
    "cosmos-sdk/MsgWithdrawDelegationReward",
    "cosmos-sdk/MsgWithdrawValidatorCommission",
];

const COSMOSHUB_4_REWARD_MESSAGE_TYPES: &[&str] = &[
    "/cosmos.distribution.v1beta1.MsgWithdrawDelegatorReward",
    "/cosmos.distribution.v1beta1.MsgWithdrawValidatorCommission",
];

/// Chain generation. Each one names reward payouts with different message
/// types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    #[serde(rename = "cosmoshub-3")]
    CosmosHub3,
    #[serde(rename = "cosmoshub-4")]
    CosmosHub4,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::CosmosHub3 => "cosmoshub-3",
            Network::CosmosHub4 => "cosmoshub-4",
        }
    }

    pub fn reward_message_types(self) -> &'static [&'static str] {
        match self {
            Network::CosmosHub3 => COSMOSHUB_3_REWARD_MESSAGE_TYPES,
            Network::CosmosHub4 => COSMOSHUB_4_REWARD_MESSAGE_TYPES,
        }
    }

    pub fn is_reward_message(self, message_type: &str) -> bool {
        self.reward_message_types()
            .iter()
            .any(|known| *known == message_type)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cosmoshub-3" => Ok(Network::CosmosHub3),
            "cosmoshub-4" => Ok(Network::CosmosHub4),
            _ => Err(format!("unsupported network: {}", raw)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub sender: String,
    pub recipient: String,
    #[serde(default)]
    pub amount: Vec<Coin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub height: u64,
    pub succeeded: bool,
    #[serde(default)]
    pub message_types: Vec<String>,
    #[serde(default)]
    pub transfers: Vec<TransferEvent>,
}

impl Transaction {
    pub fn is_between(&self, start_height: u64, end_height: u64) -> bool {
        start_height <= self.height && self.height <= end_height
    }

    pub fn is_reward_disbursement(&self, network: Network) -> bool {
        self.message_types
            .iter()
            .any(|message_type| network.is_reward_message(message_type))
    }

    /// Total credited to `recipient` in `denom` across this transaction's
    /// transfer events.
    pub fn disbursement(&self, recipient: &str, denom: &str) -> Result<u128, String> {
        let mut total: u128 = 0;
        for transfer in self
            .transfers
            .iter()
            .filter(|transfer| transfer.recipient == recipient)
        {
            for coin in transfer.amount.iter().filter(|coin| coin.denom == denom) {
                let amount = parse_integer_amount(&coin.amount)
                    .map_err(|err| format!("tx {} transfer: {}", self.hash, err))?;
                total = total.checked_add(amount).ok_or_else(|| {
                    format!("tx {} disbursement overflow for {}", self.hash, recipient)
                })?;
            }
        }
        Ok(total)
    }
}
