//! Chain API over the Cosmos SDK REST gateway (LCD).

use std::time::Duration;

use income_proto::{parse_coin_list, truncate_dec_amount, Coin, Transaction, TransferEvent};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::chain_api::{ChainApi, TransactionFilter, ValidatorDistributionInfo};
use crate::config::ReporterConfig;
use crate::ReportError;

pub const BLOCK_HEIGHT_HEADER: &str = "x-cosmos-block-height";

#[derive(Debug, Clone)]
pub struct LcdChainClient {
    base_url: String,
    page_limit: u64,
    client: Client,
}

impl LcdChainClient {
    pub fn from_config(config: &ReporterConfig) -> Result<Self, ReportError> {
        Self::new(
            config.lcd_url.as_str(),
            Duration::from_millis(config.timeout_ms),
            config.tx_page_limit,
        )
    }

    pub fn new(base_url: &str, timeout: Duration, page_limit: u64) -> Result<Self, ReportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ReportError::query("build_lcd_client", err.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            page_limit: page_limit.max(1),
            client,
        })
    }

    fn get_at_height<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        height: u64,
        missing: MissingEntity,
    ) -> Result<Option<T>, ReportError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(url)
            .header(BLOCK_HEIGHT_HEADER, height.to_string())
            .send()
            .map_err(|err| ReportError::query(operation, err.to_string()))?;
        decode_optional(operation, response, missing)
    }

    fn get_transaction_page(
        &self,
        filter: &TransactionFilter,
        offset: u64,
    ) -> Result<LcdTxPage, ReportError> {
        let url = format!("{}/cosmos/tx/v1beta1/txs", self.base_url);
        let params = [
            ("events", format!("transfer.recipient='{}'", filter.recipient)),
            ("pagination.offset", offset.to_string()),
            ("pagination.limit", self.page_limit.to_string()),
            ("pagination.count_total", "true".to_string()),
            ("order_by", "ORDER_BY_ASC".to_string()),
        ];
        let response = self
            .client
            .get(url)
            .query(&params)
            .send()
            .map_err(|err| ReportError::query("get_transactions", err.to_string()))?;
        decode_optional("get_transactions", response, MissingEntity::Fail)
            .map(|page: Option<LcdTxPage>| page.unwrap_or_default())
    }
}

/// How an error response naming a missing entity is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MissingEntity {
    Fail,
    /// The queried address is not a validator.
    ValidatorAbsent,
}

fn decode_optional<T: DeserializeOwned>(
    operation: &str,
    response: Response,
    missing: MissingEntity,
) -> Result<Option<T>, ReportError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().unwrap_or_else(|_| "<no body>".to_string());
        if missing == MissingEntity::ValidatorAbsent
            && (status == StatusCode::NOT_FOUND || is_missing_validator(&message))
        {
            return Ok(None);
        }
        return Err(ReportError::query(
            operation,
            format!("http status {}: {}", status.as_u16(), message),
        ));
    }
    response
        .json::<T>()
        .map(Some)
        .map_err(|err| ReportError::query(operation, format!("decode response failed: {}", err)))
}

fn is_missing_validator(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("validator")
        && (message.contains("does not exist") || message.contains("not found"))
}

impl ChainApi for LcdChainClient {
    fn get_pending_rewards(
        &self,
        address: &str,
        height: u64,
    ) -> Result<Option<Vec<Coin>>, ReportError> {
        let path = format!("/cosmos/distribution/v1beta1/delegators/{}/rewards", address);
        let Some(rewards) =
            self.get_at_height::<LcdDelegatorRewards>(
                "get_pending_rewards",
                &path,
                height,
                MissingEntity::Fail,
            )?
        else {
            return Ok(None);
        };
        let total = rewards
            .total
            .into_iter()
            .map(|coin| {
                truncate_dec_amount(&coin.amount)
                    .map(|amount| Coin::new(amount, coin.denom.as_str()))
                    .map_err(|reason| ReportError::Parse {
                        field: "pending_rewards".to_string(),
                        value: coin.amount.clone(),
                        reason,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(total))
    }

    fn get_validator_distribution_info(
        &self,
        operator_address: &str,
        height: u64,
    ) -> Result<Option<ValidatorDistributionInfo>, ReportError> {
        let path = format!(
            "/cosmos/distribution/v1beta1/validators/{}/commission",
            operator_address
        );
        let response = self.get_at_height::<LcdValidatorCommission>(
            "get_validator_distribution_info",
            &path,
            height,
            MissingEntity::ValidatorAbsent,
        )?;
        Ok(response.map(|response| ValidatorDistributionInfo {
            val_commission: response.commission.map(|commission| commission.commission),
        }))
    }

    fn get_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, ReportError> {
        let mut transactions = Vec::new();
        let mut offset: u64 = 0;
        loop {
            let page = self.get_transaction_page(filter, offset)?;
            let fetched = page.tx_responses.len() as u64;
            let total = page
                .pagination
                .as_ref()
                .and_then(|pagination| pagination.total.as_deref())
                .and_then(|total| total.parse::<u64>().ok());
            debug!(
                recipient = %filter.recipient,
                offset,
                fetched,
                total = ?total,
                "fetched transaction page"
            );
            for (index, response) in page.tx_responses.into_iter().enumerate() {
                let message_types: Vec<String> = page
                    .txs
                    .get(index)
                    .map(|tx| {
                        tx.body
                            .messages
                            .iter()
                            .map(|message| message.type_url.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                let tx = response.into_transaction(message_types)?;
                if filter.admits_height(tx.height) {
                    transactions.push(tx);
                }
            }
            offset += fetched;
            if transaction_paging_done(offset, fetched, total) {
                break;
            }
        }
        Ok(transactions)
    }
}

/// The node may serve fewer rows than requested, so a short page does not
/// end the search. Paging stops at the reported total, or at the first
/// empty page when no total is reported.
fn transaction_paging_done(offset: u64, fetched: u64, total: Option<u64>) -> bool {
    match total {
        Some(total) => fetched == 0 || offset >= total,
        None => fetched == 0,
    }
}

#[derive(Debug, Deserialize)]
struct LcdDelegatorRewards {
    #[serde(default)]
    total: Vec<Coin>,
}

#[derive(Debug, Deserialize)]
struct LcdValidatorCommission {
    #[serde(default)]
    commission: Option<LcdCommission>,
}

#[derive(Debug, Deserialize)]
struct LcdCommission {
    #[serde(default)]
    commission: Vec<Coin>,
}

#[derive(Debug, Default, Deserialize)]
struct LcdTxPage {
    #[serde(default)]
    txs: Vec<LcdTx>,
    #[serde(default)]
    tx_responses: Vec<LcdTxResponse>,
    #[serde(default)]
    pagination: Option<LcdPagination>,
}

#[derive(Debug, Deserialize)]
struct LcdPagination {
    #[serde(default)]
    total: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LcdTx {
    body: LcdTxBody,
}

#[derive(Debug, Deserialize)]
struct LcdTxBody {
    #[serde(default)]
    messages: Vec<LcdMessage>,
}

#[derive(Debug, Deserialize)]
struct LcdMessage {
    #[serde(rename = "@type")]
    type_url: String,
}

#[derive(Debug, Deserialize)]
struct LcdTxResponse {
    height: String,
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    logs: Vec<LcdLog>,
    #[serde(default)]
    events: Vec<LcdEvent>,
}

#[derive(Debug, Deserialize)]
struct LcdLog {
    #[serde(default)]
    events: Vec<LcdEvent>,
}

#[derive(Debug, Deserialize)]
struct LcdEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Vec<LcdAttribute>,
}

#[derive(Debug, Deserialize)]
struct LcdAttribute {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

impl LcdTxResponse {
    fn into_transaction(self, message_types: Vec<String>) -> Result<Transaction, ReportError> {
        let height = self.height.parse::<u64>().map_err(|err| ReportError::Parse {
            field: "tx_height".to_string(),
            value: self.height.clone(),
            reason: err.to_string(),
        })?;
        // Per-message logs carry the transfers up to SDK 0.46; later versions
        // only populate the flat event list.
        let events: Vec<&LcdEvent> = if self.logs.is_empty() {
            self.events.iter().collect()
        } else {
            self.logs.iter().flat_map(|log| log.events.iter()).collect()
        };
        let transfers = transfer_events(&events).map_err(|reason| ReportError::Parse {
            field: "transfer_amount".to_string(),
            value: self.txhash.clone(),
            reason,
        })?;
        Ok(Transaction {
            hash: self.txhash,
            height,
            succeeded: self.code == 0,
            message_types,
            transfers,
        })
    }
}

#[derive(Debug, Default)]
struct PartialTransfer {
    sender: String,
    recipient: String,
    amount: String,
}

impl PartialTransfer {
    fn finish(self) -> Result<TransferEvent, String> {
        Ok(TransferEvent {
            sender: self.sender,
            recipient: self.recipient,
            amount: parse_coin_list(&self.amount)?,
        })
    }
}

/// Splits `transfer` events into (recipient, sender, amount) groups. One
/// event may carry several transfers as a flat attribute list.
fn transfer_events(events: &[&LcdEvent]) -> Result<Vec<TransferEvent>, String> {
    let mut transfers = Vec::new();
    for event in events.iter().filter(|event| event.kind == "transfer") {
        let mut current: Option<PartialTransfer> = None;
        for attribute in &event.attributes {
            let value = attribute.value.clone().unwrap_or_default();
            match attribute.key.as_str() {
                "recipient" => {
                    if let Some(done) = current.take() {
                        transfers.push(done.finish()?);
                    }
                    current = Some(PartialTransfer {
                        recipient: value,
                        ..PartialTransfer::default()
                    });
                }
                "sender" => current.get_or_insert_with(PartialTransfer::default).sender = value,
                "amount" => current.get_or_insert_with(PartialTransfer::default).amount = value,
                _ => {}
            }
        }
        if let Some(done) = current.take() {
            transfers.push(done.finish()?);
        }
    }
    Ok(transfers)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};
    use std::thread;

    use super::*;

    fn tx_page_body(heights: &[u64], total: &str) -> String {
        let txs: Vec<String> = heights
            .iter()
            .map(|_| {
                r#"{"body":{"messages":[{"@type":"/cosmos.distribution.v1beta1.MsgWithdrawDelegatorReward"}]}}"#
                    .to_string()
            })
            .collect();
        let responses: Vec<String> = heights
            .iter()
            .map(|height| {
                format!(
                    r#"{{"height":"{height}","txhash":"TX{height}","code":0,"events":[{{"type":"transfer","attributes":[{{"key":"recipient","value":"cosmos1me"}},{{"key":"sender","value":"cosmos1distr"}},{{"key":"amount","value":"{height}uatom"}}]}}]}}"#
                )
            })
            .collect();
        format!(
            r#"{{"txs":[{}],"tx_responses":[{}],"pagination":{{"next_key":null,"total":"{}"}}}}"#,
            txs.join(","),
            responses.join(","),
            total
        )
    }

    /// Serves `bodies` in order, one connection each, recording request lines.
    fn serve_pages(bodies: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let requests_clone = Arc::clone(&requests);
        let count = bodies.len();
        let handle = thread::spawn(move || {
            let mut bodies = bodies.into_iter();
            for incoming in listener.incoming().take(count) {
                let mut stream = match incoming {
                    Ok(stream) => stream,
                    Err(_) => break,
                };
                let mut request_buf = [0_u8; 4096];
                let read = stream.read(&mut request_buf).unwrap_or(0);
                let request = String::from_utf8_lossy(&request_buf[..read]).to_string();
                let request_line = request.lines().next().unwrap_or_default().to_string();
                requests_clone.lock().expect("requests").push(request_line);
                let body = bodies.next().unwrap_or_default();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });
        (format!("http://{}", addr), requests, handle)
    }

    #[test]
    fn get_transactions_keeps_paging_past_short_pages_until_total() {
        let (base_url, requests, handle) = serve_pages(vec![
            tx_page_body(&[10, 20], "4"),
            tx_page_body(&[30, 40], "4"),
        ]);
        let client =
            LcdChainClient::new(&base_url, Duration::from_secs(5), 3).expect("client");
        let transactions = client
            .get_transactions(&TransactionFilter::recipient("cosmos1me"))
            .expect("transactions");
        handle.join().expect("server");

        let heights: Vec<u64> = transactions.iter().map(|tx| tx.height).collect();
        assert_eq!(heights, vec![10, 20, 30, 40]);
        let requests = requests.lock().expect("requests");
        assert_eq!(requests.len(), 2);
        assert!(requests[0].contains("pagination.offset=0"));
        assert!(requests[1].contains("pagination.offset=2"));
        assert!(requests[1].contains("pagination.limit=3"));
    }

    #[test]
    fn get_transactions_applies_height_window_across_pages() {
        let (base_url, _requests, handle) = serve_pages(vec![
            tx_page_body(&[10, 20], "4"),
            tx_page_body(&[30, 40], "4"),
        ]);
        let client =
            LcdChainClient::new(&base_url, Duration::from_secs(5), 2).expect("client");
        let filter = TransactionFilter::recipient("cosmos1me").with_height_range(15, 35);
        let transactions = client.get_transactions(&filter).expect("transactions");
        handle.join().expect("server");

        let heights: Vec<u64> = transactions.iter().map(|tx| tx.height).collect();
        assert_eq!(heights, vec![20, 30]);
        assert_eq!(transactions[1].disbursement("cosmos1me", "uatom").expect("sum"), 30);
    }

    #[test]
    fn paging_stops_at_total_or_first_empty_page() {
        assert!(!transaction_paging_done(2, 2, Some(4)));
        assert!(transaction_paging_done(4, 2, Some(4)));
        assert!(transaction_paging_done(2, 0, Some(4)));
        assert!(!transaction_paging_done(100, 100, None));
        assert!(!transaction_paging_done(150, 50, None));
        assert!(transaction_paging_done(150, 0, None));
    }

    #[test]
    fn tx_page_decodes_messages_and_flat_transfer_groups() {
        let body = r#"{
            "txs": [
                {"body": {"messages": [
                    {"@type": "/cosmos.distribution.v1beta1.MsgWithdrawDelegatorReward", "delegator_address": "cosmos1me"}
                ]}}
            ],
            "tx_responses": [
                {
                    "height": "150",
                    "txhash": "ABCD",
                    "code": 0,
                    "logs": [{"msg_index": 0, "events": [
                        {"type": "message", "attributes": [{"key": "action", "value": "withdraw"}]},
                        {"type": "transfer", "attributes": [
                            {"key": "recipient", "value": "cosmos1me"},
                            {"key": "sender", "value": "cosmos1distr"},
                            {"key": "amount", "value": "300uatom,4ibc/AB"},
                            {"key": "recipient", "value": "cosmos1other"},
                            {"key": "sender", "value": "cosmos1distr"},
                            {"key": "amount", "value": "9uatom"}
                        ]}
                    ]}],
                    "events": []
                }
            ],
            "pagination": {"next_key": null, "total": "1"}
        }"#;
        let mut page: LcdTxPage = serde_json::from_str(body).expect("page");
        assert_eq!(page.pagination.as_ref().and_then(|p| p.total.as_deref()), Some("1"));
        let message_types = vec![page.txs[0].body.messages[0].type_url.clone()];
        let tx = page
            .tx_responses
            .remove(0)
            .into_transaction(message_types)
            .expect("transaction");
        assert_eq!(tx.height, 150);
        assert!(tx.succeeded);
        assert_eq!(tx.transfers.len(), 2);
        assert_eq!(tx.transfers[0].recipient, "cosmos1me");
        assert_eq!(tx.transfers[0].amount[0], Coin::new("300", "uatom"));
        assert_eq!(tx.disbursement("cosmos1me", "uatom").expect("sum"), 300);
        assert!(tx.is_reward_disbursement(income_proto::Network::CosmosHub4));
    }

    #[test]
    fn flat_events_are_used_when_logs_are_empty() {
        let body = r#"{
            "height": "77",
            "txhash": "EF",
            "code": 5,
            "events": [
                {"type": "transfer", "attributes": [
                    {"key": "recipient", "value": "cosmos1me"},
                    {"key": "sender", "value": "cosmos1distr"},
                    {"key": "amount", "value": "12uatom"},
                    {"key": "msg_index", "value": "0"}
                ]},
                {"type": "transfer", "attributes": [
                    {"key": "recipient", "value": "cosmos1me"},
                    {"key": "sender", "value": "cosmos1distr"},
                    {"key": "amount", "value": "8uatom"}
                ]}
            ]
        }"#;
        let response: LcdTxResponse = serde_json::from_str(body).expect("response");
        let tx = response.into_transaction(Vec::new()).expect("transaction");
        assert!(!tx.succeeded);
        assert_eq!(tx.transfers.len(), 2);
        assert_eq!(tx.disbursement("cosmos1me", "uatom").expect("sum"), 20);
    }

    #[test]
    fn malformed_transfer_amount_is_a_parse_error() {
        let body = r#"{
            "height": "77",
            "txhash": "EF",
            "logs": [{"events": [{"type": "transfer", "attributes": [
                {"key": "recipient", "value": "cosmos1me"},
                {"key": "amount", "value": "uatom"}
            ]}]}]
        }"#;
        let response: LcdTxResponse = serde_json::from_str(body).expect("response");
        assert!(matches!(
            response.into_transaction(Vec::new()),
            Err(ReportError::Parse { .. })
        ));
    }

    #[test]
    fn commission_response_maps_to_val_commission() {
        let body = r#"{"commission": {"commission": [{"denom": "uatom", "amount": "1234.560000000000000000"}]}}"#;
        let response: LcdValidatorCommission = serde_json::from_str(body).expect("commission");
        let coins = response.commission.expect("commission").commission;
        assert_eq!(coins, vec![Coin::new("1234.560000000000000000", "uatom")]);
    }

    #[test]
    fn missing_validator_messages_are_recognised() {
        assert!(is_missing_validator(
            "{\"code\":5,\"message\":\"validator does not exist\"}"
        ));
        assert!(is_missing_validator("rpc error: code = NotFound desc = validator not found"));
        assert!(!is_missing_validator(
            "failed to load state at height 10; version does not exist"
        ));
    }
}
