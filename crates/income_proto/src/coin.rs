use serde::{Deserialize, Serialize};

/// An amount of one denomination as reported by the chain. `amount` is kept
/// as the chain's decimal string; DecCoins carry fractional digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

impl Coin {
    pub fn new(amount: impl Into<String>, denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.into(),
        }
    }
}

/// First coin of `denom`, if any.
pub fn find_denom_amount<'a>(coins: &'a [Coin], denom: &str) -> Option<&'a Coin> {
    coins.iter().find(|coin| coin.denom == denom)
}

pub fn parse_integer_amount(raw: &str) -> Result<u128, String> {
    if raw.is_empty() {
        return Err("amount is empty".to_string());
    }
    if !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(format!("amount {} is not an unsigned integer", raw));
    }
    raw.parse::<u128>()
        .map_err(|err| format!("amount {} out of range: {}", raw, err))
}

/// Parses the leading run of ASCII digits, ignoring any fractional part or
/// unit suffix that follows it.
pub fn parse_leading_digits(raw: &str) -> Result<u128, String> {
    let end = raw
        .bytes()
        .position(|byte| !byte.is_ascii_digit())
        .unwrap_or(raw.len());
    if end == 0 {
        return Err(format!("amount {} has no leading digits", raw));
    }
    parse_integer_amount(&raw[..end])
}

/// Drops the fractional part of a DecCoin amount (`"12.75"` -> `"12"`).
pub fn truncate_dec_amount(raw: &str) -> Result<String, String> {
    let (integer, fraction) = match raw.split_once('.') {
        Some((integer, fraction)) => (integer, fraction),
        None => (raw, ""),
    };
    if integer.is_empty() || !integer.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(format!("decimal amount {} has no integer part", raw));
    }
    if !fraction.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(format!("decimal amount {} has a malformed fraction", raw));
    }
    Ok(integer.to_string())
}

/// Parses a coin list such as `"300uatom,12ibc/27394FB0"`. An empty string is
/// an empty list.
pub fn parse_coin_list(raw: &str) -> Result<Vec<Coin>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',').map(|part| parse_coin(part.trim())).collect()
}

fn parse_coin(raw: &str) -> Result<Coin, String> {
    let split = raw
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .ok_or_else(|| format!("coin {} has no denom", raw))?;
    let (amount, denom) = raw.split_at(split);
    if amount.is_empty() {
        return Err(format!("coin {} has no amount", raw));
    }
    if !denom.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
        return Err(format!("coin {} has an invalid denom", raw));
    }
    Ok(Coin::new(amount, denom))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_denom_amount_returns_first_match_or_none() {
        let coins = vec![
            Coin::new("7", "ustake"),
            Coin::new("11", "uatom"),
            Coin::new("13", "uatom"),
        ];
        assert_eq!(
            find_denom_amount(&coins, "uatom").map(|coin| coin.amount.as_str()),
            Some("11")
        );
        assert!(find_denom_amount(&coins, "uosmo").is_none());
        assert!(find_denom_amount(&[], "uatom").is_none());
    }

    #[test]
    fn parse_integer_amount_rejects_non_digits() {
        assert_eq!(parse_integer_amount("500").expect("amount"), 500);
        assert!(parse_integer_amount("").is_err());
        assert!(parse_integer_amount("12.5").is_err());
        assert!(parse_integer_amount("-3").is_err());
        assert!(parse_integer_amount("12uatom").is_err());
    }

    #[test]
    fn parse_leading_digits_strips_fraction_and_suffix() {
        assert_eq!(
            parse_leading_digits("1234.567000000000000000").expect("dec"),
            1234
        );
        assert_eq!(parse_leading_digits("42uatom").expect("suffix"), 42);
        assert_eq!(parse_leading_digits("0").expect("zero"), 0);
        assert!(parse_leading_digits(".5").is_err());
        assert!(parse_leading_digits("uatom").is_err());
    }

    #[test]
    fn truncate_dec_amount_keeps_integer_part() {
        assert_eq!(
            truncate_dec_amount("500.999999999999999999").expect("dec"),
            "500"
        );
        assert_eq!(truncate_dec_amount("17").expect("int"), "17");
        assert!(truncate_dec_amount(".1").is_err());
        assert!(truncate_dec_amount("1.2x").is_err());
    }

    #[test]
    fn parse_coin_list_splits_multi_denom_amounts() {
        let coins = parse_coin_list("300uatom, 12ibc/27394FB0,5.5udec").expect("coins");
        assert_eq!(
            coins,
            vec![
                Coin::new("300", "uatom"),
                Coin::new("12", "ibc/27394FB0"),
                Coin::new("5.5", "udec"),
            ]
        );
        assert!(parse_coin_list("").expect("empty").is_empty());
        assert!(parse_coin_list("uatom").is_err());
        assert!(parse_coin_list("300").is_err());
        assert!(parse_coin_list("300/x").is_err());
    }
}
