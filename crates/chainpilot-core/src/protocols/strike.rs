//! Strike ladder model and nearest-strike selection for option purchases.

use alloy_primitives::Address;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarketToken {
    #[schemars(with = "String")]
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrikeHandler {
    pub name: String,
    pub deprecated: bool,
    pub handler: Address,
    /// May be empty when the handler has no pool attached.
    pub pool: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrikeMeta {
    pub hook: Address,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub total_token_liquidity: String,
    pub available_token_liquidity: String,
    pub total_liquidity: String,
    pub available_liquidity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrikeInfo {
    #[serde(default)]
    pub total_liquidity: String,
    #[serde(default)]
    pub available_liquidity: String,
    #[serde(default)]
    pub utilization: String,
    #[serde(default)]
    pub apr: String,
    #[serde(default)]
    pub handler: StrikeHandler,
    #[serde(default)]
    pub meta: StrikeMeta,
    pub token: MarketToken,
}

/// One rung of the ladder as served by the options API: `{ "<price>": [StrikeInfo, ...] }`.
pub type StrikeEntry = BTreeMap<String, Vec<StrikeInfo>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrikeCandidate {
    pub strike_price: f64,
    pub price_difference: f64,
    pub percentage_diff: f64,
    pub total_liquidity: String,
    pub available_liquidity: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrikeMatch {
    pub strike_price: f64,
    pub strike_data: Vec<StrikeInfo>,
    pub price_difference: f64,
    pub percentage_diff: f64,
    /// Every other strike, most available liquidity first.
    pub alternatives: Vec<StrikeCandidate>,
}

impl StrikeMatch {
    pub fn primary(&self) -> &StrikeInfo {
        &self.strike_data[0]
    }

    /// Up to three alternatives that can absorb `amount`.
    pub fn sufficient_alternatives(&self, amount: f64) -> Vec<&StrikeCandidate> {
        self.alternatives
            .iter()
            .filter(|c| liquidity(&c.available_liquidity) >= amount)
            .take(3)
            .collect()
    }
}

/// Lenient numeric read of an API liquidity string; unparsable means zero.
pub fn liquidity(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(0.0)
}

/// Keep the rungs whose strikes are all denominated in `token`.
pub fn filter_by_token(ladder: Vec<StrikeEntry>, token: Address) -> Vec<StrikeEntry> {
    ladder
        .into_iter()
        .filter(|entry| {
            entry
                .values()
                .all(|data| data.iter().all(|s| s.token.address == token))
        })
        .collect()
}

/// Strike nearest to `target` by absolute price distance, rejected when its
/// relative distance exceeds `tolerance`.
pub fn find_closest(ladder: &[StrikeEntry], target: f64, tolerance: f64) -> Option<StrikeMatch> {
    let mut strikes: Vec<(StrikeCandidate, &Vec<StrikeInfo>)> = ladder
        .iter()
        .flat_map(|entry| entry.iter())
        .filter_map(|(price, data)| {
            let first = data.first()?;
            let strike_price = price.trim().parse::<f64>().ok()?;
            let price_difference = (strike_price - target).abs();
            Some((
                StrikeCandidate {
                    strike_price,
                    price_difference,
                    percentage_diff: price_difference / target,
                    total_liquidity: first.total_liquidity.clone(),
                    available_liquidity: first.available_liquidity.clone(),
                },
                data,
            ))
        })
        .collect();

    strikes.sort_by(|a, b| a.0.price_difference.total_cmp(&b.0.price_difference));
    let (closest, data) = strikes.first()?;
    if closest.percentage_diff > tolerance {
        return None;
    }

    let mut alternatives: Vec<StrikeCandidate> = strikes
        .iter()
        .filter(|(c, _)| c.strike_price != closest.strike_price)
        .map(|(c, _)| c.clone())
        .collect();
    alternatives.sort_by(|a, b| {
        liquidity(&b.available_liquidity).total_cmp(&liquidity(&a.available_liquidity))
    });

    Some(StrikeMatch {
        strike_price: closest.strike_price,
        strike_data: (*data).clone(),
        price_difference: closest.price_difference,
        percentage_diff: closest.percentage_diff,
        alternatives,
    })
}

// ---------------------------------------------------------------------------
// User-facing messages
// ---------------------------------------------------------------------------

pub fn no_strike_message(tolerance: f64, target: &str) -> String {
    format!(
        "No strike found within {:.2}% of target price: {}",
        tolerance * 100.0,
        target
    )
}

pub fn insufficient_liquidity_message(
    pair: &str,
    amount: &str,
    symbol: &str,
    matched: &StrikeMatch,
    target: f64,
) -> String {
    let mut msg = format!(
        "Insufficient liquidity in the {pair} market for the amount {amount} {symbol}. Available liquidity: {} {symbol}.",
        matched.primary().available_liquidity
    );
    let alternatives = matched.sufficient_alternatives(liquidity(amount));
    if !alternatives.is_empty() {
        msg.push_str("\n\nAlternative strikes with sufficient liquidity:");
        for alt in alternatives {
            let direction = if alt.strike_price > target { "higher" } else { "lower" };
            msg.push_str(&format!(
                "\n- Strike price {:.8} ({}, {:.2}% difference) with {} {} liquidity",
                alt.strike_price,
                direction,
                alt.percentage_diff * 100.0,
                alt.available_liquidity,
                symbol
            ));
        }
    }
    msg
}

pub fn deviation_warning(matched: &StrikeMatch, target_raw: &str, target: f64) -> Option<String> {
    if matched.price_difference <= 0.0 {
        return None;
    }
    Some(format!(
        "Found strike price {:.6} which differs from target price {} by {:.2}%. \
         This difference may affect your expected returns. Take this into account when making your decision.",
        matched.strike_price,
        target_raw,
        matched.price_difference / target * 100.0
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WETH: Address = Address::repeat_byte(0x11);
    const USDC: Address = Address::repeat_byte(0x22);

    fn info(token: Address, available: &str) -> StrikeInfo {
        StrikeInfo {
            total_liquidity: "1000".into(),
            available_liquidity: available.into(),
            utilization: "0".into(),
            apr: "0".into(),
            handler: StrikeHandler::default(),
            meta: StrikeMeta::default(),
            token: MarketToken {
                address: token,
                symbol: "WETH".into(),
                decimals: 18,
            },
        }
    }

    fn entry(price: &str, token: Address, available: &str) -> StrikeEntry {
        BTreeMap::from([(price.to_string(), vec![info(token, available)])])
    }

    fn ladder() -> Vec<StrikeEntry> {
        vec![
            entry("1900", WETH, "5"),
            entry("2010", WETH, "1"),
            entry("2100", WETH, "40"),
            entry("1950", WETH, "12"),
            entry("2200", WETH, "25"),
        ]
    }

    #[test]
    fn picks_minimum_distance_strike() {
        let m = find_closest(&ladder(), 2000.0, 0.05).unwrap();
        assert_eq!(m.strike_price, 2010.0);
        assert_eq!(m.price_difference, 10.0);
        assert_eq!(m.primary().available_liquidity, "1");
    }

    #[test]
    fn rejects_match_outside_tolerance() {
        assert!(find_closest(&ladder(), 3000.0, 0.05).is_none());
        assert!(find_closest(&[], 2000.0, 0.05).is_none());
        assert_eq!(
            no_strike_message(0.05, "3000"),
            "No strike found within 5.00% of target price: 3000"
        );
    }

    #[test]
    fn alternatives_are_sorted_by_liquidity() {
        let m = find_closest(&ladder(), 2000.0, 0.05).unwrap();
        let prices: Vec<f64> = m.alternatives.iter().map(|a| a.strike_price).collect();
        assert_eq!(prices, vec![2100.0, 2200.0, 1950.0, 1900.0]);
    }

    #[test]
    fn sufficient_alternatives_cap_at_three() {
        let m = find_closest(&ladder(), 2000.0, 0.05).unwrap();
        let alts: Vec<f64> = m
            .sufficient_alternatives(4.0)
            .iter()
            .map(|a| a.strike_price)
            .collect();
        assert_eq!(alts, vec![2100.0, 2200.0, 1950.0]);
        assert_eq!(m.sufficient_alternatives(30.0).len(), 1);
    }

    #[test]
    fn liquidity_message_lists_alternatives() {
        let m = find_closest(&ladder(), 2000.0, 0.05).unwrap();
        let msg = insufficient_liquidity_message("WETH/USDC", "20", "WETH", &m, 2000.0);
        assert!(msg.starts_with(
            "Insufficient liquidity in the WETH/USDC market for the amount 20 WETH. Available liquidity: 1 WETH."
        ));
        assert!(msg.contains("\n- Strike price 2100.00000000 (higher, 5.00% difference) with 40 WETH liquidity"));
        assert!(msg.contains("\n- Strike price 2200.00000000 (higher, 10.00% difference) with 25 WETH liquidity"));
        assert!(!msg.contains("1950"));
    }

    #[test]
    fn liquidity_message_without_alternatives() {
        let m = find_closest(&ladder(), 2000.0, 0.05).unwrap();
        let msg = insufficient_liquidity_message("WETH/USDC", "500", "WETH", &m, 2000.0);
        assert!(!msg.contains("Alternative strikes"));
    }

    #[test]
    fn filter_keeps_rungs_in_requested_token() {
        let mut l = ladder();
        l.push(entry("2000", USDC, "100"));
        let filtered = filter_by_token(l, WETH);
        assert_eq!(filtered.len(), 5);
        assert!(find_closest(&filtered, 2000.0, 0.05).unwrap().price_difference > 0.0);
    }

    #[test]
    fn exact_match_has_no_warning() {
        let l = vec![entry("2000", WETH, "3")];
        let m = find_closest(&l, 2000.0, 0.05).unwrap();
        assert!(deviation_warning(&m, "2000", 2000.0).is_none());

        let m = find_closest(&ladder(), 2000.0, 0.05).unwrap();
        let warning = deviation_warning(&m, "2000", 2000.0).unwrap();
        assert!(warning.starts_with("Found strike price 2010.000000 which differs from target price 2000 by 0.50%."));
    }

    #[test]
    fn ladder_deserializes_from_api_shape() {
        let raw = serde_json::json!([{
            "2500.5": [{
                "totalLiquidity": "10",
                "availableLiquidity": "7",
                "utilization": "0.3",
                "apr": "12",
                "handler": {"name": "uniswap", "deprecated": false,
                            "handler": format!("{:?}", WETH), "pool": format!("{:?}", USDC)},
                "meta": {"hook": format!("{:?}", Address::ZERO), "tickLower": -200, "tickUpper": -190,
                         "totalTokenLiquidity": "1", "availableTokenLiquidity": "1",
                         "totalLiquidity": "10", "availableLiquidity": "7"},
                "token": {"address": format!("{:?}", WETH), "symbol": "WETH", "decimals": 18}
            }]
        }]);
        let ladder: Vec<StrikeEntry> = serde_json::from_value(raw).unwrap();
        let m = find_closest(&ladder, 2500.0, 0.01).unwrap();
        assert_eq!(m.primary().meta.tick_lower, -200);
        assert_eq!(m.primary().handler.handler, WETH);
    }
}
