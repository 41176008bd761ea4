use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::model::Wallet;
use crate::prices::{PriceTable, STABLE_COIN};

/// USD view of one wallet holding. Field names follow the JSON contract the
/// dashboard pages consume.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingValue {
    pub amount: f64,
    #[serde(rename = "priceUSD")]
    pub price_usd: f64,
    #[serde(rename = "valueUSD")]
    pub value_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Valuation {
    #[serde(rename = "cryptoValues")]
    pub crypto_values: BTreeMap<String, HoldingValue>,
    #[serde(rename = "totalProfitUSD")]
    pub total_usd: f64,
}

fn price_for(code: &str, prices: &PriceTable) -> f64 {
    let code = code.to_lowercase();
    // The stable-coin is pegged; the table never overrides that.
    if code == STABLE_COIN {
        return 1.0;
    }
    prices.get(&code).copied().unwrap_or(0.0)
}

/// Convert a wallet into a per-currency USD breakdown and a grand total.
///
/// Codes are matched case-insensitively against the lower-case price table;
/// an unknown code contributes price 0 but is still listed. With
/// `include_zero_holdings == false`, zero-amount entries are dropped from
/// the breakdown (either way they contribute nothing to the total).
pub fn value_wallet(wallet: &Wallet, prices: &PriceTable, include_zero_holdings: bool) -> Valuation {
    let mut crypto_values = BTreeMap::new();
    let mut total_usd = 0.0;
    for (code, &amount) in wallet {
        if !include_zero_holdings && amount == 0.0 {
            continue;
        }
        let price_usd = price_for(code, prices);
        let value_usd = amount * price_usd;
        total_usd += value_usd;
        crypto_values.insert(
            code.clone(),
            HoldingValue {
                amount,
                price_usd,
                value_usd,
            },
        );
    }
    Valuation {
        crypto_values,
        total_usd,
    }
}

/// Best-effort USD interpretation of the legacy scalar `total_profit` field
/// (number or numeric string); anything else counts as zero.
pub fn legacy_total(v: &JsonValue) -> f64 {
    match v {
        JsonValue::Number(n) => n.as_f64().unwrap_or(0.0),
        JsonValue::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Valuation for an entity: wallet when present, otherwise the legacy scalar
/// with an empty breakdown. Records predating the wallet structure only
/// carry the scalar.
pub fn entity_valuation(
    wallet: Option<&Wallet>,
    legacy: Option<&JsonValue>,
    prices: &PriceTable,
    include_zero_holdings: bool,
) -> Valuation {
    match wallet {
        Some(w) => value_wallet(w, prices, include_zero_holdings),
        None => Valuation {
            crypto_values: BTreeMap::new(),
            total_usd: legacy.map(legacy_total).unwrap_or(0.0),
        },
    }
}
