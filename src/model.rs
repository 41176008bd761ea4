use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Per-entity wallet: currency code -> held amount.
pub type Wallet = HashMap<String, f64>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub server_id: String,
    pub server_name: String,
    pub wallet: Option<Wallet>,
    /// Legacy scalar profit (number or numeric string) on records that
    /// predate the wallet structure.
    pub total_profit: Option<JsonValue>,
    pub giveaway_channel: Option<String>,
    pub whitelisted_channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyProfitRecord {
    pub date: String,
    pub wallet: Option<Wallet>,
    pub total_profit: Option<JsonValue>,
}

/// One dated, token-denominated profit row tagged with a server id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerProfitRecord {
    pub server_id: String,
    pub server_name: String,
    pub date: String,
    pub profit: JsonValue,
}

/// Canonical string form of an identifier read from a dynamically typed
/// column. The upstream writer stores both INTEGER and TEXT ids.
pub fn canonical_id(v: &rusqlite::types::Value) -> Option<String> {
    use rusqlite::types::Value;
    match v {
        Value::Integer(i) => Some(i.to_string()),
        Value::Text(s) => Some(s.trim().to_string()),
        Value::Real(f) => Some(if f.fract() == 0.0 {
            format!("{}", *f as i64)
        } else {
            f.to_string()
        }),
        Value::Null | Value::Blob(_) => None,
    }
}

/// Normalize a record date to `YYYY-MM-DD`. Older collection versions used
/// `MM/DD/YYYY`; anything unparseable passes through unchanged.
pub fn canonical_date(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.format("%Y-%m-%d").to_string();
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%m/%d/%Y") {
        return d.format("%Y-%m-%d").to_string();
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::types::Value;

    #[test]
    fn canonical_id_covers_column_types() {
        assert_eq!(canonical_id(&Value::Integer(7)), Some("7".to_string()));
        assert_eq!(
            canonical_id(&Value::Text(" 12345 ".to_string())),
            Some("12345".to_string())
        );
        assert_eq!(canonical_id(&Value::Real(7.0)), Some("7".to_string()));
        assert_eq!(canonical_id(&Value::Null), None);
    }

    #[test]
    fn iso_dates_pass_through() {
        assert_eq!(canonical_date("2024-03-09"), "2024-03-09");
    }

    #[test]
    fn us_dates_convert() {
        assert_eq!(canonical_date("03/09/2024"), "2024-03-09");
        assert_eq!(canonical_date("12/31/2023"), "2023-12-31");
    }

    #[test]
    fn garbage_dates_pass_through_unchanged() {
        assert_eq!(canonical_date("yesterday"), "yesterday");
    }
}
