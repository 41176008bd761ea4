use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::model::ServerProfitRecord;

#[derive(Debug, Clone, Serialize)]
pub struct ProfitEntry {
    pub date: String,
    pub profit: f64,
    #[serde(rename = "profitUSD")]
    pub profit_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerRollup {
    #[serde(rename = "serverId")]
    pub server_id: String,
    #[serde(rename = "serverName")]
    pub server_name: String,
    #[serde(rename = "totalProfit")]
    pub total_profit: f64,
    #[serde(rename = "totalProfitUSD")]
    pub total_profit_usd: f64,
    pub records: Vec<ProfitEntry>,
}

/// Best-effort numeric coercion for a profit amount that may arrive as a
/// number or a string; unparseable values contribute zero instead of
/// poisoning the whole rollup.
fn coerce_amount(v: &JsonValue) -> f64 {
    match v {
        JsonValue::Number(n) => n.as_f64().unwrap_or(0.0),
        JsonValue::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn to_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Group dated, token-denominated profit rows by server id (canonical string
/// form) into running totals plus the ordered contributing records, sorted
/// descending by total. Token amounts convert to USD at `token_usd_rate`,
/// rounded to cents. Ties keep input order (stable sort).
pub fn rollup_servers(rows: &[ServerProfitRecord], token_usd_rate: f64) -> Vec<ServerRollup> {
    let mut order: Vec<String> = vec![];
    let mut groups: HashMap<String, ServerRollup> = HashMap::new();

    for row in rows {
        let profit = coerce_amount(&row.profit);
        let entry = ProfitEntry {
            date: row.date.clone(),
            profit,
            profit_usd: to_cents(profit * token_usd_rate),
        };
        match groups.get_mut(&row.server_id) {
            Some(g) => {
                g.total_profit += profit;
                g.records.push(entry);
            }
            None => {
                order.push(row.server_id.clone());
                groups.insert(
                    row.server_id.clone(),
                    ServerRollup {
                        server_id: row.server_id.clone(),
                        server_name: row.server_name.clone(),
                        total_profit: profit,
                        total_profit_usd: 0.0,
                        records: vec![entry],
                    },
                );
            }
        }
    }

    let mut out: Vec<ServerRollup> = order
        .into_iter()
        .filter_map(|id| groups.remove(&id))
        .map(|mut g| {
            g.total_profit_usd = to_cents(g.total_profit * token_usd_rate);
            g
        })
        .collect();
    out.sort_by(|a, b| b.total_profit.total_cmp(&a.total_profit));
    out
}
