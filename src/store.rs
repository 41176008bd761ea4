use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value as JsonValue;

use crate::model::{
    canonical_date, canonical_id, DailyProfitRecord, ServerProfitRecord, ServerRecord, Wallet,
};

/// Read-only view over the three collections shared with the upstream bot.
/// No writes originate from this service.
pub trait Storage: Send + Sync {
    fn all_servers(&self) -> Result<Vec<ServerRecord>>;
    fn server_by_numeric_id(&self, id: i64) -> Result<Option<ServerRecord>>;
    fn server_by_text_id(&self, id: &str) -> Result<Option<ServerRecord>>;
    fn daily_profits(&self) -> Result<Vec<DailyProfitRecord>>;
    fn server_profit_rows(&self) -> Result<Vec<ServerProfitRecord>>;
}

/// Resolve a server-like entity by an externally supplied identifier whose
/// stored type is not guaranteed: exact numeric match, then exact string
/// match, then a full scan comparing canonical string ids. Each step runs
/// only if the previous produced no match.
pub fn resolve_server(store: &dyn Storage, raw_id: &str) -> Result<Option<ServerRecord>> {
    let raw_id = raw_id.trim();
    if let Ok(n) = raw_id.parse::<i64>() {
        if let Some(s) = store.server_by_numeric_id(n)? {
            return Ok(Some(s));
        }
    }
    if let Some(s) = store.server_by_text_id(raw_id)? {
        return Ok(Some(s));
    }
    let all = store.all_servers()?;
    Ok(all.into_iter().find(|s| s.server_id == raw_id))
}

#[derive(Clone)]
pub struct SqliteStore {
    path: String,
}

impl SqliteStore {
    pub fn new(path: &str) -> Result<Self> {
        if path.trim().is_empty() {
            anyhow::bail!("SQLITE_PATH is empty");
        }
        if path != ":memory:" && !path.starts_with("file:") {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create sqlite parent dir for {path}"))?;
            }
        }

        // rusqlite::Connection is not Send/Sync; we keep only a path and open
        // short-lived connections per operation. WAL keeps concurrent reads
        // against the bot's writes cheap.
        Ok(Self {
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn open_conn(&self) -> Result<Connection> {
        let conn =
            Connection::open(&self.path).with_context(|| format!("open sqlite {}", self.path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Ok(conn)
    }

    /// Create the schema if missing. The tables are populated by the
    /// external bot; this side only ever reads them.
    pub fn init_db(&self) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS servers (
  server_id,
  server_name TEXT,
  wallet_json TEXT,
  total_profit,
  giveaway_channel TEXT,
  whitelist_json TEXT
);

CREATE TABLE IF NOT EXISTS profit_data (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  date TEXT,
  wallet_json TEXT,
  total_profit
);

CREATE INDEX IF NOT EXISTS idx_profit_data_date ON profit_data(date);

CREATE TABLE IF NOT EXISTS server_profit (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  server_id,
  server_name TEXT,
  date TEXT,
  profit
);

CREATE INDEX IF NOT EXISTS idx_server_profit_server ON server_profit(server_id, date);
"#,
        )?;
        Ok(())
    }
}

const SERVER_COLS: &str =
    "server_id, server_name, wallet_json, total_profit, giveaway_channel, whitelist_json";

fn server_from_row(r: &Row<'_>) -> rusqlite::Result<Option<ServerRecord>> {
    let raw_id: rusqlite::types::Value = r.get(0)?;
    let Some(server_id) = canonical_id(&raw_id) else {
        return Ok(None);
    };
    let wallet_json: Option<String> = r.get(2)?;
    let total_profit: rusqlite::types::Value = r.get(3)?;
    let whitelist_json: Option<String> = r.get(5)?;
    Ok(Some(ServerRecord {
        server_id,
        server_name: r.get::<_, Option<String>>(1)?.unwrap_or_default(),
        wallet: parse_wallet(wallet_json.as_deref()),
        total_profit: value_to_json(&total_profit),
        giveaway_channel: r.get(4)?,
        whitelisted_channels: whitelist_json
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default(),
    }))
}

fn parse_wallet(raw: Option<&str>) -> Option<Wallet> {
    let raw = raw?;
    match serde_json::from_str::<Wallet>(raw) {
        Ok(w) => Some(w),
        Err(e) => {
            log::warn!("store.wallet_parse_failed {}", e);
            None
        }
    }
}

/// Dynamic column value to JSON, preserving number-vs-string so the legacy
/// `total_profit` coercion can happen in one place (valuation).
fn value_to_json(v: &rusqlite::types::Value) -> Option<JsonValue> {
    use rusqlite::types::Value;
    match v {
        Value::Integer(i) => Some(JsonValue::from(*i)),
        Value::Real(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number),
        Value::Text(s) => Some(JsonValue::String(s.clone())),
        Value::Null | Value::Blob(_) => None,
    }
}

impl Storage for SqliteStore {
    fn all_servers(&self) -> Result<Vec<ServerRecord>> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {SERVER_COLS} FROM servers"))?;
        let mut rows = stmt.query([])?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            if let Some(s) = server_from_row(r)? {
                out.push(s);
            }
        }
        Ok(out)
    }

    fn server_by_numeric_id(&self, id: i64) -> Result<Option<ServerRecord>> {
        let conn = self.open_conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {SERVER_COLS} FROM servers WHERE server_id = ? LIMIT 1"),
                params![id],
                server_from_row,
            )
            .optional()?;
        Ok(row.flatten())
    }

    fn server_by_text_id(&self, id: &str) -> Result<Option<ServerRecord>> {
        let conn = self.open_conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {SERVER_COLS} FROM servers WHERE server_id = ? LIMIT 1"),
                params![id],
                server_from_row,
            )
            .optional()?;
        Ok(row.flatten())
    }

    fn daily_profits(&self) -> Result<Vec<DailyProfitRecord>> {
        let conn = self.open_conn()?;
        let mut stmt =
            conn.prepare("SELECT date, wallet_json, total_profit FROM profit_data")?;
        let mut rows = stmt.query([])?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            let date: Option<String> = r.get(0)?;
            let wallet_json: Option<String> = r.get(1)?;
            let total_profit: rusqlite::types::Value = r.get(2)?;
            out.push(DailyProfitRecord {
                date: canonical_date(date.as_deref().unwrap_or_default()),
                wallet: parse_wallet(wallet_json.as_deref()),
                total_profit: value_to_json(&total_profit),
            });
        }
        Ok(out)
    }

    fn server_profit_rows(&self) -> Result<Vec<ServerProfitRecord>> {
        let conn = self.open_conn()?;
        let mut stmt =
            conn.prepare("SELECT server_id, server_name, date, profit FROM server_profit ORDER BY id ASC")?;
        let mut rows = stmt.query([])?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            let raw_id: rusqlite::types::Value = r.get(0)?;
            let Some(server_id) = canonical_id(&raw_id) else {
                continue;
            };
            let date: Option<String> = r.get(2)?;
            let profit: rusqlite::types::Value = r.get(3)?;
            out.push(ServerProfitRecord {
                server_id,
                server_name: r.get::<_, Option<String>>(1)?.unwrap_or_default(),
                date: canonical_date(date.as_deref().unwrap_or_default()),
                profit: value_to_json(&profit).unwrap_or(JsonValue::Null),
            });
        }
        Ok(out)
    }
}
