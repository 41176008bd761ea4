use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tower_http::cors::CorsLayer;

use crate::{
    config::Settings,
    error::ApiError,
    prices::{fetch_or_fallback, PriceFeed},
    rollup::rollup_servers,
    store::{resolve_server, Storage},
    valuation::entity_valuation,
};

#[derive(Clone)]
pub struct DashboardState {
    pub settings: Settings,
    pub store: Arc<dyn Storage>,
    pub feed: Arc<dyn PriceFeed>,
}

pub fn router(state: DashboardState) -> Router {
    let cors_enabled = state.settings.cors_enabled;
    let app = Router::new()
        .route("/", get(index))
        .route("/api/health", get(api_health))
        .route("/api/servers", get(api_servers))
        .route("/api/server", get(api_server))
        .route("/api/profit-data", get(api_profit_data))
        .route("/api/server-profit", get(api_server_profit))
        .route("/api/login", post(api_login))
        .with_state(state);

    if cors_enabled {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

pub async fn serve(state: DashboardState) -> Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        state.settings.bind_host, state.settings.bind_port
    )
    .parse()
    .expect("bind addr parse");

    let app = router(state);
    log::info!("dashboard.start url=http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("dashboard.shutdown");
        })
        .await?;
    Ok(())
}

async fn api_health() -> impl IntoResponse {
    Json(json!({ "ok": true, "ts": now_ts() }))
}

/// All servers, valued and sorted descending by total USD profit.
async fn api_servers(State(st): State<DashboardState>) -> Result<Json<JsonValue>, ApiError> {
    let servers = st.store.all_servers()?;
    let prices = fetch_or_fallback(st.feed.as_ref()).await;

    let mut rows: Vec<(f64, JsonValue)> = servers
        .iter()
        .map(|s| {
            let v = entity_valuation(
                s.wallet.as_ref(),
                s.total_profit.as_ref(),
                &prices,
                st.settings.include_zero_holdings,
            );
            (
                v.total_usd,
                json!({
                    "serverId": s.server_id,
                    "serverName": s.server_name,
                    "wallet": s.wallet.clone().unwrap_or_default(),
                    "cryptoValues": v.crypto_values,
                    "totalProfitUSD": v.total_usd,
                    "giveawayChannel": s.giveaway_channel,
                    "whitelist": s.whitelisted_channels,
                }),
            )
        })
        .collect();
    rows.sort_by(|a, b| b.0.total_cmp(&a.0));
    let data: Vec<JsonValue> = rows.into_iter().map(|(_, v)| v).collect();

    Ok(Json(json!({ "data": data, "cryptoPrices": prices })))
}

#[derive(Deserialize)]
struct ServerQ {
    id: Option<String>,
}

/// One server by external identifier; the id's stored type is not
/// guaranteed, so resolution runs the three-step fallback in the store.
async fn api_server(
    State(st): State<DashboardState>,
    Query(q): Query<ServerQ>,
) -> Result<Json<JsonValue>, ApiError> {
    let id = q
        .id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::MissingParam("server id"))?;

    let server = resolve_server(st.store.as_ref(), id)?.ok_or(ApiError::NotFound("server"))?;
    let prices = fetch_or_fallback(st.feed.as_ref()).await;

    let v = entity_valuation(
        server.wallet.as_ref(),
        server.total_profit.as_ref(),
        &prices,
        st.settings.include_zero_holdings,
    );
    let server_cut = v.total_usd * st.settings.server_cut_rate;

    Ok(Json(json!({
        "data": {
            "serverId": server.server_id,
            "serverName": server.server_name,
            "wallet": server.wallet.clone().unwrap_or_default(),
            "cryptoValues": v.crypto_values,
            "totalProfitUSD": v.total_usd,
            "serverCut": server_cut,
            "giveawayChannel": server.giveaway_channel,
            "whitelist": server.whitelisted_channels,
        },
        "cryptoPrices": prices,
    })))
}

/// Daily profit records, valued and sorted ascending by canonical date.
async fn api_profit_data(State(st): State<DashboardState>) -> Result<Json<JsonValue>, ApiError> {
    let mut records = st.store.daily_profits()?;
    let prices = fetch_or_fallback(st.feed.as_ref()).await;

    records.sort_by(|a, b| a.date.cmp(&b.date));
    let data: Vec<JsonValue> = records
        .iter()
        .map(|r| {
            let v = entity_valuation(
                r.wallet.as_ref(),
                r.total_profit.as_ref(),
                &prices,
                st.settings.include_zero_holdings,
            );
            json!({
                "date": r.date,
                "wallet": r.wallet.clone().unwrap_or_default(),
                "cryptoValues": v.crypto_values,
                "totalProfitUSD": v.total_usd,
            })
        })
        .collect();

    Ok(Json(json!({ "data": data, "cryptoPrices": prices })))
}

/// Per-server rollup of the dated, token-denominated profit rows. No price
/// feed involved; conversion uses the fixed token rate.
async fn api_server_profit(
    State(st): State<DashboardState>,
) -> Result<Json<JsonValue>, ApiError> {
    let rows = st.store.server_profit_rows()?;
    let data = rollup_servers(&rows, st.settings.token_usd_rate);
    Ok(Json(json!({ "data": data })))
}

#[derive(Deserialize)]
struct LoginReq {
    username: String,
    password: String,
}

/// Placeholder login: compares against the configured pair and hands the
/// client a cookie flag with a fixed TTL. There is no server-side session
/// store and nothing on the API surface verifies the cookie.
async fn api_login(
    State(st): State<DashboardState>,
    Json(req): Json<LoginReq>,
) -> Response {
    if req.username != st.settings.admin_username || req.password != st.settings.admin_password {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid username or password" })),
        )
            .into_response();
    }

    let cookie = format!(
        "betsync_session={}; Max-Age={}; Path=/; SameSite=Lax",
        req.username, st.settings.session_ttl_secs
    );
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "ok": true, "name": req.username })),
    )
        .into_response()
}

async fn index(State(st): State<DashboardState>) -> impl IntoResponse {
    Html(render_index_html(
        &st.settings.bind_host,
        st.settings.bind_port,
        st.settings.include_zero_holdings,
    ))
}

fn render_index_html(host: &str, port: u16, include_zero: bool) -> String {
    // Single-file UI, no build step. The themed dashboard pages live in a
    // separate frontend; this page is for eyeballing the raw aggregates.
    format!(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>BetSync Admin • Data</title>
    <style>
      :root {{
        --bg: #0b1220;
        --panel: rgba(255,255,255,0.06);
        --stroke: rgba(255,255,255,0.12);
        --text: rgba(255,255,255,0.92);
        --muted: rgba(255,255,255,0.65);
        --good: #33d17a;
        --bad: #ff4d4d;
      }}
      * {{ box-sizing: border-box; }}
      body {{
        margin: 0;
        font-family: ui-sans-serif, system-ui, -apple-system, Segoe UI, Roboto, Helvetica, Arial;
        color: var(--text);
        background: var(--bg);
      }}
      .wrap {{ max-width: 1080px; margin: 0 auto; padding: 22px 18px 42px; }}
      .topbar {{
        display: flex; align-items: center; justify-content: space-between; gap: 12px;
        padding: 14px 16px; border: 1px solid var(--stroke); border-radius: 14px;
        background: var(--panel);
      }}
      .title {{ font-weight: 800; }}
      .chip {{
        padding: 6px 10px; border-radius: 999px; border: 1px solid var(--stroke);
        font-size: 12px; color: var(--muted);
      }}
      .chip b {{ color: var(--text); }}
      .card {{
        margin-top: 14px; border: 1px solid var(--stroke); border-radius: 14px;
        background: var(--panel); overflow: hidden;
      }}
      .card .hd {{ padding: 12px 14px; border-bottom: 1px solid var(--stroke); font-weight: 800; }}
      .card .bd {{ padding: 12px 14px; }}
      table {{ width: 100%; border-collapse: collapse; }}
      th, td {{ padding: 8px 10px; border-bottom: 1px solid rgba(255,255,255,0.07); text-align: left; }}
      th {{ color: var(--muted); font-size: 12px; }}
      td {{ font-size: 13px; }}
      .mono {{ font-family: ui-monospace, Menlo, Consolas, monospace; }}
      .good {{ color: var(--good); }}
      .bad {{ color: var(--bad); }}
    </style>
  </head>
  <body>
    <div class="wrap">
      <div class="topbar">
        <div class="title">BetSync Admin Panel</div>
        <div>
          <span class="chip">Local: <b class="mono">{host}:{port}</b></span>
          <span class="chip">zero holdings: <b>{zero_policy}</b></span>
          <span class="chip">Status: <b id="statusText">starting…</b></span>
        </div>
      </div>

      <div class="card">
        <div class="hd">Servers (by total profit)</div>
        <div class="bd">
          <table>
            <thead>
              <tr><th class="mono">server_id</th><th>Name</th><th>Total (USD)</th><th>Holdings</th></tr>
            </thead>
            <tbody id="serverRows"></tbody>
          </table>
        </div>
      </div>

      <div class="card">
        <div class="hd">Daily profit</div>
        <div class="bd">
          <table>
            <thead>
              <tr><th>Date</th><th>Total (USD)</th><th>Holdings</th></tr>
            </thead>
            <tbody id="dayRows"></tbody>
          </table>
        </div>
      </div>
    </div>

    <script>
      const fmtUsd = (x) => {{
        const n = Number(x);
        if (!Number.isFinite(n)) return "--";
        return (n < 0 ? "-$" : "$") + Math.abs(n).toFixed(2);
      }};
      const holdings = (cv) =>
        Object.entries(cv || {{}})
          .map(([c, h]) => `${{c}} ${{Number(h.amount).toFixed(4)}}`)
          .join(" • ") || "--";

      async function getJson(path) {{
        const r = await fetch(path, {{ cache: "no-store" }});
        if (!r.ok) throw new Error(`${{path}} -> ${{r.status}}`);
        return await r.json();
      }}

      async function refresh() {{
        try {{
          const [servers, days] = await Promise.all([
            getJson("/api/servers"),
            getJson("/api/profit-data"),
          ]);

          const sb = document.getElementById("serverRows");
          sb.innerHTML = "";
          for (const s of servers.data) {{
            const tr = document.createElement("tr");
            tr.innerHTML = `
              <td class="mono">${{s.serverId}}</td>
              <td>${{s.serverName || "--"}}</td>
              <td class="${{s.totalProfitUSD >= 0 ? "good" : "bad"}}">${{fmtUsd(s.totalProfitUSD)}}</td>
              <td>${{holdings(s.cryptoValues)}}</td>`;
            sb.appendChild(tr);
          }}

          const db = document.getElementById("dayRows");
          db.innerHTML = "";
          for (const d of days.data) {{
            const tr = document.createElement("tr");
            tr.innerHTML = `
              <td>${{d.date}}</td>
              <td class="${{d.totalProfitUSD >= 0 ? "good" : "bad"}}">${{fmtUsd(d.totalProfitUSD)}}</td>
              <td>${{holdings(d.cryptoValues)}}</td>`;
            db.appendChild(tr);
          }}

          document.getElementById("statusText").textContent = "live";
          document.getElementById("statusText").className = "good";
        }} catch (e) {{
          document.getElementById("statusText").textContent = "disconnected";
          document.getElementById("statusText").className = "bad";
        }}
      }}

      refresh();
      setInterval(refresh, 5000);
    </script>
  </body>
</html>"#,
        host = host,
        port = port,
        zero_policy = if include_zero { "included" } else { "filtered" },
    )
}

fn now_ts() -> f64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DailyProfitRecord, ServerProfitRecord, ServerRecord, Wallet};
    use crate::prices::PriceTable;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct MemStore {
        servers: Vec<ServerRecord>,
        daily: Vec<DailyProfitRecord>,
        profit_rows: Vec<ServerProfitRecord>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl MemStore {
        fn tick(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("store unavailable");
            }
            Ok(())
        }
    }

    impl Storage for MemStore {
        fn all_servers(&self) -> Result<Vec<ServerRecord>> {
            self.tick()?;
            Ok(self.servers.clone())
        }
        fn server_by_numeric_id(&self, id: i64) -> Result<Option<ServerRecord>> {
            self.tick()?;
            Ok(self
                .servers
                .iter()
                .find(|s| s.server_id == id.to_string())
                .cloned())
        }
        fn server_by_text_id(&self, id: &str) -> Result<Option<ServerRecord>> {
            self.tick()?;
            Ok(self.servers.iter().find(|s| s.server_id == id).cloned())
        }
        fn daily_profits(&self) -> Result<Vec<DailyProfitRecord>> {
            self.tick()?;
            Ok(self.daily.clone())
        }
        fn server_profit_rows(&self) -> Result<Vec<ServerProfitRecord>> {
            self.tick()?;
            Ok(self.profit_rows.clone())
        }
    }

    struct StaticFeed {
        table: PriceTable,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PriceFeed for StaticFeed {
        async fn fetch_prices(&self) -> Result<PriceTable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.table.clone())
        }
    }

    fn settings() -> Settings {
        Settings {
            bind_host: "127.0.0.1".to_string(),
            bind_port: 0,
            cors_enabled: false,
            sqlite_path: ":memory:".to_string(),
            price_base_url: "http://localhost".to_string(),
            price_timeout_ms: 100,
            include_zero_holdings: true,
            server_cut_rate: 0.30,
            token_usd_rate: 0.0212,
            admin_username: "admin".to_string(),
            admin_password: "hunter2".to_string(),
            session_ttl_secs: 3600,
        }
    }

    fn server(id: &str, name: &str, wallet: Option<Wallet>) -> ServerRecord {
        ServerRecord {
            server_id: id.to_string(),
            server_name: name.to_string(),
            wallet,
            total_profit: None,
            giveaway_channel: None,
            whitelisted_channels: vec![],
        }
    }

    fn harness(store: MemStore) -> (Router, Arc<MemStore>, Arc<StaticFeed>) {
        let store = Arc::new(store);
        let feed = Arc::new(StaticFeed {
            table: PriceTable::from([
                ("btc".to_string(), 100.0),
                ("eth".to_string(), 10.0),
                ("sol".to_string(), 1.0),
                ("doge".to_string(), 0.1),
                ("usdt".to_string(), 1.0),
            ]),
            calls: AtomicUsize::new(0),
        });
        let state = DashboardState {
            settings: settings(),
            store: store.clone(),
            feed: feed.clone(),
        };
        (router(state), store, feed)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, JsonValue) {
        let res = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_id_rejected_before_any_downstream_call() {
        let (app, store, feed) = harness(MemStore::default());

        let (status, body) = get(app, "/api/server").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("required"));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(feed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let (app, _store, _feed) = harness(MemStore {
            servers: vec![server("7", "known", None)],
            ..Default::default()
        });

        let (status, body) = get(app, "/api/server?id=999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn server_endpoint_values_wallet_and_applies_cut() {
        let wallet = Wallet::from([("BTC".to_string(), 2.0)]);
        let (app, _store, _feed) = harness(MemStore {
            servers: vec![server("7", "casino", Some(wallet))],
            ..Default::default()
        });

        let (status, body) = get(app, "/api/server?id=7").await;
        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert_eq!(data["serverId"], "7");
        assert_eq!(data["totalProfitUSD"], 200.0);
        assert_eq!(data["serverCut"], 60.0);
        assert_eq!(data["cryptoValues"]["BTC"]["priceUSD"], 100.0);
        assert_eq!(body["cryptoPrices"]["btc"], 100.0);
    }

    #[tokio::test]
    async fn servers_sorted_descending_by_total() {
        let small = Wallet::from([("eth".to_string(), 1.0)]);
        let big = Wallet::from([("btc".to_string(), 5.0)]);
        let (app, _store, _feed) = harness(MemStore {
            servers: vec![
                server("1", "small", Some(small)),
                server("2", "big", Some(big)),
            ],
            ..Default::default()
        });

        let (status, body) = get(app, "/api/servers").await;
        assert_eq!(status, StatusCode::OK);
        let data = body["data"].as_array().unwrap();
        assert_eq!(data[0]["serverName"], "big");
        assert_eq!(data[1]["serverName"], "small");
    }

    #[tokio::test]
    async fn profit_data_sorted_ascending_by_date() {
        let (app, _store, _feed) = harness(MemStore {
            daily: vec![
                DailyProfitRecord {
                    date: "2024-03-10".to_string(),
                    wallet: Some(Wallet::from([("sol".to_string(), 3.0)])),
                    total_profit: None,
                },
                DailyProfitRecord {
                    date: "2024-03-09".to_string(),
                    wallet: None,
                    total_profit: Some(json!("12.5")),
                },
            ],
            ..Default::default()
        });

        let (status, body) = get(app, "/api/profit-data").await;
        assert_eq!(status, StatusCode::OK);
        let data = body["data"].as_array().unwrap();
        assert_eq!(data[0]["date"], "2024-03-09");
        // Legacy scalar path: empty breakdown, scalar total.
        assert_eq!(data[0]["totalProfitUSD"], 12.5);
        assert_eq!(data[1]["date"], "2024-03-10");
        assert_eq!(data[1]["totalProfitUSD"], 3.0);
    }

    #[tokio::test]
    async fn server_profit_groups_and_orders() {
        let row = |id: &str, date: &str, profit: JsonValue| ServerProfitRecord {
            server_id: id.to_string(),
            server_name: format!("server-{id}"),
            date: date.to_string(),
            profit,
        };
        let (app, _store, feed) = harness(MemStore {
            profit_rows: vec![
                row("1", "2024-01-01", json!("10")),
                row("1", "2024-01-02", json!(5)),
                row("2", "2024-01-01", json!(3)),
            ],
            ..Default::default()
        });

        let (status, body) = get(app, "/api/server-profit").await;
        assert_eq!(status, StatusCode::OK);
        let data = body["data"].as_array().unwrap();
        assert_eq!(data[0]["serverId"], "1");
        assert_eq!(data[0]["totalProfit"], 15.0);
        assert_eq!(data[1]["serverId"], "2");
        // Token rollups never touch the price feed.
        assert_eq!(feed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn store_failure_is_a_generic_500() {
        let (app, _store, _feed) = harness(MemStore {
            fail: true,
            ..Default::default()
        });

        let (status, body) = get(app, "/api/servers").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal server error");
    }

    async fn post_login(app: Router, body: &str) -> axum::response::Response {
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/login")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn login_sets_session_cookie() {
        let (app, _store, _feed) = harness(MemStore::default());
        let res = post_login(app, r#"{"username":"admin","password":"hunter2"}"#).await;
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("betsync_session=admin"));
        assert!(cookie.contains("Max-Age=3600"));
    }

    #[tokio::test]
    async fn bad_credentials_are_unauthorized() {
        let (app, _store, _feed) = harness(MemStore::default());
        let res = post_login(app, r#"{"username":"admin","password":"wrong"}"#).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(res.headers().get(header::SET_COOKIE).is_none());
    }
}
