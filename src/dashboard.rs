use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use parking_lot::RwLock;
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::{
    board::{PriceBoard, Trigger},
    config::Settings,
    price_client::QuerySelection,
    render::{escape_html, html_rows},
    utils::now_ts,
};

#[derive(Clone)]
pub struct DashboardState {
    pub settings: Settings,
    pub board: Arc<PriceBoard>,
    /// Current selector values. Cycles copy this when they are dispatched.
    pub selection: Arc<RwLock<QuerySelection>>,
}

impl DashboardState {
    pub fn new(settings: Settings, board: Arc<PriceBoard>) -> Self {
        let selection = QuerySelection {
            currency: settings.default_currency.clone(),
            limit: settings.default_limit,
        };
        Self {
            settings,
            board,
            selection: Arc::new(RwLock::new(selection)),
        }
    }
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(api_health))
        .route("/api/health", get(api_health))
        .route("/api/board", get(api_board))
        .route("/fragment/rows", get(fragment_rows))
        .route("/api/initial-load", post(api_initial_load))
        .route("/api/refresh", post(api_refresh))
        .route("/api/currency", post(api_currency))
        .route("/api/limit", post(api_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve_dashboard(settings: Settings, board: Arc<PriceBoard>) -> Result<()> {
    let state = DashboardState::new(settings.clone(), board);

    let addr: SocketAddr = format!("{}:{}", settings.dashboard_host, settings.dashboard_port)
        .parse()
        .with_context(|| {
            format!(
                "dashboard addr {}:{}",
                settings.dashboard_host, settings.dashboard_port
            )
        })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind dashboard {addr}"))?;
    log::info!("dashboard.start url=http://{}", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// One delayed `InitialLoad` cycle. Scheduled by each page load, never repeats.
fn spawn_initial_load(state: DashboardState) {
    let delay = std::time::Duration::from_millis(state.settings.initial_load_delay_ms);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let selection = state.selection.read().clone();
        if !state.board.trigger(Trigger::InitialLoad, selection) {
            log::debug!("dashboard.initial_load.skipped reason=cycle_in_flight");
        }
    });
}

fn start_cycle(st: &DashboardState, trigger: Trigger) -> Response {
    let selection = st.selection.read().clone();
    let started = st.board.trigger(trigger, selection.clone());
    Json(serde_json::json!({
        "ok": true,
        "started": started,
        "selection": selection,
    }))
    .into_response()
}

fn bad_request(error: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"ok": false, "error": error})),
    )
        .into_response()
}

async fn index(State(st): State<DashboardState>) -> impl IntoResponse {
    let selection = st.selection.read().clone();
    Html(render_index_html(&st.settings, &selection))
}

async fn api_health(State(st): State<DashboardState>) -> impl IntoResponse {
    let board = if st.board.is_in_flight() { "in_flight" } else { "idle" };
    Json(serde_json::json!({ "status": "healthy", "board": board, "ts": now_ts() }))
}

async fn api_board(State(st): State<DashboardState>) -> impl IntoResponse {
    let selection = st.selection.read().clone();
    Json(serde_json::json!({
        "view": st.board.view(),
        "in_flight": st.board.is_in_flight(),
        "selection": selection,
    }))
}

async fn fragment_rows(State(st): State<DashboardState>) -> impl IntoResponse {
    Html(html_rows(&st.board.view().rows))
}

async fn api_initial_load(State(st): State<DashboardState>) -> impl IntoResponse {
    let delay_ms = st.settings.initial_load_delay_ms;
    spawn_initial_load(st);
    Json(serde_json::json!({ "ok": true, "scheduled": true, "delay_ms": delay_ms }))
}

async fn api_refresh(State(st): State<DashboardState>) -> Response {
    start_cycle(&st, Trigger::Refresh)
}

#[derive(Deserialize)]
struct CurrencyBody {
    currency: String,
}

async fn api_currency(State(st): State<DashboardState>, Json(body): Json<CurrencyBody>) -> Response {
    let currency = body.currency.trim().to_lowercase();
    if !st.settings.is_allowed_currency(&currency) {
        return bad_request(format!(
            "unsupported currency {currency:?} (expected one of {:?})",
            st.settings.currency_options
        ));
    }
    st.selection.write().currency = currency;
    start_cycle(&st, Trigger::CurrencyChanged)
}

#[derive(Deserialize)]
struct LimitBody {
    limit: u32,
}

async fn api_limit(State(st): State<DashboardState>, Json(body): Json<LimitBody>) -> Response {
    if !st.settings.is_allowed_limit(body.limit) {
        return bad_request(format!(
            "unsupported limit {} (expected one of {:?})",
            body.limit, st.settings.limit_options
        ));
    }
    st.selection.write().limit = body.limit;
    start_cycle(&st, Trigger::LimitChanged)
}

fn render_options<T: ToString + PartialEq>(options: &[T], selected: &T, label: impl Fn(&T) -> String) -> String {
    options
        .iter()
        .map(|o| {
            let value = escape_html(&o.to_string());
            let sel = if o == selected { " selected" } else { "" };
            format!(r#"<option value="{value}"{sel}>{}</option>"#, escape_html(&label(o)))
        })
        .collect::<Vec<_>>()
        .join("")
}

fn render_index_html(settings: &Settings, selection: &QuerySelection) -> String {
    // Single-file page, no build step. Rows come pre-rendered from /fragment/rows.
    let currency_options = render_options(&settings.currency_options, &selection.currency, |c| c.to_uppercase());
    let limit_options = render_options(&settings.limit_options, &selection.limit, |l| format!("Top {l}"));
    let api_base = escape_html(&settings.price_api_base);
    let settle_delay = settings.initial_load_delay_ms + 50;

    format!(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>PriceBoard • Crypto Prices</title>
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
      .wrap {{ max-width: 960px; margin: 0 auto; padding: 22px 18px 42px; }}
      .topbar {{
        display: flex; align-items: center; justify-content: space-between; gap: 12px;
        padding: 16px; border: 1px solid var(--stroke); border-radius: 16px; background: var(--panel);
      }}
      .title {{ font-weight: 800; }}
      .subtitle {{ color: var(--muted); font-size: 12px; margin-top: 2px; }}
      .controls {{ display: flex; gap: 8px; align-items: center; }}
      select, .btn {{
        padding: 8px 10px; border-radius: 10px; border: 1px solid var(--stroke);
        background: rgba(255,255,255,0.05); color: var(--text); font-weight: 700; font-size: 12px;
      }}
      .btn {{ cursor: pointer; }}
      .card {{ margin-top: 14px; border: 1px solid var(--stroke); border-radius: 16px; background: var(--panel); overflow: hidden; }}
      table {{ width: 100%; border-collapse: collapse; }}
      th, td {{ padding: 10px; border-bottom: 1px solid rgba(255,255,255,0.07); text-align: left; }}
      th {{ color: var(--muted); font-size: 12px; }}
      td {{ font-size: 13px; }}
      .positive {{ color: var(--good); }}
      .negative {{ color: var(--bad); }}
      .mono {{ font-family: ui-monospace, SFMono-Regular, Menlo, Consolas, monospace; }}
    </style>
  </head>
  <body>
    <div class="wrap">
      <div class="topbar">
        <div>
          <div class="title">PriceBoard</div>
          <div class="subtitle">source <span class="mono">{api_base}</span> • <b id="statusText">starting…</b></div>
        </div>
        <div class="controls">
          <select id="currency">{currency_options}</select>
          <select id="limit">{limit_options}</select>
          <button class="btn" id="refreshBtn">Refresh</button>
        </div>
      </div>
      <div class="card">
        <table>
          <thead>
            <tr><th>Coin</th><th>Price</th><th>24h</th><th>Market Cap</th></tr>
          </thead>
          <tbody id="cryptoTable"></tbody>
        </table>
      </div>
    </div>
    <script>
      const tableBody = document.getElementById("cryptoTable");
      const currencySelect = document.getElementById("currency");
      const limitSelect = document.getElementById("limit");
      const refreshBtn = document.getElementById("refreshBtn");
      const statusText = document.getElementById("statusText");
      const sleep = (ms) => new Promise((r) => setTimeout(r, ms));

      async function getJson(path) {{
        const r = await fetch(path, {{ cache: "no-store" }});
        if (!r.ok) throw new Error(path + " -> " + r.status);
        return await r.json();
      }}

      async function post(path, body) {{
        const r = await fetch(path, {{
          method: "POST",
          headers: {{ "content-type": "application/json" }},
          body: JSON.stringify(body || {{}}),
        }});
        if (!r.ok) throw new Error(path + " -> " + r.status + " " + (await r.text()));
        return await r.json();
      }}

      async function loadRows() {{
        const r = await fetch("/fragment/rows", {{ cache: "no-store" }});
        tableBody.innerHTML = await r.text();
      }}

      async function settle() {{
        try {{
          for (let i = 0; i < 240; i++) {{
            const b = await getJson("/api/board");
            await loadRows();
            statusText.textContent = b.in_flight ? "loading" : "idle";
            if (!b.in_flight) return;
            await sleep(250);
          }}
        }} catch (e) {{
          console.error(e);
          statusText.textContent = "dashboard unreachable";
        }}
      }}

      async function send(path, body) {{
        try {{
          await post(path, body);
        }} catch (e) {{
          console.error(e);
        }}
        await settle();
      }}

      refreshBtn.addEventListener("click", () => send("/api/refresh"));
      currencySelect.addEventListener("change", () => send("/api/currency", {{ currency: currencySelect.value }}));
      limitSelect.addEventListener("change", () => send("/api/limit", {{ limit: Number(limitSelect.value) }}));

      post("/api/initial-load").catch((e) => console.error(e));
      setTimeout(settle, {settle_delay});
    </script>
  </body>
</html>
"#
    )
}
