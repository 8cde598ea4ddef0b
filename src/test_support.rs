//! Local stand-in for the price API, served by axum on an ephemeral port.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub body: String,
}

impl MockReply {
    pub fn coins(n: usize) -> Self {
        Self::status(200, Self::coins_body(n))
    }

    pub fn status(status: u16, body: String) -> Self {
        Self { status, body }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::status(200, value.to_string())
    }

    /// `n` records named Coin0..; every third has a null change, the others
    /// alternate between +1.5 and -2.25.
    pub fn coins_body(n: usize) -> String {
        let data = (0..n)
            .map(|i| {
                let change = match i % 3 {
                    0 => serde_json::Value::Null,
                    1 => serde_json::json!(1.5),
                    _ => serde_json::json!(-2.25),
                };
                serde_json::json!({
                    "name": format!("Coin{i}"),
                    "symbol": format!("c{i}"),
                    "price": 100.0 + i as f64,
                    "change_24h": change,
                    "market_cap": 1_000_000.0 * (i as f64 + 1.0),
                })
            })
            .collect::<Vec<_>>();
        serde_json::json!({ "currency": "usd", "count": n, "data": data }).to_string()
    }
}

#[derive(Clone)]
struct MockState {
    reply: MockReply,
    queries: Arc<Mutex<Vec<(String, String)>>>,
    gate: Option<Arc<Notify>>,
}

pub struct MockPriceApi {
    addr: SocketAddr,
    queries: Arc<Mutex<Vec<(String, String)>>>,
    gate: Option<Arc<Notify>>,
}

impl MockPriceApi {
    pub async fn start(reply: MockReply) -> Self {
        Self::spawn(reply, None).await
    }

    /// Each request is held until `release` is called once for it.
    pub async fn start_gated(reply: MockReply) -> Self {
        Self::spawn(reply, Some(Arc::new(Notify::new()))).await
    }

    async fn spawn(reply: MockReply, gate: Option<Arc<Notify>>) -> Self {
        let queries = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            reply,
            queries: queries.clone(),
            gate: gate.clone(),
        };
        let app = Router::new().route("/prices", get(prices)).with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock price api");
        let addr = listener.local_addr().expect("mock addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self { addr, queries, gate }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// `(currency, limit)` pairs in arrival order.
    pub fn queries(&self) -> Vec<(String, String)> {
        self.queries.lock().clone()
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub async fn wait_for_requests(&self, n: usize) {
        for _ in 0..1000 {
            if self.queries.lock().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("mock price api never saw {n} request(s)");
    }
}

async fn prices(
    State(st): State<MockState>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    st.queries.lock().push((
        q.get("currency").cloned().unwrap_or_default(),
        q.get("limit").cloned().unwrap_or_default(),
    ));
    if let Some(gate) = &st.gate {
        gate.notified().await;
    }
    let status = StatusCode::from_u16(st.reply.status).expect("mock status");
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        st.reply.body.clone(),
    )
        .into_response()
}

/// A base URL nothing is listening on.
pub async fn refused_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind refused listener");
    let addr = listener.local_addr().expect("refused listener addr");
    drop(listener);
    format!("http://{addr}")
}
