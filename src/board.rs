use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    format::{change_class, format_change, format_market_cap, format_price, ChangeClass},
    price_client::{CoinPriceRecord, PriceClient, PricesResponse, QuerySelection},
    utils::now_ts,
};

/// What asked for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Refresh,
    CurrencyChanged,
    LimitChanged,
    InitialLoad,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Refresh => "refresh",
            Trigger::CurrencyChanged => "currency_changed",
            Trigger::LimitChanged => "limit_changed",
            Trigger::InitialLoad => "initial_load",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    InFlight { cycle: Uuid, trigger: Trigger },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoinRow {
    pub label: String,
    pub price: String,
    pub change: String,
    pub change_class: Option<ChangeClass>,
    pub market_cap: String,
}

impl CoinRow {
    pub fn from_record(record: &CoinPriceRecord) -> Self {
        Self {
            label: format!("{} ({})", record.name, record.symbol.to_uppercase()),
            price: format_price(record.price),
            change: format_change(record.change_24h),
            change_class: change_class(record.change_24h),
            market_cap: format_market_cap(record.market_cap),
        }
    }
}

/// One table row as the view should show it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoardRow {
    Loading,
    Unavailable { warning: Option<String> },
    Unreachable,
    Coin(CoinRow),
}

pub fn rows_for_response(resp: PricesResponse) -> Vec<BoardRow> {
    match resp.data {
        Some(records) if !records.is_empty() => records
            .iter()
            .map(|r| BoardRow::Coin(CoinRow::from_record(r)))
            .collect(),
        _ => vec![BoardRow::Unavailable {
            warning: resp.warning,
        }],
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardView {
    pub cycle_id: Option<Uuid>,
    pub trigger: Option<Trigger>,
    pub selection: Option<QuerySelection>,
    pub rows: Vec<BoardRow>,
    pub updated_ts: f64,
}

impl BoardView {
    fn empty() -> Self {
        Self {
            cycle_id: None,
            trigger: None,
            selection: None,
            rows: Vec::new(),
            updated_ts: now_ts(),
        }
    }

    pub fn coin_rows(&self) -> impl Iterator<Item = &CoinRow> {
        self.rows.iter().filter_map(|r| match r {
            BoardRow::Coin(c) => Some(c),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Another cycle was running; nothing was started.
    Dropped,
    Completed(BoardView),
}

/// Held for the lifetime of one cycle. Dropping it returns the board to
/// `Idle`, whichever way the cycle ends. A guard dropped before `finish`
/// (panic, aborted task) replaces the cycle's `Loading` row with `Unreachable`.
pub struct CycleGuard {
    state: Arc<Mutex<RequestState>>,
    view_tx: Arc<watch::Sender<BoardView>>,
    cycle: Uuid,
    trigger: Trigger,
    finished: bool,
}

impl CycleGuard {
    pub fn cycle_id(&self) -> Uuid {
        self.cycle
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Call once the final view is published.
    pub fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        if !self.finished {
            let cycle = self.cycle;
            let replaced = self.view_tx.send_if_modified(|view| {
                if view.cycle_id != Some(cycle) {
                    return false;
                }
                view.rows = vec![BoardRow::Unreachable];
                view.updated_ts = now_ts();
                true
            });
            log::warn!(
                "board.cycle.abandoned cycle={} trigger={} view_replaced={}",
                cycle,
                self.trigger,
                replaced
            );
        }
        let mut st = self.state.lock();
        if matches!(*st, RequestState::InFlight { cycle, .. } if cycle == self.cycle) {
            *st = RequestState::Idle;
        }
    }
}

pub struct PriceBoard {
    client: PriceClient,
    state: Arc<Mutex<RequestState>>,
    view_tx: Arc<watch::Sender<BoardView>>,
}

impl PriceBoard {
    pub fn new(client: PriceClient) -> Self {
        let (view_tx, _) = watch::channel(BoardView::empty());
        Self {
            client,
            state: Arc::new(Mutex::new(RequestState::Idle)),
            view_tx: Arc::new(view_tx),
        }
    }

    pub fn view(&self) -> BoardView {
        self.view_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BoardView> {
        self.view_tx.subscribe()
    }

    pub fn request_state(&self) -> RequestState {
        *self.state.lock()
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.request_state(), RequestState::InFlight { .. })
    }

    /// Idle -> InFlight. Returns `None` (and the trigger is dropped) when a
    /// cycle is already running.
    pub fn begin(&self, trigger: Trigger) -> Option<CycleGuard> {
        let mut st = self.state.lock();
        if let RequestState::InFlight {
            cycle,
            trigger: running,
        } = *st
        {
            log::debug!(
                "board.trigger.dropped trigger={} running_cycle={} running_trigger={}",
                trigger,
                cycle,
                running
            );
            return None;
        }
        let cycle = Uuid::new_v4();
        *st = RequestState::InFlight { cycle, trigger };
        Some(CycleGuard {
            state: self.state.clone(),
            view_tx: self.view_tx.clone(),
            cycle,
            trigger,
            finished: false,
        })
    }

    /// Runs one cycle in place.
    pub async fn run_cycle(&self, trigger: Trigger, selection: QuerySelection) -> CycleOutcome {
        match self.begin(trigger) {
            None => CycleOutcome::Dropped,
            Some(guard) => CycleOutcome::Completed(self.execute(guard, selection).await),
        }
    }

    /// Starts one cycle on the runtime. Returns false when the trigger was dropped.
    pub fn trigger(self: &Arc<Self>, trigger: Trigger, selection: QuerySelection) -> bool {
        let Some(guard) = self.begin(trigger) else {
            return false;
        };
        let board = Arc::clone(self);
        tokio::spawn(async move {
            board.execute(guard, selection).await;
        });
        true
    }

    async fn execute(&self, guard: CycleGuard, selection: QuerySelection) -> BoardView {
        let cycle_id = guard.cycle_id();
        let trigger = guard.trigger();
        log::info!(
            "board.cycle.start cycle={} trigger={} currency={} limit={}",
            cycle_id,
            trigger,
            selection.currency,
            selection.limit
        );

        self.publish(cycle_id, trigger, &selection, vec![BoardRow::Loading]);

        let rows = match self.client.fetch_prices(&selection).await {
            Ok(resp) => {
                log_response(cycle_id, &resp);
                rows_for_response(resp)
            }
            Err(e) => {
                log::error!(
                    "board.cycle.error cycle={} url={} {}",
                    cycle_id,
                    self.client.prices_url(),
                    e
                );
                vec![BoardRow::Unreachable]
            }
        };

        let view = self.publish(cycle_id, trigger, &selection, rows);
        log::info!(
            "board.cycle.done cycle={} rows={} coins={}",
            cycle_id,
            view.rows.len(),
            view.coin_rows().count()
        );
        // The final view is visible before the board goes idle again.
        guard.finish();
        view
    }

    fn publish(
        &self,
        cycle_id: Uuid,
        trigger: Trigger,
        selection: &QuerySelection,
        rows: Vec<BoardRow>,
    ) -> BoardView {
        let view = BoardView {
            cycle_id: Some(cycle_id),
            trigger: Some(trigger),
            selection: Some(selection.clone()),
            rows,
            updated_ts: now_ts(),
        };
        self.view_tx.send_replace(view.clone());
        view
    }
}

fn log_response(cycle_id: Uuid, resp: &PricesResponse) {
    let records = resp.data.as_ref().map(Vec::len).unwrap_or(0);
    if records == 0 {
        log::warn!(
            "board.cycle.unavailable cycle={} warning={:?} upstream_error={:?}",
            cycle_id,
            resp.warning,
            resp.error
        );
    } else if let Some(w) = &resp.warning {
        log::warn!("board.upstream.warning cycle={} {}", cycle_id, w);
    }
    log::debug!(
        "board.cycle.response cycle={} records={} cached={:?} currency={:?} count={:?}",
        cycle_id,
        records,
        resp.cached,
        resp.currency,
        resp.count
    );
}
