mod board;
mod config;
mod dashboard;
mod format;
mod price_client;
mod render;
mod utils;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use crate::{
    board::{CycleOutcome, PriceBoard, Trigger},
    config::Settings,
    price_client::{PriceClient, QuerySelection},
};

#[derive(Debug, Parser)]
#[command(name = "priceboard", version, about = "Coin price table backed by a remote price API")]
struct Cli {
    /// Override RUN_MODE (serve|once)
    #[arg(long)]
    mode: Option<String>,

    /// Override DEFAULT_CURRENCY
    #[arg(long)]
    currency: Option<String>,

    /// Override DEFAULT_LIMIT
    #[arg(long)]
    limit: Option<u32>,

    /// Override PRICE_API_BASE
    #[arg(long = "api-base")]
    api_base: Option<String>,
}

impl Cli {
    fn apply(self, settings: &mut Settings) -> Result<()> {
        if let Some(m) = self.mode {
            settings.run_mode = m.to_lowercase();
        }
        if let Some(c) = self.currency {
            settings.default_currency = c.trim().to_lowercase();
        }
        if let Some(l) = self.limit {
            settings.default_limit = l;
        }
        if let Some(base) = self.api_base {
            settings.price_api_base = base.trim().trim_end_matches('/').to_string();
        }
        settings.validate()
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    cli.apply(&mut settings)?;

    let client = PriceClient::new(&settings.price_api_base).context("build price api client")?;
    let board = Arc::new(PriceBoard::new(client));

    log::info!(
        "app.start run_mode={} price_api={} currency={} limit={}",
        settings.run_mode,
        settings.price_api_base,
        settings.default_currency,
        settings.default_limit
    );

    match settings.run_mode.as_str() {
        "once" => run_once(&settings, &board).await,
        "serve" => serve(settings, board).await,
        other => Err(anyhow!("unsupported run mode {other}")),
    }
}

async fn run_once(settings: &Settings, board: &PriceBoard) -> Result<()> {
    let selection = QuerySelection {
        currency: settings.default_currency.clone(),
        limit: settings.default_limit,
    };
    match board.run_cycle(Trigger::InitialLoad, selection).await {
        CycleOutcome::Completed(view) => {
            print!("{}", render::text_table(&view));
            Ok(())
        }
        CycleOutcome::Dropped => Err(anyhow!("a cycle was already running")),
    }
}

async fn serve(settings: Settings, board: Arc<PriceBoard>) -> Result<()> {
    if settings.dashboard_open_browser {
        let url = format!("http://{}:{}/", settings.dashboard_host, settings.dashboard_port);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(650)).await;
            let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
        });
    }

    tokio::select! {
        res = dashboard::serve_dashboard(settings, board) => res,
        _ = tokio::signal::ctrl_c() => {
            log::info!("app.shutdown reason=ctrl_c");
            Ok(())
        }
    }
}
