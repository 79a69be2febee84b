// Live leadoff tracker entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Open database
// 4. Load the watchlist, seeding it from config on first run
// 5. Rebuild the alert book from the persisted log
// 6. Build the feed client
// 7. Create mpsc channels
// 8. Spawn the polling loop
// 9. Run the console (blocks until the operator quits)
// 10. Cleanup on exit

use std::sync::Arc;

use leadoff_app::config;
use leadoff_app::console;
use leadoff_app::feed::{GameFeed, StatsApiClient};
use leadoff_app::scheduler::{self, EngineState};
use leadoff_core::alerts::AlertBook;
use leadoff_core::db::Database;
use leadoff_core::watchlist::Watchlist;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, not terminal)
    init_tracing()?;
    info!("Leadoff tracker starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: refresh every {}s, feed {}",
        config.polling.refresh_interval.as_secs(),
        config.feed.base_url
    );

    // 3. Open database
    let db = Arc::new(Database::open(&config.db_path).context("failed to open database")?);
    info!("Database opened at {}", config.db_path);

    // 4. Load the watchlist
    let mut names = db.load_watchlist().context("failed to load watchlist")?;
    if names.is_empty() && !config.watchlist_seed.is_empty() {
        for name in &config.watchlist_seed {
            db.add_watch(name)
                .with_context(|| format!("failed to seed watchlist with {name:?}"))?;
        }
        names = db.load_watchlist().context("failed to reload watchlist")?;
        info!("Seeded watchlist with {} names from config", names.len());
    }
    let watchlist = Watchlist::from_names(&names);
    info!("Watching {} players", watchlist.len());

    // 5. Rebuild the alert book
    let alerts = AlertBook::load(Arc::clone(&db)).context("failed to load alert log")?;

    // 6. Build the feed client
    let feed: Arc<dyn GameFeed> = Arc::new(
        StatsApiClient::new(&config.feed, config.polling.fetch_timeout)
            .context("failed to create feed client")?,
    );

    // 7. Create mpsc channels
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    // 8. Spawn the polling loop
    let state = EngineState::new(db, alerts, watchlist, &config.polling);
    let engine_handle = tokio::spawn(async move {
        if let Err(e) = scheduler::run(feed, state, cmd_rx, ui_tx).await {
            error!("Polling loop error: {}", e);
        }
    });

    // 9. Run the console
    info!("Application ready");
    if let Err(e) = console::run(ui_rx, cmd_tx).await {
        error!("Console error: {}", e);
    }

    // 10. Cleanup: wait for the polling loop to finish (with timeout)
    if tokio::time::timeout(std::time::Duration::from_secs(5), engine_handle)
        .await
        .is_err()
    {
        error!("Polling loop did not stop within 5s");
    }

    info!("Leadoff tracker shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (stdout belongs to the console).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("leadoff.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("leadoff_app=info,leadoff_core=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
