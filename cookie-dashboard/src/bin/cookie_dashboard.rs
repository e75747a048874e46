/// Cookie Dashboard terminal
///
/// Polls the metrics endpoint once per second and renders the animated
/// cookie count, margin risk, leverage, trend chart and PnL breakdown.
use std::{
    error::Error,
    fs::File,
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use cookie_dashboard::{
    render_dashboard, HourlyCache, HttpSource, JsonFileStore, MetricAnimators, PollerConfig,
    PollingController,
};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
    },
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::info;

/// Get log file path from COOKIE_LOG_FILE env var (default: cookie-dashboard.log)
fn get_log_path() -> String {
    std::env::var("COOKIE_LOG_FILE").unwrap_or_else(|_| "cookie-dashboard.log".to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    let config = PollerConfig::from_env();
    info!("Starting cookie dashboard against {}", config.url);

    let store = JsonFileStore::open_or_empty(&config.cache_path);
    let source = HttpSource::new(config.url.clone(), config.request_timeout)?;
    let controller =
        Arc::new(PollingController::new(source, HourlyCache::new(store)).with_config(&config));

    let animators = MetricAnimators::new();
    let follower = animators.follow(controller.subscribe());
    let poller = controller.start();

    // Setup panic hook to restore terminal on crash
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic_info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let frame_rate = Duration::from_millis(33);
    let mut state_rx = controller.subscribe();
    let mut title: Option<String> = None;

    loop {
        let state = state_rx.borrow_and_update().clone();
        if state.title.is_some() && state.title != title {
            title = state.title.clone();
            if let Some(text) = &title {
                execute!(terminal.backend_mut(), SetTitle(text))?;
            }
        }

        let displayed = animators.displayed();
        terminal.draw(|f| render_dashboard(f, &state, &displayed))?;

        if event::poll(frame_rate)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    _ => {}
                }
            }
        }
    }

    poller.stop();
    follower.abort();

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Initialize logging to a file so the TUI is not overdrawn
fn init_logging() {
    let path = get_log_path();
    let file = match File::create(&path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Logging disabled, cannot open {}: {}", path, e);
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
}
