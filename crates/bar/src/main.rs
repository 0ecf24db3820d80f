use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use guardbar::i3bar;
use guardbar::notify::DesktopNotifier;
use guardbar::{ButtonMap, Dispatcher, Listener, MonitorState};
use guardbar_backend_usbguard::UsbguardBus;
use guardbar_common::config::{load_config, DEFAULT_CONFIG_PATH};
use guardbar_common::render::Renderer;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "guardbar", version, about = "usbguard status bar companion")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging();

    let config = load_config(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if args.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }
    info!(
        target: "guardbar",
        event = "start",
        config = %args.config.display(),
        "guardbar starting"
    );

    let renderer = Renderer::new(&config.format, config.display.urgent_when_empty)?;
    let state = MonitorState::new();
    let cancel = CancellationToken::new();

    let listener = Listener::new(
        Arc::new(UsbguardBus::new(config.usbguard.clone())),
        state.clone(),
        config.format.interest()?,
    )
    .reconnect_delay(config.usbguard.reconnect_delay())
    .list_query(config.usbguard.list_query.clone())
    .spawn(cancel.clone());

    let dispatcher = Dispatcher::new(
        state.clone(),
        Arc::new(DesktopNotifier::new()),
        config.format.notification_template()?,
        ButtonMap::new(config.buttons.clone()),
    );

    let writer = tokio::spawn(write_status(state.clone(), renderer, cancel.clone()));
    tokio::spawn(async move {
        if let Err(e) = read_clicks(dispatcher).await {
            tracing::error!(error = ?e, "click reader exited with error");
        }
    });

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("received ctrl_c, exiting");
        }
        _ = sigterm.recv() => info!("received SIGTERM, exiting"),
    }

    cancel.cancel();
    listener.shutdown(SHUTDOWN_GRACE).await;
    writer.await?.context("writing status")?;
    Ok(())
}

/// Writes the i3bar header, then one status line per render request.
async fn write_status(
    state: MonitorState,
    renderer: Renderer,
    cancel: CancellationToken,
) -> Result<()> {
    let mut out = tokio::io::stdout();
    let mut renders = state.subscribe_render();
    let header = serde_json::to_string(&i3bar::Header::default())?;
    out.write_all(format!("{header}\n[\n").as_bytes()).await?;

    let mut first = true;
    loop {
        let line = i3bar::status_line(&state.render(&renderer), first)?;
        first = false;
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;

        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = renders.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn read_clicks(dispatcher: Dispatcher) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match i3bar::parse_click(&line) {
            Ok(Some(click)) => dispatcher.handle_click(click).await,
            Ok(None) => {}
            Err(e) => debug!(error = %e, %line, "ignoring malformed click event"),
        }
    }
    debug!("stdin closed, no more click events");
    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the bar protocol
    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
