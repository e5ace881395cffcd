use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use quakemon_service::alert::LogNotifier;
use quakemon_service::config::{ConfigError, Settings, DEFAULT_SETTINGS_FILE};
use quakemon_service::ingest::usgs::{HttpFeed, FEED_URL};
use quakemon_service::logging::init_logging;
use quakemon_service::poller::{self, Command, Controller, Trigger};
use quakemon_service::render::LogView;
use quakemon_service::verify::verify_feed;

#[derive(Parser)]
#[command(name = "quakemon")]
#[command(version, about = "Watch the USGS feed for earthquakes near you", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(short, long, env = "QUAKEMON_CONFIG", default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    /// Run a single forced cycle and exit
    #[arg(long)]
    once: bool,

    /// Probe the feed, print a JSON report and exit
    #[arg(long, conflicts_with = "once")]
    verify: bool,

    /// Write the effective settings back to the settings file and exit
    #[arg(long, conflicts_with_all = ["once", "verify"])]
    save_settings: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let loaded = Settings::load(&cli.config);
    let mut settings = loaded.as_ref().ok().cloned().unwrap_or_default();
    init_logging(&settings.logging.level, settings.log_file().as_deref())
        .context("cannot open log file")?;

    match &loaded {
        Ok(_) => info!(path = %cli.config.display(), "settings loaded"),
        Err(ConfigError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
            warn!(path = %cli.config.display(), "settings file not found; using defaults")
        }
        Err(e) => error!(error = %e, "could not read settings; using defaults"),
    }
    report_missing_sound(&mut settings);

    if cli.save_settings {
        settings.save(&cli.config)?;
        return Ok(());
    }

    let feed = HttpFeed::new(FEED_URL)?;

    if cli.verify {
        let report = verify_feed(&feed).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        if report.is_unexpected_failure() {
            anyhow::bail!("feed verification failed: {}", report.error_message.unwrap_or_default());
        }
        return Ok(());
    }

    let view = LogView::new(settings.map_output());
    let controller = Arc::new(Controller::new(feed, LogNotifier, view, settings)?);

    if cli.once {
        controller.poll(Trigger::Initial).await.log_status();
        for entry in controller.nearby().await.entries {
            println!("{}", entry.line);
        }
        return Ok(());
    }

    info!("quakemon starting; commands: refresh, reload, quit");
    let (tx, rx) = mpsc::channel(16);
    let scheduler = tokio::spawn(poller::run(controller, rx));

    tokio::spawn(read_commands(tx.clone(), cli.config.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received");
            let _ = tx.send(Command::Shutdown).await;
        }
        _ = tx.closed() => {}
    }

    scheduler.await.context("scheduler task panicked")?;
    info!("quakemon stopped");
    Ok(())
}

/// Reads line commands from stdin until EOF or `quit`.
async fn read_commands(tx: mpsc::Sender<Command>, config_path: PathBuf) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                error!(error = %e, "cannot read stdin");
                return;
            }
        };

        let command = match line.trim() {
            "" => continue,
            "r" | "refresh" => Command::Refresh,
            "reload" => match Settings::load(&config_path) {
                Ok(mut settings) => {
                    report_missing_sound(&mut settings);
                    Command::Apply(Box::new(settings))
                }
                Err(e) => {
                    warn!(error = %e, "settings not reloaded");
                    continue;
                }
            },
            "q" | "quit" => Command::Shutdown,
            other => {
                warn!(command = other, "unknown command");
                continue;
            }
        };

        if tx.send(command).await.is_err() {
            return;
        }
    }
}

fn report_missing_sound(settings: &mut Settings) {
    if let Some(sound) = settings.drop_missing_sound() {
        warn!(sound = %sound.display(), "configured notification sound not found; disabling it");
    }
}
