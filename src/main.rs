use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use std::time::Duration;

use paperless_push::cli::{Cli, Commands};
use paperless_push::config::{self, Config};
use paperless_push::cycle::{self, CycleOptions, UploadCycle};
use paperless_push::store::JsonStore;
use paperless_push::uploader::PaperClient;
use paperless_push::AppError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        log::error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Level set by `-v`, overriding the settings file.
fn verbose_level(verbose: u8) -> Option<LevelFilter> {
    match verbose {
        0 => None,
        1 => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    }
}

/// Global level to apply, `None` when RUST_LOG is in charge.
fn effective_level(verbose: u8, rust_log_set: bool, configured: LevelFilter) -> Option<LevelFilter> {
    if rust_log_set {
        None
    } else {
        Some(verbose_level(verbose).unwrap_or(configured))
    }
}

/// Install the logger before the settings file is read, so loading it is logged too.
/// Returns whether RUST_LOG owns the filter.
fn init_logging(verbose: u8) -> bool {
    let rust_log_set = std::env::var_os("RUST_LOG").is_some();

    let mut builder = env_logger::Builder::new();
    if rust_log_set {
        builder.parse_default_env();
    } else {
        builder.filter_level(LevelFilter::Trace);
    }
    builder.init();

    if let Some(level) = effective_level(verbose, rust_log_set, LevelFilter::Info) {
        log::set_max_level(level);
    }
    rust_log_set
}

fn apply_configured_level(settings: &Config, verbose: u8, rust_log_set: bool) {
    if let Some(level) = effective_level(verbose, rust_log_set, settings.log_filter()) {
        log::set_max_level(level);
    }
}

fn load_settings(cli: &Cli) -> anyhow::Result<Config> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => config::get_config_path()?,
    };

    let mut settings = config::load_config(&path)
        .with_context(|| format!("loading settings from {}", path.display()))?;

    if let Some(api_key) = &cli.api_key {
        settings.api_key = api_key.clone();
    }
    if let Some(paper_id) = &cli.paper_id {
        settings.paper_id = paper_id.clone();
    }

    Ok(settings)
}

fn build_cycle(settings: &Config) -> anyhow::Result<UploadCycle> {
    config::validate_config(settings).context("invalid settings")?;

    let client = PaperClient::new(settings.base_url(), &settings.api_key, &settings.paper_id)?;
    log::debug!("Uploading to {}", client.upload_url());

    Ok(UploadCycle {
        store: JsonStore::new(settings.state_dir()?),
        input_dir: settings.input_dir.clone(),
        publish_dir: settings.publish_dir.clone(),
        publish: settings.publish,
        settings: settings.upload_settings(),
        transport: Box::new(client),
    })
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let rust_log_set = init_logging(cli.verbose);
    let settings = load_settings(&cli)?;
    apply_configured_level(&settings, cli.verbose, rust_log_set);

    log::info!("Starting paperless-push v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Upload(args) => {
            let cycle = build_cycle(&settings)?;
            let state = cycle.run(&CycleOptions::from(args)).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Commands::Run(args) => {
            let every = match args.interval {
                Some(secs) => Duration::from_secs(secs),
                None => {
                    config::validate_scan_interval(&settings).context("invalid settings")?;
                    Duration::from_secs(settings.scan_interval_secs)
                }
            };
            let cycle = build_cycle(&settings)?;
            run_periodically(&cycle, every).await;
        }
        Commands::ResetRecent => {
            let store = JsonStore::new(settings.state_dir()?);
            cycle::reset_recent(&store).await?;
        }
        Commands::Status => {
            let store = JsonStore::new(settings.state_dir()?);
            let state = cycle::load_state(&store).await?.unwrap_or_default();
            let recent = cycle::load_recent(&store).await?;
            let report = serde_json::json!({
                "state": state,
                "recent": recent.iter().collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Run a cycle on every tick until Ctrl-C. Failed cycles are logged and retried next tick.
async fn run_periodically(cycle: &UploadCycle, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    log::info!("Uploading a new picture every {}s", every.as_secs());

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("Received Ctrl+C, stopping");
                return;
            }
        }

        let options = CycleOptions::default();
        tokio::select! {
            result = cycle.run(&options) => match result {
                Ok(state) => log::debug!("Cycle finished: {:?}", state.last_result),
                Err(AppError::EmptyCandidateSet { dir }) => {
                    log::warn!("Nothing to upload yet, {} has no images", dir)
                }
                Err(e) if e.is_retryable() => log::warn!("Cycle skipped: {}", e),
                Err(e) => log::error!("Cycle failed: {}", e),
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("Received Ctrl+C, abandoning the in-flight upload");
                return;
            }
        }
    }
}
