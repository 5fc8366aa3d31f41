use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::cli::{Args, Commands, HarvestArgs};
use crate::config::WatchdogConfig;
use crate::docker::DockerRuntime;
use crate::harvest::Harvester;
use crate::liveness::EndpointTarget;
use crate::notify::{LogNotifier, Notifier, TelegramNotifier};
use crate::watchdog::{CycleReport, Watchdog};

mod cli;
mod config;
mod docker;
mod harvest;
mod liveness;
mod notify;
mod restart;
mod watchdog;

fn init_logger(log_file: Option<&std::path::Path>) -> std::io::Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logger(args.log_file.as_deref()) {
        eprintln!("Unable to open log file: {e}");
        return ExitCode::FAILURE;
    }

    match args.command {
        Commands::Watch { config } => run_watch(&config).await,
        Commands::Harvest(harvest) => run_harvest(harvest).await,
    }
}

async fn run_watch(config_path: &std::path::Path) -> ExitCode {
    // A missing .env is fine, the variables may come from the scheduler.
    let _ = dotenv::dotenv();

    // Configuration is resolved before any network call is made.
    let config = match WatchdogConfig::try_init(config_path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {e}");
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    log::debug!("Monitoring project {}", config.project);

    let client = reqwest::Client::new();
    let notifier: Box<dyn Notifier + Send + Sync> = match config.telegram.clone() {
        Some(telegram) => Box::new(TelegramNotifier::new(telegram, client.clone())),
        None => {
            log::warn!("Telegram is not configured, notifications only go to the log");
            Box::new(LogNotifier)
        }
    };

    let watchdog = Watchdog {
        client,
        target: EndpointTarget {
            url: config.endpoint,
            timeout: config.check_timeout,
            expected_status: config.expected_status,
        },
        container: config.container,
        grace_window: config.grace_window,
        runtime: DockerRuntime::new(config.docker_timeout, config.restart_stop_secs),
        notifier,
    };

    let report = watchdog.run().await;
    if let CycleReport::Healed {
        reason,
        outcome,
        delivery,
    } = &report
    {
        log::debug!("Cycle finished: inactive ({reason}), {outcome:?}, delivery {delivery:?}");
    }

    // Restart failures are reported through the notifier, not the exit code.
    ExitCode::SUCCESS
}

async fn run_harvest(args: HarvestArgs) -> ExitCode {
    let pipes = if args.all {
        match harvest::list_pipes(&args.pipes_dir, &args.project) {
            Ok(pipes) => pipes,
            Err(e) => {
                log::error!("Unable to list pipes for {}: {e}", args.project);
                return ExitCode::FAILURE;
            }
        }
    } else {
        args.datasets
    };

    let base = match Url::parse(&format!("http://{}:{}", args.host, args.port)) {
        Ok(base) => base,
        Err(e) => {
            log::error!("Invalid scheduler address {}:{}: {e}", args.host, args.port);
            return ExitCode::FAILURE;
        }
    };

    let harvester = Harvester {
        client: reqwest::Client::new(),
        base,
        request_timeout: Duration::from_secs(args.timeout),
        delay: Duration::from_secs(args.delay),
        dry_run: !args.skip_dry_run,
    };

    let summary = harvester.run(&pipes).await;
    log::info!(
        "Harvest finished: {} triggered, {} failed, {} dry-run",
        summary.triggered,
        summary.failed,
        summary.skipped
    );
    ExitCode::SUCCESS
}
