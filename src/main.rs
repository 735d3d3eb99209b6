use resume_harvester::core::config::{load_config_file, load_harvest_config};
use resume_harvester::progress_ledger::ProgressLedger;
use resume_harvester::session_store::parse_cookie_export;
use resume_harvester::{Harvester, RunOutcome, StopSignal};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Debug, Default)]
struct CliArgs {
    cookies: Option<PathBuf>,
    config: Option<PathBuf>,
    reset: bool,
    stats: bool,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        if a == "--reset" {
            parsed.reset = true;
        } else if a == "--stats" {
            parsed.stats = true;
        } else if a == "--cookies" || a == "--config" {
            let value = args
                .next()
                .ok_or_else(|| anyhow::anyhow!("{} needs a path", a))?;
            if a == "--cookies" {
                parsed.cookies = Some(PathBuf::from(value));
            } else {
                parsed.config = Some(PathBuf::from(value));
            }
        } else if let Some(rest) = a.strip_prefix("--cookies=") {
            parsed.cookies = Some(PathBuf::from(rest));
        } else if let Some(rest) = a.strip_prefix("--config=") {
            parsed.config = Some(PathBuf::from(rest));
        } else if a == "--help" || a == "-h" {
            println!(
                "usage: resume-harvester [--cookies <file>] [--config <file>] [--stats] [--reset]"
            );
            std::process::exit(0);
        } else {
            anyhow::bail!("unknown argument: {}", a);
        }
    }
    Ok(parsed)
}

async fn run() -> anyhow::Result<ExitCode> {
    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => load_config_file(path)?,
        None => load_harvest_config(),
    };
    config.validate()?;

    let mut ledger = ProgressLedger::load(&config.paths.progress_file)?;

    if args.reset {
        ledger.reset()?;
        info!("Progress ledger reset ({})", ledger.path().display());
        return Ok(ExitCode::SUCCESS);
    }
    if args.stats {
        println!("{}", serde_json::to_string_pretty(&ledger.stats())?);
        return Ok(ExitCode::SUCCESS);
    }

    let cookie_path = args
        .cookies
        .clone()
        .unwrap_or_else(|| config.paths.cookies_file.clone());
    let cookie_text = match std::fs::read_to_string(&cookie_path) {
        Ok(text) => text,
        Err(e) => {
            error!(
                "Cannot read cookies from {}: {}. Export your portal cookies as a JSON array to that file.",
                cookie_path.display(),
                e
            );
            return Ok(ExitCode::from(1));
        }
    };
    let cookies = match parse_cookie_export(&cookie_text) {
        Ok(cookies) => cookies,
        Err(e) => {
            error!("{} ({})", e, cookie_path.display());
            return Ok(ExitCode::from(1));
        }
    };

    let stop = StopSignal::new();
    let ctrl_c_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stop requested... will stop after the current job.");
            ctrl_c_stop.request();
        }
    });

    let mut harvester = Harvester::new(config, ledger).with_stop_signal(stop);
    let report = match harvester.run(&cookies).await {
        Ok(report) => report,
        Err(e) => {
            error!("Could not start: {}", e);
            return Ok(ExitCode::from(1));
        }
    };

    info!(
        "Summary: {} discovered, {} skipped, {} completed, {} failed, {} batch downloads this run",
        report.jobs_discovered,
        report.jobs_skipped,
        report.jobs_completed,
        report.jobs_failed,
        report.downloads
    );
    println!("{}", serde_json::to_string_pretty(&report.stats)?);

    Ok(match report.outcome {
        RunOutcome::Halted(e) => {
            error!("Run halted: {}", e);
            ExitCode::from(2)
        }
        RunOutcome::Completed | RunOutcome::NoJobs | RunOutcome::Stopped => ExitCode::SUCCESS,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}
