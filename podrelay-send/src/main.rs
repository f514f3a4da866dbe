//! podrelay-send - Cross-posting daemon and run commands
//!
//! Runs the hourly episode check in the foreground and exposes the manual
//! controls (check now, post latest, start/stop) plus read-only views of the
//! activity log and last results.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use libpodrelay::automation::{CheckReport, RunReport};
use libpodrelay::logging;
use libpodrelay::{PlatformId, PodrelayError, PodrelayService};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "podrelay-send")]
#[command(version)]
#[command(about = "Cross-post new podcast episodes to social platforms")]
#[command(long_about = "\
podrelay-send - Cross-post new podcast episodes to social platforms

DESCRIPTION:
    podrelay-send checks the enabled episode sources (YouTube, Spotify,
    Rumble) for new episodes and posts each new one to the targets routed
    for its source. Automation state is persisted: 'start' and 'stop' take
    effect on a running daemon without a restart.

USAGE:
    # Run the scheduler in the foreground
    podrelay-send daemon

    # Turn automation on, then check right away
    podrelay-send start
    podrelay-send check-now

    # Post the newest Spotify episode even if it was posted before
    podrelay-send post-latest --source spotify --bypass-dedup

    # Post to targets no source routes to
    podrelay-send post-latest --to bluesky --to instagram

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current run)

CONFIGURATION:
    Configuration file: ~/.config/podrelay/config.toml (or $PODRELAY_CONFIG)
    Database location: ~/.local/share/podrelay/podrelay.db

    [automation]
    check_interval = \"1h\"
    run_timeout = \"60s\"
    max_retries = 2

EXIT CODES:
    0 - Success (including an episode that was already posted)
    1 - Runtime error
    2 - Authentication error
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format for reports
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until interrupted
    Daemon {
        /// How often to look at the automation state, in seconds
        #[arg(long, value_name = "SECONDS", default_value_t = 30)]
        poll_interval: u64,

        /// Run one scheduler tick and exit (for testing)
        #[arg(long, hide = true)]
        once: bool,
    },

    /// Turn automation on; the first check is due immediately
    Start,

    /// Turn automation off
    Stop,

    /// Show the automation state
    Status,

    /// Check every enabled source now
    CheckNow,

    /// Post the newest episode
    PostLatest {
        /// Source to take the episode from (default: first enabled source)
        #[arg(long)]
        source: Option<PlatformId>,

        /// Post even if this episode was posted before
        #[arg(long, conflicts_with = "to")]
        bypass_dedup: bool,

        /// Post to exactly these targets instead of the routed ones
        #[arg(long, value_name = "PLATFORM")]
        to: Vec<PlatformId>,
    },

    /// Show the activity log
    Logs {
        /// Number of days to show, newest first
        #[arg(long, default_value_t = 1)]
        days: u32,

        /// Delete the whole activity log
        #[arg(long)]
        clear: bool,
    },

    /// Show the last result of every target
    Results,

    /// List videos that have been posted
    Posted,

    /// Forget that a video was posted so the next check posts it again
    Forget {
        video_id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_default(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<PodrelayError>()
                .map(PodrelayError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let service = PodrelayService::new().await?;
    let format = cli.format;

    match cli.command {
        Command::Daemon {
            poll_interval,
            once,
        } => run_daemon(&service, poll_interval, once).await,
        Command::Start => {
            let status = service.status().start(Utc::now()).await?;
            print_json_or(format, &status, || println!("Automation started"))
        }
        Command::Stop => {
            let status = service.status().stop().await?;
            print_json_or(format, &status, || println!("Automation stopped"))
        }
        Command::Status => {
            let status = service.status().get().await?;
            print_json_or(format, &status, || {
                let now = Utc::now();
                println!(
                    "State:        {}",
                    if status.running { "RUNNING" } else { "STOPPED" }
                );
                println!("Last check:   {}", show_time(status.last_check));
                println!("Next check:   {}", show_time(status.next_check));
                println!("Checks today: {}", status.checks_on(now));
            })
        }
        Command::CheckNow => {
            let report = service.scheduler().check_now().await?;
            print_json_or(format, &report, || print_check(&report))
        }
        Command::PostLatest {
            source,
            bypass_dedup,
            to,
        } => {
            let scheduler = service.scheduler();
            let result = if to.is_empty() {
                scheduler.post_latest(source, bypass_dedup).await
            } else {
                scheduler.post_latest_to(source, &to).await
            };
            match result {
                Ok(report) => print_json_or(format, &report, || print_run(&report)),
                Err(PodrelayError::AlreadyPosted(video_id)) => {
                    println!(
                        "Video {} was already posted; use --bypass-dedup to post it again",
                        video_id
                    );
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::Logs { days, clear } => {
            if clear {
                let removed = service.logger().clear().await?;
                println!("Removed {} day(s) of activity log", removed);
                return Ok(());
            }
            let logs = service.logger().recent(days).await?;
            print_json_or(format, &logs, || {
                for day in &logs {
                    println!("== {} ({} entries)", day.date, day.entries.len());
                    for entry in day.entries.iter().rev() {
                        println!(
                            "{}  {:<7} {}",
                            entry.timestamp.format("%H:%M:%S"),
                            format!("{:?}", entry.level).to_uppercase(),
                            entry.message
                        );
                    }
                }
            })
        }
        Command::Results => {
            let results = service.results().all().await?;
            print_json_or(format, &results, || {
                if results.is_empty() {
                    println!("No results recorded yet");
                }
                for (platform, result) in &results {
                    let outcome = if result.success {
                        result.post_url.clone().unwrap_or_else(|| "ok".to_string())
                    } else {
                        result.error.clone().unwrap_or_default()
                    };
                    println!(
                        "{:<10} {:<4} {}  {}",
                        platform.as_str(),
                        if result.success { "OK" } else { "FAIL" },
                        result.timestamp.format("%Y-%m-%d %H:%M"),
                        outcome
                    );
                }
            })
        }
        Command::Posted => {
            let posted = service.dedup().list().await?;
            print_json_or(format, &posted, || {
                for record in &posted {
                    println!("{}  {}", record.posted_at.format("%Y-%m-%d %H:%M"), record.video_id);
                }
            })
        }
        Command::Forget { video_id } => {
            if service.dedup().clear(&video_id).await? {
                println!("Forgot {}", video_id);
            } else {
                println!("{} was not marked as posted", video_id);
            }
            Ok(())
        }
    }
}

async fn run_daemon(service: &PodrelayService, poll_interval: u64, once: bool) -> anyhow::Result<()> {
    info!("podrelay-send daemon starting");

    if once {
        match service.scheduler().tick(Utc::now()).await? {
            Some(report) => info!(
                "Check finished: {} run(s), {} already posted",
                report.runs.len(),
                report.already_posted.len()
            ),
            None => info!("No check due"),
        }
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone()).context("Signal setup failed")?;

    service
        .scheduler()
        .run_loop(Duration::from_secs(poll_interval), shutdown)
        .await;

    info!("podrelay-send daemon stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> std::io::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("Received signal {}, stopping gracefully...", sig);
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> std::io::Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });
    Ok(())
}

fn print_json_or<T: serde::Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce(),
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(),
    }
    Ok(())
}

fn show_time(time: Option<chrono::DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_run(report: &RunReport) {
    println!("\"{}\" ({})", report.title, report.video_id);
    for (platform, result) in &report.results {
        if result.success {
            println!(
                "  ✓ {}{}",
                platform.display_name(),
                result
                    .post_url
                    .as_ref()
                    .map(|url| format!(": {}", url))
                    .unwrap_or_default()
            );
        } else {
            println!(
                "  ✗ {}: {}",
                platform.display_name(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    println!(
        "{} succeeded, {} failed, {} skipped",
        report.succeeded, report.failed, report.skipped
    );
}

fn print_check(report: &CheckReport) {
    println!("Checked {} source(s)", report.sources.len());
    for run in &report.runs {
        print_run(run);
    }
    for video_id in &report.already_posted {
        println!("Already posted: {}", video_id);
    }
    for (source, message) in &report.errors {
        error!("{}: {}", source, message);
        println!("Error reading {}: {}", source, message);
    }
}
