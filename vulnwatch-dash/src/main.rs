use std::sync::Arc;

use anyhow::{Context, bail};
use env_logger::{Builder, Target};
use log::LevelFilter;

use vulnwatch_dash::api_client::{ApiClient, ScanApi};
use vulnwatch_dash::config::DashConfig;
use vulnwatch_dash::notifications::NotificationChannel;
use vulnwatch_dash::view_models;
use vulnwatch_dash::watcher::{JobWatcher, WatchPhase, WatchSnapshot};
use vulnwatch_model::JobStatus;

fn init_logger() {
    Builder::new()
        .target(Target::Stdout)
        .filter_level(LevelFilter::Warn)
        .filter_module("vulnwatch_dash", LevelFilter::Info)
        .init();
}

enum Mode {
    /// Start a scan for a domain and watch it to completion.
    Scan { domain: String },
    /// Attach to an existing job by id.
    Attach { job_id: String },
    /// Print the job history and exit.
    History,
}

fn parse_args() -> Option<Mode> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [flag] if flag == "--history" => Some(Mode::History),
        [flag, job_id] if flag == "--job" => Some(Mode::Attach {
            job_id: job_id.clone(),
        }),
        [domain] if !domain.starts_with('-') => Some(Mode::Scan {
            domain: domain.clone(),
        }),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        init_logger();
    } else {
        env_logger::init();
    }

    let Some(mode) = parse_args() else {
        eprintln!("usage: vulnwatch-dash <domain> | --job <job_id> | --history");
        std::process::exit(2);
    };

    let config = DashConfig::from_environment();
    config.validate()?;
    let api = Arc::new(ApiClient::new(&config.server_url)?);

    match mode {
        Mode::History => print_history(api.as_ref()).await,
        Mode::Scan { domain } => watch(api, &config, WatchTarget::Domain(domain)).await,
        Mode::Attach { job_id } => watch(api, &config, WatchTarget::Job(job_id)).await,
    }
}

enum WatchTarget {
    Domain(String),
    Job(String),
}

async fn print_history(api: &ApiClient) -> anyhow::Result<()> {
    let jobs = api.list_jobs().await.context("failed to fetch job history")?;
    if jobs.is_empty() {
        println!("no scan jobs recorded");
        return Ok(());
    }
    for job in jobs {
        println!(
            "{}  {:<32} {:>8} [{:?}]  {}",
            job.job_id,
            job.domain,
            job.status.to_string(),
            view_models::status_badge(job.status),
            view_models::format_timestamp(job.created_at.as_ref()),
        );
    }
    Ok(())
}

async fn watch(
    api: Arc<ApiClient>,
    config: &DashConfig,
    target: WatchTarget,
) -> anyhow::Result<()> {
    let (channel, push) = NotificationChannel::subscribe(&config.server_url);
    let handle = JobWatcher::spawn(api.clone(), push);

    match target {
        WatchTarget::Domain(domain) => handle.start(domain),
        WatchTarget::Job(job_id) => {
            let jobs = api.list_jobs().await.context("failed to fetch job history")?;
            let job = jobs
                .into_iter()
                .find(|job| job.job_id.as_str() == job_id)
                .with_context(|| format!("no such job: {job_id}"))?;
            handle.open(job);
        }
    }

    let mut snapshots = handle.snapshots();
    let mut final_snapshot = loop {
        snapshots
            .changed()
            .await
            .context("watcher stopped unexpectedly")?;
        let snapshot = snapshots.borrow_and_update().clone();
        print_progress(&snapshot);

        if snapshot.is_terminal() {
            break snapshot;
        }
        // A surfaced start failure idles the session with a reason attached.
        if snapshot.phase == WatchPhase::Idle {
            if let Some(reason) = snapshot.last_error {
                channel.close();
                bail!("scan could not be started: {reason}");
            }
        }
    };

    // The terminal fold may have kicked off one last crawl/vulnerability
    // refresh; give those results a moment to land before printing.
    while let Ok(Ok(())) =
        tokio::time::timeout(std::time::Duration::from_secs(2), snapshots.changed()).await
    {
        final_snapshot = snapshots.borrow_and_update().clone();
    }

    channel.close();
    print_results(&final_snapshot);

    if final_snapshot.status == JobStatus::Error {
        bail!("scan ended in error");
    }
    Ok(())
}

fn print_progress(snapshot: &WatchSnapshot) {
    let domain = snapshot.domain.as_deref().unwrap_or("?");
    println!(
        "[{}/3 {}] {} status={} progress={}% crawled={} vulnerable={} safe={}",
        snapshot.step.index(),
        snapshot.step.label(),
        domain,
        snapshot.status,
        snapshot.progress,
        snapshot.stats.total,
        snapshot.stats.vulnerable,
        snapshot.stats.safe,
    );
}

fn print_results(snapshot: &WatchSnapshot) {
    println!();
    println!("crawled URLs ({}):", snapshot.stats.total);
    for row in view_models::sort_crawl_for_display(snapshot.crawl.clone()) {
        println!(
            "  {}  [{}]",
            row.url,
            view_models::format_timestamp(row.created_at.as_ref())
        );
    }
    if !snapshot.vulns.is_empty() {
        println!("findings ({}):", snapshot.stats.vulnerable);
        for finding in &snapshot.vulns {
            println!(
                "  {:?} {} - {}",
                view_models::risk_badge(&finding.risk),
                finding.url,
                finding.details,
            );
        }
    }
}
