use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::warn;

use script_harvest::config::Settings;
use script_harvest::{Extractor, HttpFetcher, Job, JobStatus, JobStore};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "script_harvest", about = "Download every script a web page loads")]
struct Cli {
    /// SQLite job database (overrides SCRIPT_HARVEST_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the scripts of one or more pages (jobs run concurrently)
    Extract {
        /// Page URLs; `https://` is assumed when no scheme is given
        #[arg(required = true)]
        urls: Vec<String>,
        /// Output root, one directory per domain (overrides SCRIPT_HARVEST_OUTPUT_DIR)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List recent jobs, newest first
    Jobs {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Show one job with its log and per-file outcomes
    Show {
        job_id: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load()?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    let store = Arc::new(JobStore::open(&settings.db_path)?);

    let result = match cli.command {
        Commands::Extract { urls, output } => {
            if let Some(dir) = output {
                settings.output_dir = dir;
            }
            let fetcher = HttpFetcher::from_settings(&settings)?;
            let extractor = Arc::new(Extractor::new(
                Arc::clone(&store),
                Arc::new(fetcher),
                settings.output_dir.clone(),
            ));
            extract(&extractor, &urls).await
        }
        Commands::Jobs { limit } => {
            let jobs = store.list_recent_jobs(limit)?;
            if jobs.is_empty() {
                println!("No jobs yet. Run 'extract <url>' first.");
                return Ok(());
            }

            println!(
                "{:<36} | {:<10} | {:<28} | {:>5} | {:>5} | {:>5} | {:>10} | {:<19}",
                "Job", "Status", "Domain", "Total", "OK", "Err", "Bytes", "Created"
            );
            println!("{}", "-".repeat(140));
            for j in &jobs {
                println!(
                    "{:<36} | {:<10} | {:<28} | {:>5} | {:>5} | {:>5} | {:>10} | {:<19}",
                    j.id,
                    j.status,
                    truncate(&j.domain, 28),
                    j.total_files,
                    j.successful_files,
                    j.failed_files,
                    j.total_size_bytes,
                    j.created_at.get(..19).unwrap_or(&j.created_at),
                );
            }
            println!("\n{} jobs", jobs.len());
            Ok(())
        }
        Commands::Show { job_id, json } => {
            let job = store
                .get_job(&job_id)?
                .with_context(|| format!("No job with id {}", job_id))?;
            let outcomes = store.list_outcomes_by_job(&job_id)?;

            if json {
                let doc = serde_json::json!({ "job": job, "outcomes": outcomes });
                println!("{}", serde_json::to_string_pretty(&doc)?);
                return Ok(());
            }

            println!("Job:       {}", job.id);
            println!("Source:    {}", job.source_url);
            println!("Domain:    {}", job.domain);
            println!("Status:    {}", job.status);
            println!(
                "Files:     {} total, {} ok, {} failed ({} bytes)",
                job.total_files, job.successful_files, job.failed_files, job.total_size_bytes
            );
            println!("Created:   {}", job.created_at);
            println!("Completed: {}", job.completed_at.as_deref().unwrap_or("-"));

            println!("\n--- Log ---");
            for entry in &job.logs {
                println!("{} [{:<8}] {}", entry.timestamp, entry.kind, entry.message);
            }

            if !outcomes.is_empty() {
                println!("\n--- Files ---");
                for (i, o) in outcomes.iter().enumerate() {
                    let detail = match (&o.size_bytes, &o.error_message) {
                        (Some(size), _) => format!("{} bytes", size),
                        (None, Some(err)) => err.clone(),
                        (None, None) => String::new(),
                    };
                    println!(
                        "{:>3} | {:<7} | {:<28} | {}",
                        i + 1,
                        o.status,
                        truncate(&o.local_filename, 28),
                        detail
                    );
                    println!("    | {}", o.original_url);
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Start one job per URL and follow them through the store until all finish.
async fn extract(extractor: &Arc<Extractor>, urls: &[String]) -> Result<()> {
    let multi = MultiProgress::new();
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] {bar:30} {pos}/{len} {prefix} {msg}")?
        .progress_chars("=> ");

    let mut running = Vec::with_capacity(urls.len());
    for url in urls {
        let (job, handle) = extractor.submit(url)?;
        let pb = multi.add(ProgressBar::new(0));
        pb.set_style(style.clone());
        pb.set_prefix(job.domain.clone());
        running.push((job.id, handle, pb));
    }

    loop {
        let mut all_done = true;
        for (id, handle, pb) in &running {
            if let Some(job) = extractor.store().get_job(id)? {
                pb.set_length(job.total_files.max(0) as u64);
                pb.set_position(extractor.store().list_outcomes_by_job(id)?.len() as u64);
                pb.set_message(job.status.to_string());
            }
            if !handle.is_finished() {
                all_done = false;
            }
        }
        if all_done {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    let mut finished: Vec<Job> = Vec::with_capacity(running.len());
    for (id, handle, pb) in running {
        if let Err(e) = handle.await {
            warn!("Job task {} did not finish cleanly: {}", id, e);
        }
        pb.finish_and_clear();
        if let Some(job) = extractor.store().get_job(&id)? {
            finished.push(job);
        }
    }

    for job in &finished {
        match job.status {
            JobStatus::Completed => println!(
                "{} {}: {} of {} files ({} bytes) -> {}",
                job.id,
                job.source_url,
                job.successful_files,
                job.total_files,
                job.total_size_bytes,
                extractor.output_path(&job.domain).display()
            ),
            _ => println!(
                "{} {}: {} ({})",
                job.id,
                job.source_url,
                job.status,
                job.logs.last().map(|l| l.message.as_str()).unwrap_or("no log")
            ),
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
