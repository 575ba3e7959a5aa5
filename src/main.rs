use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use window_throttler::config::parse_duration;
use window_throttler::error::ErrorResponse;
use window_throttler::{LimiterConfig, QuotaPlan, Throttler};

/// Drive a sliding window throttler with concurrent workers and report what happened.
#[derive(Debug, Parser)]
#[command(name = "window-throttler", version)]
struct Args {
    /// JSON quota plan; overrides the limiter flags below
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Admissions per window (defaults to THROTTLE_CAPACITY)
    #[arg(long)]
    capacity: Option<usize>,

    /// Window length, e.g. "1s" or "250ms" (defaults to THROTTLE_WINDOW)
    #[arg(long, value_parser = parse_duration)]
    window: Option<Duration>,

    /// Ceiling for each wait, "0s" disables it (defaults to THROTTLE_MAX_WAIT)
    #[arg(long, value_parser = parse_duration)]
    max_wait: Option<Duration>,

    /// Sub-quota as name=limit, may be repeated
    #[arg(long = "sub", value_parser = parse_sub_quota)]
    sub_quotas: Vec<(String, usize)>,

    /// Key each request is throttled under
    #[arg(long, default_value = "default")]
    key: String,

    /// Concurrent workers
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Requests per worker
    #[arg(long, default_value_t = 5)]
    requests: usize,

    /// Print the final metrics as JSON
    #[arg(long)]
    json: bool,
}

fn parse_sub_quota(raw: &str) -> Result<(String, usize), String> {
    let (name, limit) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=limit, got '{}'", raw))?;
    let limit = limit
        .trim()
        .parse()
        .map_err(|_| format!("invalid limit in '{}'", raw))?;
    Ok((name.trim().to_string(), limit))
}

fn load_plan(args: &Args) -> Result<QuotaPlan> {
    if let Some(path) = &args.plan {
        return Ok(QuotaPlan::from_json_file(path)?);
    }

    let env_config = LimiterConfig::from_env()?;
    let limiter = LimiterConfig {
        capacity: args.capacity.unwrap_or(env_config.capacity),
        window: args.window.unwrap_or(env_config.window),
        max_wait: args.max_wait.unwrap_or(env_config.max_wait),
    };

    let plan = args
        .sub_quotas
        .iter()
        .fold(QuotaPlan::new(limiter), |plan, (name, limit)| {
            plan.with_sub_quota(name.clone(), *limit)
        });
    plan.validate()?;
    Ok(plan)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "window_throttler=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let plan = load_plan(&args)?;
    let throttler = Arc::new(plan.build()?);

    tracing::info!(
        key = %args.key,
        workers = args.workers,
        requests = args.requests,
        "Starting workers"
    );

    let started = Instant::now();
    let mut handles = Vec::with_capacity(args.workers);

    for worker in 0..args.workers {
        let throttler = Arc::clone(&throttler);
        let key = args.key.clone();
        let requests = args.requests;

        handles.push(tokio::spawn(async move {
            for request in 0..requests {
                match throttler.acquire(&key).await {
                    Ok(waited) => tracing::info!(
                        worker,
                        request,
                        waited_ms = waited.as_millis() as u64,
                        at_ms = started.elapsed().as_millis() as u64,
                        "admitted"
                    ),
                    Err(err) => {
                        let response = ErrorResponse::from_error(&err);
                        tracing::warn!(worker, request, error = %response.error, "{}", response.message);
                    }
                }
            }
        }));
    }

    for handle in handles {
        handle.await?;
    }

    let metrics = throttler.metrics().snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        for (key, quota_metrics) in &metrics {
            println!(
                "{}: admitted={} delayed={} rejected={} total_delay={:?}",
                key,
                quota_metrics.admitted,
                quota_metrics.delayed,
                quota_metrics.rejected,
                quota_metrics.total_delay
            );
        }
        println!("elapsed: {:?}", started.elapsed());
    }

    print_status(&throttler, &args.key);
    Ok(())
}

fn print_status(throttler: &Throttler, key: &str) {
    let status = throttler.status(key);
    tracing::info!(
        key = %status.key,
        limit = status.limit,
        in_window = status.in_window,
        wait_ms = status.wait.as_millis() as u64,
        "Final status"
    );
}
