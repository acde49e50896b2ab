//! Pipeline Runtime - local trigger loop for the review pipeline
//!
//! Reads trigger events (S3-style notification JSON, one per line) from a
//! file or stdin and runs each as an independent invocation. Objects written
//! into watched buckets trigger the next stage automatically.
//!
//! Usage:
//!   pipeline_runtime [--event <file>] [--object <bucket>/<key>]... [--no-chain]
//!
//! With neither `--event` nor `--object`, events are read from stdin.
//!
//! Environment variables: see `PipelineConfig::from_env`.

use dotenv::dotenv;
use log::{error, info, warn};
use reviewflow::driver::runtime::run_chained;
use reviewflow::driver::{InvocationResponse, ObjectRef};
use reviewflow::{Pipeline, PipelineConfig, TriggerEvent};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

struct RuntimeArgs {
    event_file: Option<String>,
    objects: Vec<ObjectRef>,
    chain: bool,
}

fn parse_args() -> Result<RuntimeArgs, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut parsed = RuntimeArgs {
        event_file: None,
        objects: Vec::new(),
        chain: true,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--event" => {
                let path = iter.next().ok_or("--event requires a file path")?;
                parsed.event_file = Some(path.clone());
            }
            "--object" => {
                let target = iter.next().ok_or("--object requires <bucket>/<key>")?;
                let (bucket, key) = target
                    .split_once('/')
                    .ok_or_else(|| format!("--object expects <bucket>/<key>, got '{}'", target))?;
                parsed.objects.push(ObjectRef::new(bucket, key));
            }
            "--no-chain" => parsed.chain = false,
            other => return Err(format!("Unknown argument: {}", other).into()),
        }
    }

    Ok(parsed)
}

/// Forward one trigger event per non-empty line; unparseable lines are skipped.
async fn feed_events<R: AsyncBufRead + Unpin>(reader: R, tx: mpsc::Sender<TriggerEvent>) {
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("❌ Failed to read trigger events: {}", e);
                break;
            }
        };
        line_no += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<TriggerEvent>(line) {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    warn!("⚠️  Runtime stopped, dropping remaining events");
                    break;
                }
            }
            Err(e) => warn!("⚠️  Skipping malformed trigger event on line {}: {}", line_no, e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args = parse_args()?;
    let config = PipelineConfig::from_env()?;

    info!("🚀 Review Pipeline Runtime");
    info!("   ├─ Raw bucket: {}", config.raw_bucket);
    info!("   ├─ Cleaned bucket: {}", config.cleaned_bucket);
    info!("   ├─ Pre-sentiment bucket: {}", config.presentiment_bucket);
    info!("   ├─ Output bucket: {}", config.output_bucket);
    info!("   └─ Channel buffer: {}", config.channel_buffer);

    let (tx, rx) = mpsc::channel::<TriggerEvent>(config.channel_buffer);
    let pipeline = Arc::new(Pipeline::from_config(config)?);

    let feeder = if !args.objects.is_empty() {
        let objects = args.objects;
        tokio::spawn(async move {
            for object in objects {
                if tx.send(TriggerEvent::from_objects([object])).await.is_err() {
                    break;
                }
            }
        })
    } else if let Some(path) = args.event_file {
        let file = tokio::fs::File::open(&path).await?;
        info!("📂 Reading trigger events from {}", path);
        tokio::spawn(feed_events(BufReader::new(file), tx))
    } else {
        info!("📂 Reading trigger events from stdin");
        tokio::spawn(feed_events(BufReader::new(tokio::io::stdin()), tx))
    };

    let summary = run_chained(pipeline, rx, args.chain).await;
    if let Err(e) = feeder.await {
        error!("❌ Event reader task failed: {}", e);
    }

    if summary.failed > 0 {
        return Err(format!("{} of {} invocations failed", summary.failed, summary.invocations).into());
    }

    println!("{}", serde_json::to_string(&InvocationResponse::OK)?);
    Ok(())
}
