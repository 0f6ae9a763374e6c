use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use liiklus::detection::decode_detections;
use liiklus::{Config, CountingEngine, FrameReport};

#[derive(Parser)]
#[command(
    name = "liiklus",
    about = "Track detections across frames and count objects crossing lines",
    version = "0.1.0"
)]
struct Args {
    /// JSON-lines detection log, one frame per line
    #[arg(short, long)]
    detections: PathBuf,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write one JSON frame report per line here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Minimum IoU for a match
    #[arg(long)]
    min_iou: Option<f32>,

    /// Hits needed to confirm a track
    #[arg(long)]
    min_hits: Option<u32>,

    /// Missed frames before a track is evicted
    #[arg(long)]
    max_age: Option<u32>,

    /// Hard cap on live tracks
    #[arg(long)]
    max_tracks: Option<usize>,

    /// Ignore detections below this confidence
    #[arg(long)]
    min_confidence: Option<f32>,

    /// Only count person, vehicle and animal classes
    #[arg(long)]
    traffic_classes: bool,

    /// Default log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// One line of the detection log. `detections: null` marks a frame whose
/// detections could not be acquired. Entries are decoded one by one so a bad
/// detection only costs itself.
#[derive(Deserialize, Debug)]
struct FrameInput {
    #[serde(default)]
    frame_id: Option<u64>,
    detections: Option<Vec<serde_json::Value>>,
}

struct ProcessingState {
    engine: CountingEngine,
    writer: Option<BufWriter<File>>,
    skipped: u64,
}

impl ProcessingState {
    fn process_frame(&mut self, input: FrameInput) -> anyhow::Result<()> {
        let report = match input.detections {
            Some(entries) => {
                let (dets, undecodable) = decode_detections(entries);
                let mut report = match input.frame_id {
                    Some(frame_id) => self.engine.process_sequenced(frame_id, &dets)?,
                    None => self.engine.process_frame(&dets),
                };
                report.rejected += undecodable;
                report
            }
            None => {
                self.skipped += 1;
                self.engine.skip_frame()
            }
        };

        for event in &report.events {
            println!(
                "frame {}: track {} ({}) crossed `{}` {:?}",
                report.frame_index, event.track_id, event.class_label, event.line, event.direction
            );
        }

        self.log_report(&report)
    }

    fn log_report(&mut self, report: &FrameReport) -> anyhow::Result<()> {
        if let Some(writer) = &mut self.writer {
            serde_json::to_writer(&mut *writer, report)?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {:?}", path))?,
        None => Config::default(),
    };

    // Override config with command line arguments if provided
    if let Some(v) = args.min_iou {
        config.min_iou = v;
    }
    if let Some(v) = args.min_hits {
        config.min_hits = v;
    }
    if let Some(v) = args.max_age {
        config.max_age = v;
    }
    if args.max_tracks.is_some() {
        config.max_tracks = args.max_tracks;
    }
    if let Some(v) = args.min_confidence {
        config.min_confidence = v;
    }
    if args.traffic_classes {
        config = config.with_traffic_classes();
    }

    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(&args)?;
    let engine: CountingEngine = CountingEngine::new(&config)?;
    for line in engine.lines() {
        info!(
            name = %line.name,
            start = ?(line.start.x, line.start.y),
            end = ?(line.end.x, line.end.y),
            margin = line.margin,
            "count line"
        );
    }

    let writer = match &args.output {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("creating {:?}", path))?,
        )),
        None => None,
    };
    let mut state = ProcessingState {
        engine,
        writer,
        skipped: 0,
    };

    let reader = BufReader::new(
        File::open(&args.detections).with_context(|| format!("opening {:?}", args.detections))?,
    );
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let input: FrameInput = match serde_json::from_str(&line) {
            Ok(input) => input,
            Err(err) => {
                // An unreadable frame is a skipped frame, not a fatal error
                warn!(line = lineno + 1, "unreadable frame: {err}");
                FrameInput {
                    frame_id: None,
                    detections: None,
                }
            }
        };
        state.process_frame(input)?;
    }

    if let Some(writer) = &mut state.writer {
        writer.flush()?;
    }

    let counter = state.engine.counter();
    println!(
        "Processed {} frames ({} skipped)",
        state.engine.frames(),
        state.skipped
    );
    for line in counter.reports() {
        println!(
            "  {}: {} (positive {}, negative {})",
            line.name, line.total, line.positive, line.negative
        );
    }
    println!("Distinct objects counted: {}", counter.distinct_total());

    Ok(())
}
