//! Survey commands - replay a recorded sensor log into an exported survey.
//!
//! The log is JSON Lines, one event per line:
//!
//! ```text
//! {"type":"fix","lat":34.70,"lon":135.50,"accuracy_m":3.0,"timestamp":"2026-06-12T05:30:00Z"}
//! {"type":"nmea","sentence":"$GPGGA,...*47","received_at":"2026-06-12T05:30:00Z"}
//! {"type":"ubx","hex":"b5620107...","received_at":"2026-06-12T05:30:00Z"}
//! {"type":"reading","x":40.1,"y":12.0,"z":-20.3}
//! {"type":"capture","at":"2026-06-12T05:30:01Z","mode":"manual"}
//! ```

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Deserialize;
use tracing::info;

use magsurvey::export::GeoJsonExporter;
use magsurvey::measurement::{PositionFix, RawField, SampleMode};
use magsurvey::mission::{
    Mission, MissionRegistry, DEFAULT_DANGER_THRESHOLD_UT, DEFAULT_REFERENCE_UT,
    DEFAULT_SAFE_THRESHOLD_UT,
};
use magsurvey::survey::MeasurementPipeline;
use magsurvey::zones::{RestrictedZoneIndex, ZoneCategory};

use super::common::LayerArgs;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Survey subcommands.
#[derive(Debug, Subcommand)]
pub enum SurveyCommands {
    /// Replay a JSON Lines sensor log and export the result as GeoJSON
    Replay(ReplayArgs),
}

/// Arguments for `survey replay`.
#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Sensor log (JSON Lines)
    pub input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Mission (location) name
    #[arg(long, default_value = "Replay")]
    pub name: String,

    /// Operator name
    #[arg(long, default_value = "magsurvey")]
    pub operator: String,

    /// Reference field in μT
    #[arg(long, default_value_t = DEFAULT_REFERENCE_UT)]
    pub reference: f64,

    /// Safe threshold in μT
    #[arg(long, default_value_t = DEFAULT_SAFE_THRESHOLD_UT)]
    pub safe: f64,

    /// Danger threshold in μT
    #[arg(long, default_value_t = DEFAULT_DANGER_THRESHOLD_UT)]
    pub danger: f64,

    /// Measurement interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// GeoJSON zone layers used to flag points (repeatable)
    #[arg(long = "layer", value_name = "FILE")]
    pub layers: Vec<PathBuf>,

    /// Category for zone features without a `category` property
    #[arg(long, default_value = "no_fly")]
    pub category: ZoneCategory,

    /// Pretty-print the GeoJSON output
    #[arg(long)]
    pub pretty: bool,
}

/// One line of a sensor log.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LogEvent {
    Reading {
        x: f64,
        y: f64,
        z: f64,
    },
    Fix {
        lat: f64,
        lon: f64,
        accuracy_m: f64,
        timestamp: DateTime<Utc>,
    },
    Nmea {
        sentence: String,
        received_at: DateTime<Utc>,
    },
    /// Raw UBX stream bytes, hex encoded.
    Ubx {
        hex: String,
        received_at: DateTime<Utc>,
    },
    Capture {
        at: DateTime<Utc>,
        #[serde(default = "default_mode")]
        mode: SampleMode,
    },
}

fn default_mode() -> SampleMode {
    SampleMode::Manual
}

/// Outcome of a replay.
#[derive(Debug, Default, PartialEq, Eq)]
struct ReplayStats {
    captured: usize,
    rejected: usize,
    bad_fixes: usize,
    ubx_fixes: usize,
}

/// Run a survey subcommand.
pub fn run(command: SurveyCommands, runner: &CliRunner) -> Result<(), CliError> {
    match command {
        SurveyCommands::Replay(args) => run_replay(args, runner),
    }
}

fn run_replay(args: ReplayArgs, runner: &CliRunner) -> Result<(), CliError> {
    let interval = Duration::from_millis(args.interval_ms);
    let mission = Mission::builder(&args.name, &args.operator)
        .reference_ut(args.reference)
        .thresholds(args.safe, args.danger)
        .measurement_interval(interval)
        .build()?;

    let zones = if args.layers.is_empty() {
        RestrictedZoneIndex::empty()
    } else {
        LayerArgs {
            layers: args.layers.clone(),
            category: args.category,
        }
        .load(runner.config())?
    };

    let registry = MissionRegistry::new();
    let store = registry.create(mission.clone())?;
    let pipeline = MeasurementPipeline::new(
        mission.clone(),
        Arc::clone(&store),
        Arc::new(zones),
        runner.config().fusion_config(interval),
    );

    let input = File::open(&args.input).map_err(|e| CliError::io(&args.input, e))?;
    let stats = replay(&pipeline, BufReader::new(input))?;
    info!(
        captured = stats.captured,
        rejected = stats.rejected,
        bad_fixes = stats.bad_fixes,
        ubx_fixes = stats.ubx_fixes,
        "Replay finished"
    );

    let snapshot = store.snapshot();
    let exporter = GeoJsonExporter::new().pretty(args.pretty);
    match &args.output {
        Some(path) => {
            let file = File::create(path).map_err(|e| CliError::io(path, e))?;
            exporter.export(&mission, &snapshot, BufWriter::new(file))?;
        }
        None => {
            let stdout = io::stdout();
            exporter.export(&mission, &snapshot, stdout.lock())?;
            println!();
        }
    }

    let summary = snapshot.statistics();
    eprintln!(
        "{} points ({} safe, {} caution, {} danger, {} in restricted zones); {} samples rejected",
        summary.count,
        summary.safe,
        summary.caution,
        summary.danger,
        summary.in_restricted_zone,
        stats.rejected
    );
    if let Some(path) = &args.output {
        eprintln!("Wrote {}", path.display());
    }
    Ok(())
}

/// Feeds every event of a log into the pipeline.
///
/// Blank lines are skipped. A line that is not a valid event aborts the
/// replay; rejected samples and unusable NMEA sentences are only counted.
fn replay<R: BufRead>(pipeline: &MeasurementPipeline, reader: R) -> Result<ReplayStats, CliError> {
    let mut stats = ReplayStats::default();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| CliError::Replay {
            line: line_no,
            message: e.to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let event: LogEvent = serde_json::from_str(&line).map_err(|e| CliError::Replay {
            line: line_no,
            message: e.to_string(),
        })?;

        match event {
            LogEvent::Reading { x, y, z } => pipeline.on_reading(RawField::new(x, y, z)),
            LogEvent::Fix {
                lat,
                lon,
                accuracy_m,
                timestamp,
            } => pipeline.on_position_fix(PositionFix::new(lat, lon, accuracy_m, timestamp)),
            LogEvent::Nmea {
                sentence,
                received_at,
            } => {
                if pipeline.on_nmea(&sentence, received_at).is_err() {
                    stats.bad_fixes += 1;
                }
            }
            LogEvent::Ubx { hex, received_at } => {
                let bytes = hex::decode(hex.trim()).map_err(|e| CliError::Replay {
                    line: line_no,
                    message: format!("invalid UBX hex: {}", e),
                })?;
                stats.ubx_fixes += pipeline.on_ubx(&bytes, received_at);
            }
            LogEvent::Capture { at, mode } => match pipeline.capture(at, mode) {
                Ok(_) => stats.captured += 1,
                Err(_) => stats.rejected += 1,
            },
        }
    }

    Ok(stats)
}
