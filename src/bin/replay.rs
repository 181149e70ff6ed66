use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use advanced_location::{EngineConfig, Fix, SampleOutcome, StatisticsEngine};
use clap::Parser;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::json;

#[derive(Parser, Debug)]
struct Args {
    /// Path to a recorded *.json[.gz] log
    #[arg(long, conflicts_with = "dir")]
    log: Option<PathBuf>,

    /// Directory of logs to batch replay (processes *.json[.gz])
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Engine configuration as JSON (missing fields take defaults)
    #[arg(long, conflicts_with = "legacy")]
    config: Option<PathBuf>,

    /// Use the legacy thresholds
    #[arg(long, default_value_t = false)]
    legacy: bool,

    /// Print a line per save-worthy sample while replaying
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Deserialize)]
struct ExternalSpeed {
    speed: f64,
}

#[derive(Deserialize)]
struct Reading {
    /// Seconds
    timestamp: f64,
    fix: Option<Fix>,
    secondary_altitude: Option<f64>,
    external_speed: Option<ExternalSpeed>,
}

#[derive(Deserialize)]
struct LogFile {
    readings: Vec<Reading>,
}

fn load_log(path: &Path) -> anyhow::Result<LogFile> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        let reader = BufReader::new(gz);
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn load_config(args: &Args) -> anyhow::Result<EngineConfig> {
    if let Some(path) = args.config.as_ref() {
        let text = fs::read_to_string(path)?;
        return Ok(EngineConfig::from_json_str(&text)?);
    }
    if args.legacy {
        return Ok(EngineConfig::legacy());
    }
    Ok(EngineConfig::default())
}

fn is_log_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".json") || name.ends_with(".json.gz")
}

fn run_once(path: &Path, config: &EngineConfig, args: &Args) -> anyhow::Result<serde_json::Value> {
    let log = load_log(path)?;
    let mut engine = StatisticsEngine::new(config.clone())?;
    engine.set_save_enabled(true);

    let mut outcomes: BTreeMap<String, u64> = BTreeMap::new();
    let mut save_points = 0_u64;

    for r in log.readings {
        if let Some(altitude) = r.secondary_altitude {
            engine.record_secondary_altitude(altitude);
        }
        if let Some(external) = r.external_speed {
            engine.record_external_speed(external.speed, (r.timestamp * 1000.0) as i64);
        }
        let Some(fix) = r.fix else {
            continue;
        };

        let outcome = engine.process(fix);
        *outcomes.entry(format!("{:?}", outcome)).or_default() += 1;

        if let Some(point) = engine.take_save_point() {
            save_points += 1;
            if args.verbose && outcome == SampleOutcome::AcceptedSaveWorthy {
                println!(
                    "[SAVE] t={} alt={:.1} ascent={:.0} acc={:.1}",
                    point.time_ms, point.altitude, point.ascent, point.accuracy
                );
            }
        }
    }

    let snapshot = engine.snapshot();
    log::info!(
        "{}: {:.0} m, {:.0} m ascent, {} major climbs",
        path.display(),
        snapshot.distance,
        snapshot.ascent,
        snapshot.major_ascent_count
    );

    Ok(json!({
        "log": path.display().to_string(),
        "outcomes": outcomes,
        "save_points": save_points,
        "average_speed_kmh": snapshot.average_speed_kmh(),
        "slope_percent": snapshot.slope_percent(),
        "snapshot": snapshot,
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let mut results = Vec::new();

    if let Some(dir) = args.dir.as_ref() {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_log_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        for path in paths {
            match run_once(&path, &config, &args) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &config, &args)?);
    } else {
        anyhow::bail!("Provide --log or --dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
