use std::{
    collections::{btree_map::Entry, BTreeMap},
    env, fs,
    path::PathBuf,
};

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tag_tracker::{
    TagCorners2d, TagHypothesis, TagHypothesisSnapshot, TagTrackerConfig, Timestamp,
};

#[cfg(not(feature = "tracing"))]
use std::str::FromStr;

#[cfg(not(feature = "tracing"))]
use log::{info, warn, LevelFilter};

#[cfg(feature = "tracing")]
use tracing::{info, warn};

#[cfg(feature = "tracing")]
use tag_tracker_core::init_tracing;
#[cfg(not(feature = "tracing"))]
use tag_tracker_core::init_with_level;

#[derive(Debug, Deserialize)]
struct Detection {
    stamp: Timestamp,
    id: i32,
    corners: TagCorners2d,
}

#[derive(Debug, Deserialize)]
struct ExampleConfig {
    tracker: TagTrackerConfig,
    detections: Vec<Detection>,
    #[serde(default)]
    output_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct TagReport {
    snapshot: TagHypothesisSnapshot,
    restarts: usize,
    center_3d: Option<Point3<f64>>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExampleReport {
    config_path: String,
    num_detections: usize,
    expired: Vec<i32>,
    tags: BTreeMap<i32, TagReport>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(not(feature = "tracing"))]
    let log_level = LevelFilter::from_str("info").unwrap_or(LevelFilter::Info);
    #[cfg(not(feature = "tracing"))]
    init_with_level(log_level)?;
    #[cfg(not(feature = "tracing"))]
    info!("Logger initialized");

    #[cfg(feature = "tracing")]
    init_tracing(false);

    run()
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "info"))]
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = parse_config_path();
    let cfg = load_config(&config_path)?;
    let camera = cfg.tracker.camera;

    let mut tags: BTreeMap<i32, (TagHypothesis<'_>, usize)> = BTreeMap::new();
    let mut expired = Vec::new();

    for det in &cfg.detections {
        let (tag, restarts) = match tags.entry(det.id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let params = cfg.tracker.hypothesis.clone();
                let tag = TagHypothesis::with_params(det.id, &camera, params)?;
                e.insert((tag, 0))
            }
        };
        if !tag.update(&det.corners, det.stamp)? {
            *restarts += 1;
            warn!("tag {}: discontinuity at t={:.3}s", det.id, det.stamp.as_secs());
        }

        tags.retain(|id, (tag, _)| {
            let alive = tag.is_alive(det.stamp);
            if !alive {
                info!("tag {id}: no observation for too long, dropping");
                expired.push(*id);
            }
            alive
        });
    }

    let tags = tags
        .into_iter()
        .map(|(id, (tag, restarts))| {
            let (center_3d, error) = if tag.converged() {
                match tag.filtered_center_3d() {
                    Ok(c) => (Some(c), None),
                    Err(e) => (None, Some(e.to_string())),
                }
            } else {
                (None, Some("not converged".to_string()))
            };
            info!(
                "tag {id}: status={:?} restarts={restarts}",
                tag.convergence_report().status
            );
            let report = TagReport {
                snapshot: tag.snapshot(),
                restarts,
                center_3d,
                error,
            };
            (id, report)
        })
        .collect();

    let report = ExampleReport {
        config_path: config_path.to_string_lossy().into_owned(),
        num_detections: cfg.detections.len(),
        expired,
        tags,
    };

    write_report(cfg.output_path.as_deref(), report)
}

fn parse_config_path() -> PathBuf {
    env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("testdata/track_sequence_config.json"))
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "info", skip(path)))]
fn load_config(path: &PathBuf) -> Result<ExampleConfig, Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(path)?;
    let cfg: ExampleConfig = serde_json::from_str(&raw)?;
    cfg.tracker.hypothesis.validate()?;
    Ok(cfg)
}

fn write_report(
    path: Option<&str>,
    report: ExampleReport,
) -> Result<(), Box<dyn std::error::Error>> {
    let out_path = path
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tmpdata/track_sequence_report.json"));
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&report)?;
    fs::write(&out_path, json)?;
    println!("wrote report JSON to {}", out_path.display());
    Ok(())
}
