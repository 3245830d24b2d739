// Host runner for the `chroma_vision` library.
//
// Plays the part of the camera application: it loads a still image as the sensor
// frame, feeds it to the pipeline on a fixed tick, forwards Enter on stdin as the
// reset button, and writes the final visualization (with the annotations drawn
// onto it) as a PNG.
//
// usage: chroma_vision <image> [--frames N] [--threshold T] [--interval-ms MS]
//                      [--config file.json] [--output out.png] [--mask mask.png]

use anyhow::{Context, bail};
use chroma_vision::core_modules::color_classifier::to_intensity;
use chroma_vision::core_modules::drawing::{Canvas, DrawCommandLog};
use chroma_vision::core_modules::frame_buffer::Image;
use chroma_vision::core_modules::threshold::{ResetHandle, binarize, otsu_threshold};
use chroma_vision::core_modules::utils::image_helper::image_helper;
use chroma_vision::{FrameContext, FrameOutcome, PipelineConfig, VisionPipeline};
use log::{error, info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

struct Args {
    image: PathBuf,
    frames: u64,
    threshold: u16,
    interval: Duration,
    config: Option<PathBuf>,
    output: PathBuf,
    mask: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut image = None;
    let mut parsed = Args {
        image: PathBuf::new(),
        frames: 3,
        threshold: 60,
        interval: Duration::from_millis(100),
        config: None,
        output: PathBuf::from("visualization.png"),
        mask: None,
    };

    while let Some(arg) = args.next() {
        let mut value = || args.next().with_context(|| format!("{} needs a value", arg));
        match arg.as_str() {
            "--frames" => parsed.frames = value()?.parse().context("--frames")?,
            "--threshold" => parsed.threshold = value()?.parse().context("--threshold")?,
            "--interval-ms" => parsed.interval = Duration::from_millis(value()?.parse().context("--interval-ms")?),
            "--config" => parsed.config = Some(PathBuf::from(value()?)),
            "--output" => parsed.output = PathBuf::from(value()?),
            "--mask" => parsed.mask = Some(PathBuf::from(value()?)),
            other if other.starts_with("--") => bail!("unknown option {}", other),
            other => image = Some(PathBuf::from(other)),
        }
    }

    parsed.image = image.context("usage: chroma_vision <image> [--frames N] [--threshold T] [--config file.json] [--output out.png]")?;
    Ok(parsed)
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Otsu segmentation of the raw frame, saved as a grayscale mask.
fn save_otsu_mask(sensor: &Image, border: u32, path: &PathBuf) -> anyhow::Result<()> {
    let mut intensity = Image::new(sensor.width(), sensor.height(), 1)?;
    to_intensity(sensor, &mut intensity)?;
    let k = otsu_threshold(&intensity)?;
    let mut mask = Image::new(sensor.width(), sensor.height(), 1)?;
    binarize(&intensity, k, border, &mut mask)?;
    image_helper::save(path, &mask)?;
    info!("otsu mask (k = {}) written to {}", k, path.display());
    Ok(())
}

/// Forwards every press counted since `seen` as its own reset request, so each
/// press flips the mode once at the next frame boundary. Returns the new count.
fn forward_presses(seen: u64, presses: u64, reset: &ResetHandle) -> u64 {
    for _ in seen..presses {
        reset.request();
    }
    presses.max(seen)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = parse_args()?;

    let rgb = image::open(&args.image)
        .with_context(|| format!("opening {}", args.image.display()))?
        .to_rgb8();
    let mut config = load_config(args.config.as_ref())?;
    config.image_width = rgb.width();
    config.image_height = rgb.height();
    info!("pipeline config: {:?}", config);

    let mut pipeline = VisionPipeline::new(config)?;

    // Enter on stdin is the reset button. A plain thread, so a pending read never
    // holds up runtime shutdown. The watch value counts presses.
    let (reset_tx, mut reset_rx) = tokio::sync::watch::channel(0u64);
    let reset = pipeline.reset_handle();
    let mut presses_seen = 0u64;
    std::thread::spawn(move || {
        for _ in std::io::stdin().lock().lines().map_while(Result::ok) {
            reset_tx.send_modify(|presses| *presses += 1);
        }
    });

    let mut ticker = tokio::time::interval(args.interval);
    let mut annotations = DrawCommandLog::new();
    for frame_counter in 1..=args.frames {
        ticker.tick().await;
        pipeline.load_rgb_frame(&rgb)?;

        presses_seen = forward_presses(presses_seen, *reset_rx.borrow_and_update(), &reset);
        let ctx = FrameContext {
            frame_counter,
            manual_threshold: args.threshold,
            reset_requested: false,
        };

        let mut log = DrawCommandLog::new();
        match pipeline.process_frame(&ctx, &mut log) {
            Ok(FrameOutcome::Initialized) => info!("frame {}: run started", frame_counter),
            Ok(FrameOutcome::Processed(report)) => {
                info!(
                    "frame {}: {:?} threshold {}, {} regions, {} annotated",
                    frame_counter,
                    report.mode,
                    report.threshold,
                    report.regions_extracted,
                    report.annotated.len()
                );
                for region in &report.annotated {
                    info!(
                        "  region {}: {:?} area {} at ({}, {})",
                        region.id, region.category, region.area, region.centroid.x, region.centroid.y
                    );
                }
                if report.malformed > 0 {
                    warn!("frame {}: {} malformed regions skipped", frame_counter, report.malformed);
                }
                annotations = log;
            }
            Err(e) if e.is_frame_fatal() => error!("frame {} aborted: {}", frame_counter, e),
            Err(e) => warn!("frame {} dropped by bad region data: {}", frame_counter, e),
        }
    }

    let mut rendered = pipeline.visualization().clone();
    let mut canvas = Canvas::new(&mut rendered);
    annotations.replay(&mut canvas);
    for label in &canvas.labels {
        info!("label at ({}, {}): {:?}", label.at.x, label.at.y, label.text);
    }
    image_helper::save(&args.output, &rendered)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!("visualization written to {}", args.output.display());

    if let Some(path) = &args.mask {
        save_otsu_mask(pipeline.sensor(), pipeline.config().border, path)?;
    }
    Ok(())
}
