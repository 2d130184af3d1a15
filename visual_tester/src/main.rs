use anyhow::{Context, bail, ensure};
use clap::Parser;
use futures::stream::{self, StreamExt};
use motion_diff::core_modules::utils::image_helper;
use motion_diff::{AlgorithmKind, Frame, FrameShape, MotionConfig, MotionEngine, PixelFormat, Report};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

/// Replays recorded frames through the motion engine and writes one annotated
/// PNG per compared frame.
#[derive(Parser, Debug, Clone)]
#[command(name = "visual_tester", version)]
struct Args {
    /// A directory of still images (processed in name order) or a raw RGB24 file.
    input: PathBuf,
    /// Directory that receives the annotated frames.
    output: PathBuf,
    /// TOML engine configuration; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Frame width, required for raw input.
    #[arg(long)]
    width: Option<u32>,
    /// Frame height, required for raw input.
    #[arg(long)]
    height: Option<u32>,
    /// Capture rate used to timestamp frames.
    #[arg(long, default_value_t = 30.0)]
    fps: f64,
    #[arg(long)]
    algorithm: Option<AlgorithmKind>,
    #[arg(long)]
    divisor: Option<u32>,
    #[arg(long)]
    threshold: Option<u32>,
    #[arg(long)]
    cell_count_threshold: Option<u32>,
    #[arg(long)]
    mask: Option<PathBuf>,
    #[arg(long)]
    workers: Option<usize>,
    /// Frames decoded ahead of the engine.
    #[arg(long, default_value_t = 4)]
    read_ahead: usize,
    /// Used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// What happened over a whole run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Summary {
    frames: u64,
    compared: u64,
    refreshes: u64,
    detections: u64,
    written: u64,
}

enum FrameSource {
    Images(Vec<PathBuf>),
    Raw { path: PathBuf, shape: FrameShape },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.parse().unwrap_or_default()),
        )
        .init();

    let summary = run(args).await?;
    info!(
        frames = summary.frames,
        compared = summary.compared,
        refreshes = summary.refreshes,
        detections = summary.detections,
        written = summary.written,
        "processing complete"
    );
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<Summary> {
    let config = build_config(&args)?;
    let source = open_source(&args)?;
    tokio::fs::create_dir_all(&args.output)
        .await
        .with_context(|| format!("creating output directory {}", args.output.display()))?;

    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        algorithm = %config.algorithm,
        "starting visual tester"
    );

    let read_ahead = args.read_ahead.max(1);
    let (sender, receiver) = mpsc::channel::<Frame>(read_ahead);
    let output = args.output.clone();
    let fps = args.fps;
    let engine = tokio::task::spawn_blocking(move || run_engine(config, receiver, &output, fps));

    let read_result = match source {
        FrameSource::Images(paths) => read_images(paths, read_ahead, sender).await,
        FrameSource::Raw { path, shape } => read_raw(&path, shape, sender).await,
    };

    let summary = engine.await.context("engine task panicked")??;
    read_result?;
    Ok(summary)
}

fn build_config(args: &Args) -> anyhow::Result<MotionConfig> {
    ensure!(args.fps > 0.0, "--fps must be positive, got {}", args.fps);

    let mut config = match &args.config {
        Some(path) => MotionConfig::load(path)?,
        None => MotionConfig::default(),
    };
    if let Some(algorithm) = args.algorithm {
        config.algorithm = algorithm;
    }
    if let Some(divisor) = args.divisor {
        config.cell_divisor = divisor;
    }
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(cell_count_threshold) = args.cell_count_threshold {
        config.cell_count_threshold = cell_count_threshold;
    }
    if let Some(mask) = &args.mask {
        config.mask_path = Some(mask.clone());
    }
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    config.visualize = true;
    config.validate()?;
    Ok(config)
}

fn open_source(args: &Args) -> anyhow::Result<FrameSource> {
    if args.input.is_dir() {
        let paths = list_images(&args.input)?;
        ensure!(!paths.is_empty(), "no images found in {}", args.input.display());
        return Ok(FrameSource::Images(paths));
    }

    let (Some(width), Some(height)) = (args.width, args.height) else {
        bail!("--width and --height are required for raw input {}", args.input.display());
    };
    Ok(FrameSource::Raw {
        path: args.input.clone(),
        shape: FrameShape::packed(PixelFormat::Rgb24, width, height),
    })
}

fn list_images(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if path.is_file() && is_image {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Decodes images on blocking tasks, `read_ahead` at a time, in order.
async fn read_images(paths: Vec<PathBuf>, read_ahead: usize, sender: mpsc::Sender<Frame>) -> anyhow::Result<()> {
    let mut decoded = stream::iter(paths)
        .map(|path| {
            tokio::task::spawn_blocking(move || {
                let image = image::open(&path).with_context(|| format!("decoding {}", path.display()))?;
                Ok::<_, anyhow::Error>(image_helper::frame_from_image(&image))
            })
        })
        .buffered(read_ahead);

    while let Some(joined) = decoded.next().await {
        let frame = joined.context("decoder task panicked")??;
        if sender.send(frame).await.is_err() {
            // The engine stopped early; its error is reported by the caller.
            break;
        }
    }
    Ok(())
}

/// Splits a headerless RGB24 file into frames of `shape`.
async fn read_raw(path: &Path, shape: FrameShape, sender: mpsc::Sender<Frame>) -> anyhow::Result<()> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let frame_len = shape.required_len();

    loop {
        let mut data = vec![0u8; frame_len];
        let mut filled = 0;
        while filled < frame_len {
            let read = file.read(&mut data[filled..]).await?;
            if read == 0 {
                break;
            }
            filled += read;
        }

        if filled == 0 {
            return Ok(());
        }
        if filled < frame_len {
            warn!(bytes = filled, expected = frame_len, "ignoring truncated trailing frame");
            return Ok(());
        }
        if sender.send(Frame::new(shape, data)).await.is_err() {
            return Ok(());
        }
    }
}

fn run_engine(
    config: MotionConfig,
    mut frames: mpsc::Receiver<Frame>,
    output: &Path,
    fps: f64,
) -> anyhow::Result<Summary> {
    let mut engine = MotionEngine::new(config)?;
    let frame_interval = Duration::from_secs_f64(1.0 / fps);
    let start = Instant::now();
    let mut summary = Summary::default();

    while let Some(frame) = frames.blocking_recv() {
        let index = summary.frames;
        let now = start + frame_interval.mul_f64(index as f64);
        summary.frames += 1;

        match engine.apply_at(frame.view(), now)? {
            Report::BaselineCaptured => info!(frame = index, "baseline captured"),
            Report::BaselineRefreshed => {
                summary.refreshes += 1;
                info!(frame = index, "baseline refreshed");
            }
            Report::Analyzed(result) => {
                summary.compared += 1;
                if result.detected {
                    summary.detections += 1;
                    info!(
                        frame = index,
                        aggregate_diff = result.aggregate_diff,
                        changed_cells = result.changed_cells(),
                        "motion"
                    );
                }
                if let Some(view) = result.visualization {
                    let path = output.join(format!("frame_{index:06}.png"));
                    image_helper::save_rgb(&path, view)
                        .with_context(|| format!("writing {}", path.display()))?;
                    summary.written += 1;
                }
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["visual_tester"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_override_defaults_and_force_visualization() {
        let args = args(&["in", "out", "--algorithm", "hsv", "--divisor", "8", "--threshold", "90"]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.algorithm, AlgorithmKind::Hsv);
        assert_eq!(config.cell_divisor, 8);
        assert_eq!(config.threshold, 90);
        assert!(config.visualize);
    }

    #[test]
    fn bad_algorithm_name_is_a_usage_error() {
        assert!(Args::try_parse_from(["visual_tester", "in", "out", "--algorithm", "sobel"]).is_err());
    }

    #[test]
    fn non_positive_fps_is_rejected() {
        assert!(build_config(&args(&["in", "out", "--fps", "0"])).is_err());
    }

    #[test]
    fn raw_input_needs_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("clip.rgb");
        std::fs::write(&raw, [0u8; 12]).unwrap();
        let raw = raw.to_str().unwrap();
        assert!(open_source(&args(&[raw, "out"])).is_err());
        assert!(open_source(&args(&[raw, "out", "--width", "2", "--height", "2"])).is_ok());
    }

    #[test]
    fn images_are_listed_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.bmp", "c.txt", "d.PNG"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let names: Vec<String> = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.bmp", "b.png", "d.PNG"]);
    }

    #[tokio::test]
    async fn image_directory_run_writes_annotated_frames() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let black = RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]));
        let white = RgbImage::from_pixel(64, 64, Rgb([255, 255, 255]));
        black.save(input.path().join("000.png")).unwrap();
        black.save(input.path().join("001.png")).unwrap();
        white.save(input.path().join("002.png")).unwrap();

        let args = args(&[
            input.path().to_str().unwrap(),
            output.path().to_str().unwrap(),
            "--divisor",
            "8",
        ]);
        let summary = run(args).await.unwrap();

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.compared, 2);
        assert_eq!(summary.detections, 1);
        assert_eq!(summary.written, 2);
        assert!(output.path().join("frame_000002.png").exists());
        assert!(!output.path().join("frame_000000.png").exists());
    }

    #[tokio::test]
    async fn raw_stream_run_ignores_a_truncated_tail() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let frame_len = 32 * 32 * 3;
        let mut bytes = vec![0u8; frame_len * 2];
        bytes.extend(std::iter::repeat_n(255u8, frame_len));
        bytes.extend([1u8; 10]);
        let raw = input.path().join("clip.rgb");
        std::fs::write(&raw, &bytes).unwrap();

        let args = args(&[
            raw.to_str().unwrap(),
            output.path().to_str().unwrap(),
            "--width",
            "32",
            "--height",
            "32",
            "--divisor",
            "4",
            "--workers",
            "2",
        ]);
        let summary = run(args).await.unwrap();

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.detections, 1);
        assert_eq!(summary.written, 2);
    }
}
