use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::Parser;

use overlaycam_core::capture::domain::frame_reader::FrameReader;
use overlaycam_core::capture::domain::media_backend::MediaBackend;
use overlaycam_core::capture::infrastructure::ffmpeg_backend::FfmpegBackend;
use overlaycam_core::capture::infrastructure::synthetic_backend::{
    SyntheticBackend, SyntheticSource, SYNTHETIC_BACKEND_NAME,
};
use overlaycam_core::overlay::domain::filter_chain::parse_filter_chain;
use overlaycam_core::pipeline::capture_reader::CaptureReader;
use overlaycam_core::pipeline::infrastructure::threaded_frame_pump::{
    FramePump, PumpError, DEFAULT_PUMP_CAPACITY,
};
use overlaycam_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use overlaycam_core::shared::frame_buffer::FrameBuffer;
use overlaycam_core::shared::reader_config::ReaderConfig;
use overlaycam_core::shared::reader_error::ReaderError;

/// Pull overlaid frames from a live capture device.
#[derive(Parser)]
#[command(name = "overlaycam")]
struct Cli {
    /// JSON config file (defaults to the per-user config when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Capture backend, e.g. avfoundation, v4l2, dshow.
    #[arg(long)]
    backend: Option<String>,

    /// Device URL handed to the backend.
    #[arg(long)]
    device: Option<String>,

    /// Requested capture frame rate.
    #[arg(long)]
    framerate: Option<String>,

    /// Requested capture size as WxH.
    #[arg(long)]
    video_size: Option<String>,

    /// Requested device pixel format.
    #[arg(long)]
    pixel_format: Option<String>,

    /// Caption template with {key} placeholders.
    #[arg(long)]
    overlay_text: Option<String>,

    /// Placeholder value as key=value (repeatable).
    #[arg(long = "value", value_parser = parse_key_value)]
    values: Vec<(String, String)>,

    /// Raw filter-chain description, replacing the configured overlay.
    #[arg(long)]
    filter: Option<String>,

    /// Number of frames to read.
    #[arg(long, default_value = "25")]
    frames: usize,

    /// Read on a worker thread and give up when a frame takes longer than this.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Save the last frame read as a PNG.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Use the built-in synthetic camera instead of a real device.
    #[arg(long)]
    synthetic: bool,

    /// Print the parsed filter chain and exit.
    #[arg(long)]
    check_filter: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    if cli.check_filter {
        return check_filter(&config);
    }
    if cli.frames == 0 {
        return Err("--frames must be at least 1".into());
    }

    if cli.synthetic {
        let mut config = config;
        config.device.backend = SYNTHETIC_BACKEND_NAME.to_string();
        let source = SyntheticSource::from_device(&config.device)?;
        capture(SyntheticBackend::new(source), config, &cli)
    } else {
        capture(FfmpegBackend::new(), config, &cli)
    }
}

fn build_config(cli: &Cli) -> Result<ReaderConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ReaderConfig::load(path)?,
        None => ReaderConfig::load_or_default()?,
    };

    let device = &mut config.device;
    let overrides = [
        (&mut device.backend, &cli.backend),
        (&mut device.device, &cli.device),
        (&mut device.frame_rate, &cli.framerate),
        (&mut device.video_size, &cli.video_size),
        (&mut device.pixel_format, &cli.pixel_format),
        (&mut config.overlay.text.template, &cli.overlay_text),
    ];
    for (field, value) in overrides {
        if let Some(value) = value {
            field.clone_from(value);
        }
    }
    for (key, value) in &cli.values {
        config.overlay.text.values.insert(key.clone(), value.clone());
    }
    if cli.filter.is_some() {
        config.filter_description.clone_from(&cli.filter);
    }
    Ok(config)
}

fn check_filter(config: &ReaderConfig) -> Result<(), Box<dyn std::error::Error>> {
    let description = config.filter_description()?;
    println!("{description}");
    for (i, stage) in parse_filter_chain(&description)?.iter().enumerate() {
        println!("  [{i}] {}", stage.name);
        for option in &stage.options {
            match &option.key {
                Some(key) => println!("        {key} = {}", option.value),
                None => println!("        {}", option.value),
            }
        }
    }
    Ok(())
}

fn capture<B>(backend: B, config: ReaderConfig, cli: &Cli) -> Result<(), Box<dyn std::error::Error>>
where
    B: MediaBackend + Send + 'static,
{
    let logger = Box::new(StdoutPipelineLogger::default());
    let last = match cli.timeout_ms {
        Some(ms) => {
            let pump = FramePump::spawn(
                move || CaptureReader::new(backend, config).with_logger(logger),
                DEFAULT_PUMP_CAPACITY,
            )?;
            read_pumped(&pump, cli.frames, Duration::from_millis(ms))?
        }
        None => {
            let mut reader = CaptureReader::new(backend, config).with_logger(logger);
            let result = read_direct(&mut reader, cli.frames);
            reader.close();
            result?
        }
    };

    if let (Some(path), Some(frame)) = (&cli.snapshot, last) {
        save_snapshot(&frame, path)?;
    }
    Ok(())
}

fn read_direct<R: FrameReader>(
    reader: &mut R,
    frames: usize,
) -> Result<Option<FrameBuffer>, ReaderError> {
    let metadata = reader.open()?;
    let mut buffer = FrameBuffer::for_stream(&metadata);
    let mut read = 0;
    for _ in 0..frames {
        match reader.read_into(&mut buffer) {
            Ok(_) => read += 1,
            Err(ReaderError::EndOfStream) => break,
            Err(e) => return Err(e),
        }
    }
    log::info!("Read {read} of {frames} frames");
    Ok((read > 0).then_some(buffer))
}

fn read_pumped(
    pump: &FramePump,
    frames: usize,
    timeout: Duration,
) -> Result<Option<FrameBuffer>, PumpError> {
    let mut last = None;
    let mut read = 0;
    for _ in 0..frames {
        match pump.recv_timeout(timeout) {
            Ok(frame) => {
                read += 1;
                last = Some(frame);
            }
            Err(PumpError::Reader(ReaderError::EndOfStream)) => break,
            Err(e) => return Err(e),
        }
    }
    log::info!("Read {read} of {frames} frames");
    Ok(last)
}

fn save_snapshot(frame: &FrameBuffer, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    frame.to_rgb_image().save(path)?;
    log::info!(
        "Snapshot written to {} (pts {})",
        path.display(),
        frame.timestamp().unwrap_or_default()
    );
    Ok(())
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}
