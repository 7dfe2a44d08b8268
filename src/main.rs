use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use framepace::core::consumer::PacingMode;
use framepace::core::session::{load_config, Session, SessionReport};
use framepace::shared::constants::MICROS_PER_SECOND;
use framepace::sink::read_dump;
use framepace::utils::logger;
use framepace::utils::platform::PlatformInfo;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a source and deliver its frames to an output at presentation time
    Run {
        /// JSON session config; flags below override its values
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// synthetic:WxH@FPS[/FRAMES], camera:INDEX, a file path or a URL
        #[arg(short, long)]
        source: Option<String>,
        /// null, a .fpd frame dump, or a container path
        #[arg(short, long)]
        output: Option<String>,
        #[arg(long)]
        capacity: Option<usize>,
        #[arg(long, help = "Keep one of every N decoded frames")]
        frame_interval: Option<u32>,
        #[arg(long, help = "Stop once a frame timestamp reaches this many seconds")]
        time_limit: Option<f64>,
        #[arg(long, default_value_t = false, help = "Release frames as soon as they are queued")]
        unpaced: bool,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Detect platform info
    Detect,
    /// Summarize a frame dump written by `run`
    Inspect { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            source,
            output,
            capacity,
            frame_interval,
            time_limit,
            unpaced,
            width,
            height,
            log_dir,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(source) = source {
                config.source = source;
            }
            if let Some(output) = output {
                config.output = output;
            }
            if let Some(capacity) = capacity {
                config.capacity = capacity;
            }
            if let Some(interval) = frame_interval {
                config.frame_interval = interval;
            }
            if let Some(secs) = time_limit {
                config.time_limit_us = Some((secs * MICROS_PER_SECOND as f64) as i64);
            }
            if unpaced {
                config.pacing = PacingMode::Unpaced;
            }
            if width.is_some() || height.is_some() {
                config.output_width = width;
                config.output_height = height;
            }
            if log_dir.is_some() {
                config.log_dir = log_dir;
            }

            logger::init(config.log_dir.as_deref());
            let mut session = Session::new(config)?;
            let cancel = session.cancel_flag();
            ctrlc::set_handler(move || {
                cancel.store(true, Ordering::SeqCst);
            })?;

            let report = session.run()?;
            print_report(&report);
        }
        Commands::Detect => {
            let info = PlatformInfo::detect();
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Inspect { file } => inspect(&file)?,
    }

    Ok(())
}

fn print_report(report: &SessionReport) {
    let (width, height) = report.output_size;
    println!(
        "source {}x{} @ {:.2}fps -> output {}x{} @ {:.2}fps",
        report.stream.width, report.stream.height, report.stream.fps, width, height, report.output_fps
    );
    if let Some(producer) = report.producer {
        println!(
            "produced: decoded {} enqueued {} skipped {} retries {} ({:?})",
            producer.decoded, producer.enqueued, producer.skipped, producer.read_retries, producer.end
        );
    }
    let consumer = &report.consumer;
    println!(
        "delivered {} frames, {} write failures, {} bumped timestamps, {} evicted ({:?})",
        consumer.delivered, consumer.write_failures, consumer.bumped, report.evicted, consumer.exit
    );
}

fn inspect(path: &Path) -> Result<()> {
    let dump = read_dump(path)?;
    let bytes: usize = dump.frames.iter().map(|f| f.byte_size()).sum();
    println!("{}: {}x{}, {} frames, {} bytes", path.display(), dump.width, dump.height, dump.frames.len(), bytes);
    if let (Some(first), Some(last)) = (dump.frames.first(), dump.frames.last()) {
        println!(
            "timestamps {}us .. {}us ({:.3}s)",
            first.timestamp(),
            last.timestamp(),
            dump.duration_us() as f64 / MICROS_PER_SECOND as f64
        );
    }
    Ok(())
}
