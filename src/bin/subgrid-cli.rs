use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use image::Rgb;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use serde_json::json;
use subgrid::{
    OperationType, OutputCodec, ProgressCallback, ProgressInfo, Roi, RoiPolicy, SignalOptions,
    SignalVerifier, SubtitleEmbedder, Timeline, TransmissionMode, TransmissionPlan,
};

const CLI_AFTER_HELP: &str = "Examples:\n  subgrid encode --video talk.mp4 --srt talk.srt --output talk_signal.mkv --codec ffv1\n  subgrid decode talk_signal.mkv --every 1 --json\n  subgrid plan --srt talk.srt --fps 29.97\n  subgrid completions zsh > _subgrid";

#[derive(Debug, Parser)]
#[command(
    name = "subgrid",
    version,
    about = "Embed subtitle text into video frames as a luminance grid, and read it back",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,
}

/// Signal layout flags. Encode and decode must be given the same values.
#[derive(Debug, Args, Clone)]
struct SignalArgs {
    /// Grid rows.
    #[arg(long, default_value_t = subgrid::configuration::DEFAULT_ROWS)]
    rows: u32,

    /// Grid columns.
    #[arg(long, default_value_t = subgrid::configuration::DEFAULT_COLS)]
    cols: u32,

    /// Consecutive frames each packet is repeated for.
    #[arg(long, default_value_t = subgrid::configuration::DEFAULT_REPETITION)]
    repetition: usize,

    /// Mark colour as R,G,B.
    #[arg(long, default_value = "255,255,255")]
    color: String,

    /// Mark opacity in (0, 1].
    #[arg(long, default_value_t = subgrid::configuration::DEFAULT_OPACITY)]
    opacity: f32,

    /// Decode luminance threshold (0-255).
    #[arg(long, default_value_t = subgrid::configuration::DEFAULT_THRESHOLD)]
    threshold: u8,

    /// Mark radius as a fraction of the smaller cell side.
    #[arg(long, default_value_t = subgrid::configuration::DEFAULT_RADIUS_FRACTION)]
    radius: f32,

    /// Grid placement: full, X,Y,W,H, or center:FW,FH.
    #[arg(long, default_value = "full")]
    roi: String,

    /// Transmission mode (sequenced, continuous).
    #[arg(long, default_value = "sequenced")]
    mode: String,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Embed subtitles into a video.
    #[command(
        about = "Embed subtitles into a video",
        after_help = "Examples:\n  subgrid encode --video in.mp4 --srt in.srt\n  subgrid encode --video in.mp4 --srt in.srt --output out.mp4 --codec h264 --debug"
    )]
    Encode {
        /// Input video path.
        #[arg(long)]
        video: PathBuf,
        /// Input SRT subtitle path.
        #[arg(long)]
        srt: PathBuf,
        /// Output video path.
        #[arg(long, default_value = "video_encoded.mp4")]
        output: PathBuf,
        /// Draw grid cell boundaries on every frame.
        #[arg(long)]
        debug: bool,
        /// Output codec (mp4v, mjpg, ffv1, h264).
        #[arg(long, default_value = "mp4v")]
        codec: String,
        #[command(flatten)]
        signal: SignalArgs,
    },

    /// Read the embedded signal back out of a video.
    #[command(
        about = "Decode the embedded signal",
        after_help = "Examples:\n  subgrid decode out.mkv\n  subgrid decode out.mkv --every 1 --majority-window 3 --json"
    )]
    Decode {
        /// Input video path.
        input: PathBuf,
        /// Decode every Nth frame.
        #[arg(long, default_value_t = subgrid::configuration::DEFAULT_DECODE_INTERVAL)]
        every: u64,
        /// Majority-vote bits over this many sampled frames. Needs --every
        /// no larger than --repetition.
        #[arg(long, default_value_t = 1)]
        majority_window: usize,
        /// Output transitions as machine-readable JSON.
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        signal: SignalArgs,
    },

    /// Show how many frames each subtitle needs and gets.
    #[command(
        about = "Print the transmission plan for a subtitle file",
        after_help = "Examples:\n  subgrid plan --srt in.srt --fps 25\n  subgrid plan --srt in.srt --fps 23.976 --repetition 2 --json"
    )]
    Plan {
        /// Input SRT subtitle path.
        #[arg(long)]
        srt: PathBuf,
        /// Video frame rate.
        #[arg(long)]
        fps: f64,
        /// Output the plan as machine-readable JSON.
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        signal: SignalArgs,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_codec(value: &str) -> Option<OutputCodec> {
    match value.to_ascii_lowercase().as_str() {
        "mp4v" | "mpeg4" => Some(OutputCodec::Mp4v),
        "mjpg" | "mjpeg" => Some(OutputCodec::Mjpg),
        "ffv1" => Some(OutputCodec::Ffv1),
        "h264" | "x264" | "avc" => Some(OutputCodec::H264),
        _ => None,
    }
}

fn parse_mode(value: &str) -> Option<TransmissionMode> {
    match value.to_ascii_lowercase().as_str() {
        "sequenced" | "sequence" => Some(TransmissionMode::Sequenced),
        "continuous" => Some(TransmissionMode::Continuous),
        _ => None,
    }
}

fn parse_color(value: &str) -> Result<Rgb<u8>, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [red, green, blue] = parts.as_slice() else {
        return Err(format!("invalid colour {value:?}, expected R,G,B").into());
    };
    Ok(Rgb([red.parse()?, green.parse()?, blue.parse()?]))
}

fn parse_roi(value: &str) -> Result<RoiPolicy, Box<dyn std::error::Error>> {
    let trimmed = value.trim().to_ascii_lowercase();
    if trimmed == "full" {
        return Ok(RoiPolicy::FullFrame);
    }

    if let Some(fractions) = trimmed.strip_prefix("center:") {
        let parts: Vec<&str> = fractions.split(',').map(str::trim).collect();
        let [width_fraction, height_fraction] = parts.as_slice() else {
            return Err(format!("invalid ROI {value:?}, expected center:FW,FH").into());
        };
        return Ok(RoiPolicy::Centered {
            width_fraction: width_fraction.parse()?,
            height_fraction: height_fraction.parse()?,
        });
    }

    let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
    let [x, y, width, height] = parts.as_slice() else {
        return Err(format!("invalid ROI {value:?}, expected full, X,Y,W,H, or center:FW,FH").into());
    };
    Ok(RoiPolicy::Fixed(Roi::new(
        x.parse()?,
        y.parse()?,
        width.parse()?,
        height.parse()?,
    )))
}

fn signal_options(args: &SignalArgs) -> Result<SignalOptions, Box<dyn std::error::Error>> {
    let mode = parse_mode(&args.mode).ok_or(format!("unsupported --mode: {}", args.mode))?;
    let options = SignalOptions::new()
        .with_grid(args.rows, args.cols)
        .with_repetition(args.repetition)
        .with_on_color(parse_color(&args.color)?)
        .with_opacity(args.opacity)
        .with_threshold(args.threshold)
        .with_radius_fraction(args.radius)
        .with_roi(parse_roi(&args.roi)?)
        .with_mode(mode);
    Ok(options)
}

fn ensure_readable(path: &Path, what: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_file() {
        return Err(format!("{what} not found: {}", path.display()).into());
    }
    Ok(())
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn init_logging(global: &GlobalOptions) {
    let level = if global.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
        .init();
    subgrid::set_ffmpeg_log_level(log::max_level());
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        let message = match info.operation {
            OperationType::Embedding => "embedding",
            OperationType::Verification => "decoding",
            OperationType::Transcoding => "transcoding",
            _ => "working",
        };
        self.bar.set_message(message);
    }
}

impl Drop for TerminalProgress {
    fn drop(&mut self) {
        self.bar.finish_with_message("done");
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.global);

    match cli.command {
        Commands::Encode {
            video,
            srt,
            output,
            debug,
            codec,
            signal,
        } => {
            let codec = parse_codec(&codec).ok_or(format!("unsupported --codec: {codec}"))?;
            let options = signal_options(&signal)?;
            options.validate()?;
            ensure_readable(&video, "video")?;
            ensure_readable(&srt, "subtitle file")?;
            ensure_writable_path(&output, cli.global.overwrite)?;

            let mut embedder = SubtitleEmbedder::new(&video, &srt, &output)
                .with_codec(codec)
                .with_debug_overlay(debug)
                .with_options(options)
                .with_overwrite(cli.global.overwrite);
            if cli.global.progress {
                embedder = embedder.with_progress(Arc::new(TerminalProgress::new()?));
            }
            let outcome = embedder.run()?;

            if codec.needs_post_processing() && !outcome.output.transcoded {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!(
                        "{} transcoding failed; kept lossless intermediate",
                        codec.name()
                    )
                    .yellow()
                );
            }
            println!(
                "{} {}",
                "success:".green().bold(),
                format!(
                    "Embedded {} frame(s) ({} with signal, {} subtitle(s)) into {}",
                    outcome.report.frames,
                    outcome.report.signal_frames,
                    outcome.report.subtitles_signalled,
                    outcome.output.path.display()
                )
                .green()
            );
        }
        Commands::Decode {
            input,
            every,
            majority_window,
            json,
            signal,
        } => {
            if every == 0 {
                return Err("--every must be greater than 0".into());
            }
            ensure_readable(&input, "video")?;
            let options = signal_options(&signal)?
                .with_decode_interval(every)
                .with_majority_window(majority_window);

            let mut verifier = SignalVerifier::new(&input).with_options(options);
            if cli.global.progress {
                verifier = verifier.with_progress(Arc::new(TerminalProgress::new()?));
            }
            let report = verifier.run()?;

            if json {
                let payload = json!({
                    "frames": report.frames,
                    "sampled_frames": report.sampled_frames,
                    "fps": report.properties.frames_per_second,
                    "transitions": report.transitions.iter().map(|transition| json!({
                        "frame": transition.frame_number,
                        "time_ms": transition.time_ms,
                        "text": transition.text,
                    })).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for transition in &report.transitions {
                    println!(
                        "[frame {} | {} ms] {}",
                        transition.frame_number, transition.time_ms, transition.text
                    );
                }
                println!(
                    "{} {}",
                    "success:".green().bold(),
                    format!(
                        "Decoded {} frame(s), {} text change(s)",
                        report.sampled_frames,
                        report.transitions.len()
                    )
                    .green()
                );
            }
        }
        Commands::Plan {
            srt,
            fps,
            json,
            signal,
        } => {
            if !(fps > 0.0) {
                return Err("--fps must be greater than 0".into());
            }
            ensure_readable(&srt, "subtitle file")?;
            let options = signal_options(&signal)?;
            options.validate()?;

            let timeline = Timeline::from_srt_file(&srt)?;
            let plan = TransmissionPlan::new(&timeline, &options, fps)?;

            if json {
                let payload = json!({
                    "fps": fps,
                    "all_fit": plan.all_fit(),
                    "subtitles": plan.subtitles().iter().map(|subtitle| json!({
                        "index": subtitle.index,
                        "packets": subtitle.packets,
                        "sequence_frames": subtitle.sequence_len,
                        "display_frames": subtitle.display_frames,
                        "fits": subtitle.fits,
                    })).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for subtitle in plan.subtitles() {
                    let line = format!(
                        "#{:<5} packets={:<3} needs={:<4} shown={}",
                        subtitle.index,
                        subtitle.packets,
                        subtitle.sequence_len,
                        subtitle.display_frames
                    );
                    if subtitle.fits {
                        println!("{line}");
                    } else {
                        println!("{} {}", line.yellow(), "(incomplete)".yellow().bold());
                    }
                }
                let incomplete = plan.incomplete().count();
                if incomplete > 0 {
                    eprintln!(
                        "{} {}",
                        "warning:".yellow().bold(),
                        format!("{incomplete} subtitle(s) will not be fully transmitted").yellow()
                    );
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "subgrid", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
