use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use oneoff_render::{Config, RenderJob};

const DEFAULT_CONFIG: &str = "config.json";

#[derive(Parser, Debug)]
#[command(name = "oneoff", version, about = "Render audio-reactive GLSL shaders to video")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render using the configured mode (single shader, cycling, or batch).
    Render(ConfigArgs),
    /// Render one shader against one audio file.
    Shader(ShaderArgs),
    /// Render a timeline manifest.
    Timeline(TimelineArgs),
    /// Render every audio file in the batch input directory.
    Batch(ConfigArgs),
}

#[derive(Parser, Debug)]
struct ConfigArgs {
    /// Configuration JSON. Defaults apply when the default file is absent.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ShaderArgs {
    /// Fragment program to render.
    #[arg(long)]
    shader: PathBuf,

    /// Audio file driving the shader and muxed into the output.
    #[arg(long)]
    audio: PathBuf,

    /// Output video path.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Parser, Debug)]
struct TimelineArgs {
    /// Timeline manifest JSON.
    #[arg(long)]
    manifest: PathBuf,

    /// Output video path. Defaults to the output directory, named after the project.
    #[arg(long)]
    out: Option<PathBuf>,

    #[command(flatten)]
    config: ConfigArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => {
            let cfg = load_config(&args)?;
            if cfg.batch_settings.enabled {
                cmd_batch(&cfg)
            } else {
                let job = RenderJob::from_config(&cfg);
                oneoff_render::run_job(&cfg, &job)?;
                eprintln!("wrote {}", job.output.display());
                Ok(())
            }
        }
        Command::Shader(args) => {
            let cfg = load_config(&args.config)?;
            let job = RenderJob::shader(args.shader, args.audio, args.out);
            oneoff_render::run_job(&cfg, &job)?;
            eprintln!("wrote {}", job.output.display());
            Ok(())
        }
        Command::Timeline(args) => {
            let cfg = load_config(&args.config)?;
            let job = RenderJob::timeline(&cfg, &args.manifest, args.out)?;
            oneoff_render::run_job(&cfg, &job)?;
            eprintln!("wrote {}", job.output.display());
            Ok(())
        }
        Command::Batch(args) => {
            let cfg = load_config(&args)?;
            cmd_batch(&cfg)
        }
    }
}

fn cmd_batch(cfg: &Config) -> anyhow::Result<()> {
    let report = oneoff_render::run_batch(cfg)?;
    for (audio, err) in &report.failures {
        eprintln!("failed {}: {err}", audio.display());
    }
    eprintln!(
        "batch: {} succeeded, {} failed, {} skipped in {:.1}s",
        report.succeeded,
        report.failed,
        report.skipped,
        report.elapsed.as_secs_f64()
    );
    if report.succeeded == 0 && report.total() > report.skipped {
        anyhow::bail!("no file in the batch rendered successfully");
    }
    Ok(())
}

fn load_config(args: &ConfigArgs) -> anyhow::Result<Config> {
    let cfg = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load(Path::new(DEFAULT_CONFIG))
            .with_context(|| format!("load config '{DEFAULT_CONFIG}'"))?,
        None => Config::default(),
    };
    init_logging(cfg.debug.verbose_logging);
    Ok(cfg)
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
