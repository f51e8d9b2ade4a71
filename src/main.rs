use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watermarker::cache::AssetCache;
use watermarker::config::{self, Settings, SettingsStore};
use watermarker::export::{self, CancelToken, ExportJob, ExportState};
use watermarker::imaging::{
    ImageBackend, LayoutMode, OutputFormat, RustBackend, compute_plan,
};
use watermarker::output::{self, ConsoleSink};
use watermarker::preview::{PreviewController, PreviewOutcome, PreviewRequest};
use watermarker::scan;
use watermarker::sink::PresentationSink;

/// Per-run overrides of the saved placement settings.
#[derive(clap::Args, Clone, Default)]
struct PlacementArgs {
    /// Watermark image (overrides `watermark_path`)
    #[arg(long)]
    watermark: Option<PathBuf>,

    /// Layout name or ordinal, e.g. `bottom-right` or `8`
    #[arg(long)]
    position: Option<LayoutMode>,

    /// Watermark width as a fraction of the photo width
    #[arg(long)]
    width_ratio: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    offset_x: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    offset_y: Option<f64>,

    /// Clockwise rotation in degrees
    #[arg(long, allow_negative_numbers = true)]
    rotation: Option<f64>,

    #[arg(long)]
    padding: Option<f64>,

    /// JPEG quality (0-100)
    #[arg(long)]
    quality: Option<u32>,
}

impl PlacementArgs {
    /// Saved settings with this run's overrides applied, validated.
    fn resolve(&self, saved: &Settings) -> Result<Settings, config::ConfigError> {
        let mut settings = saved.clone();
        if let Some(path) = &self.watermark {
            settings.watermark_path = Some(path.clone());
        }
        if let Some(layout) = self.position {
            settings.watermark_position = layout;
        }
        if let Some(v) = self.width_ratio {
            settings.watermark_width_ratio = v;
        }
        if let Some(v) = self.offset_x {
            settings.offset_x = v;
        }
        if let Some(v) = self.offset_y {
            settings.offset_y = v;
        }
        if let Some(v) = self.rotation {
            settings.rotation_angle = v;
        }
        if let Some(v) = self.padding {
            settings.image_padding = v;
        }
        if let Some(v) = self.quality {
            settings.output_quality = v;
        }
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Parser)]
#[command(name = "watermarker")]
#[command(version)]
#[command(about = "Stamp a watermark onto batches of photos")]
#[command(long_about = "\
Stamp a watermark onto batches of photos

The watermark is scaled to a fraction of each photo's width, optionally
rotated, and either anchored to one of nine positions or tiled across the
whole frame.

Layouts (name or number):
  0 top-left      1 top-center      2 top-right
  3 mid-left      4 center          5 mid-right
  6 bottom-left   7 bottom-center   8 bottom-right
  9 tiled        10 staggered-tiled

Outputs keep the source file name; .jpg/.jpeg are written as JPEG, .bmp as
BMP, everything else as PNG.

Run 'watermarker gen-config' to generate a documented watermarker.toml.")]
struct Cli {
    /// Settings file
    #[arg(long, default_value = config::DEFAULT_SETTINGS_FILE, global = true)]
    settings: PathBuf,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watermark source images (files or directories) into a folder
    Apply {
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Destination folder
        #[arg(long)]
        out: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        placement: PlacementArgs,
    },
    /// Render one watermarked preview to a file
    Preview {
        source: PathBuf,

        /// Where to write the preview; format follows the extension
        #[arg(long)]
        output: PathBuf,

        #[command(flatten)]
        placement: PlacementArgs,
    },
    /// Print where watermarks would go on a canvas, without any images
    Plan {
        /// Canvas size, e.g. 1000x800
        #[arg(long, value_parser = parse_size)]
        canvas: (u32, u32),

        /// Native watermark size, e.g. 200x100
        #[arg(long, value_parser = parse_size)]
        watermark_size: (u32, u32),

        #[command(flatten)]
        placement: PlacementArgs,
    },
    /// Read or change saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print a stock watermarker.toml with all options documented
    GenConfig,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show every setting
    List,
    /// Show one setting
    Get { key: String },
    /// Change and save one setting (empty value clears optional keys)
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Apply {
            sources,
            out,
            json,
            placement,
        } => {
            let store = SettingsStore::open(&cli.settings)?;
            let settings = placement.resolve(store.settings())?;
            init_thread_pool(&settings.processing);

            let job = ExportJob {
                sources: scan::expand_sources(&sources)?,
                destination_dir: Some(out.clone()),
                watermark: settings.watermark_path.clone(),
                quality: settings.quality(),
                placement: settings.placement(),
            };
            let sink: Arc<ConsoleSink> = Arc::new(if json {
                ConsoleSink::quiet(job.sources.len())
            } else {
                ConsoleSink::new(job.sources.len())
            });

            let cancel = CancelToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, finishing current image");
                    on_interrupt.cancel();
                }
            });

            let report = tokio::task::spawn_blocking(move || {
                let assets = AssetCache::new();
                let report = export::run(
                    &job,
                    &RustBackend::new(),
                    &assets,
                    &ExportState::new(),
                    &*sink,
                    &cancel,
                );
                tracing::debug!(cache = %assets.stats(), "watermark cache");
                report
            })
            .await??;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                output::print_export_report(&report, &out);
            }
        }
        Command::Preview {
            source,
            output: preview_path,
            placement,
        } => {
            let store = SettingsStore::open(&cli.settings)?;
            let settings = placement.resolve(store.settings())?;
            init_thread_pool(&settings.processing);

            let backend = Arc::new(RustBackend::new());
            let sink = Arc::new(ConsoleSink::new(1));
            let controller = PreviewController::new(
                Arc::clone(&backend),
                Arc::new(AssetCache::new()),
                sink.clone() as Arc<dyn PresentationSink>,
            );

            let outcome = controller
                .on_parameter_changed(PreviewRequest {
                    source: Some(source),
                    watermark: settings.watermark_path.clone(),
                    params: settings.placement(),
                })
                .await?;

            match outcome {
                PreviewOutcome::Published => {
                    if let Some(result) = sink.take_preview() {
                        let format = OutputFormat::for_path(&preview_path, settings.quality());
                        backend.encode(&result, &preview_path, format)?;
                        println!("Preview → {}", preview_path.display());
                    }
                }
                PreviewOutcome::Idle => {
                    return Err("no watermark set (use --watermark or `config set watermark_path`)".into());
                }
                PreviewOutcome::Failed(message) => return Err(message.into()),
                PreviewOutcome::Superseded => {}
            }
        }
        Command::Plan {
            canvas,
            watermark_size,
            placement,
        } => {
            let store = SettingsStore::open(&cli.settings)?;
            let settings = placement.resolve(store.settings())?;
            let params = settings.placement();
            let plan = compute_plan(canvas.0, canvas.1, watermark_size.0, watermark_size.1, &params)?;
            output::print_plan(&plan, params.layout);
        }
        Command::Config { action } => {
            let mut store = SettingsStore::open(&cli.settings)?;
            match action {
                ConfigAction::List => output::print_settings(&store.list()),
                ConfigAction::Get { key } => println!("{}", store.get(&key)?),
                ConfigAction::Set { key, value } => {
                    store.set(&key, &value)?;
                    println!("{} = {} ({})", key, store.get(&key)?, store.path().display());
                }
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: threads can be constrained down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Parse `WIDTHxHEIGHT`.
fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid size '{s}': {e}"))
    };
    Ok((parse(w)?, parse(h)?))
}
