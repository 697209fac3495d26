use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use sheetgrid::recognition::ocrs::OcrsRecognizer;
use sheetgrid::recognition::vision::VisionRecognizer;
use sheetgrid::{ExtractionConfig, SheetPipeline, TextRecognizer, Workspace};

#[derive(Parser)]
#[command(name = "sheetgrid")]
#[command(about = "Extract the marks tables of a photographed answer sheet")]
#[command(args_conflicts_with_subcommands = true, arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: Option<PathBuf>,

    /// Workspace root receiving data/input/ and data/output/<stem>/
    #[arg(long, value_name = "DIR", default_value = ".", global = true)]
    workspace: PathBuf,

    /// JSON file overriding the extraction thresholds
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Text recognition backend
    #[arg(long, value_enum, default_value_t = Engine::Ocrs)]
    engine: Engine,

    /// API key for the vision backend
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Cut single characters out of a cell image into
    /// <workspace>/data/output/<stem>/letters/
    Letters {
        #[arg(value_name = "BOX_IMAGE")]
        box_image: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Engine {
    /// Local ocrs models from ~/.cache/ocrs
    Ocrs,
    /// Google Cloud Vision text detection
    Vision,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "sheetgrid=debug" } else { "sheetgrid=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_recognizer(args: &Cli, config: &ExtractionConfig) -> anyhow::Result<Arc<dyn TextRecognizer>> {
    let recognizer: Arc<dyn TextRecognizer> = match args.engine {
        Engine::Ocrs => Arc::new(OcrsRecognizer::from_default_cache()?),
        Engine::Vision => {
            let key = args
                .api_key
                .clone()
                .context("--api-key or GOOGLE_API_KEY is required for the vision engine")?;
            Arc::new(VisionRecognizer::new(key, config.recognition.timeout())?)
        }
    };
    Ok(recognizer)
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let config = match &args.config {
        Some(path) => ExtractionConfig::from_json_file(path)?,
        None => ExtractionConfig::default(),
    };

    let workspace = Workspace::new(&args.workspace);

    if let Some(Command::Letters { box_image }) = &args.command {
        let recognizer: Arc<dyn TextRecognizer> = Arc::new(NoRecognizer);
        let pipeline = SheetPipeline::new(recognizer).with_config(config);
        let written = pipeline.extract_letters(box_image, &workspace)?;
        for path in &written {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let image_path = args.image_path.clone().context("missing IMAGE argument")?;

    // The blocking HTTP client must be created outside the async runtime
    let recognizer = build_recognizer(&args, &config)?;
    let mut pipeline = SheetPipeline::new(recognizer).with_config(config);
    if let Some(debug_dir) = args.debug_out.clone() {
        pipeline = pipeline.with_debug(debug_dir)?;
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let response = runtime.block_on(pipeline.process_file(&image_path, &workspace))?;
    drop(runtime);

    println!("{}", response.to_json()?);
    Ok(())
}

/// Letter extraction never reaches text recognition
struct NoRecognizer;

impl TextRecognizer for NoRecognizer {
    fn recognize(&self, _image: &image::DynamicImage) -> Result<String, sheetgrid::RecognitionError> {
        Err(sheetgrid::RecognitionError::Engine("no recognizer configured".into()))
    }

    fn name(&self) -> &str {
        "none"
    }
}
