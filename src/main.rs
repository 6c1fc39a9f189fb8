use clap::{Parser, Subcommand};
use image::ImageReader;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use cvlab::operators::{self, gray, histogram};
use cvlab::shell::Shell;
use cvlab::{History, OperatorSpec, Pipeline, Recipe, session};

#[derive(Parser)]
#[command(name = "cvlab")]
#[command(about = "Apply classic image-processing operators and keep a history of the results")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a chain of operators to an image
    Run {
        /// Path to input image file
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// Operator step, e.g. `gaussian_blur:k=5` (repeatable, runs after the recipe)
        #[arg(short, long = "step", value_name = "STEP")]
        steps: Vec<String>,

        /// JSON recipe with the steps to run
        #[arg(long, value_name = "FILE")]
        recipe: Option<PathBuf>,

        /// Where to write the final image
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Save debug outputs to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,

        /// Write the whole history to a .tar.zst session archive
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,

        /// Log failing steps and continue with the next one
        #[arg(long)]
        keep_going: bool,
    },

    /// Interactive session
    Shell {
        /// Image to open first
        #[arg(value_name = "IMAGE")]
        image_path: Option<PathBuf>,
    },

    /// Render a histogram image
    Hist {
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Joint histogram of the first two channels instead of per-channel curves
        #[arg(long)]
        two_d: bool,
    },

    /// List the available operators
    Ops,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[allow(clippy::too_many_arguments)]
fn run(
    image_path: PathBuf,
    steps: Vec<String>,
    recipe: Option<PathBuf>,
    output: Option<PathBuf>,
    debug_out: Option<PathBuf>,
    export: Option<PathBuf>,
    keep_going: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    let mut history = History::new();
    history.load_file(&image_path)?;

    // Build pipeline
    let mut pipeline = Pipeline::new().with_verbose(verbose).with_keep_going(keep_going);
    if let Some(recipe_path) = recipe {
        pipeline = Recipe::load(&recipe_path)?.extend_pipeline(pipeline);
    }
    for step in &steps {
        let spec: OperatorSpec = step.parse()?;
        pipeline = pipeline.add_step(Arc::new(spec));
    }
    if pipeline.is_empty() {
        anyhow::bail!("Nothing to do: give at least one --step or a --recipe");
    }

    // Enable debug mode if requested
    if let Some(debug_dir) = debug_out {
        pipeline = pipeline.with_debug(debug_dir)?;
    }

    let report = pipeline.run(&mut history)?;

    println!("\n=== Pipeline Results ===");
    for (i, op) in history.iter().enumerate() {
        let (w, h) = op.dimensions();
        println!("  [{i}] {} ({w}x{h}, {} ch)", op.display_name(), op.channels());
    }
    for failure in &report.failed {
        println!("  step {} ({}) failed: {}", failure.index + 1, failure.step, failure.error);
    }
    if let Some(op) = history.selected() {
        if !op.contours().is_empty() {
            println!("Contours found: {}", op.contours().len());
        }
    }

    if let Some(output) = output {
        history.save_selected(&output)?;
        println!("Saved {}", output.display());
    }
    if let Some(export) = export {
        session::export(&history, &export)?;
        println!("Exported session to {}", export.display());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Run {
            image_path,
            steps,
            recipe,
            output,
            debug_out,
            export,
            keep_going,
        } => run(image_path, steps, recipe, output, debug_out, export, keep_going, args.verbose),

        Command::Shell { image_path } => {
            let mut history = History::new();
            if let Some(path) = image_path {
                history.load_file(&path)?;
            }
            let stdout = std::io::stdout();
            let mut shell = Shell::new(history, stdout.lock());
            shell.run(std::io::stdin().lock())
        }

        Command::Hist {
            image_path,
            output,
            two_d,
        } => {
            let img = ImageReader::open(&image_path)?
                .decode()
                .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;
            let img = operators::normalize(img);
            let hist = if two_d {
                histogram::histogram_2d_image(&img)?
            } else {
                histogram::channel_histogram_image(
                    &img,
                    histogram::DEFAULT_HIST_SIZE,
                    histogram::DEFAULT_WIDTH,
                    histogram::DEFAULT_HEIGHT,
                )?
            };
            hist.save(&output)?;
            println!("Saved {}", output.display());
            Ok(())
        }

        Command::Ops => {
            for (name, params) in cvlab::recipe::OPERATORS {
                println!("  {name:<20} {params}");
            }
            println!("\nGamma presets:");
            for (i, gamma) in gray::GAMMA_PRESETS.iter().enumerate() {
                println!("  {i}: gamma={gamma}");
            }
            println!("Alpha/beta presets:");
            for (i, (alpha, beta)) in gray::ALPHA_BETA_PRESETS.iter().enumerate() {
                println!("  {i}: alpha={alpha} beta={beta}");
            }
            Ok(())
        }
    }
}
