//! Mathbake CLI - rewrite MathJax markup in saved HTML pages into
//! pre-rendered equation images.

#[cfg(feature = "cli")]
use clap::{Parser, ValueEnum};
#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::io::{self, Read, Write};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
use mathbake::{prerender, FailurePolicy, ImageFormat, PrerenderOptions, RenderParams};

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "mbake")]
#[command(version)]
#[command(about = "Bake MathJax equations in saved HTML pages into static images", long_about = None)]
struct Cli {
    /// Input HTML file (reads from stdin if not provided)
    input_file: Option<PathBuf>,

    /// Output HTML file (writes to stdout if not provided)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for rendered equation images; its last path component
    /// becomes the img src prefix in the output document
    #[arg(long, default_value = "svgs")]
    images_dir: PathBuf,

    /// Image format to produce
    #[arg(short, long, value_enum, default_value_t = Format::Svg)]
    format: Format,

    /// Font size in points
    #[arg(long, default_value_t = 14)]
    fontsize: u32,

    /// LaTeX preamble to read from file (replaces the default preamble)
    #[arg(long)]
    preamble: Option<PathBuf>,

    /// Command line for the LaTeX compiler
    #[arg(long)]
    latex_cmd: Option<String>,

    /// Command line for the DVI to SVG converter
    #[arg(long)]
    dvisvgm_cmd: Option<String>,

    /// Command line for the DVI to PNG converter
    #[arg(long)]
    dvipng_cmd: Option<String>,

    /// Ghostscript library path handed to the SVG converter
    #[arg(long)]
    libgs: Option<PathBuf>,

    /// Number of parallel render workers (defaults to the CPU count)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Skip equations that fail to render instead of aborting
    #[arg(long)]
    keep_going: bool,
}

#[cfg(feature = "cli")]
#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// Vector output via dvisvgm
    Svg,
    /// Raster output via dvipng
    Png,
}

#[cfg(feature = "cli")]
fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    // Read input
    let source = match cli.input_file {
        Some(ref path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let mut params = RenderParams {
        fontsize: cli.fontsize,
        ..RenderParams::default()
    };
    if let Some(ref path) = cli.preamble {
        params.preamble = fs::read_to_string(path)?;
    }
    if let Some(cmd) = cli.latex_cmd {
        params.latex_cmd = cmd;
    }
    if let Some(cmd) = cli.dvisvgm_cmd {
        params.dvisvgm_cmd = cmd;
    }
    if let Some(cmd) = cli.dvipng_cmd {
        params.dvipng_cmd = cmd;
    }
    if cli.libgs.is_some() {
        params.libgs = cli.libgs.clone();
    }

    let options = PrerenderOptions {
        image_dir: cli.images_dir.clone(),
        format: match cli.format {
            Format::Svg => ImageFormat::Svg,
            Format::Png => ImageFormat::Png,
        },
        policy: if cli.keep_going {
            FailurePolicy::Skip
        } else {
            FailurePolicy::Abort
        },
        jobs: cli.jobs,
        params,
    };

    let result = match prerender(&source, &options) {
        Ok(result) => result,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };

    if result.skipped > 0 {
        eprintln!(
            "{} equations rendered, {} skipped",
            result.rendered, result.skipped
        );
    }

    // Write output
    match cli.output {
        Some(ref path) => fs::write(path, result.html)?,
        None => io::stdout().write_all(result.html.as_bytes())?,
    }

    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Build with --features cli");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  cargo install mathbake --features cli");
    eprintln!("  mbake [OPTIONS] [INPUT_FILE]");
}
