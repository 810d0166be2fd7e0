//! LaTeX rendering backend.
//!
//! Compiles a LaTeX snippet to DVI in a private scratch directory and
//! converts the result to SVG (`dvisvgm`) or PNG (`dvipng`). The external
//! tools are reached through configurable command lines and treated as
//! black boxes; their diagnostic output is captured and relayed verbatim
//! on failure.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

/// Standalone preview document the equation body is substituted into.
///
/// The four placeholders are mandatory; [`assemble_document`] refuses a
/// template that lost one of them.
pub const DEFAULT_TEMPLATE: &str = r"\documentclass[preview,fontsize={{ fontsize }}pt]{standalone}
{{ preamble }}

{{ macros }}

\begin{document}
\begin{preview}
{{ code }}
\end{preview}
\end{document}
";

pub const DEFAULT_PREAMBLE: &str = r"\usepackage[utf8x]{inputenc}
\usepackage{amsmath}
\usepackage{amsfonts}
\usepackage{amssymb}
\usepackage{newtxtext}
\usepackage[libertine]{newtxmath}
";

pub const DEFAULT_LATEX_CMD: &str = "latex -interaction nonstopmode -halt-on-error";
pub const DEFAULT_DVISVGM_CMD: &str = "dvisvgm --no-fonts";
pub const DEFAULT_DVIPNG_CMD: &str = "dvipng -D 250 -bg Transparent --width --height";

const PLACEHOLDERS: [&str; 4] = [
    "{{ preamble }}",
    "{{ macros }}",
    "{{ fontsize }}",
    "{{ code }}",
];

lazy_static! {
    // dvisvgm reports the graphic size on stderr, in points
    static ref PT_SIZE: Regex = Regex::new(r"\b([0-9.]+)pt x ([0-9.]+)pt").unwrap();
    // dvipng reports pixel dimensions on stdout when run with --width --height
    static ref PX_SIZE: Regex = Regex::new(r"height=(\d+) width=(\d+)").unwrap();
}

/// Output image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Svg,
    Png,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Svg => "svg",
            ImageFormat::Png => "png",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Parameters threaded through every render call.
///
/// `macros` carries the per-document `\newcommand` declarations and must be
/// set on a fresh copy for each document; the struct is passed by reference
/// and never mutated by the render functions, so concurrent documents each
/// keep their own value.
#[derive(Debug, Clone)]
pub struct RenderParams {
    /// Font size in points.
    pub fontsize: u32,
    /// Document template containing the four placeholders.
    pub template: String,
    /// LaTeX package imports.
    pub preamble: String,
    /// Per-document macro declarations.
    pub macros: String,
    /// Command line for the typesetting compiler.
    pub latex_cmd: String,
    /// Command line for the DVI to SVG converter.
    pub dvisvgm_cmd: String,
    /// Command line for the DVI to PNG converter.
    pub dvipng_cmd: String,
    /// Ghostscript library path handed to dvisvgm via `LIBGS`.
    pub libgs: Option<PathBuf>,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            fontsize: 14,
            template: DEFAULT_TEMPLATE.to_string(),
            preamble: DEFAULT_PREAMBLE.to_string(),
            macros: String::new(),
            latex_cmd: DEFAULT_LATEX_CMD.to_string(),
            dvisvgm_cmd: DEFAULT_DVISVGM_CMD.to_string(),
            dvipng_cmd: DEFAULT_DVIPNG_CMD.to_string(),
            libgs: detect_libgs(),
        }
    }
}

/// Rendered image plus the dimensions scraped from the converter's
/// diagnostics. Dimensions are `None` when the diagnostics carried no
/// recognizable size; rendering still succeeds in that case.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub data: Vec<u8>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

/// Render error type
#[derive(Debug, Clone)]
pub enum RenderError {
    /// Configured external command is not on the execution path.
    ToolNotFound { tool: String },
    /// Typesetting compiler exited non-zero; carries its captured output.
    Compile { log: String },
    /// Converter exited non-zero; carries its captured output.
    Convert { log: String },
    /// Converter exited zero but its expected output file is missing.
    MissingOutput { path: PathBuf },
    /// Document template lost one of the required placeholders.
    BadTemplate { placeholder: &'static str },
    /// IO error (scratch files)
    Io { message: String },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ToolNotFound { tool } => {
                write!(f, "external tool not found: {}", tool)
            }
            RenderError::Compile { log } => {
                write!(f, "LaTeX compilation failed:\n{}", log)
            }
            RenderError::Convert { log } => {
                write!(f, "DVI conversion failed:\n{}", log)
            }
            RenderError::MissingOutput { path } => {
                write!(f, "converter produced no output at {}", path.display())
            }
            RenderError::BadTemplate { placeholder } => {
                write!(f, "document template is missing the {} placeholder", placeholder)
            }
            RenderError::Io { message } => {
                write!(f, "IO error: {}", message)
            }
        }
    }
}

impl std::error::Error for RenderError {}

impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        RenderError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for render operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Substitute preamble, macros, font size, and the equation body into the
/// document template.
pub fn assemble_document(code: &str, params: &RenderParams) -> RenderResult<String> {
    for placeholder in PLACEHOLDERS {
        if !params.template.contains(placeholder) {
            return Err(RenderError::BadTemplate { placeholder });
        }
    }
    Ok(params
        .template
        .replace("{{ preamble }}", &params.preamble)
        .replace("{{ macros }}", &params.macros)
        .replace("{{ fontsize }}", &params.fontsize.to_string())
        .replace("{{ code }}", code))
}

/// Compile `code` into `code.dvi` inside `dir`.
pub fn compile_to_dvi(code: &str, dir: &Path, params: &RenderParams) -> RenderResult<PathBuf> {
    let document = assemble_document(code, params)?;
    debug!("assembled document:\n{}", document);
    fs::write(dir.join("code.tex"), document)?;

    let output = run_tool(&params.latex_cmd, &["code.tex"], dir, None)?;
    if !output.status.success() {
        return Err(RenderError::Compile {
            log: tool_log(&output),
        });
    }

    let dvi = dir.join("code.dvi");
    if !dvi.exists() {
        return Err(RenderError::Compile {
            log: tool_log(&output),
        });
    }
    Ok(dvi)
}

/// Convert `code.dvi` in `dir` to SVG.
pub fn dvi_to_svg(dir: &Path, params: &RenderParams) -> RenderResult<RenderOutput> {
    let output = run_tool(
        &params.dvisvgm_cmd,
        &["code.dvi"],
        dir,
        params.libgs.as_deref(),
    )?;
    if !output.status.success() {
        return Err(RenderError::Convert {
            log: tool_log(&output),
        });
    }

    let diagnostics = String::from_utf8_lossy(&output.stderr);
    let (width, height) = parse_pt_size(&diagnostics);
    if width.is_none() {
        warn!("dvisvgm diagnostics carried no size information");
    }

    let svg_path = dir.join("code.svg");
    let data = fs::read(&svg_path).map_err(|_| RenderError::MissingOutput { path: svg_path })?;
    Ok(RenderOutput {
        data,
        width,
        height,
    })
}

/// Convert `code.dvi` in `dir` to PNG.
pub fn dvi_to_png(dir: &Path, params: &RenderParams) -> RenderResult<RenderOutput> {
    let output = run_tool(
        &params.dvipng_cmd,
        &["-o", "code.png", "code.dvi"],
        dir,
        None,
    )?;
    if !output.status.success() {
        return Err(RenderError::Convert {
            log: tool_log(&output),
        });
    }

    let diagnostics = String::from_utf8_lossy(&output.stdout);
    let (width, height) = parse_px_size(&diagnostics);
    if width.is_none() {
        warn!("dvipng diagnostics carried no size information");
    }

    let png_path = dir.join("code.png");
    let data = fs::read(&png_path).map_err(|_| RenderError::MissingOutput { path: png_path })?;
    Ok(RenderOutput {
        data,
        width,
        height,
    })
}

/// Render a LaTeX snippet to SVG in a fresh scratch directory.
pub fn render_svg(code: &str, params: &RenderParams) -> RenderResult<RenderOutput> {
    let scratch = tempfile::tempdir()?;
    compile_to_dvi(code, scratch.path(), params)?;
    dvi_to_svg(scratch.path(), params)
}

/// Render a LaTeX snippet to PNG in a fresh scratch directory.
pub fn render_png(code: &str, params: &RenderParams) -> RenderResult<RenderOutput> {
    let scratch = tempfile::tempdir()?;
    compile_to_dvi(code, scratch.path(), params)?;
    dvi_to_png(scratch.path(), params)
}

/// Render a LaTeX snippet to the requested format.
pub fn render(code: &str, format: ImageFormat, params: &RenderParams) -> RenderResult<RenderOutput> {
    match format {
        ImageFormat::Svg => render_svg(code, params),
        ImageFormat::Png => render_png(code, params),
    }
}

/// Scrape `<width>pt x <height>pt` out of converter diagnostics and scale
/// points to pixels.
pub fn parse_pt_size(diagnostics: &str) -> (Option<f64>, Option<f64>) {
    match PT_SIZE.captures(diagnostics) {
        Some(caps) => {
            let width = caps[1].parse::<f64>().ok().map(pt_to_px);
            let height = caps[2].parse::<f64>().ok().map(pt_to_px);
            (width, height)
        }
        None => (None, None),
    }
}

/// Scrape `height=<h> width=<w>` (already in pixels) out of converter
/// diagnostics.
pub fn parse_px_size(diagnostics: &str) -> (Option<f64>, Option<f64>) {
    match PX_SIZE.captures(diagnostics) {
        Some(caps) => {
            let height = caps[1].parse::<f64>().ok();
            let width = caps[2].parse::<f64>().ok();
            (width, height)
        }
        None => (None, None),
    }
}

/// 72pt = 96px; rounded to two decimals.
pub fn pt_to_px(pt: f64) -> f64 {
    (pt / 72.0 * 96.0 * 100.0).round() / 100.0
}

fn tool_log(output: &Output) -> String {
    // latex reports errors on stdout, dvisvgm on stderr; keep both
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut log = String::new();
    if !stdout.trim().is_empty() {
        log.push_str(stdout.trim_end());
        log.push('\n');
    }
    if !stderr.trim().is_empty() {
        log.push_str(stderr.trim_end());
        log.push('\n');
    }
    log
}

fn run_tool(
    cmd_line: &str,
    extra_args: &[&str],
    dir: &Path,
    libgs: Option<&Path>,
) -> RenderResult<Output> {
    let mut parts = cmd_line.split_whitespace();
    let program = parts.next().ok_or_else(|| RenderError::Io {
        message: "empty tool command line".to_string(),
    })?;

    let mut command = Command::new(program);
    command.args(parts).args(extra_args).current_dir(dir);
    if let Some(libgs) = libgs {
        command.env("LIBGS", libgs);
    }

    match command.output() {
        Ok(output) => Ok(output),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(RenderError::ToolNotFound {
            tool: program.to_string(),
        }),
        Err(err) => Err(err.into()),
    }
}

fn detect_libgs() -> Option<PathBuf> {
    if std::env::var_os("LIBGS").is_some() {
        // dvisvgm inherits the variable as-is
        return None;
    }
    if cfg!(target_os = "macos") {
        let homebrew = Path::new("/usr/local/opt/ghostscript/lib/libgs.dylib");
        if homebrew.exists() {
            return Some(homebrew.to_path_buf());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_document_substitutes_all_placeholders() {
        let params = RenderParams {
            fontsize: 12,
            preamble: "\\usepackage{amsmath}".to_string(),
            macros: "\\newcommand{\\half}{\\frac{1}{2}}".to_string(),
            ..RenderParams::default()
        };
        let document = assemble_document("$x^2$", &params).unwrap();
        assert!(document.contains("fontsize=12pt"));
        assert!(document.contains("\\usepackage{amsmath}"));
        assert!(document.contains("\\newcommand{\\half}{\\frac{1}{2}}"));
        assert!(document.contains("$x^2$"));
        assert!(!document.contains("{{"));
    }

    #[test]
    fn test_assemble_document_rejects_broken_template() {
        let params = RenderParams {
            template: "{{ preamble }} {{ macros }} {{ code }}".to_string(),
            ..RenderParams::default()
        };
        match assemble_document("x", &params) {
            Err(RenderError::BadTemplate { placeholder }) => {
                assert_eq!(placeholder, "{{ fontsize }}");
            }
            other => panic!("expected BadTemplate, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pt_size_scales_to_pixels() {
        let (width, height) = parse_pt_size("  graphic size: 72.0pt x 36.0pt");
        assert_eq!(width, Some(96.0));
        assert_eq!(height, Some(48.0));
    }

    #[test]
    fn test_parse_pt_size_degrades_to_none() {
        assert_eq!(parse_pt_size("no dimensions here"), (None, None));
    }

    #[test]
    fn test_parse_px_size_reads_dvipng_output() {
        let diagnostics = "This is dvipng 1.15\n depth=2 height=38 width=176 ";
        let (width, height) = parse_px_size(diagnostics);
        assert_eq!(width, Some(176.0));
        assert_eq!(height, Some(38.0));
    }

    #[test]
    fn test_pt_to_px_rounds_to_two_decimals() {
        assert_eq!(pt_to_px(72.0), 96.0);
        assert_eq!(pt_to_px(10.0), 13.33);
    }

    #[test]
    fn test_missing_compiler_is_reported_by_name() {
        let params = RenderParams {
            latex_cmd: "mathbake-no-such-compiler -halt-on-error".to_string(),
            ..RenderParams::default()
        };
        match render_svg("$x$", &params) {
            Err(RenderError::ToolNotFound { tool }) => {
                assert_eq!(tool, "mathbake-no-such-compiler");
            }
            other => panic!("expected ToolNotFound, got {:?}", other),
        }
    }
}
