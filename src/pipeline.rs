//! Per-document orchestration.
//!
//! One pass over the document collects equations and assigns ordinals, the
//! renders fan out over a bounded worker pool, and the DOM is rewritten
//! serially once the workers are done. File names derive from the
//! pre-assigned ordinals, so output is deterministic regardless of
//! completion order.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rayon::prelude::*;

use mathbake_render::{render, ImageFormat, RenderOutput, RenderParams};

use crate::document::{self, EquationKind};
use crate::macros::extract_macro_commands;
use crate::utils::error::{PipelineError, PipelineResult};
use crate::wrap::wrap_latex;

/// What to do when a single equation fails to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Abort the whole document; the first failure in document order wins.
    #[default]
    Abort,
    /// Log the failure, leave that equation without an image, keep going.
    Skip,
}

/// Per-document configuration.
#[derive(Debug, Clone)]
pub struct PrerenderOptions {
    /// Directory the image files are written into. Its final path component
    /// becomes the `src` prefix of the inserted `<img>` nodes.
    pub image_dir: PathBuf,
    pub format: ImageFormat,
    pub policy: FailurePolicy,
    /// Worker pool size; `None` uses the core-sized global pool.
    pub jobs: Option<usize>,
    pub params: RenderParams,
}

impl Default for PrerenderOptions {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("svgs"),
            format: ImageFormat::Svg,
            policy: FailurePolicy::default(),
            jobs: None,
            params: RenderParams::default(),
        }
    }
}

/// Outcome of one document pass.
#[derive(Debug)]
pub struct Prerendered {
    /// The rewritten document.
    pub html: String,
    /// Equations rendered and inserted.
    pub rendered: usize,
    /// Equations skipped under [`FailurePolicy::Skip`].
    pub skipped: usize,
}

struct RenderJob {
    code: String,
    kind: EquationKind,
    ordinal: usize,
    path: PathBuf,
}

/// Rewrite every MathJax equation in `source` into a pre-rendered image and
/// return the mutated document.
pub fn prerender(source: &str, options: &PrerenderOptions) -> PipelineResult<Prerendered> {
    let tree = document::parse_document(source);
    document::strip_mathjax_residue(&tree);

    let macros = extract_macro_commands(&tree)?;
    let equations = document::collect_equations(&tree);
    info!(
        "rendering {} equations ({} macro bytes) into {}",
        equations.len(),
        macros.len(),
        options.image_dir.display()
    );

    fs::create_dir_all(&options.image_dir)?;

    // Fresh copy per document; the macro table must never leak between
    // concurrently processed documents.
    let mut params = options.params.clone();
    params.macros = macros;

    let jobs: Vec<RenderJob> = equations
        .iter()
        .map(|equation| RenderJob {
            code: wrap_latex(&equation.raw, equation.kind),
            kind: equation.kind,
            ordinal: equation.ordinal,
            path: image_path(&options.image_dir, equation.kind, equation.ordinal, options.format),
        })
        .collect();

    let results = run_jobs(&jobs, &params, options);

    let dir_name = image_dir_name(&options.image_dir);
    let mut rendered = 0usize;
    let mut skipped = 0usize;
    for (equation, result) in equations.iter().zip(results) {
        match result {
            Ok(output) => {
                document::insert_image(
                    equation,
                    &dir_name,
                    options.format,
                    output.width,
                    output.height,
                );
                rendered += 1;
            }
            Err(err) => match options.policy {
                FailurePolicy::Abort => return Err(err),
                FailurePolicy::Skip => {
                    warn!("skipping {} equation {}: {}", equation.kind, equation.ordinal, err);
                    skipped += 1;
                }
            },
        }
    }

    document::strip_scripts(&tree);
    let html = document::to_html(&tree)?;
    Ok(Prerendered {
        html,
        rendered,
        skipped,
    })
}

fn run_jobs(
    jobs: &[RenderJob],
    params: &RenderParams,
    options: &PrerenderOptions,
) -> Vec<PipelineResult<RenderOutput>> {
    let render_one = |job: &RenderJob| -> PipelineResult<RenderOutput> {
        let output = render(&job.code, options.format, params)
            .map_err(|err| PipelineError::render(job.kind, job.ordinal, err))?;
        fs::write(&job.path, &output.data)?;
        Ok(output)
    };

    match options.jobs {
        Some(threads) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(|| jobs.par_iter().map(render_one).collect()),
            Err(err) => {
                warn!("falling back to the global worker pool: {}", err);
                jobs.par_iter().map(render_one).collect()
            }
        },
        None => jobs.par_iter().map(render_one).collect(),
    }
}

fn image_path(dir: &Path, kind: EquationKind, ordinal: usize, format: ImageFormat) -> PathBuf {
    dir.join(format!(
        "{}{}.{}",
        kind.file_prefix(),
        ordinal,
        format.extension()
    ))
}

fn image_dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string())
}
