//! Mathbake - bake MathJax equations in saved HTML pages into static images.
//!
//! Saved copies of MathJax-based pages (online textbooks, lecture notes)
//! only show equations while the MathJax scripts can run. This crate
//! rewrites such pages into self-contained static HTML: each `math/tex`
//! script node is compiled through a LaTeX toolchain into an SVG or PNG
//! file and replaced by an `<img>` reference, and the script machinery is
//! stripped from the document.
//!
//! The toolchain wrapper lives in the `mathbake-render` subcrate; this
//! crate owns the HTML side (macro extraction, equation scanning, document
//! rewriting) and the per-document orchestration.

pub mod document;
pub mod macros;
pub mod pipeline;
pub mod utils;
pub mod wrap;

// Re-export commonly used items
pub use document::{EquationKind, EquationNode};
pub use pipeline::{prerender, FailurePolicy, Prerendered, PrerenderOptions};
pub use utils::error::{PipelineError, PipelineResult};

// Renderer surface, re-exported for callers configuring the toolchain
pub use mathbake_render::{
    ImageFormat, RenderError, RenderOutput, RenderParams, DEFAULT_DVIPNG_CMD, DEFAULT_DVISVGM_CMD,
    DEFAULT_LATEX_CMD, DEFAULT_PREAMBLE, DEFAULT_TEMPLATE,
};
