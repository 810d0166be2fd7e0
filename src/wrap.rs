//! Equation wrapping rules applied before handing LaTeX to the renderer.

use lazy_static::lazy_static;
use regex::Regex;

use crate::document::EquationKind;

lazy_static! {
    static ref KERN_BRACED: Regex = Regex::new(r"\\kern\{([^}]*)em\}").unwrap();
}

/// Wrap raw equation source for standalone compilation.
///
/// Inline equations are wrapped in `$...$`. Display equations pass through
/// unchanged except that blank lines are collapsed (the preview block the
/// template compiles them in cannot contain one) and braced `\kern{Nem}`
/// spacing is rewritten to the space-delimited form.
///
/// In both kinds `\label` is renamed to `\tag` unless the source already
/// carries a `\tag`; the template reserves `\label` for its own equation
/// numbering, and amsmath rejects a second `\tag`.
pub fn wrap_latex(raw: &str, kind: EquationKind) -> String {
    let mut wrapped = match kind {
        EquationKind::Display => {
            let mut body = raw.to_string();
            while body.contains("\n\n") {
                body = body.replace("\n\n", "\n");
            }
            KERN_BRACED.replace_all(&body, "\\kern ${1}em ").into_owned()
        }
        EquationKind::Inline => format!("${}$", raw),
    };
    if !wrapped.contains("\\tag") {
        wrapped = wrapped.replace("\\label", "\\tag");
    }
    wrapped
}
