//! HTML document scanning and mutation around MathJax markup.
//!
//! MathJax stores equation sources in `<script>` elements typed `math/tex`
//! (inline) and `math/tex; mode=display` (display). This module collects
//! those nodes in document order, inserts replacement `<img>` fragments,
//! and strips the script machinery once rendering is done.

use std::fmt;

use html5ever::{local_name, namespace_url, ns, QualName};
use kuchikiki::traits::TendrilSink;
use kuchikiki::{Attribute, ExpandedName, NodeRef};

use mathbake_render::ImageFormat;

pub const INLINE_TYPE: &str = "math/tex";
pub const DISPLAY_TYPE: &str = "math/tex; mode=display";

/// MathJax presentation residue left next to each equation source; removed
/// before scanning so only the `<script>` sources remain.
const MATHJAX_RESIDUE: [&str; 3] = ["span.MathJax", "div.MathJax_Display", "span.MathJax_Preview"];

/// Kind of math markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquationKind {
    Inline,
    Display,
}

impl EquationKind {
    /// Prefix of the ordinal-numbered image file name.
    pub fn file_prefix(self) -> &'static str {
        match self {
            EquationKind::Inline => "in_",
            EquationKind::Display => "eq_",
        }
    }
}

impl fmt::Display for EquationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EquationKind::Inline => f.write_str("inline"),
            EquationKind::Display => f.write_str("display"),
        }
    }
}

/// One piece of math markup found in the document.
///
/// `ordinal` is the zero-based position among equations of the same kind in
/// document order; it is assigned during the single scan pass, before any
/// parallel dispatch, and names the output file.
#[derive(Debug, Clone)]
pub struct EquationNode {
    pub node: NodeRef,
    pub raw: String,
    pub kind: EquationKind,
    pub ordinal: usize,
}

/// Parse an HTML string into a mutable document tree.
pub fn parse_document(source: &str) -> NodeRef {
    kuchikiki::parse_html().one(source)
}

/// Serialize the document tree back to an HTML string.
pub fn to_html(document: &NodeRef) -> std::io::Result<String> {
    let mut bytes = Vec::new();
    document.serialize(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// All `<script>` elements whose `type` attribute equals `type_attr`,
/// in document order.
pub fn scripts_of_type(document: &NodeRef, type_attr: &str) -> Vec<NodeRef> {
    let mut nodes = Vec::new();
    if let Ok(scripts) = document.select("script") {
        for script in scripts {
            let attributes = script.attributes.borrow();
            if attributes.get("type") == Some(type_attr) {
                nodes.push(script.as_node().clone());
            }
        }
    }
    nodes
}

/// Collect every equation node in document order, assigning per-kind
/// ordinals.
pub fn collect_equations(document: &NodeRef) -> Vec<EquationNode> {
    let mut equations = Vec::new();
    let mut next_inline = 0usize;
    let mut next_display = 0usize;

    if let Ok(scripts) = document.select("script") {
        for script in scripts {
            let kind = {
                let attributes = script.attributes.borrow();
                match attributes.get("type") {
                    Some(t) if t == INLINE_TYPE => EquationKind::Inline,
                    Some(t) if t == DISPLAY_TYPE => EquationKind::Display,
                    _ => continue,
                }
            };
            let ordinal = match kind {
                EquationKind::Inline => {
                    next_inline += 1;
                    next_inline - 1
                }
                EquationKind::Display => {
                    next_display += 1;
                    next_display - 1
                }
            };
            let node = script.as_node().clone();
            equations.push(EquationNode {
                raw: node.text_contents(),
                node,
                kind,
                ordinal,
            });
        }
    }
    equations
}

/// Remove the spans and divs MathJax rendered next to each equation source.
pub fn strip_mathjax_residue(document: &NodeRef) {
    for selector in MATHJAX_RESIDUE {
        detach_all(document, selector);
    }
}

/// Remove every `<script>` element, equation sources and config blocks
/// included. Runs after the replacement images are in place.
pub fn strip_scripts(document: &NodeRef) {
    detach_all(document, "script");
}

fn detach_all(document: &NodeRef, selector: &str) {
    if let Ok(matches) = document.select(selector) {
        let nodes: Vec<NodeRef> = matches.map(|m| m.as_node().clone()).collect();
        for node in nodes {
            node.detach();
        }
    }
}

/// Style hint carried by every inserted image, with explicit dimensions
/// when the converter reported them.
pub fn image_style(width: Option<f64>, height: Option<f64>) -> String {
    match (width, height) {
        (Some(w), Some(h)) => format!(
            "vertical-align: middle; margin: 0.5em 0; width: {}px; height: {}px;",
            w, h
        ),
        _ => "vertical-align: middle; margin: 0.5em 0;".to_string(),
    }
}

/// Insert the replacement fragment for `equation` as its next sibling:
/// an `<img>` pointing into the images directory, wrapped in a centered
/// `<div>` for display equations. The source script node itself is removed
/// later by [`strip_scripts`].
pub fn insert_image(
    equation: &EquationNode,
    images_dir_name: &str,
    format: ImageFormat,
    width: Option<f64>,
    height: Option<f64>,
) {
    let src = format!(
        "{}/{}{}.{}",
        images_dir_name,
        equation.kind.file_prefix(),
        equation.ordinal,
        format.extension()
    );
    let img = new_element(
        local_name!("img"),
        vec![
            attribute("src", src),
            attribute("style", image_style(width, height)),
        ],
    );

    let replacement = match equation.kind {
        EquationKind::Display => {
            let container = new_element(
                local_name!("div"),
                vec![attribute("style", "text-align:center;")],
            );
            container.append(img);
            container
        }
        EquationKind::Inline => img,
    };
    equation.node.insert_after(replacement);
}

fn new_element(name: html5ever::LocalName, attributes: Vec<(ExpandedName, Attribute)>) -> NodeRef {
    NodeRef::new_element(QualName::new(None, ns!(html), name), attributes)
}

fn attribute(name: &str, value: impl Into<String>) -> (ExpandedName, Attribute) {
    (
        ExpandedName::new(ns!(), name),
        Attribute {
            prefix: None,
            value: value.into(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
<p>first <script type="math/tex">a</script> then <script type="math/tex">b</script></p>
<script type="math/tex; mode=display">c = d</script>
<p>tail <script type="math/tex">e</script></p>
<script type="text/javascript">var x = 1;</script>
</body></html>"#;

    #[test]
    fn test_collect_assigns_per_kind_ordinals_in_document_order() {
        let document = parse_document(PAGE);
        let equations = collect_equations(&document);
        let summary: Vec<(EquationKind, usize, String)> = equations
            .iter()
            .map(|e| (e.kind, e.ordinal, e.raw.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (EquationKind::Inline, 0, "a".to_string()),
                (EquationKind::Inline, 1, "b".to_string()),
                (EquationKind::Display, 0, "c = d".to_string()),
                (EquationKind::Inline, 2, "e".to_string()),
            ]
        );
    }

    #[test]
    fn test_collect_ignores_plain_scripts() {
        let document = parse_document(PAGE);
        let equations = collect_equations(&document);
        assert!(equations.iter().all(|e| !e.raw.contains("var x")));
    }

    #[test]
    fn test_strip_mathjax_residue() {
        let document = parse_document(
            r#"<body><span class="MathJax">x</span><div class="MathJax_Display">y</div>
<span class="MathJax_Preview">z</span><span class="keep">k</span></body>"#,
        );
        strip_mathjax_residue(&document);
        let html = to_html(&document).unwrap();
        assert!(!html.contains("MathJax"));
        assert!(html.contains("keep"));
    }

    #[test]
    fn test_insert_inline_image_after_source_node() {
        let document = parse_document(r#"<p><script type="math/tex">x</script></p>"#);
        let equations = collect_equations(&document);
        insert_image(&equations[0], "svgs", ImageFormat::Svg, None, None);
        strip_scripts(&document);
        let html = to_html(&document).unwrap();
        assert!(html.contains(r#"<img src="svgs/in_0.svg""#));
        assert!(html.contains("vertical-align: middle; margin: 0.5em 0;"));
        assert!(!html.contains("<script"));
        assert!(!html.contains("text-align:center"));
    }

    #[test]
    fn test_insert_display_image_is_centered_with_dimensions() {
        let document =
            parse_document(r#"<p><script type="math/tex; mode=display">x</script></p>"#);
        let equations = collect_equations(&document);
        insert_image(&equations[0], "svgs", ImageFormat::Png, Some(96.0), Some(48.0));
        let html = to_html(&document).unwrap();
        assert!(html.contains(r#"<div style="text-align:center;">"#));
        assert!(html.contains(r#"src="svgs/eq_0.png""#));
        assert!(html.contains("width: 96px; height: 48px;"));
    }
}
