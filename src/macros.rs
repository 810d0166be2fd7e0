//! MathJax macro extraction.
//!
//! MathJax-based pages ship a `text/x-mathjax-config` script whose `Macros`
//! table is a JavaScript object literal, not valid JSON. This module locates
//! that script, repairs the table text into JSON, and translates each entry
//! into a `\newcommand` declaration usable by every equation in the
//! document.

use kuchikiki::NodeRef;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::document::scripts_of_type;
use crate::utils::error::{PipelineError, PipelineResult};

const CONFIG_TYPE: &str = "text/x-mathjax-config";
const CONFIG_TYPE_EXECUTED: &str = "text/x-mathjax-config;executed=true";

lazy_static! {
    static ref MACRO_TABLE: Regex = Regex::new(r"Macros:\s*(\{[\s\S]*\]\s*\})").unwrap();
    static ref BARE_KEY: Regex = Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*:").unwrap();
    static ref TRAILING_COMMA: Regex = Regex::new(r",(\s*[\]\}])").unwrap();
}

/// One macro definition as serialized by MathJax: either a bare expansion
/// string or an `[expansion, argumentCount]` pair.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MacroDef {
    WithArity(String, u32),
    Plain(String),
}

impl MacroDef {
    fn expansion(&self) -> &str {
        match self {
            MacroDef::WithArity(expansion, _) => expansion,
            MacroDef::Plain(expansion) => expansion,
        }
    }

    fn arity(&self) -> u32 {
        match self {
            MacroDef::WithArity(_, arity) => *arity,
            MacroDef::Plain(_) => 0,
        }
    }
}

/// Locate the live MathJax config script.
///
/// The pages carry the config twice; once MathJax has run in the browser
/// both copies are retyped with `;executed=true`. Two live copies and zero
/// executed ones (or the reverse) are the known shapes; anything else means
/// no usable macro table.
pub fn find_config_script(document: &NodeRef) -> Option<NodeRef> {
    let live = scripts_of_type(document, CONFIG_TYPE);
    let executed = scripts_of_type(document, CONFIG_TYPE_EXECUTED);
    if live.len() == 2 && executed.is_empty() {
        live.into_iter().next()
    } else if live.is_empty() && executed.len() == 2 {
        executed.into_iter().next()
    } else {
        None
    }
}

/// Repair the JavaScript-object-literal macro table into valid JSON:
/// quote bare identifier keys and drop trailing commas before a closing
/// bracket or brace. Pure text to text; idempotent.
pub fn repair_macro_json(text: &str) -> String {
    let quoted = BARE_KEY.replace_all(text, "\"${1}\":");
    TRAILING_COMMA.replace_all(&quoted, "${1}").into_owned()
}

/// Translate the macro table inside a config script into newline-separated
/// `\newcommand` declarations.
pub fn macro_commands_from_config(script_text: &str) -> PipelineResult<String> {
    let caps = MACRO_TABLE
        .captures(script_text)
        .ok_or_else(|| PipelineError::macro_parse("config script carries no Macros table"))?;
    let repaired = repair_macro_json(&caps[1]);

    let table: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&repaired)
        .map_err(|err| {
            PipelineError::macro_parse(format!(
                "macro table is not valid JSON after repair: {}",
                err
            ))
        })?;

    let mut commands = String::new();
    for (name, value) in table {
        let def: MacroDef = serde_json::from_value(value)
            .map_err(|err| PipelineError::macro_parse(format!("macro '{}': {}", name, err)))?;
        commands.push_str(&newcommand_line(&name, def.expansion(), def.arity()));
        commands.push('\n');
    }
    Ok(commands)
}

/// Extract the document's macro string, or an empty string when the page
/// carries no recognizable config script.
pub fn extract_macro_commands(document: &NodeRef) -> PipelineResult<String> {
    match find_config_script(document) {
        Some(script) => macro_commands_from_config(&script.text_contents()),
        None => Ok(String::new()),
    }
}

fn newcommand_line(name: &str, expansion: &str, arity: u32) -> String {
    if arity > 0 {
        format!("\\newcommand{{\\{}}}[{}]{{{}}}", name, arity, expansion)
    } else {
        format!("\\newcommand{{\\{}}}{{{}}}", name, expansion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_document;
    use pretty_assertions::assert_eq;

    const CONFIG: &str = r#"MathJax.Hub.Config({
  TeX: {
    Macros: {
      FLP: ["\\textit{FLP}", 0],
      abs: ["\\lvert #1 \\rvert", 1],
      ddt: ["\\frac{d#1}{dt}", 1]
    }
  }
});"#;

    fn page_with_config(type_attr: &str, copies: usize) -> String {
        let mut body = String::new();
        for _ in 0..copies {
            body.push_str(&format!(
                "<script type=\"{}\">{}</script>\n",
                type_attr, CONFIG
            ));
        }
        format!("<html><body>{}</body></html>", body)
    }

    #[test]
    fn test_repair_quotes_bare_keys() {
        assert_eq!(
            repair_macro_json(r#"{FLP: ["\\textit{FLP}", 0]}"#),
            r#"{"FLP": ["\\textit{FLP}", 0]}"#
        );
    }

    #[test]
    fn test_repair_drops_trailing_commas() {
        assert_eq!(
            repair_macro_json("{a: [\"x\", 0], }"),
            "{\"a\": [\"x\", 0] }"
        );
    }

    #[test]
    fn test_repair_is_idempotent() {
        let input = r#"{FLP: ["\\textit{FLP}", 0], abs: ["\\lvert #1 \\rvert", 1]}"#;
        let once = repair_macro_json(input);
        assert_eq!(repair_macro_json(&once), once);
    }

    #[test]
    fn test_one_newcommand_line_per_entry() {
        let commands = macro_commands_from_config(CONFIG).unwrap();
        let lines: Vec<&str> = commands.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.starts_with("\\newcommand{\\")));
    }

    #[test]
    fn test_zero_arity_omits_bracket_clause() {
        let commands = macro_commands_from_config(CONFIG).unwrap();
        assert_eq!(
            commands,
            "\\newcommand{\\FLP}{\\textit{FLP}}\n\
             \\newcommand{\\abs}[1]{\\lvert #1 \\rvert}\n\
             \\newcommand{\\ddt}[1]{\\frac{d#1}{dt}}\n"
        );
    }

    #[test]
    fn test_plain_string_macro_definition() {
        let script = r#"Macros: {half: "\\frac{1}{2}", abs: ["\\lvert #1 \\rvert", 1]}"#;
        let commands = macro_commands_from_config(script).unwrap();
        assert!(commands.contains("\\newcommand{\\half}{\\frac{1}{2}}"));
    }

    #[test]
    fn test_live_config_pair_is_used() {
        let document = parse_document(&page_with_config(CONFIG_TYPE, 2));
        let commands = extract_macro_commands(&document).unwrap();
        assert!(commands.contains("\\newcommand{\\FLP}"));
    }

    #[test]
    fn test_executed_config_pair_is_used() {
        let document = parse_document(&page_with_config(CONFIG_TYPE_EXECUTED, 2));
        let commands = extract_macro_commands(&document).unwrap();
        assert!(commands.contains("\\newcommand{\\FLP}"));
    }

    #[test]
    fn test_unexpected_config_count_means_no_macros() {
        let document = parse_document(&page_with_config(CONFIG_TYPE, 1));
        assert_eq!(extract_macro_commands(&document).unwrap(), "");
    }

    #[test]
    fn test_no_config_script_means_no_macros() {
        let document = parse_document("<html><body><p>nothing</p></body></html>");
        assert_eq!(extract_macro_commands(&document).unwrap(), "");
    }

    #[test]
    fn test_unrepairable_table_is_fatal() {
        let script = r#"Macros: {bad: ["unclosed, 0]}"#;
        let err = macro_commands_from_config(script).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_config_without_table_is_fatal() {
        let err = macro_commands_from_config("MathJax.Hub.Config({});").unwrap_err();
        assert!(err.to_string().contains("Macros"));
    }
}
