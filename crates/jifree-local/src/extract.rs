use html_scraper::{Html, Node};
use jifree_core::{Result, TextExtractor};

/// Elements whose text never reaches the reader.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style"];

/// Plain-text extraction over an HTML5 parse tree.
///
/// Notes:
/// - The parser is error-recovering, so malformed markup still yields text.
/// - Text nodes are concatenated in document order with no added separators, so the
///   output lines up with what the browser's selection APIs report as page text.
#[derive(Debug, Clone, Default)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TextExtractor for HtmlExtractor {
    fn extract_text(&self, markup: &str) -> Result<String> {
        Ok(html_to_plain_text(markup))
    }
}

/// Depth-first walk of the parsed document, skipping `script`/`style` subtrees.
pub fn html_to_plain_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    if !doc.errors.is_empty() {
        tracing::debug!(parse_errors = doc.errors.len(), "html parsed with recovery");
    }

    let mut out = String::with_capacity(html.len() / 2);
    // Explicit stack: deeply nested pages must not blow the call stack.
    let mut stack = vec![doc.tree.root()];
    while let Some(node) = stack.pop() {
        match node.value() {
            Node::Element(el) if SKIPPED_ELEMENTS.contains(&el.name()) => continue,
            Node::Text(t) => out.push_str(t),
            _ => {}
        }
        stack.extend(node.children().rev());
    }
    out
}
