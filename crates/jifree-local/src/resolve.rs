//! Selection resolution: map a highlighted string back onto token boundaries.
//!
//! The caller only knows the raw text the user selected plus a little text on either
//! side. We scan every start index, extend one token at a time, and accept the first
//! candidate (in scan order) whose concatenated surfaces equal the selection and whose
//! surroundings agree with the prefix/suffix.

use jifree_core::{Match, SelectionQuery, Token, TokenSpan};

/// The whole sequence joined once, with the byte offset at which each token starts.
///
/// Every candidate and context check becomes a slice of `text`, so nothing is
/// re-concatenated per candidate.
struct Joined {
    text: String,
    /// `bounds[k]` is where token `k` starts; `bounds[len]` is `text.len()`.
    bounds: Vec<usize>,
}

impl Joined {
    fn new(tokens: &[Token]) -> Self {
        let mut text = String::with_capacity(tokens.iter().map(|t| t.surface.len()).sum());
        let mut bounds = Vec::with_capacity(tokens.len() + 1);
        for t in tokens {
            bounds.push(text.len());
            text.push_str(&t.surface);
        }
        bounds.push(text.len());
        Self { text, bounds }
    }

    fn between(&self, start: usize, end: usize) -> &str {
        &self.text[self.bounds[start]..self.bounds[end + 1]]
    }

    fn before(&self, start: usize) -> &str {
        &self.text[..self.bounds[start]]
    }

    fn after(&self, end: usize) -> &str {
        &self.text[self.bounds[end + 1]..]
    }
}

/// Find the run of `tokens` that spells `query.selection` in the given context.
///
/// Returns `None` for an empty selection, an empty sequence, or when no occurrence
/// satisfies both the text and the context. Among several acceptable occurrences the
/// leftmost one wins; there is no scoring.
pub fn resolve<'a>(tokens: &'a [Token], query: &SelectionQuery) -> Option<Match<'a>> {
    let selection = query.selection.as_str();
    if selection.is_empty() || tokens.is_empty() {
        return None;
    }

    let joined = Joined::new(tokens);
    for start in 0..tokens.len() {
        for end in start..tokens.len() {
            let acc = joined.between(start, end);
            if acc == selection {
                if context_matches(&joined, start, end, &query.prefix, &query.suffix) {
                    tracing::debug!(start, end, "selection resolved");
                    return Some(Match {
                        span: TokenSpan { start, end },
                        tokens: &tokens[start..=end],
                    });
                }
                // Extending past a full textual match can never match again.
                break;
            }
            if acc.len() > selection.len() {
                break;
            }
        }
    }

    tracing::debug!(
        selection_bytes = selection.len(),
        tokens = tokens.len(),
        "selection not found"
    );
    None
}

/// Like [`resolve`], returning only the index range.
pub fn resolve_span(tokens: &[Token], query: &SelectionQuery) -> Option<TokenSpan> {
    resolve(tokens, query).map(|m| m.span)
}

fn context_matches(joined: &Joined, start: usize, end: usize, prefix: &str, suffix: &str) -> bool {
    if !prefix.is_empty() && !joined.before(start).ends_with(prefix) {
        return false;
    }
    if !suffix.is_empty() && !joined.after(end).starts_with(suffix) {
        return false;
    }
    true
}
