use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("extract failed: {0}")]
    Extract(String),
    #[error("tokenize failed: {0}")]
    Tokenize(String),
    #[error("tokenizer invariant violated: {0}")]
    Invariant(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl Error {
    /// HTTP-like status code for this failure family.
    pub fn status(&self) -> u16 {
        match self {
            Error::Extract(_) | Error::InvalidRequest(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::RateLimited(_) => 429,
            Error::Tokenize(_) | Error::Invariant(_) | Error::NotConfigured(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// One morpheme as produced by a tokenizer.
///
/// `surface` is the exact slice of the input the token covers. On the wire it is named
/// `base_form`, which is what the browser client substitutes back into the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "base_form")]
    pub surface: String,
    pub reading: String,
    pub part_of_speech: String,
}

impl Token {
    pub fn new(
        surface: impl Into<String>,
        reading: impl Into<String>,
        part_of_speech: impl Into<String>,
    ) -> Self {
        Self {
            surface: surface.into(),
            reading: reading.into(),
            part_of_speech: part_of_speech.into(),
        }
    }

    /// A token whose reading is its surface and whose part of speech is unknown.
    pub fn bare(surface: impl Into<String>) -> Self {
        let surface = surface.into();
        Self {
            reading: surface.clone(),
            surface,
            part_of_speech: String::new(),
        }
    }
}

/// Concatenate the surface forms of `tokens` in order.
pub fn surface_text(tokens: &[Token]) -> String {
    let mut out = String::with_capacity(tokens.iter().map(|t| t.surface.len()).sum());
    for t in tokens {
        out.push_str(&t.surface);
    }
    out
}

/// Check that `tokens` reconstruct `input` exactly.
pub fn ensure_lossless(input: &str, tokens: &[Token]) -> Result<()> {
    let mut rest = input;
    for (i, t) in tokens.iter().enumerate() {
        match rest.strip_prefix(t.surface.as_str()) {
            Some(r) => rest = r,
            None => {
                return Err(Error::Invariant(format!(
                    "token {i} ({:?}) does not continue the input at byte {}",
                    t.surface,
                    input.len() - rest.len()
                )))
            }
        }
    }
    if !rest.is_empty() {
        return Err(Error::Invariant(format!(
            "tokens cover {} of {} input bytes",
            input.len() - rest.len(),
            input.len()
        )));
    }
    Ok(())
}

/// What the user highlighted, plus the text immediately around it.
///
/// Empty `prefix`/`suffix` mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionQuery {
    pub selection: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
}

impl SelectionQuery {
    pub fn new(
        selection: impl Into<String>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            selection: selection.into(),
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }
}

/// Inclusive token index range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpan {
    pub start: usize,
    pub end: usize,
}

impl TokenSpan {
    /// Number of tokens covered. Never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

/// A resolved selection: a non-empty contiguous run borrowed from the source sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'a> {
    pub span: TokenSpan,
    pub tokens: &'a [Token],
}

impl Match<'_> {
    pub fn to_vec(self) -> Vec<Token> {
        self.tokens.to_vec()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Auth {
    #[serde(default)]
    pub shared_secret: String,
    #[serde(default)]
    pub user_id: String,
}

/// Body of an analyze call as sent by the browser extension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub selection: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    #[serde(default)]
    pub auth: Auth,
}

impl AnalyzeRequest {
    pub fn query(&self) -> SelectionQuery {
        SelectionQuery::new(
            self.selection.clone(),
            self.prefix.clone(),
            self.suffix.clone(),
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    /// Tokens were located inside the full-document tokenization.
    Context,
    /// Resolution failed; the selection was tokenized on its own.
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub tokens: Vec<Token>,
    pub source: TokenSource,
}

/// Text → ordered tokens whose surfaces reconstruct the text.
///
/// Implementations are shared across request handlers, so they must be usable
/// concurrently through `&self`.
pub trait Tokenizer: Send + Sync {
    fn name(&self) -> &'static str;
    fn tokenize(&self, text: &str) -> Result<Vec<Token>>;
}

/// Markup → plain text.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, markup: &str) -> Result<String>;
}

impl<T: Tokenizer + ?Sized> Tokenizer for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
        (**self).tokenize(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_serializes_surface_as_base_form() {
        let t = Token::new("東京", "トウキョウ", "名詞");
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["base_form"], "東京");
        assert_eq!(v["reading"], "トウキョウ");
        assert_eq!(v["part_of_speech"], "名詞");
        assert!(v.get("surface").is_none());
    }

    #[test]
    fn analyze_request_tolerates_missing_fields() {
        let req: AnalyzeRequest = serde_json::from_str(r#"{"selection":"is"}"#).unwrap();
        assert_eq!(req.selection, "is");
        assert!(req.html.is_empty());
        assert!(req.auth.user_id.is_empty());
        assert_eq!(req.query(), SelectionQuery::new("is", "", ""));
    }

    #[test]
    fn response_source_is_snake_case() {
        let r = AnalyzeResponse {
            tokens: vec![],
            source: TokenSource::Fallback,
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["source"], "fallback");
    }

    #[test]
    fn ensure_lossless_accepts_exact_cover() {
        let toks = vec![Token::bare("Tokyo"), Token::bare(" "), Token::bare("is")];
        assert!(ensure_lossless("Tokyo is", &toks).is_ok());
        assert_eq!(surface_text(&toks), "Tokyo is");
    }

    #[test]
    fn ensure_lossless_rejects_gaps_and_short_cover() {
        let toks = vec![Token::bare("Tokyo"), Token::bare("is")];
        let err = ensure_lossless("Tokyo is", &toks).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
        assert_eq!(err.status(), 500);

        let err = ensure_lossless("Tokyo is", &toks[..1]).unwrap_err();
        assert!(err.to_string().contains("5 of 8"), "{err}");
    }

    #[test]
    fn match_to_vec_copies_the_borrowed_run() {
        let toks = vec![Token::bare("a"), Token::bare("b"), Token::bare("c")];
        let m = Match {
            span: TokenSpan { start: 1, end: 2 },
            tokens: &toks[1..=2],
        };
        let owned = m.to_vec();
        assert_eq!(owned, vec![Token::bare("b"), Token::bare("c")]);
        // `Match` is `Copy`, so it stays usable after the by-value call.
        assert_eq!(m.span.len(), owned.len());
    }

    #[test]
    fn error_status_codes_match_request_outcomes() {
        assert_eq!(Error::Unauthorized("x".into()).status(), 401);
        assert_eq!(Error::Forbidden("x".into()).status(), 403);
        assert_eq!(Error::RateLimited("x".into()).status(), 429);
        assert_eq!(Error::Extract("x".into()).status(), 400);
    }
}
