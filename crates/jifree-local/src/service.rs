use crate::auth::Authenticator;
use crate::extract::HtmlExtractor;
use crate::ratelimit::Limiter;
use crate::resolve::resolve;
use jifree_core::{
    AnalyzeRequest, AnalyzeResponse, Error, Result, SelectionQuery, TextExtractor, Token,
    TokenSource, Tokenizer,
};
use serde::{Deserialize, Serialize};

/// Extract → tokenize → resolve, with a bare-selection fallback.
pub struct Analyzer<E = HtmlExtractor, T = Box<dyn Tokenizer>> {
    extractor: E,
    tokenizer: T,
}

impl<E: TextExtractor, T: Tokenizer> Analyzer<E, T> {
    pub fn new(extractor: E, tokenizer: T) -> Self {
        Self {
            extractor,
            tokenizer,
        }
    }

    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Locate `query` inside the tokenized page text.
    ///
    /// When the selection cannot be placed in context, the selection alone is tokenized
    /// and returned with `source = fallback`. Its segmentation may differ from what the
    /// full document would have produced. Extractor and tokenizer errors propagate.
    pub fn analyze(&self, markup: &str, query: &SelectionQuery) -> Result<AnalyzeResponse> {
        if query.selection.is_empty() {
            tracing::debug!("empty selection");
            return self.fallback(query);
        }

        let text = self.extractor.extract_text(markup)?;
        let tokens = self.tokenizer.tokenize(&text)?;
        if let Some(m) = resolve(&tokens, query) {
            return Ok(AnalyzeResponse {
                tokens: m.to_vec(),
                source: TokenSource::Context,
            });
        }

        tracing::warn!(
            tokenizer = self.tokenizer.name(),
            text_chars = text.chars().count(),
            "selection not found in context; tokenizing selection alone"
        );
        self.fallback(query)
    }

    fn fallback(&self, query: &SelectionQuery) -> Result<AnalyzeResponse> {
        Ok(AnalyzeResponse {
            tokens: self.tokenizer.tokenize(&query.selection)?,
            source: TokenSource::Fallback,
        })
    }
}

/// Request admission in front of an [`Analyzer`]: origin, secret, rate limit, then work.
pub struct Gateway<E = HtmlExtractor, T = Box<dyn Tokenizer>> {
    analyzer: Analyzer<E, T>,
    auth: Authenticator,
    limiter: Limiter,
}

impl<E: TextExtractor, T: Tokenizer> Gateway<E, T> {
    pub fn new(analyzer: Analyzer<E, T>, auth: Authenticator, limiter: Limiter) -> Self {
        Self {
            analyzer,
            auth,
            limiter,
        }
    }

    pub fn analyzer(&self) -> &Analyzer<E, T> {
        &self.analyzer
    }

    /// Run `admit` then the analyzer.
    pub fn handle(&self, req: &AnalyzeRequest, origin: Option<&str>) -> Result<AnalyzeResponse> {
        self.admit(req, origin)?;
        self.analyzer.analyze(&req.html, &req.query())
    }

    /// Origin, secret and rate-limit checks without the analysis.
    ///
    /// An `Ok` consumes the caller's rate-limit window. Callers that analyze admitted
    /// requests in parallel call this sequentially so admission follows arrival order.
    pub fn admit(&self, req: &AnalyzeRequest, origin: Option<&str>) -> Result<()> {
        if !self.auth.validate_origin(origin) {
            tracing::warn!(origin = origin.unwrap_or(""), "rejected origin");
            return Err(Error::Forbidden("invalid origin".to_string()));
        }
        if !self.auth.validate_secret(&req.auth.shared_secret) {
            tracing::warn!(user_id = %req.auth.user_id, "rejected secret");
            return Err(Error::Unauthorized("invalid secret".to_string()));
        }
        if !self.limiter.allow(&req.auth.user_id) {
            tracing::warn!(user_id = %req.auth.user_id, "rate limited");
            return Err(Error::RateLimited(format!(
                "at most one request per {}s",
                self.limiter.ttl().as_secs()
            )));
        }
        Ok(())
    }
}

/// One request's outcome, as written by the stdio service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<Token>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TokenSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn from_result(r: Result<AnalyzeResponse>) -> Self {
        match r {
            Ok(resp) => Self {
                ok: true,
                status: 200,
                tokens: Some(resp.tokens),
                source: Some(resp.source),
                error: None,
            },
            Err(e) => Self::from_error(&e),
        }
    }

    pub fn from_error(e: &Error) -> Self {
        Self {
            ok: false,
            status: e.status(),
            tokens: None,
            source: None,
            error: Some(e.to_string()),
        }
    }
}
