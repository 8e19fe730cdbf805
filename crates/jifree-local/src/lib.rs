//! Local implementations for jifree: selection resolution, HTML text extraction,
//! tokenizer adapters and the request pipeline (auth, rate limiting, fallback).

pub mod auth;
pub mod extract;
pub mod ratelimit;
pub mod resolve;
pub mod service;
pub mod tokenize;

pub use auth::Authenticator;
pub use extract::HtmlExtractor;
pub use ratelimit::Limiter;
pub use resolve::{resolve, resolve_span};
pub use service::{Analyzer, Envelope, Gateway};
pub use tokenize::{tokenizer_for, Checked, ScriptTokenizer};
