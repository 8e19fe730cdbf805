use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use jifree_core::{
    AnalyzeRequest, Error as JifreeError, SelectionQuery, TextExtractor, Token, Tokenizer,
};
use jifree_local::{
    ratelimit, tokenizer_for, Analyzer, Authenticator, Envelope, Gateway, HtmlExtractor, Limiter,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

#[derive(Parser, Debug)]
#[command(name = "jifree")]
#[command(about = "Resolve a highlighted text fragment to its morphological tokens", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract page text, tokenize it, and locate the selection in context (json).
    Analyze(AnalyzeCmd),
    /// Tokenize plain text (json).
    Tokenize(TokenizeCmd),
    /// Extract plain text from HTML.
    Extract(ExtractCmd),
    /// Serve analyze requests as JSON lines on stdin/stdout.
    ///
    /// Each input line is one request body (`html`, `selection`, `prefix`, `suffix`,
    /// `auth`). Each output line is an envelope with `ok`, `status` and either
    /// `tokens`/`source` or `error`, in input order.
    ///
    /// Admission (origin, secret, rate limit) runs one line at a time in input order,
    /// so a user's first request is the one admitted even when analysis runs in
    /// parallel.
    ServeStdio(ServeStdioCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct TokenizerArgs {
    /// Compiled system dictionary (IPADIC format; `.zst` is decompressed).
    ///
    /// Requires the `vibrato` build feature. Without it, text is split by script class.
    #[arg(long, env = "JIFREE_DICT")]
    dict: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct AnalyzeCmd {
    /// HTML file (`-` for stdin).
    #[arg(long)]
    html_file: PathBuf,
    /// The highlighted text.
    #[arg(long)]
    selection: String,
    /// Text immediately before the selection.
    #[arg(long, default_value = "")]
    prefix: String,
    /// Text immediately after the selection.
    #[arg(long, default_value = "")]
    suffix: String,
    #[command(flatten)]
    tokenizer: TokenizerArgs,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct TokenizeCmd {
    /// Text to tokenize.
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,
    /// File to tokenize (`-` for stdin). Used when --text is absent.
    #[arg(long)]
    file: Option<PathBuf>,
    #[command(flatten)]
    tokenizer: TokenizerArgs,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct ExtractCmd {
    /// HTML file (`-` for stdin).
    #[arg(long)]
    html_file: PathBuf,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct ServeStdioCmd {
    /// Origin the requests are attributed to (checked against JIFREE_ALLOWED_ORIGIN).
    #[arg(long)]
    origin: Option<String>,
    /// Requests analyzed in parallel. Admission and output follow input order.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
    /// Per-user cooldown in seconds (default: JIFREE_RATE_LIMIT_TTL_S or 10).
    #[arg(long)]
    rate_limit_ttl_s: Option<u64>,
    #[command(flatten)]
    tokenizer: TokenizerArgs,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn init_tracing() {
    // stdout carries JSON only; diagnostics go to stderr.
    let filter = std::env::var("JIFREE_LOG")
        .ok()
        .and_then(|s| tracing_subscriber::EnvFilter::try_new(s).ok())
        .or_else(|| tracing_subscriber::EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Opt-in `KEY=VALUE` loader (`JIFREE_ENV_FILE`). Never overrides the process env.
fn load_env_file() {
    let Ok(p) = std::env::var("JIFREE_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v.trim());
        }
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut s = String::new();
        std::io::stdin()
            .read_to_string(&mut s)
            .context("read stdin")?;
        return Ok(s);
    }
    std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn print_tokens_text(tokens: &[Token]) {
    for t in tokens {
        println!("{}\t{}\t{}", t.surface, t.reading, t.part_of_speech);
    }
}

/// Parse and admit one request line. `Err` is the envelope to write instead of analyzing.
fn admit_line(
    gateway: &Gateway,
    line: &str,
    origin: Option<&str>,
) -> std::result::Result<AnalyzeRequest, Envelope> {
    let req = serde_json::from_str::<AnalyzeRequest>(line)
        .map_err(|e| Envelope::from_error(&JifreeError::InvalidRequest(e.to_string())))?;
    gateway
        .admit(&req, origin)
        .map_err(|e| Envelope::from_error(&e))?;
    Ok(req)
}

async fn serve_stdio(args: ServeStdioCmd) -> Result<()> {
    let tokenizer = tokenizer_for(args.tokenizer.dict.as_deref())?;
    let ttl = args
        .rate_limit_ttl_s
        .map(Duration::from_secs)
        .unwrap_or_else(ratelimit::ttl_from_env);
    let auth = Authenticator::from_env();
    if !auth.has_secret() {
        tracing::warn!("JIFREE_SHARED_SECRET is not set; every request will be rejected");
    }
    tracing::info!(
        tokenizer = tokenizer.name(),
        ttl_s = ttl.as_secs(),
        concurrency = args.concurrency,
        "serving on stdio"
    );
    let gateway = Arc::new(Gateway::new(
        Analyzer::new(HtmlExtractor::new(), tokenizer),
        auth,
        Limiter::new(ttl),
    ));
    let origin = args.origin;

    let lines = futures::stream::unfold(
        tokio::io::BufReader::new(tokio::io::stdin()).lines(),
        |mut lines| async move {
            match lines.next_line().await {
                Ok(Some(line)) => Some((line, lines)),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    None
                }
            }
        },
    );
    let envelopes = lines
        .filter(|line| futures::future::ready(!line.trim().is_empty()))
        .map(|line| {
            // `buffered` pulls lines in order, so admission here is sequential.
            let admitted = admit_line(&gateway, &line, origin.as_deref());
            let gateway = Arc::clone(&gateway);
            async move {
                let req = match admitted {
                    Ok(req) => req,
                    Err(env) => return env,
                };
                tokio::task::spawn_blocking(move || {
                    Envelope::from_result(gateway.analyzer().analyze(&req.html, &req.query()))
                })
                .await
                .unwrap_or_else(|e| {
                    Envelope::from_error(&JifreeError::Tokenize(format!("worker failed: {e}")))
                })
            }
        })
        .buffered(args.concurrency.max(1));
    let mut envelopes = std::pin::pin!(envelopes);

    let mut stdout = tokio::io::stdout();
    while let Some(env) = envelopes.next().await {
        let mut s = serde_json::to_string(&env)?;
        s.push('\n');
        stdout.write_all(s.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => {
            let html = read_input(&args.html_file)?;
            let tokenizer = tokenizer_for(args.tokenizer.dict.as_deref())?;
            let analyzer = Analyzer::new(HtmlExtractor::new(), tokenizer);
            let query = SelectionQuery::new(args.selection, args.prefix, args.suffix);
            let resp = analyzer.analyze(&html, &query)?;
            match args.output.to_ascii_lowercase().as_str() {
                "text" => print_tokens_text(&resp.tokens),
                _ => println!("{}", serde_json::to_string(&resp)?),
            }
        }
        Commands::Tokenize(args) => {
            let text = match (args.text, args.file) {
                (Some(t), _) => t,
                (None, Some(p)) => read_input(&p)?,
                (None, None) => read_input(Path::new("-"))?,
            };
            let tokenizer = tokenizer_for(args.tokenizer.dict.as_deref())?;
            let tokens = tokenizer.tokenize(&text)?;
            match args.output.to_ascii_lowercase().as_str() {
                "text" => print_tokens_text(&tokens),
                _ => {
                    let v = serde_json::json!({
                        "tokenizer": tokenizer.name(),
                        "tokens": tokens,
                    });
                    println!("{}", v);
                }
            }
        }
        Commands::Extract(args) => {
            let html = read_input(&args.html_file)?;
            let text = HtmlExtractor::new().extract_text(&html)?;
            match args.output.to_ascii_lowercase().as_str() {
                "text" => print!("{text}"),
                _ => {
                    let v = serde_json::json!({
                        "text": text,
                        "text_chars": text.chars().count(),
                    });
                    println!("{}", v);
                }
            }
        }
        Commands::ServeStdio(args) => serve_stdio(args).await?,
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "jifree",
                "version": env!("CARGO_PKG_VERSION"),
                "features": {
                    "vibrato": cfg!(feature = "vibrato"),
                },
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("jifree {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{}", v),
            }
        }
    }
    Ok(())
}
