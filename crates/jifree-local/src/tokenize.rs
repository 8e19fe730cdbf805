//! Tokenizer adapters.
//!
//! - [`ScriptTokenizer`]: dictionary-free segmentation by script class. Always available.
//! - `VibratoTokenizer` (feature `vibrato`): IPADIC-style morphological analysis.
//! - [`Checked`]: wraps any tokenizer and rejects output that does not reconstruct the input.

use jifree_core::{ensure_lossless, Result, Token, Tokenizer};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptClass {
    Kanji,
    Hiragana,
    Katakana,
    Alnum,
    Space,
    Symbol,
}

impl ScriptClass {
    pub fn of(ch: char) -> Self {
        match ch {
            '\u{3005}' | '\u{3006}' | '\u{3400}'..='\u{4DBF}' | '\u{4E00}'..='\u{9FFF}'
            | '\u{F900}'..='\u{FAFF}' => ScriptClass::Kanji,
            '\u{3041}'..='\u{309F}' => ScriptClass::Hiragana,
            '\u{30A0}'..='\u{30FF}' | '\u{31F0}'..='\u{31FF}' | '\u{FF66}'..='\u{FF9F}' => {
                ScriptClass::Katakana
            }
            c if c.is_whitespace() => ScriptClass::Space,
            c if c.is_alphanumeric() => ScriptClass::Alnum,
            _ => ScriptClass::Symbol,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScriptClass::Kanji => "kanji",
            ScriptClass::Hiragana => "hiragana",
            ScriptClass::Katakana => "katakana",
            ScriptClass::Alnum => "alnum",
            ScriptClass::Space => "space",
            ScriptClass::Symbol => "symbol",
        }
    }
}

/// Fold hiragana to katakana; everything else is left alone.
pub fn to_katakana(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{3041}'..='\u{3096}' | '\u{309D}' | '\u{309E}' => {
                char::from_u32(c as u32 + 0x60).unwrap_or(c)
            }
            _ => c,
        })
        .collect()
}

/// Splits text into maximal runs of one script class.
///
/// Symbols are emitted one character per token. The part of speech is the script
/// class name and the reading is the katakana form of the surface.
#[derive(Debug, Clone, Default)]
pub struct ScriptTokenizer;

impl ScriptTokenizer {
    pub fn new() -> Self {
        Self
    }

    fn push(out: &mut Vec<Token>, surface: &str, class: ScriptClass) {
        out.push(Token::new(surface, to_katakana(surface), class.as_str()));
    }
}

impl Tokenizer for ScriptTokenizer {
    fn name(&self) -> &'static str {
        "script"
    }

    fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        let mut run: Option<(usize, ScriptClass)> = None;
        for (i, ch) in text.char_indices() {
            let class = ScriptClass::of(ch);
            if let Some((start, cur)) = run {
                if cur != class || cur == ScriptClass::Symbol {
                    Self::push(&mut out, &text[start..i], cur);
                    run = Some((i, class));
                }
            } else {
                run = Some((i, class));
            }
        }
        if let Some((start, cur)) = run {
            Self::push(&mut out, &text[start..], cur);
        }
        Ok(out)
    }
}

/// Enforces that every tokenization covers its input exactly.
#[derive(Debug, Clone)]
pub struct Checked<T>(pub T);

impl<T: Tokenizer> Tokenizer for Checked<T> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
        let tokens = self.0.tokenize(text)?;
        ensure_lossless(text, &tokens)?;
        Ok(tokens)
    }
}

/// Build a token from an IPADIC feature string (`品詞,細分類1,...,読み,発音`).
///
/// Field 0 is the coarse part of speech and field 7 the katakana reading. Unknown
/// words carry fewer fields (or `*`); their reading is the surface itself.
pub fn token_from_ipadic(surface: &str, feature: &str) -> Token {
    let fields: Vec<&str> = feature.split(',').collect();
    let pos = fields.first().copied().unwrap_or("");
    let reading = match fields.get(7) {
        Some(r) if !r.is_empty() && *r != "*" => r,
        _ => surface,
    };
    Token::new(surface, reading, pos)
}

#[cfg(feature = "vibrato")]
pub use dictionary::VibratoTokenizer;

#[cfg(feature = "vibrato")]
mod dictionary {
    use super::token_from_ipadic;
    use jifree_core::{Error, Result, Token, Tokenizer};
    use std::fs::File;
    use std::io::BufReader;
    use std::path::Path;

    /// Morphological analysis backed by a compiled system dictionary.
    ///
    /// One dictionary is shared by all callers; each call gets its own worker.
    pub struct VibratoTokenizer {
        inner: vibrato::Tokenizer,
    }

    impl VibratoTokenizer {
        pub fn from_path(path: &Path) -> Result<Self> {
            let file = File::open(path).map_err(|e| {
                Error::NotConfigured(format!("open dictionary {}: {e}", path.display()))
            })?;
            let is_zstd = path.extension().is_some_and(|e| e == "zst");
            let dict = if is_zstd {
                let decoder = zstd::Decoder::new(file).map_err(|e| {
                    Error::NotConfigured(format!("zstd dictionary {}: {e}", path.display()))
                })?;
                vibrato::Dictionary::read(decoder)
            } else {
                vibrato::Dictionary::read(BufReader::new(file))
            }
            .map_err(|e| Error::NotConfigured(format!("read dictionary {}: {e}", path.display())))?;
            tracing::info!(path = %path.display(), "dictionary loaded");
            Ok(Self {
                inner: vibrato::Tokenizer::new(dict),
            })
        }
    }

    impl Tokenizer for VibratoTokenizer {
        fn name(&self) -> &'static str {
            "vibrato"
        }

        fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
            if text.is_empty() {
                return Ok(Vec::new());
            }
            let mut worker = self.inner.new_worker();
            worker.reset_sentence(text);
            worker.tokenize();
            Ok(worker
                .token_iter()
                .map(|t| token_from_ipadic(t.surface(), t.feature()))
                .collect())
        }
    }
}

/// Pick the tokenizer for this process.
///
/// With a dictionary path, the dictionary-backed tokenizer is used (requires the
/// `vibrato` feature); otherwise the script tokenizer. Either way the result is
/// wrapped in [`Checked`].
pub fn tokenizer_for(dict: Option<&Path>) -> Result<Box<dyn Tokenizer>> {
    match dict {
        None => Ok(Box::new(Checked(ScriptTokenizer::new()))),
        #[cfg(feature = "vibrato")]
        Some(path) => Ok(Box::new(Checked(VibratoTokenizer::from_path(path)?))),
        #[cfg(not(feature = "vibrato"))]
        Some(path) => Err(jifree_core::Error::NotConfigured(format!(
            "dictionary {} given but built without the `vibrato` feature",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jifree_core::{surface_text, Error};
    use proptest::prelude::*;

    fn surfaces(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.surface.as_str()).collect()
    }

    #[test]
    fn splits_on_script_changes() {
        let toks = ScriptTokenizer.tokenize("東京はビッグな city です。").unwrap();
        assert_eq!(
            surfaces(&toks),
            vec!["東京", "は", "ビッグ", "な", " ", "city", " ", "です", "。"]
        );
        assert_eq!(toks[0].part_of_speech, "kanji");
        assert_eq!(toks[2].part_of_speech, "katakana");
        assert_eq!(toks[5].part_of_speech, "alnum");
        assert_eq!(toks[8].part_of_speech, "symbol");
    }

    #[test]
    fn symbols_are_single_character_tokens() {
        let toks = ScriptTokenizer.tokenize("!?「」").unwrap();
        assert_eq!(surfaces(&toks), vec!["!", "?", "「", "」"]);
    }

    #[test]
    fn hiragana_reading_is_katakana() {
        let toks = ScriptTokenizer.tokenize("です").unwrap();
        assert_eq!(toks[0].reading, "デス");
        assert_eq!(to_katakana("ゝあa東"), "ヽアa東");
    }

    #[test]
    fn empty_text_has_no_tokens() {
        assert!(ScriptTokenizer.tokenize("").unwrap().is_empty());
    }

    #[test]
    fn ipadic_features_map_to_pos_and_reading() {
        let t = token_from_ipadic("東京", "名詞,固有名詞,地域,一般,*,*,東京,トウキョウ,トーキョー");
        assert_eq!(t, Token::new("東京", "トウキョウ", "名詞"));

        // Unknown words have seven fields and no reading.
        let t = token_from_ipadic("ジフリー", "名詞,一般,*,*,*,*,*");
        assert_eq!(t.reading, "ジフリー");
        assert_eq!(t.part_of_speech, "名詞");

        let t = token_from_ipadic("x", "");
        assert_eq!(t.reading, "x");
        assert_eq!(t.part_of_speech, "");
    }

    struct Lossy;

    impl Tokenizer for Lossy {
        fn name(&self) -> &'static str {
            "lossy"
        }

        fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
            Ok(text.split_whitespace().map(Token::bare).collect())
        }
    }

    #[test]
    fn checked_rejects_divergent_output() {
        let err = Checked(Lossy).tokenize("a b").unwrap_err();
        assert!(matches!(err, Error::Invariant(_)), "{err}");
        assert!(Checked(Lossy).tokenize("ab").is_ok());
        assert_eq!(Checked(Lossy).name(), "lossy");
    }

    #[test]
    fn tokenizer_for_defaults_to_script() {
        let t = tokenizer_for(None).unwrap();
        assert_eq!(t.name(), "script");
    }

    #[cfg(not(feature = "vibrato"))]
    #[test]
    fn tokenizer_for_dictionary_requires_feature() {
        let err = tokenizer_for(Some(Path::new("/nonexistent/ipadic.dic")))
            .err()
            .expect("error");
        assert!(matches!(err, Error::NotConfigured(_)));
    }

    #[cfg(feature = "vibrato")]
    #[test]
    fn tokenizer_for_missing_dictionary_is_not_configured() {
        let err = tokenizer_for(Some(Path::new("/nonexistent/ipadic.dic")))
            .err()
            .expect("error");
        assert!(matches!(err, Error::NotConfigured(_)), "{err}");
        assert!(err.to_string().contains("open dictionary"), "{err}");
    }

    proptest! {
        #[test]
        fn script_tokenizer_is_lossless(text in "\\PC{0,64}") {
            let toks = ScriptTokenizer.tokenize(&text).unwrap();
            prop_assert_eq!(surface_text(&toks), text.clone());
            prop_assert!(toks.iter().all(|t| !t.surface.is_empty()));
        }
    }
}
