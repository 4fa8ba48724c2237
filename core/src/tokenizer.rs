use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

use crate::error::{IndexError, Result};
use crate::term::{fold, TermClass};

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_'.%$]*").expect("valid regex");
    static ref DEFAULT_STOPWORDS: HashSet<String> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().map(|w| w.to_string()).collect()
    };
}

/// Entity spans are runs of this many capitalised words, at most.
const MAX_ENTITY_WORDS: usize = 4;

/// One normalised token; its index in the returned list is its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub is_entity: bool,
}

impl Token {
    pub fn word(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_entity: false }
    }

    pub fn entity(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_entity: true }
    }
}

/// Turns raw document text into the ordered token list the index consumes.
#[derive(Debug, Clone)]
pub struct Normalizer {
    stopwords: HashSet<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self { stopwords: DEFAULT_STOPWORDS.clone() }
    }
}

impl Normalizer {
    /// Reads one stop word per line, as shipped in a corpus root.
    pub fn from_stopwords_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| IndexError::input(path, e))?;
        let stopwords = text.lines().map(str::trim).filter(|w| !w.is_empty()).map(fold).collect();
        Ok(Self { stopwords })
    }

    fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(&fold(token))
    }

    /// NFKC-normalises, extracts words with their casing intact, drops stop
    /// words, and inserts one entity token before every run of 2 to 4
    /// capitalised words.
    pub fn normalize(&self, text: &str) -> Vec<Token> {
        let normalized = text.nfkc().collect::<String>();
        let words: Vec<&str> = RE
            .find_iter(&normalized)
            .map(|m| m.as_str().trim_end_matches(&['.', '\'', '%', '$'][..]))
            .filter(|w| !w.is_empty())
            .collect();

        let mut tokens = Vec::with_capacity(words.len());
        let mut i = 0;
        while i < words.len() {
            let run = capitalised_run(&words[i..]);
            if run >= 2 {
                let entity = words[i..i + run].join(" ").to_uppercase();
                tokens.push(Token::entity(entity));
            }
            let end = i + run.max(1);
            for word in &words[i..end] {
                if !self.is_stopword(word) {
                    tokens.push(Token::word(*word));
                }
            }
            i = end;
        }
        tokens
    }
}

fn capitalised_run(words: &[&str]) -> usize {
    words
        .iter()
        .take(MAX_ENTITY_WORDS)
        .take_while(|w| w.chars().next().map_or(false, |c| c.is_uppercase()))
        .count()
}

/// Pure token-to-token stemming function applied when a stemmed index is built.
pub trait Stem: Send + Sync {
    fn stem(&self, token: &str) -> String;
}

/// Identity stemmer for unstemmed builds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStem;

impl Stem for NoStem {
    fn stem(&self, token: &str) -> String {
        token.to_string()
    }
}

/// English Porter/Snowball stemming that keeps the token's casing shape.
pub struct PorterStemmer {
    inner: Stemmer,
}

impl Default for PorterStemmer {
    fn default() -> Self {
        Self { inner: Stemmer::create(Algorithm::English) }
    }
}

impl Stem for PorterStemmer {
    fn stem(&self, token: &str) -> String {
        if matches!(TermClass::of(token), TermClass::Digit) {
            return token.to_string();
        }
        let lower = fold(token);
        let stemmed = self.inner.stem(&lower).into_owned();
        if token.len() > 1 && token.chars().all(|c| !c.is_lowercase()) {
            stemmed.to_uppercase()
        } else if token.chars().next().map_or(false, char::is_uppercase) {
            let mut chars = stemmed.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => stemmed,
            }
        } else {
            stemmed
        }
    }
}

/// Applies the stemmer to word tokens; entities pass through untouched.
pub fn stem_tokens(tokens: Vec<Token>, stemmer: &dyn Stem) -> Vec<Token> {
    tokens
        .into_iter()
        .map(|t| if t.is_entity { t } else { Token::word(stemmer.stem(&t.text)) })
        .collect()
}

/// Normalises and optionally stems a free-text query into lookup terms.
pub fn parse_query(normalizer: &Normalizer, text: &str, stem: bool) -> Vec<String> {
    let tokens = normalizer.normalize(text);
    let tokens = if stem { stem_tokens(tokens, &PorterStemmer::default()) } else { tokens };
    tokens.into_iter().map(|t| t.text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn basic_normalize() {
        let t = Normalizer::default().normalize("the market, a Market!");
        assert_eq!(texts(&t), vec!["market", "Market"]);
        assert!(t.iter().all(|t| !t.is_entity));
    }

    #[test]
    fn capitalised_runs_become_entities() {
        let t = Normalizer::default().normalize("visited New York City yesterday");
        assert_eq!(texts(&t), vec!["visited", "NEW YORK CITY", "New", "York", "City", "yesterday"]);
        assert!(t[1].is_entity);
    }

    #[test]
    fn porter_keeps_casing_shape() {
        let s = PorterStemmer::default();
        assert_eq!(s.stem("running"), "run");
        assert_eq!(s.stem("Running"), "Run");
        assert_eq!(s.stem("RUNNING"), "RUN");
        assert_eq!(s.stem("1990s"), "1990s");
    }
}
