// src/text.rs
//! Text primitives shared by the matcher and the aggregator: `\w+` word
//! tokenizer, sentence splitter seam, and the default campaign text cleaner.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

// \w covers [A-Za-z0-9_]; (?u) enables Unicode
static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)\w+").expect("word regex"));

static RE_LINK: Lazy<Regex> = Lazy::new(|| {
    let mut pattern = String::from(r"http\S+|ftp\S+|www\.\S+");
    for ending in [".com", ".org", ".edu", ".net", ".gov", ".eu", ".us"] {
        pattern.push_str(r"|\S+");
        pattern.push_str(&regex::escape(ending));
    }
    Regex::new(&pattern).expect("hyperlink regex")
});

// Punctuation glued to the next letter ("done.Next") gets a space inserted.
static RE_GLUED_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([.!?,])([^\W\d])").expect("glued punctuation regex"));

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Replacement written in place of removed hyperlinks.
pub const LINK_PLACEHOLDER: &str = "<LINK>";

/// Iterate the `\w+` words of `text`.
pub fn words(text: &str) -> impl Iterator<Item = &str> + '_ {
    RE_WORD.find_iter(text).map(|m| m.as_str())
}

/// Number of `\w+` words; the denominator of salience.
pub fn word_count(text: &str) -> usize {
    RE_WORD.find_iter(text).count()
}

/// One sentence of a document, borrowed from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentence<'a> {
    pub text: &'a str,
    /// Byte offset of `text` inside the document.
    pub byte_start: usize,
}

/// Sentence boundary detection. Implementations must return sentences in
/// document order, non-overlapping, with surrounding whitespace trimmed.
pub trait SentenceSplitter: Send + Sync {
    fn split<'a>(&self, text: &'a str) -> Vec<Sentence<'a>>;

    fn count(&self, text: &str) -> usize {
        self.split(text).len()
    }
}

/// UAX #29 sentence boundaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeSentenceSplitter;

impl SentenceSplitter for UnicodeSentenceSplitter {
    fn split<'a>(&self, text: &'a str) -> Vec<Sentence<'a>> {
        text.split_sentence_bound_indices()
            .filter_map(|(start, raw)| {
                let lead = raw.len() - raw.trim_start().len();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Sentence {
                        text: trimmed,
                        byte_start: start + lead,
                    })
                }
            })
            .collect()
    }
}

/// Text preprocessing applied before matching. Entity redaction lives outside
/// this crate; plug it in by implementing this trait.
pub trait TextCleaner: Send + Sync {
    fn clean(&self, text: &str) -> String;
}

/// Default cleaner:
/// 1) HTML entity decode
/// 2) hyperlinks → `<LINK>`
/// 3) space after `. ! ? ,` when glued to a following letter
/// 4) collapse whitespace, trim
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicCleaner;

impl TextCleaner for BasicCleaner {
    fn clean(&self, text: &str) -> String {
        let decoded = html_escape::decode_html_entities(text);
        let out = RE_LINK.replace_all(&decoded, LINK_PLACEHOLDER);
        let out = RE_GLUED_PUNCT.replace_all(&out, "$1 $2");
        let out = RE_WS.replace_all(&out, " ");
        out.trim().to_string()
    }
}
