//! Bionic reading transform
//!
//! Wraps the leading half of every word in an emphasis element. A word is a
//! maximal run of Unicode letters and numbers; everything between words is
//! copied through (escaped as markup text).

use std::sync::LazyLock;

use regex::Regex;

use crate::config::DEFAULT_EMPHASIS_TAG;

static WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}]+").expect("word pattern is valid")
});

/// Text transformer bound to one emphasis tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bionic {
    tag: String,
}

impl Default for Bionic {
    fn default() -> Self {
        Self::new(DEFAULT_EMPHASIS_TAG)
    }
}

impl Bionic {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Transform plain text into an inline markup fragment
    ///
    /// Not idempotent: feeding the output back in emphasizes the tag names.
    pub fn transform(&self, text: &str) -> String {
        self.transform_counted(text).0
    }

    /// Like [`Bionic::transform`], also returning the number of words emphasized
    pub fn transform_counted(&self, text: &str) -> (String, usize) {
        let mut out = String::with_capacity(text.len() + text.len() / 2);
        let mut last = 0;
        let mut words = 0;

        for m in WORD.find_iter(text) {
            html_escape::encode_text_to_string(&text[last..m.start()], &mut out);
            self.emphasize(m.as_str(), &mut out);
            last = m.end();
            words += 1;
        }
        html_escape::encode_text_to_string(&text[last..], &mut out);

        (out, words)
    }

    fn emphasize(&self, word: &str, out: &mut String) {
        let split = split_index(word);
        let (head, tail) = word.split_at(split);
        out.push('<');
        out.push_str(&self.tag);
        out.push('>');
        out.push_str(head);
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
        out.push_str(tail);
    }
}

/// Byte offset after the first `ceil(n / 2)` characters of `word`
fn split_index(word: &str) -> usize {
    let len = word.chars().count();
    let keep = len.div_ceil(2);
    word.char_indices()
        .nth(keep)
        .map(|(i, _)| i)
        .unwrap_or(word.len())
}

/// Transform with the default emphasis tag
pub fn transform(text: &str) -> String {
    Bionic::default().transform(text)
}
