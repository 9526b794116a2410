//! Configuration for the bionic converter

use serde::Deserialize;
use std::env;

/// Default emphasis tag, matching what reading apps expect for bionic books
pub const DEFAULT_EMPHASIS_TAG: &str = "b";

/// Default suffix appended to the output file stem
pub const DEFAULT_OUTPUT_SUFFIX: &str = "-bionic";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Element name wrapped around the leading half of each word
    pub emphasis_tag: String,
    /// Upper bound on content documents rewritten at the same time
    pub max_concurrency: usize,
    /// Suffix for the output file name (`book.epub` -> `book-bionic.epub`)
    pub output_suffix: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            emphasis_tag: DEFAULT_EMPHASIS_TAG.to_string(),
            max_concurrency: default_concurrency(),
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
        }
    }
}

impl Config {
    /// Build configuration from `BIONIC_*` environment variables, falling back
    /// to defaults for anything unset or unparseable
    pub fn from_env() -> Self {
        Config {
            emphasis_tag: env::var("BIONIC_EMPHASIS_TAG")
                .ok()
                .filter(|tag| is_valid_tag(tag))
                .unwrap_or_else(|| DEFAULT_EMPHASIS_TAG.to_string()),
            max_concurrency: env::var("BIONIC_MAX_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or_else(default_concurrency),
            output_suffix: env::var("BIONIC_OUTPUT_SUFFIX")
                .unwrap_or_else(|_| DEFAULT_OUTPUT_SUFFIX.to_string()),
        }
    }

    pub fn with_emphasis_tag(mut self, tag: impl Into<String>) -> Self {
        self.emphasis_tag = tag.into();
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }
}

/// An emphasis tag must be a plain element name
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ':')
        }
        _ => false,
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.emphasis_tag, "b");
        assert_eq!(config.output_suffix, "-bionic");
        assert!(config.max_concurrency >= 1);
    }

    #[test]
    fn test_valid_tags() {
        assert!(is_valid_tag("b"));
        assert!(is_valid_tag("em"));
        assert!(is_valid_tag("h:strong"));
        assert!(!is_valid_tag(""));
        assert!(!is_valid_tag("1b"));
        assert!(!is_valid_tag("b onclick"));
        assert!(!is_valid_tag("<b>"));
    }

    #[test]
    fn test_concurrency_floor() {
        let config = Config::default().with_max_concurrency(0);
        assert_eq!(config.max_concurrency, 1);
    }
}
