use crate::config::Postprocess;
use anyhow::{Context, Result};
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone)]
pub struct Cleaner {
    normalize_unicode: bool,
    normalize_newlines: bool,
    trim_trailing_whitespace: bool,
    drop_lines: Vec<Regex>,
}

impl Cleaner {
    pub fn new(cfg: &Postprocess) -> Result<Self> {
        let drop_lines = if cfg.remove_by_regex {
            cfg.regex
                .patterns
                .iter()
                .map(|p| Regex::new(p).with_context(|| format!("postprocess regex: {p}")))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };
        Ok(Self {
            normalize_unicode: cfg.normalize_unicode,
            normalize_newlines: cfg.normalize_newlines,
            trim_trailing_whitespace: cfg.trim_trailing_whitespace,
            drop_lines,
        })
    }

    pub fn passthrough() -> Self {
        Self {
            normalize_unicode: false,
            normalize_newlines: false,
            trim_trailing_whitespace: false,
            drop_lines: Vec::new(),
        }
    }

    pub fn clean(&self, text: &str) -> String {
        let mut s = if self.normalize_newlines {
            text.replace("\r\n", "\n")
        } else {
            text.to_string()
        };

        if self.normalize_unicode {
            s = s.nfkc().collect();
        }

        if self.trim_trailing_whitespace || !self.drop_lines.is_empty() {
            s = s
                .lines()
                .filter(|l| !self.drop_lines.iter().any(|r| r.is_match(l.trim())))
                .map(|l| {
                    if self.trim_trailing_whitespace {
                        l.trim_end()
                    } else {
                        l
                    }
                })
                .collect::<Vec<_>>()
                .join("\n");
        }

        s
    }
}
