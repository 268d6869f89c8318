//! Redis-style glob patterns (`*`, `?`, `[abc]`, `[^a-z]`, `\x`) for the
//! in-memory store's `SCAN ... MATCH` emulation.

use regex::Regex;

use super::{CacheError, CacheResult};

/// A compiled glob pattern
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compile a glob. An unterminated `[` is matched literally, as Redis does.
    pub fn new(glob: &str) -> CacheResult<Self> {
        let regex = Regex::new(&glob_to_regex(glob)).map_err(|e| CacheError::InvalidKey {
            message: format!("invalid pattern '{}': {}", glob, e),
        })?;

        Ok(Self {
            source: glob.to_string(),
            regex,
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2 + 8);
    out.push_str("(?s)^");

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                push_literal(&mut out, chars[i]);
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push('[');
                    let mut j = i + 1;
                    if chars.get(j) == Some(&'^') {
                        out.push('^');
                        j += 1;
                    }
                    while j < end {
                        match chars[j] {
                            '\\' if j + 1 < end => {
                                j += 1;
                                push_class_literal(&mut out, chars[j]);
                            }
                            '-' => out.push('-'),
                            c => push_class_literal(&mut out, c),
                        }
                        j += 1;
                    }
                    out.push(']');
                    i = end;
                }
                None => push_literal(&mut out, '['),
            },
            c => push_literal(&mut out, c),
        }
        i += 1;
    }

    out.push('$');
    out
}

/// Index of the `]` closing the class opened at `start`
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if chars.get(j) == Some(&'^') {
        j += 1;
    }
    // an empty class never closes on the very next char
    let first = j;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            ']' if j > first => return Some(j),
            _ => j += 1,
        }
    }
    None
}

fn push_literal(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}

fn push_class_literal(out: &mut String, c: char) {
    if matches!(c, '[' | ']' | '\\' | '^' | '&' | '~') {
        out.push('\\');
    }
    out.push(c);
}
