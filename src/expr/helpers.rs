//! Pattern helpers for LIKE comparisons.

use std::num::NonZeroUsize;

use lru::LruCache;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

const PATTERN_CACHE_SIZE: usize = 256;

/// Compiled LIKE patterns, keyed by the original SQL pattern
static LIKE_PATTERNS: Lazy<Mutex<LruCache<String, Regex>>> = Lazy::new(|| {
    Mutex::new(LruCache::new(
        NonZeroUsize::new(PATTERN_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
    ))
});

/// Translate a SQL LIKE pattern into an anchored, case-insensitive regex source.
///
/// `%` matches any run of characters, `_` exactly one; everything else is literal.
pub fn like_to_regex(pattern: &str) -> String {
    let mut regex_pattern = String::with_capacity(pattern.len() + 8);
    regex_pattern.push_str("(?is)^");
    for c in pattern.chars() {
        match c {
            '%' => regex_pattern.push_str(".*"),
            '_' => regex_pattern.push('.'),
            _ => regex_pattern.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    regex_pattern.push('$');
    regex_pattern
}

/// Match `text` against a SQL LIKE pattern.
///
/// Returns `Err` with a message when the pattern is longer than `max_len` characters or
/// fails to compile.
pub fn like_matches(text: &str, pattern: &str, max_len: usize) -> Result<bool, String> {
    if pattern.chars().count() > max_len {
        return Err(format!("LIKE pattern too long (max {} chars)", max_len));
    }

    if let Some(re) = LIKE_PATTERNS.lock().get(pattern) {
        return Ok(re.is_match(text));
    }

    let re = Regex::new(&like_to_regex(pattern)).map_err(|e| e.to_string())?;
    let is_match = re.is_match(text);
    LIKE_PATTERNS.lock().put(pattern.to_string(), re);
    Ok(is_match)
}
