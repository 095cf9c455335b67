//! Topic routing-key patterns.
//!
//! Routing keys are dot-separated words. Binding patterns may use `*` for
//! exactly one word and `#` for zero or more words.

use tracing::warn;

/// Separator between words of a routing key.
pub const WORD_SEPARATOR: char = '.';

/// Separator between patterns in a subscriber's `-r` argument.
pub const PATTERN_LIST_SEPARATOR: char = ',';

/// Check if a routing key matches a binding pattern under topic-exchange rules.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split(WORD_SEPARATOR).collect();
    let key: Vec<&str> = routing_key.split(WORD_SEPARATOR).collect();
    words_match(&pattern, &key)
}

fn words_match(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| words_match(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && words_match(rest, &key[1..]),
        Some((word, rest)) => key.first() == Some(word) && words_match(rest, &key[1..]),
    }
}

/// Split a comma-separated pattern list.
///
/// Segments are kept verbatim: no trimming, and empty segments are returned
/// as empty patterns. Suspicious segments are logged.
pub fn split_patterns(arg: &str) -> Vec<String> {
    arg.split(PATTERN_LIST_SEPARATOR)
        .map(|segment| {
            if segment.is_empty() {
                warn!(patterns = %arg, "Empty routing-key pattern will be bound as-is");
            } else if segment.trim() != segment {
                warn!(pattern = ?segment, "Routing-key pattern has surrounding whitespace");
            }
            segment.to_string()
        })
        .collect()
}
