// src/utils/html.rs

/// Sanitizes user-supplied HTML (quiz descriptions, question bodies, MCQ
/// options) with ammonia's whitelist. Script tags are dropped with their
/// contents.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
