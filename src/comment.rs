//! Formatting of failure traces into result comments.
//!
//! The service renders comments as markdown, so the trace is indented as a
//! code block. Only the tail of a long trace is kept: the assertion that
//! failed is usually at the end.

/// Default maximum number of trace characters kept in a comment.
pub const DEFAULT_COMMENT_LIMIT: usize = 4000;

/// First line of every formatted comment.
pub const COMMENT_HEADER: &str = "# Pytest result: #\n";

/// Inserted after the header when the trace was cut.
pub const TRUNCATION_NOTICE: &str = "Log truncated\n...\n";

const INDENT: &str = "    ";

/// Formats `text` as a result comment keeping at most `limit` characters.
///
/// # Example
///
/// ```
/// use railpost::comment::format_comment;
///
/// let comment = format_comment("line one\nline two", 4000);
/// assert_eq!(comment, "# Pytest result: #\n    line one\n    line two");
/// ```
pub fn format_comment(text: &str, limit: usize) -> String {
    let total = text.chars().count();
    let truncated = total > limit;
    let body = if truncated {
        tail_chars(text, limit)
    } else {
        text
    };

    let mut comment = String::with_capacity(COMMENT_HEADER.len() + body.len() + 64);
    comment.push_str(COMMENT_HEADER);
    if truncated {
        comment.push_str(TRUNCATION_NOTICE);
    }
    comment.push_str(INDENT);
    comment.push_str(&body.replace('\n', "\n    "));
    comment
}

/// Returns the last `n` characters of `text`.
fn tail_chars(text: &str, n: usize) -> &str {
    let skip = text.chars().count().saturating_sub(n);
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}
