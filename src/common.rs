//! Small helpers shared across modules.

/// Safely slice a byte buffer, returning None on out-of-bounds ranges.
///
/// Tree-sitter byte offsets come from the parsed tree and normally fit the
/// source, but a truncated read must not panic the pipeline.
pub fn safe_slice(source: &[u8], start: usize, end: usize) -> Option<&[u8]> {
    if start > end || end > source.len() {
        return None;
    }
    Some(&source[start..end])
}

/// UTF-8 text for a tree-sitter node span, lossy on invalid sequences.
pub fn node_text(source: &[u8], start: usize, end: usize) -> Option<String> {
    safe_slice(source, start, end).map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}

/// Strip matching single, double, or backtick quotes from a literal's text.
pub fn strip_quotes(text: &str) -> &str {
    let t = text.trim();
    if t.len() >= 2 {
        let bytes = t.as_bytes();
        if (bytes[0] == b'"' && bytes[t.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[t.len() - 1] == b'\'')
            || (bytes[0] == b'`' && bytes[t.len() - 1] == b'`')
        {
            return &t[1..t.len() - 1];
        }
    }
    t
}
