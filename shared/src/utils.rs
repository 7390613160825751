/// True for empty or whitespace-only input.
pub fn is_blank(input: &str) -> bool {
    input.trim().is_empty()
}

/// Strips the query string from a URL before it reaches a log line.
/// Streaming URLs carry the access token as a query parameter.
pub fn redact_query(url: &str) -> &str {
    match url.find('?') {
        Some(pos) => &url[..pos],
        None => url,
    }
}
