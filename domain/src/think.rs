const OPEN: &str = "<think>";
const CLOSE: &str = "</think>";

/// Turns `\u003C`, `\u003E` and `\u002F` escapes (any case) back into
/// the characters they encode. Some models emit their reasoning tags escaped.
fn unescape_tag_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("\\u") {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        let code = candidate.get(2..6).map(str::to_ascii_uppercase);
        let replacement = match code.as_deref() {
            Some("003C") => Some('<'),
            Some("003E") => Some('>'),
            Some("002F") => Some('/'),
            _ => None,
        };
        match replacement {
            Some(c) => {
                out.push(c);
                rest = &candidate[6..];
            }
            None => {
                out.push_str("\\u");
                rest = &candidate[2..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Removes every closed `<think>...</think>` section from a finished answer.
/// An opening tag that is never closed is left in place.
pub fn strip_think_tags(text: &str) -> String {
    strip(text, false)
}

/// Like [`strip_think_tags`], but an unterminated opening tag hides the rest
/// of the text: that is a response still streaming its reasoning.
pub fn strip_think_tags_partial(text: &str) -> String {
    strip(text, true)
}

fn strip(text: &str, hide_unterminated: bool) -> String {
    let text = unescape_tag_chars(text);
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        match after_open.find(CLOSE) {
            Some(end) => rest = &after_open[end + CLOSE.len()..],
            None if hide_unterminated => return out,
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}
