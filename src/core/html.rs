// src/core/html.rs
// Low-level HTML string helpers. Deliberately naive, but each target site
// renders fixed markup so string scanning is enough. Tag and attribute
// matching is ASCII case-insensitive.

/// Find the section between an opening tag (with attributes) and its closing
/// tag. Returns the HTML *inside* the opening/closing tags.
pub fn slice_between_ci<'a>(s: &'a str, open_pat: &str, close_pat: &str) -> Option<&'a str> {
    let lc = to_lower(s);
    let open_lc = to_lower(open_pat);
    let close_lc = to_lower(close_pat);

    let open_idx = lc.find(&open_lc)?;
    let after_open = s[open_idx..].find('>')? + open_idx + 1;
    let close_idx_rel = lc[after_open..].find(&close_lc)?;
    Some(&s[after_open..after_open + close_idx_rel])
}

/// Find the next complete tag block from `from` onwards: from the start of
/// the opening tag to the end of the closing tag.
pub fn next_tag_block_ci(s: &str, open_tag: &str, close_tag: &str, from: usize) -> Option<(usize, usize)> {
    let lc = to_lower(s);
    let open_lc = to_lower(open_tag);
    let close_lc = to_lower(close_tag);

    let start = lc.get(from..)?.find(&open_lc)? + from;
    let open_end = s[start..].find('>')? + start + 1;
    let end_rel = lc[open_end..].find(&close_lc)?;
    let end = open_end + end_rel + close_tag.len();
    Some((start, end))
}

/// Find the next unclosed tag (`<img …>`, `<input …>`) from `from` onwards.
/// Returns the span of the whole tag including the final `>`.
pub fn next_bare_tag_ci(s: &str, open_tag: &str, from: usize) -> Option<(usize, usize)> {
    let lc = to_lower(s);
    let open_lc = to_lower(open_tag);
    let start = lc.get(from..)?.find(&open_lc)? + from;
    let end = s[start..].find('>')? + start + 1;
    Some((start, end))
}

/// Value of an attribute inside one tag, e.g. `attr_value_ci(tag, "src")`.
/// Handles double-quoted, single-quoted and bare values.
pub fn attr_value_ci(tag: &str, attr: &str) -> Option<String> {
    let lc = to_lower(tag);
    let needle = format!("{}=", to_lower(attr));
    let mut search = 0usize;
    loop {
        let rel = lc[search..].find(&needle)?;
        let at = search + rel;
        // Must start an attribute name, not the tail of a longer one.
        let ok_before = at == 0
            || lc.as_bytes()[at - 1].is_ascii_whitespace();
        search = at + needle.len();
        if !ok_before {
            continue;
        }
        let rest = &tag[search..];
        let val = match rest.as_bytes().first()? {
            b'"' => rest[1..].split('"').next()?,
            b'\'' => rest[1..].split('\'').next()?,
            _ => rest.split(|c: char| c.is_ascii_whitespace() || c == '>').next()?,
        };
        return Some(val.to_string());
    }
}

/// Given a complete tag block like `<td …>INNER</td>`, return INNER
/// (still may contain nested tags).
pub fn inner_after_open_tag(block: &str) -> String {
    if let Some(open_end) = block.find('>') {
        if let Some(close_start) = block.rfind('<') {
            if close_start > open_end {
                return block[open_end + 1..close_start].to_string();
            }
        }
    }
    String::new()
}

/// Remove all HTML tags `<...>` from the string, then collapse whitespace.
pub fn strip_tags(s: String) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    crate::core::sanitize::normalize_ws(&out)
}

/// Fast ASCII-only lowercasing for tag/attribute matching.
pub fn to_lower(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_between_finds_inner() {
        let html = r#"<div><TABLE class=accounts><tr><td>x</td></tr></table></div>"#;
        let inner = slice_between_ci(html, "<table class=accounts", "</table>").unwrap();
        assert_eq!(inner, "<tr><td>x</td></tr>");
    }

    #[test]
    fn bare_tag_and_attr() {
        let html = r#"<p><img class=key src="/img/k3.png"><img src='/img/k7.png'></p>"#;
        let (s0, e0) = next_bare_tag_ci(html, "<img", 0).unwrap();
        assert_eq!(attr_value_ci(&html[s0..e0], "src").as_deref(), Some("/img/k3.png"));
        let (s1, e1) = next_bare_tag_ci(html, "<img", e0).unwrap();
        assert_eq!(attr_value_ci(&html[s1..e1], "SRC").as_deref(), Some("/img/k7.png"));
        assert!(next_bare_tag_ci(html, "<img", e1).is_none());
    }

    #[test]
    fn attr_value_bare_and_missing() {
        assert_eq!(attr_value_ci("<input type=hidden name=tok value=42>", "value").as_deref(), Some("42"));
        assert_eq!(attr_value_ci("<input name=tok>", "value"), None);
        // "name=" must not match inside "nickname="
        assert_eq!(attr_value_ci("<a nickname=z href=x>", "name"), None);
    }

    #[test]
    fn strip_tags_collapses_ws() {
        assert_eq!(strip_tags(s!("<b>Livret  A</b>\n <i>EUR</i>")), "Livret A EUR");
    }
}
