//! Deep-link generation
//!
//! Substitutes parameters into a URI template such as
//! `foodie://search?q={query}`. Values are percent-encoded. When any
//! placeholder has no non-empty value, or a brace is left unbalanced, no URI is
//! produced at all so the caller falls back to GUI automation instead of
//! opening a malformed link.

use std::collections::HashMap;

/// Placeholder names in template order, or `None` if the braces are unbalanced
pub fn placeholders(template: &str) -> Option<Vec<String>> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        if rest[..open].contains('}') {
            return None;
        }
        let after = &rest[open + 1..];
        let close = after.find('}')?;
        let name = &after[..close];
        if name.is_empty() || name.contains('{') {
            return None;
        }
        names.push(name.to_string());
        rest = &after[close + 1..];
    }
    if rest.contains('}') {
        return None;
    }
    Some(names)
}

/// Render `template` with `params`, or `None` when a parameter is missing
pub fn render(template: &str, params: &HashMap<String, String>) -> Option<String> {
    let names = placeholders(template)?;
    let mut uri = template.to_string();
    for name in names {
        let value = params.get(&name).map(|v| v.trim()).filter(|v| !v.is_empty())?;
        uri = uri.replace(&format!("{{{}}}", name), &encode_component(value));
    }
    Some(uri)
}

/// Percent-encode everything outside the RFC 3986 unreserved set
fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_encodes_values() {
        let uri = render(
            "foodie://search?q={query}",
            &params(&[("query", "burger & fries")]),
        );
        assert_eq!(uri.as_deref(), Some("foodie://search?q=burger%20%26%20fries"));
    }

    #[test]
    fn test_repeated_and_multiple_placeholders() {
        let uri = render(
            "maps://route?from={origin}&to={dest}&label={dest}",
            &params(&[("origin", "home"), ("dest", "work")]),
        );
        assert_eq!(
            uri.as_deref(),
            Some("maps://route?from=home&to=work&label=work")
        );
    }

    #[test]
    fn test_missing_parameter_yields_nothing() {
        assert_eq!(render("foodie://store/{store_id}", &params(&[])), None);
        assert_eq!(
            render("foodie://store/{store_id}", &params(&[("store_id", "  ")])),
            None
        );
    }

    #[test]
    fn test_template_without_placeholders() {
        assert_eq!(
            render("settings://wifi", &params(&[])).as_deref(),
            Some("settings://wifi")
        );
    }

    #[test]
    fn test_unbalanced_braces_yield_nothing() {
        assert_eq!(placeholders("a://{x"), None);
        assert_eq!(placeholders("a://x}"), None);
        assert_eq!(render("a://{}", &params(&[])), None);
    }

    #[test]
    fn test_non_ascii_is_utf8_encoded() {
        assert_eq!(encode_component("café"), "caf%C3%A9");
    }
}
