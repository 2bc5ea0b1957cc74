//! Full-document detection.
//!
//! Both predicates are substring heuristics over raw markup, not a parse.
//! False positives: a marker inside a code sample or comment (`<pre><html></pre>`)
//! counts as a marker. False negatives: markup that escapes its own root
//! tags (`&lt;html&gt;`) does not. Tag names are matched on a word boundary,
//! so `<header>` and `<bodytext>` are never mistaken for `<head>` or `<body>`.

use std::sync::LazyLock;

use regex::Regex;

/// Case-insensitive `<!doctype` or `<html` anywhere in the text.
pub fn is_full_document(text: &str) -> bool {
    static ROOT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)<!doctype|<html\b").expect("valid regex"));

    ROOT_RE.is_match(text)
}

/// Case-insensitive `<!doctype`, `<html`, `<head` or `<body` anywhere in the text.
///
/// Stricter than [`is_full_document`]: a content fragment must carry none of these.
pub fn has_document_structure(text: &str) -> bool {
    static STRUCTURE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)<!doctype|<(?:html|head|body)\b").expect("valid regex")
    });

    STRUCTURE_RE.is_match(text)
}
