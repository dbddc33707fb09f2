//! Fuzzy subsequence scorer.
//!
//! Single source of truth for "how similar are these two strings": series
//! detection and both pipeline backends all score through [`score`].

/// Score `needle` against `haystack`, returning a similarity in [0, 1].
///
/// The haystack is scanned left to right, greedily consuming needle
/// characters in order (classic subsequence test). With the full needle
/// consumed the result blends completion with match density; a partial
/// consumption is penalized to `completion * 0.7` so ordered-but-sparse
/// candidates still rank above random text but below any full match.
///
/// Pure function, O(|haystack|), no allocation beyond case folding.
pub fn score(needle: &str, haystack: &str, case_sensitive: bool) -> f64 {
    if needle.is_empty() || haystack.is_empty() {
        return 0.0;
    }

    let needle_folded;
    let haystack_folded;
    let (needle, haystack) = if case_sensitive {
        (needle, haystack)
    } else {
        needle_folded = needle.to_lowercase();
        haystack_folded = haystack.to_lowercase();
        (needle_folded.as_str(), haystack_folded.as_str())
    };

    let needle_chars: Vec<char> = needle.chars().collect();
    let mut consumed = 0usize;
    let mut matches = 0usize;
    let mut haystack_len = 0usize;

    for c in haystack.chars() {
        haystack_len += 1;
        if consumed < needle_chars.len() && c == needle_chars[consumed] {
            consumed += 1;
            matches += 1;
        }
    }

    let completion = consumed as f64 / needle_chars.len() as f64;
    if consumed == needle_chars.len() {
        let density = matches as f64 / haystack_len as f64;
        (completion + density) / 2.0
    } else {
        completion * 0.7
    }
}
