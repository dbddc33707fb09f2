//! Series detection and path-template inference.
//!
//! References like "CW-1 - Statement of Smith" or "Exhibit C-12" follow
//! numbering schemes. An ordered rule table extracts them into typed
//! series; a path template inferred from one confirmed member then
//! suggests paths for every other member of the same series.

use std::collections::BTreeMap;

use regex::Regex;

use crate::model::{Series, SeriesItem, SeriesType};
use crate::scorer;

/// Minimum scorer similarity between a series member and a candidate path
/// for the path to seed a template.
pub const PATH_MATCH_THRESHOLD: f64 = 0.7;

/// Confidence assigned to every template-generated suggestion. Low on
/// purpose: generated paths are not checked against the corpus here.
pub const SERIES_CONFIDENCE: f64 = 0.30;

pub const NUMBER_PLACEHOLDER: &str = "{number}";
pub const SERIES_PLACEHOLDER: &str = "{series}";

struct SeriesRule {
    series_type: SeriesType,
    pattern: Regex,
}

/// Ordered, typed rule table. Rules are tested in priority order; the
/// first match wins and the reference is excluded from later rules.
pub struct SeriesDetector {
    rules: Vec<SeriesRule>,
}

impl SeriesDetector {
    pub fn new() -> Self {
        // Capture group 1 = series/party/code identifier (may be empty),
        // group 2 = item number.
        let rule = |series_type, pattern: &str| SeriesRule {
            series_type,
            pattern: Regex::new(pattern).unwrap(),
        };
        Self {
            rules: vec![
                rule(
                    SeriesType::Exhibit,
                    r"(?i)^exhibit\s+([a-z]*\d*)[\s-]*(\d+)\b",
                ),
                rule(SeriesType::Appendix, r"(?i)^appendix\s+([a-z]*)[\s-]*(\d+)\b"),
                rule(SeriesType::Witness, r"(?i)^([a-z]{0,3}w)[\s-]*(\d+)\b"),
                rule(SeriesType::Document, r"(?i)^([a-z]+\d*)-(\d+)\b"),
            ],
        }
    }

    /// Group references into series keyed by `"{type}:{series_id}"`.
    /// References matching no rule belong to no series and are left for
    /// manual or auto matching.
    pub fn detect(&self, references: &[String]) -> BTreeMap<String, Series> {
        let mut detected: BTreeMap<String, Series> = BTreeMap::new();

        for reference in references {
            for rule in &self.rules {
                let Some(caps) = rule.pattern.captures(reference) else {
                    continue;
                };
                let Some(number) = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok())
                else {
                    continue;
                };
                let series_id = caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string();

                let code_end = caps.get(0).map(|m| m.end()).unwrap_or(0);
                let description = strip_separators(&reference[code_end..]);
                let description = if description.is_empty() {
                    reference.clone()
                } else {
                    description
                };

                let key = format!("{}:{}", rule.series_type, series_id);
                detected
                    .entry(key)
                    .or_insert_with(|| Series {
                        series_type: rule.series_type,
                        series_id,
                        items: Vec::new(),
                    })
                    .items
                    .push(SeriesItem {
                        reference: reference.clone(),
                        number,
                        description,
                    });
                break;
            }
        }

        for series in detected.values_mut() {
            series.items.sort_by_key(|item| item.number);
        }
        detected
    }
}

impl Default for SeriesDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_separators(text: &str) -> String {
    text.trim_start_matches(|c: char| {
        c.is_whitespace() || matches!(c, '-' | '–' | '—' | ':' | ',' | '.')
    })
    .trim_end()
    .to_string()
}

// ---------------------------------------------------------------------------
// Path templates
// ---------------------------------------------------------------------------

/// Path with the item number and series id replaced by placeholders.
/// `padded` records whether the number appeared zero-padded to 2 digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    pub template: String,
    pub padded: bool,
}

/// A generated reference-to-path suggestion awaiting commit-time checks.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestedPath {
    pub reference: String,
    pub suggested_path: String,
    pub confidence: f64,
}

/// Find a path template for a series: the first candidate path scoring
/// above [`PATH_MATCH_THRESHOLD`] against the first item's raw reference
/// seeds the template. Returns `None` when no path qualifies, in which
/// case the series is not path-templatable.
pub fn find_path_pattern(series: &Series, candidate_paths: &[String]) -> Option<PathTemplate> {
    let first = series.items.first()?;
    let path = candidate_paths
        .iter()
        .find(|path| scorer::score(&first.reference, path, false) > PATH_MATCH_THRESHOLD)?;
    derive_template(path, first.number, &series.series_id)
}

/// Substitute the literal number (zero-padded 2-digit form first, then
/// unpadded) and then the literal series id with placeholders.
pub fn derive_template(path: &str, number: u32, series_id: &str) -> Option<PathTemplate> {
    let padded = format!("{number:02}");
    let unpadded = number.to_string();

    let (mut template, used_padded) = if path.contains(&padded) {
        (path.replacen(&padded, NUMBER_PLACEHOLDER, 1), true)
    } else if path.contains(&unpadded) {
        (path.replacen(&unpadded, NUMBER_PLACEHOLDER, 1), false)
    } else {
        return None;
    };

    if !series_id.is_empty() && template.contains(series_id) {
        template = template.replacen(series_id, SERIES_PLACEHOLDER, 1);
    }

    Some(PathTemplate {
        template,
        padded: used_padded,
    })
}

/// Substitute the series id and the appropriately-padded number back into
/// the template for every item. Existence of the suggested paths in the
/// corpus is checked by the caller at commit time, not here.
pub fn generate_paths_for_series(series: &Series, template: &PathTemplate) -> Vec<SuggestedPath> {
    series
        .items
        .iter()
        .map(|item| {
            let number = if template.padded {
                format!("{:02}", item.number)
            } else {
                item.number.to_string()
            };
            let suggested_path = template
                .template
                .replace(SERIES_PLACEHOLDER, &series.series_id)
                .replace(NUMBER_PLACEHOLDER, &number);
            SuggestedPath {
                reference: item.reference.clone(),
                suggested_path,
                confidence: SERIES_CONFIDENCE,
            }
        })
        .collect()
}
