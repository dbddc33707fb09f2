use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// A human-authored description of a document awaiting a file assignment.
///
/// Identity is the description text: it must be unique among references
/// currently tracked as unmatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_code: Option<String>,
    /// True when the reference was derived from an unassigned corpus path
    /// rather than authored by a person.
    #[serde(default)]
    pub generated: bool,
}

impl Reference {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            date: None,
            external_code: None,
            generated: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

/// How a match was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMethod {
    Manual,
    ManualBulk,
    Pattern,
    AutoHighConfidence,
    Imported,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::ManualBulk => "manual-bulk",
            Self::Pattern => "pattern",
            Self::AutoHighConfidence => "auto-high-confidence",
            Self::Imported => "imported",
        }
    }

    /// Parse a wire-format method name. Unknown names map to `Imported` so
    /// that externally produced mapping files with extra methods still load.
    pub fn parse(value: &str) -> Self {
        match value {
            "manual" => Self::Manual,
            "manual-bulk" => Self::ManualBulk,
            "pattern" => Self::Pattern,
            "auto-high-confidence" => Self::AutoHighConfidence,
            _ => Self::Imported,
        }
    }
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confirmed reference-to-path pairing.
///
/// `original_date` and `original_reference` carry the source reference's
/// `date` and `external_code` so removal can rebuild it. The reference's
/// `generated` flag is not persisted here, so restore is lossy on that
/// field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub reference: String,
    pub path: String,
    /// Similarity score in [0, 1] at the time the match was made.
    pub score: f64,
    pub method: MatchMethod,
    /// RFC 3339 creation time.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_reference: Option<String>,
}

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// Family of coding schemes a series can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesType {
    Exhibit,
    Appendix,
    Witness,
    Document,
}

impl SeriesType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhibit => "exhibit",
            Self::Appendix => "appendix",
            Self::Witness => "witness",
            Self::Document => "document",
        }
    }
}

impl std::fmt::Display for SeriesType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One numbered member of a detected series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesItem {
    /// The raw reference text this item was extracted from.
    pub reference: String,
    pub number: u32,
    /// Reference text with the series code stripped.
    pub description: String,
}

/// A detected family of references sharing one numbering scheme.
/// Items are kept sorted ascending by `number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub series_type: SeriesType,
    pub series_id: String,
    pub items: Vec<SeriesItem>,
}

impl Series {
    /// Stable key used to group references: `"{type}:{series_id}"`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.series_type, self.series_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_wire_names() {
        assert_eq!(MatchMethod::ManualBulk.to_string(), "manual-bulk");
        assert_eq!(
            MatchMethod::AutoHighConfidence.to_string(),
            "auto-high-confidence"
        );
        assert_eq!(MatchMethod::parse("manual"), MatchMethod::Manual);
        assert_eq!(MatchMethod::parse("pattern"), MatchMethod::Pattern);
    }

    #[test]
    fn unknown_method_maps_to_imported() {
        assert_eq!(MatchMethod::parse("ai-suggested"), MatchMethod::Imported);
        assert_eq!(MatchMethod::parse(""), MatchMethod::Imported);
    }

    #[test]
    fn series_key_format() {
        let series = Series {
            series_type: SeriesType::Witness,
            series_id: "CW".into(),
            items: Vec::new(),
        };
        assert_eq!(series.key(), "witness:CW");
    }
}
