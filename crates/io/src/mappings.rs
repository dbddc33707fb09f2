// Mapping list import/export - CSV, TSV, JSON

use docket_engine::model::{Match, MatchMethod};

/// Fixed column order for tabular formats.
pub const COLUMNS: [&str; 6] = [
    "reference",
    "path",
    "score",
    "timestamp",
    "method",
    "session_id",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingFormat {
    Csv,
    Tsv,
    Json,
}

impl MappingFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Json => "json",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Tsv => "text/tab-separated-values",
            Self::Json => "application/json",
        }
    }

    fn delimiter(&self) -> u8 {
        match self {
            Self::Tsv => b'\t',
            _ => b',',
        }
    }

    /// Guess the format from a filename extension.
    pub fn from_extension(filename: &str) -> Option<Self> {
        let ext = filename.rsplit('.').next()?;
        match ext.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "tsv" | "tab" => Some(Self::Tsv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum CodecError {
    /// Serialization failure during export.
    Encode(String),
    /// Unparsable payload, the only fatal decode error. Per-record
    /// problems are reported in [`DecodeReport::errors`] instead.
    Decode(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(msg) => write!(f, "export failed: {msg}"),
            Self::Decode(msg) => write!(f, "import failed: {msg}"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Encoded mapping list ready to hand to a download or file write.
#[derive(Debug, Clone)]
pub struct ExportPayload {
    pub content: String,
    pub mime_type: &'static str,
    pub filename: String,
}

/// Decoded mapping list plus the records that failed validation.
#[derive(Debug, Clone, Default)]
pub struct DecodeReport {
    pub mappings: Vec<Match>,
    pub errors: Vec<LineError>,
}

/// A rejected record: 1-based line (tabular) or entry (JSON) number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    pub line: usize,
    pub error: String,
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

fn render_score(score: f64) -> String {
    format!("{}%", (score * 100.0).round() as i64)
}

pub fn encode(matches: &[Match], format: MappingFormat) -> Result<ExportPayload, CodecError> {
    let content = match format {
        MappingFormat::Json => serde_json::to_string_pretty(matches)
            .map_err(|e| CodecError::Encode(e.to_string()))?,
        MappingFormat::Csv | MappingFormat::Tsv => {
            let mut writer = csv::WriterBuilder::new()
                .delimiter(format.delimiter())
                .from_writer(Vec::new());
            writer
                .write_record(COLUMNS)
                .map_err(|e| CodecError::Encode(e.to_string()))?;
            for m in matches {
                writer
                    .write_record([
                        m.reference.as_str(),
                        m.path.as_str(),
                        &render_score(m.score),
                        m.timestamp.as_str(),
                        m.method.as_str(),
                        m.session_id.as_deref().unwrap_or(""),
                    ])
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
            }
            let bytes = writer
                .into_inner()
                .map_err(|e| CodecError::Encode(e.to_string()))?;
            String::from_utf8(bytes).map_err(|e| CodecError::Encode(e.to_string()))?
        }
    };

    let filename = format!(
        "docket-mappings-{}.{}",
        chrono::Utc::now().format("%Y%m%d"),
        format.extension()
    );
    Ok(ExportPayload {
        content,
        mime_type: format.mime_type(),
        filename,
    })
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Accepts `85%` or a plain decimal in [0, 1].
fn parse_score(raw: &str) -> Result<f64, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("missing score".into());
    }
    let (digits, percent) = match trimmed.strip_suffix('%') {
        Some(rest) => (rest.trim_end(), true),
        None => (trimmed, false),
    };
    let mut value: f64 = digits
        .parse()
        .map_err(|_| format!("invalid score '{raw}'"))?;
    if percent {
        value /= 100.0;
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("score out of range: {raw}"));
    }
    Ok(value)
}

fn build_mapping(
    reference: &str,
    path: &str,
    score_raw: &str,
    timestamp: &str,
    method: &str,
    session_id: &str,
) -> Result<Match, String> {
    if reference.trim().is_empty() {
        return Err("missing reference".into());
    }
    if path.trim().is_empty() {
        return Err("missing path".into());
    }
    let score = parse_score(score_raw)?;
    Ok(Match {
        reference: reference.trim().to_string(),
        path: path.trim().to_string(),
        score,
        method: MatchMethod::parse(method.trim()),
        timestamp: timestamp.trim().to_string(),
        session_id: match session_id.trim() {
            "" => None,
            s => Some(s.to_string()),
        },
        original_date: None,
        original_reference: None,
    })
}

pub fn decode(content: &str, format: MappingFormat) -> Result<DecodeReport, CodecError> {
    match format {
        MappingFormat::Json => decode_json(content),
        MappingFormat::Csv | MappingFormat::Tsv => decode_tabular(content, format.delimiter()),
    }
}

fn decode_tabular(content: &str, delimiter: u8) -> Result<DecodeReport, CodecError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| CodecError::Decode(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let reference_idx = column("reference")
        .ok_or_else(|| CodecError::Decode("missing 'reference' column".into()))?;
    let path_idx =
        column("path").ok_or_else(|| CodecError::Decode("missing 'path' column".into()))?;
    let score_idx =
        column("score").ok_or_else(|| CodecError::Decode("missing 'score' column".into()))?;
    // optional columns
    let timestamp_idx = column("timestamp");
    let method_idx = column("method");
    let session_idx = column("session_id");

    let mut report = DecodeReport::default();
    for (i, record) in reader.records().enumerate() {
        let line = i + 2; // header is line 1
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                report.errors.push(LineError {
                    line,
                    error: e.to_string(),
                });
                continue;
            }
        };
        let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("");
        match build_mapping(
            field(Some(reference_idx)),
            field(Some(path_idx)),
            field(Some(score_idx)),
            field(timestamp_idx),
            field(method_idx),
            field(session_idx),
        ) {
            Ok(mapping) => report.mappings.push(mapping),
            Err(error) => report.errors.push(LineError { line, error }),
        }
    }
    Ok(report)
}

fn decode_json(content: &str) -> Result<DecodeReport, CodecError> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|e| CodecError::Decode(e.to_string()))?;
    let entries = value
        .as_array()
        .ok_or_else(|| CodecError::Decode("expected a JSON array of mappings".into()))?;

    let mut report = DecodeReport::default();
    for (i, entry) in entries.iter().enumerate() {
        let line = i + 1;
        let text = |key: &str| {
            entry
                .get(key)
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                })
                .unwrap_or_default()
        };
        match build_mapping(
            &text("reference"),
            &text("path"),
            &text("score"),
            &text("timestamp"),
            &text("method"),
            &text("session_id"),
        ) {
            Ok(mapping) => report.mappings.push(mapping),
            Err(error) => report.errors.push(LineError { line, error }),
        }
    }
    Ok(report)
}
