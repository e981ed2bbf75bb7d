//! Reads the reference work and normalizes it for chunking.
//!
//! The input is a UTF-8 text rendition of the repertory; a `pdftotext`
//! dump works unchanged because form-feed page markers are handled here.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::core::errors::ApiError;
use crate::rag::index::document_fingerprint;

/// The reference document as loaded from disk: normalized text plus the
/// fingerprint of the raw bytes it came from.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub text: String,
    pub fingerprint: String,
    /// Source label carried into every passage, taken from the file name.
    pub source: String,
}

pub fn load_reference_text(path: &Path) -> Result<LoadedDocument, ApiError> {
    let raw = std::fs::read(path).map_err(|e| {
        ApiError::Internal(format!(
            "Failed to read reference document {}: {}",
            path.display(),
            e
        ))
    })?;

    let fingerprint = document_fingerprint(&raw);
    let text = normalize(&String::from_utf8_lossy(&raw));
    let source = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("reference")
        .to_string();

    Ok(LoadedDocument {
        text,
        fingerprint,
        source,
    })
}

/// Collapse the noise a text rendition carries: page-break form feeds,
/// runs of horizontal whitespace, and stacks of blank lines.
pub fn normalize(raw: &str) -> String {
    let text = raw.replace('\u{c}', "\n\n");
    let text = horizontal_ws().replace_all(&text, " ");

    let trimmed: Vec<&str> = text.lines().map(str::trim).collect();
    let text = trimmed.join("\n");

    blank_lines().replace_all(&text, "\n\n").trim().to_string()
}

fn horizontal_ws() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]+").expect("valid regex"))
}

fn blank_lines() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("valid regex"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn form_feeds_become_paragraph_breaks() {
        let normalized = normalize("end of page one.\u{c}start of page two.");
        assert_eq!(normalized, "end of page one.\n\nstart of page two.");
    }

    #[test]
    fn whitespace_runs_collapse() {
        let normalized = normalize("MIND  \t ANGER,   tendency to\n\n\n\n\nAconite.   ");
        assert_eq!(normalized, "MIND ANGER, tendency to\n\nAconite.");
    }

    #[test]
    fn loads_text_fingerprint_and_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kent_repertory.txt");
        let raw = "HEAD   PAIN, morning\u{c}agg.  rising";
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", raw).unwrap();

        let doc = load_reference_text(&path).unwrap();
        assert_eq!(doc.text, "HEAD PAIN, morning\n\nagg. rising");
        assert_eq!(doc.source, "kent_repertory");
        // Fingerprint covers the raw bytes, not the normalized text.
        assert_eq!(doc.fingerprint, document_fingerprint(raw.as_bytes()));
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = load_reference_text(Path::new("/no/such/repertory.txt")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("/no/such/repertory.txt"));
    }
}
