//! Source file parsing and text extraction.
//!
//! Only text formats are handled here. Binary documents (PDF, DOCX, audio)
//! are converted to text by external tools before ingestion.

use kbqa_core::{AppError, AppResult};
use std::fs;
use std::path::Path;

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Markdown,
    Html,
    /// Subtitle files (`.srt`, `.vtt`) from video transcripts
    Transcript,
    PlainText,
    Unknown,
}

impl ContentType {
    /// Detect content type from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("md") | Some("markdown") => Self::Markdown,
            Some("html") | Some("htm") => Self::Html,
            Some("srt") | Some("vtt") => Self::Transcript,
            Some("txt") | Some("text") => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Transcript => "transcript",
            Self::PlainText => "text",
            Self::Unknown => "unknown",
        }
    }
}

/// Parse a source file and extract clean text.
pub fn parse_file(path: &Path) -> AppResult<String> {
    let content_type = ContentType::from_path(path);

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Knowledge(format!("Failed to read {:?}: {}", path, e)))?;

    let cleaned = match content_type {
        ContentType::Markdown => clean_markdown(&raw),
        ContentType::Html => clean_html(&raw),
        ContentType::Transcript => clean_transcript(&raw),
        ContentType::PlainText => raw,
        ContentType::Unknown => {
            if is_likely_text(&raw) {
                raw
            } else {
                tracing::warn!("Skipping likely binary file: {:?}", path);
                return Err(AppError::Knowledge(format!(
                    "Binary file not supported: {:?}",
                    path
                )));
            }
        }
    };

    Ok(cleaned)
}

/// Clean markdown by removing excess formatting.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.trim_start_matches('#').trim();

        // Skip horizontal rules and code fences
        if trimmed.starts_with("---") || trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }

        if !trimmed.is_empty() {
            result.push_str(trimmed);
            result.push('\n');
        }
    }

    result.trim().to_string()
}

/// Elements whose content is never visible text.
const HIDDEN_ELEMENTS: [&str; 3] = ["script", "style", "noscript"];

/// Clean HTML by stripping tags and hidden elements.
pub(crate) fn clean_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut hidden: Option<&str> = None;

    // ASCII lowering keeps byte offsets aligned with `text`
    let lower = text.to_ascii_lowercase();

    for (i, ch) in text.char_indices() {
        if ch == '<' {
            in_tag = true;

            let rest = lower.get(i + 1..).unwrap_or("");
            hidden = match hidden {
                Some(element) => {
                    let closes = rest
                        .strip_prefix('/')
                        .is_some_and(|r| r.starts_with(element));
                    if closes {
                        None
                    } else {
                        Some(element)
                    }
                }
                None => HIDDEN_ELEMENTS
                    .iter()
                    .copied()
                    .find(|element| rest.starts_with(element)),
            };
        } else if ch == '>' {
            in_tag = false;
            result.push(' ');
        } else if !in_tag && hidden.is_none() {
            result.push(ch);
        }
    }

    // Collapse whitespace
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of the first `<title>` element, if it has any.
pub(crate) fn html_title(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;

    let title = text[start..end].split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

/// Clean a subtitle file down to the spoken text.
///
/// Drops the WEBVTT header, cue numbers and `00:00:01.000 --> 00:00:04.000`
/// timing lines.
fn clean_transcript(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && !line.starts_with("WEBVTT")
                && !line.contains("-->")
                && !line.chars().all(|c| c.is_ascii_digit())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Check if text is likely UTF-8 text (not binary).
fn is_likely_text(data: &str) -> bool {
    !data.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_type_detection() {
        assert_eq!(
            ContentType::from_path(Path::new("file.md")),
            ContentType::Markdown
        );
        assert_eq!(
            ContentType::from_path(Path::new("talk.VTT")),
            ContentType::Transcript
        );
        assert_eq!(
            ContentType::from_path(Path::new("file.txt")),
            ContentType::PlainText
        );
        assert_eq!(
            ContentType::from_path(Path::new("file.bin")),
            ContentType::Unknown
        );
    }

    #[test]
    fn test_clean_markdown() {
        let input = "# Header\n\nSome text\n\n```rust\ncode\n```\n\nMore text";
        let output = clean_markdown(input);
        assert!(output.contains("Header"));
        assert!(output.contains("Some text"));
        assert!(output.contains("More text"));
        assert!(!output.contains("```"));
    }

    #[test]
    fn test_clean_html() {
        let input = "<html><head><style>p{color:red}</style></head><body><p>Hello <b>world</b></p><script>var x;</script></body></html>";
        let output = clean_html(input);
        assert_eq!(output, "Hello world");
    }

    #[test]
    fn test_clean_html_drops_noscript() {
        let input = "<body><noscript>Enable JavaScript</noscript><p>Visible</p></body>";
        assert_eq!(clean_html(input), "Visible");
    }

    #[test]
    fn test_html_title() {
        let input = "<html><head><TITLE>\n  Digital India | Home\n</TITLE></head></html>";
        assert_eq!(html_title(input), Some("Digital India | Home".to_string()));
        assert_eq!(html_title("<title>  </title>"), None);
        assert_eq!(html_title("<p>no title</p>"), None);
    }

    #[test]
    fn test_clean_html_non_ascii() {
        let output = clean_html("<p>Índia Digital</p><p>ação</p>");
        assert_eq!(output, "Índia Digital ação");
    }

    #[test]
    fn test_clean_transcript() {
        let input = "WEBVTT\n\n1\n00:00:01.000 --> 00:00:04.000\nDigital India was launched\n\n2\n00:00:04.500 --> 00:00:06.000\nin 2015.";
        assert_eq!(clean_transcript(input), "Digital India was launched in 2015.");
    }

    #[test]
    fn test_parse_binary_file_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blob.dat");
        std::fs::write(&path, "abc\0def").unwrap();
        assert!(parse_file(&path).is_err());
    }
}
