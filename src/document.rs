use anyhow::{Context, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text;
use std::fs;
use std::io::Read;
use std::path::Path;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Extensions the ingestion folder scan accepts.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["pdf", "docx", "txt"];

/// Represents a document with its content and metadata
#[derive(Debug, Clone)]
pub struct Document {
    /// The actual text content of the document
    pub content: String,
    /// The document's file name (used as chunk provenance)
    pub source: String,
    /// The document's MIME type
    pub mime_type: String,
}

impl Document {
    /// Create a new document from a file path
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let path = file_path.as_ref();
        let file_name = path
            .file_name()
            .context("Invalid file name")?
            .to_str()
            .context("Invalid file name encoding")?
            .to_string();

        // Detect MIME type
        let mime = from_path(path).first_or_octet_stream();
        let mime_type = mime.to_string();
        debug!("Detected MIME type: {}", mime_type);

        // Read content based on file type
        let content = read_document_content(path, &mime_type)?;

        Ok(Document {
            content,
            source: file_name,
            mime_type,
        })
    }
}

/// Whether the folder scan should pick this file up.
pub fn is_supported<P: AsRef<Path>>(file_path: P) -> bool {
    file_path
        .as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Read content from a document based on its MIME type
pub fn read_document_content<P: AsRef<Path>>(file_path: P, mime_type: &str) -> Result<String> {
    let path = file_path.as_ref();

    match mime_type {
        // Handle PDF documents
        mime if mime.starts_with("application/pdf") => {
            info!("Processing PDF document: {}", path.display());
            let content = extract_text(path)
                .with_context(|| format!("Failed to extract text from PDF: {}", path.display()))?;

            // PDF extraction can sometimes include excessive whitespace
            let cleaned_content = normalize_whitespace(&content);

            if cleaned_content.is_empty() {
                warn!("Extracted PDF content is empty or contains only whitespace");
            }

            Ok(cleaned_content)
        }

        // Handle Word documents
        mime if mime == DOCX_MIME => {
            info!("Processing DOCX document: {}", path.display());
            read_docx(path)
                .with_context(|| format!("Failed to extract text from DOCX: {}", path.display()))
        }

        // Handle plain text documents
        mime if mime.starts_with("text/") => {
            info!("Processing text document: {}", path.display());
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read text file: {}", path.display()))?;
            Ok(content)
        }

        // Unsupported format
        _ => Err(anyhow::anyhow!(
            "Unsupported document format: {}. Only PDF, DOCX and text files are supported.",
            mime_type
        )),
    }
}

/// Extract text from a DOCX archive (a zip holding WordprocessingML).
fn read_docx<P: AsRef<Path>>(file_path: P) -> Result<String> {
    let file = fs::File::open(file_path.as_ref())?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .context("DOCX archive has no word/document.xml")?
        .read_to_string(&mut xml)?;

    Ok(extract_docx_text(&xml))
}

/// Pull the plain text out of a WordprocessingML body: one line per
/// paragraph, text runs concatenated, basic entities decoded.
fn extract_docx_text(xml: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut remaining = xml;

    while let Some(open) = remaining.find('<') {
        let after = &remaining[open + 1..];
        let close = match after.find('>') {
            Some(pos) => pos,
            None => break,
        };
        let tag = &after[..close];
        let body = &after[close + 1..];

        // <w:t> and <w:t xml:space="preserve"> carry the visible text.
        if tag == "w:t" || tag.starts_with("w:t ") {
            match body.find("</w:t>") {
                Some(end) => {
                    current.push_str(&decode_entities(&body[..end]));
                    remaining = &body[end + "</w:t>".len()..];
                    continue;
                }
                None => break,
            }
        }

        if tag == "/w:p" {
            paragraphs.push(std::mem::take(&mut current));
        }
        remaining = body;
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs.join("\n")
}

/// Decode the five predefined XML entities.
fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Normalize whitespace in text (remove multiple consecutive spaces, newlines, etc.)
fn normalize_whitespace(text: &str) -> String {
    // Replace multiple spaces with a single space
    let result = text.replace('\r', "");

    // Replace multiple consecutive newlines with double newlines (paragraph separator)
    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
        } else {
            if newline_count > 0 {
                // Add at most two newlines (paragraph break)
                if newline_count >= 2 {
                    normalized.push_str("\n\n");
                } else {
                    normalized.push('\n');
                }
                newline_count = 0;
            }

            // Don't add consecutive spaces
            if !(c == ' ' && prev_char == ' ') {
                normalized.push(c);
            }

            prev_char = c;
        }
    }

    // Handle trailing newlines
    if newline_count > 0 {
        if newline_count >= 2 {
            normalized.push_str("\n\n");
        } else {
            normalized.push('\n');
        }
    }

    normalized.trim().to_string()
}
