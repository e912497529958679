use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{RagError, Result};

#[derive(Clone, Debug)]
pub struct Document {
    pub name: String,
    pub path: PathBuf,
    pub text: String,
}

impl Document {
    pub fn from_text(name: impl Into<String>, text: &str) -> Self {
        Self {
            name: name.into(),
            path: PathBuf::new(),
            text: normalize_text(text),
        }
    }

    /// SHA-256 of the extracted text, hex encoded.
    pub fn fingerprint(&self) -> String {
        hex_digest(self.text.as_bytes())
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

pub fn load_document(path: &Path) -> Result<Document> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let raw = match ext.as_str() {
        "pdf" => extract_pdf(path)?,
        "docx" => extract_docx(path)?,
        "txt" | "md" => {
            let bytes = fs::read(path).map_err(|e| RagError::io(path, e))?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        "" => return Err(RagError::UnsupportedFormat(path.display().to_string())),
        other => return Err(RagError::UnsupportedFormat(format!(".{other}"))),
    };

    let text = normalize_text(&raw);
    if text.trim().is_empty() {
        return Err(RagError::EmptyDocument(path.to_path_buf()));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    info!(document = %name, chars = text.chars().count(), "loaded document");

    Ok(Document {
        name,
        path: path.to_path_buf(),
        text,
    })
}

fn extract_pdf(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| RagError::io(path, e))?;
    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| RagError::Extraction {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn extract_docx(path: &Path) -> Result<String> {
    let extraction = |reason: String| RagError::Extraction {
        path: path.to_path_buf(),
        reason,
    };

    let file = fs::File::open(path).map_err(|e| RagError::io(path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| extraction(e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| extraction(format!("word/document.xml: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| extraction(e.to_string()))?;

    debug!(bytes = xml.len(), "read docx body");
    docx_body_text(&xml).map_err(extraction)
}

/// Collects the text runs of a WordprocessingML body, one line per paragraph.
pub(crate) fn docx_body_text(xml: &str) -> std::result::Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => out.push('\t'),
                b"w:br" | b"w:cr" | b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "malformed XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
    }

    Ok(out)
}

/// Unix newlines, no trailing spaces, at most one blank line in a row.
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;

    for line in unified.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.trim_matches('\n').to_string()
}

pub(crate) fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
