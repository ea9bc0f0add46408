//! Text extraction: staged PDF on disk → plain text + page count.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks while parsing. [`extract_text`] moves the work onto
//! Tokio's blocking pool so a large brain map does not stall the worker
//! threads serving other requests.
//!
//! Extraction has no partial-failure mode: if any page cannot be read the
//! whole request fails.

use crate::error::ResolveError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Text of a document and how many pages it had.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
}

/// Something that can pull the text out of a PDF file.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractedText, ResolveError>;
}

/// Run `extractor` on the blocking pool.
pub async fn extract_text(
    extractor: Arc<dyn TextExtractor>,
    path: &Path,
) -> Result<ExtractedText, ResolveError> {
    let path: PathBuf = path.to_path_buf();
    let extracted = tokio::task::spawn_blocking(move || extractor.extract(&path))
        .await
        .map_err(|e| ResolveError::Internal(format!("Extraction task panicked: {}", e)))??;

    if extracted.text.trim().is_empty() {
        warn!(
            "No extractable text in {} page(s); the document may be scanned",
            extracted.page_count
        );
    }
    Ok(extracted)
}

/// [`TextExtractor`] backed by pdfium.
///
/// The library is located through `PDFIUM_LIB_PATH` (a directory) when set,
/// otherwise through the system library search path.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    library_dir: Option<PathBuf>,
}

impl PdfiumExtractor {
    pub fn new() -> Self {
        Self {
            library_dir: std::env::var_os("PDFIUM_LIB_PATH")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Bind to the pdfium library in `dir`.
    pub fn with_library_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: Some(dir.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, ResolveError> {
        let bindings = match &self.library_dir {
            Some(dir) => {
                let lib = Pdfium::pdfium_platform_library_name_at_path(dir);
                Pdfium::bind_to_library(&lib)
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ResolveError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl TextExtractor for PdfiumExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedText, ResolveError> {
        let pdfium = self.bind()?;

        let document =
            pdfium
                .load_pdf_from_file(path, None)
                .map_err(|e| ResolveError::ExtractionFailed {
                    detail: format!("{:?}", e),
                })?;

        let pages = document.pages();
        let page_count = pages.len() as usize;
        info!("PDF loaded: {} pages", page_count);

        let mut text = String::new();
        for (idx, page) in pages.iter().enumerate() {
            let page_text = page.text().map_err(|e| ResolveError::ExtractionFailed {
                detail: format!("page {}: {:?}", idx + 1, e),
            })?;
            let content = page_text.all();
            debug!("Page {} → {} chars", idx + 1, content.len());
            text.push_str(&content);
            text.push('\n');
        }

        Ok(ExtractedText { text, page_count })
    }
}
