//! Convert structured question-paper JSON into a styled `.docx` document.
//!
//! ```no_run
//! use std::path::Path;
//!
//! let saved = json_to_docx::convert_file(Path::new("paper.json"), Path::new("out/paper.docx"))?;
//! println!("{}", saved.display());
//! # Ok::<(), json_to_docx::Error>(())
//! ```

pub mod assemble;
pub mod docx;
pub mod error;
pub mod layout;
pub mod media;
pub mod model;

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

pub use crate::assemble::{Body, DocumentAssembler};
pub use crate::error::{Error, Result};
pub use crate::layout::PageSetup;
pub use crate::media::ImageResolver;
pub use crate::model::{ContentItem, Document};

/// Read and decode the input JSON file.
pub fn load_document(input: &Path) -> Result<Document> {
    if !input.is_file() {
        return Err(Error::InputNotFound(input.to_path_buf()));
    }
    let text = fs::read_to_string(input)?;
    Document::from_json_str(&text)
}

/// Assemble `doc` and pack it into `.docx` bytes.
pub fn render_document(doc: &Document, resolver: &ImageResolver) -> Result<Vec<u8>> {
    let body = DocumentAssembler::new(resolver).assemble(doc);
    docx::write_package(&body, &PageSetup::default())
}

/// Write the finished document, creating parent directories as needed.
/// Returns the absolute path of the written file.
pub fn write_output(output: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let write_error = |source| Error::OutputWrite {
        path: output.to_path_buf(),
        source,
    };
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(output, bytes).map_err(write_error)?;
    fs::canonicalize(output).map_err(write_error)
}

/// Convert `input` to `output`. Nothing is written unless the whole
/// document was generated.
pub fn convert_file(input: &Path, output: &Path) -> Result<PathBuf> {
    let doc = load_document(input)?;
    info!(
        "loaded {} with {} sections",
        input.display(),
        doc.sections.len()
    );
    let resolver = ImageResolver::for_input(input);
    let bytes = render_document(&doc, &resolver)?;
    write_output(output, &bytes)
}
