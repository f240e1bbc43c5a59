//! Output writers: serialize an assembled [`OutputDocument`].
//!
//! | format | module     | container |
//! |--------|------------|-----------|
//! | DOCX   | [`docx`]   | OOXML zip package (`zip`, parts via `quick-xml`) |
//! | TXT    | [`text`]   | UTF-8 text, form feed between pages |

pub mod docx;
pub mod text;

use crate::config::OutputFormat;
use crate::pipeline::assemble::OutputDocument;
use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip packaging failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML generation failed: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Serialize `doc` in `format` into `writer`.
pub fn write_document<W: Write + Seek>(
    doc: &OutputDocument,
    format: OutputFormat,
    writer: W,
) -> Result<W, WriteError> {
    match format {
        OutputFormat::Docx => docx::write_docx(doc, writer),
        OutputFormat::Txt => {
            let mut writer = writer;
            writer.write_all(text::render_text(doc).as_bytes())?;
            Ok(writer)
        }
    }
}

/// Serialize `doc` to a new file at `path`. Blocking.
pub fn write_file(doc: &OutputDocument, format: OutputFormat, path: &Path) -> Result<(), WriteError> {
    let file = File::create(path)?;
    let mut writer = write_document(doc, format, BufWriter::new(file))?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Serialize `doc` into memory.
pub fn to_bytes(doc: &OutputDocument, format: OutputFormat) -> Result<Vec<u8>, WriteError> {
    Ok(write_document(doc, format, Cursor::new(Vec::new()))?.into_inner())
}
