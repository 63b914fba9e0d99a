use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::error::{ImportError, StoreError};
use crate::model::outline::Document;
use crate::msg::Msg;

/// Where the document lives between runs.
pub trait Persistence {
    /// `None` when nothing was saved yet or the stored blob is unusable.
    fn load(&self) -> Option<Document>;
    fn save(&self, doc: &Document) -> Result<(), StoreError>;
}

/// Stores the document as a single JSON file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonFileStore {
    fn load(&self) -> Option<Document> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("failed to read {}: {e}", self.path.display());
                return None;
            }
        };

        match decode_document(&text) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!("invalid saved data in {}, using default: {e}", self.path.display());
                None
            }
        }
    }

    fn save(&self, doc: &Document) -> Result<(), StoreError> {
        let json = encode_document(doc, false)?;
        write_atomic(&self.path, &json).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Parse and validate a serialized document, then repair it.
///
/// `pages` must be present, be a sequence, and hold at least one page;
/// anything else is rejected without touching the caller's state.
pub fn decode_document(text: &str) -> Result<Document, ImportError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(ImportError::Parse)?;

    match value.get("pages") {
        Some(serde_json::Value::Array(pages)) if pages.is_empty() => {
            return Err(ImportError::InvalidShape("document has no pages"));
        }
        Some(serde_json::Value::Array(_)) => {}
        Some(_) => return Err(ImportError::InvalidShape("`pages` is not a list")),
        None => return Err(ImportError::InvalidShape("missing `pages`")),
    }

    let mut doc: Document = serde_json::from_value(value).map_err(ImportError::Parse)?;
    doc.repair();
    Ok(doc)
}

pub fn encode_document(doc: &Document, pretty: bool) -> Result<String, serde_json::Error> {
    if pretty {
        serde_json::to_string_pretty(doc)
    } else {
        serde_json::to_string(doc)
    }
}

/// Write through a uniquely named temp file in the target directory, then
/// rename it over `path`. Concurrent writers never share a temp file.
fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            std::fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    {
        let mut writer = io::BufWriter::new(tmp.as_file_mut());
        writer.write_all(contents.as_bytes())?;
        writer.flush()?;
    }
    tmp.persist(path)?;
    Ok(())
}

/// Write an export in the background and report back through the event loop.
///
/// The JSON is serialized by the caller, so later edits never leak into it.
pub fn spawn_export(path: PathBuf, json: String, tx: mpsc::Sender<Msg>) {
    std::thread::spawn(move || {
        let result = write_atomic(&path, &json).map_err(|e| e.to_string());
        if let Err(e) = &result {
            tracing::error!("export to {} failed: {e}", path.display());
        }
        let _ = tx.send(Msg::ExportFinished { path, result });
    });
}

/// Read an import file in the background. Parsing happens on the event loop.
pub fn spawn_import_read(path: PathBuf, tx: mpsc::Sender<Msg>) {
    std::thread::spawn(move || {
        let result = std::fs::read_to_string(&path).map_err(|e| e.to_string());
        let _ = tx.send(Msg::ImportLoaded { path, result });
    });
}
