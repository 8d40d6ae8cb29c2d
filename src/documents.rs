use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use crate::log_store_operation;
use crate::models::Document;

const STORE: &str = "document_store";

/// Bytes per placeholder chunk when estimating a display chunk count
pub const CHUNK_SIZE_BYTES: u64 = 8 * 1024;

/// In-memory registry of uploaded documents backed by files in `upload_dir`
#[derive(Debug)]
pub struct DocumentStore {
    upload_dir: PathBuf,
    documents: RwLock<Vec<Document>>,
    last_id: Mutex<i64>,
}

impl DocumentStore {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            documents: RwLock::new(Vec::new()),
            last_id: Mutex::new(0),
        }
    }

    pub async fn ensure_upload_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await
    }

    /// Millisecond timestamp, bumped when the clock has not advanced past the last id
    pub fn next_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_id.lock().unwrap_or_else(PoisonError::into_inner);
        let id = if now > *last { now } else { *last + 1 };
        *last = id;
        id.to_string()
    }

    /// Where the bytes for `original_name` under `id` are stored
    pub fn storage_path(&self, id: &str, original_name: &str) -> PathBuf {
        self.upload_dir
            .join(format!("{}-{}", id, sanitize_file_name(original_name)))
    }

    pub fn register(&self, id: String, original_name: &str, size: u64, path: PathBuf) -> Document {
        let document = Document {
            id,
            name: original_name.to_string(),
            extension: extension_of(original_name),
            size,
            chunks: estimate_chunks(size),
            uploaded_at: Utc::now(),
            path,
        };

        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(document.clone());

        log_store_operation!(debug, STORE, "register", doc_id = document.id);
        document
    }

    pub fn list(&self) -> Vec<Document> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|doc| doc.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.documents.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a document and unlink its file. Unknown ids return `None`;
    /// unlink failures are logged and otherwise ignored.
    pub async fn remove(&self, id: &str) -> Option<Document> {
        let removed = {
            let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
            let index = documents.iter().position(|doc| doc.id == id)?;
            documents.remove(index)
        };

        match tokio::fs::remove_file(&removed.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                log_store_operation!(warn, STORE, "unlink", error = e);
            }
        }

        log_store_operation!(debug, STORE, "remove", doc_id = removed.id);
        Some(removed)
    }
}

/// Lowercase extension with its leading dot, or an empty string
pub fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// Placeholder chunk count shown in the UI; no chunking actually happens
pub fn estimate_chunks(size: u64) -> u64 {
    size.div_ceil(CHUNK_SIZE_BYTES).max(1)
}

/// Final path component with anything outside `[A-Za-z0-9._-]` replaced
pub fn sanitize_file_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
