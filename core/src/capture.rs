//! Document capture boundary.
//!
//! Uploading hands raw bytes to a capture backend and gets back a storage
//! reference plus whatever the backend could extract (OCR fields and a
//! confidence figure). The engine never touches storage directly.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct CaptureResult {
    /// Opaque reference the backend can later resolve (e.g. `mem://3`).
    pub storage_ref: String,
    pub extracted_fields: Option<Value>,
    pub ocr_confidence: Option<f64>,
}

pub trait DocumentCapture: Send + Sync {
    fn upload(
        &self,
        bytes: &[u8],
        file_name: &str,
        mime_type: &str,
    ) -> anyhow::Result<CaptureResult>;
}

/// In-memory capture backend. Holds every upload in a map keyed by a
/// monotonically assigned `mem://N` reference.
pub struct MemoryCapture {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCapture {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn fetch(&self, storage_ref: &str) -> Option<Vec<u8>> {
        let blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs.get(storage_ref).cloned()
    }

    pub fn len(&self) -> usize {
        let blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentCapture for MemoryCapture {
    fn upload(
        &self,
        bytes: &[u8],
        _file_name: &str,
        _mime_type: &str,
    ) -> anyhow::Result<CaptureResult> {
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        let storage_ref = format!("mem://{}", blobs.len());
        blobs.insert(storage_ref.clone(), bytes.to_vec());
        Ok(CaptureResult {
            storage_ref,
            extracted_fields: None,
            ocr_confidence: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_get_distinct_refs_and_round_trip() {
        let capture = MemoryCapture::new();
        let a = capture.upload(b"front", "id_front.png", "image/png").unwrap();
        let b = capture.upload(b"back", "id_back.png", "image/png").unwrap();
        assert_ne!(a.storage_ref, b.storage_ref);
        assert_eq!(capture.fetch(&a.storage_ref).as_deref(), Some(&b"front"[..]));
        assert_eq!(capture.fetch(&b.storage_ref).as_deref(), Some(&b"back"[..]));
    }
}
