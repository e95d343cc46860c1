//
// source.rs
// Dicom-Ingest-rs
//
// Read-only handles over user-supplied files, backed either by a path on disk or by an uploaded buffer.
//
// Thales Matheus Mendonça Santos - October 2026

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncReadExt;

pub const DICOM_MEDIA_TYPE: &str = "application/dicom";
pub const IMAGE_ID_SCHEME: &str = "dicomfile:";

const DICOM_EXTENSIONS: &[&str] = &["dcm", "dicom", "dic", "ima"];

#[derive(Debug, Clone)]
enum Backing {
    Path(PathBuf),
    Memory(Arc<[u8]>),
}

/// An immutable, cheaply clonable handle to a user-supplied byte sequence.
#[derive(Debug, Clone)]
pub struct RawFile {
    name: String,
    len: u64,
    content_type: Option<String>,
    backing: Backing,
}

impl RawFile {
    /// Handle over a file on disk; only its size is read up front.
    pub async fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            name,
            len: metadata.len(),
            content_type: None,
            backing: Backing::Path(path.to_path_buf()),
        })
    }

    pub fn from_bytes(
        name: impl Into<String>,
        content_type: Option<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            len: bytes.len() as u64,
            content_type,
            backing: Backing::Memory(bytes),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .map(|ext| ext.to_ascii_lowercase())
    }

    /// Recognised extension, DICOM media type, or no extension at all.
    pub fn is_dicom_candidate(&self) -> bool {
        let declared_dicom = self
            .content_type()
            .is_some_and(|ct| ct.eq_ignore_ascii_case(DICOM_MEDIA_TYPE));
        match self.extension() {
            Some(ext) => declared_dicom || DICOM_EXTENSIONS.contains(&ext.as_str()),
            None => true,
        }
    }

    /// Read at most `limit` bytes from the start of the file.
    pub async fn read_prefix(&self, limit: usize) -> io::Result<Vec<u8>> {
        match &self.backing {
            Backing::Memory(bytes) => Ok(bytes[..limit.min(bytes.len())].to_vec()),
            Backing::Path(path) => {
                let file = tokio::fs::File::open(path).await?;
                let mut buffer = Vec::with_capacity(limit.min(self.len as usize));
                file.take(limit as u64).read_to_end(&mut buffer).await?;
                Ok(buffer)
            }
        }
    }

    pub async fn read_all(&self) -> io::Result<Vec<u8>> {
        match &self.backing {
            Backing::Memory(bytes) => Ok(bytes.to_vec()),
            Backing::Path(path) => tokio::fs::read(path).await,
        }
    }
}

/// Session-scoped handles that make file bytes addressable by the display surface.
///
/// Every accepted file gets one handle; image ids embed it. Handles stay valid until
/// [`BlobRegistry::revoke_all`] runs, after which resolving them fails.
#[derive(Debug, Default)]
pub struct BlobRegistry {
    entries: HashMap<String, RawFile>,
}

impl BlobRegistry {
    pub fn register(&mut self, file: &RawFile) -> String {
        let handle = uuid::Uuid::new_v4().simple().to_string();
        self.entries.insert(handle.clone(), file.clone());
        handle
    }

    pub fn resolve(&self, handle: &str) -> Option<&RawFile> {
        self.entries.get(handle)
    }

    /// Release every handle, returning how many were live.
    pub fn revoke_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `dicomfile:{handle}`, or `dicomfile:{handle}?frame={index}` for one frame of a
/// multi-frame object.
pub fn image_id(handle: &str, frame_index: Option<u32>) -> String {
    match frame_index {
        Some(frame) => format!("{IMAGE_ID_SCHEME}{handle}?frame={frame}"),
        None => format!("{IMAGE_ID_SCHEME}{handle}"),
    }
}

/// Split an image id back into its handle and optional frame index.
pub fn parse_image_id(image_id: &str) -> Option<(&str, Option<u32>)> {
    let rest = image_id.strip_prefix(IMAGE_ID_SCHEME)?;
    match rest.split_once("?frame=") {
        Some((handle, frame)) => Some((handle, Some(frame.parse().ok()?))),
        None => Some((rest, None)),
    }
}
