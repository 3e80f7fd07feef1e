use std::fmt;
use std::io;
use std::path::Path;

use crate::Amount;
use crate::model::{Dress, Measurements};

/// Identifier of one dress instance inside a draft.
///
/// Allocated from a per-draft counter, so two instances of the same catalog
/// dress never share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub(crate) u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

/// An image attached to a dress instance.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read an image from disk, guessing its content type from the extension.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let content_type = match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            _ => "application/octet-stream",
        };
        Ok(Self::new(file_name, content_type, bytes))
    }
}

// Image bytes are noise in logs and test failures.
impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// One unit of a catalog dress with its own measurements and image.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub instance_id: InstanceId,
    pub dress: Dress,
    pub measurements: Measurements,
    pub image: Option<Attachment>,
}

impl LineItem {
    pub fn new(instance_id: InstanceId, dress: Dress) -> Self {
        Self {
            instance_id,
            dress,
            measurements: Measurements::default(),
            image: None,
        }
    }
}

/// Pricing derived from a draft on read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub base_total: Amount,
    pub extra_charges: Amount,
    pub discount_percent: Option<f64>,
    pub before_discount: Amount,
    pub after_discount: Amount,
}

impl Totals {
    pub fn savings(&self) -> Amount {
        self.before_discount - self.after_discount
    }
}
