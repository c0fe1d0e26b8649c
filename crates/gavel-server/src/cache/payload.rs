use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde_json::Value;

/// A cacheable value.
///
/// `Json` entries are stored as a single (optionally gzipped) JSON document.
/// `Binary` and `BinaryList` entries are stored as a set of buffer sub-keys
/// and are never compressed here. A list with a single element reads back
/// as `Binary`.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedPayload {
    Json(Value),
    Binary(Bytes),
    BinaryList(Vec<Bytes>),
}

impl CachedPayload {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    pub fn from_buffers(mut buffers: Vec<Bytes>) -> Self {
        if buffers.len() == 1 {
            if let Some(single) = buffers.pop() {
                return Self::Binary(single);
            }
        }
        Self::BinaryList(buffers)
    }

    /// Whether this payload belongs on the JSON path.
    pub fn is_serializable(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    /// The buffers of a binary payload, `None` for JSON.
    pub fn buffers(&self) -> Option<Vec<Bytes>> {
        match self {
            Self::Json(_) => None,
            Self::Binary(buffer) => Some(vec![buffer.clone()]),
            Self::BinaryList(buffers) => Some(buffers.clone()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::Binary(_) => "binary",
            Self::BinaryList(_) => "binary_list",
        }
    }

    /// JSON rendering for HTTP bodies: binary lists become base64 strings.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Json(value) => value.clone(),
            Self::Binary(buffer) => Value::String(STANDARD.encode(buffer)),
            Self::BinaryList(buffers) => Value::Array(
                buffers
                    .iter()
                    .map(|b| Value::String(STANDARD.encode(b)))
                    .collect(),
            ),
        }
    }
}

pub(crate) fn gzip(raw: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    encoder.finish()
}

pub(crate) fn gunzip(compressed: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
