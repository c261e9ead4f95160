//! Request body compression.

use std::io::{self, Read, Write};

use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;

use crate::request::CompressionMethod;

/// Compressed bytes plus the `Content-Encoding` tag that describes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    pub bytes: Vec<u8>,
    pub content_encoding: Option<&'static str>,
}

/// Compress `bytes` with `method`.
///
/// `None` copies the input and carries no tag.
pub fn encode(bytes: &[u8], method: CompressionMethod) -> io::Result<EncodedBody> {
    match method {
        CompressionMethod::None => Ok(EncodedBody {
            bytes: bytes.to_vec(),
            content_encoding: None,
        }),
        CompressionMethod::GZip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(bytes)?;
            Ok(EncodedBody {
                bytes: encoder.finish()?,
                content_encoding: Some("gzip"),
            })
        }
        CompressionMethod::Deflate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(bytes)?;
            Ok(EncodedBody {
                bytes: encoder.finish()?,
                content_encoding: Some("deflate"),
            })
        }
    }
}

/// Reverse `encode` given the `Content-Encoding` tag.
pub fn decode(bytes: &[u8], content_encoding: Option<&str>) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    match content_encoding.map(str::to_ascii_lowercase).as_deref() {
        None | Some("identity") => out.extend_from_slice(bytes),
        Some("gzip") => {
            GzDecoder::new(bytes).read_to_end(&mut out)?;
        }
        Some("deflate") => {
            DeflateDecoder::new(bytes).read_to_end(&mut out)?;
        }
        Some(other) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported content encoding '{}'", other),
            ))
        }
    }
    Ok(out)
}
