use std::fmt;

use anyhow::{Result, bail};
use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingSource {
    Bom,
    AssumedUtf8,
}

impl fmt::Display for EncodingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EncodingSource::Bom => "bom",
            EncodingSource::AssumedUtf8 => "assumed-utf8",
        };
        f.write_str(label)
    }
}

/// Text of the patch target plus what is needed to write it back unchanged.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub text: String,
    pub encoding: &'static Encoding,
    pub source: EncodingSource,
}

impl SourceText {
    pub fn has_bom(&self) -> bool {
        self.source == EncodingSource::Bom
    }

    /// Encodes `text` the same way this source was stored, BOM included.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(text.len() + 3);
        if self.encoding == UTF_16LE || self.encoding == UTF_16BE {
            let little = self.encoding == UTF_16LE;
            let units = std::iter::once(0xFEFF)
                .filter(|_| self.has_bom())
                .chain(text.encode_utf16());
            for unit in units {
                let bytes = if little {
                    unit.to_le_bytes()
                } else {
                    unit.to_be_bytes()
                };
                out.extend_from_slice(&bytes);
            }
            return out;
        }
        if self.has_bom() {
            out.extend_from_slice(&[0xEF, 0xBB, 0xBF]);
        }
        out.extend_from_slice(text.as_bytes());
        out
    }
}

/// Decodes the target, refusing anything that would not survive a rewrite.
pub fn decode_source(bytes: &[u8]) -> Result<SourceText> {
    let (encoding, bom_len, source) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, bom_len, EncodingSource::Bom),
        None => (UTF_8, 0, EncodingSource::AssumedUtf8),
    };
    let Some(text) =
        encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
    else {
        bail!("content is not valid {}", encoding.name());
    };
    Ok(SourceText {
        text: text.into_owned(),
        encoding,
        source,
    })
}
