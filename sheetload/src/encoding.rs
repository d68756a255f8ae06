//! Encoding resolver
//!
//! Picks the first encoding, from a fixed priority list, that decodes the
//! whole input without a single malformed sequence. When every strict
//! candidate fails, a permissive fallback decodes with replacement
//! characters and the result is flagged so callers can log it.
//!
//! The order matters: bytes that happen to be valid under an earlier
//! candidate are accepted under that candidate, whatever the author meant.

use encoding_rs::{Encoding, EUC_KR, UTF_8, WINDOWS_1252};
use sheetload_common::ImportConfig;
use std::borrow::Cow;
use thiserror::Error;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Encoding resolver errors
#[derive(Debug, Error)]
pub enum EncodingError {
    /// Label not recognized as an encoding
    #[error("Unknown encoding label: {0}")]
    UnknownLabel(String),

    /// Every strict candidate failed and no fallback is configured
    #[error("No candidate encoding could decode the file (tried {})", .tried.join(", "))]
    NoCandidateMatched { tried: Vec<String> },
}

/// Decoded text together with the encoding that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static Encoding,
    /// True when the lossy fallback was used
    pub used_fallback: bool,
}

impl Decoded {
    pub fn encoding_name(&self) -> &'static str {
        self.encoding.name()
    }
}

/// Deterministic try-in-order decoder
#[derive(Debug, Clone)]
pub struct EncodingResolver {
    candidates: Vec<&'static Encoding>,
    fallback: Option<&'static Encoding>,
}

impl Default for EncodingResolver {
    /// UTF-8, then cp949 (WHATWG `EUC-KR`), then lossy latin-1 (`windows-1252`)
    fn default() -> Self {
        Self::new(vec![UTF_8, EUC_KR], Some(WINDOWS_1252))
    }
}

impl EncodingResolver {
    pub fn new(candidates: Vec<&'static Encoding>, fallback: Option<&'static Encoding>) -> Self {
        Self {
            candidates,
            fallback,
        }
    }

    /// Build from WHATWG labels; an empty fallback label disables the fallback
    pub fn from_labels<S: AsRef<str>>(
        candidates: &[S],
        fallback: &str,
    ) -> Result<Self, EncodingError> {
        let candidates = candidates
            .iter()
            .map(|label| lookup(label.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let fallback = if fallback.trim().is_empty() {
            None
        } else {
            Some(lookup(fallback)?)
        };

        Ok(Self::new(candidates, fallback))
    }

    pub fn from_config(config: &ImportConfig) -> Result<Self, EncodingError> {
        Self::from_labels(&config.encodings, &config.fallback_encoding)
    }

    /// Decode `bytes` with the first candidate that accepts them strictly
    ///
    /// Empty input decodes to empty text under the first candidate.
    pub fn resolve(&self, bytes: &[u8]) -> Result<Decoded, EncodingError> {
        for &encoding in &self.candidates {
            if let Some(text) = decode_strict(encoding, bytes) {
                return Ok(Decoded {
                    text: text.into_owned(),
                    encoding,
                    used_fallback: false,
                });
            }
            tracing::trace!(encoding = encoding.name(), "Strict decode rejected input");
        }

        match self.fallback {
            Some(encoding) => {
                let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
                tracing::debug!(
                    encoding = encoding.name(),
                    had_errors,
                    "All strict candidates failed, using lossy fallback"
                );
                Ok(Decoded {
                    text: text.into_owned(),
                    encoding,
                    used_fallback: true,
                })
            }
            None => Err(EncodingError::NoCandidateMatched {
                tried: self
                    .candidates
                    .iter()
                    .map(|e| e.name().to_string())
                    .collect(),
            }),
        }
    }
}

fn lookup(label: &str) -> Result<&'static Encoding, EncodingError> {
    Encoding::for_label_no_replacement(label.trim().as_bytes())
        .ok_or_else(|| EncodingError::UnknownLabel(label.to_string()))
}

fn decode_strict<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
    let body = if encoding == UTF_8 {
        bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
    } else {
        bytes
    };
    encoding.decode_without_bom_handling_and_without_replacement(body)
}
