//! Status channel classification
//!
//! The register writes free-form status text over TCP in whatever code page its
//! firmware happens to use. The buffer is decoded with an ordered list of
//! candidate encodings and searched for configured phrases; when no phrase
//! matches, the raw bytes are searched for known greeting fragments as a last
//! resort.

use encoding_rs::Encoding;

use crate::config::{ConfigError, MatcherConfig};

/// What a status buffer means for the current transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    ConfirmedPayment,
    Return,
    Unrecognized,
}

impl std::fmt::Display for StatusClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusClass::ConfirmedPayment => write!(f, "confirmed payment"),
            StatusClass::Return => write!(f, "return"),
            StatusClass::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

/// Which configured indicator produced a classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indicator {
    Phrase(String),
    /// Hex form of the matched byte pattern
    BytePattern(String),
}

/// Full classification result, for logging
#[derive(Debug, Clone)]
pub struct StatusMatch {
    pub class: StatusClass,
    pub indicator: Option<Indicator>,
    /// Encoding the text was decoded with
    pub encoding: &'static str,
    pub text: String,
}

/// Compiled form of [`MatcherConfig`]
#[derive(Debug, Clone)]
pub struct StatusMatcher {
    encodings: Vec<&'static Encoding>,
    success_phrases: Vec<String>,
    return_phrases: Vec<String>,
    byte_patterns: Vec<Vec<u8>>,
    max_buffer: usize,
}

fn lowercase_phrases(phrases: &[String]) -> Result<Vec<String>, ConfigError> {
    phrases
        .iter()
        .map(|phrase| {
            let phrase = phrase.trim();
            if phrase.is_empty() {
                Err(ConfigError::EmptyPhrase)
            } else {
                Ok(phrase.to_lowercase())
            }
        })
        .collect()
}

impl StatusMatcher {
    pub fn from_config(config: &MatcherConfig) -> Result<Self, ConfigError> {
        if config.encodings.is_empty() {
            return Err(ConfigError::NoEncodings);
        }
        if config.max_status_buffer == 0 {
            return Err(ConfigError::ZeroStatusBuffer);
        }

        let encodings = config
            .encodings
            .iter()
            .map(|label| {
                Encoding::for_label(label.trim().as_bytes())
                    .ok_or_else(|| ConfigError::UnknownEncoding(label.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let byte_patterns = config
            .byte_patterns
            .iter()
            .map(|pattern| match hex::decode(pattern.trim()) {
                Ok(bytes) if bytes.is_empty() => Err(ConfigError::InvalidBytePattern {
                    pattern: pattern.clone(),
                    reason: "empty pattern".to_string(),
                }),
                Ok(bytes) => Ok(bytes),
                Err(e) => Err(ConfigError::InvalidBytePattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            encodings,
            success_phrases: lowercase_phrases(&config.success_phrases)?,
            return_phrases: lowercase_phrases(&config.return_phrases)?,
            byte_patterns,
            max_buffer: config.max_status_buffer,
        })
    }

    /// Bytes a status connection may accumulate without a classification
    pub fn max_buffer(&self) -> usize {
        self.max_buffer
    }

    /// Decode with the first candidate that accepts the bytes cleanly.
    ///
    /// If every candidate sees malformed input, the first one decodes with
    /// replacement characters.
    pub fn decode(&self, raw: &[u8]) -> (String, &'static Encoding) {
        for encoding in &self.encodings {
            if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(raw) {
                return (text.into_owned(), *encoding);
            }
        }

        let fallback = self.encodings[0];
        let (text, _had_errors) = fallback.decode_without_bom_handling(raw);
        (text.into_owned(), fallback)
    }

    /// Lossy decoding under every candidate, for diagnostics
    pub fn candidate_decodings(&self, raw: &[u8]) -> Vec<(&'static str, String)> {
        self.encodings
            .iter()
            .map(|encoding| {
                let (text, _) = encoding.decode_without_bom_handling(raw);
                (encoding.name(), text.into_owned())
            })
            .collect()
    }

    pub fn inspect(&self, raw: &[u8]) -> StatusMatch {
        let (text, encoding) = self.decode(raw);
        let lowered = text.to_lowercase();

        let find_phrase = |phrases: &[String]| {
            phrases
                .iter()
                .find(|phrase| lowered.contains(phrase.as_str()))
                .map(|phrase| Indicator::Phrase(phrase.clone()))
        };

        let (class, indicator) = if let Some(found) = find_phrase(&self.return_phrases) {
            (StatusClass::Return, Some(found))
        } else if let Some(found) = find_phrase(&self.success_phrases) {
            (StatusClass::ConfirmedPayment, Some(found))
        } else if let Some(pattern) = self.find_byte_pattern(raw) {
            (
                StatusClass::ConfirmedPayment,
                Some(Indicator::BytePattern(hex::encode(pattern))),
            )
        } else {
            (StatusClass::Unrecognized, None)
        };

        StatusMatch {
            class,
            indicator,
            encoding: encoding.name(),
            text,
        }
    }

    pub fn classify(&self, raw: &[u8]) -> StatusClass {
        self.inspect(raw).class
    }

    fn find_byte_pattern(&self, raw: &[u8]) -> Option<&[u8]> {
        self.byte_patterns
            .iter()
            .find(|pattern| raw.windows(pattern.len()).any(|window| window == pattern.as_slice()))
            .map(Vec::as_slice)
    }
}
