//! Text encodings for symbols and character vectors.

use crate::error::ProtocolError;
use std::borrow::Cow;
use std::str::FromStr;

/// Character encoding applied to every text field of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextEncoding {
    /// ISO-8859-1: one byte per character, code points above U+00FF rejected.
    #[default]
    Latin1,
    Utf8,
}

impl TextEncoding {
    /// Encodes `text` to bytes.
    pub fn encode<'a>(&self, text: &'a str) -> Result<Cow<'a, [u8]>, ProtocolError> {
        match self {
            TextEncoding::Utf8 => Ok(Cow::Borrowed(text.as_bytes())),
            TextEncoding::Latin1 if text.is_ascii() => Ok(Cow::Borrowed(text.as_bytes())),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        ProtocolError::Encoding(format!("{c:?} is not representable in Latin-1"))
                    })
                })
                .collect::<Result<Vec<u8>, _>>()
                .map(Cow::Owned),
        }
    }

    /// Decodes `bytes` to a string.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, ProtocolError> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| ProtocolError::Encoding(e.to_string())),
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }

    /// Encodes `text` up to, not including, its first NUL character. The
    /// wire terminates text with a zero byte, so anything after an embedded
    /// NUL cannot be transmitted.
    pub fn encode_terminated<'a>(&self, text: &'a str) -> Result<Cow<'a, [u8]>, ProtocolError> {
        let end = text.find('\0').unwrap_or(text.len());
        self.encode(&text[..end])
    }

    /// Number of bytes [`encode_terminated`](Self::encode_terminated) produces.
    pub fn terminated_len(&self, text: &str) -> Result<usize, ProtocolError> {
        let end = text.find('\0').unwrap_or(text.len());
        let text = &text[..end];
        match self {
            TextEncoding::Utf8 => Ok(text.len()),
            TextEncoding::Latin1 => {
                if let Some(c) = text.chars().find(|c| u32::from(*c) > 0xFF) {
                    return Err(ProtocolError::Encoding(format!(
                        "{c:?} is not representable in Latin-1"
                    )));
                }
                Ok(text.chars().count())
            }
        }
    }

    /// Number of bytes [`encode`](Self::encode) produces.
    pub fn encoded_len(&self, text: &str) -> Result<usize, ProtocolError> {
        match self {
            TextEncoding::Utf8 => Ok(text.len()),
            TextEncoding::Latin1 => Ok(self.encode(text)?.len()),
        }
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "latin1" | "latin-1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            other => Err(format!("unknown text encoding: {other}")),
        }
    }
}
