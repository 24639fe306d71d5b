//! Text encodings accepted for inline text attachments.
//!
//! The set is closed: a name outside it is rejected when the attachment is
//! resolved, never silently mapped to a fallback.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};

/// Byte encoding applied to inline text before it is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    /// UTF-8.
    Utf8,
    /// 7-bit ASCII; other characters become `?`.
    Ascii,
    /// ISO-8859-1; characters above U+00FF become `?`.
    Iso88591,
    /// Latin-1, byte-identical to ISO-8859-1.
    Latin1,
    /// Platform default, which is UTF-8.
    Default,
    /// UTF-7 (RFC 2152).
    Utf7,
    /// UTF-16 little endian without BOM.
    Utf16,
    /// UTF-32 little endian without BOM.
    Utf32,
}

/// Returned when an encoding name is not in the supported set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported text encoding: {0}")]
pub struct UnknownEncoding(pub String);

impl FromStr for TextEncoding {
    type Err = UnknownEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "ascii" | "us-ascii" => Ok(Self::Ascii),
            "iso-8859-1" | "iso8859-1" | "iso88591" => Ok(Self::Iso88591),
            "latin1" | "latin-1" => Ok(Self::Latin1),
            "default" => Ok(Self::Default),
            "utf-7" | "utf7" => Ok(Self::Utf7),
            "unicode" | "utf-16" | "utf16" => Ok(Self::Utf16),
            "utf-32" | "utf32" => Ok(Self::Utf32),
            _ => Err(UnknownEncoding(s.to_string())),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Utf8 => "utf-8",
            Self::Ascii => "ascii",
            Self::Iso88591 => "iso-8859-1",
            Self::Latin1 => "latin1",
            Self::Default => "default",
            Self::Utf7 => "utf-7",
            Self::Utf16 => "utf-16",
            Self::Utf32 => "utf-32",
        };
        f.write_str(name)
    }
}

impl TextEncoding {
    /// Encodes `text` into bytes.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 | Self::Default => text.as_bytes().to_vec(),
            Self::Ascii => narrow(text, 0x7F),
            Self::Iso88591 | Self::Latin1 => narrow(text, 0xFF),
            Self::Utf7 => encode_utf7(text).into_bytes(),
            Self::Utf16 => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Self::Utf32 => text.chars().flat_map(|c| (c as u32).to_le_bytes()).collect(),
        }
    }
}

/// Single-byte encoding with `?` for anything above `max`.
fn narrow(text: &str, max: u32) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) <= max { c as u32 as u8 } else { b'?' })
        .collect()
}

/// Characters written as themselves in UTF-7 (set D plus whitespace).
fn is_direct(c: char) -> bool {
    c.is_ascii_alphanumeric() || "'(),-./:? \t\r\n".contains(c)
}

fn encode_utf7(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending: Vec<u16> = Vec::new();

    let flush = |pending: &mut Vec<u16>, out: &mut String| {
        if pending.is_empty() {
            return;
        }
        let bytes: Vec<u8> = pending.iter().flat_map(|u| u.to_be_bytes()).collect();
        out.push('+');
        out.push_str(&STANDARD_NO_PAD.encode(bytes));
        out.push('-');
        pending.clear();
    };

    for c in text.chars() {
        if is_direct(c) {
            flush(&mut pending, &mut out);
            out.push(c);
        } else if c == '+' && pending.is_empty() {
            out.push_str("+-");
        } else {
            let mut units = [0u16; 2];
            pending.extend_from_slice(c.encode_utf16(&mut units));
        }
    }
    flush(&mut pending, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names_case_insensitively() {
        assert_eq!("UTF-8".parse::<TextEncoding>(), Ok(TextEncoding::Utf8));
        assert_eq!("Latin1".parse::<TextEncoding>(), Ok(TextEncoding::Latin1));
        assert_eq!("ISO88591".parse::<TextEncoding>(), Ok(TextEncoding::Iso88591));
        assert_eq!("unicode".parse::<TextEncoding>(), Ok(TextEncoding::Utf16));
        assert_eq!(" ascii ".parse::<TextEncoding>(), Ok(TextEncoding::Ascii));
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "ebcdic".parse::<TextEncoding>().unwrap_err();
        assert_eq!(err, UnknownEncoding("ebcdic".to_string()));
        assert!("".parse::<TextEncoding>().is_err());
    }

    #[test]
    fn single_byte_encodings_replace_unmappable() {
        assert_eq!(TextEncoding::Ascii.encode("aé€"), b"a??".to_vec());
        assert_eq!(TextEncoding::Latin1.encode("aé€"), vec![b'a', 0xE9, b'?']);
        assert_eq!(
            TextEncoding::Iso88591.encode("ö"),
            TextEncoding::Latin1.encode("ö")
        );
    }

    #[test]
    fn wide_encodings_are_little_endian() {
        assert_eq!(TextEncoding::Utf16.encode("A"), vec![0x41, 0x00]);
        assert_eq!(TextEncoding::Utf32.encode("A"), vec![0x41, 0, 0, 0]);
        // non-BMP character takes a surrogate pair
        assert_eq!(TextEncoding::Utf16.encode("😀").len(), 4);
    }

    #[test]
    fn utf7_encoding() {
        assert_eq!(TextEncoding::Utf7.encode("Hi Mom"), b"Hi Mom".to_vec());
        assert_eq!(TextEncoding::Utf7.encode("1 + 1"), b"1 +- 1".to_vec());
        assert_eq!(TextEncoding::Utf7.encode("£1"), b"+AKM-1".to_vec());
        assert_eq!(TextEncoding::Utf7.encode("日本語"), b"+ZeVnLIqe-".to_vec());
    }

    #[test]
    fn encoded_length_is_deterministic() {
        let text = "Räksmörgås";
        for encoding in [
            TextEncoding::Utf8,
            TextEncoding::Ascii,
            TextEncoding::Latin1,
            TextEncoding::Utf7,
            TextEncoding::Utf16,
            TextEncoding::Utf32,
        ] {
            assert_eq!(encoding.encode(text).len(), encoding.encode(text).len());
        }
        assert_eq!(TextEncoding::Latin1.encode(text).len(), 10);
        assert_eq!(TextEncoding::Utf32.encode(text).len(), 40);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let enc = TextEncoding::Utf7;
        assert_eq!(enc.to_string().parse::<TextEncoding>(), Ok(enc));
    }
}
