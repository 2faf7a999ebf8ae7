//! Output encodings and UTF-16 surrogate reassembly

use std::fmt;

use crate::error::{Result, XmlWriteError};

/// Charset of a byte-oriented output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    /// US-ASCII: only U+0000..U+007F written literally
    Ascii,
    /// ISO-8859-1: only U+0000..U+00FF written literally
    Latin1,
    /// Unsupported label; UTF-8 bytes are passed through untranscoded
    Other(String),
}

impl Encoding {
    /// Select an encoding from a charset label (case-insensitive, IANA names and aliases)
    pub fn from_label(label: &str) -> Self {
        let norm = label.trim().to_ascii_lowercase().replace('_', "-");
        match norm.as_str() {
            "utf-8" | "utf8" => Encoding::Utf8,
            "us-ascii" | "ascii" | "iso646-us" | "ansi-x3.4-1968" => Encoding::Ascii,
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "l1" | "iso-ir-100"
            | "cp819" => Encoding::Latin1,
            _ => Encoding::Other(label.trim().to_string()),
        }
    }

    /// Canonical name, as written into the XML declaration
    pub fn name(&self) -> &str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Ascii => "US-ASCII",
            Encoding::Latin1 => "ISO-8859-1",
            Encoding::Other(label) => label,
        }
    }

    /// Highest code point written as literal bytes
    pub fn max_code_point(&self) -> u32 {
        match self {
            Encoding::Ascii => 0x7F,
            Encoding::Latin1 => 0xFF,
            Encoding::Utf8 | Encoding::Other(_) => 0x10_FFFF,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Encoding::Other(_))
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[inline]
pub(crate) fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

#[inline]
pub(crate) fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

/// Combine a surrogate pair into its code point
#[inline]
pub(crate) fn combine_surrogates(high: u16, low: u16) -> char {
    let cp = 0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(low) - 0xDC00);
    // Every valid pair maps into U+10000..U+10FFFF
    char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Decode a chunk of UTF-16 into `out`.
///
/// `pending` is the carry cell: a high surrogate left there by the previous
/// chunk must be completed by the first unit of this one, and a trailing high
/// surrogate of this chunk is stored there instead of being decoded.
pub(crate) fn decode_utf16_chunk(
    pending: &mut Option<u16>,
    units: &[u16],
    out: &mut String,
) -> Result<()> {
    let mut i = 0;
    if let Some(high) = pending.take() {
        match units.first() {
            None => {
                *pending = Some(high);
                return Ok(());
            }
            Some(&low) if is_low_surrogate(low) => {
                out.push(combine_surrogates(high, low));
                i = 1;
            }
            Some(_) => return Err(XmlWriteError::UnpairedSurrogate(high)),
        }
    }

    while i < units.len() {
        let unit = units[i];
        if is_high_surrogate(unit) {
            match units.get(i + 1) {
                None => {
                    *pending = Some(unit);
                    break;
                }
                Some(&low) if is_low_surrogate(low) => {
                    out.push(combine_surrogates(unit, low));
                    i += 2;
                }
                Some(_) => return Err(XmlWriteError::UnpairedSurrogate(unit)),
            }
        } else if is_low_surrogate(unit) {
            return Err(XmlWriteError::UnpairedSurrogate(unit));
        } else {
            // Non-surrogate BMP units are always valid scalars
            out.push(char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER));
            i += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(Encoding::from_label("UTF-8"), Encoding::Utf8);
        assert_eq!(Encoding::from_label("iso_8859-1"), Encoding::Latin1);
        assert_eq!(Encoding::from_label("US-ASCII"), Encoding::Ascii);
        assert_eq!(
            Encoding::from_label("Shift_JIS"),
            Encoding::Other("Shift_JIS".to_string())
        );
        assert_eq!(Encoding::Latin1.max_code_point(), 0xFF);
        assert!(!Encoding::Other("x".into()).is_supported());
    }

    #[test]
    fn test_combine() {
        // U+1F600 = D83D DE00
        assert_eq!(combine_surrogates(0xD83D, 0xDE00), '\u{1F600}');
    }

    #[test]
    fn test_split_pair_across_chunks() {
        let mut pending = None;
        let mut out = String::new();
        decode_utf16_chunk(&mut pending, &[0x61, 0xD83D], &mut out).unwrap();
        assert_eq!(out, "a");
        assert_eq!(pending, Some(0xD83D));

        decode_utf16_chunk(&mut pending, &[0xDE00, 0x62], &mut out).unwrap();
        assert_eq!(out, "a\u{1F600}b");
        assert_eq!(pending, None);
    }

    #[test]
    fn test_empty_chunk_keeps_pending() {
        let mut pending = Some(0xD83D);
        let mut out = String::new();
        decode_utf16_chunk(&mut pending, &[], &mut out).unwrap();
        assert_eq!(pending, Some(0xD83D));
    }

    #[test]
    fn test_unpaired() {
        let mut pending = Some(0xD83D);
        let mut out = String::new();
        let err = decode_utf16_chunk(&mut pending, &[0x41], &mut out).unwrap_err();
        assert!(matches!(err, XmlWriteError::UnpairedSurrogate(0xD83D)));

        let mut pending = None;
        let err = decode_utf16_chunk(&mut pending, &[0xDE00], &mut out).unwrap_err();
        assert!(matches!(err, XmlWriteError::UnpairedSurrogate(0xDE00)));

        let err = decode_utf16_chunk(&mut pending, &[0xD83D, 0x41], &mut out).unwrap_err();
        assert!(matches!(err, XmlWriteError::UnpairedSurrogate(0xD83D)));
    }
}
