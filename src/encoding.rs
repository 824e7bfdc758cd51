//! Encoding tables, text error policy and newline translation.
//!
//! Every dialect has a fixed table from public encoding names to a native
//! identifier: an `iconv` charset on POSIX, a .NET encoding expression on
//! Windows, and a local codec tag on EFI-shell.  Names are resolved before
//! anything is sent to the remote, so an unknown name never costs a round
//! trip.

use std::str::FromStr;

use crate::dialect::Dialect;
use crate::errors::{PathError, PathResult};

// ---------------------------------------------------------------------------
// Error policy
// ---------------------------------------------------------------------------

/// What to do with bytes or characters the chosen encoding cannot carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextErrors {
    #[default]
    Strict,
    Replace,
    Ignore,
}

impl FromStr for TextErrors {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(TextErrors::Strict),
            "replace" => Ok(TextErrors::Replace),
            "ignore" => Ok(TextErrors::Ignore),
            other => Err(PathError::InvalidData(format!(
                "unknown error policy '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

const WINDOWS_ENCODINGS: &[(&str, &str)] = &[
    ("ascii", "[Text.Encoding]::ASCII"),
    ("bigendianunicode", "[Text.Encoding]::BigEndianUnicode"),
    ("bigendianutf32", "(New-Object Text.UTF32Encoding $true, $true)"),
    (
        "oem",
        "[Text.Encoding]::GetEncoding([Globalization.CultureInfo]::CurrentCulture.TextInfo.OEMCodePage)",
    ),
    ("unicode", "[Text.Encoding]::Unicode"),
    ("utf7", "[Text.Encoding]::UTF7"),
    ("utf8", "(New-Object Text.UTF8Encoding $false)"),
    ("utf8BOM", "(New-Object Text.UTF8Encoding $true)"),
    ("utf8NoBOM", "(New-Object Text.UTF8Encoding $false)"),
    ("utf32", "[Text.Encoding]::UTF32"),
];

const POSIX_UNICODE: &[(&str, &str)] = &[
    ("utf-7", "UTF-7"),
    ("utf7", "UTF-7"),
    ("utf-8", "UTF-8"),
    ("utf8", "UTF-8"),
    ("utf-16", "UTF-16"),
    ("utf16", "UTF-16"),
    ("utf-16be", "UTF-16BE"),
    ("utf16be", "UTF-16BE"),
    ("utf-16le", "UTF-16LE"),
    ("utf16le", "UTF-16LE"),
    ("utf-32", "UTF-32"),
    ("utf32", "UTF-32"),
    ("utf-32be", "UTF-32BE"),
    ("utf32be", "UTF-32BE"),
    ("utf-32le", "UTF-32LE"),
    ("utf32le", "UTF-32LE"),
];

/// Charsets every mainstream `iconv` (glibc, musl, libiconv) knows.
const POSIX_CHARSETS: &[&str] = &[
    "ASCII",
    "US-ASCII",
    "ISO-8859-1",
    "ISO-8859-2",
    "ISO-8859-3",
    "ISO-8859-4",
    "ISO-8859-5",
    "ISO-8859-6",
    "ISO-8859-7",
    "ISO-8859-8",
    "ISO-8859-9",
    "ISO-8859-10",
    "ISO-8859-11",
    "ISO-8859-13",
    "ISO-8859-14",
    "ISO-8859-15",
    "ISO-8859-16",
    "LATIN1",
    "LATIN2",
    "LATIN3",
    "LATIN4",
    "LATIN5",
    "LATIN6",
    "LATIN7",
    "LATIN8",
    "LATIN9",
    "LATIN10",
    "CP437",
    "CP850",
    "CP866",
    "CP874",
    "CP1250",
    "CP1251",
    "CP1252",
    "CP1253",
    "CP1254",
    "CP1255",
    "CP1256",
    "CP1257",
    "CP1258",
    "WINDOWS-874",
    "WINDOWS-1250",
    "WINDOWS-1251",
    "WINDOWS-1252",
    "WINDOWS-1253",
    "WINDOWS-1254",
    "WINDOWS-1255",
    "WINDOWS-1256",
    "WINDOWS-1257",
    "WINDOWS-1258",
    "KOI8-R",
    "KOI8-U",
    "SHIFT_JIS",
    "EUC-JP",
    "EUC-KR",
    "GB2312",
    "GBK",
    "GB18030",
    "BIG5",
];

const EFI_ENCODINGS: &[(&str, &str)] = &[
    ("ascii", EFI_ASCII),
    ("ucs-2", EFI_UCS2),
    ("ucs2", EFI_UCS2),
    ("unicode", EFI_UCS2),
    ("utf-16le", EFI_UCS2),
    ("utf16le", EFI_UCS2),
];

pub(crate) const EFI_ASCII: &str = "ascii";
pub(crate) const EFI_UCS2: &str = "ucs-2";

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// An encoding name resolved against one dialect's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedEncoding {
    pub dialect: Dialect,
    /// Public name as listed in the table.
    pub name: &'static str,
    /// Native identifier handed to the remote (or to the local codec).
    pub native: &'static str,
}

impl ResolvedEncoding {
    /// UTF-8 on POSIX needs no remote conversion.
    pub fn is_posix_utf8(&self) -> bool {
        self.dialect == Dialect::Posix && self.native == "UTF-8"
    }
}

/// The name `None` resolves to.
pub fn default_encoding(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Posix => "utf-8",
        Dialect::Windows => "utf8",
        Dialect::EfiShell => "unicode",
    }
}

/// Resolve `name` (or the dialect default) against `dialect`'s table.
///
/// Matching is case-insensitive.  Unknown names fail with
/// [`PathError::UnsupportedEncoding`].
pub fn resolve(dialect: Dialect, name: Option<&str>) -> PathResult<ResolvedEncoding> {
    let wanted = name.unwrap_or_else(|| default_encoding(dialect)).trim();
    let found = match dialect {
        Dialect::Windows => lookup(WINDOWS_ENCODINGS, wanted),
        Dialect::EfiShell => lookup(EFI_ENCODINGS, wanted),
        Dialect::Posix => lookup(POSIX_UNICODE, wanted).or_else(|| {
            POSIX_CHARSETS
                .iter()
                .find(|cs| cs.eq_ignore_ascii_case(wanted))
                .map(|cs| (*cs, *cs))
        }),
    };
    match found {
        Some((name, native)) => Ok(ResolvedEncoding {
            dialect,
            name,
            native,
        }),
        None => Err(PathError::UnsupportedEncoding {
            name: wanted.to_string(),
            dialect,
        }),
    }
}

fn lookup(table: &'static [(&'static str, &'static str)], wanted: &str) -> Option<(&'static str, &'static str)> {
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
        .copied()
}

// ---------------------------------------------------------------------------
// Newlines
// ---------------------------------------------------------------------------

/// Translate `\n` for writing.
///
/// `None` uses the dialect's native terminator.  `Some(s)` replaces every
/// `\n` with `s` literally; `Some("")` and `Some("\n")` leave the text
/// untouched.
pub fn newlines_for_write(text: &str, dialect: Dialect, newline: Option<&str>) -> String {
    let target = match newline {
        None => dialect.native_newline(),
        Some("") => return text.to_string(),
        Some(explicit) => explicit,
    };
    if target == "\n" {
        text.to_string()
    } else {
        text.replace('\n', target)
    }
}

/// Translate the dialect's native terminator back to `\n` after reading.
pub fn newlines_after_read(text: String, dialect: Dialect) -> String {
    match dialect.native_newline() {
        "\n" => text,
        native => text.replace(native, "\n"),
    }
}

// ---------------------------------------------------------------------------
// Local codecs
// ---------------------------------------------------------------------------

pub fn decode_utf8(bytes: &[u8], errors: TextErrors) -> PathResult<String> {
    match errors {
        TextErrors::Strict => std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| PathError::InvalidData(format!("invalid utf-8: {e}"))),
        TextErrors::Replace => Ok(String::from_utf8_lossy(bytes).into_owned()),
        TextErrors::Ignore => Ok(bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()),
    }
}

pub fn encode_ascii(text: &str, errors: TextErrors) -> PathResult<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c as u8);
            continue;
        }
        match errors {
            TextErrors::Strict => {
                return Err(PathError::InvalidData(format!(
                    "character {c:?} cannot be encoded as ascii"
                )));
            }
            TextErrors::Replace => out.push(b'?'),
            TextErrors::Ignore => {}
        }
    }
    Ok(out)
}

pub fn decode_ascii(bytes: &[u8], errors: TextErrors) -> PathResult<String> {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b.is_ascii() {
            out.push(b as char);
            continue;
        }
        match errors {
            TextErrors::Strict => {
                return Err(PathError::InvalidData(format!(
                    "byte 0x{b:02x} is not ascii"
                )));
            }
            TextErrors::Replace => out.push(char::REPLACEMENT_CHARACTER),
            TextErrors::Ignore => {}
        }
    }
    Ok(out)
}

const UCS2_BOM: [u8; 2] = [0xFF, 0xFE];

/// Encode as little-endian UCS-2 with a leading byte-order mark.
pub fn encode_ucs2(text: &str, errors: TextErrors) -> PathResult<Vec<u8>> {
    let mut out = Vec::with_capacity(2 + text.len() * 2);
    out.extend_from_slice(&UCS2_BOM);
    for c in text.chars() {
        let mut units = [0u16; 2];
        let encoded = c.encode_utf16(&mut units);
        if encoded.len() == 1 {
            out.extend_from_slice(&encoded[0].to_le_bytes());
            continue;
        }
        match errors {
            TextErrors::Strict => {
                return Err(PathError::InvalidData(format!(
                    "character {c:?} is outside the UCS-2 range"
                )));
            }
            TextErrors::Replace => out.extend_from_slice(&u16::from(b'?').to_le_bytes()),
            TextErrors::Ignore => {}
        }
    }
    Ok(out)
}

/// Decode little-endian UCS-2/UTF-16, dropping a leading byte-order mark.
pub fn decode_ucs2(bytes: &[u8], errors: TextErrors) -> PathResult<String> {
    let body = bytes.strip_prefix(&UCS2_BOM[..]).unwrap_or(bytes);
    if body.len() % 2 != 0 && errors == TextErrors::Strict {
        return Err(PathError::InvalidData(
            "odd number of bytes in UCS-2 data".to_string(),
        ));
    }
    let units = body
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
    let mut out = String::with_capacity(body.len() / 2);
    for decoded in char::decode_utf16(units) {
        match (decoded, errors) {
            (Ok(c), _) => out.push(c),
            (Err(e), TextErrors::Strict) => {
                return Err(PathError::InvalidData(format!("invalid UCS-2 data: {e}")));
            }
            (Err(_), TextErrors::Replace) => out.push(char::REPLACEMENT_CHARACTER),
            (Err(_), TextErrors::Ignore) => {}
        }
    }
    if body.len() % 2 != 0 && errors == TextErrors::Replace {
        out.push(char::REPLACEMENT_CHARACTER);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn windows_table_is_case_insensitive() {
        let enc = resolve(Dialect::Windows, Some("UTF8bom")).unwrap();
        assert_eq!(enc.name, "utf8BOM");
        assert_eq!(enc.native, "(New-Object Text.UTF8Encoding $true)");
    }

    #[test]
    fn windows_supports_every_documented_name() {
        for name in [
            "ascii",
            "bigendianunicode",
            "bigendianutf32",
            "oem",
            "unicode",
            "utf7",
            "utf8",
            "utf8BOM",
            "utf8NoBOM",
            "utf32",
        ] {
            assert!(resolve(Dialect::Windows, Some(name)).is_ok(), "{name}");
        }
    }

    #[test]
    fn posix_accepts_hyphen_free_variants() {
        assert_eq!(resolve(Dialect::Posix, Some("utf16le")).unwrap().native, "UTF-16LE");
        assert_eq!(resolve(Dialect::Posix, Some("UTF-32BE")).unwrap().native, "UTF-32BE");
        assert_eq!(resolve(Dialect::Posix, Some("latin1")).unwrap().native, "LATIN1");
    }

    #[test]
    fn defaults_per_dialect() {
        assert!(resolve(Dialect::Posix, None).unwrap().is_posix_utf8());
        assert_eq!(resolve(Dialect::Windows, None).unwrap().name, "utf8");
        assert_eq!(resolve(Dialect::EfiShell, None).unwrap().native, EFI_UCS2);
    }

    #[test]
    fn unknown_name_is_unsupported() {
        for dialect in [Dialect::Posix, Dialect::Windows, Dialect::EfiShell] {
            let err = resolve(dialect, Some("bogus-7")).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedEncoding);
        }
        // Windows names are not POSIX names.
        assert!(resolve(Dialect::Posix, Some("bigendianunicode")).is_err());
    }

    #[test]
    fn error_policy_from_str() {
        assert_eq!("Replace".parse::<TextErrors>().unwrap(), TextErrors::Replace);
        assert!("surrogateescape".parse::<TextErrors>().is_err());
    }

    #[test]
    fn newline_translation_for_write() {
        assert_eq!(newlines_for_write("a\nb", Dialect::Posix, None), "a\nb");
        assert_eq!(newlines_for_write("a\nb", Dialect::Windows, None), "a\r\nb");
        assert_eq!(newlines_for_write("a\nb", Dialect::Windows, Some("\n")), "a\nb");
        assert_eq!(newlines_for_write("a\nb", Dialect::Posix, Some("\r\n")), "a\r\nb");
        assert_eq!(newlines_for_write("a\nb", Dialect::EfiShell, Some("")), "a\nb");
    }

    #[test]
    fn newline_translation_after_read() {
        assert_eq!(newlines_after_read("a\r\nb".into(), Dialect::Windows), "a\nb");
        assert_eq!(newlines_after_read("a\r\nb".into(), Dialect::Posix), "a\r\nb");
    }

    #[test]
    fn utf8_error_policies() {
        let bytes = b"ok\xffdone";
        assert!(decode_utf8(bytes, TextErrors::Strict).is_err());
        assert_eq!(decode_utf8(bytes, TextErrors::Replace).unwrap(), "ok\u{fffd}done");
        assert_eq!(decode_utf8(bytes, TextErrors::Ignore).unwrap(), "okdone");
    }

    #[test]
    fn ascii_error_policies() {
        assert!(encode_ascii("é", TextErrors::Strict).is_err());
        assert_eq!(encode_ascii("aé", TextErrors::Replace).unwrap(), b"a?");
        assert_eq!(encode_ascii("aé", TextErrors::Ignore).unwrap(), b"a");
        assert_eq!(decode_ascii(b"a\x80", TextErrors::Replace).unwrap(), "a\u{fffd}");
    }

    #[test]
    fn ucs2_writes_bom_and_little_endian_units() {
        assert_eq!(
            encode_ucs2("hi", TextErrors::Strict).unwrap(),
            [0xFF, 0xFE, b'h', 0, b'i', 0]
        );
        assert_eq!(decode_ucs2(&[0xFF, 0xFE, b'h', 0, b'i', 0], TextErrors::Strict).unwrap(), "hi");
        assert_eq!(decode_ucs2(&[b'h', 0], TextErrors::Strict).unwrap(), "h");
    }

    #[test]
    fn ucs2_rejects_astral_characters_when_strict() {
        assert!(encode_ucs2("😀", TextErrors::Strict).is_err());
        assert_eq!(
            encode_ucs2("😀", TextErrors::Replace).unwrap(),
            [0xFF, 0xFE, b'?', 0]
        );
    }

    #[test]
    fn ucs2_odd_length() {
        assert!(decode_ucs2(&[b'h', 0, b'i'], TextErrors::Strict).is_err());
        assert_eq!(decode_ucs2(&[b'h', 0, b'i'], TextErrors::Ignore).unwrap(), "h");
    }
}
