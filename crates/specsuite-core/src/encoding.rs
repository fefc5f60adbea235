//! Byte encoding detection and transcoding.
//!
//! Covers what test documents actually use: UTF-8, UTF-16 in either byte
//! order, and windows-1252 (which HTML treats as the meaning of every
//! latin-1 label).

use std::fmt;

/// windows-1252 code points for bytes 0x80..=0x9F; everything else maps to
/// the identical Unicode scalar.
const WINDOWS_1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

/// HTML prescan window.
const PRESCAN_LIMIT: usize = 1024;

/// Supported document encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Windows1252,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf16Le => "utf-16le",
            Encoding::Utf16Be => "utf-16be",
            Encoding::Windows1252 => "windows-1252",
        }
    }

    /// Look up an encoding by label, ignoring case and surrounding
    /// whitespace.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" | "unicode-1-1-utf-8" => Some(Encoding::Utf8),
            "utf-16" | "utf-16le" | "utf16" | "unicode" => Some(Encoding::Utf16Le),
            "utf-16be" => Some(Encoding::Utf16Be),
            "windows-1252" | "cp1252" | "x-cp1252" | "latin1" | "latin-1" | "iso-8859-1"
            | "iso8859-1" | "iso_8859-1" | "l1" | "ascii" | "us-ascii" => {
                Some(Encoding::Windows1252)
            }
            _ => None,
        }
    }

    /// Decode `bytes`, replacing malformed sequences. A leading byte order
    /// mark matching this encoding is skipped.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => {
                let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(bytes);
                String::from_utf8_lossy(body).into_owned()
            }
            Encoding::Utf16Le => {
                let body = bytes.strip_prefix(&[0xFF, 0xFE][..]).unwrap_or(bytes);
                decode_utf16(body, u16::from_le_bytes)
            }
            Encoding::Utf16Be => {
                let body = bytes.strip_prefix(&[0xFE, 0xFF][..]).unwrap_or(bytes);
                decode_utf16(body, u16::from_be_bytes)
            }
            Encoding::Windows1252 => bytes
                .iter()
                .map(|&b| match b {
                    0x80..=0x9F => WINDOWS_1252_HIGH[(b - 0x80) as usize],
                    _ => b as char,
                })
                .collect(),
        }
    }

    /// Encode `text`. Characters the encoding cannot represent are written
    /// as numeric character references.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Encoding::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
            Encoding::Windows1252 => {
                let mut out = Vec::with_capacity(text.len());
                for c in text.chars() {
                    match encode_1252(c) {
                        Some(b) => out.push(b),
                        None => out.extend_from_slice(format!("&#{};", c as u32).as_bytes()),
                    }
                }
                out
            }
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn encode_1252(c: char) -> Option<u8> {
    let code = c as u32;
    if code < 0x80 || (0xA0..=0xFF).contains(&code) {
        return Some(code as u8);
    }
    WINDOWS_1252_HIGH
        .iter()
        .position(|&mapped| mapped == c)
        .map(|i| 0x80 + i as u8)
}

// ============================================================================
// Detection
// ============================================================================

/// Encoding announced by a byte order mark.
pub fn sniff_bom(bytes: &[u8]) -> Option<Encoding> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        Some(Encoding::Utf8)
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        Some(Encoding::Utf16Le)
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        Some(Encoding::Utf16Be)
    } else {
        None
    }
}

/// Detect the encoding of an XML-family document: byte order mark, then
/// the XML declaration, then UTF-8.
pub fn detect_xml(bytes: &[u8]) -> Encoding {
    if let Some(encoding) = sniff_bom(bytes) {
        return encoding;
    }
    if bytes.starts_with(&[0x3C, 0x00, 0x3F, 0x00]) {
        return Encoding::Utf16Le;
    }
    if bytes.starts_with(&[0x00, 0x3C, 0x00, 0x3F]) {
        return Encoding::Utf16Be;
    }
    if bytes.starts_with(b"<?xml") {
        let end = find(bytes, b"?>").unwrap_or(bytes.len().min(PRESCAN_LIMIT));
        let decl = String::from_utf8_lossy(&bytes[..end]);
        if let Some(label) = attribute_value(&decl, "encoding") {
            if let Some(encoding) = Encoding::from_label(&label) {
                return encoding;
            }
        }
    }
    Encoding::Utf8
}

/// Detect the encoding of an HTML document: byte order mark, then a
/// `<meta charset>` or `http-equiv` declaration in the first kilobyte, then
/// windows-1252.
pub fn detect_html(bytes: &[u8]) -> Encoding {
    if let Some(encoding) = sniff_bom(bytes) {
        return encoding;
    }
    prescan_meta(&bytes[..bytes.len().min(PRESCAN_LIMIT)]).unwrap_or(Encoding::Windows1252)
}

fn prescan_meta(window: &[u8]) -> Option<Encoding> {
    let text = String::from_utf8_lossy(window).to_ascii_lowercase();
    let mut rest = text.as_str();

    while let Some(start) = rest.find("<meta") {
        let after = &rest[start + 5..];
        let end = after.find('>').unwrap_or(after.len());
        let tag = &after[..end];
        rest = &after[end..];

        let declared = attribute_value(tag, "charset")
            .as_deref()
            .and_then(Encoding::from_label)
            .or_else(|| {
                let is_content_type = attribute_value(tag, "http-equiv")
                    .is_some_and(|v| v.trim() == "content-type");
                if !is_content_type {
                    return None;
                }
                attribute_value(tag, "content")
                    .and_then(|c| charset_from_content(&c))
                    .as_deref()
                    .and_then(Encoding::from_label)
            });

        if let Some(encoding) = declared {
            // A UTF-16 label found by scanning ASCII-compatible bytes is wrong.
            return Some(match encoding {
                Encoding::Utf16Le | Encoding::Utf16Be => Encoding::Utf8,
                other => other,
            });
        }
    }
    None
}

fn charset_from_content(content: &str) -> Option<String> {
    let idx = content.find("charset")?;
    let rest = content[idx + 7..].trim_start().strip_prefix('=')?.trim_start();
    let value: String = match rest.chars().next() {
        Some(q @ ('"' | '\'')) => rest[1..].chars().take_while(|&c| c != q).collect(),
        _ => rest
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != ';')
            .collect(),
    };
    (!value.is_empty()).then_some(value)
}

/// Value of `name=...` inside a tag body, quoted or not.
fn attribute_value(tag: &str, name: &str) -> Option<String> {
    let mut search = 0;
    while let Some(found) = tag[search..].find(name) {
        let idx = search + found;
        search = idx + name.len();

        let boundary = idx == 0 || {
            let prev = tag.as_bytes()[idx - 1];
            prev.is_ascii_whitespace() || prev == b'/' || prev == b'?'
        };
        if !boundary {
            continue;
        }
        let Some(rest) = tag[search..].trim_start().strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start();
        let value: String = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => rest[1..].chars().take_while(|&c| c != q).collect(),
            _ => rest
                .chars()
                .take_while(|c| !c.is_whitespace() && !matches!(c, '/' | '>' | '"' | '\'' | ';'))
                .collect(),
        };
        return Some(value);
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
