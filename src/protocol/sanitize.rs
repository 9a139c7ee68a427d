// Unpaired surrogate repair at the serialization boundary.
//
// Rust strings cannot hold lone surrogates, but peers can still produce them:
// as raw UTF-16 or as `\uD83D`-style escapes inside JSON text, which
// serde_json rejects outright. Both helpers replace every unpaired surrogate
// with U+FFFD and are idempotent.

use std::borrow::Cow;

const REPLACEMENT_ESCAPE: &str = "\\ufffd";

/// Decode UTF-16, replacing unpaired surrogates with U+FFFD.
pub fn sanitize_utf16(units: &[u16]) -> String {
    char::decode_utf16(units.iter().copied())
        .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Rewrite lone surrogate `\uXXXX` escapes in JSON text to `\ufffd`.
///
/// Valid surrogate pairs and all other text are left untouched; input
/// without anything to repair is returned borrowed.
pub fn sanitize_json(text: &str) -> Cow<'_, str> {
    if !text.contains("\\u") {
        return Cow::Borrowed(text);
    }

    let bytes = text.as_bytes();
    let mut out = String::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            i += 1;
            continue;
        }

        // Any escape other than \u is two bytes long (\\, \", \n, ...)
        let Some(unit) = escape_unit(bytes, i) else {
            i += 2;
            continue;
        };

        match unit {
            0xD800..=0xDBFF => {
                let paired = matches!(escape_unit(bytes, i + 6), Some(0xDC00..=0xDFFF));
                if paired {
                    i += 12;
                } else {
                    out.push_str(&text[copied..i]);
                    out.push_str(REPLACEMENT_ESCAPE);
                    i += 6;
                    copied = i;
                }
            }
            0xDC00..=0xDFFF => {
                out.push_str(&text[copied..i]);
                out.push_str(REPLACEMENT_ESCAPE);
                i += 6;
                copied = i;
            }
            _ => i += 6,
        }
    }

    if copied == 0 {
        return Cow::Borrowed(text);
    }
    out.push_str(&text[copied..]);
    Cow::Owned(out)
}

/// Code unit of a well-formed `\uXXXX` escape starting at `at`.
fn escape_unit(bytes: &[u8], at: usize) -> Option<u16> {
    let escape = bytes.get(at..at + 6)?;
    if escape[0] != b'\\' || escape[1] != b'u' {
        return None;
    }
    let hex = &escape[2..];
    if !hex.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let hex = std::str::from_utf8(hex).ok()?;
    u16::from_str_radix(hex, 16).ok()
}
