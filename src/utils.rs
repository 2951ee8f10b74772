use std::char::decode_utf16;
use std::fmt;

use crate::error::{Error, ErrorKind};

/// Helper to HTML escape a string.
///
/// This escapes exactly the characters the builtin `html` filter is
/// contracted to escape: `&`, `<`, `>` and `"`.
pub struct HtmlEscape<'a>(pub &'a str);

impl fmt::Display for HtmlEscape<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut start = 0;
        for (idx, b) in self.0.bytes().enumerate() {
            let entity = match b {
                b'&' => "&amp;",
                b'<' => "&lt;",
                b'>' => "&gt;",
                b'"' => "&quot;",
                _ => continue,
            };
            ok!(f.write_str(&self.0[start..idx]));
            ok!(f.write_str(entity));
            start = idx + 1;
        }
        f.write_str(&self.0[start..])
    }
}

fn bad_escape() -> Error {
    Error::from(ErrorKind::BadEscape)
}

/// Un-escapes the contents of a quoted string literal.
///
/// Both quote styles use backslash escapes; `\uXXXX` (including surrogate
/// pairs) follows JSON rules like the original dialect.
pub fn unescape(s: &str) -> Result<String, Error> {
    let mut rv = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            rv.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => rv.push('"'),
            Some('\'') => rv.push('\''),
            Some('\\') => rv.push('\\'),
            Some('/') => rv.push('/'),
            Some('b') => rv.push('\x08'),
            Some('f') => rv.push('\x0C'),
            Some('n') => rv.push('\n'),
            Some('r') => rv.push('\r'),
            Some('t') => rv.push('\t'),
            Some('u') => {
                let mut units = vec![ok!(parse_u16(&mut chars))];
                // a high surrogate must be followed by an escaped low surrogate
                if (0xD800..=0xDBFF).contains(&units[0]) {
                    if chars.next() != Some('\\') || chars.next() != Some('u') {
                        return Err(bad_escape());
                    }
                    units.push(ok!(parse_u16(&mut chars)));
                }
                match decode_utf16(units).collect::<Result<String, _>>() {
                    Ok(s) => rv.push_str(&s),
                    Err(_) => return Err(bad_escape()),
                }
            }
            _ => return Err(bad_escape()),
        }
    }
    Ok(rv)
}

fn parse_u16(chars: &mut std::str::Chars) -> Result<u16, Error> {
    let hexnum: String = chars.take(4).collect();
    if hexnum.len() != 4 {
        return Err(bad_escape());
    }
    u16::from_str_radix(&hexnum, 16).map_err(|_| bad_escape())
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_html_escape() {
        let input = "<tag> & \"quoted\"";
        let output = HtmlEscape(input).to_string();
        assert_eq!(output, "&lt;tag&gt; &amp; &quot;quoted&quot;");
    }

    #[test]
    fn test_html_escape_passthrough() {
        assert_eq!(HtmlEscape("it's fine / safe").to_string(), "it's fine / safe");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("foo\\u2603bar").unwrap(), "foo\u{2603}bar");
        assert_eq!(unescape("\\t\\b\\f\\r\\n\\\\\\/").unwrap(), "\t\x08\x0c\r\n\\/");
        assert_eq!(unescape("foobarbaz").unwrap(), "foobarbaz");
        assert_eq!(unescape("\\ud83d\\udca9").unwrap(), "💩");
        assert!(unescape("\\q").is_err());
        assert!(unescape("\\u12").is_err());
    }
}
