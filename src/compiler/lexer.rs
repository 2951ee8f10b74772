use crate::compiler::tokens::Token;
use crate::error::{Error, ErrorKind};

/// The four tag kinds, identified by their opening delimiter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum TagKind {
    /// `{{ ... }}`
    Output,
    /// `{{{ ... }}}`, sugar for a trailing `safe` filter.
    Unescaped,
    /// `{% ... %}`
    Directive,
    /// `{# ... #}`
    Comment,
}

impl TagKind {
    fn open_len(self) -> usize {
        match self {
            TagKind::Unescaped => 3,
            _ => 2,
        }
    }

    fn close_marker(self) -> &'static str {
        match self {
            TagKind::Output => "}}",
            TagKind::Unescaped => "}}}",
            TagKind::Directive => "%}",
            TagKind::Comment => "#}",
        }
    }
}

/// Finds the next opening delimiter in the input.
fn find_start_marker(a: &str) -> Option<(usize, TagKind)> {
    let bytes = a.as_bytes();
    let mut offset = 0;
    loop {
        let idx = offset + some!(bytes[offset..].iter().position(|&x| x == b'{'));
        match bytes.get(idx + 1) {
            Some(b'{') => {
                let kind = if bytes.get(idx + 2) == Some(&b'{') {
                    TagKind::Unescaped
                } else {
                    TagKind::Output
                };
                return Some((idx, kind));
            }
            Some(b'%') => return Some((idx, TagKind::Directive)),
            Some(b'#') => return Some((idx, TagKind::Comment)),
            _ => offset = idx + 1,
        }
    }
}

fn unterminated(close: &str) -> Error {
    Error::new(
        ErrorKind::SyntaxError,
        format!("unterminated tag: expected `{close}` before end of template"),
    )
}

/// Scans for the closing delimiter, skipping over quoted string literals so
/// a `}}` inside a string does not close the tag.  Returns the end of the
/// tag contents, the position after the closing delimiter, and whether a
/// trim marker preceded the delimiter.
///
/// A quote that cannot be read as a string literal (no matching close, or
/// skipping the string would leave the tag without a closing delimiter) is
/// a plain character, so `{# it's fine #}` tokenizes.  The `skipped` stack
/// records string skips to backtrack through.
fn scan_tag_end(src: &str, start: usize, close: &str) -> Result<(usize, usize, bool), Error> {
    let bytes = src.as_bytes();
    let close_bytes = close.as_bytes();
    let mut skipped: Vec<usize> = Vec::new();
    let mut idx = start;
    loop {
        if idx >= bytes.len() {
            match skipped.pop() {
                Some(quote_idx) => {
                    idx = quote_idx + 1;
                    continue;
                }
                None => return Err(unterminated(close)),
            }
        }
        if bytes[idx..].starts_with(close_bytes) {
            let trim_next = idx > start && bytes[idx - 1] == b'-';
            let content_end = if trim_next { idx - 1 } else { idx };
            return Ok((content_end, idx + close_bytes.len(), trim_next));
        }
        match bytes[idx] {
            quote @ (b'\'' | b'"') => match string_end(bytes, idx, quote) {
                Some(end) => {
                    skipped.push(idx);
                    idx = end;
                }
                None => idx += 1,
            },
            _ => idx += 1,
        }
    }
}

/// Returns the position after the closing quote of a string literal, or
/// `None` if the string never closes.
fn string_end(bytes: &[u8], quote_idx: usize, quote: u8) -> Option<usize> {
    let mut idx = quote_idx + 1;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 2,
            b if b == quote => return Some(idx + 1),
            _ => idx += 1,
        }
    }
    None
}

/// Matches `endraw %}` style tag remainders right after a `{%`, returning
/// the consumed length and the trim markers on either side.
fn match_endraw(s: &str) -> Option<(usize, bool, bool)> {
    let mut ptr = s;
    let mut trim_before = false;
    let mut trim_after = false;
    if let Some(rest) = ptr.strip_prefix('-') {
        ptr = rest;
        trim_before = true;
    }
    ptr = ptr.trim_start_matches(|x: char| x.is_ascii_whitespace());
    ptr = some!(ptr.strip_prefix("endraw"));
    ptr = ptr.trim_start_matches(|x: char| x.is_ascii_whitespace());
    if let Some(rest) = ptr.strip_prefix('-') {
        ptr = rest;
        trim_after = true;
    }
    ptr = some!(ptr.strip_prefix("%}"));
    Some((s.len() - ptr.len(), trim_before, trim_after))
}

/// Splits an output tag's contents on `|` into expression and filter
/// segments.  `||` and pipes inside string literals do not split.
fn split_pipeline(content: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            quote @ ('\'' | '"') => {
                current.push(quote);
                while let Some(c) = chars.next() {
                    current.push(c);
                    if c == '\\' {
                        if let Some(c) = chars.next() {
                            current.push(c);
                        }
                    } else if c == quote {
                        break;
                    }
                }
            }
            '|' => {
                if chars.peek() == Some(&'|') {
                    chars.next();
                    current.push_str("||");
                } else {
                    parts.push(current.trim().to_string());
                    current = String::new();
                }
            }
            _ => current.push(c),
        }
    }
    parts.push(current.trim().to_string());
    parts
}

/// Splits a directive's contents into keyword and argument string.
fn split_directive(content: &str) -> (String, String) {
    match content.split_once(|x: char| x.is_ascii_whitespace()) {
        Some((name, args)) => (name.to_string(), args.trim().to_string()),
        None => (content.to_string(), String::new()),
    }
}

/// Tokenizes template source into `(token, line)` pairs.
pub fn tokenize(source: &str, name: &str) -> Result<Vec<(Token, usize)>, Error> {
    let mut tokens: Vec<(Token, usize)> = Vec::new();
    let mut pos = 0;
    let mut lineno = 1;
    let mut trim_leading = false;

    let push_text = |tokens: &mut Vec<(Token, usize)>,
                     text: &str,
                     lineno: usize,
                     trim_leading: bool,
                     trim_trailing: bool| {
        let mut text = text;
        if trim_leading {
            text = text.trim_start();
        }
        if trim_trailing {
            text = text.trim_end();
        }
        if !text.is_empty() {
            tokens.push((Token::Text(text.to_string()), lineno));
        }
    };

    loop {
        let rest = &source[pos..];
        let (offset, kind) = match find_start_marker(rest) {
            Some(found) => found,
            None => {
                push_text(&mut tokens, rest, lineno, trim_leading, false);
                return Ok(tokens);
            }
        };

        let text = &rest[..offset];
        let tag_start = pos + offset;
        let mut content_start = tag_start + kind.open_len();
        let trim_trailing = source[content_start..].starts_with('-');
        if trim_trailing {
            content_start += 1;
        }
        let close = kind.close_marker();
        let (content_end, tag_end, trim_next) =
            match scan_tag_end(source, content_start, close) {
                Ok(found) => found,
                Err(mut err) => {
                    err.set_location_if_unset(name, lineno + count_newlines(text));
                    return Err(err);
                }
            };

        push_text(&mut tokens, text, lineno, trim_leading, trim_trailing);
        lineno += count_newlines(text);
        let tag_line = lineno;
        lineno += count_newlines(&source[tag_start..tag_end]);
        trim_leading = trim_next;
        pos = tag_end;

        let content = source[content_start..content_end].trim();
        match kind {
            TagKind::Comment => tokens.push((Token::Comment, tag_line)),
            TagKind::Output | TagKind::Unescaped => {
                let mut parts = split_pipeline(content);
                let expr = parts.remove(0);
                if kind == TagKind::Unescaped {
                    parts.push("safe".to_string());
                }
                tokens.push((Token::Output { expr, filters: parts }, tag_line));
            }
            TagKind::Directive => {
                let (tag, args) = split_directive(content);
                if tag == "raw" && args.is_empty() {
                    let (raw, raw_line) = match scan_raw_block(
                        source,
                        &mut pos,
                        &mut lineno,
                        &mut trim_leading,
                    ) {
                        Ok(found) => found,
                        Err(mut err) => {
                            err.set_location_if_unset(name, tag_line);
                            return Err(err);
                        }
                    };
                    tokens.push((Token::Raw(raw), raw_line));
                } else {
                    tokens.push((Token::Directive { name: tag, args }, tag_line));
                }
            }
        }
    }
}

/// Copies everything up to the matching `{% endraw %}` verbatim.
fn scan_raw_block(
    source: &str,
    pos: &mut usize,
    lineno: &mut usize,
    trim_leading: &mut bool,
) -> Result<(String, usize), Error> {
    let start = *pos;
    let raw_line = *lineno;
    let bytes = source.as_bytes();
    let mut idx = start;
    while idx + 1 < bytes.len() {
        if bytes[idx] == b'{' && bytes[idx + 1] == b'%' {
            if let Some((len, trim_before, trim_after)) = match_endraw(&source[idx + 2..]) {
                let mut raw = &source[start..idx];
                if *trim_leading {
                    raw = raw.trim_start();
                }
                if trim_before {
                    raw = raw.trim_end();
                }
                *lineno += count_newlines(&source[start..idx + 2 + len]);
                *pos = idx + 2 + len;
                *trim_leading = trim_after;
                return Ok((raw.to_string(), raw_line));
            }
        }
        idx += 1;
    }
    Err(Error::new(
        ErrorKind::SyntaxError,
        "unterminated raw block: expected `{% endraw %}` before end of template",
    ))
}

fn count_newlines(s: &str) -> usize {
    s.bytes().filter(|&b| b == b'\n').count()
}
