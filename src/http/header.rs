//! HTTP header fields (RFC 2616 section 4.2) and the typed views of the
//! fields that drive message framing.

use std::fmt;

use httparse::{EMPTY_HEADER, Status};
use serde::{Deserialize, Serialize};

use crate::bytes_ext::write_bytes;

pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const TRAILER: &str = "Trailer";

const CRLF: &[u8] = b"\r\n";

fn is_linear_white_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

/// Collapses every run of linear white space outside quoted strings to a
/// single space and trims both ends.
pub(crate) fn normalize_value(value: &[u8]) -> Vec<u8> {
    let mut normalized = Vec::with_capacity(value.len());
    let mut index = 0;
    while index < value.len() {
        let byte = value[index];
        if byte == b'"' {
            let start = index;
            index += 1;
            while index < value.len() && value[index] != b'"' {
                if value[index] == b'\\' && index + 1 < value.len() {
                    index += 1;
                }
                index += 1;
            }
            index = (index + 1).min(value.len());
            normalized.extend_from_slice(&value[start..index]);
        } else if is_linear_white_space(byte) {
            while index < value.len() && is_linear_white_space(value[index]) {
                index += 1;
            }
            normalized.push(b' ');
        } else {
            normalized.push(byte);
            index += 1;
        }
    }
    let start = normalized.iter().position(|&byte| byte != b' ').unwrap_or(normalized.len());
    let end = normalized.iter().rposition(|&byte| byte != b' ').map_or(start, |end| end + 1);
    normalized[start..end].to_vec()
}

/// One `name: value` line. Names compare case-insensitively.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct HttpField {
    name: String,
    #[serde(with = "serde_bytes")]
    value: Vec<u8>,
}

impl HttpField {
    /// Creates a field, folding white space in `value`.
    pub fn new(name: impl Into<String>, value: &str) -> Self {
        Self::from_bytes(name, value.as_bytes())
    }

    pub fn from_bytes(name: impl Into<String>, value: &[u8]) -> Self {
        Self {
            name: name.into(),
            value: normalize_value(value),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn value_string(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Wire length including the terminating CRLF.
    pub fn length(&self) -> usize {
        self.name.len() + 2 + self.value.len() + 2
    }

    fn write(&self, buffer: &mut [u8], offset: &mut usize) {
        write_bytes(buffer, offset, self.name.as_bytes());
        write_bytes(buffer, offset, b": ");
        write_bytes(buffer, offset, &self.value);
        write_bytes(buffer, offset, CRLF);
    }
}

impl PartialEq for HttpField {
    fn eq(&self, other: &Self) -> bool {
        self.is_named(&other.name) && self.value == other.value
    }
}

impl fmt::Display for HttpField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value_string())
    }
}

/// A `type/subtype; name=value` media type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpContentType {
    pub media_type: String,
    pub media_subtype: String,
    /// Parameter names are lowercased; quoted values are unquoted.
    pub parameters: Vec<(String, String)>,
}

impl HttpContentType {
    pub fn parse(value: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(value).ok()?;
        let mut parts = split_outside_quotes(text, ';').into_iter();
        let (media_type, media_subtype) = parts.next()?.trim().split_once('/')?;
        if media_type.is_empty() || media_subtype.is_empty() {
            return None;
        }
        let mut parameters = Vec::new();
        for part in parts {
            let (name, value) = part.trim().split_once('=')?;
            parameters.push((name.trim().to_ascii_lowercase(), unquote(value.trim())));
        }
        Some(Self {
            media_type: media_type.to_ascii_lowercase(),
            media_subtype: media_subtype.to_ascii_lowercase(),
            parameters,
        })
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(parameter, _)| parameter.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn split_outside_quotes(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (index, character) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match character {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == separator && !in_quotes => {
                parts.push(&text[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn unquote(value: &str) -> String {
    match value.strip_prefix('"').and_then(|inner| inner.strip_suffix('"')) {
        Some(inner) => {
            let mut unquoted = String::with_capacity(inner.len());
            let mut characters = inner.chars();
            while let Some(character) = characters.next() {
                match character {
                    '\\' => unquoted.extend(characters.next()),
                    _ => unquoted.push(character),
                }
            }
            unquoted
        }
        None => value.to_string(),
    }
}

/// Comma separated, lowercased list elements of a field value.
fn comma_separated(value: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(value)
        .split(',')
        .map(|element| element.trim().to_ascii_lowercase())
        .filter(|element| !element.is_empty())
        .collect()
}

/// Ordered header fields, with repeated names merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpHeader {
    fields: Vec<HttpField>,
}

impl HttpHeader {
    /// Builds a header; fields sharing a name are joined with `,` into the
    /// first occurrence.
    pub fn new(fields: impl IntoIterator<Item = HttpField>) -> Self {
        let mut header = Self::default();
        for field in fields {
            header.add(field);
        }
        header
    }

    pub fn add(&mut self, field: HttpField) {
        match self.fields.iter_mut().find(|existing| existing.is_named(&field.name)) {
            Some(existing) => {
                existing.value.push(b',');
                existing.value.extend_from_slice(&field.value);
            }
            None => self.fields.push(field),
        }
    }

    pub fn fields(&self) -> &[HttpField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&HttpField> {
        self.fields.iter().find(|field| field.is_named(name))
    }

    /// `None` when absent or not a decimal number.
    pub fn content_length(&self) -> Option<u64> {
        let field = self.get(CONTENT_LENGTH)?;
        std::str::from_utf8(field.value()).ok()?.trim().parse().ok()
    }

    pub fn content_type(&self) -> Option<HttpContentType> {
        HttpContentType::parse(self.get(CONTENT_TYPE)?.value())
    }

    /// The transfer codings, lowercased, in the order applied.
    pub fn transfer_encoding(&self) -> Option<Vec<String>> {
        self.get(TRANSFER_ENCODING)
            .map(|field| comma_separated(field.value()))
    }

    /// Names of the fields announced for the chunked trailer.
    pub fn trailer(&self) -> Option<Vec<String>> {
        self.get(TRAILER).map(|field| comma_separated(field.value()))
    }

    /// Wire length of the fields plus the empty line that ends the header.
    pub fn bytes_length(&self) -> usize {
        self.fields.iter().map(HttpField::length).sum::<usize>() + CRLF.len()
    }

    pub(crate) fn write(&self, buffer: &mut [u8], offset: &mut usize) {
        for field in &self.fields {
            field.write(buffer, offset);
        }
        write_bytes(buffer, offset, CRLF);
    }

    /// Parses header lines from `data` up to and including the empty line.
    ///
    /// Returns the header and the bytes consumed; the count is `None` when
    /// the data ends before the empty line or a line is malformed, in which
    /// case the fields before it are still returned.
    pub(crate) fn parse(data: &[u8]) -> (Self, Option<usize>) {
        let (unfolded, line_count) = unfold_continuation_lines(data);
        let mut slots = vec![EMPTY_HEADER; line_count];
        match httparse::parse_headers(&unfolded, &mut slots) {
            Ok(Status::Complete((consumed, fields))) => {
                let mut header = Self::default();
                for field in fields {
                    header.add(HttpField::from_bytes(field.name, field.value));
                }
                (header, Some(consumed))
            }
            _ => (Self::parse_leading_fields(&unfolded), None),
        }
    }

    /// The well-formed fields before the first line httparse rejects.
    fn parse_leading_fields(unfolded: &[u8]) -> Self {
        let mut header = Self::default();
        let mut position = 0;
        while let Some(line_end) = find_line_end(unfolded, position) {
            if line_end == position {
                break;
            }
            let mut line = unfolded[position..line_end + CRLF.len()].to_vec();
            line.extend_from_slice(CRLF);
            let mut slot = [EMPTY_HEADER; 1];
            match httparse::parse_headers(&line, &mut slot) {
                Ok(Status::Complete((_, [field]))) => {
                    header.add(HttpField::from_bytes(field.name, field.value))
                }
                _ => break,
            }
            position = line_end + CRLF.len();
        }
        header
    }
}

/// Blanks the CRLF of folded (obsolete multiline) field lines so httparse
/// sees one line per field. Lengths are unchanged, so offsets into the copy
/// are offsets into `data`.
///
/// Also returns an upper bound on the number of fields.
fn unfold_continuation_lines(data: &[u8]) -> (Vec<u8>, usize) {
    let mut unfolded = data.to_vec();
    let mut position = 0;
    let mut line_count = 1;
    while let Some(line_end) = find_line_end(&unfolded, position) {
        if line_end == position {
            break;
        }
        let next = line_end + CRLF.len();
        if matches!(unfolded.get(next), Some(b' ' | b'\t')) {
            unfolded[line_end..next].fill(b' ');
        } else {
            line_count += 1;
        }
        position = next;
    }
    (unfolded, line_count)
}

/// Two headers are equal when they hold the same fields, in any order.
impl PartialEq for HttpHeader {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|field| other.get(&field.name) == Some(field))
    }
}

impl Eq for HttpHeader {}

/// Offset of the next CRLF at or after `from`.
pub(crate) fn find_line_end(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(2)
        .position(|window| window == CRLF)
        .map(|position| from + position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_normalization() {
        assert_eq!(normalize_value(b"  a \t b\r\n c  "), b"a b c");
        assert_eq!(normalize_value(b"x=\"a   b\"  y"), b"x=\"a   b\" y");
    }

    #[test]
    fn test_parse_merges_and_folds() {
        let data = b"Accept: text/html\r\nX-Long: first\r\n  second\r\naccept: text/plain\r\n\r\nbody";
        let (header, consumed) = HttpHeader::parse(data);
        assert_eq!(consumed, Some(data.len() - 4));
        assert_eq!(header.fields().len(), 2);
        assert_eq!(header.get("ACCEPT").unwrap().value(), b"text/html,text/plain");
        assert_eq!(header.get("x-long").unwrap().value_string(), "first second");
    }

    #[test]
    fn test_unterminated_header() {
        let (header, consumed) = HttpHeader::parse(b"Host: a\r\nUser-Agent: b");
        assert_eq!(consumed, None);
        assert_eq!(header.fields().len(), 1);
    }

    #[test]
    fn test_malformed_field_keeps_leading_fields() {
        let (header, consumed) = HttpHeader::parse(b"Host: a\r\nBad Name: b\r\nAccept: c\r\n\r\n");
        assert_eq!(consumed, None);
        assert_eq!(header.fields(), &[HttpField::new("Host", "a")]);
    }

    #[test]
    fn test_empty_header() {
        let (header, consumed) = HttpHeader::parse(b"\r\nbody");
        assert_eq!(consumed, Some(2));
        assert!(header.is_empty());
    }

    #[test]
    fn test_typed_fields() {
        let header = HttpHeader::new([
            HttpField::new("content-length", " 42 "),
            HttpField::new("Content-Type", "Text/HTML; charset=\"utf-8\"; q=1"),
            HttpField::new("Transfer-Encoding", "gzip, Chunked"),
            HttpField::new("Trailer", "Expires"),
        ]);
        assert_eq!(header.content_length(), Some(42));
        let content_type = header.content_type().unwrap();
        assert_eq!(content_type.media_type, "text");
        assert_eq!(content_type.media_subtype, "html");
        assert_eq!(content_type.parameter("CHARSET"), Some("utf-8"));
        assert_eq!(
            header.transfer_encoding().unwrap(),
            vec!["gzip".to_string(), "chunked".to_string()]
        );
        assert_eq!(header.trailer().unwrap(), vec!["expires".to_string()]);
    }

    #[test]
    fn test_header_equality_ignores_order_and_case() {
        let a = HttpHeader::new([HttpField::new("Host", "a"), HttpField::new("Accept", "*/*")]);
        let b = HttpHeader::new([HttpField::new("accept", "*/*"), HttpField::new("HOST", "a")]);
        assert_eq!(a, b);
        assert_eq!(a.bytes_length(), "Host: a\r\nAccept: */*\r\n\r\n".len());
    }
}
