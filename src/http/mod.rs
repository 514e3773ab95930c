//! HTTP/1.x messages carried in TCP payloads.
//!
//! A [`HttpDatagram`] covers exactly one request or response: its start
//! line, header and body. The body length follows RFC 2616 section 4.4, so
//! several pipelined messages in one payload can be split with
//! [`HttpDatagram::parse_messages`].

pub mod header;

use std::collections::HashMap;
use std::fmt;

use httparse::{EMPTY_HEADER, Request, Response, Status};
use lazy_static::lazy_static;
use log::debug;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::PacketError;
use crate::bytes_ext::write_bytes;
use crate::datagram::{DataSegment, Datagram, impl_datagram_eq};
use crate::layer::Layer;

use header::find_line_end;

pub use header::{HttpContentType, HttpField, HttpHeader};

const HTTP_SLASH: &[u8] = b"HTTP/";
const CRLF: &[u8] = b"\r\n";

/// Well-known HTTP port.
pub const PORT: u16 = 80;

/// `HTTP/major.minor`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HttpVersion {
    pub major: u32,
    pub minor: u32,
}

impl HttpVersion {
    pub const VERSION_1_0: HttpVersion = HttpVersion { major: 1, minor: 0 };
    pub const VERSION_1_1: HttpVersion = HttpVersion { major: 1, minor: 1 };

    /// httparse reports only the minor digit of an `HTTP/1.x` version.
    fn from_minor(minor: u8) -> Self {
        Self {
            major: 1,
            minor: u32::from(minor),
        }
    }

    fn length(&self) -> usize {
        self.to_string().len()
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpRequestKnownMethod {
    Options,
    Get,
    Head,
    Post,
    Put,
    Delete,
    Trace,
    Connect,
    Patch,
    PropFind,
    PropPatch,
    MkCol,
    Copy,
    Move,
    Lock,
    Unlock,
    Unknown,
}

lazy_static! {
    static ref KNOWN_METHODS: HashMap<&'static str, HttpRequestKnownMethod> = {
        use HttpRequestKnownMethod::*;
        HashMap::from([
            ("OPTIONS", Options),
            ("GET", Get),
            ("HEAD", Head),
            ("POST", Post),
            ("PUT", Put),
            ("DELETE", Delete),
            ("TRACE", Trace),
            ("CONNECT", Connect),
            ("PATCH", Patch),
            ("PROPFIND", PropFind),
            ("PROPPATCH", PropPatch),
            ("MKCOL", MkCol),
            ("COPY", Copy),
            ("MOVE", Move),
            ("LOCK", Lock),
            ("UNLOCK", Unlock),
        ])
    };
}

/// A request method token; methods are case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HttpRequestMethod(String);

impl HttpRequestMethod {
    pub fn new(method: impl Into<String>) -> Self {
        Self(method.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn known_method(&self) -> HttpRequestKnownMethod {
        KNOWN_METHODS
            .get(self.0.as_str())
            .copied()
            .unwrap_or(HttpRequestKnownMethod::Unknown)
    }
}

impl From<HttpRequestKnownMethod> for HttpRequestMethod {
    fn from(method: HttpRequestKnownMethod) -> Self {
        let name = KNOWN_METHODS
            .iter()
            .find(|(_, known)| **known == method)
            .map_or("", |(name, _)| *name);
        Self(name.to_string())
    }
}

impl fmt::Display for HttpRequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The first line of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpStartLine {
    Request {
        method: HttpRequestMethod,
        uri: String,
        version: HttpVersion,
    },
    Response {
        version: HttpVersion,
        status_code: u16,
        reason_phrase: String,
    },
}

impl HttpStartLine {
    /// Parses a start line given without its CRLF.
    fn parse(line: &[u8]) -> Option<Self> {
        // A lone start line, closed by an empty header.
        let mut message = Vec::with_capacity(line.len() + 2 * CRLF.len());
        message.extend_from_slice(line);
        message.extend_from_slice(CRLF);
        message.extend_from_slice(CRLF);
        let mut no_headers = [EMPTY_HEADER; 0];

        if line.starts_with(HTTP_SLASH) {
            let mut response = Response::new(&mut no_headers);
            if !matches!(response.parse(&message), Ok(Status::Complete(_))) {
                return None;
            }
            return Some(HttpStartLine::Response {
                version: HttpVersion::from_minor(response.version?),
                status_code: response.code?,
                reason_phrase: response.reason.unwrap_or_default().to_string(),
            });
        }

        let mut request = Request::new(&mut no_headers);
        if !matches!(request.parse(&message), Ok(Status::Complete(_))) {
            return None;
        }
        Some(HttpStartLine::Request {
            method: HttpRequestMethod::new(request.method?),
            uri: request.path?.to_string(),
            version: HttpVersion::from_minor(request.version?),
        })
    }

    fn length(&self) -> usize {
        match self {
            HttpStartLine::Request {
                method,
                uri,
                version,
            } => method.as_str().len() + 1 + uri.len() + 1 + version.length() + CRLF.len(),
            HttpStartLine::Response {
                version,
                reason_phrase,
                ..
            } => version.length() + 1 + 3 + 1 + reason_phrase.len() + CRLF.len(),
        }
    }

    fn write(&self, buffer: &mut [u8], offset: &mut usize) {
        let line = match self {
            HttpStartLine::Request {
                method,
                uri,
                version,
            } => format!("{method} {uri} {version}\r\n"),
            HttpStartLine::Response {
                version,
                status_code,
                reason_phrase,
            } => format!("{version} {status_code:03} {reason_phrase}\r\n"),
        };
        write_bytes(buffer, offset, line.as_bytes());
    }
}

/// Where the body sits and how it is framed.
#[derive(Debug, Clone, Default)]
struct HttpBody {
    /// Offset of the body from the start of the message.
    offset: usize,
    /// Wire length, chunk framing included.
    length: usize,
    /// Chunk payloads, concatenated, for chunked bodies.
    chunks: Option<Vec<u8>>,
    trailer: Option<HttpHeader>,
    is_complete: bool,
}

#[derive(Debug, Clone, Default)]
struct HttpParse {
    start_line: Option<HttpStartLine>,
    header: HttpHeader,
    is_header_complete: bool,
    body: HttpBody,
}

/// One parsed HTTP request or response.
#[derive(Debug, Clone)]
pub struct HttpDatagram {
    segment: DataSegment,
    parse: HttpParse,
    validity: OnceCell<bool>,
}

impl_datagram_eq!(HttpDatagram);

impl HttpDatagram {
    /// Parses the message at the start of `data`.
    ///
    /// The datagram covers only that message; bytes after it belong to the
    /// next one.
    pub fn new(data: DataSegment) -> Self {
        let (parse, length) = Self::parse(data.as_slice());
        Self {
            segment: data.subsegment(0, length),
            parse,
            validity: OnceCell::new(),
        }
    }

    /// Splits pipelined messages. Stops after the first message that is not
    /// complete.
    pub fn parse_messages(data: &DataSegment) -> Vec<HttpDatagram> {
        let mut messages = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let message = HttpDatagram::new(data.tail(offset));
            let length = message.len();
            let is_complete = message.is_valid();
            messages.push(message);
            if length == 0 || !is_complete {
                break;
            }
            offset += length;
        }
        messages
    }

    fn parse(data: &[u8]) -> (HttpParse, usize) {
        let mut parse = HttpParse::default();
        let Some(line_end) = find_line_end(data, 0) else {
            return (parse, data.len());
        };
        parse.start_line = HttpStartLine::parse(&data[..line_end]);
        if parse.start_line.is_none() {
            return (parse, data.len());
        }

        let header_start = line_end + CRLF.len();
        let (header, consumed) = HttpHeader::parse(&data[header_start..]);
        parse.header = header;
        let Some(consumed) = consumed else {
            return (parse, data.len());
        };
        parse.is_header_complete = true;

        let body_start = header_start + consumed;
        parse.body = Self::parse_body(&parse, &data[body_start..]);
        parse.body.offset = body_start;
        let length = body_start + parse.body.length;
        (parse, length)
    }

    fn parse_body(parse: &HttpParse, rest: &[u8]) -> HttpBody {
        let complete = |length: usize| HttpBody {
            length,
            is_complete: true,
            ..HttpBody::default()
        };

        let is_response = matches!(parse.start_line, Some(HttpStartLine::Response { .. }));
        if let Some(HttpStartLine::Response { status_code, .. }) = &parse.start_line {
            if (100..200).contains(status_code) || *status_code == 204 || *status_code == 304 {
                return complete(0);
            }
        }

        let is_chunked = parse
            .header
            .transfer_encoding()
            .is_some_and(|codings| codings.iter().any(|coding| coding != "identity"));
        if is_chunked {
            return Self::parse_chunked_body(rest);
        }

        if let Some(content_length) = parse.header.content_length() {
            let length = usize::try_from(content_length).unwrap_or(usize::MAX);
            if length > rest.len() {
                return HttpBody {
                    length: rest.len(),
                    ..HttpBody::default()
                };
            }
            return complete(length);
        }

        if is_response { complete(rest.len()) } else { complete(0) }
    }

    fn parse_chunked_body(rest: &[u8]) -> HttpBody {
        let incomplete = |chunks: Vec<u8>| {
            debug!("HTTP chunked body ends before its last chunk");
            HttpBody {
                length: rest.len(),
                chunks: Some(chunks),
                ..HttpBody::default()
            }
        };

        let mut chunks = Vec::new();
        let mut position = 0;
        loop {
            let Ok(Status::Complete((consumed, size))) = httparse::parse_chunk_size(&rest[position..])
            else {
                return incomplete(chunks);
            };
            let Ok(size) = usize::try_from(size) else {
                return incomplete(chunks);
            };
            position += consumed;
            if size == 0 {
                break;
            }
            let Some(chunk) = rest.get(position..position.saturating_add(size)) else {
                return incomplete(chunks);
            };
            chunks.extend_from_slice(chunk);
            position += size;
            if rest.get(position..position + CRLF.len()) != Some(CRLF) {
                return incomplete(chunks);
            }
            position += CRLF.len();
        }

        let (trailer, consumed) = HttpHeader::parse(&rest[position..]);
        let Some(consumed) = consumed else {
            return incomplete(chunks);
        };
        HttpBody {
            offset: 0,
            length: position + consumed,
            chunks: Some(chunks),
            trailer: (!trailer.is_empty()).then_some(trailer),
            is_complete: true,
        }
    }

    pub fn start_line(&self) -> Option<&HttpStartLine> {
        self.parse.start_line.as_ref()
    }

    pub fn is_request(&self) -> bool {
        !self.is_response()
    }

    /// Decided by the `HTTP/` prefix, so also answers for broken messages.
    pub fn is_response(&self) -> bool {
        self.segment.as_slice().starts_with(HTTP_SLASH)
    }

    pub fn version(&self) -> Option<HttpVersion> {
        match self.start_line()? {
            HttpStartLine::Request { version, .. } | HttpStartLine::Response { version, .. } => {
                Some(*version)
            }
        }
    }

    pub fn method(&self) -> Option<&HttpRequestMethod> {
        match self.start_line()? {
            HttpStartLine::Request { method, .. } => Some(method),
            HttpStartLine::Response { .. } => None,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match self.start_line()? {
            HttpStartLine::Request { uri, .. } => Some(uri),
            HttpStartLine::Response { .. } => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self.start_line()? {
            HttpStartLine::Response { status_code, .. } => Some(*status_code),
            HttpStartLine::Request { .. } => None,
        }
    }

    pub fn reason_phrase(&self) -> Option<&str> {
        match self.start_line()? {
            HttpStartLine::Response { reason_phrase, .. } => Some(reason_phrase),
            HttpStartLine::Request { .. } => None,
        }
    }

    pub fn header(&self) -> &HttpHeader {
        &self.parse.header
    }

    /// The body as sent, chunk framing included.
    pub fn body(&self) -> DataSegment {
        self.segment
            .subsegment(self.parse.body.offset, self.parse.body.length)
    }

    /// The body with any chunked coding removed.
    pub fn message_body(&self) -> Vec<u8> {
        match &self.parse.body.chunks {
            Some(chunks) => chunks.clone(),
            None => self.body().to_vec(),
        }
    }

    /// Trailer fields of a chunked body.
    pub fn trailer(&self) -> Option<&HttpHeader> {
        self.parse.body.trailer.as_ref()
    }

    /// `None` when the start line could not be parsed.
    pub fn extract_layer(&self) -> Option<HttpLayer> {
        Some(HttpLayer {
            start_line: self.start_line()?.clone(),
            header: self.header().clone(),
            body: self.body().to_vec(),
        })
    }
}

impl Datagram for HttpDatagram {
    fn segment(&self) -> &DataSegment {
        &self.segment
    }

    fn validity(&self) -> &OnceCell<bool> {
        &self.validity
    }

    fn calculate_is_valid(&self) -> bool {
        self.parse.start_line.is_some() && self.parse.is_header_complete && self.parse.body.is_complete
    }
}

/// An HTTP message to write. `body` is written verbatim, so a chunked body
/// must already carry its chunk framing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpLayer {
    pub start_line: HttpStartLine,
    pub header: HttpHeader,
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
}

impl HttpLayer {
    pub fn request(method: impl Into<HttpRequestMethod>, uri: impl Into<String>) -> Self {
        Self {
            start_line: HttpStartLine::Request {
                method: method.into(),
                uri: uri.into(),
                version: HttpVersion::VERSION_1_1,
            },
            header: HttpHeader::default(),
            body: Vec::new(),
        }
    }

    pub fn response(status_code: u16, reason_phrase: impl Into<String>) -> Self {
        Self {
            start_line: HttpStartLine::Response {
                version: HttpVersion::VERSION_1_1,
                status_code,
                reason_phrase: reason_phrase.into(),
            },
            header: HttpHeader::default(),
            body: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: HttpField) -> Self {
        self.header.add(field);
        self
    }

    /// Sets the body and a matching Content-Length field.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.header
            .add(HttpField::new(header::CONTENT_LENGTH, &self.body.len().to_string()));
        self
    }
}

impl Layer for HttpLayer {
    fn name(&self) -> &'static str {
        "HTTP"
    }

    fn length(&self) -> usize {
        self.start_line.length() + self.header.bytes_length() + self.body.len()
    }

    fn write(
        &self,
        buffer: &mut [u8],
        offset: &mut usize,
        _payload_length: usize,
        _previous: Option<&dyn Layer>,
        _next: Option<&dyn Layer>,
    ) -> Result<(), PacketError> {
        if let HttpStartLine::Response { status_code, .. } = self.start_line {
            if status_code > 999 {
                return Err(PacketError::InvalidFieldValue(format!(
                    "HTTP status code {status_code} is not three digits"
                )));
            }
        }
        self.start_line.write(buffer, offset);
        self.header.write(buffer, offset);
        write_bytes(buffer, offset, &self.body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PacketBuilder;
    use crate::ipv4::IpV4Layer;
    use crate::tcp::TcpLayer;
    use chrono::Utc;
    use std::net::Ipv4Addr;

    fn datagram(text: &str) -> HttpDatagram {
        HttpDatagram::new(DataSegment::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn test_request() {
        let request = datagram("GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n");
        assert!(request.is_valid());
        assert!(request.is_request());
        assert_eq!(request.method().unwrap().known_method(), HttpRequestKnownMethod::Get);
        assert_eq!(request.uri(), Some("/index.html"));
        assert_eq!(request.version(), Some(HttpVersion::VERSION_1_1));
        assert_eq!(request.header().get("host").unwrap().value(), b"example.com");
        assert!(request.body().is_empty());
    }

    #[test]
    fn test_response_with_content_length() {
        let response = datagram("HTTP/1.0 200 OK\r\nContent-Length: 5\r\n\r\nhelloEXTRA");
        assert!(response.is_valid());
        assert_eq!(response.status_code(), Some(200));
        assert_eq!(response.reason_phrase(), Some("OK"));
        assert_eq!(response.body().as_slice(), b"hello");
        assert_eq!(response.len(), "HTTP/1.0 200 OK\r\nContent-Length: 5\r\n\r\nhello".len());
    }

    #[test]
    fn test_short_body_is_invalid() {
        let response = datagram("HTTP/1.1 200 OK\r\nContent-Length: 50\r\n\r\nhello");
        assert!(!response.is_valid());
        assert_eq!(response.body().as_slice(), b"hello");
    }

    #[test]
    fn test_chunked_body_with_trailer() {
        let text = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nTrailer: Expires\r\n\r\n\
                    4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\nExpires: never\r\n\r\n";
        let response = datagram(text);
        assert!(response.is_valid());
        assert_eq!(response.message_body(), b"Wikipedia");
        assert_eq!(response.trailer().unwrap().get("expires").unwrap().value(), b"never");
        assert_eq!(response.len(), text.len());
    }

    #[test]
    fn test_chunked_body_cut_short() {
        let response = datagram("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWi");
        assert!(!response.is_valid());
        assert!(response.message_body().is_empty());
    }

    #[test]
    fn test_no_body_statuses() {
        let response = datagram("HTTP/1.1 304 Not Modified\r\nContent-Length: 10\r\n\r\n");
        assert!(response.is_valid());
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_response_without_length_takes_remainder() {
        let response = datagram("HTTP/1.1 200 OK\r\n\r\nall of it");
        assert_eq!(response.body().as_slice(), b"all of it");
    }

    #[test]
    fn test_pipelined_requests() {
        let payload = DataSegment::new(
            b"GET /a HTTP/1.1\r\n\r\nPOST /b HTTP/1.1\r\nContent-Length: 2\r\n\r\nhiGET /c HTTP/1.1\r\n".to_vec(),
        );
        let messages = HttpDatagram::parse_messages(&payload);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].method().unwrap().as_str(), "POST");
        assert_eq!(messages[1].body().as_slice(), b"hi");
        assert!(!messages[2].is_valid());
        assert_eq!(messages[2].uri(), Some("/c"));
    }

    #[test]
    fn test_folded_field_in_response() {
        let response = datagram("HTTP/1.1 200 OK\r\nX-Note: one\r\n\ttwo\r\nContent-Length: 0\r\n\r\n");
        assert!(response.is_valid());
        assert_eq!(response.header().get("x-note").unwrap().value_string(), "one two");
        assert_eq!(response.header().content_length(), Some(0));
    }

    #[test]
    fn test_bad_chunk_size_is_invalid() {
        let response = datagram("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\nWiki\r\n0\r\n\r\n");
        assert!(!response.is_valid());
        assert!(response.message_body().is_empty());
    }

    #[test]
    fn test_non_http1_version_has_no_start_line() {
        let message = datagram("GET / HTTP/2.0\r\n\r\n");
        assert!(message.start_line().is_none());
        assert!(!message.is_valid());
    }

    #[test]
    fn test_garbage_is_invalid() {
        let message = datagram("not http at all");
        assert!(!message.is_valid());
        assert!(message.start_line().is_none());
        assert!(message.extract_layer().is_none());
    }

    #[test]
    fn test_http_over_tcp_round_trip() {
        let http = HttpLayer::response(404, "Not Found")
            .with_field(HttpField::new("Server", "pktgram"))
            .with_body(b"missing".to_vec());
        let layers: Vec<Box<dyn Layer>> = vec![
            Box::new(
                IpV4Layer::builder()
                    .source(Ipv4Addr::new(10, 0, 0, 80))
                    .destination(Ipv4Addr::new(10, 0, 0, 1))
                    .build()
                    .unwrap(),
            ),
            Box::new(TcpLayer::new(PORT, 50000)),
            Box::new(http.clone()),
        ];
        let packet = PacketBuilder::build_packet(Utc::now(), layers).unwrap();
        let tcp = packet.ip_v4().tcp();
        let parsed = tcp.http();
        assert!(parsed.is_valid());
        assert_eq!(parsed.status_code(), Some(404));
        assert_eq!(parsed.extract_layer(), Some(http));
        assert_eq!(tcp.http_collection().len(), 1);
    }

    #[test]
    fn test_known_method_conversion() {
        let method = HttpRequestMethod::from(HttpRequestKnownMethod::Delete);
        assert_eq!(method.as_str(), "DELETE");
        assert_eq!(HttpRequestMethod::new("BREW").known_method(), HttpRequestKnownMethod::Unknown);
    }
}
