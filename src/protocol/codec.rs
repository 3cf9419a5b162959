//! Line-oriented wire codec.
//!
//! # Format
//! ```text
//! request  = *(field-line "\n") "\n"
//! response = *(field-line "\n" / payload-field) "\n"
//!
//! field-line    = name ":" [" " argument]
//! payload-field = name ": " decimal-length "\n" raw-bytes "\n"
//! ```
//!
//! Payload fields let article bodies and result lists travel without any
//! escaping. Both directions live here so the client-side decoder stays in
//! lockstep with the server-side encoder.

use thiserror::Error;

use crate::protocol::error::{ProtocolResult, ServerError};
use crate::protocol::fields::{FieldName, RequestField, ResponseField};

/// Separator between a field name and its argument.
const FIELD_SEPARATOR: &str = ": ";

/// Grammar violations in a single line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("line has no ':' separator")]
    MissingColon,
    #[error("argument must be separated by exactly one space")]
    BadSeparator,
}

impl From<LineError> for ServerError {
    fn from(_: LineError) -> Self {
        ServerError::MalformedRequest
    }
}

/// Split a line into its field name and optional argument.
///
/// `"Name:"` and `"Name: "` both carry no argument. Anything after the colon
/// that doesn't start with exactly one space is rejected.
pub fn parse_line(line: &str) -> Result<(&str, Option<&str>), LineError> {
    let colon = line.find(':').ok_or(LineError::MissingColon)?;
    let name = &line[..colon];
    let rest = &line[colon + 1..];

    if rest.is_empty() {
        return Ok((name, None));
    }
    let argument = rest.strip_prefix(' ').ok_or(LineError::BadSeparator)?;
    if argument.starts_with(' ') {
        return Err(LineError::BadSeparator);
    }
    if argument.is_empty() {
        return Ok((name, None));
    }
    Ok((name, Some(argument)))
}

/// Parse one request line and check it against the field catalog.
pub fn decode_field(line: &str) -> ProtocolResult<RequestField> {
    let (name, argument) = parse_line(line)?;
    let name = FieldName::from_wire(name).ok_or(ServerError::InvalidRequest)?;
    RequestField::new(name, argument.map(str::to_owned))
}

/// Accumulates response bytes.
#[derive(Debug, Default)]
pub struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `"Name: value\n"`, or `"Name:\n"` without a value.
    pub fn emit_field(&mut self, field: ResponseField, value: Option<&str>) {
        self.buf.extend_from_slice(field.as_str().as_bytes());
        match value {
            Some(value) => {
                self.buf.extend_from_slice(FIELD_SEPARATOR.as_bytes());
                self.buf.extend_from_slice(value.as_bytes());
            }
            None => self.buf.push(b':'),
        }
        self.buf.push(b'\n');
    }

    /// Write a field whose value is the payload length, then the raw payload
    /// and a trailing newline.
    pub fn emit_payload_field(&mut self, field: ResponseField, payload: &[u8]) {
        self.emit_field(field, Some(payload.len().to_string().as_str()));
        self.buf.extend_from_slice(payload);
        self.buf.push(b'\n');
    }

    /// Terminate the response with an empty line.
    pub fn emit_end(&mut self) {
        self.buf.push(b'\n');
    }

    /// Take everything written so far, leaving the writer empty.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Render a request the way clients send it.
pub fn encode_request<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let mut out = String::new();
    for (name, value) in fields {
        out.push_str(name);
        match value {
            Some(value) => {
                out.push_str(FIELD_SEPARATOR);
                out.push_str(value);
            }
            None => out.push(':'),
        }
        out.push('\n');
    }
    out.push('\n');
    out
}

/// Errors decoding a server response.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("response line is not valid UTF-8")]
    Utf8,
    #[error("bad response line: {0}")]
    Line(#[from] LineError),
    #[error("payload field {0} has no length")]
    MissingLength(String),
    #[error("payload field {0} has invalid length {1:?}")]
    BadLength(String, String),
    #[error("payload of field {0} is truncated")]
    Truncated(String),
    #[error("payload of field {0} isn't followed by a newline")]
    MissingPayloadTerminator(String),
}

/// A decoded response, fields kept in arrival order.
#[derive(Debug, Default, Clone)]
pub struct DecodedResponse {
    fields: Vec<(String, Option<Vec<u8>>)>,
}

impl DecodedResponse {
    pub fn has(&self, field: ResponseField) -> bool {
        self.fields.iter().any(|(n, _)| n == field.as_str())
    }

    /// Raw value of a field (payload bytes for payload fields).
    pub fn bytes(&self, field: ResponseField) -> Option<&[u8]> {
        self.fields
            .iter()
            .find(|(n, _)| n == field.as_str())
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn text(&self, field: ResponseField) -> Option<&str> {
        self.bytes(field).and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn error(&self) -> Option<ServerError> {
        self.text(ResponseField::Error)
            .and_then(|code| code.parse().ok())
            .and_then(ServerError::from_code)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Every field with its raw value, in arrival order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&[u8]>)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_deref()))
    }
}

/// Decode a complete response. Decoding stops at the terminating empty
/// line, or at the end of input for responses cut short by the server.
pub fn decode_response(mut input: &[u8]) -> Result<DecodedResponse, DecodeError> {
    let mut response = DecodedResponse::default();

    while !input.is_empty() {
        let (line, rest) = match input.iter().position(|b| *b == b'\n') {
            Some(pos) => (&input[..pos], &input[pos + 1..]),
            None => (input, &input[input.len()..]),
        };
        input = rest;

        if line.is_empty() {
            break;
        }
        let line = std::str::from_utf8(line).map_err(|_| DecodeError::Utf8)?;
        let (name, value) = parse_line(line)?;

        if ResponseField::is_payload_name(name) {
            let len_str = value.ok_or_else(|| DecodeError::MissingLength(name.to_owned()))?;
            let len: usize = len_str
                .parse()
                .map_err(|_| DecodeError::BadLength(name.to_owned(), len_str.to_owned()))?;
            if input.len() < len {
                return Err(DecodeError::Truncated(name.to_owned()));
            }
            let (payload, rest) = input.split_at(len);
            input = rest
                .strip_prefix(b"\n")
                .ok_or_else(|| DecodeError::MissingPayloadTerminator(name.to_owned()))?;
            response.fields.push((name.to_owned(), Some(payload.to_vec())));
        } else {
            response
                .fields
                .push((name.to_owned(), value.map(|v| v.as_bytes().to_vec())));
        }
    }

    Ok(response)
}
