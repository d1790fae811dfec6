//! Output Context Module
//!
//! Sink abstraction the spooler writes response metadata and body bytes
//! into. The protocol layer decides what a "stream" means; header-only
//! sinks (HEAD-style checks) report `has_stream() == false` and receive
//! metadata but no body.

use std::io::Write;

/// Header name for the range description set by the spooler.
pub const CONTENT_RANGE_HEADER: &str = "Content-Range";

/// Response sink consumed by the partial content spooler.
pub trait OutputContext {
    /// Modification time of the resource in milliseconds since the epoch.
    fn set_modification_time(&mut self, millis: i64);

    /// Declared length of the response body in bytes.
    fn set_content_length(&mut self, length: i64);

    /// Arbitrary response header, e.g. `Content-Range`.
    fn set_property(&mut self, name: &str, value: &str);

    /// Whether this sink accepts a body stream.
    fn has_stream(&self) -> bool;

    /// Body stream. Only called when [`has_stream`](Self::has_stream) is true.
    fn output_stream(&mut self) -> &mut dyn Write;
}

/// In-memory [`OutputContext`] collecting headers and body bytes.
///
/// Used by the HTTP gateway to assemble hyper responses and by tests to
/// observe exactly what the spooler produced.
#[derive(Debug, Default)]
pub struct BufferedOutput {
    modification_time: Option<i64>,
    content_length: Option<i64>,
    properties: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl BufferedOutput {
    /// Sink that accepts a body stream.
    pub fn with_stream() -> Self {
        Self {
            body: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Header-only sink for HEAD-style responses.
    pub fn head_only() -> Self {
        Self::default()
    }

    pub fn modification_time(&self) -> Option<i64> {
        self.modification_time
    }

    pub fn content_length(&self) -> Option<i64> {
        self.content_length
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// True when the spooler produced neither metadata nor body, i.e. the
    /// backing resource vanished before spooling.
    pub fn is_untouched(&self) -> bool {
        self.modification_time.is_none()
            && self.content_length.is_none()
            && self.properties.is_empty()
            && self.body.as_ref().map_or(true, |b| b.is_empty())
    }
}

impl OutputContext for BufferedOutput {
    fn set_modification_time(&mut self, millis: i64) {
        self.modification_time = Some(millis);
    }

    fn set_content_length(&mut self, length: i64) {
        self.content_length = Some(length);
    }

    fn set_property(&mut self, name: &str, value: &str) {
        self.properties.push((name.to_string(), value.to_string()));
    }

    fn has_stream(&self) -> bool {
        self.body.is_some()
    }

    fn output_stream(&mut self) -> &mut dyn Write {
        self.body.get_or_insert_with(Vec::new)
    }
}
