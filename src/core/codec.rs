//! Wire formats for batch streams.
//!
//! The server writes either one JSON array whose elements are flushed as they
//! are produced, or newline-delimited JSON. The client side splits a body that
//! arrives in arbitrary chunks back into elements so each one can be decoded
//! (and fail) on its own.

use crate::utils::error::{PingError, Result};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::pin::Pin;

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_NDJSON: &str = "application/x-ndjson";

pub type EncodedStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, serde_json::Error>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    JsonArray,
    Ndjson,
}

impl StreamFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            StreamFormat::JsonArray => APPLICATION_JSON,
            StreamFormat::Ndjson => APPLICATION_NDJSON,
        }
    }

    /// 依回應的 Content-Type 判斷格式，未知類型一律視為 JSON 陣列
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type.map(media_type).as_deref() {
            Some(APPLICATION_NDJSON) => StreamFormat::Ndjson,
            _ => StreamFormat::JsonArray,
        }
    }

    /// Pick the first supported media type listed in an `Accept` header.
    ///
    /// A missing header or a wildcard selects JSON. `None` means nothing in
    /// the header can be produced. Quality values are ignored.
    pub fn negotiate(accept: Option<&str>) -> Option<Self> {
        let Some(accept) = accept else {
            return Some(StreamFormat::JsonArray);
        };
        if accept.trim().is_empty() {
            return Some(StreamFormat::JsonArray);
        }

        accept.split(',').find_map(|candidate| match media_type(candidate).as_str() {
            APPLICATION_JSON | "*/*" | "application/*" => Some(StreamFormat::JsonArray),
            APPLICATION_NDJSON => Some(StreamFormat::Ndjson),
            _ => None,
        })
    }

    pub fn decoder(self) -> Box<dyn ElementDecoder> {
        match self {
            StreamFormat::JsonArray => Box::new(JsonArrayDecoder::new()),
            StreamFormat::Ndjson => Box::new(NdjsonDecoder::new()),
        }
    }

    /// Serialize each item as soon as the source yields it.
    pub fn encode<S, T>(self, items: S) -> EncodedStream
    where
        S: Stream<Item = T> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        match self {
            StreamFormat::JsonArray => {
                let mut first = true;
                let elements = items.map(move |item| -> std::result::Result<Bytes, serde_json::Error> {
                    let mut out = Vec::with_capacity(64);
                    if !first {
                        out.push(b',');
                    }
                    first = false;
                    serde_json::to_writer(&mut out, &item)?;
                    Ok(Bytes::from(out))
                });

                Box::pin(
                    stream::once(async { Ok(Bytes::from_static(b"[")) })
                        .chain(elements)
                        .chain(stream::once(async { Ok(Bytes::from_static(b"]")) })),
                )
            }
            StreamFormat::Ndjson => Box::pin(items.map(|item| -> std::result::Result<Bytes, serde_json::Error> {
                let mut out = serde_json::to_vec(&item)?;
                out.push(b'\n');
                Ok(Bytes::from(out))
            })),
        }
    }
}

fn media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Splits a body into raw top-level elements.
pub trait ElementDecoder: Send {
    /// Feed the next body chunk, returning every element it completes.
    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Signal end of body, returning a trailing element if one is pending.
    fn finish(&mut self) -> Result<Option<Vec<u8>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayState {
    Start,
    BeforeElement { after_comma: bool },
    InElement,
    AfterElement,
    End,
}

/// Incremental splitter for a top-level JSON array.
///
/// Composite elements (`[..]`, `{..}`) are emitted as soon as their closing
/// bracket arrives; scalars once the following `,` or `]` is seen.
#[derive(Debug)]
pub struct JsonArrayDecoder {
    buf: Vec<u8>,
    scanned: usize,
    state: ArrayState,
    start: usize,
    depth: usize,
    composite: bool,
    in_string: bool,
    escaped: bool,
}

impl JsonArrayDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            state: ArrayState::Start,
            start: 0,
            depth: 0,
            composite: false,
            in_string: false,
            escaped: false,
        }
    }

    fn unexpected(byte: u8, position: &str) -> PingError {
        PingError::decode(format!("unexpected '{}' {}", byte as char, position))
    }

    fn take_scalar(&self, end: usize) -> Vec<u8> {
        self.buf[self.start..end].trim_ascii_end().to_vec()
    }

    fn compact(&mut self) {
        if self.state == ArrayState::InElement {
            self.buf.drain(..self.start);
            self.scanned -= self.start;
            self.start = 0;
        } else {
            self.buf.clear();
            self.scanned = 0;
            self.start = 0;
        }
    }
}

impl Default for JsonArrayDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementDecoder for JsonArrayDecoder {
    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.buf.extend_from_slice(chunk);
        let mut elements = Vec::new();

        for i in self.scanned..self.buf.len() {
            let byte = self.buf[i];
            match self.state {
                ArrayState::Start => match byte {
                    b'[' => self.state = ArrayState::BeforeElement { after_comma: false },
                    b if b.is_ascii_whitespace() => {}
                    b => return Err(Self::unexpected(b, "before the opening '['")),
                },
                ArrayState::BeforeElement { after_comma } => match byte {
                    b if b.is_ascii_whitespace() => {}
                    b']' if !after_comma => self.state = ArrayState::End,
                    b']' | b',' => return Err(Self::unexpected(byte, "where an element was expected")),
                    b => {
                        self.state = ArrayState::InElement;
                        self.start = i;
                        self.composite = matches!(b, b'[' | b'{');
                        self.depth = usize::from(self.composite);
                        self.in_string = b == b'"';
                        self.escaped = false;
                    }
                },
                ArrayState::InElement => {
                    if self.in_string {
                        if self.escaped {
                            self.escaped = false;
                        } else if byte == b'\\' {
                            self.escaped = true;
                        } else if byte == b'"' {
                            self.in_string = false;
                        }
                        continue;
                    }
                    match byte {
                        b'"' => self.in_string = true,
                        b'[' | b'{' => self.depth += 1,
                        b']' | b'}' if self.depth == 0 => {
                            if byte != b']' {
                                return Err(Self::unexpected(byte, "after a scalar element"));
                            }
                            elements.push(self.take_scalar(i));
                            self.state = ArrayState::End;
                        }
                        b']' | b'}' => {
                            self.depth -= 1;
                            if self.depth == 0 && self.composite {
                                elements.push(self.buf[self.start..=i].to_vec());
                                self.state = ArrayState::AfterElement;
                            }
                        }
                        b',' if self.depth == 0 => {
                            elements.push(self.take_scalar(i));
                            self.state = ArrayState::BeforeElement { after_comma: true };
                        }
                        _ => {}
                    }
                }
                ArrayState::AfterElement => match byte {
                    b',' => self.state = ArrayState::BeforeElement { after_comma: true },
                    b']' => self.state = ArrayState::End,
                    b if b.is_ascii_whitespace() => {}
                    b => return Err(Self::unexpected(b, "between elements")),
                },
                ArrayState::End => {
                    if !byte.is_ascii_whitespace() {
                        return Err(Self::unexpected(byte, "after the closing ']'"));
                    }
                }
            }
        }

        self.scanned = self.buf.len();
        self.compact();
        Ok(elements)
    }

    fn finish(&mut self) -> Result<Option<Vec<u8>>> {
        match self.state {
            ArrayState::End => Ok(None),
            ArrayState::Start => Err(PingError::decode("body ended before the array started")),
            _ => Err(PingError::decode("body ended inside the array")),
        }
    }
}

/// Splits newline-delimited JSON; blank lines are ignored.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buf: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ElementDecoder for NdjsonDecoder {
    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.buf.extend_from_slice(chunk);
        let mut elements = Vec::new();

        while let Some(newline) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=newline).collect();
            let line = line.trim_ascii();
            if !line.is_empty() {
                elements.push(line.to_vec());
            }
        }

        Ok(elements)
    }

    fn finish(&mut self) -> Result<Option<Vec<u8>>> {
        let rest = std::mem::take(&mut self.buf);
        let rest = rest.trim_ascii();
        Ok((!rest.is_empty()).then(|| rest.to_vec()))
    }
}

struct DecodeState<S, T> {
    body: Pin<Box<S>>,
    decoder: Box<dyn ElementDecoder>,
    pending: VecDeque<Result<T>>,
    finished: bool,
}

fn parse_element<T: DeserializeOwned>(raw: &[u8]) -> Result<T> {
    serde_json::from_slice(raw).map_err(|e| {
        PingError::decode(format!(
            "{} in element {}",
            e,
            String::from_utf8_lossy(raw)
        ))
    })
}

/// Turn a chunked body into a stream of decoded elements.
///
/// Each element decodes on its own, so one bad element yields one `Err` and
/// decoding carries on. A transport error yields one `Err` and ends the
/// stream: once a body read has failed the body is not polled again. A
/// structural error (the body is not an array) also yields one `Err` and ends
/// the stream since the element boundaries are lost.
pub fn decode_elements<S, B, E, T>(body: S, format: StreamFormat) -> impl Stream<Item = Result<T>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send,
    B: AsRef<[u8]>,
    E: Into<PingError>,
    T: DeserializeOwned + Send,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: format.decoder(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }

            match st.body.next().await {
                Some(Ok(chunk)) => match st.decoder.decode(chunk.as_ref()) {
                    Ok(elements) => st
                        .pending
                        .extend(elements.iter().map(|raw| parse_element(raw))),
                    Err(e) => {
                        st.pending.push_back(Err(e));
                        st.finished = true;
                    }
                },
                Some(Err(e)) => {
                    st.pending.push_back(Err(e.into()));
                    st.finished = true;
                }
                None => {
                    st.finished = true;
                    match st.decoder.finish() {
                        Ok(Some(raw)) => st.pending.push_back(parse_element(&raw)),
                        Ok(None) => {}
                        Err(e) => st.pending.push_back(Err(e)),
                    }
                }
            }
        }
    })
}
