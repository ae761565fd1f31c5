//! Incremental frame decoder for the webtiles socket.
//!
//! Servers push two kinds of WebSocket frames:
//!
//!   * text frames holding JSON, and
//!   * binary frames holding a slice of one raw-deflate stream that spans the
//!     whole connection. Each slice is flushed with a sync marker whose
//!     trailing `00 00 ff ff` bytes are stripped before sending.
//!
//! The decoded text is a sequence of JSON values: usually one `{"msgs":[..]}`
//! batch, sometimes a bare `{"msg":..}` object, an array, or several values
//! back to back. A value cut in half at a frame boundary is buffered until the
//! rest arrives. [`FrameDecoder`] yields the individual message objects in the
//! order the server produced them.
use bytes::{Buf, BytesMut};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use log::{trace, warn};
use serde_json::Value;
use thiserror::Error;

use crate::logutil::{hex_preview, truncate_for_log};
use crate::metrics;

/// Tail removed by the server from every compressed frame.
pub const SYNC_TAIL: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Upper bound on buffered, not yet parseable JSON.
const MAX_PENDING: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("compressed frame received but compression is disabled")]
    CompressionDisabled,
    #[error("inflate failed: {0}")]
    Inflate(#[from] flate2::DecompressError),
    #[error("deflate failed: {0}")]
    Deflate(#[from] flate2::CompressError),
    #[error("frame buffer exceeded {limit} bytes")]
    Oversize { limit: usize },
}

pub struct FrameDecoder {
    inflater: Option<Decompress>,
    pending: BytesMut,
}

impl FrameDecoder {
    pub fn new(compression_enabled: bool) -> Self {
        Self {
            inflater: compression_enabled.then(|| Decompress::new(false)),
            pending: BytesMut::with_capacity(16 * 1024),
        }
    }

    /// Bytes waiting for the remainder of a split JSON value.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn push_text(&mut self, text: &str) -> Result<Vec<Value>, CodecError> {
        trace!(target: "crawlgate::wire", "text frame: {}", truncate_for_log(text, 512));
        self.append(text.as_bytes())?;
        Ok(self.drain_values())
    }

    pub fn push_binary(&mut self, data: &[u8]) -> Result<Vec<Value>, CodecError> {
        trace!(target: "crawlgate::wire", "binary frame ({} bytes): {}", data.len(), hex_preview(data, 24));
        let inflated = self.inflate(data)?;
        self.append(&inflated)?;
        Ok(self.drain_values())
    }

    fn append(&mut self, data: &[u8]) -> Result<(), CodecError> {
        if self.pending.len() + data.len() > MAX_PENDING {
            self.pending.clear();
            return Err(CodecError::Oversize { limit: MAX_PENDING });
        }
        self.pending.extend_from_slice(data);
        Ok(())
    }

    fn inflate(&mut self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let inflater = self
            .inflater
            .as_mut()
            .ok_or(CodecError::CompressionDisabled)?;
        let mut input = Vec::with_capacity(data.len() + SYNC_TAIL.len());
        input.extend_from_slice(data);
        input.extend_from_slice(&SYNC_TAIL);

        let mut out = Vec::with_capacity(data.len() * 4 + 256);
        let mut offset = 0usize;
        loop {
            if out.capacity() - out.len() < 1024 {
                out.reserve(out.capacity().max(4096));
            }
            let in_before = inflater.total_in();
            let out_before = inflater.total_out();
            let status = inflater.decompress_vec(&input[offset..], &mut out, FlushDecompress::Sync)?;
            let consumed = (inflater.total_in() - in_before) as usize;
            let produced = (inflater.total_out() - out_before) as usize;
            offset += consumed;
            if out.len() > MAX_PENDING {
                return Err(CodecError::Oversize { limit: MAX_PENDING });
            }
            if status == Status::StreamEnd {
                break;
            }
            let out_full = out.len() == out.capacity();
            if offset >= input.len() && !out_full {
                break;
            }
            if consumed == 0 && produced == 0 && !out_full {
                break;
            }
        }
        Ok(out)
    }

    /// Parse every complete JSON value at the front of the buffer.
    ///
    /// An incomplete trailing value stays buffered. A syntax error poisons
    /// everything behind it, so the buffer is dropped and counted.
    fn drain_values(&mut self) -> Vec<Value> {
        let mut values = Vec::new();
        let mut consumed = 0usize;
        let mut poisoned = false;
        {
            let mut stream = serde_json::Deserializer::from_slice(&self.pending).into_iter::<Value>();
            loop {
                match stream.next() {
                    Some(Ok(value)) => {
                        consumed = stream.byte_offset();
                        values.push(value);
                    }
                    Some(Err(e)) if e.is_eof() => break,
                    Some(Err(e)) => {
                        warn!(
                            "Dropping undecodable frame data ({} bytes): {}",
                            self.pending.len() - consumed,
                            e
                        );
                        poisoned = true;
                        break;
                    }
                    None => {
                        consumed = self.pending.len();
                        break;
                    }
                }
            }
        }
        if poisoned {
            metrics::inc_decode_errors();
            self.pending.clear();
        } else {
            self.pending.advance(consumed);
        }

        let mut messages = Vec::with_capacity(values.len());
        for value in values {
            split_batch(value, &mut messages);
        }
        messages
    }
}

/// Expand batch envelopes into the individual message objects.
fn split_batch(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Object(mut map) => {
            if !map.contains_key("msg") {
                if let Some(Value::Array(batch)) = map.remove("msgs") {
                    for inner in batch {
                        split_batch(inner, out);
                    }
                    return;
                }
            }
            out.push(Value::Object(map));
        }
        Value::Array(batch) => {
            for inner in batch {
                split_batch(inner, out);
            }
        }
        other => {
            metrics::inc_decode_errors();
            warn!("Skipping non-object JSON value in frame: {}", truncate_for_log(&other.to_string(), 120));
        }
    }
}

/// Server-side counterpart of [`FrameDecoder`]: compresses text into
/// webtiles-style binary frames. Used by fake servers in tests and by tooling
/// that replays captured sessions.
pub struct FrameEncoder {
    deflater: Compress,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self {
            deflater: Compress::new(Compression::default(), false),
        }
    }

    pub fn encode(&mut self, text: &str) -> Result<Vec<u8>, CodecError> {
        let input = text.as_bytes();
        let mut out = Vec::with_capacity(input.len() / 2 + 64);
        let mut offset = 0usize;
        loop {
            if out.capacity() - out.len() < 64 {
                out.reserve(out.capacity().max(1024));
            }
            let in_before = self.deflater.total_in();
            self.deflater
                .compress_vec(&input[offset..], &mut out, FlushCompress::Sync)?;
            offset += (self.deflater.total_in() - in_before) as usize;
            if offset >= input.len() && out.len() < out.capacity() {
                break;
            }
        }
        if out.ends_with(&SYNC_TAIL) {
            out.truncate(out.len() - SYNC_TAIL.len());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_batched_envelope_in_order() {
        let mut dec = FrameDecoder::new(true);
        let out = dec
            .push_text(r#"{"msgs":[{"msg":"ping"},{"msg":"input_mode","mode":1},{"msg":"msgs","messages":[]}]}"#)
            .unwrap();
        let kinds: Vec<_> = out.iter().map(|v| v["msg"].as_str().unwrap().to_string()).collect();
        assert_eq!(kinds, vec!["ping", "input_mode", "msgs"]);
    }

    #[test]
    fn bare_message_and_concatenated_values() {
        let mut dec = FrameDecoder::new(false);
        let out = dec
            .push_text(r#"{"msg":"ping"} {"msgs":[{"msg":"pong"}]}[{"msg":"close"}]"#)
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[2], json!({"msg":"close"}));
    }

    #[test]
    fn value_split_across_frames_is_reassembled() {
        let mut dec = FrameDecoder::new(false);
        let first = dec.push_text(r#"{"msgs":[{"msg":"player","hp":1"#).unwrap();
        assert!(first.is_empty());
        assert!(dec.pending_len() > 0);
        let second = dec.push_text(r#"0,"turn":3}]}"#).unwrap();
        assert_eq!(second, vec![json!({"msg":"player","hp":10,"turn":3})]);
        assert_eq!(dec.pending_len(), 0);
    }

    #[test]
    fn syntax_error_drops_buffer_but_keeps_prior_values() {
        let mut dec = FrameDecoder::new(false);
        let out = dec.push_text(r#"{"msg":"ping"} }garbage"#).unwrap();
        assert_eq!(out, vec![json!({"msg":"ping"})]);
        assert_eq!(dec.pending_len(), 0);
        let next = dec.push_text(r#"{"msg":"pong"}"#).unwrap();
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn compressed_frames_share_one_stream() {
        let mut enc = FrameEncoder::new();
        let mut dec = FrameDecoder::new(true);
        let a = enc.encode(r#"{"msgs":[{"msg":"input_mode","mode":0}]}"#).unwrap();
        let b = enc.encode(r#"{"msgs":[{"msg":"input_mode","mode":1}]}"#).unwrap();
        assert!(!a.ends_with(&SYNC_TAIL));
        let first = dec.push_binary(&a).unwrap();
        let second = dec.push_binary(&b).unwrap();
        assert_eq!(first[0]["mode"], 0);
        assert_eq!(second[0]["mode"], 1);
    }

    #[test]
    fn large_compressed_batch_inflates_fully() {
        let mut enc = FrameEncoder::new();
        let mut dec = FrameDecoder::new(true);
        let cells: Vec<Value> = (0..5000).map(|i| json!({"x": i, "y": 1, "g": "."})).collect();
        let text = json!({"msgs":[{"msg":"map","cells":cells}]}).to_string();
        let frame = enc.encode(&text).unwrap();
        let out = dec.push_binary(&frame).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["cells"].as_array().unwrap().len(), 5000);
    }

    #[test]
    fn binary_frame_rejected_without_compression() {
        let mut dec = FrameDecoder::new(false);
        assert!(matches!(
            dec.push_binary(&[1, 2, 3]),
            Err(CodecError::CompressionDisabled)
        ));
    }
}
