//! # DAP frame codec
//!
//! spec §6: one or more `\r\n`-terminated headers, a blank `\r\n`, then
//! exactly `Content-Length` bytes of UTF-8 JSON. Only `Content-Length` is
//! required; other headers are ignored.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::DapError;

#[derive(Debug, Default)]
pub struct DapCodec;

impl Decoder for DapCodec {
    type Item = Vec<u8>;
    type Error = DapError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Vec<u8>>, DapError> {
        let Some(header_end) = find_header_end(src) else {
            return Ok(None);
        };

        let header_text = std::str::from_utf8(&src[..header_end])
            .map_err(|e| DapError::MalformedFrame(e.to_string()))?;
        let content_length = header_text
            .split("\r\n")
            .find_map(|line| line.strip_prefix("Content-Length:"))
            .ok_or(DapError::MissingContentLength)?
            .trim()
            .parse::<usize>()
            .map_err(|e| DapError::MalformedFrame(format!("invalid Content-Length: {e}")))?;

        let body_start = header_end + 4;
        let total = body_start + content_length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(body_start);
        Ok(Some(src.split_to(content_length).to_vec()))
    }
}

impl Encoder<Vec<u8>> for DapCodec {
    type Error = DapError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), DapError> {
        dst.extend_from_slice(format!("Content-Length: {}\r\n\r\n", item.len()).as_bytes());
        dst.extend_from_slice(&item);
        Ok(())
    }
}

fn find_header_end(src: &BytesMut) -> Option<usize> {
    src.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_complete_frame() {
        let body = b"{\"seq\":1,\"a\":1}";
        let mut buf = BytesMut::new();
        buf.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
        buf.extend_from_slice(body);
        let mut codec = DapCodec;
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, body);
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_more_bytes_when_body_is_incomplete() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"Content-Length: 20\r\n\r\n{\"a\":1}");
        let mut codec = DapCodec;
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn missing_content_length_is_an_error() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"X-Other: 1\r\n\r\n{}");
        let mut codec = DapCodec;
        assert!(matches!(codec.decode(&mut buf), Err(DapError::MissingContentLength)));
    }

    #[test]
    fn round_trips_through_encode_then_decode() {
        let mut codec = DapCodec;
        let mut buf = BytesMut::new();
        codec.encode(br#"{"seq":7}"#.to_vec(), &mut buf).unwrap();
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, br#"{"seq":7}"#);
    }
}
