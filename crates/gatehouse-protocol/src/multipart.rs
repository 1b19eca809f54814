//! Multipart section layout for the relay response.
//!
//! Every frame becomes one section of a `multipart/x-mixed-replace` body:
//!
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <len>\r\n
//! \r\n
//! <frame bytes>\r\n
//! ```
//!
//! A section is assembled into one contiguous buffer so that the writer can
//! hand it to the sink in a single write.

use bytes::{BufMut, Bytes, BytesMut};
use gatehouse_core::constants::MULTIPART_BOUNDARY;

const CRLF: &[u8] = b"\r\n";

/// Header block preceding a frame of `len` bytes.
pub fn part_header(len: usize) -> String {
    format!(
        "--{MULTIPART_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {len}\r\n\r\n"
    )
}

/// Append one complete section for `frame` to `dst`.
pub fn write_part(frame: &[u8], dst: &mut BytesMut) {
    let header = part_header(frame.len());
    dst.reserve(header.len() + frame.len() + CRLF.len());
    dst.put_slice(header.as_bytes());
    dst.put_slice(frame);
    dst.put_slice(CRLF);
}

/// One complete section for `frame`.
pub fn encode_part(frame: &[u8]) -> Bytes {
    let mut dst = BytesMut::new();
    write_part(frame, &mut dst);
    dst.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_layout() {
        let part = encode_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        let mut expected = b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\n".to_vec();
        expected.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xD9]);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(&part[..], &expected[..]);
    }

    #[test]
    fn test_content_length_is_exact() {
        let frame = vec![0xAB; 12_345];
        let header = part_header(frame.len());
        assert!(header.contains("Content-Length: 12345\r\n"));
        assert_eq!(encode_part(&frame).len(), header.len() + frame.len() + 2);
    }
}
