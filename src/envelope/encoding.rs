use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Max line length for base64 bodies (RFC 2045).
pub const MAX_LINE_LEN: usize = 76;

pub const CRLF: &str = "\r\n";

pub fn encode_base64(src: &[u8]) -> Vec<u8> {
    BASE64.encode(src).into_bytes()
}

/// Splits `src` into chunks of at most `max_len` bytes joined by `sep`.
///
/// The separator only goes between chunks, so the output never ends with it:
/// the multipart writer emits its own CRLF before the next boundary line.
pub fn wrap(src: &[u8], max_len: usize, sep: &str) -> Vec<u8> {
    assert!(max_len > 0, "wrap needs a positive line length");

    let chunks = src.len().div_ceil(max_len);
    let mut dst = Vec::with_capacity(src.len() + chunks.saturating_sub(1) * sep.len());
    for (i, chunk) in src.chunks(max_len).enumerate() {
        if i > 0 {
            dst.extend_from_slice(sep.as_bytes());
        }
        dst.extend_from_slice(chunk);
    }
    dst
}

/// Base64-encodes `src` and wraps it at [`MAX_LINE_LEN`] with CRLF.
pub fn encode_body(src: &[u8]) -> Vec<u8> {
    wrap(&encode_base64(src), MAX_LINE_LEN, CRLF)
}
