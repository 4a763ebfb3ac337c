//! Content-based mime detection.
//!
//! Declared content types come from the client and are never used for gating;
//! the allowlist check runs against what the stored bytes look like.

/// Number of leading bytes inspected
pub const SNIFF_LEN: usize = 8192;

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const TEXT_PLAIN: &str = "text/plain";

/// Guess the mime type of `data` from its leading bytes.
///
/// Magic byte signatures win. Content without a signature that is valid UTF-8
/// and has no NUL byte is `text/plain`; everything else is
/// `application/octet-stream`.
pub fn sniff(data: &[u8]) -> String {
    let head = &data[..data.len().min(SNIFF_LEN)];

    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_string();
    }

    if !head.contains(&0) && is_utf8_prefix(head) {
        return TEXT_PLAIN.to_string();
    }

    OCTET_STREAM.to_string()
}

// A truncated prefix may cut a multi-byte character in half.
fn is_utf8_prefix(data: &[u8]) -> bool {
    match std::str::from_utf8(data) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none() && data.len() == SNIFF_LEN,
    }
}

/// Compare a detected type with an allowlist entry, ignoring parameters and case
pub fn matches(detected: &str, accepted: &str) -> bool {
    essence(detected).eq_ignore_ascii_case(essence(accepted))
}

fn essence(mime: &str) -> &str {
    mime.split(';').next().unwrap_or(mime).trim()
}
