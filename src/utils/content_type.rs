use mime::Mime;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Number of leading bytes inspected when detecting a content type.
pub const SNIFF_LEN: usize = 1024;

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const TEXT_UTF8: &str = "text/plain; charset=utf-8";

/// Path-segment escaping for the quoted `filename` parameter.
const FILENAME_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b',')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');

/// Detects a MIME type from the first bytes of a payload.
///
/// Only the first [`SNIFF_LEN`] bytes of `head` are looked at.
pub fn sniff(head: &[u8]) -> String {
    let head = &head[..head.len().min(SNIFF_LEN)];

    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_string();
    }

    if looks_like_text(head) {
        TEXT_UTF8.to_string()
    } else {
        OCTET_STREAM.to_string()
    }
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // a multi-byte character cut by the sniff window is still text
        Err(e) => e.error_len().is_none(),
    }
}

/// Builds a `Content-Disposition` value for `filename`.
///
/// Media, text and PDF are shown inline, everything else downloads.
pub fn content_disposition(filename: &str, content_type: &str) -> String {
    let fallback_filename = if filename.is_empty() {
        "file".to_string()
    } else {
        utf8_percent_encode(filename, FILENAME_ESCAPE).to_string()
    };

    // RFC 5987 percent-encoding for UTF-8 filename
    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    let disposition_type = if is_inline(content_type) {
        "inline"
    } else {
        "attachment"
    };

    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        disposition_type, fallback_filename, encoded_filename
    )
}

fn is_inline(content_type: &str) -> bool {
    let Ok(parsed) = content_type.parse::<Mime>() else {
        return false;
    };
    let top = parsed.type_();
    top == mime::IMAGE
        || top == mime::VIDEO
        || top == mime::AUDIO
        || top == mime::TEXT
        || parsed.essence_str() == mime::APPLICATION_PDF.essence_str()
}
