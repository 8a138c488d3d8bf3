//! URL normalization and payload field encoding
//!
//! Tracked URLs are reduced to path + query. Text fields (title, url,
//! referrer) go out in a consistent URI form: already-escaped input is
//! decoded, plain input is escaped with the `encodeURI` character set.

use std::borrow::Cow;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Characters `decodeURI` leaves escaped and `encodeURI` leaves literal.
const RESERVED: &[u8] = b";/?:@&=+$,#";

/// Everything `encodeURI` escapes: all but alphanumerics, [`RESERVED`] and
/// the unreserved marks.
const ENCODE_URI_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b';')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b',')
    .remove(b'#')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Why a string could not be URI-decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// `%` not followed by two hex digits
    MalformedEscape(usize),
    /// Escaped bytes in the run starting here do not form valid UTF-8
    InvalidUtf8(usize),
}

/// Normalize a navigation target to path + query.
///
/// Absolute URLs lose scheme, authority and fragment. Anything that does not
/// parse as an absolute URL is kept verbatim. With `exclude_search` the query
/// is dropped as well.
pub fn normalize_url(url: &str, exclude_search: bool) -> String {
    let normalized = match Url::parse(url) {
        Ok(parsed) => match parsed.query().filter(|q| !q.is_empty()) {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        },
        Err(_) => url.to_string(),
    };

    if exclude_search {
        match normalized.split_once('?') {
            Some((path, _)) => path.to_string(),
            None => normalized,
        }
    } else {
        normalized
    }
}

/// Encode an optional payload field.
///
/// Empty input is absent. If decoding changes the string the decoded form
/// wins, if decoding fails the raw string is kept, otherwise it is escaped.
pub fn encode_field(value: Option<&str>) -> Option<String> {
    let value = value.filter(|v| !v.is_empty())?;

    match decode_uri(value) {
        Ok(decoded) if decoded != value => Some(decoded),
        Ok(_) => Some(encode_uri(value)),
        Err(_) => Some(value.to_string()),
    }
}

/// Percent-encode everything outside the `encodeURI` safe set.
pub fn encode_uri(input: &str) -> String {
    utf8_percent_encode(input, ENCODE_URI_SET).to_string()
}

/// Decode `%XX` escapes, leaving escapes of reserved characters in place.
pub fn decode_uri(input: &str) -> Result<String, DecodeError> {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut run_start = 0;
    let mut i = 0;

    while let Some(offset) = bytes[i..].iter().position(|&b| b == b'%') {
        let at = i + offset;
        let byte = hex_byte(bytes, at).ok_or(DecodeError::MalformedEscape(at))?;
        if RESERVED.contains(&byte) {
            out.push_str(&decode_run(&input[run_start..at], run_start)?);
            out.push_str(&input[at..at + 3]);
            run_start = at + 3;
        }
        i = at + 3;
    }

    out.push_str(&decode_run(&input[run_start..], run_start)?);
    Ok(out)
}

/// Decode a run of text whose escapes are all well formed.
fn decode_run(run: &str, start: usize) -> Result<Cow<'_, str>, DecodeError> {
    percent_decode_str(run)
        .decode_utf8()
        .map_err(|_| DecodeError::InvalidUtf8(start))
}

/// Parse the two hex digits following the `%` at `at`.
fn hex_byte(bytes: &[u8], at: usize) -> Option<u8> {
    let hi = (*bytes.get(at + 1)? as char).to_digit(16)?;
    let lo = (*bytes.get(at + 2)? as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}
