//! URI and file path conversions.
//!
//! The protocol layer addresses files by `file://` URI while the analysis
//! engine works with plain file paths. Conversions percent-encode and decode
//! individual path segments so that scoped package directories like
//! `@types/node` survive the round trip.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use url::Url;

/// Characters escaped in a URI path segment.
///
/// Matches the set JavaScript's `encodeURIComponent` leaves alone, so URIs
/// produced here are interchangeable with ones produced by LSP clients.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Convert an absolute file path to a `file://` URI.
///
/// Each path segment is percent-encoded individually.
pub fn path_to_uri(path: &str) -> String {
    let mut uri = String::from("file://");
    if !path.starts_with('/') {
        uri.push('/');
    }
    let encoded: Vec<String> = path
        .split('/')
        .map(|segment| utf8_percent_encode(segment, COMPONENT).to_string())
        .collect();
    uri.push_str(&encoded.join("/"));
    uri
}

/// Convert a `file://` URI back to a file path, percent-decoding each
/// segment. Non-file URIs are returned with the scheme stripped as-is.
pub fn uri_to_path(uri: &str) -> String {
    let raw = uri.strip_prefix("file://").unwrap_or(uri);
    let decoded: Vec<String> = raw.split('/').map(decode_component).collect();
    decoded.join("/")
}

/// Normalize a URI by parsing and re-serializing it.
///
/// Leaves the input untouched when it does not parse as a URL.
pub fn normalize_uri(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => uri.to_string(),
    }
}

/// Percent-decode a single path component. Invalid UTF-8 escapes decode
/// lossily rather than failing the request.
pub fn decode_component(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

/// Percent-encode a single path component.
pub fn encode_component(component: &str) -> String {
    utf8_percent_encode(component, COMPONENT).to_string()
}

/// Whether a file belongs to the bundled standard library rather than user
/// code. Standard library files are named `lib.*.d.ts` (`lib.d.ts`,
/// `lib.es2017.d.ts`, ...).
pub fn is_standard_library(file_name: &str) -> bool {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    base.starts_with("lib.") && base.ends_with(".d.ts")
}

#[cfg(test)]
mod uri_tests {
    use super::*;

    #[test]
    fn test_path_to_uri_encodes_segments() {
        assert_eq!(
            path_to_uri("/workspace/node_modules/@types/node/index.d.ts"),
            "file:///workspace/node_modules/%40types/node/index.d.ts"
        );
    }

    #[test]
    fn test_uri_to_path_round_trip() {
        let path = "/workspace/node_modules/@types/node/index.d.ts";
        assert_eq!(uri_to_path(&path_to_uri(path)), path);
    }

    #[test]
    fn test_uri_to_path_plain() {
        assert_eq!(uri_to_path("file:///a/b.ts"), "/a/b.ts");
    }

    #[test]
    fn test_normalize_uri_keeps_unparseable_input() {
        assert_eq!(normalize_uri("not a uri"), "not a uri");
    }

    #[test]
    fn test_is_standard_library() {
        assert!(is_standard_library("/ts/lib/lib.es2017.d.ts"));
        assert!(is_standard_library("lib.d.ts"));
        assert!(!is_standard_library("/a/library.d.ts"));
        assert!(!is_standard_library("/a/lib.foo.ts"));
    }
}
