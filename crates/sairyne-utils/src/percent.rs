//! Percent-style escaping for custom-scheme URL query parameters.

use std::borrow::Cow;

/// Encode arbitrary text so it can travel as a single URL query value.
///
/// Every UTF-8 byte outside `A-Z a-z 0-9 - _ . ~` becomes an uppercase
/// `%XX` triplet, so `:`, `/`, `?`, `=`, `&`, `%`, `+`, space and line
/// breaks never appear literally in the token.
pub fn encode_for_transport(text: &str) -> String {
    urlencoding::encode(text).into_owned()
}

/// Decode a token produced by [`encode_for_transport`] (or by the content
/// side's `encodeURIComponent`).
///
/// Each `%XX` triplet is consumed exactly once, so a decoded `%` is never
/// seen again as the start of another escape. `+` decodes to a space. An
/// incomplete or non-hex escape passes through literally. Bytes that do
/// not form valid UTF-8 become U+FFFD.
pub fn decode_from_transport(token: &str) -> String {
    let spaced: Cow<'_, str> = if token.contains('+') {
        Cow::Owned(token.replace('+', " "))
    } else {
        Cow::Borrowed(token)
    };
    let bytes = urlencoding::decode_binary(spaced.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Extract and decode one parameter from a `name=value&name=value` query.
///
/// Returns `None` when the parameter is absent and `Some("")` when it is
/// present without a value. The first occurrence wins.
pub fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == name).then(|| decode_from_transport(value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_characters_are_escaped() {
        let token = encode_for_transport(": / ? = & % + \n\r");
        for reserved in [':', '/', '?', '=', '&', '+', ' ', '\n', '\r'] {
            assert!(!token.contains(reserved), "{reserved:?} leaked into {token}");
        }
        assert_eq!(token, "%3A%20%2F%20%3F%20%3D%20%26%20%25%20%2B%20%0A%0D");
    }

    #[test]
    fn test_round_trip_ascii_and_controls() {
        let mut sample = String::new();
        for byte in 0u8..0x80 {
            sample.push(byte as char);
        }
        assert_eq!(decode_from_transport(&encode_for_transport(&sample)), sample);
    }

    #[test]
    fn test_round_trip_unicode() {
        let sample = "Привет, мир! 🎧 {\"k\":\"v%20\"}";
        assert_eq!(decode_from_transport(&encode_for_transport(sample)), sample);
    }

    #[test]
    fn test_encoded_percent_is_not_decoded_twice() {
        // "%2541" must decode to the literal text "%41", not to "A".
        assert_eq!(decode_from_transport("%2541"), "%41");
        assert_eq!(decode_from_transport("%252B"), "%2B");
    }

    #[test]
    fn test_unrecognized_escape_passes_through() {
        assert_eq!(decode_from_transport("100%"), "100%");
        assert_eq!(decode_from_transport("%zz%4"), "%zz%4");
        assert_eq!(decode_from_transport("a%2"), "a%2");
    }

    #[test]
    fn test_plus_and_lowercase_hex() {
        assert_eq!(decode_from_transport("a+b%2b%3a"), "a b+:");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        assert_eq!(decode_from_transport("%FFok"), "\u{FFFD}ok");
    }

    #[test]
    fn test_query_param() {
        let query = "key=sairyne_users&value=%7B%22a%22%3A1%7D&empty=";
        assert_eq!(query_param(query, "key").as_deref(), Some("sairyne_users"));
        assert_eq!(query_param(query, "value").as_deref(), Some("{\"a\":1}"));
        assert_eq!(query_param(query, "empty").as_deref(), Some(""));
        assert_eq!(query_param(query, "missing"), None);
    }
}
