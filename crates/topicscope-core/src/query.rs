//! Query-string helpers shared by the filter builder and the cursor codec.
//!
//! `&`-separated `key=value` pairs, no `;` separators,
//! no nested decoding.

/// Percent-encode a query value.
///
/// Encodes all bytes outside the unreserved set, except `:` which stays
/// literal so ISO-8601 timestamps read the way the backend expects them.
#[must_use]
pub fn encode_value(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len() + 8);
    for &b in s.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b':' => {
                out.push(char::from(b));
            }
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0x0F) as usize]));
            }
        }
    }
    out
}

/// Percent-decode a single URL query component.
///
/// - `+` decodes to a space
/// - invalid or truncated `%` escapes are preserved verbatim
/// - decoded bytes are interpreted as UTF-8 (lossy), so non-ASCII works
#[must_use]
pub fn decode_value(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = [bytes[i + 1], bytes[i + 2]];
                if let Some(value) = std::str::from_utf8(&hex)
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                {
                    out.push(value);
                    i += 3;
                    continue;
                }
                out.push(bytes[i]);
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Split a query string into decoded `(key, value)` pairs, in order.
///
/// A leading `?` is ignored, as are empty segments. A segment without `=`
/// yields an empty value.
#[must_use]
pub fn pairs(query: &str) -> Vec<(String, String)> {
    let query = query.strip_prefix('?').unwrap_or(query);
    query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((k, v)) => (decode_value(k), decode_value(v)),
            None => (decode_value(segment), String::new()),
        })
        .collect()
}

/// Return the first non-empty decoded value for `key`.
#[must_use]
pub fn get(query: &str, key: &str) -> Option<String> {
    pairs(query)
        .into_iter()
        .find(|(k, v)| k == key && !v.is_empty())
        .map(|(_, v)| v)
}

/// Return the portion after the first `?`, or the whole string when there is none.
#[must_use]
pub fn query_part(link: &str) -> &str {
    link.split_once('?').map_or(link, |(_, q)| q)
}

/// Join already-encoded `key=value` pairs with `&`.
#[must_use]
pub fn join(params: &[(&str, String)]) -> String {
    let mut out = String::new();
    for (i, (k, v)) in params.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(k);
        out.push('=');
        out.push_str(v);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_basic() {
        assert_eq!(decode_value("hello"), "hello");
        assert_eq!(decode_value("hello+world"), "hello world");
        assert_eq!(decode_value("hello%20world"), "hello world");
        assert_eq!(decode_value("%40user"), "@user");
        assert_eq!(decode_value("key%3Dvalue"), "key=value");
    }

    #[test]
    fn decode_invalid_hex_is_preserved() {
        assert_eq!(decode_value("%ZZ"), "%ZZ");
        assert_eq!(decode_value("abc%2"), "abc%2");
        assert_eq!(decode_value("%"), "%");
    }

    #[test]
    fn decode_utf8_multibyte() {
        // "€" U+20AC is UTF-8 bytes E2 82 AC.
        assert_eq!(decode_value("%E2%82%AC"), "€");
    }

    #[test]
    fn encode_keeps_timestamps_and_cursors_readable() {
        assert_eq!(
            encode_value("2023-01-01T00:00:00.000Z"),
            "2023-01-01T00:00:00.000Z"
        );
        assert_eq!(encode_value("0-100_2-55"), "0-100_2-55");
        assert_eq!(encode_value("a b&c=d"), "a%20b%26c%3Dd");
    }

    #[test]
    fn encode_then_decode_is_identity() {
        for s in ["err", "a b&c=d", "€uro", "50%", "x+y"] {
            assert_eq!(decode_value(&encode_value(s)), s);
        }
    }

    #[test]
    fn pairs_skip_empty_segments_and_leading_question_mark() {
        let p = pairs("?sort=Newest&&partition=2&flag");
        assert_eq!(
            p,
            vec![
                ("sort".to_string(), "Newest".to_string()),
                ("partition".to_string(), "2".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn get_ignores_empty_values() {
        assert_eq!(get("after=&after=0-1", "after").as_deref(), Some("0-1"));
        assert_eq!(get("sort=Oldest", "after"), None);
    }

    #[test]
    fn query_part_of_link() {
        assert_eq!(query_part("/api/c/topic/t/data?sort=Oldest"), "sort=Oldest");
        assert_eq!(query_part("0-1_2-3"), "0-1_2-3");
    }
}
