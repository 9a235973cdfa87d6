use std::collections::HashMap;

fn decode(encoded: &str, plus_is_space: bool) -> Option<String> {
    let mut decoded = Vec::with_capacity(encoded.len());
    let mut bytes = encoded.bytes();

    while let Some(byte) = bytes.next() {
        match byte {
            b'%' => {
                let first = bytes.next()?;
                let second = bytes.next()?;
                let hex = std::str::from_utf8(&[first, second])
                    .ok()
                    .and_then(|s| u8::from_str_radix(s, 16).ok())?;

                decoded.push(hex)
            }

            b'+' if plus_is_space => decoded.push(b' '),

            byte => decoded.push(byte),
        }
    }

    String::from_utf8(decoded).ok()
}

/// Decodes a path segment captured by a route. `+` stays as is.
pub fn path(encoded: &str) -> Option<String> {
    decode(encoded, false)
}

/// Decodes an `application/x-www-form-urlencoded` query string. Returns `None` when a pair or
/// an escape is malformed. A key without `=` maps to an empty value.
pub fn map(encoded: &str) -> Option<HashMap<String, String>> {
    let mut map = HashMap::new();

    for pair in encoded.split('&') {
        if pair.is_empty() {
            continue;
        }

        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));

        map.insert(decode(key, true)?, decode(value, true)?);
    }

    Some(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_pairs() {
        let map = map("name=caf%C3%A9&q=a+b&flag&x=%26").unwrap();

        assert_eq!(map["name"], "café");
        assert_eq!(map["q"], "a b");
        assert_eq!(map["flag"], "");
        assert_eq!(map["x"], "&");
    }

    #[test]
    fn rejects_broken_escapes() {
        assert!(map("a=%2").is_none());
        assert!(map("a=%zz").is_none());
        assert!(path("%zz").is_none());
    }

    #[test]
    fn path_segments_keep_plus() {
        assert_eq!(path("john%20doe").as_deref(), Some("john doe"));
        assert_eq!(path("a+b").as_deref(), Some("a+b"));
        assert_eq!(path("docs%2Fguide.md").as_deref(), Some("docs/guide.md"));
    }
}
