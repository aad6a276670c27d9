//! Query-string encoding of selections: `samples=a,b&genes=c&mutations=d`

use std::collections::BTreeSet;

use super::IdSpace;

/// Encode every non-empty space as a comma-joined parameter
pub(crate) fn encode<'a, I>(spaces: I) -> String
where
    I: IntoIterator<Item = (IdSpace, &'a BTreeSet<String>)>,
{
    spaces
        .into_iter()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(space, ids)| {
            let joined: Vec<String> = ids.iter().map(|id| percent_encode(id)).collect();
            format!("{}={}", space.url_param(), joined.join(","))
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Ids of one space in a query string; an absent parameter is an empty set
pub(crate) fn decode(search: &str, space: IdSpace) -> BTreeSet<String> {
    let query = search.trim_start_matches('?');
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(name, _)| percent_decode(name) == space.url_param())
        .flat_map(|(_, value)| value.split(','))
        .map(percent_decode)
        .filter(|id| !id.is_empty())
        .collect()
}

fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b':' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn percent_decode(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => match (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                (Some(high), Some(low)) => {
                    out.push(high << 4 | low);
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_encode_skips_empty_spaces() {
        let samples = set(&["S1", "S2"]);
        let genes = BTreeSet::new();
        let mutations = set(&["TP53:p.R175H"]);
        let query = encode([
            (IdSpace::Sample, &samples),
            (IdSpace::Gene, &genes),
            (IdSpace::Mutation, &mutations),
        ]);
        assert_eq!(query, "samples=S1,S2&mutations=TP53:p.R175H");
    }

    #[test]
    fn test_decode() {
        let query = "?samples=S1,S2&mutations=m1";
        assert_eq!(decode(query, IdSpace::Sample), set(&["S1", "S2"]));
        assert_eq!(decode(query, IdSpace::Gene), BTreeSet::new());
        assert_eq!(decode(query, IdSpace::Mutation), set(&["m1"]));
    }

    #[test]
    fn test_special_characters_survive() {
        let samples = set(&["a,b", "c&d", "100%", "with space"]);
        let query = encode([(IdSpace::Sample, &samples)]);
        assert_eq!(decode(&query, IdSpace::Sample), samples);
    }

    #[test]
    fn test_malformed_escape_is_kept_literally() {
        assert_eq!(percent_decode("50%"), "50%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("a%2Cb"), "a,b");
    }
}
