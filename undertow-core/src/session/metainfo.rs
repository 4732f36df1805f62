//! Metainfo (`.torrent`) decoding into magnet descriptors

use std::time::Duration;

use sha1::{Digest, Sha1};

use super::SessionKey;

type BencodeDict<'a> = std::collections::HashMap<&'a [u8], bencode_rs::Value<'a>>;

/// Errors from decoding or fetching a metainfo file.
#[derive(Debug, thiserror::Error)]
pub enum MetainfoError {
    #[error("Failed to parse torrent file: {reason}")]
    Invalid { reason: String },

    #[error("Failed to fetch URL {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to fetch .torrent file from URL {url}: status {status}")]
    UpstreamStatus { url: String, status: u16 },
}

fn invalid(reason: impl Into<String>) -> MetainfoError {
    MetainfoError::Invalid {
        reason: reason.into(),
    }
}

/// The parts of a metainfo file a magnet link carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metainfo {
    key: SessionKey,
    name: String,
    trackers: Vec<String>,
}

impl Metainfo {
    /// Decodes a bencoded metainfo file.
    ///
    /// The key is the SHA-1 of the raw `info` dictionary bytes exactly as
    /// they appear in the input.
    ///
    /// # Errors
    /// - `MetainfoError::Invalid` - Not bencode, no `info` dictionary, or
    ///   the info dictionary lacks `name` and one of `length` or `files`
    pub fn parse(bytes: &[u8]) -> Result<Self, MetainfoError> {
        let parsed = bencode_rs::Value::parse(bytes)
            .map_err(|e| invalid(format!("Bencode parsing failed: {e:?}")))?;

        let Some(bencode_rs::Value::Dictionary(root)) = parsed.first() else {
            return Err(invalid("Root element must be dictionary"));
        };
        let Some(bencode_rs::Value::Dictionary(info)) = root.get(b"info".as_slice()) else {
            return Err(invalid("Missing or invalid 'info' field"));
        };

        let name = match info.get(b"name".as_slice()) {
            Some(bencode_rs::Value::Bytes(name)) => String::from_utf8_lossy(name).into_owned(),
            _ => return Err(invalid("Missing or invalid 'name' field")),
        };
        let single_file = matches!(
            info.get(b"length".as_slice()),
            Some(bencode_rs::Value::Integer(_))
        );
        let multi_file = matches!(
            info.get(b"files".as_slice()),
            Some(bencode_rs::Value::List(_))
        );
        if !single_file && !multi_file {
            return Err(invalid("Missing 'files' or 'length' field"));
        }

        let info_bytes = info_span(bytes)?;
        let key = SessionKey::from_bytes(&Sha1::digest(info_bytes));

        Ok(Self {
            key,
            name,
            trackers: announce_urls(root),
        })
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trackers(&self) -> &[String] {
        &self.trackers
    }

    /// Magnet URI with the fingerprint, display name and every tracker.
    pub fn magnet_link(&self) -> String {
        let mut link = format!("magnet:?xt=urn:btih:{}", self.key);
        if !self.name.is_empty() {
            link.push_str("&dn=");
            link.push_str(&urlencoding::encode(&self.name));
        }
        for tracker in &self.trackers {
            link.push_str("&tr=");
            link.push_str(&urlencoding::encode(tracker));
        }
        link
    }
}

/// Downloads a metainfo file over HTTP.
///
/// # Errors
/// - `MetainfoError::Fetch` - Request or body read failed
/// - `MetainfoError::UpstreamStatus` - Server answered with anything but 200
pub async fn fetch_metainfo(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, MetainfoError> {
    tracing::info!("Attempting to fetch URL: {}", url);
    let fetch_error = |e: reqwest::Error| MetainfoError::Fetch {
        url: url.to_string(),
        reason: e.to_string(),
    };

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(fetch_error)?;

    let status = response.status();
    tracing::debug!("Fetched URL {}, status: {}", url, status);
    if status != reqwest::StatusCode::OK {
        return Err(MetainfoError::UpstreamStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    Ok(response.bytes().await.map_err(fetch_error)?.to_vec())
}

/// Announce URL followed by every tier of the announce list, without repeats.
fn announce_urls(root: &BencodeDict<'_>) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let mut push = |bytes: &[u8]| {
        if let Ok(url) = std::str::from_utf8(bytes)
            && !url.is_empty()
            && !urls.iter().any(|known| known == url)
        {
            urls.push(url.to_string());
        }
    };

    if let Some(bencode_rs::Value::Bytes(announce)) = root.get(b"announce".as_slice()) {
        push(*announce);
    }
    if let Some(bencode_rs::Value::List(tiers)) = root.get(b"announce-list".as_slice()) {
        for tier in tiers {
            if let bencode_rs::Value::List(tier_urls) = tier {
                for url in tier_urls {
                    if let bencode_rs::Value::Bytes(url) = url {
                        push(*url);
                    }
                }
            }
        }
    }

    urls
}

/// Raw bytes of the top-level `info` value.
///
/// Walks the root dictionary key by key so an `info` string nested in some
/// other value is never mistaken for the real one.
fn info_span(data: &[u8]) -> Result<&[u8], MetainfoError> {
    if data.first() != Some(&b'd') {
        return Err(invalid("Expected dictionary start"));
    }

    let mut pos = 1;
    while data.get(pos).is_some_and(|&byte| byte != b'e') {
        let (key, value_start) = string_at(data, pos)?;
        let value_end = element_end(data, value_start)?;
        if key == b"info" {
            return Ok(&data[value_start..value_end]);
        }
        pos = value_end;
    }

    Err(invalid("Could not find info dictionary in data"))
}

/// Position just past the bencode element starting at `start`.
fn element_end(data: &[u8], start: usize) -> Result<usize, MetainfoError> {
    let mut pos = start;
    let mut depth = 0usize;

    loop {
        match data.get(pos) {
            Some(b'd' | b'l') => {
                depth += 1;
                pos += 1;
            }
            Some(b'e') if depth > 0 => {
                depth -= 1;
                pos += 1;
            }
            Some(b'i') => {
                let length = data[pos..]
                    .iter()
                    .position(|&byte| byte == b'e')
                    .ok_or_else(|| invalid("Unterminated integer"))?;
                pos += length + 1;
            }
            Some(b'0'..=b'9') => {
                let (_, end) = string_at(data, pos)?;
                pos = end;
            }
            Some(_) => return Err(invalid("Invalid bencode character")),
            None => return Err(invalid("Incomplete bencode element")),
        }

        if depth == 0 {
            return Ok(pos);
        }
    }
}

/// Contents of the length-prefixed string at `pos` and the position after it.
fn string_at(data: &[u8], pos: usize) -> Result<(&[u8], usize), MetainfoError> {
    let rest = data.get(pos..).unwrap_or_default();
    let colon = rest
        .iter()
        .position(|&byte| byte == b':')
        .ok_or_else(|| invalid("Invalid string format"))?;
    let length: usize = std::str::from_utf8(&rest[..colon])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| invalid("Invalid string length"))?;

    let start = pos + colon + 1;
    let end = start
        .checked_add(length)
        .ok_or_else(|| invalid("Invalid string length"))?;
    let contents = data
        .get(start..end)
        .ok_or_else(|| invalid("String runs past end of data"))?;
    Ok((contents, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "d6:lengthi1048576e4:name9:test.file12:piece lengthi32768e6:pieces20:aaaaaaaaaaaaaaaaaaaae";

    fn torrent(prefix: &str) -> Vec<u8> {
        format!("d{prefix}4:info{INFO}e").into_bytes()
    }

    fn expected_key() -> SessionKey {
        SessionKey::from_bytes(&Sha1::digest(INFO.as_bytes()))
    }

    #[test]
    fn test_key_is_hash_of_raw_info_dictionary() {
        let metainfo = Metainfo::parse(&torrent("8:announce15:http://t.io/ann")).unwrap();

        assert_eq!(metainfo.key(), &expected_key());
        assert_eq!(metainfo.name(), "test.file");
        assert_eq!(metainfo.trackers(), ["http://t.io/ann"]);
    }

    #[test]
    fn test_info_inside_other_value_is_skipped() {
        let metainfo = Metainfo::parse(&torrent("8:announce16:http://x/4:infod")).unwrap();

        assert_eq!(metainfo.key(), &expected_key());
    }

    #[test]
    fn test_magnet_link_carries_name_and_trackers() {
        let prefix = "8:announce12:udp://a:1/an13:announce-listll12:udp://a:1/an12:udp://b:2/anee";
        let metainfo = Metainfo::parse(&torrent(prefix)).unwrap();

        assert_eq!(
            metainfo.magnet_link(),
            format!(
                "magnet:?xt=urn:btih:{}&dn=test.file&tr=udp%3A%2F%2Fa%3A1%2Fan&tr=udp%3A%2F%2Fb%3A2%2Fan",
                expected_key()
            )
        );
        let descriptor = crate::session::Descriptor::parse(&metainfo.magnet_link()).unwrap();
        assert_eq!(descriptor.key(), metainfo.key());
    }

    #[test]
    fn test_multi_file_info_is_accepted() {
        let info = "d5:filesld6:lengthi3e4:pathl1:aeee4:name3:dir12:piece lengthi16e6:pieces20:bbbbbbbbbbbbbbbbbbbbe";
        let data = format!("d4:info{info}e");

        let metainfo = Metainfo::parse(data.as_bytes()).unwrap();

        assert_eq!(metainfo.name(), "dir");
        assert!(metainfo.trackers().is_empty());
        assert!(!metainfo.magnet_link().contains("&tr="));
    }

    #[test]
    fn test_malformed_input_is_rejected() {
        let cases: [&[u8]; 5] = [
            b"",
            b"not bencode at all",
            b"li42ee",
            b"d8:announce9:test.com:e",
            b"d4:infod4:name1:xee",
        ];

        for data in cases {
            let result = Metainfo::parse(data);
            assert!(
                matches!(result, Err(MetainfoError::Invalid { .. })),
                "{:?}",
                String::from_utf8_lossy(data)
            );
        }
    }

    #[test]
    fn test_element_end_spans() {
        assert_eq!(element_end(b"d3:keyi42ee", 0).unwrap(), 11);
        assert_eq!(element_end(b"d4:listl4:testi42eee", 0).unwrap(), 20);
        assert_eq!(element_end(b"i-7e", 0).unwrap(), 4);
        assert!(element_end(b"d3:key", 0).is_err());
        assert!(element_end(b"d3:key999:", 0).is_err());
    }
}
