//! Magnet descriptor parsing

use super::{SessionError, SessionKey};

/// Characters replaced in display names before they reach headers or logs.
const UNSAFE_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '[', ']', '(', ')'];

/// Caller-supplied content descriptor with its fingerprint already extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    uri: String,
    key: SessionKey,
    display_name: Option<String>,
}

impl Descriptor {
    /// Parses a magnet URI.
    ///
    /// # Errors
    /// - `SessionError::InvalidDescriptor` - Not a magnet URI or no usable `xt=urn:btih:` hash
    pub fn parse(uri: &str) -> Result<Self, SessionError> {
        let uri = uri.trim();
        let magnet = magnet_url::Magnet::new(uri).map_err(|e| SessionError::InvalidDescriptor {
            reason: format!("Invalid magnet link: {e}"),
        })?;

        let key = Self::extract_key(uri)?;
        let display_name = magnet
            .display_name()
            .map(|name| urlencoding::decode(name).map_or_else(|_| name.to_string(), |n| n.into_owned()))
            .map(|name| sanitize_name(&name))
            .filter(|name| !name.is_empty());

        Ok(Self {
            uri: uri.to_string(),
            key,
            display_name,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    fn extract_key(uri: &str) -> Result<SessionKey, SessionError> {
        let query = uri.split_once('?').map(|(_, q)| q).unwrap_or_default();

        let hash = query
            .split('&')
            .find_map(|param| param.strip_prefix("xt=urn:btih:"))
            .ok_or_else(|| SessionError::InvalidDescriptor {
                reason: format!("Missing info hash in magnet link: {uri}"),
            })?;

        if hash.len() != 40 {
            return Err(SessionError::InvalidDescriptor {
                reason: format!("Invalid hash length: {} (expected 40)", hash.len()),
            });
        }

        SessionKey::from_hex(hash).map_err(|_| SessionError::InvalidDescriptor {
            reason: format!("Invalid hex character in hash: {hash}"),
        })
    }
}

/// Replaces characters that are unsafe in file names and headers with `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if UNSAFE_NAME_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_magnet_with_display_name() {
        let descriptor = Descriptor::parse(
            "magnet:?xt=urn:btih:0123456789ABCDEF0123456789abcdef01234567&dn=Big%20Movie%20(2020)&tr=http://tracker.example.com/announce",
        )
        .unwrap();

        assert_eq!(
            descriptor.key().as_str(),
            "0123456789abcdef0123456789abcdef01234567"
        );
        assert_eq!(descriptor.display_name(), Some("Big Movie _2020_"));
    }

    #[test]
    fn test_parse_magnet_without_display_name() {
        let descriptor =
            Descriptor::parse("magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567")
                .unwrap();
        assert!(descriptor.display_name().is_none());
    }

    #[test]
    fn test_parse_rejects_bad_descriptors() {
        assert!(Descriptor::parse("").is_err());
        assert!(Descriptor::parse("http://example.com/file.mkv").is_err());
        assert!(Descriptor::parse("magnet:?dn=Test&tr=http://tracker.example.com").is_err());
        assert!(Descriptor::parse("magnet:?xt=urn:btih:tooshort&dn=Test").is_err());
        assert!(
            Descriptor::parse("magnet:?xt=urn:btih:zz23456789abcdef0123456789abcdef01234567")
                .is_err()
        );
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name(r#"a<b>c:d"e/f\g|h?i*j[k]l"#), "a_b_c_d_e_f_g_h_i_j_k_l");
        assert_eq!(sanitize_name("plain name.mkv"), "plain name.mkv");
    }
}
