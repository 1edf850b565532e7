//! Remote query construction and fingerprinting.
//!
//! A [`Query`] is a method name plus ordered parameters. Its fingerprint is
//! computed over the request URL without the API key, so changing the key
//! does not invalidate cached responses.

/// Last.fm API base URL, the method name is appended directly.
pub const LASTFM_API_BASE: &str = "http://ws.audioscrobbler.com/2.0/?method=";

/// 64-bit polynomial string hash (`h = 31 * h + byte`, wrapping).
pub fn fingerprint(text: &str) -> u64 {
    text.bytes()
        .fold(0u64, |hash, byte| hash.wrapping_mul(31).wrapping_add(u64::from(byte)))
}

/// One outbound API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    method: String,
    api_key: Option<String>,
    params: Vec<(String, String)>,
    cacheable: bool,
}

impl Query {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            api_key: None,
            params: Vec::new(),
            cacheable: true,
        }
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    /// Adds a cursor whose answer keeps changing over time.
    ///
    /// Responses to such queries are never cached.
    pub fn live_cursor(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.cacheable = false;
        self.param(name, value)
    }

    /// Marks the query as never cacheable.
    pub fn uncacheable(mut self) -> Self {
        self.cacheable = false;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    /// Full request URL including the API key.
    pub fn url(&self) -> String {
        let mut url = format!("{}{}", LASTFM_API_BASE, self.method);
        if let Some(key) = &self.api_key {
            url.push_str("&api_key=");
            url.push_str(&urlencoding::encode(key));
        }
        self.append_params(&mut url);
        url
    }

    /// Hash of the request URL with the API key left out.
    pub fn fingerprint(&self) -> u64 {
        let mut keyless = format!("{}{}", LASTFM_API_BASE, self.method);
        self.append_params(&mut keyless);
        fingerprint(&keyless)
    }

    fn append_params(&self, url: &mut String) {
        for (name, value) in &self.params {
            url.push('&');
            url.push_str(name);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_polynomial() {
        assert_eq!(fingerprint(""), 0);
        assert_eq!(fingerprint("a"), 97);
        assert_eq!(fingerprint("ab"), 97 * 31 + 98);
    }

    #[test]
    fn test_fingerprint_wraps_on_long_input() {
        let long = "x".repeat(10_000);
        assert_eq!(fingerprint(&long), fingerprint(&long));
        assert_ne!(fingerprint(&long), fingerprint(&"x".repeat(10_001)));
    }

    #[test]
    fn test_url_layout() {
        let query = Query::new("user.getTrackScrobbles")
            .api_key("k3y")
            .param("user", "someone")
            .param("artist", "AC/DC & Friends")
            .param("limit", 200);

        assert_eq!(
            query.url(),
            "http://ws.audioscrobbler.com/2.0/?method=user.getTrackScrobbles\
             &api_key=k3y&user=someone&artist=AC%2FDC%20%26%20Friends&limit=200"
        );
    }

    #[test]
    fn test_fingerprint_ignores_api_key() {
        let a = Query::new("m").api_key("one").param("page", 1);
        let b = Query::new("m").api_key("two").param("page", 1);
        let c = Query::new("m").api_key("one").param("page", 2);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_live_cursor_disables_caching() {
        assert!(Query::new("m").param("to", 5).is_cacheable());
        assert!(!Query::new("m").live_cursor("from", 5).is_cacheable());
        assert!(!Query::new("m").uncacheable().is_cacheable());
    }
}
