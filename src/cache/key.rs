//! Cache key generation using SHA-256 hashes

use reqwest::{Method, Url};
use sha2::{Digest, Sha256};

/// Generate a deterministic cache key for a request.
///
/// The key is a SHA-256 hash of the method and the URL without its fragment,
/// with query parameters sorted so `?a=1&b=2` and `?b=2&a=1` share an entry.
pub fn cache_key(method: &Method, url: &Url) -> String {
    let mut hasher = Sha256::new();

    hasher.update(method.as_str().as_bytes());
    hasher.update(b"|");

    let mut base = url.clone();
    base.set_fragment(None);
    base.set_query(None);
    hasher.update(base.as_str().as_bytes());
    hasher.update(b"|");

    let mut sorted_params: Vec<_> = url.query_pairs().collect();
    sorted_params.sort();

    for (k, v) in sorted_params {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"&");
    }

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_cache_key_deterministic() {
        let key1 = cache_key(
            &Method::GET,
            &url("http://localhost:3000/api/courses?limit=10&page=1"),
        );
        let key2 = cache_key(
            &Method::GET,
            &url("http://localhost:3000/api/courses?page=1&limit=10"),
        );

        // Same inputs in different order should produce same key
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_cache_key_different_paths() {
        let key1 = cache_key(&Method::GET, &url("http://localhost:3000/app"));
        let key2 = cache_key(&Method::GET, &url("http://localhost:3000/course/1"));

        assert_ne!(key1, key2);
    }

    #[test]
    fn test_cache_key_different_methods() {
        let key1 = cache_key(&Method::GET, &url("http://localhost:3000/app"));
        let key2 = cache_key(&Method::HEAD, &url("http://localhost:3000/app"));

        assert_ne!(key1, key2);
    }

    #[test]
    fn test_cache_key_ignores_fragment() {
        let key1 = cache_key(&Method::GET, &url("http://localhost:3000/app#lesson-2"));
        let key2 = cache_key(&Method::GET, &url("http://localhost:3000/app"));

        assert_eq!(key1, key2);
    }
}
