//! Signs tire-API requests (C2), ported from the upstream service's
//! `SignUtil.sign`: a plain MD5 hex digest over a deterministic
//! concatenation of headers, body, query params, and path segments.

use md5::{Digest, Md5};
use std::collections::BTreeMap;

/// `headers` and `params` are sorted by key before concatenation, so callers
/// can pass them in any order — a `BTreeMap` gives that for free. `params`
/// values are themselves sorted before joining. `paths`, if present, are
/// sorted and comma-joined as one segment. `sign_key` is appended last with
/// no trailing separator.
pub fn sign(
    headers: &BTreeMap<String, String>,
    body: Option<&str>,
    params: &BTreeMap<String, Vec<String>>,
    paths: &[String],
    sign_key: &str,
) -> String {
    let mut buf = String::new();

    for (key, value) in headers {
        buf.push_str(key);
        buf.push('=');
        buf.push_str(value);
        buf.push('&');
    }

    if let Some(body) = body {
        if !body.is_empty() {
            buf.push_str(body);
            buf.push('&');
        }
    }

    for (key, values) in params {
        let mut sorted = values.clone();
        sorted.sort();
        buf.push_str(key);
        buf.push('=');
        buf.push_str(&sorted.join(","));
        buf.push('&');
    }

    if !paths.is_empty() {
        let mut sorted = paths.to_vec();
        sorted.sort();
        buf.push_str(&sorted.join(","));
        buf.push('&');
    }

    buf.push_str(sign_key);

    let digest = Md5::new().chain_update(buf.as_bytes()).finalize();
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signer_is_invariant_under_header_key_permutation() {
        let mut a = BTreeMap::new();
        a.insert("clientId".to_owned(), "abc".to_owned());
        a.insert("timestamp".to_owned(), "1000".to_owned());

        let mut b = BTreeMap::new();
        b.insert("timestamp".to_owned(), "1000".to_owned());
        b.insert("clientId".to_owned(), "abc".to_owned());

        let params = BTreeMap::new();
        let paths: Vec<String> = Vec::new();

        assert_eq!(
            sign(&a, None, &params, &paths, "key"),
            sign(&b, None, &params, &paths, "key"),
        );
    }

    #[test]
    fn signer_is_invariant_under_param_value_permutation() {
        let headers = BTreeMap::new();
        let paths: Vec<String> = Vec::new();

        let mut p1 = BTreeMap::new();
        p1.insert("ids".to_owned(), vec!["b".to_owned(), "a".to_owned()]);

        let mut p2 = BTreeMap::new();
        p2.insert("ids".to_owned(), vec!["a".to_owned(), "b".to_owned()]);

        assert_eq!(
            sign(&headers, None, &p1, &paths, "key"),
            sign(&headers, None, &p2, &paths, "key"),
        );
    }

    #[test]
    fn signer_appends_sign_key_with_no_separator() {
        let headers = BTreeMap::new();
        let params = BTreeMap::new();
        let paths: Vec<String> = Vec::new();
        let digest = sign(&headers, None, &params, &paths, "secret");
        assert_eq!(digest.len(), 32);

        let expected = {
            let mut hasher = Md5::new();
            hasher.update(b"secret");
            hex::encode(hasher.finalize())
        };
        assert_eq!(digest, expected);
    }

    #[test]
    fn signer_skips_empty_body() {
        let headers = BTreeMap::new();
        let params = BTreeMap::new();
        let paths: Vec<String> = Vec::new();
        assert_eq!(
            sign(&headers, Some(""), &params, &paths, "k"),
            sign(&headers, None, &params, &paths, "k"),
        );
    }
}
