//! Deterministic cache keys for outbound requests

use url::form_urlencoded;

/// Build the cache key for a request
///
/// The key is `METHOD url-without-query?sorted-params`. Parameters already
/// present in the URL are percent-decoded and merged with those passed
/// separately, then sorted by name and value and re-encoded, so neither
/// parameter order, encoding, nor where a parameter was supplied changes the
/// key. The fragment is ignored.
pub fn request_signature(method: &str, url: &str, query: &[(String, String)]) -> String {
    let url = url.split('#').next().unwrap_or(url);
    let (path, embedded) = match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    };

    let mut params: Vec<(String, String)> = form_urlencoded::parse(embedded.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.extend(query.iter().cloned());
    params.sort_unstable();

    let method = method.to_ascii_uppercase();
    if params.is_empty() {
        return format!("{method} {path}");
    }

    let rendered = form_urlencoded::Serializer::new(String::new()).extend_pairs(&params).finish();
    format!("{method} {path}?{rendered}")
}
