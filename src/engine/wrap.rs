use url::form_urlencoded;

pub const NURL: &str = "nurl";
pub const BURL: &str = "burl";

/// `https://<host>/<kind>?id=<global_id>&url=<escaped original>`.
pub fn wrap_callback(host: &str, kind: &str, global_id: &str, original: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(original.as_bytes()).collect();
    format!("https://{host}/{kind}?id={global_id}&url={encoded}")
}

/// Recovers the original URL from a wrapped one. Exists for symmetry and
/// tests; the live callback path gets the decoding from query parsing.
pub fn unwrap_callback(wrapped: &str) -> Option<String> {
    let query = wrapped.split_once('?')?.1;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
}
