//! RFC 3986 percent-encoding shared by query construction and OAuth canonicalization.

// crates.io
use url::form_urlencoded;

/// Percent-encodes `value` over its UTF-8 bytes.
///
/// Letters, digits, and `-_.~` pass through; every other byte becomes `%XX` with uppercase hex.
/// Empty input yields an empty string.
pub fn encode(value: &str) -> String {
	if value.is_empty() {
		return String::new();
	}

	urlencoding::encode(value).into_owned()
}

/// Form-encodes `pairs` as `application/x-www-form-urlencoded` (spaces become `+`).
pub fn form_encode<'a, I, K, V>(pairs: I) -> String
where
	I: IntoIterator<Item = (&'a K, &'a V)>,
	K: 'a + ?Sized + AsRef<str>,
	V: 'a + ?Sized + AsRef<str>,
{
	let mut serializer = form_urlencoded::Serializer::new(String::new());

	for (key, value) in pairs {
		serializer.append_pair(key.as_ref(), value.as_ref());
	}

	serializer.finish()
}

/// Joins cookie pairs as `name=value; name2=value2`, preserving order.
pub fn cookie_header(cookies: &[(String, String)]) -> String {
	cookies.iter().map(|(name, value)| format!("{name}={value}")).collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn encode_follows_rfc3986() {
		assert_eq!(encode(""), "");
		assert_eq!(encode("AZaz09-_.~"), "AZaz09-_.~");
		assert_eq!(encode("a b&c=d/é~"), "a%20b%26c%3Dd%2F%C3%A9~");
		assert_eq!(encode("+*"), "%2B%2A");
	}

	#[test]
	fn encode_leaves_no_e7_remap() {
		// `ç` is U+00E7 and must round through UTF-8, not collapse to `~`.
		assert_eq!(encode("ç"), "%C3%A7");
	}

	#[test]
	fn form_encode_uses_plus_for_spaces() {
		let pairs = [("q", "rust lang"), ("x", "1&2")];

		assert_eq!(form_encode(pairs.iter().map(|(k, v)| (*k, *v))), "q=rust+lang&x=1%262");
	}

	#[test]
	fn cookie_header_preserves_order() {
		let cookies = vec![("token".to_owned(), "12345".to_owned()), ("user".into(), "bob".into())];

		assert_eq!(cookie_header(&cookies), "token=12345; user=bob");
		assert_eq!(cookie_header(&[]), "");
	}
}
