//! Per-call options, deserializable from the loosely typed options mapping.

// crates.io
use serde::{Deserializer, Serializer, de, ser::SerializeSeq};
// self
use crate::{
	_prelude::*,
	auth::{AuthScheme, Credentials, Secret},
	error::{ConfigError, EncodingError},
};

/// How response bodies are interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
	/// Parse as JSON, falling back to text when the body is not valid JSON.
	#[default]
	Json,
	/// Keep the raw text.
	Text,
}

/// Optional behaviors for one call.
///
/// Keys follow the option names callers already use: `username`, `password`, `dataType`,
/// `cache`, `jsonPOST`, `cookies`, `authAny`, `secureSSL`, and `returnRequestParams`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CallOptions {
	/// Account name for Basic/NTLM negotiation.
	pub username: Option<String>,
	/// Account password; required whenever `username` is set.
	#[serde(skip_serializing)]
	pub password: Option<Secret>,
	/// Response interpretation.
	pub data_type: DataType,
	/// Cache TTL in seconds; `None` or `0` disables caching.
	pub cache: Option<u64>,
	/// Send parameters as a JSON body with explicit JSON headers.
	#[serde(rename = "jsonPOST")]
	pub json_post: bool,
	/// Cookies sent as a single `Cookie` header, in order.
	#[serde(serialize_with = "serialize_cookies", deserialize_with = "deserialize_cookies")]
	pub cookies: Vec<(String, String)>,
	/// Start negotiation in permissive "any scheme" mode instead of Basic.
	pub auth_any: bool,
	/// Verify TLS peers and host names.
	#[serde(rename = "secureSSL")]
	pub secure_ssl: bool,
	/// Echo the effective request parameters in the result.
	pub return_request_params: bool,
}
impl CallOptions {
	/// Parses the options mapping, reporting the path of the first malformed option.
	pub fn from_json(value: JsonValue) -> Result<Self, EncodingError> {
		Ok(serde_path_to_error::deserialize(value)?)
	}

	/// Parses the options mapping from JSON text.
	pub fn from_json_str(raw: &str) -> Result<Self, EncodingError> {
		let mut deserializer = serde_json::Deserializer::from_str(raw);

		Ok(serde_path_to_error::deserialize(&mut deserializer)?)
	}

	/// Sets login credentials.
	pub fn with_credentials(
		mut self,
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		self.username = Some(username.into());
		self.password = Some(Secret::new(password));

		self
	}

	/// Sets the response interpretation.
	pub fn with_data_type(mut self, data_type: DataType) -> Self {
		self.data_type = data_type;

		self
	}

	/// Enables caching with a TTL in seconds; `0` disables it.
	pub fn with_cache(mut self, ttl_secs: u64) -> Self {
		self.cache = Some(ttl_secs);

		self
	}

	/// Toggles JSON-body mode.
	pub fn with_json_body(mut self, enabled: bool) -> Self {
		self.json_post = enabled;

		self
	}

	/// Appends one cookie.
	pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.cookies.push((name.into(), value.into()));

		self
	}

	/// Toggles permissive "any scheme" negotiation.
	pub fn with_auth_any(mut self, enabled: bool) -> Self {
		self.auth_any = enabled;

		self
	}

	/// Toggles TLS peer and host verification.
	pub fn with_secure_ssl(mut self, enabled: bool) -> Self {
		self.secure_ssl = enabled;

		self
	}

	/// Toggles echoing of the request parameters.
	pub fn with_request_params_echo(mut self, enabled: bool) -> Self {
		self.return_request_params = enabled;

		self
	}

	/// Effective cache TTL; zero means disabled.
	pub fn cache_ttl(&self) -> Option<u64> {
		self.cache.filter(|ttl| *ttl > 0)
	}

	/// Scheme the negotiator starts from.
	pub fn auth_scheme(&self) -> AuthScheme {
		if self.auth_any { AuthScheme::Any } else { AuthScheme::Basic }
	}

	/// Credentials, if a username was supplied.
	pub fn credentials(&self) -> Result<Option<Credentials>, ConfigError> {
		let Some(username) = self.username.as_deref().filter(|name| !name.is_empty()) else {
			return Ok(None);
		};
		let password = self.password.as_ref().ok_or(ConfigError::MissingPassword)?;

		Ok(Some(Credentials { username: username.to_owned(), password: password.clone() }))
	}
}
impl Default for CallOptions {
	fn default() -> Self {
		Self {
			username: None,
			password: None,
			data_type: DataType::default(),
			cache: None,
			json_post: false,
			cookies: Vec::new(),
			auth_any: false,
			secure_ssl: true,
			return_request_params: true,
		}
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CookieInput {
	List(Vec<String>),
	Map(serde_json::Map<String, JsonValue>),
}

fn deserialize_cookies<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
	D: Deserializer<'de>,
{
	match CookieInput::deserialize(deserializer)? {
		CookieInput::List(items) => items
			.into_iter()
			.map(|item| match item.split_once('=') {
				Some((name, value)) => Ok((name.trim().to_owned(), value.trim().to_owned())),
				None => Err(<D::Error as de::Error>::custom(format!(
					"cookie `{item}` is not `name=value`"
				))),
			})
			.collect(),
		CookieInput::Map(map) => map
			.into_iter()
			.map(|(name, value)| match value {
				JsonValue::String(text) => Ok((name, text)),
				JsonValue::Number(number) => Ok((name, number.to_string())),
				JsonValue::Bool(flag) => Ok((name, flag.to_string())),
				_ =>
					Err(<D::Error as de::Error>::custom(format!("cookie `{name}` must be a scalar"))),
			})
			.collect(),
	}
}

fn serialize_cookies<S>(cookies: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	let mut seq = serializer.serialize_seq(Some(cookies.len()))?;

	for (name, value) in cookies {
		seq.serialize_element(&format!("{name}={value}"))?;
	}

	seq.end()
}
