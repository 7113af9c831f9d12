//! Request description: verb, target, headers, and the parameter variants each verb encodes.

// crates.io
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	call::CallOptions,
	encode::form_encode,
	error::{ConfigError, EncodingError},
	oauth::OAuthSigner,
};

/// `application/x-www-form-urlencoded`.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
/// `application/json`.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// HTTP verbs the executor knows how to encode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
	/// Parameters travel in the query string.
	Get,
	/// Parameters travel in the body.
	#[default]
	Post,
	/// Parameters travel in the body, JSON-encoded when structured.
	Put,
	/// POST body encoding with a `DELETE` method.
	Delete,
	/// No body is sent or read back.
	Head,
}
impl Verb {
	/// Returns the wire name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Verb::Get => "GET",
			Verb::Post => "POST",
			Verb::Put => "PUT",
			Verb::Delete => "DELETE",
			Verb::Head => "HEAD",
		}
	}

	/// Whether the verb changes server state and must bypass cached reads.
	pub const fn is_mutating(self) -> bool {
		matches!(self, Verb::Post | Verb::Put | Verb::Delete)
	}
}
impl Display for Verb {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Verb {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_uppercase().as_str() {
			"GET" => Ok(Verb::Get),
			"POST" => Ok(Verb::Post),
			"PUT" => Ok(Verb::Put),
			"DELETE" => Ok(Verb::Delete),
			"HEAD" => Ok(Verb::Head),
			_ => Err(ConfigError::UnsupportedVerb { verb: s.to_owned() }),
		}
	}
}

/// Encoded request body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Body {
	/// Body text.
	pub text: String,
	/// Content type implied by the encoding, if any.
	pub content_type: Option<&'static str>,
}

/// Request parameters: a flat map, a pre-encoded string, or a JSON blob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestParams {
	/// Key/value pairs, form-encoded or JSON-encoded depending on the verb.
	Structured(BTreeMap<String, String>),
	/// Pre-encoded query string or body, passed through verbatim.
	Raw(String),
	/// Arbitrary JSON document.
	Json(JsonValue),
}
impl RequestParams {
	/// Builds structured parameters from pairs.
	pub fn structured<I, K, V>(pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self::Structured(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}

	/// Wraps a pre-encoded string.
	pub fn raw(value: impl Into<String>) -> Self {
		Self::Raw(value.into())
	}

	/// Wraps a JSON document.
	pub fn json(value: JsonValue) -> Self {
		Self::Json(value)
	}

	/// Whether there is nothing to send.
	pub fn is_empty(&self) -> bool {
		match self {
			Self::Structured(map) => map.is_empty(),
			Self::Raw(raw) => raw.is_empty(),
			Self::Json(value) => value.is_null(),
		}
	}

	/// JSON view used for cache keys and echoing.
	pub fn to_json(&self) -> JsonValue {
		match self {
			Self::Structured(map) => JsonValue::Object(
				map.iter().map(|(k, v)| (k.clone(), JsonValue::from(v.as_str()))).collect(),
			),
			Self::Raw(raw) => JsonValue::from(raw.as_str()),
			Self::Json(value) => value.clone(),
		}
	}

	/// Flattened name/value pairs, best effort.
	///
	/// Raw strings are parsed as form data; JSON objects contribute their scalar members.
	pub fn pairs(&self) -> Vec<(String, String)> {
		match self {
			Self::Structured(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
			Self::Raw(raw) => form_urlencoded::parse(raw.as_bytes()).into_owned().collect(),
			Self::Json(JsonValue::Object(object)) => object
				.iter()
				.filter_map(|(k, v)| scalar_text(v).map(|text| (k.clone(), text)))
				.collect(),
			Self::Json(_) => Vec::new(),
		}
	}

	/// Converts to a JSON text blob; raw strings are assumed to already be JSON.
	pub fn into_json_text(self) -> Self {
		match self {
			Self::Raw(raw) => Self::Raw(raw),
			Self::Json(JsonValue::String(text)) => Self::Raw(text),
			other => Self::Raw(other.to_json().to_string()),
		}
	}

	/// Query string for GET, or `None` when there is nothing to append.
	pub fn query_string(&self) -> Result<Option<String>, EncodingError> {
		let query = match self {
			Self::Structured(map) => form_encode(map.iter()),
			Self::Raw(raw) => raw.clone(),
			Self::Json(JsonValue::Null) => String::new(),
			Self::Json(JsonValue::String(text)) => text.clone(),
			Self::Json(JsonValue::Object(object)) => {
				let mut pairs = Vec::with_capacity(object.len());

				for (name, value) in object {
					let text = scalar_text(value).ok_or_else(|| EncodingError::Unencodable {
						verb: Verb::Get.as_str(),
						reason: format!("member `{name}` is not a scalar"),
					})?;

					pairs.push((name.clone(), text));
				}

				form_encode(pairs.iter().map(|(name, value)| (name, value)))
			},
			Self::Json(_) =>
				return Err(EncodingError::Unencodable {
					verb: Verb::Get.as_str(),
					reason: "expected an object of scalars".into(),
				}),
		};

		Ok((!query.is_empty()).then_some(query))
	}

	/// Body for POST and DELETE.
	pub fn form_body(&self) -> Option<Body> {
		if self.is_empty() {
			return None;
		}

		let body = match self {
			Self::Structured(map) =>
				Body { text: form_encode(map.iter()), content_type: Some(FORM_CONTENT_TYPE) },
			Self::Raw(raw) => Body { text: raw.clone(), content_type: Some(FORM_CONTENT_TYPE) },
			Self::Json(value) =>
				Body { text: value.to_string(), content_type: Some(JSON_CONTENT_TYPE) },
		};

		Some(body)
	}

	/// Body for PUT: structured maps become JSON objects, everything else passes through.
	pub fn put_body(&self) -> Option<Body> {
		if self.is_empty() {
			return None;
		}

		let body = match self {
			Self::Raw(raw) => Body { text: raw.clone(), content_type: None },
			other => Body { text: other.to_json().to_string(), content_type: Some(JSON_CONTENT_TYPE) },
		};

		Some(body)
	}
}
impl Default for RequestParams {
	fn default() -> Self {
		Self::Structured(BTreeMap::new())
	}
}
impl From<BTreeMap<String, String>> for RequestParams {
	fn from(map: BTreeMap<String, String>) -> Self {
		Self::Structured(map)
	}
}
impl From<JsonValue> for RequestParams {
	fn from(value: JsonValue) -> Self {
		Self::Json(value)
	}
}

/// Everything needed to issue one call.
#[derive(Clone, Debug)]
pub struct RequestSpec {
	/// HTTP verb.
	pub verb: Verb,
	/// Absolute target URL as declared by the caller.
	pub url: Url,
	/// Request headers.
	pub headers: BTreeMap<String, String>,
	/// Request parameters.
	pub params: RequestParams,
	/// Optional behaviors.
	pub options: CallOptions,
	/// Signs each attempt with an OAuth 1.0a `Authorization` header when set.
	pub oauth: Option<OAuthSigner>,
}
impl RequestSpec {
	/// Creates a spec for `verb` against an absolute `url`.
	pub fn new(verb: Verb, url: &str) -> Result<Self> {
		let url = Url::parse(url)
			.map_err(|source| ConfigError::InvalidUrl { url: url.to_owned(), source })?;

		Ok(Self {
			verb,
			url,
			headers: BTreeMap::new(),
			params: RequestParams::default(),
			options: CallOptions::default(),
			oauth: None,
		})
	}

	/// Assembles a spec from loosely typed call inputs.
	pub fn from_parts(
		headers: impl IntoIterator<Item = (String, String)>,
		params: RequestParams,
		url: &str,
		verb: &str,
		options: CallOptions,
	) -> Result<Self> {
		let verb = verb.parse::<Verb>()?;

		Ok(Self::new(verb, url)?.with_headers(headers).with_params(params).with_options(options))
	}

	/// Adds or replaces one header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Adds or replaces several headers.
	pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
		self.headers.extend(headers);

		self
	}

	/// Sets the request parameters.
	pub fn with_params(mut self, params: impl Into<RequestParams>) -> Self {
		self.params = params.into();

		self
	}

	/// Sets the call options.
	pub fn with_options(mut self, options: CallOptions) -> Self {
		self.options = options;

		self
	}

	/// Signs every attempt with `signer`.
	pub fn with_oauth(mut self, signer: OAuthSigner) -> Self {
		self.oauth = Some(signer);

		self
	}
}

fn scalar_text(value: &JsonValue) -> Option<String> {
	match value {
		JsonValue::Null => Some(String::new()),
		JsonValue::Bool(flag) => Some(flag.to_string()),
		JsonValue::Number(number) => Some(number.to_string()),
		JsonValue::String(text) => Some(text.clone()),
		JsonValue::Array(_) | JsonValue::Object(_) => None,
	}
}
