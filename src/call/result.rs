//! Call records returned by the executor.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::AuthScheme,
	call::{DataType, RequestParams},
	error::{AuthError, EncodingError, TransportError},
};

/// Response body: parsed JSON, or the raw text when parsing was skipped or failed.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
	/// Parsed JSON document.
	Json(JsonValue),
	/// Raw response text.
	Text(String),
}
impl Payload {
	/// Interprets a response body.
	///
	/// Empty bodies and a literal `null` stay text so callers always see what was sent.
	pub fn parse(body: &[u8], data_type: DataType) -> Self {
		let parsed = match data_type {
			DataType::Json =>
				serde_json::from_slice::<JsonValue>(body).ok().filter(|value| !value.is_null()),
			DataType::Text => None,
		};

		match parsed {
			Some(value) => Self::Json(value),
			None => Self::Text(String::from_utf8_lossy(body).into_owned()),
		}
	}

	/// Text written to the cache, or `None` when there is nothing worth storing.
	pub fn to_cache_body(&self) -> Option<String> {
		match self {
			Self::Json(JsonValue::Null) => None,
			Self::Json(value) => Some(value.to_string()),
			Self::Text(text) if text.is_empty() => None,
			Self::Text(text) => Some(text.clone()),
		}
	}

	/// Restores a payload from its cached text under the caller's `data_type`.
	pub fn from_cache_body(body: &str, data_type: DataType) -> Self {
		Self::parse(body.as_bytes(), data_type)
	}

	/// JSON view, if the payload parsed.
	pub fn as_json(&self) -> Option<&JsonValue> {
		match self {
			Self::Json(value) => Some(value),
			Self::Text(_) => None,
		}
	}

	/// Text view, if the payload stayed raw.
	pub fn as_text(&self) -> Option<&str> {
		match self {
			Self::Json(_) => None,
			Self::Text(text) => Some(text),
		}
	}
}
impl Default for Payload {
	fn default() -> Self {
		Self::Text(String::new())
	}
}

/// Transport metadata for one call.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CallInfo {
	/// HTTP status; `0` when the transport failed, `200` on a cache hit.
	pub status: u16,
	/// Effective URL after query encoding and redirects.
	pub url: String,
	/// Transport error text, when the call never produced a status.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Wall-clock seconds spent across every attempt.
	pub total_time: f64,
	/// Response `Content-Type`, when the server sent one.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content_type: Option<String>,
	/// Whether the result came from the cache.
	pub from_cache: bool,
	/// Authentication schemes sent, in order; empty without credentials.
	pub auth_attempts: Vec<AuthScheme>,
}

/// Outcome of [`CallExecutor::execute`](crate::call::CallExecutor::execute).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
	/// Response body.
	pub result: Payload,
	/// Effective request parameters, or empty when echoing is disabled.
	pub request_parameters: RequestParams,
	/// Transport metadata.
	pub info: CallInfo,
	/// Response headers, lower-cased names.
	pub header: BTreeMap<String, String>,
}
impl CallResult {
	/// HTTP status.
	pub fn status(&self) -> u16 {
		self.info.status
	}

	/// Whether the status is in the 2xx range.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.info.status)
	}

	/// Whether the result was served from the cache.
	pub fn from_cache(&self) -> bool {
		self.info.from_cache
	}

	/// Decodes the JSON payload into `T`.
	pub fn deserialize<T>(&self) -> Result<T, EncodingError>
	where
		T: DeserializeOwned,
	{
		let value = match &self.result {
			Payload::Json(value) => value.clone(),
			Payload::Text(text) => JsonValue::String(text.clone()),
		};

		serde_path_to_error::deserialize(value).map_err(|e| EncodingError::Response {
			path: e.path().to_string(),
			source: e.into_inner(),
		})
	}

	/// Turns recorded transport failures and exhausted negotiation into errors.
	pub fn error_for_failure(self) -> Result<Self> {
		if let Some(message) = &self.info.error {
			return Err(TransportError::Reported { message: message.clone() }.into());
		}
		if self.info.status == 401 && !self.info.auth_attempts.is_empty() {
			return Err(AuthError::Exhausted {
				url: self.info.url.clone(),
				attempted: self.info.auth_attempts.clone(),
			}
			.into());
		}

		Ok(self)
	}
}

/// Renders an error with its source chain, `outer: inner: root`.
pub(crate) fn error_chain(error: &dyn StdError) -> String {
	let mut rendered = error.to_string();
	let mut source = error.source();

	while let Some(cause) = source {
		rendered.push_str(": ");
		rendered.push_str(&cause.to_string());

		source = cause.source();
	}

	rendered
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::error::Error;

	fn record(status: u16) -> CallResult {
		CallResult {
			result: Payload::default(),
			request_parameters: RequestParams::default(),
			info: CallInfo { status, url: "https://api.test/".into(), ..Default::default() },
			header: BTreeMap::new(),
		}
	}

	#[test]
	fn malformed_json_falls_back_to_text() {
		assert_eq!(Payload::parse(b"{\"a\":1}", DataType::Json), Payload::Json(json!({ "a": 1 })));
		assert_eq!(Payload::parse(b"{oops", DataType::Json), Payload::Text("{oops".into()));
		assert_eq!(Payload::parse(b"null", DataType::Json), Payload::Text("null".into()));
		assert_eq!(Payload::parse(b"", DataType::Json), Payload::Text(String::new()));
		assert_eq!(Payload::parse(b"{\"a\":1}", DataType::Text), Payload::Text("{\"a\":1}".into()));
	}

	#[test]
	fn cache_bodies_skip_empty_payloads() {
		assert_eq!(Payload::Json(JsonValue::Null).to_cache_body(), None);
		assert_eq!(Payload::Text(String::new()).to_cache_body(), None);

		let payload = Payload::Json(json!({ "items": [1, 2] }));
		let body = payload.to_cache_body().expect("Payload should be cacheable.");

		assert_eq!(Payload::from_cache_body(&body, DataType::Json), payload);
		assert_eq!(Payload::from_cache_body("plain", DataType::Json), Payload::Text("plain".into()));
		assert_eq!(Payload::from_cache_body(&body, DataType::Text), Payload::Text(body.clone()));
	}

	#[test]
	fn serializes_with_legacy_field_names() {
		let rendered = serde_json::to_value(record(200)).expect("Record should serialize.");

		assert!(rendered.get("requestParameters").is_some());
		assert_eq!(rendered["info"]["status"], json!(200));
		assert!(rendered["info"].get("error").is_none());
	}

	#[test]
	fn failures_surface_as_errors_on_request() {
		let mut failed = record(0);

		failed.info.error = Some("connection refused".into());

		assert!(matches!(
			failed.error_for_failure(),
			Err(Error::Transport(TransportError::Reported { .. }))
		));

		let mut rejected = record(401);

		rejected.info.auth_attempts = vec![AuthScheme::Basic, AuthScheme::Ntlm];

		assert!(matches!(
			rejected.error_for_failure(),
			Err(Error::Auth(AuthError::Exhausted { .. }))
		));
		assert!(record(401).error_for_failure().is_ok());
		assert!(record(500).error_for_failure().is_ok());
	}

	#[test]
	fn typed_decoding_reports_paths() {
		#[derive(Debug, Deserialize)]
		struct Item {
			#[allow(dead_code)]
			id: u32,
		}

		let mut ok = record(200);

		ok.result = Payload::Json(json!({ "id": 7 }));

		assert!(ok.deserialize::<Item>().is_ok());

		ok.result = Payload::Json(json!({ "id": "seven" }));

		match ok.deserialize::<Item>() {
			Err(EncodingError::Response { path, .. }) => assert_eq!(path, "id"),
			other => panic!("Unexpected result: {other:?}"),
		}
	}

	#[test]
	fn error_chain_includes_sources() {
		let err = TransportError::network(
			"https://api.test/",
			std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
		);

		assert_eq!(
			error_chain(&err),
			"Network error occurred while calling https://api.test/.: refused"
		);
	}
}
