//! Username/password credentials with a redacting password wrapper.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
// self
use crate::_prelude::*;

/// Redacted secret wrapper keeping passwords and consumer secrets out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret(String);
impl Secret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for Secret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Secret").field(&"<redacted>").finish()
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Login credentials handed to the transport for Basic or NTLM authentication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
	/// Account name.
	pub username: String,
	/// Account password.
	pub password: Secret,
}
impl Credentials {
	/// Pairs a username with its password.
	pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self { username: username.into(), password: Secret::new(password) }
	}

	/// Renders the `Authorization` value for Basic authentication.
	pub fn basic_header(&self) -> String {
		let raw = format!("{}:{}", self.username, self.password.expose());

		format!("Basic {}", STANDARD.encode(raw))
	}
}
