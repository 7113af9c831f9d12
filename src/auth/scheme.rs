//! HTTP authentication schemes the transport may be asked to apply.

// self
use crate::_prelude::*;

/// Scheme used when sending credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
	/// Permissive mode: let the transport pick whatever the server advertises.
	Any,
	/// RFC 7617 Basic authentication.
	Basic,
	/// NTLM challenge/response authentication.
	Ntlm,
}
impl AuthScheme {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthScheme::Any => "any",
			AuthScheme::Basic => "basic",
			AuthScheme::Ntlm => "ntlm",
		}
	}
}
impl Display for AuthScheme {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
