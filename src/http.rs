//! Transport primitives for REST calls.
//!
//! The module exposes [`HttpTransport`] alongside [`TransportRequest`] and [`TransportResponse`]
//! so downstream crates can plug in custom HTTP stacks (or deterministic fakes) without touching
//! the executor's caching and negotiation logic. The executor builds one [`TransportRequest`]
//! per attempt, so implementations never need to remember anything between calls.

// crates.io
#[cfg(feature = "reqwest")]
use reqwest::{
	Method,
	blocking::{Client as BlockingClient, Response as BlockingResponse},
	header::{AUTHORIZATION, COOKIE, HeaderMap, WWW_AUTHENTICATE},
	redirect::Policy,
};
// self
use crate::{
	_prelude::*,
	auth::{AuthScheme, Credentials},
	call::Verb,
	error::TransportError,
};
#[cfg(feature = "reqwest")]
use crate::{
	auth::ntlm::{self, NtlmChallenge},
	error::ConfigError,
};

/// Redirect hops followed by [`ReqwestTransport`] unless overridden.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// One fully prepared attempt.
#[derive(Clone, Debug)]
pub struct TransportRequest<'a> {
	/// HTTP verb.
	pub verb: Verb,
	/// Effective URL, query included.
	pub url: &'a Url,
	/// Headers to send verbatim.
	pub headers: &'a BTreeMap<String, String>,
	/// Encoded body, if the verb carries one.
	pub body: Option<&'a str>,
	/// `Cookie` header value, if any cookies were configured.
	pub cookie: Option<&'a str>,
	/// Scheme and credentials for this attempt.
	pub auth: Option<(AuthScheme, &'a Credentials)>,
	/// Verify TLS peers and host names.
	pub verify_tls: bool,
}

/// What came back from the server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportResponse {
	/// HTTP status code.
	pub status: u16,
	/// Final URL after redirects.
	pub url: String,
	/// Response headers keyed by lower-cased name; repeated headers are joined with `, `.
	pub headers: BTreeMap<String, String>,
	/// Raw body; empty for HEAD.
	pub body: Vec<u8>,
}

/// Abstraction over blocking HTTP stacks.
///
/// Implementations must be `Send + Sync + 'static` so a single transport can back many
/// executors. Any HTTP status, 401 included, is a successful send; only failures that prevent a
/// status from being received are errors.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends one attempt.
	fn send(&self, request: &TransportRequest<'_>) -> Result<TransportResponse, TransportError>;
}

/// Blocking reqwest transport with separate verifying and non-verifying clients.
///
/// The permissive [`AuthScheme::Any`] attempt is sent without credentials so the server's
/// challenge drives the negotiator to Basic. The NTLM attempt runs the full handshake on one
/// client: a Type 1 negotiate message, then a Type 3 answer to the server's Type 2 challenge. An
/// explicit `Authorization` header (such as an OAuth signature) always wins over credentials.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	secure: BlockingClient,
	insecure: BlockingClient,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport with default settings.
	pub fn new() -> Result<Self, ConfigError> {
		Self::builder().build()
	}

	/// Starts a builder.
	pub fn builder() -> ReqwestTransportBuilder {
		ReqwestTransportBuilder::default()
	}

	/// Wraps pre-built clients; `insecure` is used when TLS verification is disabled.
	pub fn with_clients(secure: BlockingClient, insecure: BlockingClient) -> Self {
		Self { secure, insecure }
	}

	fn client(&self, verify_tls: bool) -> &BlockingClient {
		if verify_tls { &self.secure } else { &self.insecure }
	}

	fn exchange(
		&self,
		request: &TransportRequest<'_>,
		authorization: Option<&str>,
	) -> Result<TransportResponse, TransportError> {
		let url = request.url.as_str();
		let mut builder = self.client(request.verify_tls).request(method(request.verb), url);

		for (name, value) in request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		if let Some(cookie) = request.cookie {
			builder = builder.header(COOKIE, cookie);
		}
		if let Some(authorization) = authorization {
			builder = builder.header(AUTHORIZATION, authorization);
		}
		if let Some(body) = request.body {
			builder = builder.body(body.to_owned());
		}

		let response = builder.send().map_err(|e| map_reqwest_error(url, e))?;

		read_response(request.verb, response).map_err(|e| map_reqwest_error(url, e))
	}

	fn ntlm_handshake(
		&self,
		request: &TransportRequest<'_>,
		credentials: &Credentials,
	) -> Result<TransportResponse, TransportError> {
		let negotiated = self.exchange(request, Some(&ntlm::negotiate_header()))?;
		let challenge = Some(&negotiated)
			.filter(|response| response.status == 401)
			.and_then(|response| response.headers.get(WWW_AUTHENTICATE.as_str()))
			.and_then(|value| NtlmChallenge::from_header(value));
		let Some(challenge) = challenge else {
			return Ok(negotiated);
		};
		let answer = ntlm::authenticate_header(&challenge, credentials, OffsetDateTime::now_utc());

		self.exchange(request, Some(&answer))
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: &TransportRequest<'_>) -> Result<TransportResponse, TransportError> {
		let explicit_authorization =
			request.headers.keys().any(|name| name.eq_ignore_ascii_case(AUTHORIZATION.as_str()));

		match request.auth.filter(|_| !explicit_authorization) {
			Some((AuthScheme::Basic, credentials)) =>
				self.exchange(request, Some(&credentials.basic_header())),
			Some((AuthScheme::Ntlm, credentials)) => self.ntlm_handshake(request, credentials),
			Some((AuthScheme::Any, _)) | None => self.exchange(request, None),
		}
	}
}

/// Builder for [`ReqwestTransport`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransportBuilder {
	timeout: Option<std::time::Duration>,
	user_agent: Option<String>,
	max_redirects: usize,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransportBuilder {
	/// Total per-attempt timeout.
	pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// `User-Agent` sent with every request.
	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = Some(user_agent.into());

		self
	}

	/// Redirect hops to follow; `0` disables redirects.
	pub fn max_redirects(mut self, hops: usize) -> Self {
		self.max_redirects = hops;

		self
	}

	/// Builds both clients.
	pub fn build(self) -> Result<ReqwestTransport, ConfigError> {
		let secure = self.client_builder().build()?;
		// With rustls, accepting invalid certificates also skips host name checks.
		let insecure = self.client_builder().danger_accept_invalid_certs(true).build()?;

		Ok(ReqwestTransport { secure, insecure })
	}

	fn client_builder(&self) -> reqwest::blocking::ClientBuilder {
		let redirect =
			if self.max_redirects == 0 { Policy::none() } else { Policy::limited(self.max_redirects) };
		let mut builder = BlockingClient::builder().redirect(redirect);

		if let Some(timeout) = self.timeout {
			builder = builder.timeout(timeout);
		}
		if let Some(user_agent) = &self.user_agent {
			builder = builder.user_agent(user_agent.as_str());
		}

		builder
	}
}
#[cfg(feature = "reqwest")]
impl Default for ReqwestTransportBuilder {
	fn default() -> Self {
		Self {
			timeout: None,
			user_agent: Some(concat!("kurl/", env!("CARGO_PKG_VERSION")).to_owned()),
			max_redirects: DEFAULT_MAX_REDIRECTS,
		}
	}
}

#[cfg(feature = "reqwest")]
fn method(verb: Verb) -> Method {
	match verb {
		Verb::Get => Method::GET,
		Verb::Post => Method::POST,
		Verb::Put => Method::PUT,
		Verb::Delete => Method::DELETE,
		Verb::Head => Method::HEAD,
	}
}

#[cfg(feature = "reqwest")]
fn read_response(
	verb: Verb,
	response: BlockingResponse,
) -> Result<TransportResponse, reqwest::Error> {
	let status = response.status().as_u16();
	let url = response.url().to_string();
	let headers = collect_headers(response.headers());
	let body = if verb == Verb::Head { Vec::new() } else { response.bytes()?.to_vec() };

	Ok(TransportResponse { status, url, headers, body })
}

#[cfg(feature = "reqwest")]
fn collect_headers(map: &HeaderMap) -> BTreeMap<String, String> {
	let mut headers = BTreeMap::<String, String>::new();

	for (name, value) in map {
		let value = String::from_utf8_lossy(value.as_bytes()).into_owned();

		headers
			.entry(name.as_str().to_owned())
			.and_modify(|joined| {
				joined.push_str(", ");
				joined.push_str(&value);
			})
			.or_insert(value);
	}

	headers
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(url: &str, e: reqwest::Error) -> TransportError {
	if e.is_timeout() {
		TransportError::Timeout { url: url.to_owned() }
	} else {
		TransportError::network(url, e)
	}
}
