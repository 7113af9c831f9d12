//! Single-call execution: cache consultation, bounded auth negotiation, and result assembly.

// std
use std::time::Instant;
// self
use crate::{
	_prelude::*,
	auth::{AuthNegotiator, Credentials},
	cache::{CacheError, CacheId, CacheKey, CacheStore},
	call::{
		CallExecutor, CallInfo, CallResult, JSON_CONTENT_TYPE, Payload, RequestParams,
		RequestSpec, Verb, result::error_chain,
	},
	encode,
	error::{EncodingError, TransportError},
	http::{HttpTransport, TransportRequest, TransportResponse},
	obs::{self, CallOutcome, CallSpan},
};

const CONTENT_TYPE: &str = "Content-Type";
const CONTENT_LENGTH: &str = "Content-Length";

impl<T> CallExecutor<T>
where
	T: ?Sized + HttpTransport,
{
	/// Performs one logical call.
	///
	/// Non-mutating calls with a cache TTL are answered from a fresh cache entry when one exists
	/// and written back after a successful network round trip. Mutating calls invalidate the
	/// matching entry first and never read from the cache. When credentials are configured, each
	/// HTTP 401 re-issues the call with the next negotiated scheme, at most twice.
	///
	/// Transport failures and a final 401 are returned as records (see
	/// [`CallResult::error_for_failure`]); only local problems with the request itself are
	/// errors.
	pub fn execute(&self, spec: &RequestSpec) -> Result<CallResult> {
		let _guard = CallSpan::new(spec.verb, "execute").entered();
		let credentials = spec.options.credentials()?;
		let prepared = PreparedCall::new(spec)?;
		let cache = self.cache.as_deref();
		let cache_id = spec
			.options
			.cache_ttl()
			.filter(|_| !spec.verb.is_mutating())
			.map(|ttl| CacheId::new(prepared.key.clone(), ttl));

		if let Some(cache) = cache {
			if spec.verb.is_mutating() {
				best_effort("invalidate", cache.invalidate(&prepared.key));
			} else if let Some(id) = &cache_id {
				if let Some(hit) = cached(cache, id, spec, &prepared) {
					obs::record_call_outcome(spec.verb, CallOutcome::CacheHit);

					return Ok(hit);
				}
			}
		}

		let result = self.dispatch(spec, &prepared, credentials.as_ref());

		if let (Some(cache), Some(id)) = (cache, &cache_id) {
			if result.info.error.is_none() && result.is_success() {
				let body = result.result.to_cache_body().unwrap_or_default();

				best_effort("store", cache.store(id, &body));
			}
		}

		Ok(result)
	}

	fn dispatch(
		&self,
		spec: &RequestSpec,
		prepared: &PreparedCall,
		credentials: Option<&Credentials>,
	) -> CallResult {
		let started = Instant::now();
		let mut negotiator = credentials.map(|_| AuthNegotiator::new(spec.options.auth_scheme()));
		let outcome = loop {
			let scheme = negotiator.as_ref().and_then(AuthNegotiator::current);
			let mut headers = prepared.headers.clone();

			if let Some(signer) = &spec.oauth {
				signer.sign_into(&mut headers, spec.verb.as_str(), spec.url.as_str(), &spec.params);
			}

			let request = TransportRequest {
				verb: spec.verb,
				url: &prepared.url,
				headers: &headers,
				body: prepared.body.as_deref(),
				cookie: prepared.cookie.as_deref(),
				auth: scheme.zip(credentials),
				verify_tls: spec.options.secure_ssl,
			};

			match self.transport.send(&request) {
				Ok(response) if response.status == 401 => {
					let Some(next) = negotiator.as_mut().and_then(AuthNegotiator::on_unauthorized)
					else {
						break Ok(response);
					};
					let retries = negotiator.as_ref().map(AuthNegotiator::retries).unwrap_or_default();

					obs::record_auth_retry(retries, next);
				},
				other => break other,
			}
		};
		let info = CallInfo {
			total_time: started.elapsed().as_secs_f64(),
			auth_attempts: negotiator
				.map(|negotiator| negotiator.attempted().to_vec())
				.unwrap_or_default(),
			..Default::default()
		};

		prepared.finish(spec, outcome, info)
	}
}

/// Request encoded once per call; only OAuth headers change between attempts.
struct PreparedCall {
	url: Url,
	headers: BTreeMap<String, String>,
	params: RequestParams,
	body: Option<String>,
	cookie: Option<String>,
	key: CacheKey,
}
impl PreparedCall {
	fn new(spec: &RequestSpec) -> Result<Self, EncodingError> {
		for (name, value) in &spec.headers {
			validate_header(name, value)?;
		}

		let mut url = spec.url.clone();
		let mut headers = spec.headers.clone();
		let mut params = spec.params.clone();

		if spec.options.json_post {
			params = params.into_json_text();

			set_header(&mut headers, CONTENT_TYPE, JSON_CONTENT_TYPE.to_owned());
		}

		let body = match spec.verb {
			Verb::Get => {
				if let Some(query) = params.query_string()? {
					append_query(&mut url, &query);
				}

				None
			},
			Verb::Head => None,
			Verb::Post | Verb::Delete => params.form_body(),
			Verb::Put => params.put_body(),
		};

		if let Some(body) = &body {
			if spec.options.json_post {
				set_header(&mut headers, CONTENT_LENGTH, body.text.len().to_string());
			}
			if let Some(content_type) =
				body.content_type.filter(|_| find_header(&headers, CONTENT_TYPE).is_none())
			{
				headers.insert(CONTENT_TYPE.into(), content_type.into());
			}
		}

		let cookie = (!spec.options.cookies.is_empty())
			.then(|| encode::cookie_header(&spec.options.cookies));

		if let Some(cookie) = &cookie {
			validate_header("Cookie", cookie)?;
		}

		let key = CacheKey::derive(url.as_str(), &headers, &params);

		Ok(Self { url, headers, params, body: body.map(|body| body.text), cookie, key })
	}

	fn echo(&self, spec: &RequestSpec) -> RequestParams {
		if spec.options.return_request_params { self.params.clone() } else { Default::default() }
	}

	fn finish(
		&self,
		spec: &RequestSpec,
		outcome: Result<TransportResponse, TransportError>,
		mut info: CallInfo,
	) -> CallResult {
		match outcome {
			Ok(response) => {
				let label = if response.status == 401 {
					CallOutcome::Unauthorized
				} else {
					CallOutcome::Network
				};
				let result = if spec.verb == Verb::Head {
					Payload::default()
				} else {
					Payload::parse(&response.body, spec.options.data_type)
				};

				obs::record_call_outcome(spec.verb, label);

				info.status = response.status;
				info.url = response.url;
				info.content_type = find_header(&response.headers, CONTENT_TYPE).map(str::to_owned);

				CallResult { result, request_parameters: self.echo(spec), info, header: response.headers }
			},
			Err(e) => {
				obs::record_call_outcome(spec.verb, CallOutcome::TransportFailure);

				info.url = self.url.to_string();
				info.error = Some(error_chain(&e));

				CallResult {
					result: Payload::default(),
					request_parameters: self.echo(spec),
					info,
					header: BTreeMap::new(),
				}
			},
		}
	}
}

fn cached(
	cache: &dyn CacheStore,
	id: &CacheId,
	spec: &RequestSpec,
	prepared: &PreparedCall,
) -> Option<CallResult> {
	if let Some(report) = best_effort("sweep", cache.sweep_if_due()).flatten() {
		obs::record_sweep(report);
	}

	let entry = best_effort("lookup", cache.lookup(id)).flatten()?;

	Some(CallResult {
		result: Payload::from_cache_body(&entry.body, spec.options.data_type),
		request_parameters: prepared.echo(spec),
		info: CallInfo {
			status: 200,
			url: prepared.url.to_string(),
			from_cache: true,
			..Default::default()
		},
		header: BTreeMap::new(),
	})
}

/// Cache failures degrade to a miss instead of failing the call.
fn best_effort<R>(operation: &'static str, outcome: Result<R, CacheError>) -> Option<R> {
	match outcome {
		Ok(value) => Some(value),
		Err(e) => {
			obs::record_cache_fault(operation, &e);

			None
		},
	}
}

fn validate_header(name: &str, value: &str) -> Result<(), EncodingError> {
	const TCHAR_SYMBOLS: &[u8] = b"!#$%&'*+-.^_`|~";

	let name_ok = !name.is_empty()
		&& name.bytes().all(|byte| byte.is_ascii_alphanumeric() || TCHAR_SYMBOLS.contains(&byte));
	let value_ok = !value.bytes().any(|byte| matches!(byte, b'\r' | b'\n' | b'\0'));

	if name_ok && value_ok {
		Ok(())
	} else {
		Err(EncodingError::InvalidHeader { name: name.to_owned() })
	}
}

fn find_header<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
	headers
		.iter()
		.find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
		.map(|(_, value)| value.as_str())
}

fn set_header(headers: &mut BTreeMap<String, String>, name: &str, value: String) {
	headers.retain(|candidate, _| !candidate.eq_ignore_ascii_case(name));
	headers.insert(name.to_owned(), value);
}

fn append_query(url: &mut Url, query: &str) {
	let joined = match url.query() {
		Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
		_ => query.to_owned(),
	};

	url.set_query(Some(&joined));
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::AuthScheme,
		cache::{CacheEntry, SweepReport},
		call::{CallOptions, DataType},
		error::{AuthError, Error},
		oauth::OAuthSigner,
	};

	type Responder = Box<dyn Fn(usize) -> Result<TransportResponse, TransportError> + Send + Sync>;

	#[derive(Clone, Debug)]
	struct Seen {
		url: String,
		headers: BTreeMap<String, String>,
		body: Option<String>,
		cookie: Option<String>,
		auth: Option<AuthScheme>,
	}

	struct ScriptedTransport {
		calls: AtomicUsize,
		seen: Mutex<Vec<Seen>>,
		respond: Responder,
	}
	impl ScriptedTransport {
		fn new(
			respond: impl Fn(usize) -> Result<TransportResponse, TransportError>
			+ 'static
			+ Send
			+ Sync,
		) -> Arc<Self> {
			Arc::new(Self {
				calls: AtomicUsize::new(0),
				seen: Mutex::new(Vec::new()),
				respond: Box::new(respond),
			})
		}

		fn always(status: u16, body: &'static str) -> Arc<Self> {
			Self::new(move |_| Ok(response(status, body)))
		}

		fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		fn seen(&self) -> Vec<Seen> {
			self.seen.lock().clone()
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn send(
			&self,
			request: &TransportRequest<'_>,
		) -> Result<TransportResponse, TransportError> {
			let index = self.calls.fetch_add(1, Ordering::SeqCst);

			self.seen.lock().push(Seen {
				url: request.url.to_string(),
				headers: request.headers.clone(),
				body: request.body.map(str::to_owned),
				cookie: request.cookie.map(str::to_owned),
				auth: request.auth.map(|(scheme, _)| scheme),
			});

			(self.respond)(index)
		}
	}

	fn response(status: u16, body: &str) -> TransportResponse {
		TransportResponse {
			status,
			url: "https://api.test/items".into(),
			headers: BTreeMap::from([("content-type".to_owned(), "application/json".to_owned())]),
			body: body.as_bytes().to_vec(),
		}
	}

	struct BrokenCache;
	impl BrokenCache {
		fn fault() -> CacheError {
			CacheError::Backend { message: "disk unavailable".into() }
		}
	}
	impl CacheStore for BrokenCache {
		fn lookup(&self, _: &CacheId) -> Result<Option<CacheEntry>, CacheError> {
			Err(Self::fault())
		}

		fn store(&self, _: &CacheId, _: &str) -> Result<(), CacheError> {
			Err(Self::fault())
		}

		fn invalidate(&self, _: &CacheKey) -> Result<usize, CacheError> {
			Err(Self::fault())
		}

		fn sweep(&self) -> Result<SweepReport, CacheError> {
			Err(Self::fault())
		}

		fn sweep_if_due(&self) -> Result<Option<SweepReport>, CacheError> {
			Err(Self::fault())
		}
	}

	fn executor(transport: &Arc<ScriptedTransport>) -> CallExecutor<ScriptedTransport> {
		CallExecutor::with_transport(transport.clone())
	}

	fn get(url: &str) -> RequestSpec {
		RequestSpec::new(Verb::Get, url).expect("Spec should build.")
	}

	#[test]
	fn any_scheme_narrows_through_basic_and_ntlm() {
		let transport = ScriptedTransport::always(401, "denied");
		let spec = get("https://api.test/items")
			.with_options(CallOptions::default().with_credentials("john", "go").with_auth_any(true));
		let result = executor(&transport).execute(&spec).expect("Call should produce a record.");

		assert_eq!(transport.calls(), 3);
		assert_eq!(result.status(), 401);
		assert_eq!(result.info.auth_attempts, vec![
			AuthScheme::Any,
			AuthScheme::Basic,
			AuthScheme::Ntlm
		]);
		assert_eq!(
			transport.seen().iter().map(|seen| seen.auth).collect::<Vec<_>>(),
			vec![Some(AuthScheme::Any), Some(AuthScheme::Basic), Some(AuthScheme::Ntlm)]
		);
		assert!(matches!(result.error_for_failure(), Err(Error::Auth(AuthError::Exhausted { .. }))));
	}

	#[test]
	fn basic_retries_once_with_ntlm() {
		let transport = ScriptedTransport::new(|index| {
			Ok(if index == 0 { response(401, "") } else { response(200, "{\"ok\":true}") })
		});
		let spec = get("https://api.test/items")
			.with_options(CallOptions::default().with_credentials("john", "go"));
		let result = executor(&transport).execute(&spec).expect("Call should produce a record.");

		assert_eq!(transport.calls(), 2);
		assert_eq!(result.result, Payload::Json(json!({ "ok": true })));
		assert_eq!(result.info.auth_attempts, vec![AuthScheme::Basic, AuthScheme::Ntlm]);
	}

	#[test]
	fn unauthenticated_calls_never_retry() {
		let transport = ScriptedTransport::always(401, "denied");
		let result =
			executor(&transport).execute(&get("https://api.test/items")).expect("Call should run.");

		assert_eq!(transport.calls(), 1);
		assert_eq!(result.status(), 401);
		assert!(result.info.auth_attempts.is_empty());
		assert!(result.error_for_failure().is_ok());
	}

	#[test]
	fn transport_failures_are_recorded_not_raised() {
		let transport = ScriptedTransport::new(|_| {
			Err(TransportError::Timeout { url: "https://api.test/items".into() })
		});
		let result =
			executor(&transport).execute(&get("https://api.test/items")).expect("Call should run.");

		assert_eq!(result.status(), 0);
		assert_eq!(result.result, Payload::Text(String::new()));
		assert_eq!(result.info.error.as_deref(), Some("Request to https://api.test/items timed out."));
		assert!(matches!(result.error_for_failure(), Err(Error::Transport(_))));
	}

	#[test]
	fn get_with_ttl_is_served_from_cache_until_expiry() {
		let clock = fixed_clock();
		let cache = Arc::new(memory_cache(clock.clone()));
		let transport = ScriptedTransport::always(200, "{\"items\":[1,2]}");
		let executor = executor(&transport).with_cache(cache.clone());
		let spec = get("https://api.test/items")
			.with_params(RequestParams::structured([("page", "1")]))
			.with_options(CallOptions::default().with_cache(60));
		let first = executor.execute(&spec).expect("First call should run.");
		let second = executor.execute(&spec).expect("Second call should run.");

		assert_eq!(transport.calls(), 1);
		assert!(!first.from_cache());
		assert!(second.from_cache());
		assert_eq!(second.status(), 200);
		assert_eq!(first.result, second.result);
		assert_eq!(second.info.url, "https://api.test/items?page=1");

		clock.advance(Duration::seconds(61));
		executor.execute(&spec).expect("Third call should run.");

		assert_eq!(transport.calls(), 2);
	}

	#[test]
	fn text_mode_cache_hits_stay_text() {
		let transport = ScriptedTransport::always(200, "{\"a\":1}");
		let executor = executor(&transport).with_cache(Arc::new(memory_cache(fixed_clock())));
		let spec = get("https://api.test/items")
			.with_options(CallOptions::default().with_cache(60).with_data_type(DataType::Text));
		let first = executor.execute(&spec).expect("First call should run.");
		let second = executor.execute(&spec).expect("Second call should run.");

		assert_eq!(transport.calls(), 1);
		assert!(second.from_cache());
		assert_eq!(first.result, Payload::Text("{\"a\":1}".into()));
		assert_eq!(first.result, second.result);
	}

	#[test]
	fn cache_faults_fall_through_to_the_network() {
		let transport = ScriptedTransport::always(200, "{\"fresh\":true}");
		let executor = executor(&transport).with_cache(Arc::new(BrokenCache));
		let read = get("https://api.test/items").with_options(CallOptions::default().with_cache(60));
		let result = executor.execute(&read).expect("Cache faults must not fail the call.");

		assert_eq!(transport.calls(), 1);
		assert!(!result.from_cache());
		assert_eq!(result.result, Payload::Json(json!({ "fresh": true })));

		let write = RequestSpec::new(Verb::Delete, "https://api.test/items")
			.expect("Spec should build.")
			.with_options(CallOptions::default().with_cache(60));

		assert_eq!(executor.execute(&write).expect("Invalidation faults are ignored.").status(), 200);
		assert_eq!(transport.calls(), 2);
	}

	#[test]
	fn mutating_calls_bypass_and_invalidate_the_cache() {
		let clock = fixed_clock();
		let cache = Arc::new(memory_cache(clock));
		let transport = ScriptedTransport::always(200, "{\"saved\":true}");
		let executor = executor(&transport).with_cache(cache.clone());
		let spec = RequestSpec::new(Verb::Post, "https://api.test/items")
			.expect("Spec should build.")
			.with_params(RequestParams::structured([("name", "kurl")]))
			.with_options(CallOptions::default().with_cache(60));

		executor.execute(&spec).expect("First call should run.");
		executor.execute(&spec).expect("Second call should run.");

		assert_eq!(transport.calls(), 2);
		assert!(cache.is_empty());
	}

	#[test]
	fn failed_calls_are_not_cached() {
		let clock = fixed_clock();
		let cache = Arc::new(memory_cache(clock));
		let transport = ScriptedTransport::always(500, "{\"error\":\"boom\"}");
		let executor = executor(&transport).with_cache(cache.clone());
		let spec = get("https://api.test/items").with_options(CallOptions::default().with_cache(60));

		executor.execute(&spec).expect("First call should run.");
		executor.execute(&spec).expect("Second call should run.");

		assert_eq!(transport.calls(), 2);
		assert!(cache.is_empty());
	}

	#[test]
	fn json_body_mode_sets_headers_and_body() {
		let transport = ScriptedTransport::always(201, "{}");
		let spec = RequestSpec::new(Verb::Post, "https://api.test/items")
			.expect("Spec should build.")
			.with_header("content-type", "text/plain")
			.with_params(RequestParams::structured([("name", "kurl")]))
			.with_options(CallOptions::default().with_json_body(true));
		let result = executor(&transport).execute(&spec).expect("Call should run.");
		let seen = transport.seen().remove(0);

		assert_eq!(seen.body.as_deref(), Some("{\"name\":\"kurl\"}"));
		assert_eq!(seen.headers.get(CONTENT_TYPE).map(String::as_str), Some(JSON_CONTENT_TYPE));
		assert_eq!(seen.headers.get(CONTENT_LENGTH).map(String::as_str), Some("15"));
		assert!(!seen.headers.contains_key("content-type"));
		assert_eq!(result.request_parameters, RequestParams::raw("{\"name\":\"kurl\"}"));
	}

	#[test]
	fn put_sends_structured_params_as_json() {
		let transport = ScriptedTransport::always(200, "{}");
		let spec = RequestSpec::new(Verb::Put, "https://api.test/items/1")
			.expect("Spec should build.")
			.with_params(RequestParams::structured([("name", "kurl")]));

		executor(&transport).execute(&spec).expect("Call should run.");

		let seen = transport.seen().remove(0);

		assert_eq!(seen.body.as_deref(), Some("{\"name\":\"kurl\"}"));
		assert_eq!(seen.headers.get(CONTENT_TYPE).map(String::as_str), Some(JSON_CONTENT_TYPE));
	}

	#[test]
	fn get_appends_to_existing_queries() {
		let transport = ScriptedTransport::always(200, "{}");
		let spec = get("https://api.test/items?sort=asc")
			.with_params(RequestParams::structured([("page", "2")]));

		executor(&transport).execute(&spec).expect("Call should run.");

		assert_eq!(transport.seen()[0].url, "https://api.test/items?sort=asc&page=2");
		assert_eq!(transport.seen()[0].body, None);
	}

	#[test]
	fn cookies_and_oauth_reach_the_transport() {
		let transport = ScriptedTransport::always(200, "{}");
		let spec = get("https://api.test/items")
			.with_options(CallOptions::default().with_cookie("session", "abc").with_cookie("t", "1"))
			.with_oauth(OAuthSigner::new("key123", "secret").with_clock(fixed_clock()));

		executor(&transport).execute(&spec).expect("Call should run.");

		let seen = transport.seen().remove(0);
		let authorization = seen.headers.get("Authorization").expect("OAuth header should be set.");

		assert_eq!(seen.cookie.as_deref(), Some("session=abc; t=1"));
		assert!(authorization.starts_with("OAuth "));
		assert!(authorization.contains("oauth_consumer_key=\"key123\""));
	}

	#[test]
	fn oauth_nonces_do_not_split_the_cache() {
		let clock = fixed_clock();
		let transport = ScriptedTransport::always(200, "{\"v\":1}");
		let executor = executor(&transport).with_cache(Arc::new(memory_cache(clock.clone())));
		let spec = get("https://api.test/items")
			.with_options(CallOptions::default().with_cache(60))
			.with_oauth(OAuthSigner::new("key123", "secret").with_clock(clock));

		executor.execute(&spec).expect("First call should run.");

		assert!(executor.execute(&spec).expect("Second call should run.").from_cache());
		assert_eq!(transport.calls(), 1);
	}

	#[test]
	fn echo_can_be_suppressed() {
		let transport = ScriptedTransport::always(200, "{}");
		let spec = get("https://api.test/items")
			.with_params(RequestParams::structured([("q", "x")]))
			.with_options(CallOptions::default().with_request_params_echo(false));
		let result = executor(&transport).execute(&spec).expect("Call should run.");

		assert_eq!(result.request_parameters, RequestParams::default());
	}

	#[test]
	fn invalid_headers_fail_before_sending() {
		let transport = ScriptedTransport::always(200, "{}");
		let spec = get("https://api.test/items").with_header("X-Bad", "a\r\nInjected: 1");
		let err = executor(&transport).execute(&spec).expect_err("Header must be rejected.");

		assert!(matches!(err, Error::Encoding(EncodingError::InvalidHeader { .. })));
		assert_eq!(transport.calls(), 0);
	}

	#[test]
	fn head_reads_no_body() {
		let transport = ScriptedTransport::always(200, "{\"ignored\":true}");
		let spec = RequestSpec::new(Verb::Head, "https://api.test/items")
			.expect("Spec should build.")
			.with_params(RequestParams::structured([("q", "x")]));
		let result = executor(&transport).execute(&spec).expect("Call should run.");

		assert_eq!(result.result, Payload::Text(String::new()));
		assert_eq!(transport.seen()[0].url, "https://api.test/items");
		assert_eq!(result.info.content_type.as_deref(), Some("application/json"));
	}
}
