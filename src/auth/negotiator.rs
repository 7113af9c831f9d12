//! Bounded scheme negotiation driven by HTTP 401 responses.
//!
//! A permissive "any scheme" mode does not complete against servers that insist on NTLM, so
//! the negotiator narrows deterministically: the configured scheme first, then Basic, then
//! NTLM, then it gives up. It never touches the caller's configured scheme; the executor asks
//! it for the next scheme and re-issues the call itself.

// self
use crate::{_prelude::*, auth::AuthScheme};

/// Upper bound on re-executions after the initial attempt.
pub const MAX_AUTH_RETRIES: usize = 2;

/// Negotiation state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthState {
	/// Initial attempt with the caller's scheme.
	Configured(AuthScheme),
	/// Retrying with Basic after the configured scheme was rejected.
	RetryBasic,
	/// Retrying with NTLM after Basic (or the configured scheme) was rejected.
	RetryNtlm,
	/// No schemes left; the last 401 is surfaced as-is.
	Exhausted,
}

/// Small state machine that picks the next scheme after each 401.
#[derive(Clone, Debug)]
pub struct AuthNegotiator {
	original: AuthScheme,
	state: AuthState,
	attempted: Vec<AuthScheme>,
}
impl AuthNegotiator {
	/// Starts negotiation from the caller's configured scheme.
	pub fn new(configured: AuthScheme) -> Self {
		Self {
			original: configured,
			state: AuthState::Configured(configured),
			attempted: vec![configured],
		}
	}

	/// Scheme the caller configured; unaffected by retries.
	pub fn original(&self) -> AuthScheme {
		self.original
	}

	/// Current state.
	pub fn state(&self) -> AuthState {
		self.state
	}

	/// Scheme to apply to the attempt about to be sent, or `None` once exhausted.
	pub fn current(&self) -> Option<AuthScheme> {
		match self.state {
			AuthState::Configured(scheme) => Some(scheme),
			AuthState::RetryBasic => Some(AuthScheme::Basic),
			AuthState::RetryNtlm => Some(AuthScheme::Ntlm),
			AuthState::Exhausted => None,
		}
	}

	/// Schemes sent so far, in order.
	pub fn attempted(&self) -> &[AuthScheme] {
		&self.attempted
	}

	/// Number of re-executions requested so far.
	pub fn retries(&self) -> usize {
		self.attempted.len().saturating_sub(1)
	}

	/// Whether a 401 has been answered with "stop".
	pub fn is_exhausted(&self) -> bool {
		matches!(self.state, AuthState::Exhausted)
	}

	/// Advances after an HTTP 401, returning the scheme for the next attempt.
	pub fn on_unauthorized(&mut self) -> Option<AuthScheme> {
		let next = match self.state {
			AuthState::Configured(AuthScheme::Ntlm) | AuthState::RetryNtlm => AuthState::Exhausted,
			AuthState::Configured(AuthScheme::Basic) | AuthState::RetryBasic => AuthState::RetryNtlm,
			AuthState::Configured(AuthScheme::Any) => AuthState::RetryBasic,
			AuthState::Exhausted => AuthState::Exhausted,
		};

		self.state = next;

		let scheme = self.current()?;

		self.attempted.push(scheme);

		Some(scheme)
	}
}
