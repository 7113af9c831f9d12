//! Authentication schemes, credentials, and the 401 negotiation state machine.

pub mod credentials;
pub mod negotiator;
pub mod ntlm;
pub mod scheme;

pub use credentials::*;
pub use negotiator::*;
pub use scheme::*;
