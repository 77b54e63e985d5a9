//! Errors that abort a proxied search.

use ldap3_proto::LdapResultCode;

use crate::rewrite::{RewriteContext, RewriteError};

/// Hard failures of the proxy search path.
///
/// Anything the proxy can answer on its own, such as an administrative
/// rejection or a transport error that was already converted into a search
/// result, is not an [`Error`]. These variants correspond to requests the
/// surrounding server must treat as not handled.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The backend configuration failed validation.
	#[error("invalid configuration: {0}")]
	Config(String),
	/// The request's filter contains a construct the proxy cannot render
	/// for the remote server.
	#[error("filter contains an element that cannot be forwarded")]
	UnsupportedFilter,
	/// A rewrite of the given boundary string was declined or failed. The
	/// matching "unwilling to perform" or "operations error" result has
	/// already been delivered to the caller.
	#[error("rewrite of {context} failed: {source}")]
	Rewrite {
		/// Which boundary string was being rewritten.
		context: RewriteContext,
		/// Whether the engine declined or failed outright.
		source: RewriteError,
	},
	/// Binding the upstream session failed. No result was delivered.
	#[error("upstream bind failed: {0}")]
	Bind(#[source] UpstreamError),
}

/// An error surfaced by the upstream session.
///
/// Carries the directory result code the failure maps to and the server's
/// diagnostic message, so the pump can hand both straight to the result
/// delivery path.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamError {
	/// The result code to report to the caller.
	pub code: LdapResultCode,
	/// Diagnostic text from the remote server, possibly empty.
	pub message: String,
}

impl UpstreamError {
	/// An upstream failure with a code but no diagnostic text.
	#[must_use]
	pub fn from_code(code: LdapResultCode) -> Self {
		UpstreamError { code, message: String::new() }
	}
}
