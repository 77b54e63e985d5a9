//! The upstream session seam and its `ldap3`-backed implementation.
//!
//! The connection pool collaborator owns establishing and authenticating
//! remote connections; this crate borrows one per request through the
//! [`UpstreamSession`] trait and never closes it. The shipped
//! [`LdapUpstream`] adapter wraps a lent [`ldap3::Ldap`] handle.

use std::time::Duration;

use async_trait::async_trait;
use ldap3::{
	DerefAliases, Ldap, LdapError, RequestId, Scope, SearchEntry, SearchOptions, SearchStream,
};
use ldap3_proto::{
	proto::{LdapDerefAliases, LdapSearchScope},
	LdapResultCode,
};
use tokio::time::timeout;
use tracing::warn;

use crate::{config::BindCredentials, error::UpstreamError};

/// What one bounded-wait poll of the upstream stream produced.
#[derive(Debug)]
pub enum StreamEvent {
	/// Nothing arrived within the poll interval.
	Idle,
	/// One entry message.
	Entry(SearchEntry),
	/// The terminal result message has arrived; call `finish`.
	Done,
}

/// The aggregate outcome of a finished result stream.
#[derive(Clone, Debug, Default)]
pub struct UpstreamOutcome {
	/// Numeric result code as sent by the remote server.
	pub rc: u32,
	/// Matched DN, empty when the server sent none.
	pub matched: String,
	/// Diagnostic text, empty when the server sent none.
	pub text: String,
}

/// Options forwarded with the remote search.
#[derive(Clone, Debug)]
pub struct RemoteSearchOptions {
	/// Alias dereference policy.
	pub deref: LdapDerefAliases,
	/// Time limit in seconds, when the effective limit is specified.
	pub time_limit: Option<i32>,
	/// Size limit, when the effective limit is specified.
	pub size_limit: Option<i32>,
	/// Return attribute types only, without values.
	pub types_only: bool,
}

/// An established channel to the remote server, borrowed for one request.
#[async_trait]
pub trait UpstreamSession: Send {
	/// Make sure the session is bound, binding it if necessary.
	async fn ensure_bound(&mut self) -> Result<(), UpstreamError>;

	/// Forward dereference policy and limits for the next search.
	fn set_search_options(&mut self, options: RemoteSearchOptions);

	/// Issue the search and hand back its result stream.
	async fn search(
		&mut self,
		base: &str,
		scope: LdapSearchScope,
		filter: &str,
		attrs: Vec<String>,
	) -> Result<Box<dyn UpstreamStream>, UpstreamError>;
}

/// The in-flight result stream of one remote search.
#[async_trait]
pub trait UpstreamStream: Send {
	/// Wait up to the poll interval for the next message.
	async fn poll_next(&mut self) -> Result<StreamEvent, UpstreamError>;

	/// Consume the terminal result after [`StreamEvent::Done`].
	async fn finish(&mut self) -> UpstreamOutcome;

	/// Tell the remote server to abandon the search. Best effort; the
	/// server is not waited on for an acknowledgement.
	async fn abandon(&mut self);
}

/// [`UpstreamSession`] over a lent `ldap3` connection handle.
#[derive(Debug)]
pub struct LdapUpstream {
	/// The borrowed connection handle.
	ldap: Ldap,
	/// Identity to bind with when the connection is not yet bound.
	bind: Option<BindCredentials>,
	/// Whether a bind has been performed on this handle.
	bound: bool,
	/// Bounded wait applied to each stream poll.
	poll_interval: Duration,
}

impl LdapUpstream {
	/// Wrap a connection lent by the pool for the duration of one request.
	#[must_use]
	pub fn new(ldap: Ldap, bind: Option<BindCredentials>, poll_interval: Duration) -> Self {
		LdapUpstream { ldap, bind, bound: false, poll_interval }
	}
}

#[async_trait]
impl UpstreamSession for LdapUpstream {
	async fn ensure_bound(&mut self) -> Result<(), UpstreamError> {
		if self.bound {
			return Ok(());
		}
		if let Some(bind) = &self.bind {
			self.ldap.simple_bind(&bind.dn, &bind.password).await?.success()?;
		}
		self.bound = true;
		Ok(())
	}

	fn set_search_options(&mut self, options: RemoteSearchOptions) {
		let mut opts = SearchOptions::new()
			.deref(convert_deref(&options.deref))
			.typesonly(options.types_only);
		if let Some(limit) = options.time_limit {
			opts = opts.timelimit(limit);
		}
		if let Some(limit) = options.size_limit {
			opts = opts.sizelimit(limit);
		}
		self.ldap.with_search_options(opts);
	}

	async fn search(
		&mut self,
		base: &str,
		scope: LdapSearchScope,
		filter: &str,
		attrs: Vec<String>,
	) -> Result<Box<dyn UpstreamStream>, UpstreamError> {
		let mut stream =
			self.ldap.streaming_search(base, convert_scope(&scope), filter, attrs).await?;
		let msgid = stream.ldap_handle().last_id();
		Ok(Box::new(LdapUpstreamStream { stream, msgid, poll_interval: self.poll_interval }))
	}
}

/// [`UpstreamStream`] over an `ldap3` search stream.
struct LdapUpstreamStream {
	/// The underlying stream. It owns its own connection handle clone.
	stream: SearchStream<'static, String, Vec<String>>,
	/// Message id of the search, needed to abandon it.
	msgid: RequestId,
	/// Bounded wait applied to each poll.
	poll_interval: Duration,
}

#[async_trait]
impl UpstreamStream for LdapUpstreamStream {
	async fn poll_next(&mut self) -> Result<StreamEvent, UpstreamError> {
		// Receiving from the stream is cancel safe, so an elapsed wait
		// loses nothing.
		match timeout(self.poll_interval, self.stream.next()).await {
			Err(_elapsed) => Ok(StreamEvent::Idle),
			Ok(Ok(Some(entry))) => Ok(StreamEvent::Entry(SearchEntry::construct(entry))),
			Ok(Ok(None)) => Ok(StreamEvent::Done),
			Ok(Err(err)) => Err(err.into()),
		}
	}

	async fn finish(&mut self) -> UpstreamOutcome {
		let result = self.stream.finish().await;
		UpstreamOutcome { rc: result.rc, matched: result.matched, text: result.text }
	}

	async fn abandon(&mut self) {
		if let Err(err) = self.stream.ldap_handle().abandon(self.msgid).await {
			warn!(error = %err, "failed to send abandon upstream");
		}
	}
}

/// Map the local dereference policy onto the client library's.
fn convert_deref(deref: &LdapDerefAliases) -> DerefAliases {
	match deref {
		LdapDerefAliases::Never => DerefAliases::Never,
		LdapDerefAliases::InSearching => DerefAliases::Searching,
		LdapDerefAliases::FindingBaseObj => DerefAliases::Finding,
		_ => DerefAliases::Always,
	}
}

/// Map the local search scope onto the client library's.
fn convert_scope(scope: &LdapSearchScope) -> Scope {
	match scope {
		LdapSearchScope::Base => Scope::Base,
		LdapSearchScope::OneLevel => Scope::OneLevel,
		_ => Scope::Subtree,
	}
}

impl From<LdapError> for UpstreamError {
	fn from(err: LdapError) -> Self {
		match err {
			LdapError::LdapResult { result } => {
				UpstreamError { code: map_result_code(result.rc), message: result.text }
			}
			other => {
				UpstreamError { code: LdapResultCode::Unavailable, message: other.to_string() }
			}
		}
	}
}

/// Map a remote numeric result code into the local result-code space.
///
/// Codes outside the set a search can legitimately produce, including
/// private and experimental ranges, collapse to `other`.
#[must_use]
pub fn map_result_code(rc: u32) -> LdapResultCode {
	match rc {
		0 => LdapResultCode::Success,
		1 => LdapResultCode::OperationsError,
		2 => LdapResultCode::ProtocolError,
		3 => LdapResultCode::TimeLimitExceeded,
		4 => LdapResultCode::SizeLimitExceeded,
		10 => LdapResultCode::Referral,
		11 => LdapResultCode::AdminLimitExceeded,
		16 => LdapResultCode::NoSuchAttribute,
		17 => LdapResultCode::UndefinedAttributeType,
		18 => LdapResultCode::InappropriateMatching,
		19 => LdapResultCode::ConstraintViolation,
		21 => LdapResultCode::InvalidAttributeSyntax,
		32 => LdapResultCode::NoSuchObject,
		34 => LdapResultCode::InvalidDNSyntax,
		48 => LdapResultCode::InappropriateAuthentication,
		49 => LdapResultCode::InvalidCredentials,
		50 => LdapResultCode::InsufficentAccessRights,
		51 => LdapResultCode::Busy,
		52 => LdapResultCode::Unavailable,
		53 => LdapResultCode::UnwillingToPerform,
		_ => LdapResultCode::Other,
	}
}
