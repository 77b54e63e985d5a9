//! The proxy search path: limit policy, rewriting, mapping, result pump.

use std::{
	borrow::Cow,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use ldap3_proto::{
	proto::{LdapDerefAliases, LdapSearchRequest, LdapSearchScope},
	LdapFilter, LdapResultCode,
};
use tracing::debug;

use crate::{
	config::{ProxyConfig, RewriteConfig},
	entry::{EntryTranslator, TranslatedEntry},
	error::Error,
	filter,
	limits::{LimitCheck, LimitTable},
	rewrite::{self, normalize_dn, DnRewriter, NoRewrite, RewriteContext, RewriteError, SuffixRewriter},
	schema::{LocalSchema, NameMap},
	session::{map_result_code, RemoteSearchOptions, StreamEvent, UpstreamSession},
};

/// The identity a search runs as, resolved by the session layer.
#[derive(Clone, Debug)]
pub struct Caller {
	/// Normalized DN of the caller, empty for anonymous callers.
	pub dn: String,
	/// Whether the caller bypasses administrative limits.
	pub privileged: bool,
}

impl Caller {
	/// A caller with the given DN.
	#[must_use]
	pub fn new(dn: &str, privileged: bool) -> Self {
		Caller { dn: normalize_dn(dn), privileged }
	}

	/// The anonymous caller.
	#[must_use]
	pub fn anonymous() -> Self {
		Caller { dn: String::new(), privileged: false }
	}
}

/// One search request. Immutable for the duration of the call.
#[derive(Clone, Debug)]
pub struct SearchRequest {
	/// The base DN as the caller sent it.
	pub base: String,
	/// Normalized form of the base DN.
	pub base_normalized: String,
	/// Search scope.
	pub scope: LdapSearchScope,
	/// Alias dereference policy.
	pub deref: LdapDerefAliases,
	/// Requested size limit, `-1` when unspecified.
	pub size_limit: i32,
	/// Requested time limit in seconds, `-1` when unspecified.
	pub time_limit: i32,
	/// The structured filter.
	pub filter: LdapFilter,
	/// The filter rendered to string form.
	pub filter_str: String,
	/// Requested attributes, in local names.
	pub attrs: Vec<String>,
	/// Whether to return attribute types only.
	pub attrs_only: bool,
	/// The caller the search runs as.
	pub caller: Caller,
}

impl SearchRequest {
	/// Build a request from its wire form and the resolved caller.
	///
	/// The wire encoding uses zero for "no limit requested"; that becomes
	/// `-1`, deferring to the remote server's own limits.
	pub fn from_proto(request: LdapSearchRequest, caller: Caller) -> Result<Self, Error> {
		let filter_str =
			filter::filter_string(&request.filter).ok_or(Error::UnsupportedFilter)?;
		Ok(SearchRequest {
			base_normalized: normalize_dn(&request.base),
			base: request.base,
			scope: request.scope,
			deref: request.aliases,
			size_limit: if request.sizelimit == 0 { -1 } else { request.sizelimit },
			time_limit: if request.timelimit == 0 { -1 } else { request.timelimit },
			filter: request.filter,
			filter_str,
			attrs: request.attrs,
			attrs_only: request.typesonly,
			caller,
		})
	}
}

/// Cancellation flag shared between a request worker and whatever handles
/// the connection's abandon operations.
///
/// The pump re-checks the flag on every iteration; once set, the search
/// terminates silently after notifying the remote server.
#[derive(Clone, Debug, Default)]
pub struct AbandonFlag(Arc<AtomicBool>);

impl AbandonFlag {
	/// A fresh, unset flag.
	#[must_use]
	pub fn new() -> Self {
		AbandonFlag::default()
	}

	/// Mark the operation abandoned.
	pub fn set(&self) {
		self.0.store(true, Ordering::Relaxed);
	}

	/// Whether the operation was abandoned.
	#[must_use]
	pub fn is_set(&self) -> bool {
		self.0.load(Ordering::Relaxed)
	}
}

/// Where translated entries and the terminal result are delivered.
///
/// The proxy makes zero or more `emit_entry` calls followed by exactly one
/// `deliver_result` call, except on abandon, where nothing further is
/// delivered. Entries are consumed synchronously; the sink must not retain
/// borrows past the call.
pub trait ResultSink: Send {
	/// Emit one translated entry.
	fn emit_entry(&mut self, entry: &TranslatedEntry, projection: &[String], attrs_only: bool);

	/// Deliver the terminal result.
	fn deliver_result(
		&mut self,
		code: LdapResultCode,
		matched_dn: &str,
		text: &str,
		entry_count: usize,
	);
}

/// How a handled search concluded.
#[derive(Clone, Debug, PartialEq)]
pub enum SearchDisposition {
	/// A terminal result was delivered.
	Completed {
		/// The delivered result code.
		code: LdapResultCode,
		/// Entries successfully translated and emitted.
		entries: usize,
	},
	/// The caller abandoned the search; nothing was delivered.
	Abandoned,
}

/// A proxy backend compiled from configuration.
///
/// Shared read-only across concurrently executing requests; configuration
/// reload builds a fresh backend rather than mutating this one.
pub struct ProxyBackend {
	/// Attribute type name map.
	at_map: NameMap,
	/// Object class name map.
	oc_map: NameMap,
	/// Local schema view for descriptor resolution.
	schema: LocalSchema,
	/// The DN rewrite engine.
	rewriter: Box<dyn DnRewriter>,
	/// Administrative limit rules.
	limits: LimitTable,
}

impl std::fmt::Debug for ProxyBackend {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ProxyBackend").finish_non_exhaustive()
	}
}

impl ProxyBackend {
	/// Compile a configuration, selecting the configured rewrite strategy.
	pub fn new(config: &ProxyConfig) -> Result<Self, Error> {
		let rewriter: Box<dyn DnRewriter> = match &config.rewrite {
			RewriteConfig::None => Box::new(NoRewrite),
			RewriteConfig::Suffix { local, remote } => {
				Box::new(SuffixRewriter::new(local, remote))
			}
		};
		Self::with_rewriter(config, rewriter)
	}

	/// Compile a configuration around an externally supplied rewrite
	/// engine, for backends embedding a full pattern-rewrite library.
	pub fn with_rewriter(
		config: &ProxyConfig,
		rewriter: Box<dyn DnRewriter>,
	) -> Result<Self, Error> {
		Ok(ProxyBackend {
			at_map: NameMap::new(&config.attribute_map)?,
			oc_map: NameMap::new(&config.objectclass_map)?,
			schema: LocalSchema::with_defaults(),
			rewriter,
			limits: LimitTable::new(config.limits.clone()),
		})
	}

	/// Replace the local schema view used for descriptor resolution.
	#[must_use]
	pub fn with_schema(mut self, schema: LocalSchema) -> Self {
		self.schema = schema;
		self
	}

	/// Proxy one search.
	///
	/// `Ok` means the request was handled, including administrative
	/// rejections and transport failures that were answered with an error
	/// result. `Err` is a hard failure the surrounding server must handle
	/// itself.
	pub async fn search<U: UpstreamSession, S: ResultSink>(
		&self,
		upstream: &mut U,
		sink: &mut S,
		request: &SearchRequest,
		abandon: &AbandonFlag,
	) -> Result<SearchDisposition, Error> {
		// Administrative limits come first; a rejected request never
		// reaches the remote server.
		let Some((time_limit, size_limit)) = self.check_limits(request) else {
			sink.deliver_result(LdapResultCode::AdminLimitExceeded, "", "", 0);
			return Ok(SearchDisposition::Completed {
				code: LdapResultCode::AdminLimitExceeded,
				entries: 0,
			});
		};

		// Rewrite the base and the filter into the remote naming context.
		let base =
			match rewrite::apply(&*self.rewriter, RewriteContext::SearchBase, &request.base) {
				Ok(base) => base,
				Err(err) => {
					return Err(reject_rewrite(sink, RewriteContext::SearchBase, err, 0));
				}
			};
		let filter = match rewrite::apply(
			&*self.rewriter,
			RewriteContext::SearchFilter,
			&request.filter_str,
		) {
			// An empty replacement counts as declined.
			Ok(Cow::Owned(replaced)) if replaced.is_empty() => {
				Cow::Borrowed(request.filter_str.as_str())
			}
			Ok(filter) => filter,
			Err(err) => {
				return Err(reject_rewrite(sink, RewriteContext::SearchFilter, err, 0));
			}
		};

		// Map names into the remote schema.
		let mapped_filter = filter::map_filter(filter.as_ref(), &self.at_map, &self.oc_map);
		let attrs = self.at_map.project_attrs(&request.attrs);
		debug!(
			base = base.as_ref(),
			filter = mapped_filter.as_ref(),
			?attrs,
			"issuing remote search"
		);

		upstream.set_search_options(RemoteSearchOptions {
			deref: request.deref.clone(),
			time_limit: (time_limit != -1).then_some(time_limit),
			size_limit: (size_limit != -1).then_some(size_limit),
			types_only: request.attrs_only,
		});
		upstream.ensure_bound().await.map_err(Error::Bind)?;

		let mut stream =
			match upstream.search(&base, request.scope.clone(), &mapped_filter, attrs).await {
				Ok(stream) => stream,
				Err(err) => {
					// Failure to issue is answered like any upstream error.
					sink.deliver_result(err.code.clone(), "", &err.message, 0);
					return Ok(SearchDisposition::Completed { code: err.code, entries: 0 });
				}
			};

		// Pump the stream, re-checking the abandon flag between polls.
		let translator =
			EntryTranslator::new(&self.at_map, &self.oc_map, &self.schema, &*self.rewriter);
		let mut entries = 0_usize;
		let outcome = loop {
			if abandon.is_set() {
				debug!("search abandoned by caller");
				stream.abandon().await;
				return Ok(SearchDisposition::Abandoned);
			}
			match stream.poll_next().await {
				Ok(StreamEvent::Idle) => tokio::task::yield_now().await,
				Ok(StreamEvent::Entry(wire)) => match translator.translate(&wire) {
					Ok(entry) => {
						sink.emit_entry(&entry, &request.attrs, request.attrs_only);
						entries += 1;
					}
					Err(err) => debug!(error = %err, "entry translation failed"),
				},
				Ok(StreamEvent::Done) => break stream.finish().await,
				Err(err) => {
					sink.deliver_result(err.code.clone(), "", &err.message, entries);
					return Ok(SearchDisposition::Completed { code: err.code, entries });
				}
			}
		};

		// Rewrite the matched DN of the terminal result, if there is one.
		let code = map_result_code(outcome.rc);
		let matched = if outcome.matched.is_empty() {
			Cow::Borrowed("")
		} else {
			match rewrite::apply(&*self.rewriter, RewriteContext::MatchedDn, &outcome.matched) {
				Ok(matched) => matched,
				Err(err) => {
					return Err(reject_rewrite(sink, RewriteContext::MatchedDn, err, entries));
				}
			}
		};

		sink.deliver_result(code.clone(), &matched, &outcome.text, entries);
		Ok(SearchDisposition::Completed { code, entries })
	}

	/// Apply the limit policy, returning the effective time and size
	/// limits, or `None` when the request must be rejected.
	fn check_limits(&self, request: &SearchRequest) -> Option<(i32, i32)> {
		if request.caller.privileged {
			return Some((request.time_limit, request.size_limit));
		}
		let limits = self.limits.limits_for(&request.caller.dn);
		let time_limit = match limits.check_time(request.time_limit) {
			LimitCheck::Use(limit) => limit,
			LimitCheck::Exceeded => return None,
		};
		let size_limit = match limits.check_size(request.size_limit) {
			LimitCheck::Use(limit) => limit,
			LimitCheck::Exceeded => return None,
		};
		Some((time_limit, size_limit))
	}
}

/// Deliver the result a rewrite verdict maps to and build the matching
/// hard failure.
fn reject_rewrite<S: ResultSink>(
	sink: &mut S,
	context: RewriteContext,
	kind: RewriteError,
	entries: usize,
) -> Error {
	let (code, text) = match kind {
		RewriteError::Unwilling => (LdapResultCode::UnwillingToPerform, "Unwilling to perform"),
		RewriteError::Failed => (LdapResultCode::OperationsError, "Operations error"),
	};
	sink.deliver_result(code, "", text, entries);
	Error::Rewrite { context, source: kind }
}
