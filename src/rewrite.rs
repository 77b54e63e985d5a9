//! Rewriting of names that cross the local/remote naming contexts.
//!
//! Every DN or filter string moving between the local server and the remote
//! one passes through a [`DnRewriter`]. The engine either declines, which
//! leaves the caller holding the borrowed input, or produces an owned
//! replacement. Modelling this as [`Cow`] makes the ownership of each
//! boundary string explicit and releases replacements exactly once on every
//! exit path.

use std::{borrow::Cow, fmt};

use tracing::debug;

/// Where in the request/response cycle a string is being rewritten.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewriteContext {
	/// The base DN of an outgoing search request.
	SearchBase,
	/// The filter string of an outgoing search request.
	SearchFilter,
	/// The DN of an entry returned by the remote server.
	SearchEntryDn,
	/// The matched DN of the terminal search result.
	MatchedDn,
	/// A DN-syntax attribute value inside a returned entry.
	DnValue,
}

impl RewriteContext {
	/// The context tag handed to rewrite engines.
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			RewriteContext::SearchBase => "searchBase",
			RewriteContext::SearchFilter => "searchFilter",
			RewriteContext::SearchEntryDn => "searchEntryDN",
			RewriteContext::MatchedDn => "matchedDN",
			RewriteContext::DnValue => "searchAttrDN",
		}
	}

	/// Whether this context carries a string from the local side to the
	/// remote side. Response-side contexts translate the other way.
	#[must_use]
	pub fn is_request_side(self) -> bool {
		matches!(self, RewriteContext::SearchBase | RewriteContext::SearchFilter)
	}
}

impl fmt::Display for RewriteContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Why a rewrite produced no usable string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RewriteError {
	/// The engine refuses to handle the input. Reported to the caller as
	/// "unwilling to perform".
	#[error("unwilling to perform")]
	Unwilling,
	/// The engine failed. Reported to the caller as "operations error".
	#[error("rewrite engine failure")]
	Failed,
}

/// A rewrite engine translating identifiers between naming contexts.
///
/// Implementations must be cheap to call and safe to share across
/// concurrently executing requests.
pub trait DnRewriter: Send + Sync {
	/// Rewrite `input` for the given context.
	///
	/// `Cow::Borrowed` means the engine declined to change the string and
	/// the effective value is the input itself. `Cow::Owned` is a
	/// replacement owned by the caller.
	fn rewrite<'a>(
		&self,
		context: RewriteContext,
		input: &'a str,
	) -> Result<Cow<'a, str>, RewriteError>;
}

/// Run the engine and log any applied replacement.
pub(crate) fn apply<'a>(
	engine: &dyn DnRewriter,
	context: RewriteContext,
	input: &'a str,
) -> Result<Cow<'a, str>, RewriteError> {
	let rewritten = engine.rewrite(context, input)?;
	if let Cow::Owned(ref replacement) = rewritten {
		debug!(context = context.as_str(), input, replacement = replacement.as_str(), "rewrite");
	}
	Ok(rewritten)
}

/// An engine that never changes anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRewrite;

impl DnRewriter for NoRewrite {
	fn rewrite<'a>(
		&self,
		_context: RewriteContext,
		input: &'a str,
	) -> Result<Cow<'a, str>, RewriteError> {
		Ok(Cow::Borrowed(input))
	}
}

/// Suffix substitution between the local and remote naming contexts.
///
/// Request-side DNs have the local suffix replaced with the remote one,
/// response-side DNs the reverse. Filters are left alone; a suffix flip
/// cannot be applied to arbitrary assertion values.
#[derive(Clone, Debug)]
pub struct SuffixRewriter {
	/// Suffix of the local naming context, e.g. `dc=example,dc=com`.
	local: String,
	/// Suffix of the remote naming context.
	remote: String,
}

impl SuffixRewriter {
	/// Create a rewriter flipping between the two suffixes.
	#[must_use]
	pub fn new(local: &str, remote: &str) -> Self {
		SuffixRewriter { local: normalize_dn(local), remote: normalize_dn(remote) }
	}
}

impl DnRewriter for SuffixRewriter {
	fn rewrite<'a>(
		&self,
		context: RewriteContext,
		input: &'a str,
	) -> Result<Cow<'a, str>, RewriteError> {
		if context == RewriteContext::SearchFilter {
			return Ok(Cow::Borrowed(input));
		}
		let (from, to) = if context.is_request_side() {
			(&self.local, &self.remote)
		} else {
			(&self.remote, &self.local)
		};
		Ok(replace_suffix(input, from, to))
	}
}

/// Replace a trailing DN suffix, respecting component boundaries.
fn replace_suffix<'a>(dn: &'a str, from: &str, to: &str) -> Cow<'a, str> {
	let normalized = normalize_dn(dn);
	if normalized == from {
		return Cow::Owned(to.to_owned());
	}
	if normalized.len() > from.len() {
		let cut = normalized.len() - from.len();
		if normalized.is_char_boundary(cut)
			&& normalized.as_bytes()[cut - 1] == b','
			&& normalized[cut..] == *from
		{
			// Keep the caller's spelling of the leading components.
			let keep: usize = dn
				.char_indices()
				.filter(|(_, c)| *c == ',')
				.map(|(i, _)| i)
				.nth_back(from.matches(',').count())
				.unwrap_or(dn.len());
			let mut out = String::with_capacity(keep + 1 + to.len());
			out.push_str(&dn[..keep]);
			out.push(',');
			out.push_str(to);
			return Cow::Owned(out);
		}
	}
	Cow::Borrowed(dn)
}

/// Normalize a DN for comparison: lower-case it and strip whitespace around
/// the component separators.
#[must_use]
pub fn normalize_dn(dn: &str) -> String {
	dn.split(',')
		.map(|component| component.trim().to_ascii_lowercase())
		.collect::<Vec<_>>()
		.join(",")
}
