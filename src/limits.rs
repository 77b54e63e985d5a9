//! Administrative size and time limit policy.

use serde::{Deserialize, Serialize};

/// Administrative limits for one class of callers.
///
/// Limits follow the directory-server convention: a requested limit of `-1`
/// means "unspecified, defer to the remote server". A hard limit of zero
/// means the soft limit is also the hard limit, and a negative hard limit
/// means unlimited.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Limits {
	/// Soft size limit, substituted when a request exceeds a zero hard limit.
	#[serde(default)]
	pub size_soft: i32,
	/// Hard size limit.
	#[serde(default = "unlimited")]
	pub size_hard: i32,
	/// Soft time limit in seconds.
	#[serde(default)]
	pub time_soft: i32,
	/// Hard time limit in seconds.
	#[serde(default = "unlimited")]
	pub time_hard: i32,
}

/// Serde default for hard limits: unlimited.
fn unlimited() -> i32 {
	-1
}

impl Default for Limits {
	fn default() -> Self {
		Limits { size_soft: 0, size_hard: -1, time_soft: 0, time_hard: -1 }
	}
}

/// Outcome of checking one requested limit against an administrative pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitCheck {
	/// Forward this value to the remote server, `-1` meaning unspecified.
	Use(i32),
	/// The request exceeds a positive hard limit and must be rejected.
	Exceeded,
}

impl Limits {
	/// Check a requested size limit against this set.
	#[must_use]
	pub fn check_size(&self, requested: i32) -> LimitCheck {
		check(requested, self.size_soft, self.size_hard)
	}

	/// Check a requested time limit against this set.
	#[must_use]
	pub fn check_time(&self, requested: i32) -> LimitCheck {
		check(requested, self.time_soft, self.time_hard)
	}
}

/// Check one requested limit against a soft/hard pair.
///
/// Nothing happens unless the request exceeds the hard limit; in particular
/// an unspecified request (`-1`) is always forwarded unchanged.
fn check(requested: i32, soft: i32, hard: i32) -> LimitCheck {
	if requested > hard {
		if hard == 0 {
			return LimitCheck::Use(soft);
		}
		if hard > 0 {
			return LimitCheck::Exceeded;
		}
	}
	LimitCheck::Use(requested)
}

/// Which callers a limit rule applies to.
///
/// DN comparisons are made against the normalized caller DN.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPattern {
	/// Every caller.
	Any,
	/// A single caller, matched by exact DN.
	Exact(String),
	/// Every caller whose DN lies under the given suffix.
	Subtree(String),
}

/// One administrative limit rule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitRule {
	/// Which callers the rule applies to.
	pub pattern: LimitPattern,
	/// The limits for those callers.
	pub limits: Limits,
}

/// Ordered lookup table over limit rules. The first matching rule wins.
#[derive(Debug, Default)]
pub struct LimitTable {
	/// The rules, in configuration order.
	rules: Vec<LimitRule>,
}

impl LimitTable {
	/// Build a table from configured rules.
	#[must_use]
	pub fn new(rules: Vec<LimitRule>) -> Self {
		LimitTable { rules }
	}

	/// Limits applying to the given caller DN.
	///
	/// Falls back to an unlimited set when no rule matches, so a backend
	/// without limit configuration forwards requested limits untouched.
	#[must_use]
	pub fn limits_for(&self, caller_dn: &str) -> Limits {
		for rule in &self.rules {
			let matched = match &rule.pattern {
				LimitPattern::Any => true,
				LimitPattern::Exact(dn) => caller_dn.eq_ignore_ascii_case(dn),
				LimitPattern::Subtree(suffix) => dn_under_suffix(caller_dn, suffix),
			};
			if matched {
				return rule.limits;
			}
		}
		Limits::default()
	}
}

/// Whether `dn` equals `suffix` or ends in `,suffix`, ignoring ASCII case.
fn dn_under_suffix(dn: &str, suffix: &str) -> bool {
	if dn.len() == suffix.len() {
		return dn.eq_ignore_ascii_case(suffix);
	}
	if dn.len() > suffix.len() {
		let cut = dn.len() - suffix.len();
		if !dn.is_char_boundary(cut) {
			return false;
		}
		return dn.as_bytes()[cut - 1] == b',' && dn[cut..].eq_ignore_ascii_case(suffix);
	}
	false
}
