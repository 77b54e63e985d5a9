//! Configuration of the proxy backend.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{limits::LimitRule, schema::MapConfig};

/// Poll interval of the result pump when none is configured, in
/// milliseconds.
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Configuration of one proxy backend.
///
/// The configuration is read once and compiled into an immutable
/// [`ProxyBackend`](crate::ProxyBackend) that concurrent requests share.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyConfig {
	/// The remote server this backend proxies to.
	pub upstream: UpstreamConfig,
	/// Attribute type names that differ between the two schemas.
	#[serde(default)]
	pub attribute_map: MapConfig,
	/// Object class names that differ between the two schemas.
	#[serde(default)]
	pub objectclass_map: MapConfig,
	/// DN rewrite strategy between the naming contexts.
	#[serde(default)]
	pub rewrite: RewriteConfig,
	/// Administrative limit rules. The first matching rule wins.
	#[serde(default)]
	pub limits: Vec<LimitRule>,
}

/// Where and how to reach the remote server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamConfig {
	/// URL of the remote server. Supports ldap, ldaps, and ldapi schemes.
	/// The connection pool dials it; it lives here so that one document
	/// configures the whole backend.
	pub url: Url,
	/// Identity to bind lent connections with, when they arrive unbound.
	#[serde(default)]
	pub bind: Option<BindCredentials>,
	/// Poll interval of the result pump in milliseconds.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
}

impl UpstreamConfig {
	/// The poll interval as a [`Duration`].
	#[must_use]
	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}
}

/// Serde default for the poll interval.
fn default_poll_interval_ms() -> u64 {
	DEFAULT_POLL_INTERVAL_MS
}

/// A simple bind identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BindCredentials {
	/// The DN to bind as.
	pub dn: String,
	/// The bind password.
	pub password: String,
}

/// Selection of the DN rewrite strategy.
///
/// Backends embedding a full rewrite engine plug it in through
/// [`ProxyBackend::with_rewriter`](crate::ProxyBackend::with_rewriter)
/// instead.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum RewriteConfig {
	/// Leave DNs alone.
	#[default]
	None,
	/// Flip between a local and a remote suffix.
	Suffix {
		/// Suffix of the local naming context.
		local: String,
		/// Suffix of the remote naming context.
		remote: String,
	},
}

impl ProxyConfig {
	/// Returns an example configuration.
	#[allow(dead_code)]
	pub(crate) fn example() -> Self {
		ProxyConfig {
			upstream: UpstreamConfig {
				url: Url::parse("ldap://remote.example.net").expect("static url"),
				bind: Some(BindCredentials {
					dn: "cn=proxy,dc=backend,dc=net".to_owned(),
					password: "verysecret".to_owned(),
				}),
				poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
			},
			attribute_map: MapConfig {
				entries: [("uid".to_owned(), "userId".to_owned())].into_iter().collect(),
				passthrough: true,
			},
			objectclass_map: MapConfig {
				entries: [("inetOrgPerson".to_owned(), "remotePerson".to_owned())]
					.into_iter()
					.collect(),
				passthrough: false,
			},
			rewrite: RewriteConfig::Suffix {
				local: "dc=example,dc=com".to_owned(),
				remote: "dc=backend,dc=net".to_owned(),
			},
			limits: Vec::new(),
		}
	}
}
