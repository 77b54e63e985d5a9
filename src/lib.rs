//! Search proxying for an LDAP directory gateway.
//!
//! This crate implements the search path of a proxy backend: a search
//! request arriving at a local directory server is checked against
//! administrative limits, its base DN and filter string are rewritten into
//! the remote naming context, attribute and object class names are mapped
//! into the remote schema, and the search is issued over a lent upstream
//! connection. Entries stream back through the reverse translation and are
//! handed to the local server as if they originated there.
//!
//! Connection pooling, authentication policy and the local server's
//! protocol handling stay outside this crate; they meet it at the
//! [`UpstreamSession`](session::UpstreamSession) and [`ResultSink`] seams.
//! The [`ldap3`] crate speaks to the remote server, the local data model
//! is the one of [`ldap3_proto`].
//!
//! # Getting started
//! Proxying a single request might look like so:
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use ldap_proxy::{
//! 	config::{ProxyConfig, RewriteConfig, UpstreamConfig},
//! 	entry::TranslatedEntry,
//! 	schema::MapConfig,
//! 	session::LdapUpstream,
//! 	AbandonFlag, Caller, ProxyBackend, ResultSink, SearchRequest,
//! };
//! use ldap3_proto::{
//! 	proto::{LdapDerefAliases, LdapSearchRequest, LdapSearchScope},
//! 	LdapFilter, LdapResultCode,
//! };
//! use url::Url;
//!
//! /// Prints what the proxy would hand to the local server.
//! struct PrintSink;
//!
//! impl ResultSink for PrintSink {
//! 	fn emit_entry(&mut self, entry: &TranslatedEntry, _: &[String], _: bool) {
//! 		println!("entry: {}", entry.dn);
//! 	}
//!
//! 	fn deliver_result(&mut self, code: LdapResultCode, _: &str, _: &str, count: usize) {
//! 		println!("result: {code:?} after {count} entries");
//! 	}
//! }
//!
//! // Configuration can also be deserialized with serde. It's
//! // hand-constructed here for demonstration purposes.
//! let config = ProxyConfig {
//! 	upstream: UpstreamConfig {
//! 		url: Url::parse("ldap://remote.example.net")?,
//! 		bind: None,
//! 		poll_interval_ms: 100,
//! 	},
//! 	attribute_map: MapConfig::default(),
//! 	objectclass_map: MapConfig::default(),
//! 	rewrite: RewriteConfig::Suffix {
//! 		local: "dc=example,dc=com".to_owned(),
//! 		remote: "dc=backend,dc=net".to_owned(),
//! 	},
//! 	limits: Vec::new(),
//! };
//! let backend = ProxyBackend::new(&config)?;
//!
//! // Borrow a connection for this request; a pool would normally own it.
//! let (conn, ldap) = ldap3::LdapConnAsync::new(config.upstream.url.as_str()).await?;
//! tokio::spawn(async move {
//! 	if let Err(err) = conn.drive().await {
//! 		eprintln!("connection error: {err}");
//! 	}
//! });
//! let mut upstream = LdapUpstream::new(ldap, None, config.upstream.poll_interval());
//!
//! let request = SearchRequest::from_proto(
//! 	LdapSearchRequest {
//! 		base: "ou=people,dc=example,dc=com".to_owned(),
//! 		scope: LdapSearchScope::Subtree,
//! 		aliases: LdapDerefAliases::Never,
//! 		sizelimit: 0,
//! 		timelimit: 0,
//! 		typesonly: false,
//! 		filter: LdapFilter::Equality("objectClass".to_owned(), "inetOrgPerson".to_owned()),
//! 		attrs: vec!["cn".to_owned(), "mail".to_owned()],
//! 	},
//! 	Caller::new("uid=someone,ou=people,dc=example,dc=com", false),
//! )?;
//!
//! let mut sink = PrintSink;
//! backend.search(&mut upstream, &mut sink, &request, &AbandonFlag::new()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//! * Extensible-match filter elements are not forwarded; requests carrying
//!   them are rejected before any remote call.
//! * A per-value DN rewrite failure leaves the value unchanged while an
//!   entry-DN rewrite failure drops the whole entry. The asymmetry is
//!   deliberate, matching established proxy behaviour.

pub mod config;
pub mod entry;
pub mod error;
pub mod filter;
pub mod limits;
mod proxy;
pub mod rewrite;
pub mod schema;
pub mod session;

pub use ldap3::{self, SearchEntry};
pub use ldap3_proto;

pub use crate::{
	config::{BindCredentials, ProxyConfig, RewriteConfig, UpstreamConfig},
	error::{Error, UpstreamError},
	proxy::{AbandonFlag, Caller, ProxyBackend, ResultSink, SearchDisposition, SearchRequest},
};
