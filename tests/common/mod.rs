//! Scripted collaborators standing in for the remote server and the local
//! result delivery path.

use std::{
	collections::{HashMap, VecDeque},
	sync::{Arc, Mutex},
};

use async_trait::async_trait;
use ldap3::SearchEntry;
use ldap3_proto::{proto::LdapSearchScope, LdapResultCode, LdapSearchResultEntry};
use ldap_proxy::{
	entry::TranslatedEntry,
	error::UpstreamError,
	session::{
		RemoteSearchOptions, StreamEvent, UpstreamOutcome, UpstreamSession, UpstreamStream,
	},
	AbandonFlag, ResultSink,
};

/// One scripted reaction of the remote stream to a poll.
pub enum ScriptedPoll {
	/// Nothing arrives within the poll interval.
	Idle,
	/// An entry message.
	Entry(SearchEntry),
	/// A transport failure.
	Fail(UpstreamError),
}

/// One search as the upstream saw it issued.
pub struct IssuedSearch {
	pub base: String,
	pub filter: String,
	pub attrs: Vec<String>,
}

/// Everything observable about how the proxy drove the upstream session.
#[derive(Default)]
pub struct UpstreamLog {
	pub bound: bool,
	pub options: Option<RemoteSearchOptions>,
	pub issued: Vec<IssuedSearch>,
	pub abandoned: bool,
	pub finished: bool,
}

/// A scripted stand-in for the remote directory server.
pub struct MockUpstream {
	log: Arc<Mutex<UpstreamLog>>,
	script: Vec<ScriptedPoll>,
	outcome: UpstreamOutcome,
	fail_bind: bool,
	fail_search: Option<UpstreamError>,
}

impl MockUpstream {
	/// An upstream that plays `script` and then finishes with `outcome`.
	pub fn new(script: Vec<ScriptedPoll>, outcome: UpstreamOutcome) -> Self {
		MockUpstream {
			log: Arc::new(Mutex::new(UpstreamLog::default())),
			script,
			outcome,
			fail_bind: false,
			fail_search: None,
		}
	}

	/// An upstream that plays `script` and finishes successfully.
	pub fn with_success(script: Vec<ScriptedPoll>) -> Self {
		MockUpstream::new(script, UpstreamOutcome::default())
	}

	/// Make `ensure_bound` fail.
	pub fn failing_bind(mut self) -> Self {
		self.fail_bind = true;
		self
	}

	/// Make issuing the search fail.
	pub fn failing_search(mut self, err: UpstreamError) -> Self {
		self.fail_search = Some(err);
		self
	}

	/// Handle on the observable record.
	pub fn log(&self) -> Arc<Mutex<UpstreamLog>> {
		Arc::clone(&self.log)
	}
}

#[async_trait]
impl UpstreamSession for MockUpstream {
	async fn ensure_bound(&mut self) -> Result<(), UpstreamError> {
		if self.fail_bind {
			return Err(UpstreamError::from_code(LdapResultCode::InvalidCredentials));
		}
		self.log.lock().unwrap().bound = true;
		Ok(())
	}

	fn set_search_options(&mut self, options: RemoteSearchOptions) {
		self.log.lock().unwrap().options = Some(options);
	}

	async fn search(
		&mut self,
		base: &str,
		_scope: LdapSearchScope,
		filter: &str,
		attrs: Vec<String>,
	) -> Result<Box<dyn UpstreamStream>, UpstreamError> {
		if let Some(err) = self.fail_search.take() {
			return Err(err);
		}
		self.log.lock().unwrap().issued.push(IssuedSearch {
			base: base.to_owned(),
			filter: filter.to_owned(),
			attrs,
		});
		Ok(Box::new(MockStream {
			script: std::mem::take(&mut self.script).into(),
			outcome: self.outcome.clone(),
			log: Arc::clone(&self.log),
		}))
	}
}

/// The stream half of [`MockUpstream`].
struct MockStream {
	script: VecDeque<ScriptedPoll>,
	outcome: UpstreamOutcome,
	log: Arc<Mutex<UpstreamLog>>,
}

#[async_trait]
impl UpstreamStream for MockStream {
	async fn poll_next(&mut self) -> Result<StreamEvent, UpstreamError> {
		match self.script.pop_front() {
			None => Ok(StreamEvent::Done),
			Some(ScriptedPoll::Idle) => Ok(StreamEvent::Idle),
			Some(ScriptedPoll::Entry(entry)) => Ok(StreamEvent::Entry(entry)),
			Some(ScriptedPoll::Fail(err)) => Err(err),
		}
	}

	async fn finish(&mut self) -> UpstreamOutcome {
		self.log.lock().unwrap().finished = true;
		self.outcome.clone()
	}

	async fn abandon(&mut self) {
		self.log.lock().unwrap().abandoned = true;
	}
}

/// The terminal result as the local server would receive it.
pub struct DeliveredResult {
	pub code: LdapResultCode,
	pub matched_dn: String,
	pub text: String,
	pub entry_count: usize,
}

/// Records everything the proxy delivers. Optionally raises the abandon
/// flag once a number of entries have been emitted, mimicking a client
/// abandoning mid-stream.
#[derive(Default)]
pub struct RecordingSink {
	pub entries: Vec<LdapSearchResultEntry>,
	pub result: Option<DeliveredResult>,
	pub abandon_after: Option<(usize, AbandonFlag)>,
}

impl RecordingSink {
	pub fn new() -> Self {
		RecordingSink::default()
	}
}

impl ResultSink for RecordingSink {
	fn emit_entry(&mut self, entry: &TranslatedEntry, projection: &[String], attrs_only: bool) {
		self.entries.push(entry.to_result_entry(projection, attrs_only));
		if let Some((after, flag)) = &self.abandon_after {
			if self.entries.len() >= *after {
				flag.set();
			}
		}
	}

	fn deliver_result(
		&mut self,
		code: LdapResultCode,
		matched_dn: &str,
		text: &str,
		entry_count: usize,
	) {
		assert!(self.result.is_none(), "deliver_result must be called at most once");
		self.result = Some(DeliveredResult {
			code,
			matched_dn: matched_dn.to_owned(),
			text: text.to_owned(),
			entry_count,
		});
	}
}

/// A wire entry as the remote server would return it.
pub fn remote_entry(uid: &str) -> SearchEntry {
	SearchEntry {
		dn: format!("uid={uid},ou=people,dc=backend,dc=net"),
		attrs: HashMap::from([
			(
				"objectClass".to_owned(),
				vec!["remotePerson".to_owned(), "remoteOnlyClass".to_owned()],
			),
			("userId".to_owned(), vec![uid.to_owned()]),
			("cn".to_owned(), vec![format!("User {uid}")]),
		]),
		bin_attrs: HashMap::new(),
	}
}
