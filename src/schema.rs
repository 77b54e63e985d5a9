//! Mapping of attribute and object-class names between schemas.
//!
//! The local and remote servers may publish the same data under different
//! attribute type and object class names. Each direction of each map is
//! one-to-one; lookups are case-insensitive, as LDAP short names are.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;

/// The OID sequence requesting no attributes at all, RFC 4511 4.5.1.8.
pub const NO_ATTRIBUTES: &str = "1.1";

/// Direction of a name mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapDirection {
	/// Local schema namespace to remote, applied on the request side.
	LocalToRemote,
	/// Remote schema namespace to local, applied to returned results.
	RemoteToLocal,
}

/// Outcome of looking up one name.
///
/// `Unchanged` and `Dropped` are distinct on purpose: whether an unmapped
/// name survives is a per-map policy, and attribute-list projection must be
/// able to omit dropped names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mapped<'a> {
	/// The name has a mapping; use the replacement spelling.
	Renamed(&'a str),
	/// The name passes through unchanged.
	Unchanged,
	/// The name has no mapping and the map drops unknown names.
	Dropped,
}

/// Configuration of one name map.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MapConfig {
	/// Pairs of local name to remote name.
	#[serde(default)]
	pub entries: HashMap<String, String>,
	/// Pass unknown names through instead of dropping them.
	#[serde(default)]
	pub passthrough: bool,
}

/// A bidirectional, case-insensitive name map.
///
/// An empty map passes every name through unchanged regardless of policy,
/// so an unconfigured backend is transparent.
#[derive(Debug, Default)]
pub struct NameMap {
	/// Lower-cased local name to remote spelling.
	to_remote: HashMap<String, String>,
	/// Lower-cased remote name to local spelling.
	to_local: HashMap<String, String>,
	/// Whether unknown names pass through.
	passthrough: bool,
}

impl NameMap {
	/// Build a map from configuration.
	///
	/// Fails if two local names map to the same remote name, since result
	/// translation could not then pick a unique local spelling.
	pub fn new(config: &MapConfig) -> Result<Self, Error> {
		let mut to_remote = HashMap::with_capacity(config.entries.len());
		let mut to_local = HashMap::with_capacity(config.entries.len());
		for (local, remote) in &config.entries {
			to_remote.insert(local.to_ascii_lowercase(), remote.clone());
			if to_local.insert(remote.to_ascii_lowercase(), local.clone()).is_some() {
				return Err(Error::Config(format!(
					"name map is not one-to-one: duplicate remote name {remote:?}"
				)));
			}
		}
		Ok(NameMap { to_remote, to_local, passthrough: config.passthrough })
	}

	/// Look up one name.
	#[must_use]
	pub fn map<'a>(&'a self, name: &str, direction: MapDirection) -> Mapped<'a> {
		if self.to_remote.is_empty() {
			return Mapped::Unchanged;
		}
		let table = match direction {
			MapDirection::LocalToRemote => &self.to_remote,
			MapDirection::RemoteToLocal => &self.to_local,
		};
		match table.get(&name.to_ascii_lowercase()) {
			Some(replacement) => Mapped::Renamed(replacement),
			None if self.passthrough => Mapped::Unchanged,
			None => Mapped::Dropped,
		}
	}

	/// Project a requested attribute list into the remote namespace.
	///
	/// Dropped names are omitted. If everything was dropped the projection
	/// asks for no attributes at all rather than falling back to the
	/// server default of all attributes.
	#[must_use]
	pub fn project_attrs(&self, attrs: &[String]) -> Vec<String> {
		let mut projected = Vec::with_capacity(attrs.len());
		for attr in attrs {
			match self.map(attr, MapDirection::LocalToRemote) {
				Mapped::Renamed(remote) => projected.push(remote.to_owned()),
				Mapped::Unchanged => projected.push(attr.clone()),
				Mapped::Dropped => {
					debug!(attribute = attr.as_str(), "omitting unmapped attribute");
				}
			}
		}
		if !attrs.is_empty() && projected.is_empty() {
			projected.push(NO_ATTRIBUTES.to_owned());
		}
		projected
	}

	/// Translate returned object-class values into the local namespace.
	///
	/// Values without a local mapping are removed. This is the one place
	/// where values rather than names are mapped.
	#[must_use]
	pub fn translate_values(&self, values: Vec<String>) -> Vec<String> {
		values
			.into_iter()
			.filter_map(|value| match self.map(&value, MapDirection::RemoteToLocal) {
				Mapped::Renamed(local) => Some(local.to_owned()),
				Mapped::Unchanged => Some(value),
				Mapped::Dropped => {
					debug!(value = value.as_str(), "dropping unmapped object class value");
					None
				}
			})
			.collect()
	}
}

/// Whether a name denotes the object-class attribute.
pub(crate) fn is_objectclass(name: &str) -> bool {
	name.eq_ignore_ascii_case("objectclass")
}

/// Attribute value syntaxes the proxy distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeSyntax {
	/// Directory strings and everything else without special handling.
	DirectoryString,
	/// DN-valued attributes, whose values cross naming contexts.
	DistinguishedName,
}

/// A resolved attribute type descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeDescriptor {
	/// The local name, as it will appear in emitted entries.
	pub name: String,
	/// The value syntax.
	pub syntax: AttributeSyntax,
	/// Whether this is a best-effort descriptor for an undefined type.
	pub undefined: bool,
}

/// The local schema view used to resolve attribute descriptors.
#[derive(Debug)]
pub struct LocalSchema {
	/// Known attribute types, keyed by lower-cased name.
	attributes: HashMap<String, AttributeSyntax>,
}

impl LocalSchema {
	/// A schema knowing the common user-application attributes, with the
	/// standard DN-valued types tagged as such.
	#[must_use]
	pub fn with_defaults() -> Self {
		let mut schema = LocalSchema { attributes: HashMap::new() };
		for name in [
			"objectClass",
			"cn",
			"sn",
			"givenName",
			"displayName",
			"uid",
			"mail",
			"o",
			"ou",
			"dc",
			"description",
			"telephoneNumber",
		] {
			schema.insert(name, AttributeSyntax::DirectoryString);
		}
		for name in [
			"member",
			"uniqueMember",
			"owner",
			"manager",
			"secretary",
			"seeAlso",
			"memberOf",
			"distinguishedName",
		] {
			schema.insert(name, AttributeSyntax::DistinguishedName);
		}
		schema
	}

	/// Register an attribute type.
	pub fn insert(&mut self, name: &str, syntax: AttributeSyntax) {
		self.attributes.insert(name.to_ascii_lowercase(), syntax);
	}

	/// Resolve a descriptor for a name.
	///
	/// Unknown but well-formed names resolve to an undefined-type
	/// descriptor so the attribute is still returned best-effort. `None`
	/// means the name is unusable and the attribute must be skipped.
	#[must_use]
	pub fn resolve(&self, name: &str) -> Option<AttributeDescriptor> {
		if let Some(&syntax) = self.attributes.get(&name.to_ascii_lowercase()) {
			return Some(AttributeDescriptor { name: name.to_owned(), syntax, undefined: false });
		}
		if is_valid_attribute_description(name) {
			return Some(AttributeDescriptor {
				name: name.to_owned(),
				syntax: AttributeSyntax::DirectoryString,
				undefined: true,
			});
		}
		None
	}
}

/// Validate an attribute description per RFC 4512: a keystring or a numeric
/// OID, optionally followed by `;`-separated options.
fn is_valid_attribute_description(name: &str) -> bool {
	let mut parts = name.split(';');
	let Some(base) = parts.next() else {
		return false;
	};
	if !is_keystring(base) && !is_numeric_oid(base) {
		return false;
	}
	parts.all(is_keystring)
}

/// `ALPHA *( ALPHA / DIGIT / HYPHEN )`
fn is_keystring(s: &str) -> bool {
	let mut chars = s.chars();
	match chars.next() {
		Some(c) if c.is_ascii_alphabetic() => {}
		_ => return false,
	}
	chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Dotted decimal form, e.g. `2.5.4.3`.
fn is_numeric_oid(s: &str) -> bool {
	!s.is_empty() && s.split('.').all(|arc| !arc.is_empty() && arc.bytes().all(|b| b.is_ascii_digit()))
}
