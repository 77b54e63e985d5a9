//! Translation of wire entries into the local representation.
//!
//! Each entry returned by the remote server has its DN rewritten into the
//! local naming context, its attribute names mapped into the local schema,
//! object-class values filtered, and DN-valued attribute values rewritten.
//! Translation failures stay local: a bad entry or attribute is skipped,
//! never fatal to the surrounding search.

use std::borrow::Cow;

use ldap3::SearchEntry;
use ldap3_proto::{LdapPartialAttribute, LdapSearchResultEntry};
use tracing::{debug, warn};

use crate::{
	rewrite::{self, normalize_dn, DnRewriter, RewriteContext, RewriteError},
	schema::{
		is_objectclass, AttributeDescriptor, AttributeSyntax, LocalSchema, MapDirection, Mapped,
		NameMap,
	},
};

/// One translated attribute: a resolved local descriptor and its values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslatedAttribute {
	/// The resolved local type descriptor.
	pub descriptor: AttributeDescriptor,
	/// The values, as octet strings.
	pub values: Vec<Vec<u8>>,
}

/// A remote entry translated into the local data model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslatedEntry {
	/// The entry DN, in the local naming context.
	pub dn: String,
	/// Normalized form of the DN.
	pub dn_normalized: String,
	/// The attributes, in name-sorted order so that translating the same
	/// wire entry twice yields structurally identical results.
	pub attributes: Vec<TranslatedAttribute>,
}

impl TranslatedEntry {
	/// Convert to the wire form emitted to the local server, applying the
	/// requested attribute projection and the attributes-only flag.
	#[must_use]
	pub fn to_result_entry(&self, projection: &[String], attrs_only: bool) -> LdapSearchResultEntry {
		let attributes = self
			.attributes
			.iter()
			.filter(|attr| is_projected(projection, &attr.descriptor.name))
			.map(|attr| LdapPartialAttribute {
				atype: attr.descriptor.name.clone(),
				vals: if attrs_only { Vec::new() } else { attr.values.clone() },
			})
			.collect();
		LdapSearchResultEntry { dn: self.dn.clone(), attributes }
	}
}

/// Whether a projection list selects the named attribute.
///
/// An empty list and the `*` marker select every attribute; the
/// no-attributes OID `1.1` selects none.
fn is_projected(projection: &[String], name: &str) -> bool {
	if projection.is_empty() {
		return true;
	}
	projection.iter().any(|requested| requested == "*" || requested.eq_ignore_ascii_case(name))
}

/// An entry whose translation had to be discarded.
#[derive(Debug, thiserror::Error)]
#[error("entry {dn:?} dropped, DN rewrite failed: {source}")]
pub struct TranslationError {
	/// The remote DN of the dropped entry.
	pub dn: String,
	/// The rewrite verdict that caused the drop.
	#[source]
	pub source: RewriteError,
}

/// Translates wire entries using the backend's shared schema and rewriter.
pub struct EntryTranslator<'a> {
	/// Attribute-name map, applied remote to local.
	at_map: &'a NameMap,
	/// Object-class map, applied to object-class values.
	oc_map: &'a NameMap,
	/// Local schema view for descriptor resolution.
	schema: &'a LocalSchema,
	/// The rewrite engine for DNs inside the entry.
	rewriter: &'a dyn DnRewriter,
}

impl std::fmt::Debug for EntryTranslator<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EntryTranslator").finish_non_exhaustive()
	}
}

impl<'a> EntryTranslator<'a> {
	/// Borrow the pieces needed for translating one search's entries.
	#[must_use]
	pub fn new(
		at_map: &'a NameMap,
		oc_map: &'a NameMap,
		schema: &'a LocalSchema,
		rewriter: &'a dyn DnRewriter,
	) -> Self {
		EntryTranslator { at_map, oc_map, schema, rewriter }
	}

	/// Translate one wire entry.
	///
	/// Fails only when the entry DN cannot be rewritten; everything below
	/// that is best-effort, skipping single attributes at worst.
	pub fn translate(&self, wire: &SearchEntry) -> Result<TranslatedEntry, TranslationError> {
		let dn = rewrite::apply(self.rewriter, RewriteContext::SearchEntryDn, &wire.dn)
			.map_err(|source| TranslationError { dn: wire.dn.clone(), source })?
			.into_owned();
		let dn_normalized = normalize_dn(&dn);

		let mut names: Vec<&String> = wire.attrs.keys().chain(wire.bin_attrs.keys()).collect();
		names.sort();
		names.dedup();

		let mut attributes = Vec::with_capacity(names.len());
		for name in names {
			let mapped: &str = match self.at_map.map(name, MapDirection::RemoteToLocal) {
				Mapped::Renamed(local) => local,
				Mapped::Unchanged => name,
				Mapped::Dropped => {
					debug!(attribute = name.as_str(), "skipping unmapped attribute");
					continue;
				}
			};
			let Some(descriptor) = self.schema.resolve(mapped) else {
				warn!(attribute = mapped, "unusable attribute type, skipping");
				continue;
			};

			let mut text_values = wire.attrs.get(name).cloned().unwrap_or_default();
			if is_objectclass(&descriptor.name) {
				text_values = self.oc_map.translate_values(text_values);
			} else if descriptor.syntax == AttributeSyntax::DistinguishedName {
				self.rewrite_dn_values(&mut text_values);
			}

			let mut values: Vec<Vec<u8>> =
				text_values.into_iter().map(String::into_bytes).collect();
			if let Some(bin_values) = wire.bin_attrs.get(name) {
				values.extend(bin_values.iter().cloned());
			}
			attributes.push(TranslatedAttribute { descriptor, values });
		}

		Ok(TranslatedEntry { dn, dn_normalized, attributes })
	}

	/// Rewrite each DN-syntax value independently. A value that fails to
	/// rewrite is passed on unchanged; whether that asymmetry with the
	/// entry-DN policy is right is an open question, but it is the
	/// established behaviour.
	fn rewrite_dn_values(&self, values: &mut Vec<String>) {
		for value in values {
			match rewrite::apply(self.rewriter, RewriteContext::DnValue, value) {
				Ok(Cow::Owned(replacement)) => *value = replacement,
				Ok(Cow::Borrowed(_)) => {}
				Err(err) => {
					debug!(value = value.as_str(), error = %err, "DN value left unrewritten");
				}
			}
		}
	}
}
