//! Rendering and translation of search filters.
//!
//! The local server hands the proxy a structured filter, while the upstream
//! client consumes RFC 4515 string filters. Rendering happens first, then
//! the rewrite engine sees the caller's filter string, and finally
//! attribute names (and object-class assertion values) are translated into
//! the remote namespace on the string form.

use std::borrow::Cow;

use ldap3::ldap_escape;
use ldap3_proto::LdapFilter;

use crate::schema::{is_objectclass, MapDirection, Mapped, NameMap};

/// Render a structured filter to its RFC 4515 string form.
///
/// Returns `None` for constructs the proxy cannot forward as a string,
/// which the caller reports as a protocol error.
#[must_use]
pub fn filter_string(filter: &LdapFilter) -> Option<String> {
	let mut out = String::new();
	write_filter(&mut out, filter)?;
	Some(out)
}

/// Append one filter node to `out`.
fn write_filter(out: &mut String, filter: &LdapFilter) -> Option<()> {
	match filter {
		LdapFilter::And(parts) => write_set(out, '&', parts)?,
		LdapFilter::Or(parts) => write_set(out, '|', parts)?,
		LdapFilter::Not(inner) => {
			out.push_str("(!");
			write_filter(out, inner)?;
			out.push(')');
		}
		LdapFilter::Equality(attr, value) => write_assertion(out, attr, "=", value),
		LdapFilter::Present(attr) => {
			out.push('(');
			out.push_str(attr);
			out.push_str("=*)");
		}
		LdapFilter::Substring(attr, sub) => {
			out.push('(');
			out.push_str(attr);
			out.push('=');
			if let Some(initial) = &sub.initial {
				out.push_str(&ldap_escape(initial.as_str()));
			}
			out.push('*');
			for any in &sub.any {
				out.push_str(&ldap_escape(any.as_str()));
				out.push('*');
			}
			if let Some(final_) = &sub.final_ {
				out.push_str(&ldap_escape(final_.as_str()));
			}
			out.push(')');
		}
		LdapFilter::GreaterOrEqual(attr, value) => write_assertion(out, attr, ">=", value),
		LdapFilter::LessOrEqual(attr, value) => write_assertion(out, attr, "<=", value),
		LdapFilter::Approx(attr, value) => write_assertion(out, attr, "~=", value),
		// Extensible matches and anything newer are not forwarded.
		_ => return None,
	}
	Some(())
}

/// Append an `(&...)` or `(|...)` set. An empty set renders as written,
/// which RFC 4526 defines as absolute true/false.
fn write_set(out: &mut String, op: char, parts: &[LdapFilter]) -> Option<()> {
	out.push('(');
	out.push(op);
	for part in parts {
		write_filter(out, part)?;
	}
	out.push(')');
	Some(())
}

/// Append a simple `(attr OP value)` assertion with value escaping.
fn write_assertion(out: &mut String, attr: &str, op: &str, value: &str) {
	out.push('(');
	out.push_str(attr);
	out.push_str(op);
	out.push_str(&ldap_escape(value));
	out.push(')');
}

/// Translate attribute names, and object-class assertion values, from the
/// local to the remote namespace inside a rendered filter string.
///
/// Unmapped names stay in place; a term cannot be dropped from a boolean
/// expression without changing its meaning. `Cow::Borrowed` means nothing
/// needed translation.
#[must_use]
pub fn map_filter<'a>(filter: &'a str, at_map: &NameMap, oc_map: &NameMap) -> Cow<'a, str> {
	let mut out = String::with_capacity(filter.len());
	let mut changed = false;
	let mut rest = filter;
	while let Some(pos) = rest.find('(') {
		out.push_str(&rest[..=pos]);
		rest = &rest[pos + 1..];
		match rest.chars().next() {
			Some('&' | '|' | '!') | None => continue,
			Some(_) => {}
		}
		let end = rest.find(|c: char| "=<>~:()".contains(c)).unwrap_or(rest.len());
		let name = &rest[..end];
		match at_map.map(name, MapDirection::LocalToRemote) {
			Mapped::Renamed(remote) => {
				out.push_str(remote);
				changed = true;
			}
			Mapped::Unchanged | Mapped::Dropped => out.push_str(name),
		}
		rest = &rest[end..];
		if !is_objectclass(name) {
			continue;
		}
		// Map the asserted object-class value, but only a plain one: a
		// value with wildcards is not a class name.
		if let Some(value_rest) = rest.strip_prefix('=') {
			out.push('=');
			rest = value_rest;
			let value_end =
				value_rest.find(|c: char| c == ')' || c == '*').unwrap_or(value_rest.len());
			let value = &value_rest[..value_end];
			if !value.is_empty() && value_rest[value_end..].starts_with(')') {
				match oc_map.map(value, MapDirection::LocalToRemote) {
					Mapped::Renamed(remote) => {
						out.push_str(remote);
						changed = true;
					}
					Mapped::Unchanged | Mapped::Dropped => out.push_str(value),
				}
				rest = &value_rest[value_end..];
			}
		}
	}
	out.push_str(rest);
	if changed {
		Cow::Owned(out)
	} else {
		Cow::Borrowed(filter)
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use std::borrow::Cow;

	use ldap3_proto::{proto::LdapSubstringFilter, LdapFilter};

	use super::{filter_string, map_filter};
	use crate::schema::{MapConfig, NameMap};

	#[test]
	fn renders_nested_boolean_filters() {
		let filter = LdapFilter::And(vec![
			LdapFilter::Equality("objectClass".to_owned(), "person".to_owned()),
			LdapFilter::Or(vec![
				LdapFilter::Present("mail".to_owned()),
				LdapFilter::Not(Box::new(LdapFilter::Equality(
					"uid".to_owned(),
					"root".to_owned(),
				))),
			]),
		]);
		assert_eq!(
			filter_string(&filter).unwrap(),
			"(&(objectClass=person)(|(mail=*)(!(uid=root))))"
		);
	}

	#[test]
	fn renders_substrings_and_escapes_values() {
		let filter = LdapFilter::And(vec![
			LdapFilter::Equality("cn".to_owned(), "a*b(c)".to_owned()),
			LdapFilter::Substring(
				"sn".to_owned(),
				LdapSubstringFilter {
					initial: Some("Mc".to_owned()),
					any: vec!["a".to_owned()],
					final_: Some("son".to_owned()),
				},
			),
		]);
		let expected = format!("(&(cn={})(sn=Mc*a*son))", ldap3::ldap_escape("a*b(c)"));
		assert_eq!(filter_string(&filter).unwrap(), expected);
	}

	#[test]
	fn renders_empty_and_as_absolute_true() {
		assert_eq!(filter_string(&LdapFilter::And(vec![])).unwrap(), "(&)");
	}

	/// Maps used by the translation tests.
	fn maps() -> (NameMap, NameMap) {
		let at_map = NameMap::new(&MapConfig {
			entries: [("uid".to_owned(), "userId".to_owned())].into_iter().collect(),
			passthrough: false,
		})
		.unwrap();
		let oc_map = NameMap::new(&MapConfig {
			entries: [("inetOrgPerson".to_owned(), "remotePerson".to_owned())]
				.into_iter()
				.collect(),
			passthrough: false,
		})
		.unwrap();
		(at_map, oc_map)
	}

	#[test]
	fn translates_attribute_names_and_object_class_values() {
		let (at_map, oc_map) = maps();
		let mapped = map_filter(
			"(&(objectClass=inetOrgPerson)(uid=jdoe)(cn=Jane*))",
			&at_map,
			&oc_map,
		);
		assert_eq!(mapped, "(&(objectClass=remotePerson)(userId=jdoe)(cn=Jane*))");
	}

	#[test]
	fn untranslated_filter_is_borrowed() {
		let (at_map, oc_map) = maps();
		let filter = "(&(cn=Jane)(sn=Doe))";
		let mapped = map_filter(filter, &at_map, &oc_map);
		assert!(matches!(mapped, Cow::Borrowed(_)));
	}

	#[test]
	fn wildcard_object_class_values_stay_untouched() {
		let (at_map, oc_map) = maps();
		let mapped = map_filter("(objectClass=inet*)", &at_map, &oc_map);
		assert!(matches!(mapped, Cow::Borrowed(_)));
	}
}
