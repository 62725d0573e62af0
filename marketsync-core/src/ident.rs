//! SQL identifiers.
//!
//! Identifiers reach statement text only as [`Ident`] values, and an `Ident`
//! can only come from two places: a row returned by the catalog, or a
//! configuration name that passed [`Ident::checked`]. Batch column names are
//! never quoted directly; they are first matched against catalog idents.

use std::fmt;
use thiserror::Error;

/// Postgres truncates identifiers beyond this many bytes.
pub const MAX_IDENT_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid identifier '{0}': expected [A-Za-z_][A-Za-z0-9_]* of at most 63 bytes")]
pub struct InvalidIdent(pub String);

/// A relation or column name that is safe to splice into SQL once quoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    /// Wrap a name exactly as the catalog reported it.
    pub(crate) fn from_catalog(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Validate a configured name.
    pub fn checked(name: &str) -> Result<Self, InvalidIdent> {
        if is_plain_identifier(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(InvalidIdent(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form with embedded quotes doubled.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0.replace('"', "\"\""))
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted())
    }
}

/// True for names made only of ASCII letters, digits and underscores that do
/// not start with a digit.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_IDENT_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `"namespace"."name"`.
pub fn qualified(namespace: &Ident, name: &Ident) -> String {
    format!("{}.{}", namespace.quoted(), name.quoted())
}

/// Comma-separated quoted column list.
pub fn quoted_list(columns: &[Ident]) -> String {
    columns
        .iter()
        .map(Ident::quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_doubles_embedded_quotes() {
        let ident = Ident::from_catalog("odd\"name");
        assert_eq!(ident.quoted(), "\"odd\"\"name\"");
    }

    #[test]
    fn checked_accepts_plain_names() {
        assert!(Ident::checked("ods").is_ok());
        assert!(Ident::checked("_snapshot_2").is_ok());
    }

    #[test]
    fn checked_rejects_injection_attempts() {
        assert!(Ident::checked("snapshot; DROP TABLE x").is_err());
        assert!(Ident::checked("1abc").is_err());
        assert!(Ident::checked("").is_err());
        assert!(Ident::checked(&"a".repeat(64)).is_err());
    }

    #[test]
    fn qualified_name_quotes_both_parts() {
        let ns = Ident::checked("ods").unwrap();
        let table = Ident::from_catalog("Watch List");
        assert_eq!(qualified(&ns, &table), "\"ods\".\"Watch List\"");
    }

    #[test]
    fn quoted_list_preserves_order() {
        let cols = vec![Ident::from_catalog("b"), Ident::from_catalog("a")];
        assert_eq!(quoted_list(&cols), "\"b\", \"a\"");
    }
}
