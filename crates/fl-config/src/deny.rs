//! Deny-list matching for class names.
//!
//! A plain entry is an internal-name prefix (`com/acme/internal/`). An entry
//! containing `*` or `?` is a glob over the whole internal name: `*` matches
//! any run of characters (including `/`), `?` exactly one.

use crate::validate::{ValidationError, ValidationResult};
use regex::Regex;

#[derive(Debug, Clone)]
enum DenyRule {
    Prefix(String),
    Pattern(Regex),
}

/// Compiled deny-list.
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    rules: Vec<DenyRule>,
}

impl DenyList {
    /// Compile entries into prefix and pattern rules.
    pub fn compile<S: AsRef<str>>(entries: &[S]) -> ValidationResult<Self> {
        let mut rules = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: format!("deny[{idx}]"),
                    message: "entry must not be empty".to_string(),
                });
            }
            if entry.contains(['*', '?']) {
                let regex = Regex::new(&glob_to_regex(entry)).map_err(|e| {
                    ValidationError::InvalidValue {
                        field: format!("deny[{idx}]"),
                        message: format!("bad pattern '{entry}': {e}"),
                    }
                })?;
                rules.push(DenyRule::Pattern(regex));
            } else {
                // Accept dotted prefixes as a convenience.
                rules.push(DenyRule::Prefix(entry.replace('.', "/")));
            }
        }
        Ok(Self { rules })
    }

    /// Whether the internal class name is denied.
    pub fn is_denied(&self, internal_name: &str) -> bool {
        self.rules.iter().any(|rule| match rule {
            DenyRule::Prefix(prefix) => internal_name.starts_with(prefix.as_str()),
            DenyRule::Pattern(regex) => regex.is_match(internal_name),
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_entries_match_by_prefix() {
        let list = DenyList::compile(&["java/", "org/junit/"]).unwrap();
        assert!(list.is_denied("java/lang/String"));
        assert!(list.is_denied("org/junit/Assert"));
        assert!(!list.is_denied("com/acme/java/Thing"));
    }

    #[test]
    fn dotted_prefix_is_normalized() {
        let list = DenyList::compile(&["com.acme.internal."]).unwrap();
        assert!(list.is_denied("com/acme/internal/Cache"));
    }

    #[test]
    fn glob_entries_are_anchored() {
        let list = DenyList::compile(&["com/acme/*Test", "com/acme/Gen?"]).unwrap();
        assert!(list.is_denied("com/acme/RepoTest"));
        assert!(list.is_denied("com/acme/deep/RepoTest"));
        assert!(!list.is_denied("com/acme/RepoTestHelper"));
        assert!(list.is_denied("com/acme/Gen1"));
        assert!(!list.is_denied("com/acme/Gen12"));
    }

    #[test]
    fn glob_escapes_regex_metacharacters() {
        let list = DenyList::compile(&["com/acme/a+b*"]).unwrap();
        assert!(list.is_denied("com/acme/a+bc"));
        assert!(!list.is_denied("com/acme/aabc"));
    }

    #[test]
    fn empty_entry_is_rejected() {
        let err = DenyList::compile(&["java/", "  "]).unwrap_err();
        assert!(err.to_string().contains("deny[1]"));
    }
}
