//! Module dependency declarations.
//!
//! A script source declares the aliases it imports via a recognizable top-of-file
//! call, e.g. `modules("a", "b")`. The engine extracts this set and checks it against
//! the creation config's `dependencies` map exactly (see [`crate::runtime::CreateConfig`]).

use std::collections::BTreeSet;
use std::fmt;

/// Failure extracting the `modules(...)` declaration from a source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleDeclarationError {
    /// The same alias appeared twice in the `modules(...)` call.
    DuplicateAlias(String),
    /// An argument to `modules(...)` was not a simple quoted string literal.
    MalformedArgument,
}

impl fmt::Display for ModuleDeclarationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleDeclarationError::DuplicateAlias(a) => {
                write!(f, "module alias declared more than once: {a}")
            }
            ModuleDeclarationError::MalformedArgument => {
                write!(f, "modules(...) arguments must be string literals")
            }
        }
    }
}

/// Scans `source` for a `modules("a", "b", ...)` call and returns the declared
/// aliases. Returns an empty set if no such call is present - a script with no
/// dependencies need not declare one.
pub fn extract_declared_module_aliases(
    source: &str,
) -> Result<BTreeSet<String>, ModuleDeclarationError> {
    let Some(call_start) = source.find("modules(") else {
        return Ok(BTreeSet::new());
    };
    let args_start = call_start + "modules(".len();
    let Some(close_offset) = source[args_start..].find(')') else {
        return Err(ModuleDeclarationError::MalformedArgument);
    };
    let args = &source[args_start..args_start + close_offset];

    let mut aliases = BTreeSet::new();
    for raw in args.split(',') {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let alias = parse_string_literal(trimmed).ok_or(ModuleDeclarationError::MalformedArgument)?;
        if !aliases.insert(alias.clone()) {
            return Err(ModuleDeclarationError::DuplicateAlias(alias));
        }
    }
    Ok(aliases)
}

fn parse_string_literal(token: &str) -> Option<String> {
    let quote = token.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    if token.len() < 2 || !token.ends_with(quote) {
        return None;
    }
    Some(token[1..token.len() - 1].to_string())
}

/// Validates that the source's declared aliases exactly match the config's
/// dependency map keys. Returns the mismatched aliases, if any: `(declared_but_not_provided,
/// provided_but_not_declared)`.
pub fn check_dependencies_match<'a>(
    declared: &BTreeSet<String>,
    provided: impl IntoIterator<Item = &'a str>,
) -> Result<(), DependencyMismatch> {
    let provided: BTreeSet<String> = provided.into_iter().map(str::to_string).collect();
    let declared_but_not_provided: Vec<String> =
        declared.difference(&provided).cloned().collect();
    let provided_but_not_declared: Vec<String> =
        provided.difference(declared).cloned().collect();
    if declared_but_not_provided.is_empty() && provided_but_not_declared.is_empty() {
        Ok(())
    } else {
        Err(DependencyMismatch {
            declared_but_not_provided,
            provided_but_not_declared,
        })
    }
}

/// Non-matching module dependency declarations between source and creation config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyMismatch {
    pub declared_but_not_provided: Vec<String>,
    pub provided_but_not_declared: Vec<String>,
}

impl fmt::Display for DependencyMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "module dependency mismatch: declared but not provided = {:?}, provided but not declared = {:?}",
            self.declared_but_not_provided, self.provided_but_not_declared
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_modules_call_means_no_dependencies() {
        let aliases = extract_declared_module_aliases("function interface() end").unwrap();
        assert!(aliases.is_empty());
    }

    #[test]
    fn extracts_declared_aliases() {
        let aliases = extract_declared_module_aliases("modules(\"a\", \"b\")\n").unwrap();
        assert_eq!(aliases.len(), 2);
        assert!(aliases.contains("a"));
        assert!(aliases.contains("b"));
    }

    #[test]
    fn duplicate_alias_is_rejected() {
        let err = extract_declared_module_aliases("modules(\"a\", \"a\")").unwrap_err();
        assert_eq!(err, ModuleDeclarationError::DuplicateAlias("a".to_string()));
    }

    #[test]
    fn mismatch_reports_both_directions() {
        let declared: BTreeSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        let err = check_dependencies_match(&declared, ["b", "c"]).unwrap_err();
        assert_eq!(err.declared_but_not_provided, vec!["a".to_string()]);
        assert_eq!(err.provided_but_not_declared, vec!["c".to_string()]);
    }

    #[test]
    fn exact_match_is_ok() {
        let declared: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        assert!(check_dependencies_match(&declared, ["a"]).is_ok());
    }
}
