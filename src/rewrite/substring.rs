//! The substring rewriter: an ordered list of `<old>/<new>` rules applied
//! in sequence to every `Query`/`Parse` string.

use indexmap::IndexMap;

use crate::errors::RewriteError;

use super::{Rewriter, RewriterFactory};

/// Ordered `old -> new` substring rules, shared by every session's
/// rewriter.
#[derive(Debug, Clone, Default)]
pub struct SubstringRules(IndexMap<String, String>);

impl SubstringRules {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Parse a single `<old>/<new>` rule as given on the command line or in
    /// the config file. The first unescaped `/` separates old from new.
    pub fn parse_rule(rule: &str) -> Result<(String, String), RewriteError> {
        let mut parts = rule.splitn(2, '/');
        let old = parts.next().unwrap_or_default();
        let new = parts.next().ok_or_else(|| {
            RewriteError::new(format!("rule {rule:?} is missing a '/' separator"))
        })?;
        if old.is_empty() {
            return Err(RewriteError::new(format!(
                "rule {rule:?} has an empty left-hand side"
            )));
        }
        Ok((old.to_string(), new.to_string()))
    }

    pub fn insert(&mut self, old: impl Into<String>, new: impl Into<String>) {
        self.0.insert(old.into(), new.into());
    }

    fn apply(&self, sql: &str) -> String {
        let mut out = sql.to_string();
        for (old, new) in &self.0 {
            out = out.replace(old.as_str(), new.as_str());
        }
        out
    }
}

/// Produces a [`SubstringRewriter`] for every session; the rule set itself
/// is immutable and shared.
pub struct SubstringRewriterFactory {
    rules: SubstringRules,
}

impl SubstringRewriterFactory {
    pub fn new(rules: SubstringRules) -> Self {
        Self { rules }
    }
}

impl RewriterFactory for SubstringRewriterFactory {
    fn new_rewriter(&self) -> Result<Box<dyn Rewriter>, RewriteError> {
        Ok(Box::new(SubstringRewriter {
            rules: self.rules.clone(),
        }))
    }
}

struct SubstringRewriter {
    rules: SubstringRules,
}

impl Rewriter for SubstringRewriter {
    fn rewrite_query(&mut self, sql: &str) -> Result<String, RewriteError> {
        Ok(self.rules.apply(sql))
    }

    fn rewrite_parse(&mut self, sql: &str) -> Result<String, RewriteError> {
        Ok(self.rules.apply(sql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_rules_in_order() {
        let mut rules = SubstringRules::new();
        rules.insert("foo", "bar");
        rules.insert("bar", "baz");
        let factory = SubstringRewriterFactory::new(rules);
        let mut rewriter = factory.new_rewriter().unwrap();

        // "foo" -> "bar" -> "baz" because rules apply left to right.
        assert_eq!(
            rewriter.rewrite_query("select foo from t").unwrap(),
            "select baz from t"
        );
    }

    #[test]
    fn no_op_when_no_rule_matches() {
        let mut rules = SubstringRules::new();
        rules.insert("foo", "bar");
        let factory = SubstringRewriterFactory::new(rules);
        let mut rewriter = factory.new_rewriter().unwrap();

        assert_eq!(
            rewriter.rewrite_query("select 1").unwrap(),
            "select 1"
        );
    }

    #[test]
    fn parse_rule_splits_on_first_slash() {
        let (old, new) = SubstringRules::parse_rule("a/b/c").unwrap();
        assert_eq!(old, "a");
        assert_eq!(new, "b/c");
    }

    #[test]
    fn parse_rule_rejects_missing_separator() {
        assert!(SubstringRules::parse_rule("noseparator").is_err());
    }
}
