//! Restricted predicate language for conditional rules.
//!
//! Only two forms are accepted:
//!
//! ```text
//! <field> == "<literal>"
//! <field> != "<literal>"
//! ```
//!
//! The literal may be quoted with `"` or `'` (or not at all). There are no
//! boolean operators and no nesting. Anything else evaluates to `false`, so
//! a broken rule grants nothing.

use crate::error::RuleEvaluationError;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Attribute context a predicate is evaluated against. Missing fields and
/// `None` values behave the same.
pub type RuleContext = BTreeMap<String, Option<String>>;

const GRAMMAR: &str = r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(==|!=)\s*(.*?)\s*$";

fn grammar() -> Option<&'static Regex> {
    static COMPILED: OnceLock<Option<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| Regex::new(GRAMMAR).ok()).as_ref()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equals,
    NotEquals,
}

/// A parsed predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: String,
    pub comparison: Comparison,
    pub literal: String,
}

impl Predicate {
    pub fn parse(input: &str) -> Result<Self, RuleEvaluationError> {
        if input.trim().is_empty() {
            return Err(RuleEvaluationError::Empty);
        }
        let unsupported = || RuleEvaluationError::UnsupportedSyntax(input.to_string());

        let caps = grammar().ok_or_else(unsupported)?.captures(input).ok_or_else(unsupported)?;

        let raw_literal = &caps[3];
        if raw_literal.is_empty() {
            return Err(unsupported());
        }
        let comparison = match &caps[2] {
            "==" => Comparison::Equals,
            _ => Comparison::NotEquals,
        };

        Ok(Self {
            field: caps[1].to_string(),
            comparison,
            literal: raw_literal.trim_matches(|c| c == '"' || c == '\'').to_string(),
        })
    }

    pub fn matches(&self, context: &RuleContext) -> bool {
        let value = context.get(&self.field).and_then(|v| v.as_deref());
        match self.comparison {
            Comparison::Equals => value == Some(self.literal.as_str()),
            Comparison::NotEquals => value != Some(self.literal.as_str()),
        }
    }
}

/// Evaluates rule predicates against an attribute context.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEvaluator;

impl RuleEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `predicate`, treating every parse failure as `false`.
    pub fn evaluate(&self, predicate: &str, context: &RuleContext) -> bool {
        match self.try_evaluate(predicate, context) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(predicate, error = %e, "Rule does not parse, treating as false");
                false
            }
        }
    }

    /// Evaluate `predicate`, reporting why it could not be parsed.
    pub fn try_evaluate(
        &self,
        predicate: &str,
        context: &RuleContext,
    ) -> Result<bool, RuleEvaluationError> {
        Ok(Predicate::parse(predicate)?.matches(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, Option<&str>)]) -> RuleContext {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn equality_and_inequality() {
        let eval = RuleEvaluator::new();
        let context = ctx(&[("location", Some("Remote")), ("title", Some("Engineer"))]);

        assert!(eval.evaluate(r#"location == "Remote""#, &context));
        assert!(!eval.evaluate(r#"location == "Office""#, &context));
        assert!(eval.evaluate(r#"title != "Manager""#, &context));
        assert!(!eval.evaluate(r#"title != "Engineer""#, &context));
    }

    #[test]
    fn whitespace_and_quotes_are_flexible() {
        let eval = RuleEvaluator::new();
        let context = ctx(&[("location", Some("Remote"))]);

        assert!(eval.evaluate("location=='Remote'", &context));
        assert!(eval.evaluate("   location   ==   Remote   ", &context));
        assert!(eval.evaluate("location == \"Remote\"  ", &context));
    }

    #[test]
    fn comparison_is_case_sensitive() {
        let eval = RuleEvaluator::new();
        let context = ctx(&[("location", Some("Remote"))]);
        assert!(!eval.evaluate(r#"location == "remote""#, &context));
    }

    #[test]
    fn unknown_and_null_fields_are_absent() {
        let eval = RuleEvaluator::new();
        let context = ctx(&[("department", None)]);

        assert!(!eval.evaluate(r#"department == "Sales""#, &context));
        assert!(eval.evaluate(r#"department != "Sales""#, &context));
        assert!(!eval.evaluate(r#"clearance == "top""#, &context));
        assert!(eval.evaluate(r#"clearance != "top""#, &context));
    }

    #[test]
    fn unsupported_syntax_fails_closed() {
        let eval = RuleEvaluator::new();
        let context = ctx(&[("location", Some("Remote")), ("title", Some("Engineer"))]);

        for predicate in [
            "",
            "   ",
            "location",
            "location = \"Remote\"",
            "location == ",
            "location == \"Remote\" and title == \"Engineer\"x",
            "__import__('os').system('true')",
            "len(location) > 0",
            "location.upper() == \"REMOTE\"",
            "(location == \"Remote\")",
            "1 == 1",
            "location > \"A\"",
        ] {
            assert!(!eval.evaluate(predicate, &context), "{predicate:?} should be false");
        }
    }

    #[test]
    fn try_evaluate_reports_errors() {
        let eval = RuleEvaluator::new();
        let context = RuleContext::new();

        assert_eq!(eval.try_evaluate("", &context), Err(RuleEvaluationError::Empty));
        assert!(matches!(
            eval.try_evaluate("location ~= 'x'", &context),
            Err(RuleEvaluationError::UnsupportedSyntax(_))
        ));
    }

    #[test]
    fn parse_extracts_parts() {
        let predicate = Predicate::parse("employment_type != 'Contractor'").unwrap();
        assert_eq!(predicate.field, "employment_type");
        assert_eq!(predicate.comparison, Comparison::NotEquals);
        assert_eq!(predicate.literal, "Contractor");
    }
}
