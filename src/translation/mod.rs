//! Syntax and bind translation engine.
//!
//! An ordered list of rewrite rules turns Postgres-dialect SQL into the
//! target dialect. Both entry points are pure text transforms; they never
//! touch the network.
//!
//! Warning: this is a rule-list transform, not a parser. It handles the known,
//! finite set of dialect differences it was written for; SQL outside that set
//! (nested clauses, reordered pagination, vendor extensions) passes through
//! unchanged or may rewrite incorrectly. A rule that fails to match is a
//! silent no-op; [`Translator::translate_with_report`] exposes applied-rule
//! counts so callers can detect no-op translations.

use std::borrow::Cow;

mod binds;
mod rules;
mod scanner;

pub use binds::{coerce_binds, coerce_value};
pub use rules::{RuleCategory, SyntaxRule, rule_table};

use rules::Rewrite;
use scanner::map_unquoted;

/// Count of rule applications for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRule {
    pub category: RuleCategory,
    pub count: usize,
}

/// Outcome of an instrumented translation.
#[derive(Debug, Clone)]
pub struct TranslationReport {
    /// The translated SQL text.
    pub sql: String,
    /// Total number of rule applications that changed text.
    pub total_applied: usize,
    /// Per-category application counts, in rule-table order.
    pub applied: Vec<AppliedRule>,
}

/// Applies the fixed rule table in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Translator;

impl Translator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Rewrite `sql` into the target dialect. Returns a borrowed `Cow` when
    /// no rule changed anything.
    #[must_use]
    pub fn translate<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        let report = self.translate_with_report(sql);
        if report.total_applied == 0 {
            Cow::Borrowed(sql)
        } else {
            Cow::Owned(report.sql)
        }
    }

    /// Rewrite `sql` and report how many rules actually changed text, so a
    /// silent no-op translation is distinguishable from a real rewrite.
    #[must_use]
    pub fn translate_with_report(&self, sql: &str) -> TranslationReport {
        let mut text = sql.to_string();
        let mut applied: Vec<AppliedRule> = Vec::new();
        let mut total = 0;

        for rule in rule_table() {
            let (next, count) = apply_rule(rule, &text);
            if count > 0 {
                text = next;
                total += count;
                match applied.iter_mut().find(|a| a.category == rule.category) {
                    Some(entry) => entry.count += count,
                    None => applied.push(AppliedRule {
                        category: rule.category,
                        count,
                    }),
                }
            }
        }

        TranslationReport {
            sql: text,
            total_applied: total,
            applied,
        }
    }
}

fn apply_rule(rule: &SyntaxRule, sql: &str) -> (String, usize) {
    let mut count = 0;
    let out = if rule.quote_aware {
        map_unquoted(sql, |segment| rewrite_text(rule, segment, &mut count))
    } else {
        rewrite_text(rule, sql, &mut count)
    };
    (out, count)
}

fn rewrite_text(rule: &SyntaxRule, text: &str, count: &mut usize) -> String {
    rule.pattern
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let replacement = match &rule.rewrite {
                Rewrite::Template(template) => {
                    let mut dst = String::new();
                    caps.expand(template, &mut dst);
                    dst
                }
                Rewrite::With(f) => f(caps),
            };
            if replacement != caps[0] {
                *count += 1;
            }
            replacement
        })
        .into_owned()
}
