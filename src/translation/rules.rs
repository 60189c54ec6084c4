use std::sync::LazyLock;

use regex::{Captures, Regex};

/// What a rule rewrites. Ordering in [`rule_table`] is significant: later
/// rules operate on the output of earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleCategory {
    /// `col->>'k'` / `col->'k'` to `JSON_VALUE` / `JSON_QUERY`.
    JsonExtraction,
    /// `col ? 'k'` to `JSON_EXISTS`.
    JsonExistence,
    /// `NOW()` / `CURRENT_TIMESTAMP` to `SYSTIMESTAMP`.
    Temporal,
    /// `INTERVAL 'n unit'` and `AGE(a, b)` arithmetic.
    Interval,
    /// `ILIKE` to `UPPER() LIKE UPPER()`.
    CaseInsensitiveMatch,
    /// `LIMIT`/`OFFSET` to `OFFSET .. ROWS FETCH NEXT .. ROWS ONLY`.
    Pagination,
    /// `TRUE`/`FALSE` to `1`/`0`.
    BooleanLiteral,
}

pub(crate) enum Rewrite {
    /// Expansion template using `${n}` capture references.
    Template(&'static str),
    /// Computed replacement; returning the match unchanged makes the rule a
    /// counted-as-not-applied no-op.
    With(fn(&Captures<'_>) -> String),
}

/// One immutable rewrite rule, constructed once at startup.
pub struct SyntaxRule {
    pub(crate) pattern: Regex,
    pub(crate) rewrite: Rewrite,
    pub category: RuleCategory,
    /// Apply only outside quoted literals and comments. Used by the boolean
    /// rules, which would otherwise corrupt JSON path text produced by the
    /// earlier JSON rules.
    pub(crate) quote_aware: bool,
}

fn rule(pattern: &str, rewrite: Rewrite, category: RuleCategory, quote_aware: bool) -> SyntaxRule {
    SyntaxRule {
        pattern: Regex::new(pattern).expect("syntax rule pattern"),
        rewrite,
        category,
        quote_aware,
    }
}

fn bare_offset(caps: &Captures<'_>) -> String {
    // Already-translated `OFFSET n ROWS` must pass through untouched.
    if caps.get(2).is_some() {
        caps[0].to_string()
    } else {
        format!("OFFSET {} ROWS", &caps[1])
    }
}

static RULES: LazyLock<Vec<SyntaxRule>> = LazyLock::new(|| {
    use RuleCategory::*;
    use Rewrite::{Template, With};
    vec![
        // JSON operators run first so later rules never see `->>'...'` text.
        rule(
            r"(?i)([A-Za-z_][\w.]*)\s*->>\s*'([^']+)'",
            Template("JSON_VALUE(${1}, '$$.${2}')"),
            JsonExtraction,
            false,
        ),
        rule(
            r"(?i)([A-Za-z_][\w.]*)\s*->\s*'([^']+)'",
            Template("JSON_QUERY(${1}, '$$.${2}')"),
            JsonExtraction,
            false,
        ),
        rule(
            r"(?i)([A-Za-z_][\w.]*)\s*\?\s*'([^']+)'",
            Template("JSON_EXISTS(${1}, '$$.${2}')"),
            JsonExistence,
            false,
        ),
        rule(r"(?i)\bNOW\s*\(\s*\)", Template("SYSTIMESTAMP"), Temporal, false),
        rule(
            r"(?i)\bCURRENT_TIMESTAMP\b",
            Template("SYSTIMESTAMP"),
            Temporal,
            false,
        ),
        rule(
            r"(?i)\bINTERVAL\s+'(\d+)\s+DAYS?'",
            Template("NUMTODSINTERVAL(${1}, 'DAY')"),
            Interval,
            false,
        ),
        rule(
            r"(?i)\bINTERVAL\s+'(\d+)\s+HOURS?'",
            Template("NUMTODSINTERVAL(${1}, 'HOUR')"),
            Interval,
            false,
        ),
        rule(
            r"(?i)\bINTERVAL\s+'(\d+)\s+MINUTES?'",
            Template("NUMTODSINTERVAL(${1}, 'MINUTE')"),
            Interval,
            false,
        ),
        rule(
            r"(?i)\bINTERVAL\s+'(\d+)\s+SECONDS?'",
            Template("NUMTODSINTERVAL(${1}, 'SECOND')"),
            Interval,
            false,
        ),
        rule(
            r"(?i)\bAGE\s*\(\s*([^,()]+?)\s*,\s*([^()]+?)\s*\)",
            Template("(${1} - ${2})"),
            Interval,
            false,
        ),
        rule(
            r"(?i)([\w.]+|'[^']*'|:\w+)\s+ILIKE\s+([\w.]+|'[^']*'|:\w+)",
            Template("UPPER(${1}) LIKE UPPER(${2})"),
            CaseInsensitiveMatch,
            false,
        ),
        // Combined forms first so the bare LIMIT rule cannot strand an OFFSET.
        rule(
            r"(?i)\bLIMIT\s+(\d+)\s+OFFSET\s+(\d+)",
            Template("OFFSET ${2} ROWS FETCH NEXT ${1} ROWS ONLY"),
            Pagination,
            false,
        ),
        rule(
            r"(?i)\bOFFSET\s+(\d+)\s+LIMIT\s+(\d+)",
            Template("OFFSET ${1} ROWS FETCH NEXT ${2} ROWS ONLY"),
            Pagination,
            false,
        ),
        rule(
            r"(?i)\bLIMIT\s+(\d+)",
            Template("FETCH NEXT ${1} ROWS ONLY"),
            Pagination,
            false,
        ),
        rule(
            r"(?i)\bOFFSET\s+(\d+)(\s+ROWS?)?",
            With(bare_offset),
            Pagination,
            false,
        ),
        // Booleans last, and only outside literals, so JSON path text and
        // string contents survive.
        rule(r"(?i)\bTRUE\b", Template("1"), BooleanLiteral, true),
        rule(r"(?i)\bFALSE\b", Template("0"), BooleanLiteral, true),
    ]
});

/// The fixed, ordered rule table.
#[must_use]
pub fn rule_table() -> &'static [SyntaxRule] {
    &RULES
}
