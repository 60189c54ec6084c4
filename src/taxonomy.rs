//! Error taxonomy mapper.
//!
//! The single place where engine-specific error codes and text are
//! interpreted. Everything above this module branches on [`QueryErrorKind`]
//! and [`Severity`], never on raw driver output.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::driver::DriverError;

/// Normalized classification of a failed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryErrorKind {
    ConstraintViolation,
    AuthenticationFailed,
    InvalidColumn,
    ObjectNotFound,
    NoDataFound,
    ConnectionError,
    Unknown,
}

/// How bad it is for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

/// Best-effort guess at the constraint behind a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
    Check,
    NotNull,
    Unknown,
}

/// Parsed from the constraint name in the engine message, e.g.
/// `ORA-00001: unique constraint (APP.UK_USERS_EMAIL) violated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintInfo {
    pub name: String,
    pub kind: ConstraintKind,
    /// Column guesses derived from the constraint naming convention.
    pub columns: Vec<String>,
}

/// Immutable, fully normalized failure value. Produced once per failure and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct QueryFailure {
    /// Stable engine code, e.g. `ORA-00001`, or `UNKNOWN`.
    pub code: String,
    pub kind: QueryErrorKind,
    pub severity: Severity,
    pub constraint: Option<ConstraintInfo>,
    /// Human-readable next step, localized via the `locale` execute option.
    pub suggested_action: String,
    /// Raw driver message, kept for logs only.
    pub message: String,
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}): {}", self.code, self.kind, self.suggested_action)
    }
}

static CODE_TABLE: LazyLock<HashMap<u32, (QueryErrorKind, Severity)>> = LazyLock::new(|| {
    use QueryErrorKind::*;
    use Severity::*;
    HashMap::from([
        // Constraints
        (1, (ConstraintViolation, Error)),     // unique constraint violated
        (1400, (ConstraintViolation, Error)),  // cannot insert NULL
        (2290, (ConstraintViolation, Error)),  // check constraint violated
        (2291, (ConstraintViolation, Error)),  // parent key not found
        (2292, (ConstraintViolation, Error)),  // child record found
        // Authentication
        (1017, (AuthenticationFailed, Critical)), // invalid username/password
        (28000, (AuthenticationFailed, Critical)), // account locked
        // Statement shape
        (904, (InvalidColumn, Error)),  // invalid identifier
        (942, (ObjectNotFound, Error)), // table or view does not exist
        (4043, (ObjectNotFound, Error)),
        // Data
        (1403, (NoDataFound, Warning)),
        // Connectivity
        (1033, (ConnectionError, Critical)),  // initialization/shutdown in progress
        (1034, (ConnectionError, Critical)),  // not available
        (3113, (ConnectionError, Critical)),  // end-of-file on channel
        (3114, (ConnectionError, Critical)),  // not connected
        (12170, (ConnectionError, Critical)), // connect timeout
        (12514, (ConnectionError, Critical)), // listener does not know service
        (12541, (ConnectionError, Critical)), // no listener
        (25408, (ConnectionError, Critical)), // can not safely replay call
    ])
});

/// Transient connectivity codes: these (and only these) feed the circuit
/// breaker. Deadlocks and constraint errors must never trip it.
const RETRYABLE_CODES: &[u32] = &[1033, 1034, 3113, 3114, 12170, 12514, 12541, 25408];

static ORA_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ORA-(\d{1,5})").expect("code pattern"));

static CONSTRAINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([A-Za-z0-9_$#]+)\.([A-Za-z0-9_$#]+)\)").expect("constraint pattern")
});

/// Extract the numeric engine code from a raw driver error.
#[must_use]
pub fn extract_code(err: &DriverError) -> Option<u32> {
    if let Some(code) = err.code {
        return Some(code);
    }
    ORA_CODE_RE
        .captures(&err.message)
        .and_then(|caps| caps[1].parse().ok())
}

/// Whether a failure is a transient connectivity condition.
#[must_use]
pub fn is_retryable(err: &DriverError) -> bool {
    extract_code(err).is_some_and(|code| RETRYABLE_CODES.contains(&code))
}

/// Classify a code into the taxonomy; unlisted codes map to `Unknown`.
#[must_use]
pub fn classify(code: Option<u32>) -> (QueryErrorKind, Severity) {
    code.and_then(|c| CODE_TABLE.get(&c).copied())
        .unwrap_or((QueryErrorKind::Unknown, Severity::Error))
}

/// Parse a `(SCHEMA.CONSTRAINT_NAME)` token out of the engine message and
/// guess the constraint kind and columns from the naming convention.
#[must_use]
pub fn parse_constraint(message: &str) -> Option<ConstraintInfo> {
    let caps = CONSTRAINT_RE.captures(message)?;
    let name = caps[2].to_string();
    let upper = name.to_uppercase();
    let tokens: Vec<&str> = upper.split('_').filter(|t| !t.is_empty()).collect();

    let (kind, body) = match tokens.as_slice() {
        ["PK", rest @ ..] => (ConstraintKind::PrimaryKey, rest),
        ["UK" | "UQ", rest @ ..] => (ConstraintKind::Unique, rest),
        ["FK", rest @ ..] => (ConstraintKind::ForeignKey, rest),
        ["CK" | "CHK", rest @ ..] => (ConstraintKind::Check, rest),
        ["NN", rest @ ..] => (ConstraintKind::NotNull, rest),
        [rest @ .., "PK"] => (ConstraintKind::PrimaryKey, rest),
        [rest @ .., "UN" | "UK"] => (ConstraintKind::Unique, rest),
        [rest @ .., "FK"] => (ConstraintKind::ForeignKey, rest),
        [rest @ .., "CK" | "CHK"] => (ConstraintKind::Check, rest),
        rest => (ConstraintKind::Unknown, rest),
    };

    // Convention is <prefix>_<table>_<column...>: the first body token names
    // the table, the remainder are column guesses.
    let columns = body
        .iter()
        .skip(1)
        .map(|t| t.to_lowercase())
        .collect::<Vec<_>>();

    Some(ConstraintInfo {
        name,
        kind,
        columns,
    })
}

/// Localized suggested action for a failure kind. Unknown locales fall back
/// to English.
#[must_use]
pub fn suggested_action(kind: QueryErrorKind, locale: Option<&str>) -> String {
    use QueryErrorKind::*;
    let text = match locale {
        Some("de") => match kind {
            ConstraintViolation => "Eingabedaten gegen die verletzte Bedingung pruefen.",
            AuthenticationFailed => "Zugangsdaten und Kontostatus pruefen.",
            InvalidColumn => "Spaltennamen gegen das Zielschema pruefen.",
            ObjectNotFound => "Objektname und Schemazugriff pruefen.",
            NoDataFound => "Leeres Ergebnis behandeln; kein Fehlerfall.",
            ConnectionError => "Spaeter erneut versuchen; Verbindung wird ueberwacht.",
            Unknown => "Fehlermeldung pruefen und Protokolle konsultieren.",
        },
        _ => match kind {
            ConstraintViolation => "Check the input data against the violated constraint.",
            AuthenticationFailed => "Verify credentials and account status.",
            InvalidColumn => "Check column names against the target schema.",
            ObjectNotFound => "Verify the object name and schema grants.",
            NoDataFound => "Handle the empty result; this is not a failure.",
            ConnectionError => "Retry later; connectivity is being monitored.",
            Unknown => "Inspect the raw message and server logs.",
        },
    };
    text.to_string()
}

/// Map a raw driver error into an immutable [`QueryFailure`].
#[must_use]
pub fn map_driver_error(err: &DriverError, locale: Option<&str>) -> QueryFailure {
    let code = extract_code(err);
    let (kind, severity) = classify(code);
    let constraint = if kind == QueryErrorKind::ConstraintViolation {
        parse_constraint(&err.message)
    } else {
        None
    };

    QueryFailure {
        code: code.map_or_else(|| "UNKNOWN".to_string(), |c| format!("ORA-{c:05}")),
        kind,
        severity,
        constraint,
        suggested_action: suggested_action(kind, locale),
        message: err.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_unique_violation_with_constraint_info() {
        let err = DriverError::with_code(1, "unique constraint (APP.UK_USERS_EMAIL) violated");
        let failure = map_driver_error(&err, None);
        assert_eq!(failure.code, "ORA-00001");
        assert_eq!(failure.kind, QueryErrorKind::ConstraintViolation);
        let info = failure.constraint.expect("constraint info");
        assert_eq!(info.kind, ConstraintKind::Unique);
        assert_eq!(info.name, "UK_USERS_EMAIL");
        assert_eq!(info.columns, vec!["email".to_string()]);
    }

    #[test]
    fn parses_code_from_message_when_field_missing() {
        let err = DriverError::new("ORA-00942: table or view does not exist");
        let failure = map_driver_error(&err, None);
        assert_eq!(failure.code, "ORA-00942");
        assert_eq!(failure.kind, QueryErrorKind::ObjectNotFound);
    }

    #[test]
    fn suffix_style_constraint_names() {
        let info = parse_constraint("integrity constraint (APP.ORDERS_CUSTOMER_ID_FK) violated")
            .expect("constraint info");
        assert_eq!(info.kind, ConstraintKind::ForeignKey);
        assert_eq!(info.columns, vec!["customer".to_string(), "id".to_string()]);
    }

    #[test]
    fn auth_failures_are_critical_and_not_retryable() {
        let err = DriverError::with_code(1017, "invalid username/password; logon denied");
        assert!(!is_retryable(&err));
        let failure = map_driver_error(&err, None);
        assert_eq!(failure.kind, QueryErrorKind::AuthenticationFailed);
        assert_eq!(failure.severity, Severity::Critical);
    }

    #[test]
    fn listener_down_is_retryable() {
        let err = DriverError::with_code(12541, "TNS:no listener");
        assert!(is_retryable(&err));
    }

    #[test]
    fn locale_fallback_to_english() {
        let a = suggested_action(QueryErrorKind::NoDataFound, Some("fr"));
        let b = suggested_action(QueryErrorKind::NoDataFound, None);
        assert_eq!(a, b);
        let de = suggested_action(QueryErrorKind::NoDataFound, Some("de"));
        assert_ne!(de, b);
    }
}
