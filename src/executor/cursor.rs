use crate::results::ResultSet;

/// One page of a cursor read.
#[derive(Debug, Clone, Default)]
pub struct CursorResult {
    pub rows: ResultSet,
    /// Whether at least one more row exists past this page.
    pub has_more: bool,
}

/// Append a pagination window to already-translated statement text. The base
/// statement must not carry its own pagination clause.
pub(crate) fn windowed_statement(sql: &str, offset: usize, fetch: usize) -> String {
    format!(
        "{} OFFSET {offset} ROWS FETCH NEXT {fetch} ROWS ONLY",
        sql.trim_end().trim_end_matches(';')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_appends_to_trimmed_statement() {
        assert_eq!(
            windowed_statement("SELECT id FROM t ORDER BY id;\n", 20, 10),
            "SELECT id FROM t ORDER BY id OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }
}
