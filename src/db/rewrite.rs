//! Count injection.
//!
//! Rewrites a caller query so that a single execution plan yields both the
//! (possibly paginated) rows and the unpaginated total row count. Matching is
//! textual: keywords are found case-insensitively, on word boundaries, outside
//! quoted literals and outside parentheses. No SQL parsing happens here.
//!
//! String literals follow each engine's rules: PostgreSQL's standard-conforming
//! strings treat backslash as an ordinary character except inside `E'...'`,
//! while ClickHouse honours backslash escapes everywhere.
//!
//! Known limitation: the window plan keeps the caller's ORDER BY inside the
//! wrapped subquery and applies LIMIT/OFFSET on the outer query. SQL does not
//! guarantee that a subquery's order survives into the outer query; PostgreSQL
//! preserves it for this plan shape in practice, but the page boundaries rely
//! on that behaviour.

use regex::Regex;
use std::sync::LazyLock;

/// Reserved name of the synthetic column carrying the total row count.
pub const TOTAL_COUNT_COLUMN: &str = "__qb_total_count";

const BASE_ALIAS: &str = "_qb_base";

static PAGINATION_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)\s(LIMIT\s+\d+(?:\s*,\s*\d+)?(?:\s+OFFSET\s+\d+(?:\s+ROWS?)?)?|OFFSET\s+\d+(?:\s+ROWS?)?(?:\s+LIMIT\s+\d+)?)\s*$",
    )
    .expect("pagination pattern is valid")
});

static AGGREGATE_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcount\s*\(").expect("count pattern is valid"));

static FROM_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfrom\b").expect("from pattern is valid"));

static ORDER_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\border\s+by\b").expect("order pattern is valid"));

static NEEDS_SUBQUERY_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(group\s+by|having|distinct|union|intersect|except)\b")
        .expect("grouping pattern is valid")
});

/// How an engine obtains the total row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountStrategy {
    /// Wrap the query and project `COUNT(*) OVER ()`; one round trip.
    Window,
    /// Run a separate `SELECT COUNT(*)` before the data query; two round trips.
    SeparateQuery,
}

impl CountStrategy {
    /// Whether the engine behind this strategy treats `\` inside any quoted
    /// literal as an escape character.
    fn backslash_escapes(self) -> bool {
        match self {
            CountStrategy::Window => false,
            CountStrategy::SeparateQuery => true,
        }
    }
}

/// A trailing `LIMIT`/`OFFSET` clause lifted off a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    /// The clause text, e.g. `LIMIT 10 OFFSET 20`.
    pub clause: String,
    /// Whether the clause skips rows (so an empty page says nothing about the total).
    pub skips_rows: bool,
}

/// Execution plan produced by [`plan_count`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountPlan {
    /// Run the query unmodified; `count` is the number of rows returned.
    Passthrough { query: String },

    /// Run `query`, which carries [`TOTAL_COUNT_COLUMN`]. When the page comes
    /// back empty and `recount_query` is set, it recovers the total.
    Windowed {
        query: String,
        recount_query: Option<String>,
    },

    /// Run `count_query` first, then the original `query` for rows.
    Separate { count_query: String, query: String },
}

impl CountPlan {
    /// The query whose rows are returned to the caller.
    pub fn data_query(&self) -> &str {
        match self {
            CountPlan::Passthrough { query }
            | CountPlan::Windowed { query, .. }
            | CountPlan::Separate { query, .. } => query,
        }
    }
}

/// Plans count injection for `sql` under the given engine strategy.
pub fn plan_count(sql: &str, strategy: CountStrategy) -> CountPlan {
    let query = strip_terminator(sql);

    if !wants_injection(query, strategy) {
        return CountPlan::Passthrough {
            query: sql.to_string(),
        };
    }

    let (base, pagination) = split_pagination(query, strategy);

    match strategy {
        CountStrategy::Window => {
            let mut wrapped = format!(
                "SELECT {BASE_ALIAS}.*, COUNT(*) OVER () AS {TOTAL_COUNT_COLUMN} FROM ({base}) AS {BASE_ALIAS}"
            );
            let recount_query = match &pagination {
                Some(p) => {
                    wrapped.push(' ');
                    wrapped.push_str(&p.clause);
                    p.skips_rows.then(|| subquery_count(base))
                }
                None => None,
            };
            CountPlan::Windowed {
                query: wrapped,
                recount_query,
            }
        }
        CountStrategy::SeparateQuery => CountPlan::Separate {
            count_query: count_query_for(base),
            query: sql.to_string(),
        },
    }
}

/// Lifts a trailing top-level pagination clause off `sql`.
pub fn split_pagination(sql: &str, strategy: CountStrategy) -> (&str, Option<Pagination>) {
    let sql = strip_terminator(sql);
    let mask = top_level_mask(sql, strategy.backslash_escapes());

    let Some(caps) = PAGINATION_TAIL.captures(sql) else {
        return (sql, None);
    };
    let Some(clause) = caps.get(1) else {
        return (sql, None);
    };
    if !mask[clause.start()] {
        return (sql, None);
    }

    let text = clause.as_str();
    let upper = text.to_ascii_uppercase();
    let pagination = Pagination {
        clause: text.split_whitespace().collect::<Vec<_>>().join(" "),
        skips_rows: upper.contains("OFFSET") || upper.contains(','),
    };
    (sql[..clause.start()].trim_end(), Some(pagination))
}

/// Derives the bare row-count query for Strategy B.
///
/// Selected columns are replaced by `COUNT(*)` and any trailing ORDER BY is
/// dropped. Grouped, distinct or compound queries are counted through a
/// subquery instead, since replacing their projection would change the row set.
pub fn count_query_for(base: &str) -> String {
    let strategy = CountStrategy::SeparateQuery;
    let (base, _) = split_pagination(base, strategy);
    let mask = top_level_mask(base, strategy.backslash_escapes());

    let starts_with_cte = first_keyword(base).eq_ignore_ascii_case("WITH");
    let needs_subquery = starts_with_cte || first_top_level(&NEEDS_SUBQUERY_COUNT, base, &mask).is_some();

    match first_top_level(&FROM_KEYWORD, base, &mask) {
        Some(from) if !needs_subquery => {
            let mut tail = &base[from..];
            let tail_mask = &mask[from..];
            if let Some(order) = first_top_level(&ORDER_BY, tail, tail_mask) {
                tail = &tail[..order];
            }
            format!("SELECT COUNT(*) {}", tail.trim_end())
        }
        _ => subquery_count(base),
    }
}

fn subquery_count(base: &str) -> String {
    format!("SELECT COUNT(*) FROM ({base}) AS {BASE_ALIAS}")
}

/// Whether `sql` is a read query that count injection applies to.
///
/// Non-SELECT statements, queries without a FROM clause, queries that already
/// aggregate a count and queries already carrying the marker column run as-is.
pub fn wants_injection(sql: &str, strategy: CountStrategy) -> bool {
    let sql = strip_terminator(sql);
    let keyword = first_keyword(sql);
    if !(keyword.eq_ignore_ascii_case("SELECT") || keyword.eq_ignore_ascii_case("WITH")) {
        return false;
    }
    if AGGREGATE_COUNT.is_match(sql) || sql.contains(TOTAL_COUNT_COLUMN) {
        return false;
    }
    let mask = top_level_mask(sql, strategy.backslash_escapes());
    first_top_level(&FROM_KEYWORD, sql, &mask).is_some()
}

fn strip_terminator(sql: &str) -> &str {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

fn first_keyword(sql: &str) -> &str {
    let sql = sql.trim_start_matches(|c: char| c == '(' || c.is_whitespace());
    let end = sql
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(sql.len());
    &sql[..end]
}

fn first_top_level(re: &Regex, sql: &str, mask: &[bool]) -> Option<usize> {
    re.find_iter(sql).map(|m| m.start()).find(|&i| mask[i])
}

/// For each byte of `sql`, true when it sits outside parentheses and quotes.
///
/// Backticks and `E'...'` strings always honour backslash escapes; other
/// literals only when `backslash_escapes` is set.
fn top_level_mask(sql: &str, backslash_escapes: bool) -> Vec<bool> {
    let bytes = sql.as_bytes();
    let mut mask = vec![false; bytes.len() + 1];
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut escapes = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if escapes && b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' => {
                    quote = Some(b);
                    escapes = backslash_escapes
                        || b == b'`'
                        || (b == b'\'' && is_escape_string_prefix(bytes, i));
                }
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                _ => mask[i] = depth == 0,
            },
        }
        i += 1;
    }
    mask[bytes.len()] = true;
    mask
}

/// Whether the quote at `quote_at` opens a PostgreSQL `E'...'` string.
fn is_escape_string_prefix(bytes: &[u8], quote_at: usize) -> bool {
    let Some(prefix) = quote_at.checked_sub(1) else {
        return false;
    };
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    matches!(bytes[prefix], b'E' | b'e') && (prefix == 0 || !is_word(bytes[prefix - 1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_limit() {
        let (base, p) =
            split_pagination("SELECT * FROM t ORDER BY x LIMIT 10", CountStrategy::Window);
        assert_eq!(base, "SELECT * FROM t ORDER BY x");
        let p = p.unwrap();
        assert_eq!(p.clause, "LIMIT 10");
        assert!(!p.skips_rows);
    }

    #[test]
    fn test_split_limit_offset_with_terminator() {
        let (base, p) = split_pagination(
            "select * from t limit 10   offset 30;",
            CountStrategy::Window,
        );
        assert_eq!(base, "select * from t");
        let p = p.unwrap();
        assert_eq!(p.clause, "limit 10 offset 30");
        assert!(p.skips_rows);
    }

    #[test]
    fn test_split_clickhouse_comma_form() {
        let (base, p) =
            split_pagination("SELECT a FROM t LIMIT 20, 10", CountStrategy::SeparateQuery);
        assert_eq!(base, "SELECT a FROM t");
        assert!(p.unwrap().skips_rows);
    }

    #[test]
    fn test_split_ignores_limit_inside_subquery() {
        let sql = "SELECT * FROM (SELECT * FROM t LIMIT 5) s";
        let (base, p) = split_pagination(sql, CountStrategy::Window);
        assert_eq!(base, sql);
        assert!(p.is_none());
    }

    #[test]
    fn test_split_ignores_limit_inside_literal() {
        let sql = "SELECT * FROM t WHERE note = 'x LIMIT 5'";
        assert!(split_pagination(sql, CountStrategy::Window).1.is_none());
    }

    #[test]
    fn test_standard_string_trailing_backslash() {
        let sql = r"SELECT * FROM t WHERE s <> 'C:\' ORDER BY x LIMIT 10";
        let (base, p) = split_pagination(sql, CountStrategy::Window);
        assert_eq!(base, r"SELECT * FROM t WHERE s <> 'C:\' ORDER BY x");
        assert_eq!(p.unwrap().clause, "LIMIT 10");

        match plan_count(sql, CountStrategy::Window) {
            CountPlan::Windowed { query, .. } => {
                assert!(query.ends_with(") AS _qb_base LIMIT 10"), "{query}")
            }
            other => panic!("expected windowed plan, got {other:?}"),
        }
    }

    #[test]
    fn test_escape_string_honours_backslash() {
        let sql = r"SELECT * FROM t WHERE s = E'it\'s LIMIT 5'";
        assert!(split_pagination(sql, CountStrategy::Window).1.is_none());

        let sql = r"SELECT * FROM t WHERE s = E'C:\\' LIMIT 5";
        assert_eq!(
            split_pagination(sql, CountStrategy::Window).1.unwrap().clause,
            "LIMIT 5"
        );
    }

    #[test]
    fn test_clickhouse_literal_backslash_escape() {
        let sql = r"SELECT * FROM t WHERE s = 'it\'s LIMIT 5'";
        assert!(split_pagination(sql, CountStrategy::SeparateQuery).1.is_none());
        assert_eq!(
            count_query_for(r"SELECT a FROM t WHERE s = 'x\' ORDER BY y' ORDER BY a"),
            r"SELECT COUNT(*) FROM t WHERE s = 'x\' ORDER BY y'"
        );
    }

    #[test]
    fn test_window_plan_reattaches_pagination_outside() {
        let plan = plan_count("SELECT * FROM t ORDER BY x LIMIT 10", CountStrategy::Window);
        assert_eq!(
            plan,
            CountPlan::Windowed {
                query: "SELECT _qb_base.*, COUNT(*) OVER () AS __qb_total_count FROM (SELECT * FROM t ORDER BY x) AS _qb_base LIMIT 10".to_string(),
                recount_query: None,
            }
        );
    }

    #[test]
    fn test_window_plan_with_offset_has_recount() {
        let plan = plan_count("SELECT id FROM t LIMIT 10 OFFSET 100", CountStrategy::Window);
        match plan {
            CountPlan::Windowed { recount_query, .. } => assert_eq!(
                recount_query.as_deref(),
                Some("SELECT COUNT(*) FROM (SELECT id FROM t) AS _qb_base")
            ),
            other => panic!("expected windowed plan, got {other:?}"),
        }
    }

    #[test]
    fn test_separate_plan_drops_order_and_limit() {
        let plan = plan_count(
            "SELECT id, name FROM users WHERE active ORDER BY name LIMIT 10 OFFSET 5",
            CountStrategy::SeparateQuery,
        );
        assert_eq!(
            plan,
            CountPlan::Separate {
                count_query: "SELECT COUNT(*) FROM users WHERE active".to_string(),
                query: "SELECT id, name FROM users WHERE active ORDER BY name LIMIT 10 OFFSET 5"
                    .to_string(),
            }
        );
    }

    #[test]
    fn test_separate_plan_grouped_query_uses_subquery() {
        let plan = plan_count(
            "SELECT city, sum(x) FROM t GROUP BY city ORDER BY city LIMIT 3",
            CountStrategy::SeparateQuery,
        );
        match plan {
            CountPlan::Separate { count_query, .. } => assert_eq!(
                count_query,
                "SELECT COUNT(*) FROM (SELECT city, sum(x) FROM t GROUP BY city ORDER BY city) AS _qb_base"
            ),
            other => panic!("expected separate plan, got {other:?}"),
        }
    }

    #[test]
    fn test_subquery_from_is_not_top_level() {
        let q = count_query_for("SELECT (SELECT max(v) FROM u) AS m, id FROM t ORDER BY id");
        assert_eq!(q, "SELECT COUNT(*) FROM t");
    }

    #[test]
    fn test_passthrough_cases() {
        for sql in [
            "SELECT COUNT(*) FROM t",
            "select count (id) from t group by k",
            "SELECT 1",
            "INSERT INTO t VALUES (1)",
            "UPDATE t SET a = 1",
            "SELECT a, __qb_total_count FROM t",
        ] {
            assert_eq!(
                plan_count(sql, CountStrategy::Window),
                CountPlan::Passthrough {
                    query: sql.to_string()
                },
                "{sql}"
            );
        }
    }

    #[test]
    fn test_cte_is_a_read_query() {
        assert!(wants_injection(
            "WITH x AS (SELECT 1 AS a) SELECT a FROM x",
            CountStrategy::Window
        ));
        assert_eq!(
            count_query_for("WITH x AS (SELECT 1 AS a) SELECT a FROM x"),
            "SELECT COUNT(*) FROM (WITH x AS (SELECT 1 AS a) SELECT a FROM x) AS _qb_base"
        );
    }

    #[test]
    fn test_data_query_accessor() {
        let plan = plan_count("SELECT a FROM t", CountStrategy::SeparateQuery);
        assert_eq!(plan.data_query(), "SELECT a FROM t");
    }
}
