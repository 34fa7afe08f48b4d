//! Catalog text parsing shared by the readers
//!
//! Enum literals come from native enum column types (`enum('a','b')` in
//! MySQL, `pg_enum` in PostgreSQL) or from `CHECK (col IN (...))` constraints.

use crate::schema::EnumValue;

/// Literals of a MySQL `enum(...)` / `set(...)` column type
pub fn parse_enum_column_type(column_type: &str) -> Vec<String> {
    let lower = column_type.trim_start().to_ascii_lowercase();
    if !(lower.starts_with("enum") || lower.starts_with("set")) {
        return Vec::new();
    }
    extract_quoted_literals(column_type)
}

/// Every single-quoted literal in `s`, with `''` and `\'` unescaped
pub fn extract_quoted_literals(s: &str) -> Vec<String> {
    let mut literals = Vec::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\'' {
            continue;
        }
        let mut literal = String::new();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        literal.push(escaped);
                    }
                }
                '\'' if chars.peek() == Some(&'\'') => {
                    chars.next();
                    literal.push('\'');
                }
                '\'' => break,
                other => literal.push(other),
            }
        }
        literals.push(literal);
    }

    literals
}

/// Body of every `CHECK ( ... )` clause in a DDL fragment, outer parens removed
pub fn check_constraints(sql: &str) -> Vec<String> {
    let upper = sql.to_ascii_uppercase();
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut search_from = 0;

    while let Some(rel) = upper[search_from..].find("CHECK") {
        let start = search_from + rel;
        search_from = start + "CHECK".len();

        let preceded_by_word = start > 0 && is_word_byte(bytes[start - 1]);
        let followed_by_word = bytes.get(search_from).is_some_and(|b| is_word_byte(*b));
        if preceded_by_word || followed_by_word {
            continue;
        }

        let Some(open) = sql[search_from..].find('(').map(|i| search_from + i) else {
            break;
        };
        if !sql[search_from..open].trim().is_empty() {
            continue;
        }

        if let Some(close) = matching_paren(sql, open) {
            found.push(sql[open + 1..close].trim().to_string());
            search_from = close + 1;
        }
    }

    found
}

/// Every `col IN ('a', 'b')` and `col = ANY (ARRAY['a', 'b'])` list in a CHECK body
///
/// Accepts the catalog spellings of all three engines, including MySQL's
/// backquoted identifiers and charset introducers (`_utf8mb4'a'`).
pub fn parse_check_in_lists(expr: &str) -> Vec<(String, Vec<String>)> {
    let lower = expr.to_ascii_lowercase();
    let mut found = Vec::new();
    let mut from = 0;

    while let Some(op) = [" in (", " in(", "= any"]
        .iter()
        .filter_map(|needle| lower[from..].find(needle).map(|i| from + i))
        .min()
    {
        let Some(open) = expr[op..].find('(').map(|i| op + i) else {
            break;
        };
        let Some(close) = matching_paren(expr, open) else {
            break;
        };
        let prefix = &expr[from..op];
        from = close + 1;

        if is_negated(prefix) {
            continue;
        }
        let Some(column) = trailing_identifier(prefix) else {
            continue;
        };
        let values = extract_quoted_literals(&expr[open..=close]);
        if !values.is_empty() {
            found.push((column, values));
        }
    }

    found
}

/// Order enum literals by column declaration, dropping unknown columns and duplicates
pub fn order_by_columns(columns: &[String], found: Vec<(String, Vec<String>)>) -> Vec<EnumValue> {
    let mut ordered = Vec::new();

    for column in columns {
        let mut seen: Vec<&str> = Vec::new();
        for (_, values) in found.iter().filter(|(c, _)| c.eq_ignore_ascii_case(column)) {
            for value in values {
                if !seen.contains(&value.as_str()) {
                    seen.push(value);
                    ordered.push(EnumValue::new(column.as_str(), value.as_str()));
                }
            }
        }
    }

    ordered
}

fn is_negated(prefix: &str) -> bool {
    let lower = prefix.trim_end().to_ascii_lowercase();
    lower == "not" || lower.ends_with(" not")
}

fn trailing_identifier(prefix: &str) -> Option<String> {
    let mut s = prefix.trim_end();

    // drop a trailing cast such as `::text` or `::character varying`
    if let Some(idx) = s.rfind("::") {
        let cast = &s[idx + 2..];
        if cast
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '[' | ']'))
        {
            s = s[..idx].trim_end();
        }
    }

    let s = s.trim_end_matches(')').trim_end();
    let start = s
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphanumeric() || matches!(c, '_' | '"' | '`' | '[' | ']'))
        .last()
        .map(|(i, _)| i)?;

    let ident = s[start..].trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'));
    if ident.is_empty() {
        None
    } else {
        Some(ident.to_string())
    }
}

fn matching_paren(sql: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_quote = false;

    for (i, c) in sql[open..].char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_mysql_enum() {
        assert_eq!(
            parse_enum_column_type("enum('active','inactive','banned')"),
            strings(&["active", "inactive", "banned"])
        );
        assert_eq!(
            parse_enum_column_type("set('a','b')"),
            strings(&["a", "b"])
        );
        assert_eq!(parse_enum_column_type("varchar(255)"), Vec::<String>::new());
    }

    #[test]
    fn test_quoted_literal_escapes() {
        assert_eq!(
            extract_quoted_literals("enum('it''s','back\\'slash','')"),
            strings(&["it's", "back'slash", ""])
        );
    }

    #[test]
    fn test_check_constraints_in_create_table() {
        let sql = "CREATE TABLE orders (\n  id INTEGER PRIMARY KEY,\n  status TEXT CHECK (status IN ('new', 'paid (full)')),\n  qty INTEGER CHECK(qty > 0),\n  rechecked INTEGER\n)";
        let checks = check_constraints(sql);
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0], "status IN ('new', 'paid (full)')");
        assert_eq!(checks[1], "qty > 0");
    }

    fn single(expr: &str) -> (String, Vec<String>) {
        let mut lists = parse_check_in_lists(expr);
        assert_eq!(lists.len(), 1, "{expr}");
        lists.remove(0)
    }

    #[test]
    fn test_parse_sqlite_in_list() {
        let (column, values) = single("status IN ('new', 'paid')");
        assert_eq!(column, "status");
        assert_eq!(values, strings(&["new", "paid"]));

        let (column, _) = single("\"kind\" in('a')");
        assert_eq!(column, "kind");
    }

    #[test]
    fn test_parse_postgres_any_array() {
        let def = "((status)::text = ANY ((ARRAY['draft'::character varying, 'sent'::character varying])::text[]))";
        let (column, values) = single(def);
        assert_eq!(column, "status");
        assert_eq!(values, strings(&["draft", "sent"]));

        let def = "(role = ANY (ARRAY['admin'::text, 'user'::text]))";
        let (column, values) = single(def);
        assert_eq!(column, "role");
        assert_eq!(values, strings(&["admin", "user"]));
    }

    #[test]
    fn test_parse_mysql_check_clause() {
        let (column, values) = single("(`status` in (_utf8mb4'new',_utf8mb4'paid'))");
        assert_eq!(column, "status");
        assert_eq!(values, strings(&["new", "paid"]));

        let (column, values) = single("(`kind` in (_latin1'it''s',_latin1'b'))");
        assert_eq!(column, "kind");
        assert_eq!(values, strings(&["it's", "b"]));
    }

    #[test]
    fn test_parse_every_in_list_in_one_check() {
        let lists = parse_check_in_lists("a IN ('x') AND b IN ('y', 'z')");
        assert_eq!(
            lists,
            vec![
                ("a".to_string(), strings(&["x"])),
                ("b".to_string(), strings(&["y", "z"])),
            ]
        );

        let lists = parse_check_in_lists("a NOT IN ('x') AND b IN ('y')");
        assert_eq!(lists, vec![("b".to_string(), strings(&["y"]))]);
    }

    #[test]
    fn test_parse_check_rejects_other_shapes() {
        assert!(parse_check_in_lists("qty > 0").is_empty());
        assert!(parse_check_in_lists("status NOT IN ('x')").is_empty());
        assert!(parse_check_in_lists("id IN (1, 2)").is_empty());
    }

    #[test]
    fn test_order_by_columns() {
        let columns = strings(&["id", "status", "kind"]);
        let found = vec![
            ("kind".to_string(), strings(&["a"])),
            ("STATUS".to_string(), strings(&["new", "paid"])),
            ("status".to_string(), strings(&["paid", "void"])),
            ("missing".to_string(), strings(&["x"])),
        ];

        let ordered = order_by_columns(&columns, found);
        let keys: Vec<_> = ordered.iter().map(|e| e.key()).collect();
        assert_eq!(
            keys,
            vec!["status_new", "status_paid", "status_void", "kind_a"]
        );
    }
}
