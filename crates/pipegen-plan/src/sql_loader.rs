//! C1 — SQL Loader: reads, cleans, and orders a project's SQL statements,
//! and extracts the topic names they reference.

use pipegen_core::error::PipegenError;
use pipegen_core::model::{SQLStatement, StatementKind};
use regex::Regex;
use std::path::Path;

/// Loads every `*.sql` file under `dir`, strips comments, validates shallow
/// syntactic presence of a known statement keyword, and orders them by
/// filename (lexicographic). `order` is assigned starting at 1.
///
/// Fails with [`PipegenError::ProjectInvalid`] if `dir/sql` doesn't exist,
/// contains no `.sql` files, or a file is empty or lacks a recognizable
/// statement keyword after comment stripping.
pub fn load_sql(dir: &Path) -> Result<Vec<SQLStatement>, PipegenError> {
    let sql_dir = dir.join("sql");
    if !sql_dir.is_dir() {
        return Err(PipegenError::ProjectInvalid(format!(
            "no sql/ directory found under {}",
            dir.display()
        )));
    }

    let mut paths: Vec<_> = std::fs::read_dir(&sql_dir)
        .map_err(|e| {
            PipegenError::ProjectInvalid(format!("failed to read {}: {e}", sql_dir.display()))
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("sql"))
        .collect();

    if paths.is_empty() {
        return Err(PipegenError::ProjectInvalid(format!(
            "no .sql files found under {}",
            sql_dir.display()
        )));
    }

    paths.sort();

    let mut statements = Vec::with_capacity(paths.len());
    for (idx, path) in paths.iter().enumerate() {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipegenError::ProjectInvalid(format!("failed to read {}: {e}", path.display()))
        })?;
        let content = strip_comments(&raw);
        if content.trim().is_empty() {
            return Err(PipegenError::ProjectInvalid(format!(
                "{} is empty after stripping comments",
                path.display()
            )));
        }

        let kind = classify(&content).ok_or_else(|| {
            PipegenError::ProjectInvalid(format!(
                "{} contains no CREATE TABLE / INSERT INTO / SELECT statement",
                path.display()
            ))
        })?;

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("statement")
            .to_string();

        statements.push(SQLStatement {
            name,
            content,
            order: idx + 1,
            kind,
        });
    }

    Ok(statements)
}

/// Strips `--` line comments and `/* ... */` block comments. Does not
/// attempt to respect comment markers inside string literals: PipeGen's own
/// generated SQL never embeds them, and the spec's contract is "inline/line
/// comments stripped", not a full SQL tokenizer.
fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_block_comment = false;

    while let Some(c) = chars.next() {
        if in_block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block_comment = false;
            }
            continue;
        }
        if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            in_block_comment = true;
            continue;
        }
        if c == '-' && chars.peek() == Some(&'-') {
            // Skip to end of line.
            for next in chars.by_ref() {
                if next == '\n' {
                    out.push('\n');
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }

    out
}

fn classify(content: &str) -> Option<StatementKind> {
    let upper = content.to_uppercase();
    if upper.contains("CREATE TABLE") {
        Some(StatementKind::CreateTable)
    } else if upper.contains("CREATE VIEW") {
        Some(StatementKind::CreateView)
    } else if upper.contains("INSERT INTO") {
        Some(StatementKind::Insert)
    } else if upper.contains("SELECT") {
        Some(StatementKind::Select)
    } else {
        None
    }
}

/// Scans `CREATE TABLE` statements for a `'topic' = '<name>'` WITH-clause
/// option, returning the topic names in first-seen order, deduplicated.
pub fn extract_topics(statements: &[SQLStatement]) -> Vec<String> {
    // Matches 'topic' = 'name' or "topic" = "name" with optional whitespace
    // around '=', case-insensitively on the key.
    let re = Regex::new(r#"(?i)['"]topic['"]\s*=\s*['"]([^'"]+)['"]"#).expect("valid regex");

    let mut seen = std::collections::HashSet::new();
    let mut topics = Vec::new();
    for stmt in statements {
        if stmt.kind != StatementKind::CreateTable {
            continue;
        }
        for cap in re.captures_iter(&stmt.content) {
            let topic = cap[1].to_string();
            if seen.insert(topic.clone()) {
                topics.push(topic);
            }
        }
    }
    topics
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_sql(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join("sql").join(name), content).unwrap();
    }

    #[test]
    fn loads_and_orders_statements_by_filename() {
        let project = tempfile::tempdir().unwrap();
        std::fs::create_dir(project.path().join("sql")).unwrap();
        write_sql(
            project.path(),
            "02_insert.sql",
            "INSERT INTO out SELECT * FROM in_table",
        );
        write_sql(
            project.path(),
            "01_create.sql",
            "-- source table\nCREATE TABLE in_table (id INT) WITH ('topic' = 'input-events')",
        );

        let stmts = load_sql(project.path()).unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].name, "01_create");
        assert_eq!(stmts[0].order, 1);
        assert_eq!(stmts[1].name, "02_insert");
        assert_eq!(stmts[1].order, 2);
        assert!(!stmts[0].content.contains("-- source table"));
    }

    #[test]
    fn fails_on_empty_statement() {
        let project = tempfile::tempdir().unwrap();
        std::fs::create_dir(project.path().join("sql")).unwrap();
        write_sql(project.path(), "01_empty.sql", "-- just a comment\n");

        assert!(load_sql(project.path()).is_err());
    }

    #[test]
    fn fails_on_missing_sql_dir() {
        let project = tempfile::tempdir().unwrap();
        assert!(load_sql(project.path()).is_err());
    }

    #[test]
    fn extracts_topics_in_first_seen_order() {
        let stmts = vec![
            SQLStatement {
                name: "a".into(),
                content: "CREATE TABLE a (id INT) WITH ('connector'='kafka', 'topic' = 'input-events')".into(),
                order: 1,
                kind: StatementKind::CreateTable,
            },
            SQLStatement {
                name: "b".into(),
                content: "CREATE TABLE b (id INT) WITH ('topic' = 'output-results')".into(),
                order: 2,
                kind: StatementKind::CreateTable,
            },
            SQLStatement {
                name: "c".into(),
                content: "CREATE TABLE c (id INT) WITH ('topic' = 'input-events')".into(),
                order: 3,
                kind: StatementKind::CreateTable,
            },
        ];

        assert_eq!(
            extract_topics(&stmts),
            vec!["input-events".to_string(), "output-results".to_string()]
        );
    }
}
