//! C3 — Resource Planner: derives topic names, the run's prefix, and
//! input/output roles from the loaded SQL (spec §3, §4.3).

use chrono::Utc;
use pipegen_core::model::{Resources, SQLStatement};
use rand::Rng;

use crate::sql_loader::extract_topics;

/// Fallback topic names used when the loaded SQL declares no topics at all.
const FALLBACK_TOPICS: [&str; 3] = ["input-events", "output-results", "processed-events"];

/// Plans the broker resources for a run.
///
/// In local mode, SQL-derived topic names are used verbatim. In cloud mode,
/// each topic is prefixed with `pipegen-<yyyymmdd-hhmmss>-<8hex>`, computed
/// once per call so every topic in the run shares the same prefix. Role
/// assignment: with two or more topics, the first is the input and the
/// last is the output; with exactly one, both roles point to it.
pub fn plan_resources(statements: &[SQLStatement], local_mode: bool) -> Resources {
    let sql_topics = extract_topics(statements);

    let (prefix, topics): (String, Vec<String>) = if sql_topics.is_empty() {
        let base: Vec<String> = FALLBACK_TOPICS.iter().map(|s| s.to_string()).collect();
        if local_mode {
            (String::new(), base)
        } else {
            let prefix = generate_prefix();
            let prefixed = base.iter().map(|t| format!("{prefix}-{t}")).collect();
            (prefix, prefixed)
        }
    } else if local_mode {
        (String::new(), sql_topics)
    } else {
        let prefix = generate_prefix();
        let prefixed = sql_topics.iter().map(|t| format!("{prefix}-{t}")).collect();
        (prefix, prefixed)
    };

    let input_topic = topics.first().cloned().unwrap_or_default();
    let output_topic = topics.last().cloned().unwrap_or_default();

    Resources {
        prefix,
        input_topic,
        output_topic,
        topics,
    }
}

fn generate_prefix() -> String {
    let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
    let suffix: String = (0..8)
        .map(|_| {
            let n = rand::thread_rng().gen_range(0..16);
            std::char::from_digit(n, 16).unwrap()
        })
        .collect();
    format!("pipegen-{timestamp}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipegen_core::model::StatementKind;

    fn create_table(content: &str) -> SQLStatement {
        SQLStatement {
            name: "t".into(),
            content: content.into(),
            order: 1,
            kind: StatementKind::CreateTable,
        }
    }

    #[test]
    fn uses_sql_topics_verbatim_in_local_mode() {
        let stmts = vec![
            create_table("CREATE TABLE a (id INT) WITH ('topic' = 'orders')"),
            create_table("CREATE TABLE b (id INT) WITH ('topic' = 'enriched-orders')"),
        ];
        let resources = plan_resources(&stmts, true);
        assert_eq!(resources.input_topic, "orders");
        assert_eq!(resources.output_topic, "enriched-orders");
        assert_eq!(resources.prefix, "");
    }

    #[test]
    fn prefixes_topics_in_cloud_mode() {
        let stmts = vec![create_table(
            "CREATE TABLE a (id INT) WITH ('topic' = 'orders')",
        )];
        let resources = plan_resources(&stmts, false);
        assert!(resources.input_topic.starts_with(&resources.prefix));
        assert_eq!(resources.input_topic, resources.output_topic);
    }

    #[test]
    fn falls_back_when_no_sql_topics() {
        let stmts = vec![create_table("CREATE TABLE a (id INT)")];
        let resources = plan_resources(&stmts, true);
        assert_eq!(resources.topics, vec![
            "input-events".to_string(),
            "output-results".to_string(),
            "processed-events".to_string(),
        ]);
        assert_eq!(resources.input_topic, "input-events");
        assert_eq!(resources.output_topic, "processed-events");
    }

    #[test]
    fn single_topic_is_both_roles() {
        let stmts = vec![create_table(
            "CREATE TABLE a (id INT) WITH ('topic' = 'solo')",
        )];
        let resources = plan_resources(&stmts, true);
        assert_eq!(resources.input_topic, "solo");
        assert_eq!(resources.output_topic, "solo");
    }
}
