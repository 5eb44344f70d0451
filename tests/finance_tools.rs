//! Finance tools driven through the public `Tool` interface.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

use finance_agents::config::ValidationMode;
use finance_agents::finance::arithmetic::arithmetic_tools;
use finance_agents::finance::{ColumnsTool, ExecuteSqlTool, MetadataTool, TransactionData};
use finance_agents::tool::Tool;

const TRANSACTIONS: &str = r#"[
    {"date": "2024-03-01", "year": 2024, "month": 3, "type": "debit", "category": "rent", "amount": 950.0},
    {"date": "2024-03-02", "year": 2024, "month": 3, "type": "debit", "category": "groceries", "amount": 42.5},
    {"date": "2024-03-25", "year": 2024, "month": 3, "type": "credit", "category": "salary", "amount": 2800.0},
    {"date": "2024-04-02", "year": 2024, "month": 4, "type": "debit", "category": "groceries", "amount": 38.75}
]"#;

async fn data() -> Arc<TransactionData> {
    Arc::new(
        TransactionData::from_json_str(TRANSACTIONS, ValidationMode::Strict)
            .await
            .unwrap(),
    )
}

#[tokio::test]
async fn test_metadata_is_stable_across_calls() {
    let tool = MetadataTool::new(data().await);
    let first = tool.execute(json!({})).await.unwrap();
    let second = tool.execute(json!({})).await.unwrap();

    assert_eq!(
        first.output,
        json!({"types": ["debit", "credit"], "categories": ["rent", "groceries", "salary"]})
    );
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_columns_tool() {
    let tool = ColumnsTool::new(data().await);
    let result = tool.execute(json!({})).await.unwrap();
    assert_eq!(
        result.output,
        json!(["date", "year", "month", "type", "category", "amount", "description"])
    );
}

#[tokio::test]
async fn test_execute_sql_is_read_only() {
    let data = data().await;
    let tool = ExecuteSqlTool::new(data.clone());

    let denied = tool
        .execute(json!({"sql_query": "DELETE FROM transactions"}))
        .await
        .unwrap();
    assert!(denied
        .output
        .as_str()
        .unwrap()
        .starts_with("Error accessing data: "));

    let count = tool
        .execute(json!({"sql_query": "SELECT COUNT(*) AS n FROM transactions"}))
        .await
        .unwrap();
    assert_eq!(count.output, json!("   n\n0  4"));
}

#[tokio::test]
async fn test_execute_sql_cannot_lift_read_only_guard() {
    let data = data().await;
    let tool = ExecuteSqlTool::new(data.clone());

    let stacked = tool
        .execute(json!({
            "sql_query": "PRAGMA query_only = OFF; DELETE FROM transactions; SELECT COUNT(*) AS n FROM transactions"
        }))
        .await
        .unwrap();
    assert_eq!(
        stacked.output,
        json!("Error accessing data: only one SQL statement is allowed")
    );

    // A lone pragma cannot carry over into the next call
    tool.execute(json!({"sql_query": "PRAGMA query_only = OFF"}))
        .await
        .unwrap();
    let denied = tool
        .execute(json!({"sql_query": "DELETE FROM transactions;"}))
        .await
        .unwrap();
    assert!(denied
        .output
        .as_str()
        .unwrap()
        .starts_with("Error accessing data: "));

    let count = tool
        .execute(json!({"sql_query": "SELECT COUNT(*) AS n FROM transactions"}))
        .await
        .unwrap();
    assert_eq!(count.output, json!("   n\n0  4"));
    assert_eq!(
        data.metadata().await.unwrap().categories,
        vec!["rent", "groceries", "salary"]
    );
}

#[tokio::test]
async fn test_execute_sql_monthly_breakdown() {
    let tool = ExecuteSqlTool::new(data().await);
    let result = tool
        .execute(json!({
            "sql_query": "SELECT month, SUM(amount) AS spent FROM spending WHERE type = 'debit' GROUP BY month ORDER BY month",
            "table_name": "spending",
        }))
        .await
        .unwrap();
    assert_eq!(result.output, json!("   month  spent\n0      3  992.5\n1      4  38.75"));

    let bad_name = tool
        .execute(json!({"sql_query": "SELECT 1", "table_name": "drop table"}))
        .await
        .unwrap();
    assert_eq!(
        bad_name.output,
        json!("Error accessing data: invalid table name 'drop table'")
    );
}

#[tokio::test]
async fn test_percent_change_tool() {
    let tools = arithmetic_tools();
    let percent = tools.iter().find(|t| t.name() == "percent_change").unwrap();

    let rise = percent.execute(json!({"x": 80.0, "y": 100.0})).await.unwrap();
    assert_eq!(rise.output, json!(25.0));

    let fall = percent.execute(json!({"x": -50.0, "y": -75.0})).await.unwrap();
    assert_eq!(fall.output, json!(-50.0));
}
