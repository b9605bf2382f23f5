use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use crate::application::ports::outbound::{CountTable, SelectionLogError, SelectionLogPort};
use crate::domain::value_objects::SelectionState;

/// Selection counts per category, one row per (table, item)
pub struct SqliteSelectionLog {
    pool: SqlitePool,
}

impl SqliteSelectionLog {
    pub async fn new(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        // Create table if not exists
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS selection_counts (
                category TEXT NOT NULL,
                table_name TEXT NOT NULL,
                item TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (category, table_name, item)
            )
        "#).execute(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl SelectionLogPort for SqliteSelectionLog {
    async fn record(&self, selection: &SelectionState) -> Result<(), SelectionLogError> {
        let category = selection.category();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SelectionLogError::Database(e.to_string()))?;

        for table in CountTable::ALL {
            for item in table.items(selection) {
                sqlx::query(
                    r#"
                    INSERT INTO selection_counts (category, table_name, item, count, updated_at)
                    VALUES (?, ?, ?, 1, CURRENT_TIMESTAMP)
                    ON CONFLICT (category, table_name, item)
                    DO UPDATE SET count = count + 1, updated_at = CURRENT_TIMESTAMP
                    "#,
                )
                .bind(category)
                .bind(table.as_str())
                .bind(&item)
                .execute(&mut *tx)
                .await
                .map_err(|e| SelectionLogError::Database(e.to_string()))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| SelectionLogError::Database(e.to_string()))?;
        debug!(category, "Selection counts recorded");
        Ok(())
    }

    async fn counts(
        &self,
        category: &str,
        table: CountTable,
    ) -> Result<Vec<(String, i64)>, SelectionLogError> {
        sqlx::query_as(
            "SELECT item, count FROM selection_counts WHERE category = ? AND table_name = ? ORDER BY count DESC, item",
        )
        .bind(category)
        .bind(table.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SelectionLogError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::domain::value_objects::{BaseModelChoice, CharacterChoice, OverlaySelection};

    async fn log() -> SqliteSelectionLog {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteSelectionLog::new(pool).await.unwrap()
    }

    fn selection(model: &str, overlays: &[&str]) -> SelectionState {
        SelectionState {
            base_model: BaseModelChoice {
                category: "pony".to_string(),
                name: model.to_string(),
                path: format!("pony/{model}.safetensors"),
            },
            character: CharacterChoice::Named {
                name: "alice".to_string(),
                path: Some("pony/char/alice.safetensors".to_string()),
            },
            overlays: OverlaySelection {
                skipped: false,
                names: overlays.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
                rule_tags: json!({}),
            },
        }
    }

    #[tokio::test]
    async fn test_record_increments_every_table() {
        let log = log().await;
        log.record(&selection("m1", &["hat", "maid"])).await.unwrap();
        log.record(&selection("m1", &["hat"])).await.unwrap();
        log.record(&selection("m2", &[])).await.unwrap();

        assert_eq!(
            log.counts("pony", CountTable::BaseModel).await.unwrap(),
            vec![("m1".to_string(), 2), ("m2".to_string(), 1)]
        );
        assert_eq!(
            log.counts("pony", CountTable::Overlay).await.unwrap(),
            vec![("hat".to_string(), 2), ("maid".to_string(), 1)]
        );
        assert_eq!(
            log.counts("pony", CountTable::Character).await.unwrap(),
            vec![("alice".to_string(), 3)]
        );
        let combos = log.counts("pony", CountTable::Combination).await.unwrap();
        assert_eq!(combos.len(), 3);
        assert!(combos.contains(&("m1|alice|hat,maid".to_string(), 1)));
    }

    #[tokio::test]
    async fn test_counts_are_scoped_by_category() {
        let log = log().await;
        log.record(&selection("m1", &[])).await.unwrap();
        assert!(log.counts("sdxl", CountTable::BaseModel).await.unwrap().is_empty());
    }
}
