//! Settings key-value store (spec.md §3 "Setting", §6).

use super::{Setting, SettingValueType, Store};
use aqlab_common::Result;
use sqlx::Row;

fn row_to_setting(row: &sqlx::sqlite::SqliteRow) -> Setting {
    Setting {
        key: row.get("key"),
        value: row.get("value"),
        value_type: SettingValueType::parse(row.get("value_type")),
        category: row.get("category"),
    }
}

impl Store {
    pub async fn get_setting(&self, key: &str) -> Result<Option<Setting>> {
        let row = sqlx::query("SELECT * FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_setting(&r)))
    }

    pub async fn set_setting(
        &self,
        key: &str,
        value: &str,
        value_type: SettingValueType,
        category: &str,
    ) -> Result<Setting> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, value_type, category) VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, value_type = excluded.value_type, category = excluded.category
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(value_type.as_str())
        .bind(category)
        .execute(&self.pool)
        .await?;

        Ok(self.get_setting(key).await?.expect("just inserted"))
    }

    pub async fn list_settings(&self, category: Option<&str>) -> Result<Vec<Setting>> {
        let rows = match category {
            Some(category) => {
                sqlx::query("SELECT * FROM settings WHERE category = ? ORDER BY key")
                    .bind(category)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM settings ORDER BY key")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows.iter().map(row_to_setting).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrip() {
        let store = Store::connect_in_memory().await.unwrap();
        store
            .set_setting("scanner.worker_count", "4", SettingValueType::Int, "scanner")
            .await
            .unwrap();

        let setting = store.get_setting("scanner.worker_count").await.unwrap().unwrap();
        assert_eq!(setting.value, "4");
        assert_eq!(setting.value_type, SettingValueType::Int);
    }

    #[tokio::test]
    async fn set_is_idempotent_upsert() {
        let store = Store::connect_in_memory().await.unwrap();
        store
            .set_setting("k", "1", SettingValueType::Int, "cat")
            .await
            .unwrap();
        store
            .set_setting("k", "2", SettingValueType::Int, "cat")
            .await
            .unwrap();

        let all = store.list_settings(Some("cat")).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, "2");
    }

    #[tokio::test]
    async fn missing_setting_is_none_not_error() {
        let store = Store::connect_in_memory().await.unwrap();
        assert!(store.get_setting("nope").await.unwrap().is_none());
    }
}
