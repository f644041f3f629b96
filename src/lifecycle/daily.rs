//! Fixed daily indices
//!
//! Bypasses rollover entirely: the write target is `<alias>-<YYYY.MM.DD>`
//! for the current UTC day, created lazily on the first write of the day
//! with the alias attached so reads keep spanning every day.

use crate::elastic::api::ElasticApi;
use crate::elastic::EsError;
use crate::lifecycle::LifecycleError;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct DailyIndex {
    api: Arc<dyn ElasticApi>,
    alias: String,
    /// Most recently created daily index, to skip the create call on
    /// every flush within the same day.
    last_created: Mutex<Option<String>>,
}

impl DailyIndex {
    pub fn new(api: Arc<dyn ElasticApi>, alias: impl Into<String>) -> Self {
        Self {
            api,
            alias: alias.into(),
            last_created: Mutex::new(None),
        }
    }

    /// Daily index name for a point in time.
    pub fn index_for(&self, at: DateTime<Utc>) -> String {
        format!("{}-{}", self.alias, at.format("%Y.%m.%d"))
    }

    /// Today's write target, creating the index on first use.
    pub async fn write_target(&self) -> Result<String, LifecycleError> {
        let index = self.index_for(Utc::now());

        let mut last = self.last_created.lock().await;
        if last.as_deref() == Some(index.as_str()) {
            return Ok(index);
        }

        match self
            .api
            .create_index(
                &index,
                json!({ "aliases": { self.alias.clone(): {} } }),
            )
            .await
        {
            Ok(()) => {
                tracing::info!(index = %index, "Created daily index");
            }
            // Another worker or a previous day-start already created it.
            Err(EsError::Api { status: 400, message })
                if message.contains("resource_already_exists_exception") => {}
            Err(e) => return Err(e.into()),
        }
        *last = Some(index.clone());
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elastic::testing::MockElastic;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_index_name_format() {
        let api = Arc::new(MockElastic::default());
        let daily = DailyIndex::new(api, "prom-metrics");
        let at = DateTime::parse_from_rfc3339("2024-03-07T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(daily.index_for(at), "prom-metrics-2024.03.07");
    }

    #[tokio::test]
    async fn test_create_happens_once_per_day() {
        let api = Arc::new(MockElastic::default());
        let daily = DailyIndex::new(Arc::clone(&api) as Arc<dyn ElasticApi>, "prom-metrics");

        let first = daily.write_target().await.unwrap();
        let second = daily.write_target().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(api.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_index_is_not_an_error() {
        let api = Arc::new(MockElastic::default());
        api.create_conflict.store(true, Ordering::SeqCst);
        let daily = DailyIndex::new(Arc::clone(&api) as Arc<dyn ElasticApi>, "prom-metrics");

        assert!(daily.write_target().await.is_ok());
    }
}
