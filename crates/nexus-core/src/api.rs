use chrono::Utc;
use serde_json::Value;

use crate::config::{ApiConfig, TargetConfig};
use crate::error::AppError;
use crate::models::{Record, ResponseBody};
use crate::resilient::{RequestOptions, ResilientClient};
use crate::scrape::CollectOutcome;
use crate::traits::Transport;

/// Collects records from a JSON API target through a [`ResilientClient`].
pub struct ApiCollector<'a, T: Transport> {
    client: &'a ResilientClient<T>,
    options: RequestOptions,
}

impl<'a, T: Transport> ApiCollector<'a, T> {
    pub fn new(client: &'a ResilientClient<T>, options: RequestOptions) -> Self {
        Self { client, options }
    }

    /// GET every start path and turn the payloads into records.
    ///
    /// Paths that yield no response are logged and skipped.
    pub async fn collect(&self, target: &TargetConfig) -> Result<CollectOutcome, AppError> {
        let mut outcome = CollectOutcome::default();

        for path in &target.start_paths {
            match self.client.get(path, &self.options).await? {
                Some(body) => {
                    let records = to_records(body, &target.api);
                    tracing::info!(%path, items = records.len(), "Fetched {} records", records.len());
                    outcome.pages += 1;
                    outcome.records.extend(records);
                }
                None => {
                    tracing::warn!(target_name = %target.name, %path, "No data returned");
                }
            }
        }

        Ok(outcome)
    }
}

/// Normalise a decoded payload into records.
pub fn to_records(body: ResponseBody, api: &ApiConfig) -> Vec<Record> {
    let value = match body {
        ResponseBody::Json(value) => value,
        raw @ ResponseBody::Raw(_) => return vec![into_record(raw.into_value())],
    };

    let selected = match api.records_pointer.as_deref() {
        Some(pointer) => match value.pointer(pointer) {
            Some(v) => v.clone(),
            None => {
                tracing::warn!(%pointer, "Records pointer not found in response");
                return Vec::new();
            }
        },
        None => value,
    };

    let items = match selected {
        Value::Array(items) => items,
        other => vec![other],
    };

    let scraped_at = Utc::now().to_rfc3339();
    items
        .into_iter()
        .map(|item| {
            let mut record = if api.fields.is_empty() {
                into_record(item)
            } else {
                project(&item, api)
            };
            record
                .entry("scraped_at")
                .or_insert_with(|| Value::String(scraped_at.clone()));
            record
        })
        .collect()
}

fn into_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => Record::from_iter([("value".to_string(), other)]),
    }
}

/// Pick the configured fields; pointers without a leading `/` are plain keys.
fn project(item: &Value, api: &ApiConfig) -> Record {
    api.fields
        .iter()
        .map(|(name, pointer)| {
            let found = if pointer.starts_with('/') {
                item.pointer(pointer)
            } else {
                item.get(pointer)
            };
            let value = match (found, api.max_field_len) {
                (Some(Value::String(s)), Some(max)) => {
                    Value::String(s.chars().take(max).collect())
                }
                (Some(v), _) => v.clone(),
                (None, _) => Value::Null,
            };
            (name.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::TargetMode;
    use crate::models::HttpResponse;
    use crate::testutil::MockTransport;

    fn api_target(paths: &[&str], api: ApiConfig) -> TargetConfig {
        TargetConfig {
            name: "posts".into(),
            mode: TargetMode::Api,
            base_url: "https://jsonplaceholder.test".into(),
            start_paths: paths.iter().map(|p| p.to_string()).collect(),
            selectors: Default::default(),
            pagination: Default::default(),
            api,
            storage: Default::default(),
            notify: false,
        }
    }

    fn normalising_api() -> ApiConfig {
        ApiConfig {
            records_pointer: None,
            fields: BTreeMap::from([
                ("id".to_string(), "/id".to_string()),
                ("title".to_string(), "/title".to_string()),
                ("user_id".to_string(), "userId".to_string()),
            ]),
            max_field_len: Some(5),
        }
    }

    #[test]
    fn projects_and_truncates_fields() {
        let body = ResponseBody::Json(serde_json::json!([
            {"id": 1, "title": "sunt aut facere", "userId": 7, "body": "ignored"},
            {"id": 2}
        ]));

        let records = to_records(body, &normalising_api());

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], serde_json::json!(1));
        assert_eq!(records[0]["title"], serde_json::json!("sunt "));
        assert_eq!(records[0]["user_id"], serde_json::json!(7));
        assert!(!records[0].contains_key("body"));
        assert!(records[0].contains_key("scraped_at"));
        assert_eq!(records[1]["title"], Value::Null);
    }

    #[test]
    fn follows_records_pointer() {
        let body = ResponseBody::Json(serde_json::json!({"data": {"items": [{"a": 1}, {"a": 2}]}}));
        let api = ApiConfig {
            records_pointer: Some("/data/items".into()),
            ..Default::default()
        };

        let records = to_records(body, &api);

        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["a"], serde_json::json!(2));
    }

    #[test]
    fn missing_records_pointer_yields_nothing() {
        let body = ResponseBody::Json(serde_json::json!({"data": []}));
        let api = ApiConfig {
            records_pointer: Some("/items".into()),
            ..Default::default()
        };
        assert!(to_records(body, &api).is_empty());
    }

    #[test]
    fn raw_text_becomes_content_record() {
        let records = to_records(ResponseBody::Raw("hello".into()), &ApiConfig::default());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["content"], serde_json::json!("hello"));
    }

    #[test]
    fn scalars_are_wrapped() {
        let records = to_records(ResponseBody::Json(serde_json::json!([1, 2])), &ApiConfig::default());
        assert_eq!(records[0]["value"], serde_json::json!(1));
        assert!(records[0].contains_key("scraped_at"));
    }

    #[tokio::test(start_paused = true)]
    async fn collects_from_each_path_and_skips_failures() {
        let transport = MockTransport::with_responses(vec![
            Ok(HttpResponse::new(200, r#"[{"id": 1}, {"id": 2}]"#)),
            Ok(HttpResponse::new(404, "missing")),
        ]);
        let client = ResilientClient::new("https://jsonplaceholder.test", transport.clone()).unwrap();
        let collector = ApiCollector::new(&client, RequestOptions::default());

        let outcome = collector
            .collect(&api_target(&["/posts", "/missing"], ApiConfig::default()))
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.pages, 1);
        assert_eq!(transport.call_count(), 2);
        assert_eq!(transport.requests()[0].url, "https://jsonplaceholder.test/posts");
    }
}
