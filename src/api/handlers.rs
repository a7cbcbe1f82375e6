//! API Handlers
//!
//! HTTP request handlers for the admin endpoints. Values added over HTTP are
//! stored as `serde_json::Value`.

use std::any::type_name;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::debug;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    AddEntryRequest, AddEntryResponse, ClearResponse, DeleteResponse, GetEntryResponse,
    GroupQuery, HealthResponse, StatsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Shared cache handle; clones refer to the same store
    pub cache: CacheStore,
}

impl AppState {
    /// Creates a new AppState with the given cache store.
    pub fn new(cache: CacheStore) -> Self {
        Self { cache }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(CacheStore::new(config.cache_config())?))
    }
}

/// Handler for PUT /entries
///
/// Adds an entry unless a live one already exists under the key.
/// Responds `201 Created` when inserted and `200 OK` when left untouched.
pub async fn add_entry_handler(
    State(state): State<AppState>,
    Json(req): Json<AddEntryRequest>,
) -> Result<(StatusCode, Json<AddEntryResponse>)> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidArgument(error_msg));
    }

    let options = req.to_options();
    let added = state.cache.add(&req.key, req.value, options)?;
    let status = if added {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(AddEntryResponse::new(req.key, req.group, added))))
}

/// Handler for GET /entries/:key
///
/// A successful read refreshes the entry's sliding window.
pub async fn get_entry_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<GroupQuery>,
) -> Result<Json<GetEntryResponse>> {
    let entry = state
        .cache
        .get_entry(&key, query.group())?
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    let value = entry
        .value()
        .as_ref()
        .downcast_ref::<serde_json::Value>()
        .cloned()
        .ok_or_else(|| CacheError::TypeMismatch {
            key: entry.key().to_string(),
            expected: type_name::<serde_json::Value>(),
        })?;

    Ok(Json(GetEntryResponse::from_entry(&entry, value)))
}

/// Handler for DELETE /entries/:key
pub async fn delete_entry_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<GroupQuery>,
) -> Result<Json<DeleteResponse>> {
    if !state.cache.remove(&key, query.group())? {
        return Err(CacheError::NotFound(key));
    }

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for DELETE /entries
///
/// Clears one group, or the whole store when no group is given.
pub async fn clear_handler(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
) -> Json<ClearResponse> {
    let removed = state.cache.clear(query.group());
    debug!(removed, group = ?query.group, "Clear requested over HTTP");

    Json(ClearResponse {
        removed,
        group: query.group,
    })
}

/// Handler for GET /stats
pub async fn stats_handler(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
) -> Json<StatsResponse> {
    let live = state.cache.count(query.group());
    let stats = state.cache.stats();

    Json(StatsResponse::new(
        &stats,
        live,
        state.cache.is_sweeper_running(),
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use serde_json::json;

    fn test_state() -> AppState {
        AppState::new(CacheStore::new(CacheConfig::default()).unwrap())
    }

    fn add_request(key: &str, value: serde_json::Value) -> AddEntryRequest {
        AddEntryRequest {
            key: key.to_string(),
            group: None,
            value,
            absolute_expiration: None,
            sliding_expiration_ms: None,
            watch_paths: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_add_and_get_handler() {
        let state = test_state();

        let (status, response) =
            add_entry_handler(State(state.clone()), Json(add_request("test_key", json!({"a": 1}))))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(response.added);

        let response = get_entry_handler(
            State(state.clone()),
            Path("test_key".to_string()),
            Query(GroupQuery::default()),
        )
        .await
        .unwrap();
        assert_eq!(response.value, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_add_existing_key_reports_not_added() {
        let state = test_state();
        add_entry_handler(State(state.clone()), Json(add_request("k", json!(1))))
            .await
            .unwrap();

        let (status, response) =
            add_entry_handler(State(state.clone()), Json(add_request("k", json!(2))))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(!response.added);
        assert_eq!(state.cache.get::<serde_json::Value>("k", None).unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let state = test_state();

        let result = get_entry_handler(
            State(state),
            Path("nonexistent".to_string()),
            Query(GroupQuery::default()),
        )
        .await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_non_json_value() {
        let state = test_state();
        state
            .cache
            .add("native", 5_u32, crate::cache::EntryOptions::new())
            .unwrap();

        let result = get_entry_handler(
            State(state),
            Path("native".to_string()),
            Query(GroupQuery::default()),
        )
        .await;
        assert!(matches!(result, Err(CacheError::TypeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let state = test_state();
        add_entry_handler(State(state.clone()), Json(add_request("to_delete", json!("v"))))
            .await
            .unwrap();

        let result = delete_entry_handler(
            State(state.clone()),
            Path("to_delete".to_string()),
            Query(GroupQuery::default()),
        )
        .await;
        assert!(result.is_ok());

        let result = delete_entry_handler(
            State(state),
            Path("to_delete".to_string()),
            Query(GroupQuery::default()),
        )
        .await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_clear_handler_by_group() {
        let state = test_state();
        let mut grouped = add_request("a", json!(1));
        grouped.group = Some("g".to_string());
        add_entry_handler(State(state.clone()), Json(grouped)).await.unwrap();
        add_entry_handler(State(state.clone()), Json(add_request("b", json!(2))))
            .await
            .unwrap();

        let response = clear_handler(
            State(state.clone()),
            Query(GroupQuery {
                group: Some("g".to_string()),
            }),
        )
        .await;
        assert_eq!(response.removed, 1);
        assert_eq!(state.cache.count(None), 1);
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let state = test_state();

        let response = stats_handler(State(state), Query(GroupQuery::default())).await;
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 0);
        assert_eq!(response.live_entries, 0);
        assert!(!response.sweeper_running);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test]
    async fn test_add_invalid_request() {
        let state = test_state();

        let result = add_entry_handler(State(state), Json(add_request("", json!(1)))).await;
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_add_out_of_range_sliding() {
        let state = test_state();
        let mut req = add_request("k", json!(1));
        req.sliding_expiration_ms = Some(0);

        let result = add_entry_handler(State(state), Json(req)).await;
        assert!(matches!(result, Err(CacheError::OutOfRange(_))));
    }
}
