//! HTTP adapter. Handlers translate URL parameters into job arguments and
//! results into JSON; validation happens here, before anything is published.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::error;

use crate::config::SwarmConfig;
use crate::core::executor::{Executor, Gathered};
use crate::core::sharding::ShardService;
use crate::error::SwarmError;

pub mod query_handlers;
pub mod sharding_handlers;

pub struct AppState {
    pub config: Arc<SwarmConfig>,
    pub executor: Executor,
    pub shards: ShardService,
}

impl AppState {
    pub fn new(config: Arc<SwarmConfig>, executor: Executor) -> Self {
        let shards = ShardService::new(config.clone(), executor.clone());
        AppState {
            config,
            executor,
            shards,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/corpora/:corpus_id/split", post(sharding_handlers::create_split))
        .route("/corpora/:corpus_id/multisample", post(sharding_handlers::create_multisample))
        .route(
            "/corpora/:corpus_id/coll-freq-data/:variant",
            post(sharding_handlers::coll_freq_data),
        )
        .route("/freqs/:corpus_id", get(query_handlers::freq_distrib))
        .route("/freqs-parallel/:corpus_id", get(query_handlers::freq_distrib_parallel))
        .route("/text-types/:corpus_id", get(query_handlers::text_types))
        .route("/text-types-parallel/:corpus_id", get(query_handlers::text_types_parallel))
        .route("/concordance/:corpus_id", get(query_handlers::concordance))
        .route("/collocations/:corpus_id", get(query_handlers::collocations))
        .with_state(state)
}

impl SwarmError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SwarmError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SwarmError::Conflict(_) => StatusCode::CONFLICT,
            SwarmError::NotFound(_) => StatusCode::NOT_FOUND,
            SwarmError::RowsOutOfRange => StatusCode::RANGE_NOT_SATISFIABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SwarmError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Params = HashMap<String, String>;

/// 206 when the gather stopped before every shard answered.
pub(crate) fn gathered_status<T>(gathered: &Gathered<T>) -> StatusCode {
    if gathered.partial {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    }
}

/// Optional numeric query parameter. Present but unparsable is a validation
/// error.
pub(crate) fn parse_param<T: FromStr>(params: &Params, name: &str) -> Result<Option<T>, SwarmError> {
    match params.get(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            SwarmError::Validation(format!("parameter '{}' has invalid value '{}'", name, raw))
        }),
    }
}

pub(crate) fn required_param<'a>(params: &'a Params, name: &str) -> Result<&'a str, SwarmError> {
    match params.get(name).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(SwarmError::Validation(format!("missing parameter '{}'", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_parse_param() {
        let p = params(&[("flimit", "3"), ("maxItems", "x")]);
        assert_eq!(parse_param::<u64>(&p, "flimit").unwrap(), Some(3));
        assert_eq!(parse_param::<u64>(&p, "fromLine").unwrap(), None);
        assert!(matches!(parse_param::<usize>(&p, "maxItems"), Err(SwarmError::Validation(_))));
    }

    #[test]
    fn test_required_param_rejects_blank() {
        let p = params(&[("q", "  ")]);
        assert!(required_param(&p, "q").is_err());
        assert!(required_param(&p, "attr").is_err());
    }

    #[test]
    fn test_gathered_status() {
        let mut gathered = Gathered {
            result: (),
            shards: 3,
            merged: 3,
            failures: Vec::new(),
            partial: false,
        };
        assert_eq!(gathered_status(&gathered), StatusCode::OK);
        gathered.merged = 2;
        gathered.partial = true;
        assert_eq!(gathered_status(&gathered), StatusCode::PARTIAL_CONTENT);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(SwarmError::Validation("x".into()).status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(SwarmError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(SwarmError::RowsOutOfRange.status_code(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(SwarmError::Decode("x".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
