use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use prism::{ShardSet, ShardVariant};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{gathered_status, parse_param, AppState, Params};
use crate::core::executor::Gathered;
use crate::core::results::CollFreqDataReady;
use crate::error::SwarmError;

pub async fn create_split(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
) -> Result<(StatusCode, Json<ShardSet>), SwarmError> {
    let corpus_path = state.config.registry_path(&corpus_id)?;
    let set = state.shards.create_split(&corpus_path).await?;
    info!(corpus = %corpus_id, chunks = set.len(), "split corpus created");
    Ok((StatusCode::CREATED, Json(set)))
}

pub async fn create_multisample(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
    Query(params): Query<Params>,
) -> Result<(StatusCode, Json<ShardSet>), SwarmError> {
    let num_samples = parse_param::<usize>(&params, "numSamples")?;
    let corpus_path = state.config.registry_path(&corpus_id)?;
    let set = state
        .shards
        .create_multisample(&corpus_path, num_samples, None)
        .await?;
    info!(corpus = %corpus_id, samples = set.len(), "multisampled corpus created");
    Ok((StatusCode::CREATED, Json(set)))
}

pub async fn coll_freq_data(
    State(state): State<Arc<AppState>>,
    Path((corpus_id, variant)): Path<(String, String)>,
) -> Result<(StatusCode, Json<Gathered<CollFreqDataReady>>), SwarmError> {
    let variant: ShardVariant = variant.parse()?;
    let corpus_path = state.config.registry_path(&corpus_id)?;
    let cancel = CancellationToken::new();
    let gathered = state
        .shards
        .coll_freq_data(variant, &corpus_path, &cancel)
        .await?;
    Ok((gathered_status(&gathered), Json(gathered)))
}
