use std::path::{Component, Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use prism::ShardVariant;
use tokio_util::sync::CancellationToken;

use super::{gathered_status, parse_param, required_param, AppState, Params};
use crate::core::executor::Gathered;
use crate::core::query::{
    text_types_crit, CollocationsArgs, ConcordanceArgs, FreqDistribArgs, QueryFunction, DEFAULT_FREQ_CRIT,
    MAX_RECORDS_INTERNAL_LIMIT,
};
use crate::core::results::{Collocations, Concordance, FreqDistrib};
use crate::error::SwarmError;

const DEFAULT_CONC_ROWS: usize = 50;
const CONC_CONTEXT_TOKENS: usize = 5;
const DEFAULT_COLL_MEASURE: &str = "d";
const COLL_MEASURES: [&str; 4] = ["f", "d", "m", "t"];
const DEFAULT_SRCH_LEFT: i64 = -3;
const DEFAULT_SRCH_RIGHT: i64 = 3;
const DEFAULT_COLL_MIN_FREQ: u64 = 3;

fn flimit(params: &Params) -> Result<u64, SwarmError> {
    match parse_param::<u64>(params, "flimit")? {
        Some(0) => Err(SwarmError::Validation("flimit must be a positive integer".to_string())),
        Some(n) => Ok(n),
        None => Ok(1),
    }
}

/// Resolves a `subc` parameter, the file name of a shard descriptor of this
/// corpus, looking into the split set first.
fn resolve_subc(state: &AppState, corpus_path: &FsPath, subc: &str) -> Result<PathBuf, SwarmError> {
    let name = FsPath::new(subc);
    let plain = name.components().count() == 1 && matches!(name.components().next(), Some(Component::Normal(_)));
    if !plain {
        return Err(SwarmError::Validation(format!("invalid subcorpus '{}'", subc)));
    }
    for variant in [ShardVariant::Split, ShardVariant::Multisampled] {
        let candidate = state.shards.partitioner().shard_dir(variant, corpus_path)?.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(SwarmError::NotFound(format!("subcorpus '{}' not found", subc)))
}

pub async fn freq_distrib(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
    Query(params): Query<Params>,
) -> Result<Json<FreqDistrib>, SwarmError> {
    let query = required_param(&params, "q")?.to_string();
    let flimit = flimit(&params)?;
    let corpus_path = state.config.registry_path(&corpus_id)?;
    let args = FreqDistribArgs {
        corpus_path,
        subc_path: None,
        query,
        crit: DEFAULT_FREQ_CRIT.to_string(),
        flimit,
        max_results: 0,
    };
    let mut result: FreqDistrib = state.executor.call(QueryFunction::FreqDistrib, &args).await?;
    result.finalize();
    result.sort_by_freq_desc();
    Ok(Json(result))
}

pub async fn freq_distrib_parallel(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
    Query(params): Query<Params>,
) -> Result<(StatusCode, Json<Gathered<FreqDistrib>>), SwarmError> {
    let query = required_param(&params, "q")?.to_string();
    let flimit = flimit(&params)?;
    let corpus_path = state.config.registry_path(&corpus_id)?;
    let set = state.shards.open(ShardVariant::Split, &corpus_path)?;

    let mut gathered: Gathered<FreqDistrib> = state
        .executor
        .scatter(QueryFunction::FreqDistrib, &set, &CancellationToken::new(), |shard| FreqDistribArgs {
            corpus_path: corpus_path.clone(),
            subc_path: Some(shard.to_path_buf()),
            query: query.clone(),
            crit: DEFAULT_FREQ_CRIT.to_string(),
            flimit,
            max_results: 0,
        })
        .await?;
    gathered.result.finalize();
    gathered.result.sort_by_freq_desc();
    Ok((gathered_status(&gathered), Json(gathered)))
}

pub async fn text_types(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
    Query(params): Query<Params>,
) -> Result<Json<FreqDistrib>, SwarmError> {
    let query = required_param(&params, "q")?.to_string();
    let attr = required_param(&params, "attr")?;
    let flimit = flimit(&params)?;
    let corpus_path = state.config.registry_path(&corpus_id)?;
    let subc_path = match params.get("subc") {
        Some(subc) => Some(resolve_subc(&state, &corpus_path, subc)?),
        None => None,
    };
    let args = FreqDistribArgs {
        corpus_path,
        subc_path,
        query,
        crit: text_types_crit(attr),
        flimit,
        max_results: 0,
    };
    let mut result: FreqDistrib = state.executor.call(QueryFunction::TextTypes, &args).await?;
    result.finalize();
    result.sort_by_freq_desc();
    Ok(Json(result))
}

pub async fn text_types_parallel(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
    Query(params): Query<Params>,
) -> Result<(StatusCode, Json<Gathered<FreqDistrib>>), SwarmError> {
    let query = required_param(&params, "q")?.to_string();
    let attr = required_param(&params, "attr")?;
    let flimit = flimit(&params)?;
    let max_items = match parse_param::<usize>(&params, "maxItems")? {
        Some(0) | None => state.config.query.default_max_items,
        Some(n) => n,
    };
    let corpus_path = state.config.registry_path(&corpus_id)?;
    let set = state.shards.open(ShardVariant::Split, &corpus_path)?;
    let crit = text_types_crit(attr);

    // shards must not truncate, or the merged counts would be wrong
    let mut gathered: Gathered<FreqDistrib> = state
        .executor
        .scatter(QueryFunction::TextTypes, &set, &CancellationToken::new(), |shard| FreqDistribArgs {
            corpus_path: corpus_path.clone(),
            subc_path: Some(shard.to_path_buf()),
            query: query.clone(),
            crit: crit.clone(),
            flimit,
            max_results: 0,
        })
        .await?;
    gathered.result.finalize();
    gathered.result.sort_by_freq_desc();
    gathered.result.cap_items(Some(max_items));
    Ok((gathered_status(&gathered), Json(gathered)))
}

pub async fn concordance(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
    Query(params): Query<Params>,
) -> Result<Json<Concordance>, SwarmError> {
    let query = required_param(&params, "q")?.to_string();
    let from_line = parse_param::<usize>(&params, "fromLine")?.unwrap_or(0);
    let max_items = parse_param::<usize>(&params, "maxRows")?.unwrap_or(DEFAULT_CONC_ROWS);
    if max_items == 0 || max_items > MAX_RECORDS_INTERNAL_LIMIT {
        return Err(SwarmError::Validation(format!(
            "maxRows must be between 1 and {}",
            MAX_RECORDS_INTERNAL_LIMIT
        )));
    }
    let args = ConcordanceArgs {
        corpus_path: state.config.registry_path(&corpus_id)?,
        query,
        from_line,
        max_items,
        max_context: CONC_CONTEXT_TOKENS,
    };
    let result = state.executor.call(QueryFunction::Concordance, &args).await?;
    Ok(Json(result))
}

pub async fn collocations(
    State(state): State<Arc<AppState>>,
    Path(corpus_id): Path<String>,
    Query(params): Query<Params>,
) -> Result<Json<Collocations>, SwarmError> {
    let query = required_param(&params, "q")?.to_string();
    let attr = params.get("attr").map(String::as_str).unwrap_or("lemma").to_string();
    let measure = params
        .get("measure")
        .map(String::as_str)
        .unwrap_or(DEFAULT_COLL_MEASURE)
        .to_string();
    if !COLL_MEASURES.contains(&measure.as_str()) {
        return Err(SwarmError::Validation(format!("unsupported collocation measure '{}'", measure)));
    }
    let srch_left = parse_param::<i64>(&params, "srchLeft")?.unwrap_or(DEFAULT_SRCH_LEFT);
    let srch_right = parse_param::<i64>(&params, "srchRight")?.unwrap_or(DEFAULT_SRCH_RIGHT);
    if srch_left > srch_right {
        return Err(SwarmError::Validation("srchLeft must not exceed srchRight".to_string()));
    }
    let min_freq = parse_param::<u64>(&params, "minFreq")?.unwrap_or(DEFAULT_COLL_MIN_FREQ);
    let max_items = parse_param::<usize>(&params, "maxItems")?.unwrap_or(state.config.query.default_max_items);

    let args = CollocationsArgs {
        corpus_path: state.config.registry_path(&corpus_id)?,
        subc_path: None,
        query,
        attr,
        measure,
        srch_left,
        srch_right,
        min_freq,
        max_items,
    };
    let result = state.executor.call(QueryFunction::Collocations, &args).await?;
    Ok(Json(result))
}
