mod common;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Fixture, CORPUS_ID};
use corpus_swarm::gateway::{query_handlers, router, sharding_handlers, AppState};
use corpus_swarm::SwarmError;

fn state(fx: &Fixture) -> State<Arc<AppState>> {
    State(Arc::new(AppState::new(fx.config.clone(), fx.executor())))
}

fn id() -> Path<String> {
    Path(CORPUS_ID.to_string())
}

fn params(pairs: &[(&str, &str)]) -> Query<HashMap<String, String>> {
    Query(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
}

#[tokio::test]
async fn test_router_builds() {
    let fx = Fixture::new();
    let State(app) = state(&fx);
    let _ = router(app);
}

#[tokio::test]
async fn test_split_twice_is_conflict() {
    let fx = Fixture::new();
    let st = state(&fx);
    let (status, set) = sharding_handlers::create_split(st.clone(), id()).await.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(set.0.len(), 3);

    let err = sharding_handlers::create_split(st, id()).await.unwrap_err();
    assert!(matches!(err, SwarmError::Conflict(_)));
    assert_eq!(err.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_parallel_queries_need_a_split() {
    let fx = Fixture::new();
    let err = query_handlers::freq_distrib_parallel(state(&fx), id(), params(&[("q", "[tag=\"NN\"]")]))
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::NotFound(_)));
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_freqs_parallel_matches_freqs() {
    let fx = Fixture::new();
    let st = state(&fx);
    sharding_handlers::create_split(st.clone(), id()).await.unwrap();

    let q = params(&[("q", "[tag=\"NN\"]")]);
    let single = query_handlers::freq_distrib(st.clone(), id(), params(&[("q", "[tag=\"NN\"]")]))
        .await
        .unwrap()
        .0;
    let (status, parallel) = query_handlers::freq_distrib_parallel(st, id(), q).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let parallel = parallel.0;
    assert_eq!(parallel.merged, 3);

    let words = |items: &[corpus_swarm::FreqDistribItem]| {
        items.iter().map(|i| (i.word.clone(), i.freq)).collect::<Vec<_>>()
    };
    assert_eq!(words(&parallel.result.items), words(&single.items));
    assert_eq!(parallel.result.items[0].word, "cat");
    assert_eq!(parallel.result.items[0].freq, 2);
    assert_eq!(parallel.result.corpus_size, 10);

    let json = serde_json::to_value(&parallel).unwrap();
    assert_eq!(json["freqs"][0]["word"], "cat");
    assert_eq!(json["corpusSize"], 10);
    assert_eq!(json["partial"], false);
}

#[tokio::test]
async fn test_text_types_parallel_caps_after_merge() {
    let fx = Fixture::new();
    let st = state(&fx);
    sharding_handlers::create_split(st.clone(), id()).await.unwrap();

    let (_, all) = query_handlers::text_types_parallel(
        st.clone(),
        id(),
        params(&[("q", "[tag=\"NN\"]"), ("attr", "doc.genre")]),
    )
    .await
    .unwrap();
    let mut genres: Vec<_> = all.0.result.items.iter().map(|i| (i.word.clone(), i.freq)).collect();
    genres.sort();
    assert_eq!(genres, vec![("blog".to_string(), 2), ("news".to_string(), 2)]);

    let (_, capped) = query_handlers::text_types_parallel(
        st,
        id(),
        params(&[("q", "[tag=\"NN\"]"), ("attr", "doc.genre"), ("maxItems", "1")]),
    )
    .await
    .unwrap();
    assert_eq!(capped.0.result.items.len(), 1);
    // equal counts, the cap keeps the alphabetically first value
    assert_eq!(capped.0.result.items[0].word, "blog");
}

#[tokio::test]
async fn test_text_types_with_subcorpus() {
    let fx = Fixture::new();
    let st = state(&fx);
    let (_, set) = sharding_handlers::create_split(st.clone(), id()).await.unwrap();
    let first = set.0.subcorpora[0].file_name().unwrap().to_string_lossy().into_owned();

    let result = query_handlers::text_types(
        st.clone(),
        id(),
        params(&[("q", "cat"), ("attr", "doc.genre"), ("subc", first.as_str())]),
    )
    .await
    .unwrap()
    .0;
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].word, "news");

    let err = query_handlers::text_types(
        st,
        id(),
        params(&[("q", "cat"), ("attr", "doc.genre"), ("subc", format!("../{}", first).as_str())]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SwarmError::Validation(_)));
}

#[tokio::test]
async fn test_invalid_parameters_are_rejected() {
    let fx = Fixture::new();
    let st = state(&fx);

    let err = query_handlers::freq_distrib(st.clone(), id(), params(&[])).await.unwrap_err();
    assert!(matches!(err, SwarmError::Validation(_)));
    assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

    let err = query_handlers::freq_distrib(st.clone(), id(), params(&[("q", "cat"), ("flimit", "0")]))
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::Validation(_)));

    let err = query_handlers::freq_distrib(st.clone(), Path("../etc".to_string()), params(&[("q", "cat")]))
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::Validation(_)));

    let err = query_handlers::collocations(st.clone(), id(), params(&[("q", "cat"), ("measure", "x")]))
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::Validation(_)));

    let err = query_handlers::collocations(
        st.clone(),
        id(),
        params(&[("q", "cat"), ("srchLeft", "2"), ("srchRight", "-2")]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SwarmError::Validation(_)));

    let err = query_handlers::concordance(st.clone(), id(), params(&[("q", "cat"), ("maxRows", "0")]))
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::Validation(_)));

    let err = sharding_handlers::coll_freq_data(st, Path((CORPUS_ID.to_string(), "chunked".to_string())))
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::Validation(_)));
}

#[tokio::test]
async fn test_concordance_paging() {
    let fx = Fixture::new();
    let st = state(&fx);

    let conc = query_handlers::concordance(
        st.clone(),
        id(),
        params(&[("q", "[tag=\"NN\"]"), ("fromLine", "1"), ("maxRows", "2")]),
    )
    .await
    .unwrap()
    .0;
    assert_eq!(conc.conc_size, 4);
    assert_eq!(conc.lines.len(), 2);
    assert_eq!(conc.lines[0].kwic, "mat");
    assert_eq!(conc.lines[1].kwic, "cat");

    let err = query_handlers::concordance(st, id(), params(&[("q", "[tag=\"NN\"]"), ("fromLine", "5")]))
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::RowsOutOfRange));
    assert_eq!(err.status_code(), StatusCode::RANGE_NOT_SATISFIABLE);
}

#[tokio::test]
async fn test_coll_freq_data_after_split_is_complete() {
    let fx = Fixture::new();
    let st = state(&fx);
    sharding_handlers::create_split(st.clone(), id()).await.unwrap();

    let (status, gathered) =
        sharding_handlers::coll_freq_data(st, Path((CORPUS_ID.to_string(), "split".to_string())))
            .await
            .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(gathered.0.shards, 0);
    assert!(gathered.0.failures.is_empty());
}

#[tokio::test]
async fn test_multisample_num_samples() {
    let fx = Fixture::new();
    let (status, set) = sharding_handlers::create_multisample(state(&fx), id(), params(&[("numSamples", "2")]))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(set.0.len(), 2);

    let other = Fixture::new();
    let err = sharding_handlers::create_multisample(state(&other), id(), params(&[("numSamples", "0")]))
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::Validation(_)));
}
