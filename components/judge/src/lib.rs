//! # Judge
//!
//! Worker side of the swarm. A [`Judge`] takes one job off the queue, runs the
//! requested capability of its [`CorpusEngine`] on the blocking pool and wraps
//! the answer in a result envelope stamped with the function name. Engine
//! failures become envelope errors with a machine readable code; the judge
//! never fails a job silently.

use std::sync::Arc;

use corpus_swarm::core::query::{
    CollFreqDataArgs, CollocationsArgs, ConcordanceArgs, CorpusSizeArgs, FreqDistribArgs, QueryFunction, ERR_ENGINE,
    ERR_INVALID_ARGS, ERR_UNKNOWN_FUNCTION,
};
use serde::{de::DeserializeOwned, Serialize};
use synapse::{Job, WorkerResult};
use tracing::{debug, warn};

pub mod engine;
pub mod vertical;

pub use engine::{CorpusEngine, EngineError};
pub use vertical::VerticalEngine;

pub struct Judge<E> {
    engine: Arc<E>,
}

impl<E> Clone for Judge<E> {
    fn clone(&self) -> Self {
        Judge {
            engine: self.engine.clone(),
        }
    }
}

impl<E: CorpusEngine> Judge<E> {
    pub fn new(engine: E) -> Self {
        Judge {
            engine: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub async fn execute(&self, job: &Job) -> WorkerResult {
        let Some(function) = QueryFunction::from_name(&job.function) else {
            warn!(job_id = %job.id, function = %job.function, "unknown function");
            return WorkerResult::failed(
                job.function.as_str(),
                Some(ERR_UNKNOWN_FUNCTION),
                format!("unknown function '{}'", job.function),
            );
        };
        let engine = self.engine.clone();
        let owned = job.clone();
        match tokio::task::spawn_blocking(move || run(engine.as_ref(), function, &owned)).await {
            Ok(result) => result,
            Err(e) => {
                warn!(job_id = %job.id, function = function.name(), error = %e, "engine task failed");
                WorkerResult::failed(function.name(), Some(ERR_ENGINE), format!("engine task failed: {}", e))
            }
        }
    }
}

fn run<E: CorpusEngine>(engine: &E, function: QueryFunction, job: &Job) -> WorkerResult {
    debug!(job_id = %job.id, function = function.name(), "executing job");
    match function {
        QueryFunction::CorpusSize => apply(function, job, |a: CorpusSizeArgs| engine.corpus_size(&a.corpus_path)),
        QueryFunction::FreqDistrib | QueryFunction::TextTypes => {
            apply(function, job, |a: FreqDistribArgs| engine.freq_distrib(&a))
        }
        QueryFunction::CollFreqData => apply(function, job, |a: CollFreqDataArgs| engine.compile_subc_freqs(&a)),
        QueryFunction::Concordance => apply(function, job, |a: ConcordanceArgs| engine.concordance(&a)),
        QueryFunction::Collocations => apply(function, job, |a: CollocationsArgs| engine.collocations(&a)),
    }
}

fn apply<A, T, F>(function: QueryFunction, job: &Job, op: F) -> WorkerResult
where
    A: DeserializeOwned,
    T: Serialize,
    F: FnOnce(A) -> Result<T, EngineError>,
{
    let kind = function.name();
    let args: A = match job.decode_args() {
        Ok(args) => args,
        Err(e) => {
            warn!(job_id = %job.id, function = kind, error = %e, "undecodable job arguments");
            return WorkerResult::failed(kind, Some(ERR_INVALID_ARGS), format!("invalid arguments: {}", e));
        }
    };
    match op(args) {
        Ok(value) => WorkerResult::ok(kind, &value).unwrap_or_else(|e| {
            WorkerResult::failed(kind, Some(ERR_ENGINE), format!("failed to encode result: {}", e))
        }),
        Err(e) => {
            warn!(job_id = %job.id, function = kind, error = %e, "job failed");
            WorkerResult::failed(kind, Some(e.code()), e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_swarm::core::query::ERR_ROWS_RANGE_OUT_OF_CONC;
    use corpus_swarm::core::results::{Concordance, FreqDistrib};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn corpus() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "<doc genre=\"news\">\nThe\tthe\tDT\ncat\tcat\tNN\nsat\tsit\tVBD\n</doc>\n"
        )
        .unwrap();
        file
    }

    fn judge() -> Judge<VerticalEngine> {
        Judge::new(VerticalEngine::new(vec!["word".into(), "lemma".into(), "tag".into()]))
    }

    #[tokio::test]
    async fn test_corpus_size_job() {
        let file = corpus();
        let job = Job::new("corpusSize", &CorpusSizeArgs { corpus_path: file.path().into() }).unwrap();
        let res = judge().execute(&job).await;
        assert_eq!(res.decode::<u64>("corpusSize").unwrap(), 3);
    }

    #[tokio::test]
    async fn test_text_types_job_is_stamped_with_its_kind() {
        let file = corpus();
        let args = FreqDistribArgs {
            corpus_path: file.path().into(),
            subc_path: None,
            query: "cat".into(),
            crit: "doc.genre 0".into(),
            flimit: 1,
            max_results: 0,
        };
        let res = judge().execute(&Job::new("textTypes", &args).unwrap()).await;
        assert_eq!(res.kind, "textTypes");
        let d: FreqDistrib = res.decode("textTypes").unwrap();
        assert_eq!(d.items[0].word, "news");
        assert!(res.decode::<FreqDistrib>("freqDistrib").is_err());
    }

    #[tokio::test]
    async fn test_unknown_function_and_bad_args() {
        let res = judge().execute(&Job::new("wordSketch", &()).unwrap()).await;
        assert_eq!(res.error.unwrap().code.as_deref(), Some(ERR_UNKNOWN_FUNCTION));

        let res = judge().execute(&Job::new("freqDistrib", &42).unwrap()).await;
        assert_eq!(res.kind, "freqDistrib");
        assert_eq!(res.error.unwrap().code.as_deref(), Some(ERR_INVALID_ARGS));
    }

    #[tokio::test]
    async fn test_rows_out_of_range_code() {
        let file = corpus();
        let args = ConcordanceArgs {
            corpus_path: file.path().into(),
            query: "cat".into(),
            from_line: 7,
            max_items: 10,
            max_context: 2,
        };
        let res = judge().execute(&Job::new("concExample", &args).unwrap()).await;
        assert_eq!(res.error.as_ref().unwrap().code.as_deref(), Some(ERR_ROWS_RANGE_OUT_OF_CONC));
        assert!(res.decode::<Concordance>("concExample").is_err());
    }

    #[tokio::test]
    async fn test_missing_corpus_is_engine_error() {
        let job = Job::new("corpusSize", &CorpusSizeArgs { corpus_path: "/nonexistent/corpus".into() }).unwrap();
        let res = judge().execute(&job).await;
        assert_eq!(res.error.unwrap().code.as_deref(), Some(ERR_ENGINE));
    }
}
