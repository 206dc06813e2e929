//! Job wire contract between the gateway and the workers.
//!
//! A job names one [`QueryFunction`] and carries its argument struct as JSON.
//! The worker stamps its envelope with the same function name, so the result
//! is decoded only as the kind the caller asked for.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use synapse::Job;

use crate::error::Result;

/// Frequency criterion of word-level distributions.
pub const DEFAULT_FREQ_CRIT: &str = "lemma/e 0~0>0";

/// Upper bound on concordance lines a worker returns for one request.
pub const MAX_RECORDS_INTERNAL_LIMIT: usize = 1000;

pub const ERR_ROWS_RANGE_OUT_OF_CONC: &str = "rowsRangeOutOfConc";
pub const ERR_INVALID_ARGS: &str = "invalidArgs";
pub const ERR_UNKNOWN_FUNCTION: &str = "unknownFunction";
pub const ERR_ENGINE: &str = "engineError";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryFunction {
    CorpusSize,
    FreqDistrib,
    TextTypes,
    CollFreqData,
    Concordance,
    Collocations,
}

impl QueryFunction {
    pub const ALL: [QueryFunction; 6] = [
        QueryFunction::CorpusSize,
        QueryFunction::FreqDistrib,
        QueryFunction::TextTypes,
        QueryFunction::CollFreqData,
        QueryFunction::Concordance,
        QueryFunction::Collocations,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            QueryFunction::CorpusSize => "corpusSize",
            QueryFunction::FreqDistrib => "freqDistrib",
            QueryFunction::TextTypes => "textTypes",
            QueryFunction::CollFreqData => "calcCollFreqData",
            QueryFunction::Concordance => "concExample",
            QueryFunction::Collocations => "collocations",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        QueryFunction::ALL.into_iter().find(|f| f.name() == name)
    }
}

/// Builds the job for `function` with JSON encoded `args`.
pub fn job<A: Serialize>(function: QueryFunction, args: &A) -> Result<Job> {
    Ok(Job::new(function.name(), args)?)
}

/// Criterion of a text-type distribution over a structural attribute.
pub fn text_types_crit(attr: &str) -> String {
    format!("{} 0", attr)
}

fn default_flimit() -> u64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusSizeArgs {
    pub corpus_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreqDistribArgs {
    pub corpus_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subc_path: Option<PathBuf>,
    pub query: String,
    pub crit: String,
    #[serde(default = "default_flimit")]
    pub flimit: u64,
    /// Zero means no cap on the worker side.
    #[serde(default)]
    pub max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollFreqDataArgs {
    pub corpus_path: PathBuf,
    pub subc_path: PathBuf,
    pub attrs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcordanceArgs {
    pub corpus_path: PathBuf,
    pub query: String,
    pub from_line: usize,
    pub max_items: usize,
    pub max_context: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollocationsArgs {
    pub corpus_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subc_path: Option<PathBuf>,
    pub query: String,
    pub attr: String,
    /// One letter measure code: `f` absolute frequency, `d` logDice,
    /// `m` MI, `t` T-score.
    pub measure: String,
    pub srch_left: i64,
    pub srch_right: i64,
    pub min_freq: u64,
    pub max_items: usize,
}
