use std::path::Path;

use corpus_swarm::core::query::{
    CollFreqDataArgs, CollocationsArgs, ConcordanceArgs, FreqDistribArgs, ERR_ENGINE, ERR_INVALID_ARGS,
    ERR_ROWS_RANGE_OUT_OF_CONC,
};
use corpus_swarm::core::results::{CollFreqDataReady, Collocations, Concordance, FreqDistrib};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("rows range out of concordance: line {from_line} requested, concordance has {conc_size}")]
    RowsRangeOutOfConc { from_line: usize, conc_size: u64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Failed(String),
}

impl EngineError {
    /// Code carried in the result envelope.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::RowsRangeOutOfConc { .. } => ERR_ROWS_RANGE_OUT_OF_CONC,
            EngineError::InvalidInput(_) | EngineError::Unsupported(_) => ERR_INVALID_ARGS,
            EngineError::Failed(_) => ERR_ENGINE,
        }
    }
}

/// Computes answers for one corpus or one shard of it. Calls block; the
/// [`Judge`](crate::Judge) runs them on the blocking pool.
pub trait CorpusEngine: Send + Sync + 'static {
    fn corpus_size(&self, corpus_path: &Path) -> Result<u64, EngineError>;

    /// Frequency distribution of the query matches by `args.crit`. Serves both
    /// word-level and text-type distributions.
    fn freq_distrib(&self, args: &FreqDistribArgs) -> Result<FreqDistrib, EngineError>;

    /// Writes the collocation frequency files of one shard.
    fn compile_subc_freqs(&self, args: &CollFreqDataArgs) -> Result<CollFreqDataReady, EngineError>;

    fn concordance(&self, args: &ConcordanceArgs) -> Result<Concordance, EngineError>;

    fn collocations(&self, args: &CollocationsArgs) -> Result<Collocations, EngineError>;
}
