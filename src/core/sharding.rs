//! Creating, opening and preparing shard sets.
//!
//! The partitioner itself is synchronous file work; it runs on the blocking
//! pool. Corpus sizes and collocation frequency data come from the workers.

use std::path::Path;
use std::sync::Arc;

use prism::{coll_freq_path, Partitioner, ShardSet, ShardVariant};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SwarmConfig;
use crate::core::executor::{Executor, Gathered, ShardTask};
use crate::core::query::{CollFreqDataArgs, CorpusSizeArgs, QueryFunction};
use crate::core::results::CollFreqDataReady;
use crate::error::{Result, SwarmError};

pub struct ShardService {
    config: Arc<SwarmConfig>,
    executor: Executor,
    partitioner: Partitioner,
}

impl ShardService {
    pub fn new(config: Arc<SwarmConfig>, executor: Executor) -> Self {
        let partitioner = Partitioner::new(
            config.corpora.split_corpora_dir.clone(),
            config.corpora.multisampled_corpora_dir.clone(),
        );
        ShardService {
            config,
            executor,
            partitioner,
        }
    }

    pub fn partitioner(&self) -> &Partitioner {
        &self.partitioner
    }

    pub async fn corpus_size(&self, corpus_path: &Path) -> Result<u64> {
        let args = CorpusSizeArgs {
            corpus_path: corpus_path.to_path_buf(),
        };
        self.executor.call(QueryFunction::CorpusSize, &args).await
    }

    /// Splits the corpus into contiguous chunks of `multiproc_chunk_size`
    /// positions and precomputes collocation frequency data for them.
    pub async fn create_split(&self, corpus_path: &Path) -> Result<ShardSet> {
        self.ensure_absent(ShardVariant::Split, corpus_path)?;
        let corpus_size = self.corpus_size(corpus_path).await?;
        let chunk_size = self.config.corpora.multiproc_chunk_size;

        let partitioner = self.partitioner.clone();
        let path = corpus_path.to_path_buf();
        let set = tokio::task::spawn_blocking(move || partitioner.create_split(&path, corpus_size, chunk_size))
            .await
            .map_err(|e| SwarmError::Task(e.to_string()))??;

        self.precompute(&set).await;
        Ok(set)
    }

    /// Draws `num_samples` samples of `multisampled_subc_size` positions.
    /// Without an explicit `seed` the configured one is used, or one derived
    /// from the corpus name.
    pub async fn create_multisample(
        &self,
        corpus_path: &Path,
        num_samples: Option<usize>,
        seed: Option<u64>,
    ) -> Result<ShardSet> {
        let num_samples = num_samples.unwrap_or(self.config.corpora.default_num_samples);
        if num_samples == 0 {
            return Err(SwarmError::Validation("numSamples must be a positive integer".to_string()));
        }
        self.ensure_absent(ShardVariant::Multisampled, corpus_path)?;
        let corpus_size = self.corpus_size(corpus_path).await?;
        let sample_size = self.config.corpora.multisampled_subc_size;
        let seed = seed.unwrap_or_else(|| self.sample_seed(corpus_path));
        info!(corpus = %corpus_path.display(), seed, "multisampling corpus");

        let partitioner = self.partitioner.clone();
        let path = corpus_path.to_path_buf();
        let set = tokio::task::spawn_blocking(move || {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            partitioner.create_multisample(&path, corpus_size, sample_size, num_samples, &mut rng)
        })
        .await
        .map_err(|e| SwarmError::Task(e.to_string()))??;

        self.precompute(&set).await;
        Ok(set)
    }

    pub fn open(&self, variant: ShardVariant, corpus_path: &Path) -> Result<ShardSet> {
        Ok(self.partitioner.open(variant, corpus_path)?)
    }

    /// Computes collocation frequency data for every (shard, attribute) pair
    /// whose `.frq` file does not exist yet.
    pub async fn coll_freq_data(
        &self,
        variant: ShardVariant,
        corpus_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Gathered<CollFreqDataReady>> {
        let set = self.open(variant, corpus_path)?;
        let tasks: Vec<_> = set
            .subcorpora
            .iter()
            .filter_map(|shard| {
                let missing: Vec<String> = self
                    .config
                    .corpora
                    .coll_attrs
                    .iter()
                    .filter(|attr| !coll_freq_path(shard, attr).exists())
                    .cloned()
                    .collect();
                (!missing.is_empty()).then(|| ShardTask {
                    shard: shard.clone(),
                    args: CollFreqDataArgs {
                        corpus_path: corpus_path.to_path_buf(),
                        subc_path: shard.clone(),
                        attrs: missing,
                    },
                })
            })
            .collect();
        if tasks.is_empty() {
            info!(corpus = %corpus_path.display(), %variant, "collocation frequency data already complete");
        }
        self.executor
            .gather(QueryFunction::CollFreqData, tasks, cancel)
            .await
    }

    pub fn sample_seed(&self, corpus_path: &Path) -> u64 {
        self.config.corpora.multisample_seed.unwrap_or_else(|| {
            let name = corpus_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            name_seed(&name)
        })
    }

    fn ensure_absent(&self, variant: ShardVariant, corpus_path: &Path) -> Result<()> {
        if self.partitioner.exists(variant, corpus_path)? {
            return Err(SwarmError::Conflict(format!(
                "{} corpus for '{}' already exists",
                variant,
                corpus_path.display()
            )));
        }
        Ok(())
    }

    async fn precompute(&self, set: &ShardSet) {
        let attrs = self.config.corpora.coll_attrs.clone();
        if attrs.is_empty() {
            return;
        }
        let corpus_path = set.corpus_path.clone();
        let outcome = self
            .executor
            .scatter::<CollFreqDataReady, _, _>(
                QueryFunction::CollFreqData,
                set,
                &CancellationToken::new(),
                |shard| CollFreqDataArgs {
                    corpus_path: corpus_path.clone(),
                    subc_path: shard.to_path_buf(),
                    attrs: attrs.clone(),
                },
            )
            .await;
        match outcome {
            Ok(gathered) if gathered.failures.is_empty() => {
                info!(
                    corpus = %set.corpus_path.display(),
                    files = gathered.result.files.len(),
                    "collocation frequency data ready"
                );
            }
            Ok(gathered) => {
                warn!(
                    corpus = %set.corpus_path.display(),
                    failed = gathered.failures.len(),
                    "collocation frequency data incomplete"
                );
            }
            Err(e) => {
                warn!(corpus = %set.corpus_path.display(), error = %e, "collocation frequency precompute failed");
            }
        }
    }
}

/// First eight bytes of the BLAKE3 digest, stable across builds and platforms.
fn name_seed(name: &str) -> u64 {
    let digest = blake3::hash(name.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}
