use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::descriptor::SubcDescriptor;
use crate::error::{PrismError, Result};
use crate::{ShardSet, ShardVariant};

const DESCRIPTOR_EXT: &str = "subc";

/// Contiguous ranges of at most `chunk_size` positions covering `[0, corpus_size)`.
/// The last range is clamped to the corpus size.
pub fn split_ranges(corpus_size: u64, chunk_size: u64) -> Result<Vec<SubcDescriptor>> {
    if chunk_size == 0 {
        return Err(PrismError::Validation("chunk size must be positive".to_string()));
    }
    if corpus_size == 0 {
        return Err(PrismError::Validation("cannot split an empty corpus".to_string()));
    }
    let num_chunks = corpus_size / chunk_size + u64::from(corpus_size % chunk_size != 0);
    (0..num_chunks)
        .map(|i| {
            let from = i * chunk_size;
            let to = from.saturating_add(chunk_size).min(corpus_size);
            SubcDescriptor::new(from, to)
        })
        .collect()
}

/// `num_samples` ranges of exactly `sample_size` positions, each drawn
/// uniformly and independently (with replacement) from `[0, corpus_size)`.
pub fn sample_ranges<R: Rng + ?Sized>(
    corpus_size: u64,
    sample_size: u64,
    num_samples: usize,
    rng: &mut R,
) -> Result<Vec<SubcDescriptor>> {
    if sample_size == 0 || num_samples == 0 {
        return Err(PrismError::Validation(
            "sample size and number of samples must be positive".to_string(),
        ));
    }
    if sample_size > corpus_size {
        return Err(PrismError::Validation(format!(
            "sample size {} exceeds corpus size {}",
            sample_size, corpus_size
        )));
    }
    let max_from = corpus_size - sample_size;
    (0..num_samples)
        .map(|_| {
            let from = rng.gen_range(0..=max_from);
            SubcDescriptor::new(from, from + sample_size)
        })
        .collect()
}

/// Path of the precomputed collocation frequency data of a shard for one
/// attribute, e.g. `chunk_03.lemma.frq` next to `chunk_03.subc`.
pub fn coll_freq_path(subc: &Path, attr: &str) -> PathBuf {
    subc.with_extension(format!("{}.frq", attr))
}

fn corpus_name(corpus_path: &Path) -> Result<String> {
    corpus_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            PrismError::Validation(format!("'{}' does not name a corpus", corpus_path.display()))
        })
}

fn index_width(count: usize) -> usize {
    count.saturating_sub(1).to_string().len().max(2)
}

fn is_descriptor(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == DESCRIPTOR_EXT)
}

fn list_descriptors(dir: &Path) -> Result<Option<Vec<PathBuf>>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PrismError::io(dir, "read shard directory", e)),
    };
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PrismError::io(dir, "read shard directory", e))?;
        let path = entry.path();
        if path.is_file() && is_descriptor(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(Some(paths))
}

/// Creates and opens shard sets under one root directory per variant.
#[derive(Debug, Clone)]
pub struct Partitioner {
    split_root: PathBuf,
    multisample_root: PathBuf,
}

impl Partitioner {
    pub fn new(split_root: impl Into<PathBuf>, multisample_root: impl Into<PathBuf>) -> Self {
        Partitioner {
            split_root: split_root.into(),
            multisample_root: multisample_root.into(),
        }
    }

    pub fn root(&self, variant: ShardVariant) -> &Path {
        match variant {
            ShardVariant::Split => &self.split_root,
            ShardVariant::Multisampled => &self.multisample_root,
        }
    }

    pub fn shard_dir(&self, variant: ShardVariant, corpus_path: &Path) -> Result<PathBuf> {
        Ok(self.root(variant).join(corpus_name(corpus_path)?))
    }

    /// True only if the shard directory exists and holds at least one descriptor.
    pub fn exists(&self, variant: ShardVariant, corpus_path: &Path) -> Result<bool> {
        let dir = self.shard_dir(variant, corpus_path)?;
        Ok(list_descriptors(&dir)?.map_or(false, |paths| !paths.is_empty()))
    }

    pub fn open(&self, variant: ShardVariant, corpus_path: &Path) -> Result<ShardSet> {
        let dir = self.shard_dir(variant, corpus_path)?;
        match list_descriptors(&dir)? {
            Some(subcorpora) if !subcorpora.is_empty() => Ok(ShardSet {
                corpus_path: corpus_path.to_path_buf(),
                variant,
                subcorpora,
            }),
            _ => Err(PrismError::NotFound { variant, path: dir }),
        }
    }

    pub fn create_split(&self, corpus_path: &Path, corpus_size: u64, chunk_size: u64) -> Result<ShardSet> {
        self.ensure_absent(ShardVariant::Split, corpus_path)?;
        let ranges = split_ranges(corpus_size, chunk_size)?;
        info!(
            corpus = %corpus_path.display(),
            corpus_size,
            chunk_size,
            num_chunks = ranges.len(),
            "creating split corpus"
        );
        self.write_set(ShardVariant::Split, corpus_path, &ranges)
    }

    pub fn create_multisample<R: Rng + ?Sized>(
        &self,
        corpus_path: &Path,
        corpus_size: u64,
        sample_size: u64,
        num_samples: usize,
        rng: &mut R,
    ) -> Result<ShardSet> {
        self.ensure_absent(ShardVariant::Multisampled, corpus_path)?;
        let ranges = sample_ranges(corpus_size, sample_size, num_samples, rng)?;
        info!(
            corpus = %corpus_path.display(),
            corpus_size,
            sample_size,
            num_samples,
            "creating multisampled corpus"
        );
        self.write_set(ShardVariant::Multisampled, corpus_path, &ranges)
    }

    fn ensure_absent(&self, variant: ShardVariant, corpus_path: &Path) -> Result<()> {
        if self.exists(variant, corpus_path)? {
            return Err(PrismError::Conflict {
                variant,
                path: self.shard_dir(variant, corpus_path)?,
            });
        }
        Ok(())
    }

    /// Writes all descriptors into a staging directory and renames it into
    /// place, so the final directory is either complete or absent. A rename
    /// onto a populated directory fails, which turns a creation race into a
    /// conflict for the loser.
    fn write_set(&self, variant: ShardVariant, corpus_path: &Path, ranges: &[SubcDescriptor]) -> Result<ShardSet> {
        let root = self.root(variant);
        let name = corpus_name(corpus_path)?;
        let target = root.join(&name);
        fs::create_dir_all(root).map_err(|e| PrismError::io(root, "create shard root", e))?;

        let staging = root.join(format!(".{}.staging-{}", name, Uuid::new_v4().simple()));
        fs::create_dir(&staging).map_err(|e| PrismError::io(&staging, "create staging directory", e))?;

        let subcorpora = match write_descriptors(variant, &staging, &target, ranges) {
            Ok(subcorpora) => subcorpora,
            Err(e) => {
                discard(&staging);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&staging, &target) {
            discard(&staging);
            if self.exists(variant, corpus_path)? {
                return Err(PrismError::Conflict { variant, path: target });
            }
            return Err(PrismError::io(&target, "publish shard directory", e));
        }

        Ok(ShardSet {
            corpus_path: corpus_path.to_path_buf(),
            variant,
            subcorpora,
        })
    }
}

/// Writes one descriptor per range into `staging` and returns the paths they
/// will have once `staging` is renamed to `target`.
fn write_descriptors(
    variant: ShardVariant,
    staging: &Path,
    target: &Path,
    ranges: &[SubcDescriptor],
) -> Result<Vec<PathBuf>> {
    let width = index_width(ranges.len());
    let mut subcorpora = Vec::with_capacity(ranges.len());
    for (index, range) in ranges.iter().enumerate() {
        let file_name = format!(
            "{}_{:0width$}.{}",
            variant.file_prefix(),
            index,
            DESCRIPTOR_EXT,
            width = width
        );
        range
            .write_new(&staging.join(&file_name))
            .map_err(|source| PrismError::Chunk {
                index,
                path: target.join(&file_name),
                source,
            })?;
        debug!(chunk = %file_name, from = range.from, to = range.to, "descriptor written");
        subcorpora.push(target.join(file_name));
    }
    Ok(subcorpora)
}

fn discard(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        warn!(path = %staging.display(), error = %e, "failed to remove staging directory");
    }
}
