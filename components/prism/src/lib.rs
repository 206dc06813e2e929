//! # Prism
//!
//! The `prism` crate partitions a corpus into shards that can be queried
//! independently. A shard is a subcorpus descriptor file holding a half-open
//! corpus position range; the descriptor's path is the shard's identity.
//!
//! Two partitioning schemes exist:
//!
//! - **split**: contiguous, non-overlapping chunks covering the whole corpus
//! - **multisampled**: independently drawn fixed-size samples, possibly overlapping
//!
//! Shard sets live under `<root>/<corpus name>/` and are created once. Creating
//! a set that already exists is a conflict.
//!
//! # Example
//! ```
//! use prism::{Partitioner, ShardVariant};
//!
//! let root = std::env::temp_dir().join(format!("prism-doc-{}", std::process::id()));
//! let partitioner = Partitioner::new(root.join("split"), root.join("multisampled"));
//! let set = partitioner.create_split("/corpora/syn".as_ref(), 250, 100).unwrap();
//! assert_eq!(set.subcorpora.len(), 3);
//! assert!(partitioner.exists(ShardVariant::Split, "/corpora/syn".as_ref()).unwrap());
//! # std::fs::remove_dir_all(&root).unwrap();
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod descriptor;
pub mod error;
pub mod sharder;

pub use descriptor::{SubcDescriptor, DESCRIPTOR_LEN};
pub use error::{PrismError, Result};
pub use sharder::{coll_freq_path, sample_ranges, split_ranges, Partitioner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardVariant {
    Split,
    Multisampled,
}

impl ShardVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShardVariant::Split => "split",
            ShardVariant::Multisampled => "multisampled",
        }
    }

    /// Prefix of the descriptor file names of this variant.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            ShardVariant::Split => "chunk",
            ShardVariant::Multisampled => "sample",
        }
    }
}

impl fmt::Display for ShardVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShardVariant {
    type Err = PrismError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "split" => Ok(ShardVariant::Split),
            "multisampled" => Ok(ShardVariant::Multisampled),
            other => Err(PrismError::Validation(format!(
                "invalid corpus structure type specified: {}",
                other
            ))),
        }
    }
}

/// A created (or reopened) set of shards of one corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardSet {
    pub corpus_path: PathBuf,
    pub variant: ShardVariant,
    /// Descriptor paths in lexical order, which is numeric order for the
    /// zero-padded names this crate writes.
    pub subcorpora: Vec<PathBuf>,
}

impl ShardSet {
    pub fn len(&self) -> usize {
        self.subcorpora.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subcorpora.is_empty()
    }

    /// Reads every descriptor of the set, in order.
    pub fn descriptors(&self) -> Result<Vec<SubcDescriptor>> {
        self.subcorpora.iter().map(|p| SubcDescriptor::read(p)).collect()
    }
}
