//! Result kinds produced by the workers and the rules for combining them.
//!
//! Merging is commutative and associative up to item order, so the gather
//! order of shard results never changes the final answer. Everything derived
//! from the merged counts (`ipm`, ordering, truncation) happens afterwards.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Cap applied to truncated results when the caller gives no limit.
pub const DEFAULT_MAX_ITEMS: usize = 100;

/// A partial result that can absorb another partial of the same kind.
pub trait Mergeable: DeserializeOwned + Default + Send + 'static {
    fn merge_with(&mut self, other: Self);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreqDistribItem {
    pub word: String,
    pub freq: u64,
    pub norm: u64,
    /// Instances per million relative to `norm`. Only meaningful after
    /// [`FreqDistrib::finalize`].
    #[serde(default)]
    pub ipm: f64,
}

impl FreqDistribItem {
    pub fn new(word: impl Into<String>, freq: u64, norm: u64) -> Self {
        FreqDistribItem {
            word: word.into(),
            freq,
            norm,
            ipm: 0.0,
        }
    }
}

/// Frequency distribution over words or structural attribute values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreqDistrib {
    #[serde(rename = "freqs")]
    pub items: Vec<FreqDistribItem>,
    pub conc_size: u64,
    pub corpus_size: u64,
    pub subc_size: u64,
}

impl FreqDistrib {
    /// Descending by `freq`, ties ascending by `word`. Merge order leaves
    /// items in shard completion order, so ties need a key of their own.
    pub fn sort_by_freq_desc(&mut self) {
        self.items
            .sort_by(|a, b| b.freq.cmp(&a.freq).then_with(|| a.word.cmp(&b.word)));
    }

    /// Keeps the first `max_items` entries, [`DEFAULT_MAX_ITEMS`] if `None`.
    pub fn cap_items(&mut self, max_items: Option<usize>) {
        self.items.truncate(max_items.unwrap_or(DEFAULT_MAX_ITEMS));
    }

    /// Computes `ipm` from the merged counts, rounded to two decimals.
    pub fn finalize(&mut self) {
        for item in self.items.iter_mut() {
            item.ipm = if item.norm == 0 {
                0.0
            } else {
                round_to(item.freq as f64 / item.norm as f64 * 1_000_000.0, 2)
            };
        }
    }
}

impl Mergeable for FreqDistrib {
    /// Items are united by exact `word`; `freq` and `norm` are summed on
    /// collision. `concSize` and `subcSize` add up, `corpusSize` keeps the
    /// largest value seen.
    fn merge_with(&mut self, other: Self) {
        let mut index: HashMap<String, usize> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.word.clone(), i))
            .collect();
        for mut item in other.items {
            match index.get(&item.word) {
                Some(&i) => {
                    let target = &mut self.items[i];
                    target.freq += item.freq;
                    target.norm += item.norm;
                    target.ipm = 0.0;
                }
                None => {
                    item.ipm = 0.0;
                    index.insert(item.word.clone(), self.items.len());
                    self.items.push(item);
                }
            }
        }
        self.conc_size += other.conc_size;
        self.subc_size += other.subc_size;
        self.corpus_size = self.corpus_size.max(other.corpus_size);
    }
}

/// Acknowledgement of precomputed collocation frequency files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollFreqDataReady {
    pub files: BTreeSet<PathBuf>,
}

impl Mergeable for CollFreqDataReady {
    fn merge_with(&mut self, other: Self) {
        self.files.extend(other.files);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcLine {
    pub position: u64,
    pub left: String,
    pub kwic: String,
    pub right: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concordance {
    pub lines: Vec<ConcLine>,
    pub conc_size: u64,
    pub corpus_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollItem {
    pub word: String,
    pub score: f64,
    pub freq: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collocations {
    pub colls: Vec<CollItem>,
    pub conc_size: u64,
    pub corpus_size: u64,
    pub subc_size: u64,
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
