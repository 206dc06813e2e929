//! Reference engine over plain vertical files.
//!
//! One token per line with tab separated positional attributes in the
//! configured order. Structure tags sit on their own lines:
//!
//! ```text
//! <doc genre="news" year="2020">
//! The	the	DT
//! cat	cat	NN
//! </doc>
//! ```
//!
//! Structural attributes are addressed as `doc.genre`. Queries are a single
//! token pattern `[lemma="cat" & tag="NN"]` or a bare word.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use corpus_swarm::core::query::{
    CollFreqDataArgs, CollocationsArgs, ConcordanceArgs, FreqDistribArgs, MAX_RECORDS_INTERNAL_LIMIT,
};
use corpus_swarm::core::results::{
    round_to, CollFreqDataReady, CollItem, Collocations, ConcLine, Concordance, FreqDistrib, FreqDistribItem,
};
use dashmap::DashMap;
use prism::{coll_freq_path, SubcDescriptor};
use tracing::{debug, info};

use crate::engine::{CorpusEngine, EngineError};

struct Token {
    values: Vec<String>,
    /// Index into `VerticalCorpus::contexts`.
    context: usize,
}

/// A parsed vertical file.
pub struct VerticalCorpus {
    attrs: Vec<String>,
    tokens: Vec<Token>,
    /// Structural attribute values in effect, one entry per change.
    contexts: Vec<BTreeMap<String, String>>,
}

impl VerticalCorpus {
    pub fn parse(attrs: &[String], text: &str) -> Result<Self, EngineError> {
        let mut tokens = Vec::new();
        let mut contexts = vec![BTreeMap::new()];
        let mut open: BTreeMap<String, String> = BTreeMap::new();

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix("</").and_then(|l| l.strip_suffix('>')) {
                let prefix = format!("{}.", name.trim());
                open.retain(|k, _| !k.starts_with(&prefix));
                contexts.push(open.clone());
                continue;
            }
            if line.starts_with('<') && line.ends_with('>') {
                let (name, pairs) = parse_tag(line).ok_or_else(|| {
                    EngineError::Failed(format!("malformed structure tag on line {}: {}", lineno + 1, line))
                })?;
                for (key, value) in pairs {
                    open.insert(format!("{}.{}", name, key), value);
                }
                contexts.push(open.clone());
                continue;
            }
            let mut values: Vec<String> = line.split('\t').map(str::to_string).collect();
            values.resize(attrs.len(), String::new());
            tokens.push(Token {
                values,
                context: contexts.len() - 1,
            });
        }
        Ok(VerticalCorpus {
            attrs: attrs.to_vec(),
            tokens,
            contexts,
        })
    }

    pub fn size(&self) -> u64 {
        self.tokens.len() as u64
    }

    fn attr_index(&self, attr: &str) -> Result<usize, EngineError> {
        self.attrs
            .iter()
            .position(|a| a == attr)
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown positional attribute '{}'", attr)))
    }

    fn value(&self, pos: usize, attr: usize) -> &str {
        &self.tokens[pos].values[attr]
    }

    fn struct_value(&self, pos: usize, attr: &str) -> Option<&str> {
        self.contexts[self.tokens[pos].context].get(attr).map(String::as_str)
    }

    fn search_range(&self, subc: Option<&Path>) -> Result<Range<usize>, EngineError> {
        let len = self.tokens.len();
        match subc {
            None => Ok(0..len),
            Some(path) => {
                let d = SubcDescriptor::read(path).map_err(|e| EngineError::Failed(e.to_string()))?;
                let from = (d.from as usize).min(len);
                let to = (d.to as usize).min(len);
                Ok(from..to)
            }
        }
    }

    fn matches(&self, query: &TokenQuery, range: Range<usize>) -> Vec<usize> {
        range
            .filter(|&pos| query.conds.iter().all(|(attr, value)| self.value(pos, *attr) == value))
            .collect()
    }
}

fn parse_tag(line: &str) -> Option<(String, Vec<(String, String)>)> {
    let inner = line.strip_prefix('<')?.strip_suffix('>')?;
    let inner = inner.strip_suffix('/').unwrap_or(inner).trim();
    let (name, mut rest) = match inner.find(char::is_whitespace) {
        Some(i) => (&inner[..i], inner[i..].trim_start()),
        None => (inner, ""),
    };
    if name.is_empty() {
        return None;
    }
    let mut pairs = Vec::new();
    while !rest.is_empty() {
        let eq = rest.find('=')?;
        let key = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let body = &after[1..];
        let end = body.find(quote)?;
        pairs.push((key.to_string(), body[..end].to_string()));
        rest = body[end + 1..].trim_start();
    }
    Some((name.to_string(), pairs))
}

/// Conditions on positional attributes of a single token.
struct TokenQuery {
    conds: Vec<(usize, String)>,
}

impl TokenQuery {
    fn parse(corpus: &VerticalCorpus, query: &str) -> Result<Self, EngineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::InvalidInput("empty query".to_string()));
        }
        let Some(inner) = query.strip_prefix('[').and_then(|q| q.strip_suffix(']')) else {
            if query.contains(char::is_whitespace) || query.contains('"') {
                return Err(EngineError::InvalidInput(format!("cannot parse query '{}'", query)));
            }
            return Ok(TokenQuery {
                conds: vec![(0, query.to_string())],
            });
        };
        let mut conds = Vec::new();
        for part in inner.split('&') {
            let (attr, value) = part
                .split_once('=')
                .ok_or_else(|| EngineError::InvalidInput(format!("cannot parse condition '{}'", part.trim())))?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .ok_or_else(|| EngineError::InvalidInput(format!("value must be quoted in '{}'", part.trim())))?;
            conds.push((corpus.attr_index(attr.trim())?, value.to_string()));
        }
        Ok(TokenQuery { conds })
    }
}

/// What a frequency criterion counts.
enum Crit {
    Positional(usize),
    Structural(String),
}

impl Crit {
    /// Accepts `attr[/flags] 0[~0>0]`; only the matched token itself (offset 0)
    /// can be counted.
    fn parse(corpus: &VerticalCorpus, crit: &str) -> Result<Self, EngineError> {
        let mut parts = crit.split_whitespace();
        let attr = parts
            .next()
            .ok_or_else(|| EngineError::InvalidInput("empty frequency criterion".to_string()))?;
        let attr = attr.split('/').next().unwrap_or(attr);
        if let Some(offset) = parts.next() {
            if offset != "0" && offset != "0~0>0" {
                return Err(EngineError::Unsupported(format!("criterion offset '{}'", offset)));
            }
        }
        if attr.contains('.') {
            Ok(Crit::Structural(attr.to_string()))
        } else {
            Ok(Crit::Positional(corpus.attr_index(attr)?))
        }
    }
}

/// Association score of a collocate. `fxy` co-occurrences, `fx` node
/// frequency, `fy` collocate frequency, `n` searched positions.
fn coll_score(measure: &str, fxy: f64, fx: f64, fy: f64, n: f64) -> Result<f64, EngineError> {
    match measure {
        "f" => Ok(fxy),
        "d" => Ok(14.0 + (2.0 * fxy / (fx + fy)).log2()),
        "m" => Ok((fxy * n / (fx * fy)).log2()),
        "t" => Ok((fxy - fx * fy / n) / fxy.sqrt()),
        other => Err(EngineError::Unsupported(format!("collocation measure '{}'", other))),
    }
}

pub struct VerticalEngine {
    attrs: Vec<String>,
    cache: DashMap<PathBuf, Arc<VerticalCorpus>>,
}

impl VerticalEngine {
    pub fn new(attrs: Vec<String>) -> Self {
        VerticalEngine {
            attrs,
            cache: DashMap::new(),
        }
    }

    /// Parses a corpus file once and serves later calls from the cache.
    pub fn load(&self, path: &Path) -> Result<Arc<VerticalCorpus>, EngineError> {
        if let Some(corpus) = self.cache.get(path) {
            return Ok(corpus.value().clone());
        }
        let text = fs::read_to_string(path)
            .map_err(|e| EngineError::Failed(format!("failed to open corpus '{}': {}", path.display(), e)))?;
        let corpus = Arc::new(VerticalCorpus::parse(&self.attrs, &text)?);
        info!(corpus = %path.display(), size = corpus.size(), "corpus loaded");
        let entry = self.cache.entry(path.to_path_buf()).or_insert(corpus);
        Ok(entry.value().clone())
    }
}

impl CorpusEngine for VerticalEngine {
    fn corpus_size(&self, corpus_path: &Path) -> Result<u64, EngineError> {
        Ok(self.load(corpus_path)?.size())
    }

    fn freq_distrib(&self, args: &FreqDistribArgs) -> Result<FreqDistrib, EngineError> {
        let corpus = self.load(&args.corpus_path)?;
        let query = TokenQuery::parse(&corpus, &args.query)?;
        let crit = Crit::parse(&corpus, &args.crit)?;
        let range = corpus.search_range(args.subc_path.as_deref())?;
        let subc_size = range.len() as u64;
        let hits = corpus.matches(&query, range.clone());

        let mut order: Vec<String> = Vec::new();
        let mut freqs: HashMap<String, u64> = HashMap::new();
        for &pos in &hits {
            let value = match &crit {
                Crit::Positional(attr) => Some(corpus.value(pos, *attr)),
                Crit::Structural(attr) => corpus.struct_value(pos, attr),
            };
            if let Some(value) = value {
                let count = freqs.entry(value.to_string()).or_insert_with(|| {
                    order.push(value.to_string());
                    0
                });
                *count += 1;
            }
        }

        let norms: HashMap<String, u64> = match &crit {
            Crit::Positional(_) => HashMap::new(),
            Crit::Structural(attr) => {
                let mut norms = HashMap::new();
                for pos in range {
                    if let Some(value) = corpus.struct_value(pos, attr) {
                        *norms.entry(value.to_string()).or_insert(0) += 1;
                    }
                }
                norms
            }
        };

        let mut result = FreqDistrib {
            items: order
                .into_iter()
                .filter_map(|word| {
                    let freq = freqs[&word];
                    let norm = match &crit {
                        Crit::Positional(_) => subc_size,
                        Crit::Structural(_) => norms.get(&word).copied().unwrap_or(0),
                    };
                    (freq >= args.flimit).then(|| FreqDistribItem::new(word, freq, norm))
                })
                .collect(),
            conc_size: hits.len() as u64,
            corpus_size: corpus.size(),
            subc_size,
        };
        result.sort_by_freq_desc();
        if args.max_results > 0 {
            result.cap_items(Some(args.max_results));
        }
        result.finalize();
        Ok(result)
    }

    fn compile_subc_freqs(&self, args: &CollFreqDataArgs) -> Result<CollFreqDataReady, EngineError> {
        let corpus = self.load(&args.corpus_path)?;
        let range = corpus.search_range(Some(&args.subc_path))?;
        let mut ready = CollFreqDataReady::default();
        for attr in &args.attrs {
            let idx = corpus.attr_index(attr)?;
            let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
            for pos in range.clone() {
                *counts.entry(corpus.value(pos, idx)).or_insert(0) += 1;
            }
            let mut out = String::new();
            for (value, freq) in &counts {
                out.push_str(value);
                out.push('\t');
                out.push_str(&freq.to_string());
                out.push('\n');
            }
            let path = coll_freq_path(&args.subc_path, attr);
            fs::write(&path, out)
                .map_err(|e| EngineError::Failed(format!("failed to write '{}': {}", path.display(), e)))?;
            debug!(path = %path.display(), values = counts.len(), "collocation frequency file written");
            ready.files.insert(path);
        }
        Ok(ready)
    }

    fn concordance(&self, args: &ConcordanceArgs) -> Result<Concordance, EngineError> {
        let corpus = self.load(&args.corpus_path)?;
        let query = TokenQuery::parse(&corpus, &args.query)?;
        let len = corpus.tokens.len();
        let hits = corpus.matches(&query, 0..len);
        let conc_size = hits.len() as u64;
        if args.from_line > hits.len() {
            return Err(EngineError::RowsRangeOutOfConc {
                from_line: args.from_line,
                conc_size,
            });
        }
        let words = |range: Range<usize>| {
            range
                .map(|pos| corpus.value(pos, 0))
                .collect::<Vec<_>>()
                .join(" ")
        };
        let max_items = args.max_items.min(MAX_RECORDS_INTERNAL_LIMIT);
        let lines = hits
            .iter()
            .skip(args.from_line)
            .take(max_items)
            .map(|&pos| ConcLine {
                position: pos as u64,
                left: words(pos.saturating_sub(args.max_context)..pos),
                kwic: corpus.value(pos, 0).to_string(),
                right: words(pos + 1..(pos + 1 + args.max_context).min(len)),
            })
            .collect();
        Ok(Concordance {
            lines,
            conc_size,
            corpus_size: corpus.size(),
        })
    }

    fn collocations(&self, args: &CollocationsArgs) -> Result<Collocations, EngineError> {
        let corpus = self.load(&args.corpus_path)?;
        let query = TokenQuery::parse(&corpus, &args.query)?;
        let attr = corpus.attr_index(&args.attr)?;
        // reject an unknown measure before doing any work
        coll_score(&args.measure, 1.0, 1.0, 1.0, 1.0)?;
        let range = corpus.search_range(args.subc_path.as_deref())?;
        let hits = corpus.matches(&query, range.clone());

        let mut order: Vec<&str> = Vec::new();
        let mut cooc: HashMap<&str, u64> = HashMap::new();
        for &pos in &hits {
            for offset in args.srch_left..=args.srch_right {
                if offset == 0 {
                    continue;
                }
                let target = pos as i64 + offset;
                if target < range.start as i64 || target >= range.end as i64 {
                    continue;
                }
                let value = corpus.value(target as usize, attr);
                let count = cooc.entry(value).or_insert_with(|| {
                    order.push(value);
                    0
                });
                *count += 1;
            }
        }

        let mut totals: HashMap<&str, u64> = HashMap::new();
        for pos in range.clone() {
            *totals.entry(corpus.value(pos, attr)).or_insert(0) += 1;
        }

        let n = range.len() as f64;
        let fx = hits.len() as f64;
        let mut colls = Vec::new();
        for value in order {
            let fxy = cooc[value];
            if fxy < args.min_freq {
                continue;
            }
            let fy = totals.get(value).copied().unwrap_or(0) as f64;
            let score = coll_score(&args.measure, fxy as f64, fx, fy, n)?;
            colls.push(CollItem {
                word: value.to_string(),
                score: round_to(score, 4),
                freq: fxy,
            });
        }
        colls.sort_by(|a, b| b.score.total_cmp(&a.score));
        colls.truncate(args.max_items);
        Ok(Collocations {
            colls,
            conc_size: hits.len() as u64,
            corpus_size: corpus.size(),
            subc_size: range.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const CORPUS: &str = "<doc genre=\"news\" year=\"2020\">
The\tthe\tDT
cat\tcat\tNN
sat\tsit\tVBD
</doc>
<doc genre=\"fiction\">
A\ta\tDT
cat\tcat\tNN
saw\tsee\tVBD
the\tthe\tDT
dog\tdog\tNN
</doc>
";

    fn corpus_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CORPUS.as_bytes()).unwrap();
        file
    }

    fn engine() -> VerticalEngine {
        VerticalEngine::new(vec!["word".into(), "lemma".into(), "tag".into()])
    }

    fn freq_args(file: &NamedTempFile, query: &str, crit: &str) -> FreqDistribArgs {
        FreqDistribArgs {
            corpus_path: file.path().into(),
            subc_path: None,
            query: query.into(),
            crit: crit.into(),
            flimit: 1,
            max_results: 0,
        }
    }

    fn words(d: &FreqDistrib) -> Vec<(&str, u64, u64)> {
        d.items.iter().map(|i| (i.word.as_str(), i.freq, i.norm)).collect()
    }

    #[test]
    fn test_parse_tokens_and_structures() {
        let attrs = vec!["word".to_string(), "lemma".to_string()];
        let corpus = VerticalCorpus::parse(&attrs, CORPUS).unwrap();
        assert_eq!(corpus.size(), 8);
        assert_eq!(corpus.value(2, 1), "sit");
        assert_eq!(corpus.struct_value(0, "doc.year"), Some("2020"));
        assert_eq!(corpus.struct_value(4, "doc.genre"), Some("fiction"));
        assert_eq!(corpus.struct_value(4, "doc.year"), None);
    }

    #[test]
    fn test_parse_tag_variants() {
        assert_eq!(parse_tag("<p>"), Some(("p".to_string(), vec![])));
        assert_eq!(
            parse_tag("<doc id='a b' n=\"1\"/>"),
            Some(("doc".to_string(), vec![("id".into(), "a b".into()), ("n".into(), "1".into())]))
        );
        assert_eq!(parse_tag("<doc id=x>"), None);
    }

    #[test]
    fn test_corpus_is_cached() {
        let file = corpus_file();
        let engine = engine();
        let a = engine.load(file.path()).unwrap();
        let b = engine.load(file.path()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_word_freq_distrib() {
        let file = corpus_file();
        let d = engine()
            .freq_distrib(&freq_args(&file, "[tag=\"NN\"]", "lemma/e 0~0>0"))
            .unwrap();
        assert_eq!(words(&d), vec![("cat", 2, 8), ("dog", 1, 8)]);
        assert_eq!(d.conc_size, 3);
        assert_eq!(d.items[0].ipm, 250000.0);

        let d = engine().freq_distrib(&freq_args(&file, "[lemma=\"the\"]", "word 0")).unwrap();
        assert_eq!(words(&d), vec![("The", 1, 8), ("the", 1, 8)]);
    }

    #[test]
    fn test_flimit_and_max_results() {
        let file = corpus_file();
        let mut args = freq_args(&file, "[tag=\"NN\"]", "lemma 0");
        args.flimit = 2;
        let d = engine().freq_distrib(&args).unwrap();
        assert_eq!(words(&d), vec![("cat", 2, 8)]);

        let mut args = freq_args(&file, "[tag=\"DT\"]", "word 0");
        args.max_results = 1;
        let d = engine().freq_distrib(&args).unwrap();
        assert_eq!(d.items.len(), 1);
        assert_eq!(d.conc_size, 3);
    }

    #[test]
    fn test_text_types_norms() {
        let file = corpus_file();
        let d = engine().freq_distrib(&freq_args(&file, "cat", "doc.genre 0")).unwrap();
        assert_eq!(words(&d), vec![("fiction", 1, 5), ("news", 1, 3)]);
    }

    #[test]
    fn test_subcorpus_restricts_search() {
        let file = corpus_file();
        let dir = TempDir::new().unwrap();
        let subc = dir.path().join("chunk_01.subc");
        SubcDescriptor::new(3, 8).unwrap().write_new(&subc).unwrap();

        let mut args = freq_args(&file, "cat", "word 0");
        args.subc_path = Some(subc);
        let d = engine().freq_distrib(&args).unwrap();
        assert_eq!(words(&d), vec![("cat", 1, 5)]);
        assert_eq!(d.subc_size, 5);
        assert_eq!(d.corpus_size, 8);
    }

    #[test]
    fn test_bad_queries() {
        let file = corpus_file();
        let engine = engine();
        assert!(matches!(
            engine.freq_distrib(&freq_args(&file, "[pos=\"NN\"]", "word 0")),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.freq_distrib(&freq_args(&file, "", "word 0")),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.freq_distrib(&freq_args(&file, "cat", "word 1")),
            Err(EngineError::Unsupported(_))
        ));
    }

    #[test]
    fn test_compile_subc_freqs_writes_frq_files() {
        let file = corpus_file();
        let dir = TempDir::new().unwrap();
        let subc = dir.path().join("chunk_00.subc");
        SubcDescriptor::new(0, 3).unwrap().write_new(&subc).unwrap();

        let ready = engine()
            .compile_subc_freqs(&CollFreqDataArgs {
                corpus_path: file.path().into(),
                subc_path: subc.clone(),
                attrs: vec!["lemma".into()],
            })
            .unwrap();
        let path = coll_freq_path(&subc, "lemma");
        assert!(ready.files.contains(&path));
        assert_eq!(fs::read_to_string(path).unwrap(), "cat\t1\nsit\t1\nthe\t1\n");
    }

    #[test]
    fn test_concordance_lines_and_range() {
        let file = corpus_file();
        let mut args = ConcordanceArgs {
            corpus_path: file.path().into(),
            query: "cat".into(),
            from_line: 0,
            max_items: 10,
            max_context: 2,
        };
        let conc = engine().concordance(&args).unwrap();
        assert_eq!(conc.conc_size, 2);
        assert_eq!(conc.lines[0].left, "The");
        assert_eq!(conc.lines[0].kwic, "cat");
        assert_eq!(conc.lines[0].right, "sat A");
        assert_eq!(conc.lines[1].position, 4);

        args.from_line = 2;
        assert!(engine().concordance(&args).unwrap().lines.is_empty());
        args.from_line = 3;
        assert!(matches!(
            engine().concordance(&args),
            Err(EngineError::RowsRangeOutOfConc { from_line: 3, conc_size: 2 })
        ));
    }

    fn coll_args(file: &NamedTempFile, measure: &str) -> CollocationsArgs {
        CollocationsArgs {
            corpus_path: file.path().into(),
            subc_path: None,
            query: "[lemma=\"cat\"]".into(),
            attr: "lemma".into(),
            measure: measure.into(),
            srch_left: -1,
            srch_right: 1,
            min_freq: 1,
            max_items: 10,
        }
    }

    #[test]
    fn test_collocations_absolute_frequency() {
        let file = corpus_file();
        let colls = engine().collocations(&coll_args(&file, "f")).unwrap();
        let got: Vec<_> = colls.colls.iter().map(|c| (c.word.as_str(), c.freq)).collect();
        assert_eq!(got, vec![("the", 1), ("sit", 1), ("a", 1), ("see", 1)]);
        assert_eq!(colls.conc_size, 2);
    }

    #[test]
    fn test_collocations_log_dice() {
        let file = corpus_file();
        let colls = engine().collocations(&coll_args(&file, "d")).unwrap();
        let last = colls.colls.last().unwrap();
        assert_eq!(last.word, "the");
        assert_eq!(last.score, 13.0);
        assert_eq!(colls.colls[0].score, 13.415);
    }

    #[test]
    fn test_collocations_unknown_measure() {
        let file = corpus_file();
        assert!(matches!(
            engine().collocations(&coll_args(&file, "x")),
            Err(EngineError::Unsupported(_))
        ));
    }
}
