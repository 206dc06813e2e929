#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use corpus_swarm::{Executor, SwarmConfig};
use judge::{Judge, VerticalEngine};
use synapse::{JobQueue, MemoryBroker};
use tempfile::TempDir;

pub const CORPUS_ID: &str = "syn_mini";

/// Ten tokens in two documents. Chunks of four give shards
/// `[0,4)`, `[4,8)` and `[8,10)`, each holding at least one noun.
pub const CORPUS: &str = "<doc genre=\"news\">
the\tthe\tDT
cat\tcat\tNN
sat\tsit\tVBD
on\ton\tIN
the\tthe\tDT
mat\tmat\tNN
</doc>
<doc genre=\"blog\">
a\ta\tDT
cat\tcat\tNN
ran\trun\tVBD
home\thome\tNN
</doc>
";

pub struct Fixture {
    pub dir: TempDir,
    pub config: Arc<SwarmConfig>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let registry = dir.path().join("registry");
        std::fs::create_dir_all(&registry).unwrap();
        std::fs::write(registry.join(CORPUS_ID), CORPUS).unwrap();

        let mut config = SwarmConfig::default();
        config.corpora.registry_dir = registry;
        config.corpora.split_corpora_dir = dir.path().join("split");
        config.corpora.multisampled_corpora_dir = dir.path().join("multisampled");
        config.corpora.multiproc_chunk_size = 4;
        config.corpora.multisampled_subc_size = 3;
        config.corpora.default_num_samples = 5;
        Fixture {
            dir,
            config: Arc::new(config),
        }
    }

    pub fn corpus_path(&self) -> PathBuf {
        self.config.registry_path(CORPUS_ID).unwrap()
    }

    /// Broker with two workers running the vertical engine.
    pub fn broker(&self) -> MemoryBroker {
        let (broker, queue) = MemoryBroker::new();
        for _ in 0..2 {
            spawn_worker(queue.clone(), self.config.workers.positional_attrs.clone());
        }
        broker
    }

    pub fn executor(&self) -> Executor {
        Executor::new(Arc::new(self.broker()))
    }
}

pub fn spawn_worker(queue: JobQueue, attrs: Vec<String>) {
    let judge = Judge::new(VerticalEngine::new(attrs));
    tokio::spawn(async move {
        while let Some(delivery) = queue.next().await {
            let result = judge.execute(&delivery.job).await;
            delivery.resolve(result);
        }
    });
}
