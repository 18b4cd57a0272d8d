use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use tracing::error;

use super::naming::NamingPolicy;

#[cfg(windows)]
const LINE_SEP: &str = "\r\n";
#[cfg(not(windows))]
const LINE_SEP: &str = "\n";

/// Appends drained accumulator snapshots to per-bucket CSV files.
///
/// Each bucket's block goes out as its own spawned append, so a flush never
/// waits on the slowest file; [`BucketWriter::drain`] joins everything still
/// in flight before the driver declares the source done. A failed append is
/// logged and dropped rather than aborting the batch.
pub struct BucketWriter {
    destination: PathBuf,
    naming: NamingPolicy,
    pending: JoinSet<()>,
}

impl BucketWriter {
    pub fn new(destination: impl Into<PathBuf>, naming: NamingPolicy) -> Self {
        BucketWriter {
            destination: destination.into(),
            naming,
            pending: JoinSet::new(),
        }
    }

    /// Queues one append per bucket in `snapshot` and returns without
    /// waiting for the appends to land.
    pub fn flush(&mut self, snapshot: BTreeMap<usize, Vec<String>>) {
        // Reap whatever finished since the last flush.
        while self.pending.try_join_next().is_some() {}

        for (key, entries) in snapshot {
            let path = self
                .destination
                .join(format!("{}.csv", self.naming.file_name(key)));

            let mut block = entries.join(LINE_SEP);
            block.push_str(LINE_SEP);

            self.pending.spawn(async move {
                if let Err(e) = append_block(&path, &block).await {
                    error!(path = %path.display(), error = %e, "Failed to append bucket file");
                }
            });
        }
    }

    /// Waits for every append still in flight.
    pub async fn drain(&mut self) {
        while self.pending.join_next().await.is_some() {}
    }
}

async fn append_block(path: &Path, block: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await?;

    file.write_all(block.as_bytes()).await?;
    file.flush().await
}
