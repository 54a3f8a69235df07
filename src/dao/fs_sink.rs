use std::path::PathBuf;

use futures::future::BoxFuture;
use tracing::info;

use crate::dao::{
    models::MatchSummary,
    sink::{SinkError, SinkResult, SummarySink},
};

/// Summary sink that writes one pretty-printed JSON file per finished match
/// under a configurable directory.
pub struct FileSummarySink {
    dir: PathBuf,
}

impl FileSummarySink {
    /// Create a sink rooted at `dir`; the directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SummarySink for FileSummarySink {
    fn store(&self, summary: MatchSummary) -> BoxFuture<'static, SinkResult<()>> {
        let dir = self.dir.clone();
        Box::pin(async move {
            tokio::fs::create_dir_all(&dir).await.map_err(|err| {
                SinkError::unavailable(format!("creating {}", dir.display()), err)
            })?;

            let stamp: String = summary
                .finished_at
                .chars()
                .map(|c| if c == ':' { '-' } else { c })
                .collect();
            let path = dir.join(format!("match-{}-{}.json", summary.code, stamp));

            let payload = serde_json::to_vec_pretty(&summary)
                .map_err(|err| SinkError::unavailable("serializing summary".into(), err))?;
            tokio::fs::write(&path, payload)
                .await
                .map_err(|err| SinkError::unavailable(format!("writing {}", path.display()), err))?;

            info!(path = %path.display(), "exported match summary");
            Ok(())
        })
    }
}
