//! Search backend contract
//!
//! Both retrieval sources implement the same contract:
//! `search(query, top_n)` returning a scored, stage-tagged result set.
//! Connection problems and timeouts surface as `BackendUnavailable`,
//! malformed responses as `BackendError`. Clients do not retry; the
//! orchestrator tolerates either source failing independently.

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::RetrievalResult;

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short backend name used in degradation notes and health output.
    fn name(&self) -> &str;

    /// Retrieve up to `top_n` scored passages for `query`.
    async fn search(&self, query: &str, top_n: usize) -> Result<RetrievalResult>;

    /// Cheap availability probe for the health command.
    async fn health_check(&self) -> bool;
}
