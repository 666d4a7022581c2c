//! Hybrid Retriever: orchestrates dense + BM25, fuses, optionally reranks
//! (spec §4.6).

use std::sync::Arc;

use crate::bm25_store::Bm25Store;
use crate::dense_store::DenseStore;
use crate::error::{CangjieError, Result};
use crate::fusion::reciprocal_rank_fusion;
use crate::models::SearchResult;
use crate::reranker::Reranker;

/// Distinguishes "this store isn't configured" from "this store is
/// configured but failed" — only the latter should make an all-empty result
/// set propagate as a backend error rather than a legitimate empty answer.
enum StoreOutcome {
    Unconfigured,
    Failed,
    Hits(Vec<SearchResult>),
}

#[derive(Clone)]
pub struct HybridRetriever {
    dense: Option<Arc<DenseStore>>,
    bm25: Option<Arc<Bm25Store>>,
    reranker: Reranker,
    rrf_k: usize,
    initial_k: usize,
}

impl HybridRetriever {
    pub fn new(
        dense: Option<Arc<DenseStore>>,
        bm25: Option<Arc<Bm25Store>>,
        reranker: Reranker,
        rrf_k: usize,
        initial_k: usize,
    ) -> Self {
        Self {
            dense,
            bm25,
            reranker,
            rrf_k,
            initial_k,
        }
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        category: Option<&str>,
        rerank: bool,
    ) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let dense_fut = async {
            match &self.dense {
                Some(store) => match store.search(query, self.initial_k, category).await {
                    Ok(hits) => StoreOutcome::Hits(hits),
                    Err(e) => {
                        tracing::warn!(error = %e, "dense search failed, proceeding with bm25 only");
                        StoreOutcome::Failed
                    }
                },
                None => StoreOutcome::Unconfigured,
            }
        };
        let bm25_fut = async {
            match &self.bm25 {
                Some(store) => match store.search(query, self.initial_k, category) {
                    Ok(hits) => StoreOutcome::Hits(hits),
                    Err(e) => {
                        tracing::warn!(error = %e, "bm25 search failed, proceeding with dense only");
                        StoreOutcome::Failed
                    }
                },
                None => StoreOutcome::Unconfigured,
            }
        };

        let (dense_outcome, bm25_outcome) = tokio::join!(dense_fut, bm25_fut);

        let mut lists = Vec::new();
        let mut any_failed = false;
        for outcome in [dense_outcome, bm25_outcome] {
            match outcome {
                StoreOutcome::Hits(hits) => lists.push(hits),
                StoreOutcome::Failed => any_failed = true,
                StoreOutcome::Unconfigured => {}
            }
        }

        if lists.is_empty() {
            if any_failed {
                return Err(CangjieError::BackendError(anyhow::anyhow!(
                    "all configured retrieval backends failed"
                )));
            }
            return Ok(Vec::new());
        }

        let fused = reciprocal_rank_fusion(&lists, self.rrf_k, self.initial_k);

        if rerank && self.reranker.is_enabled() {
            self.reranker.rerank(query, fused, top_k).await
        } else {
            let mut fused = fused;
            fused.truncate(top_k);
            Ok(fused)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_stores_configured_returns_empty_not_error() {
        let retriever = HybridRetriever::new(None, None, Reranker::NoOp, 60, 20);
        let results = retriever.search("query", 5, None, false).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn top_k_zero_returns_empty() {
        let retriever = HybridRetriever::new(None, None, Reranker::NoOp, 60, 20);
        let results = retriever.search("query", 0, None, false).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn configured_store_failing_propagates_backend_error() {
        use crate::dense_store::{DenseStore, SqliteVectorDb};
        use crate::embedding::DisabledProvider;
        use std::sync::Arc;
        use tempfile::TempDir;

        let tmp = TempDir::new().unwrap();
        let db = Arc::new(SqliteVectorDb::open(&tmp.path().join("v.db")).await.unwrap());
        let dense = Arc::new(DenseStore::new(db, Arc::new(DisabledProvider), tmp.path()));

        let retriever = HybridRetriever::new(Some(dense), None, Reranker::NoOp, 60, 20);
        let result = retriever.search("query", 5, None, false).await;
        assert!(matches!(result, Err(CangjieError::BackendError(_))));
    }
}
