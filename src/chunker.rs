//! Semantic chunker with a sentence/size-splitter fallback (spec §4.2).
//!
//! Generalizes the teacher's `chunk.rs` paragraph splitter: where the
//! teacher splits purely on `"\n\n"` boundaries and a char budget, this
//! chunker first tries embedding-distance breakpoints over sentences, and
//! falls back to the teacher's size-bounded splitter (now operating on
//! sentence boundaries via `unicode-segmentation` rather than raw
//! paragraphs) when the embedding provider is unavailable, errors, or
//! `use_semantic = false`.

use std::sync::Arc;

use unicode_segmentation::UnicodeSegmentation;

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::models::{Chunk, Document, DocumentMetadata};

const DEFAULT_BREAKPOINT_PERCENTILE: f64 = 95.0;
const DEFAULT_BUFFER_SIZE: usize = 1;

pub struct Chunker {
    embedder: Arc<dyn EmbeddingProvider>,
    chunk_max_size: usize,
    breakpoint_percentile: f64,
    buffer_size: usize,
}

impl Chunker {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, chunk_max_size: usize) -> Self {
        Self {
            embedder,
            chunk_max_size,
            breakpoint_percentile: DEFAULT_BREAKPOINT_PERCENTILE,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// `chunk(documents, use_semantic) -> sequence<Chunk>` (spec §4.2).
    pub async fn chunk(&self, documents: &[Document], use_semantic: bool) -> Vec<Chunk> {
        let mut out = Vec::new();
        for doc in documents {
            let chunks = if use_semantic {
                match self.chunk_semantic(doc).await {
                    Some(chunks) => chunks,
                    None => {
                        tracing::warn!(doc_id = %doc.doc_id, "semantic chunking unavailable, falling back to size splitter");
                        self.chunk_fallback(doc)
                    }
                }
            } else {
                self.chunk_fallback(doc)
            };
            out.extend(chunks);
        }
        out
    }

    async fn chunk_semantic(&self, doc: &Document) -> Option<Vec<Chunk>> {
        let sentences = split_sentences(&doc.text);
        if sentences.len() < 2 {
            return Some(self.wrap_sentences(doc, vec![sentences.join("")]));
        }

        let embeddings = self
            .embedder
            .embed(&sentences.iter().map(|s| s.to_string()).collect::<Vec<_>>())
            .await
            .ok()?;
        if embeddings.len() != sentences.len() {
            return None;
        }

        let mut distances = Vec::with_capacity(sentences.len().saturating_sub(1));
        for w in embeddings.windows(2) {
            let sim = cosine_similarity(&w[0], &w[1]);
            distances.push(1.0 - sim as f64);
        }

        let threshold = percentile(&distances, self.breakpoint_percentile);
        let mut groups: Vec<Vec<&str>> = Vec::new();
        let mut current: Vec<&str> = vec![sentences[0]];
        for (i, dist) in distances.iter().enumerate() {
            let sentence = sentences[i + 1];
            if *dist > threshold {
                groups.push(std::mem::take(&mut current));
                current.push(sentence);
            } else {
                current.push(sentence);
            }
        }
        groups.push(current);

        // buffer_size: fold undersized trailing groups into their neighbor.
        let mut merged: Vec<String> = Vec::new();
        for group in groups {
            let text = group.join("");
            if let Some(last) = merged.last_mut() {
                if group.len() <= self.buffer_size && last.len() + text.len() <= self.chunk_max_size {
                    last.push_str(&text);
                    continue;
                }
            }
            merged.push(text);
        }

        Some(self.wrap_sentences(doc, merged))
    }

    fn wrap_sentences(&self, doc: &Document, texts: Vec<String>) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for text in texts {
            chunks.extend(self.split_oversized(doc, &text));
        }
        chunks
    }

    fn chunk_fallback(&self, doc: &Document) -> Vec<Chunk> {
        if doc.text.trim().is_empty() {
            return Vec::new();
        }
        let sentences = split_sentences(&doc.text);
        let mut chunks = Vec::new();
        let mut current = String::new();
        for sentence in sentences {
            if !current.is_empty() && current.len() + sentence.len() > self.chunk_max_size {
                chunks.push(make_chunk(doc, &current, chunks.len()));
                current.clear();
            }
            current.push_str(sentence);
        }
        if !current.trim().is_empty() {
            chunks.push(make_chunk(doc, &current, chunks.len()));
        }
        if chunks.is_empty() && !doc.text.trim().is_empty() {
            chunks.push(make_chunk(doc, &doc.text, 0));
        }
        chunks
    }

    /// A chunk larger than `chunk_max_size` is split further at sentence boundaries.
    fn split_oversized(&self, doc: &Document, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        if text.len() <= self.chunk_max_size {
            return vec![make_chunk(doc, text, 0)];
        }
        let sentences = split_sentences(text);
        let mut chunks = Vec::new();
        let mut current = String::new();
        for sentence in sentences {
            if !current.is_empty() && current.len() + sentence.len() > self.chunk_max_size {
                chunks.push(make_chunk(doc, &current, chunks.len()));
                current.clear();
            }
            current.push_str(sentence);
        }
        if !current.trim().is_empty() {
            chunks.push(make_chunk(doc, &current, chunks.len()));
        }
        chunks
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split_sentence_bounds()
        .filter(|s| !s.trim().is_empty())
        .collect()
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let rank = (p / 100.0) * (sorted.len() as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

fn make_chunk(doc: &Document, text: &str, index: usize) -> Chunk {
    Chunk {
        id: format!("{}::{}", doc.doc_id, index),
        text: text.trim().to_string(),
        metadata: DocumentMetadata {
            file_path: doc.metadata.file_path.clone(),
            category: doc.metadata.category.clone(),
            topic: doc.metadata.topic.clone(),
            title: doc.metadata.title.clone(),
            code_block_count: doc.metadata.code_block_count,
            source: doc.metadata.source.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledProvider;

    fn doc(text: &str) -> Document {
        Document {
            doc_id: "a/b.md".to_string(),
            text: text.to_string(),
            metadata: DocumentMetadata {
                file_path: "a/b.md".to_string(),
                category: "a".to_string(),
                topic: "b".to_string(),
                title: "B".to_string(),
                code_block_count: 0,
                source: "git".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn empty_document_yields_zero_chunks() {
        let chunker = Chunker::new(Arc::new(DisabledProvider), 1000);
        let chunks = chunker.chunk(&[doc("   ")], false).await;
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn fallback_used_when_embedding_unavailable() {
        let chunker = Chunker::new(Arc::new(DisabledProvider), 1000);
        let chunks = chunker.chunk(&[doc("Hello. World. Again.")], true).await;
        assert!(!chunks.is_empty());
    }

    #[tokio::test]
    async fn metadata_copied_not_merged_across_documents() {
        let chunker = Chunker::new(Arc::new(DisabledProvider), 5);
        let docs = vec![doc("First doc text."), {
            let mut d = doc("Second doc text.");
            d.doc_id = "c/d.md".to_string();
            d.metadata.file_path = "c/d.md".to_string();
            d.metadata.category = "c".to_string();
            d
        }];
        let chunks = chunker.chunk(&docs, false).await;
        assert!(chunks.iter().any(|c| c.metadata.category == "a"));
        assert!(chunks.iter().any(|c| c.metadata.category == "c"));
    }

    #[test]
    fn oversized_chunk_is_split_at_sentence_boundaries() {
        let chunker = Chunker::new(Arc::new(DisabledProvider), 10);
        let chunks = chunker.split_oversized(&doc(""), "One. Two. Three. Four.");
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.len() <= 20));
    }
}
