use std::fs;
use std::io::Write;
use std::path::Path;

use pl_core::{Chunk, ChunkId, Embedder, ModelError, RelevanceScorer, ScoredResult};
use pl_indexer::ChunkRecord;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use xxhash_rust::xxh3::xxh3_64;

/// Deterministic bag-of-words embedder using signed feature hashing.
///
/// Each lowercase alphanumeric token is hashed to one coordinate with a
/// hash-derived sign; the result is L2-normalized. Texts sharing words end up
/// close in squared L2 distance, which is all the tests need from a model.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokens(text) {
            let h = xxh3_64(token.as_bytes());
            let slot = (h % self.dimension as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// Relevance = fraction of distinct query tokens present in the candidate.
pub struct OverlapScorer;

impl RelevanceScorer for OverlapScorer {
    fn score(&self, query: &str, candidate: &str) -> Result<f32, ModelError> {
        let mut query_tokens = tokens(query);
        query_tokens.sort();
        query_tokens.dedup();
        if query_tokens.is_empty() {
            return Ok(0.0);
        }
        let candidate_tokens = tokens(candidate);
        let hits = query_tokens
            .iter()
            .filter(|t| candidate_tokens.contains(t))
            .count();
        Ok(hits as f32 / query_tokens.len() as f32)
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// A small corpus of well-known paper excerpts, two or three chunks per paper.
pub fn sample_corpus() -> Vec<Chunk> {
    let papers: [(&str, &str, i32, &str, &[&str]); 5] = [
        (
            "Attention Is All You Need",
            "Vaswani, Shazeer, Parmar et al.",
            2017,
            "1706.03762",
            &[
                "The Transformer dispenses with recurrence entirely and relies on self-attention to draw global dependencies between input and output.",
                "Multi-head attention lets the model jointly attend to information from different representation subspaces at different positions.",
                "Sinusoidal positional encodings are added to the input embeddings so the model can make use of token order.",
            ],
        ),
        (
            "Deep Residual Learning for Image Recognition",
            "He, Zhang, Ren, Sun",
            2015,
            "1512.03385",
            &[
                "Residual blocks learn a residual mapping through identity shortcut connections, which eases optimization of very deep networks.",
                "A 152-layer residual network won the ImageNet classification challenge with a top-5 error of 3.57 percent.",
            ],
        ),
        (
            "Long Short-Term Memory",
            "Hochreiter, Schmidhuber",
            1997,
            "",
            &[
                "LSTM memory cells use multiplicative gating units to protect stored information from irrelevant inputs.",
                "Constant error carousels let gradients flow across long time lags without vanishing.",
            ],
        ),
        (
            "Playing Atari with Deep Reinforcement Learning",
            "Mnih, Kavukcuoglu, Silver et al.",
            2013,
            "1312.5602",
            &[
                "A convolutional Q-network trained with experience replay learns control policies directly from raw Atari pixels.",
                "Reinforcement learning agents maximize expected discounted reward by estimating action values.",
            ],
        ),
        (
            "BERT: Pre-training of Deep Bidirectional Transformers",
            "Devlin, Chang, Lee, Toutanova",
            2018,
            "1810.04805",
            &[
                "Masked language modeling randomly hides tokens and trains a bidirectional encoder to recover them.",
                "Next sentence prediction pre-trains the encoder to understand relationships between sentence pairs.",
                "Fine-tuning the pre-trained encoder with one additional output layer achieves state of the art on eleven benchmarks.",
            ],
        ),
    ];

    let mut chunks = Vec::new();
    let mut next_id = 1u64;
    for (title, authors, year, arxiv_id, texts) in papers {
        for text in texts {
            let mut chunk = Chunk::new(ChunkId(next_id), *text);
            chunk.paper_title = title.to_string();
            chunk.authors = authors.to_string();
            chunk.year = Some(year);
            chunk.arxiv_id = arxiv_id.to_string();
            if !arxiv_id.is_empty() {
                chunk.source_pdf = format!("{arxiv_id}.pdf");
            }
            chunks.push(chunk);
            next_id += 1;
        }
    }
    chunks
}

/// Write chunks as JSONL records.
pub fn write_jsonl(path: &Path, chunks: &[Chunk]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    for chunk in chunks {
        let line = serde_json::to_string(&ChunkRecord::from(chunk))?;
        writeln!(file, "{line}")?;
    }
    Ok(())
}

const VOCABULARY: &[&str] = &[
    "attention", "gradient", "network", "encoder", "decoder", "convolution", "residual",
    "policy", "reward", "token", "embedding", "layer", "optimizer", "dropout", "batch",
    "normalization", "recurrent", "memory", "transformer", "pretraining", "language", "vision",
    "speech", "graph", "kernel", "variational", "diffusion", "sampling", "contrastive", "retrieval",
    "benchmark", "scaling", "sparse", "quantization", "distillation", "alignment",
];

/// `n` chunks of random vocabulary sentences, reproducible from `seed`.
pub fn synthetic_corpus(n: usize, seed: u64) -> Vec<Chunk> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let len = rng.gen_range(12..40);
            let words: Vec<&str> = (0..len)
                .filter_map(|_| VOCABULARY.choose(&mut rng).copied())
                .collect();
            let mut chunk = Chunk::new(ChunkId(i as u64 + 1), words.join(" "));
            chunk.paper_title = format!("Synthetic Paper {}", i / 10);
            chunk.year = Some(2000 + (i % 25) as i32);
            chunk
        })
        .collect()
}

/// `n` random vectors with components in [-1, 1).
pub fn random_vectors(n: usize, dimension: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dimension).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

/// A ranked list of `len` distinct ids drawn from `1..=universe`.
pub fn ranked_list(len: usize, universe: u64, seed: u64) -> Vec<ScoredResult> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ids: Vec<u64> = (1..=universe).collect();
    ids.shuffle(&mut rng);
    ids.into_iter()
        .take(len)
        .enumerate()
        .map(|(rank, id)| ScoredResult {
            chunk_id: ChunkId(id),
            score: rank as f32,
            rank,
        })
        .collect()
}
