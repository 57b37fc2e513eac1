use crate::error::ProviderError;
use async_trait::async_trait;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Turns text into a fixed-length vector. `dimensions` must match the index mapping.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Dimensionality of the hosted embedding models we know about.
pub fn known_embedding_dimensions(model: &str) -> Option<usize> {
    match model {
        "text-embedding-ada-001" => Some(1024),
        "text-embedding-ada-002" => Some(1536),
        "text-embedding-curie-001" => Some(12288),
        "text-embedding-babbage-001" => Some(2048),
        "text-embedding-3-small" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// Deterministic hashed character-trigram embedder for offline use.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(token: &str) -> u64 {
    token
        .bytes()
        .fold(FNV_OFFSET_BASIS, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
}

fn euclidean_norm(values: &[f32]) -> f64 {
    values
        .iter()
        .map(|value| f64::from(*value).powi(2))
        .sum::<f64>()
        .sqrt()
}

impl CharacterNgramEmbedder {
    fn buckets(&self) -> usize {
        self.dimensions.max(1)
    }

    /// Unit-length bag of lowercase character trigrams, hashed into `dimensions` buckets.
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let buckets = self.buckets();
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        let mut vector = vec![0f32; buckets];
        for trigram in chars.windows(3) {
            let token: String = trigram.iter().collect();
            vector[(fnv1a(&token) % buckets as u64) as usize] += 1.0;
        }

        let length = euclidean_norm(&vector);
        if length > 0.0 {
            for value in &mut vector {
                *value = (f64::from(*value) / length) as f32;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.buckets()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.vectorize(text))
    }
}

/// Cosine similarity in [-1, 1]; zero vectors and length mismatches score 0.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let denominator = euclidean_norm(left) * euclidean_norm(right);
    if denominator == 0.0 {
        return 0.0;
    }

    let dot: f64 = left
        .iter()
        .zip(right)
        .map(|(a, b)| f64::from(*a) * f64::from(*b))
        .sum();
    dot / denominator
}
