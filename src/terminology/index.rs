use crate::error::{ParrotError, Result};

/// Nearest-neighbour search over float vectors
pub trait VectorIndex: Send + Sync {
    /// Append vectors; ids are assigned in insertion order starting at `len()`
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()>;

    /// Top `k` `(score, id)` pairs, best first
    fn search(&self, query: &[f32], k: usize) -> Vec<(f32, usize)>;

    /// Drop every vector
    fn reset(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exhaustive inner-product index. With unit vectors the score is cosine similarity.
#[derive(Debug, Default)]
pub struct FlatIpIndex {
    dimension: Option<usize>,
    vectors: Vec<Vec<f32>>,
}

impl FlatIpIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for FlatIpIndex {
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for vector in vectors {
            let dimension = *self.dimension.get_or_insert(vector.len());
            if vector.len() != dimension {
                return Err(ParrotError::Terminology(format!(
                    "Vector dimension {} does not match index dimension {}",
                    vector.len(),
                    dimension
                )));
            }
            self.vectors.push(vector.clone());
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(f32, usize)> {
        if Some(query.len()) != self.dimension {
            return Vec::new();
        }

        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(id, vector)| (vector.iter().zip(query).map(|(a, b)| a * b).sum::<f32>(), id))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);
        scored
    }

    fn reset(&mut self) {
        self.dimension = None;
        self.vectors.clear();
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }
}
