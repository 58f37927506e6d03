// rust-cv/hnsw backed in-process index

use super::{validate_dimension, CollectionInfo, IndexHit, VectorIndex};
use crate::error::SearchError;
use async_trait::async_trait;
use ::hnsw::{Hnsw, Searcher};
use space::{Metric, Neighbor};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Minimum ef_search parameter for HNSW queries.
///
/// We use max(k * 2, MIN_EF_SEARCH) to scale with result count while keeping
/// a recall floor.
const MIN_EF_SEARCH: usize = 50;

/// Cosine distance metric for embedding vectors.
/// Computes 1 - cosine_similarity, scaled to u32.
struct CosineDistance;

impl Metric<Box<[f32]>> for CosineDistance {
    type Unit = u32;

    fn distance(&self, a: &Box<[f32]>, b: &Box<[f32]>) -> u32 {
        let a_slice: &[f32] = a;
        let b_slice: &[f32] = b;

        let dot: f32 = a_slice
            .iter()
            .zip(b_slice.iter())
            .map(|(&x, &y)| x * y)
            .sum();
        let mag_a: f32 = a_slice.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b_slice.iter().map(|y| y * y).sum::<f32>().sqrt();

        if mag_a == 0.0 || mag_b == 0.0 {
            return u32::MAX;
        }

        let cosine_sim = dot / (mag_a * mag_b);
        // [0, 2] scaled onto [0, u32::MAX]
        let distance = (1.0 - cosine_sim).clamp(0.0, 2.0);
        (distance * (u32::MAX as f32 / 2.0)) as u32
    }
}

struct Graph {
    /// Type parameters: <Metric, Data, RNG, M, M0>
    index: Hnsw<CosineDistance, Box<[f32]>, rand::rngs::StdRng, 16, 32>,
    /// Mutated during both insert and search
    searcher: Searcher<u32>,
    /// Point id and payload per HNSW position
    points: Vec<(String, HashMap<String, String>)>,
}

/// In-process HNSW index holding vectors and payloads.
///
/// Scores are cosine similarities clamped to [0, 1]. The HNSW graph is seeded
/// deterministically, so identical queries against an unchanged index return
/// identical hits. Searches are serialized behind a mutex because the
/// searcher carries mutable scratch state.
pub struct HnswIndex {
    graph: Mutex<Graph>,
    dimension: usize,
}

impl HnswIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            graph: Mutex::new(Graph {
                index: Hnsw::new(CosineDistance),
                searcher: Searcher::default(),
                points: Vec::new(),
            }),
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Adds one point.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::DimensionMismatch` if the vector length differs
    /// from the index dimension.
    pub fn insert(
        &self,
        id: impl Into<String>,
        vector: Vec<f32>,
        payload: HashMap<String, String>,
    ) -> Result<(), SearchError> {
        validate_dimension(self.dimension, vector.len())?;

        let mut guard = self.lock()?;
        let graph = &mut *guard;
        let id = id.into();
        debug!(id = %id, position = graph.points.len(), "Inserting point");
        graph.points.push((id, payload));
        graph
            .index
            .insert(vector.into_boxed_slice(), &mut graph.searcher);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.graph.lock().map(|g| g.points.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Graph>, SearchError> {
        self.graph
            .lock()
            .map_err(|_| SearchError::IndexError("HNSW index lock poisoned".to_string()))
    }

    fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>, SearchError> {
        validate_dimension(self.dimension, query.len())?;

        let mut guard = self.lock()?;
        let graph = &mut *guard;

        if graph.points.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let actual_k = std::cmp::min(k, graph.points.len());
        let mut neighbors = vec![
            Neighbor {
                index: !0,
                distance: !0
            };
            actual_k
        ];
        let ef_search = std::cmp::max(k * 2, MIN_EF_SEARCH);
        let query_box = query.to_vec().into_boxed_slice();

        graph
            .index
            .nearest(&query_box, ef_search, &mut graph.searcher, &mut neighbors);

        let hits = neighbors
            .into_iter()
            .filter(|n| n.index != !0)
            .map(|neighbor| {
                let distance = (neighbor.distance as f32) / (u32::MAX as f32 / 2.0);
                let similarity = (1.0 - distance).clamp(0.0, 1.0);
                let (id, payload) = &graph.points[neighbor.index];
                IndexHit {
                    id: id.clone(),
                    score: Some(similarity),
                    payload: payload.clone(),
                }
            })
            .collect();
        Ok(hits)
    }
}

#[async_trait]
impl VectorIndex for HnswIndex {
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>, SearchError> {
        self.nearest(vector, top_k)
    }

    async fn collection_info(&self) -> Result<CollectionInfo, SearchError> {
        let graph = self.lock()?;
        Ok(CollectionInfo {
            point_count: graph.points.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(problem: &str) -> HashMap<String, String> {
        HashMap::from([("problem".to_string(), problem.to_string())])
    }

    fn sample_index() -> HnswIndex {
        let index = HnswIndex::new(3);
        index.insert("a", vec![1.0, 0.0, 0.0], payload("x axis")).unwrap();
        index.insert("b", vec![0.0, 1.0, 0.0], payload("y axis")).unwrap();
        index.insert("c", vec![0.9, 0.1, 0.0], payload("mostly x")).unwrap();
        index
    }

    #[tokio::test]
    async fn test_search_orders_best_first() {
        let index = sample_index();
        let hits = index.search(&[1.0, 0.0, 0.0], 3).await.unwrap();

        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!((hits[0].score.unwrap() - 1.0).abs() < 1e-4);
        assert!(hits[2].score.unwrap() < 1e-4);
        assert_eq!(hits[1].payload["problem"], "mostly x");
    }

    #[tokio::test]
    async fn test_search_limits_to_top_k() {
        let index = sample_index();
        let hits = index.search(&[0.0, 1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[tokio::test]
    async fn test_search_empty_index() {
        let index = HnswIndex::new(3);
        assert!(index.is_empty());
        let hits = index.search(&[1.0, 0.0, 0.0], 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let index = sample_index();
        let result = index.search(&[1.0, 0.0], 3).await;
        assert!(matches!(
            result,
            Err(SearchError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(index.insert("d", vec![1.0], HashMap::new()).is_err());
    }

    #[tokio::test]
    async fn test_collection_info_counts_points() {
        let index = sample_index();
        assert_eq!(index.collection_info().await.unwrap().point_count, 3);
    }

    #[tokio::test]
    async fn test_repeated_search_is_identical() {
        let index = sample_index();
        let first = index.search(&[0.5, 0.5, 0.0], 3).await.unwrap();
        let second = index.search(&[0.5, 0.5, 0.0], 3).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_cosine_distance_zero_vector() {
        let a: Box<[f32]> = vec![0.0, 0.0].into_boxed_slice();
        let b: Box<[f32]> = vec![1.0, 0.0].into_boxed_slice();
        assert_eq!(CosineDistance.distance(&a, &b), u32::MAX);
    }
}
