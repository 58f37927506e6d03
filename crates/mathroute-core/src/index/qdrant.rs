//! Qdrant collection client.

use super::{CollectionInfo, IndexHit, VectorIndex};
use crate::config::INDEX_TIMEOUT;
use crate::error::SearchError;
use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{PointId, Query, QueryPointsBuilder, ScoredPoint, Value};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Nearest-neighbour search over a remote Qdrant collection.
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantIndex {
    /// Builds a client for `collection`. No request is made until the first
    /// call; use [`VectorIndex::collection_info`] to check reachability.
    pub fn connect(url: &str, api_key: &str, collection: &str) -> Result<Self, SearchError> {
        let client = Qdrant::from_url(url)
            .api_key(api_key.to_string())
            .timeout(INDEX_TIMEOUT)
            .build()
            .map_err(|e| SearchError::Unavailable(format!("Failed to build Qdrant client: {}", e)))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    #[instrument(skip_all, fields(collection = %self.collection, top_k = top_k))]
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>, SearchError> {
        let request = QueryPointsBuilder::new(self.collection.clone())
            .query(Query::new_nearest(vector.to_vec()))
            .limit(top_k as u64)
            .with_payload(true);

        let response = self
            .client
            .query(request)
            .await
            .map_err(|e| SearchError::IndexError(e.to_string()))?;

        debug!("Qdrant returned {} points", response.result.len());
        Ok(response.result.into_iter().map(scored_point_to_hit).collect())
    }

    async fn collection_info(&self) -> Result<CollectionInfo, SearchError> {
        let response = self
            .client
            .collection_info(self.collection.clone())
            .await
            .map_err(|e| SearchError::Unavailable(e.to_string()))?;

        let point_count = response
            .result
            .and_then(|info| info.points_count)
            .unwrap_or(0);
        Ok(CollectionInfo { point_count })
    }
}

fn scored_point_to_hit(point: ScoredPoint) -> IndexHit {
    IndexHit {
        id: point.id.map(point_id_to_string).unwrap_or_default(),
        score: Some(point.score),
        payload: point
            .payload
            .into_iter()
            .map(|(key, value)| (key, value_to_string(value)))
            .collect::<HashMap<_, _>>(),
    }
}

fn point_id_to_string(id: PointId) -> String {
    match id.point_id_options {
        Some(PointIdOptions::Num(n)) => n.to_string(),
        Some(PointIdOptions::Uuid(u)) => u,
        None => String::new(),
    }
}

/// Flattens a payload value to display text. Nested values become empty.
fn value_to_string(value: Value) -> String {
    match value.kind {
        Some(Kind::StringValue(s)) => s,
        Some(Kind::IntegerValue(i)) => i.to_string(),
        Some(Kind::DoubleValue(d)) => d.to_string(),
        Some(Kind::BoolValue(b)) => b.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(kind: Kind) -> Value {
        Value { kind: Some(kind) }
    }

    #[test]
    fn test_value_flattening() {
        assert_eq!(value_to_string(value(Kind::StringValue("Level 3".into()))), "Level 3");
        assert_eq!(value_to_string(value(Kind::IntegerValue(42))), "42");
        assert_eq!(value_to_string(value(Kind::BoolValue(true))), "true");
        assert_eq!(value_to_string(Value { kind: None }), "");
    }

    #[test]
    fn test_point_id_formats() {
        let num = PointId {
            point_id_options: Some(PointIdOptions::Num(7)),
        };
        let uuid = PointId {
            point_id_options: Some(PointIdOptions::Uuid("5c56c793".into())),
        };
        assert_eq!(point_id_to_string(num), "7");
        assert_eq!(point_id_to_string(uuid), "5c56c793");
    }
}
