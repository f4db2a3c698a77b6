use std::collections::BTreeMap;

use ndarray::{ArrayViewD, Axis};

use super::PoolData;
use crate::error::{ConfigurationError, QueryError, QueryResult};

/// A borrowed chunk of model input.
///
/// Keyed batches hold one view per input name, all covering the same rows.
#[derive(Debug, Clone)]
pub enum Batch<'a> {
    Dense(ArrayViewD<'a, f32>),
    Keyed(BTreeMap<&'a str, ArrayViewD<'a, f32>>),
}

impl<'a> Batch<'a> {
    /// Number of rows in the chunk.
    pub fn n_rows(&self) -> usize {
        match self {
            Batch::Dense(view) => view.len_of(Axis(0)),
            Batch::Keyed(map) => map
                .values()
                .next()
                .map(|view| view.len_of(Axis(0)))
                .unwrap_or(0),
        }
    }

    /// Look up a named input of a keyed batch.
    pub fn input(&self, key: &str) -> Option<&ArrayViewD<'a, f32>> {
        match self {
            Batch::Dense(_) => None,
            Batch::Keyed(map) => map.get(key),
        }
    }
}

pub(super) fn split(data: &PoolData, batch_size: usize) -> QueryResult<Vec<Batch<'_>>> {
    if batch_size == 0 {
        return Err(ConfigurationError::ZeroBatchSize.into());
    }
    match data {
        PoolData::Dense(array) => {
            if array.ndim() == 0 {
                return Err(QueryError::UnsupportedType {
                    operation: "batch splitting",
                    found: "scalar",
                });
            }
            Ok(array
                .axis_chunks_iter(Axis(0), batch_size)
                .map(Batch::Dense)
                .collect())
        }
        PoolData::Keyed(map) => {
            // Row counts must agree before chunk boundaries can line up.
            let n_rows = data.n_rows()?;
            let n_chunks = n_rows.div_ceil(batch_size);
            let mut chunks: Vec<BTreeMap<&str, ArrayViewD<'_, f32>>> =
                (0..n_chunks).map(|_| BTreeMap::new()).collect();
            for (key, value) in map {
                let PoolData::Dense(array) = value else {
                    return Err(QueryError::UnsupportedType {
                        operation: "batch splitting",
                        found: value.kind(),
                    });
                };
                if array.ndim() == 0 {
                    return Err(QueryError::UnsupportedType {
                        operation: "batch splitting",
                        found: "scalar",
                    });
                }
                for (chunk, view) in chunks
                    .iter_mut()
                    .zip(array.axis_chunks_iter(Axis(0), batch_size))
                {
                    chunk.insert(key.as_str(), view);
                }
            }
            Ok(chunks.into_iter().map(Batch::Keyed).collect())
        }
        other => Err(QueryError::UnsupportedType {
            operation: "batch splitting",
            found: other.kind(),
        }),
    }
}
