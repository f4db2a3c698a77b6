//! Pool data containers.
//!
//! [`PoolData`] is the closed set of input layouts the query pipeline accepts:
//! dense n-dimensional arrays (rows on axis 0), sparse matrices, plain row lists
//! and named groups of any of those for multi-input models. Row-oriented helpers
//! live in submodules and operate on every variant where it makes sense.

mod batch;
mod rows;
mod stack;

pub use batch::Batch;
pub use stack::{add_row, hstack, vstack};

use std::collections::BTreeMap;

use ndarray::{ArrayD, Axis};
use sprs::CsMat;

use crate::error::{ConfigurationError, QueryError, QueryResult};

/// A pool of samples, one per row.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolData {
    /// Dense array with samples along axis 0.
    Dense(ArrayD<f32>),
    /// Sparse 2-D matrix, CSR or CSC.
    Sparse(CsMat<f32>),
    /// List of equally sized feature rows.
    Rows(Vec<Vec<f32>>),
    /// Named sub-inputs whose rows stay aligned.
    Keyed(BTreeMap<String, PoolData>),
}

impl PoolData {
    /// Build a keyed pool from `(name, data)` pairs.
    pub fn keyed<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, PoolData)>,
    {
        PoolData::Keyed(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            PoolData::Dense(_) => "dense",
            PoolData::Sparse(_) => "sparse",
            PoolData::Rows(_) => "rows",
            PoolData::Keyed(_) => "keyed",
        }
    }

    /// Number of samples in the pool.
    ///
    /// Keyed pools must agree on the row count across all keys.
    pub fn n_rows(&self) -> QueryResult<usize> {
        match self {
            PoolData::Dense(array) => Ok(array.len_of(Axis(0))),
            PoolData::Sparse(matrix) => Ok(matrix.rows()),
            PoolData::Rows(rows) => Ok(rows.len()),
            PoolData::Keyed(map) => {
                let mut expected: Option<usize> = None;
                for (key, value) in map {
                    let found = value.n_rows()?;
                    match expected {
                        None => expected = Some(found),
                        Some(expected) if expected != found => {
                            return Err(ConfigurationError::MismatchedRowCounts {
                                key: key.clone(),
                                expected,
                                found,
                            }
                            .into());
                        }
                        Some(_) => {}
                    }
                }
                Ok(expected.unwrap_or(0))
            }
        }
    }

    /// Full shape of the pool.
    pub fn shape(&self) -> QueryResult<Vec<usize>> {
        match self {
            PoolData::Dense(array) => Ok(array.shape().to_vec()),
            PoolData::Sparse(matrix) => Ok(vec![matrix.rows(), matrix.cols()]),
            PoolData::Rows(rows) => {
                let width = rows.first().map(Vec::len).unwrap_or(0);
                Ok(vec![rows.len(), width])
            }
            PoolData::Keyed(_) => Err(QueryError::UnsupportedType {
                operation: "shape",
                found: self.kind(),
            }),
        }
    }

    /// Enumerate the samples as flat dense rows.
    pub fn rows(&self) -> QueryResult<Vec<Vec<f32>>> {
        match self {
            PoolData::Dense(array) => {
                if array.ndim() == 0 {
                    return Err(QueryError::UnsupportedType {
                        operation: "rows",
                        found: "scalar",
                    });
                }
                Ok(array
                    .outer_iter()
                    .map(|row| row.iter().copied().collect())
                    .collect())
            }
            PoolData::Sparse(matrix) => {
                let mut out = vec![vec![0.0f32; matrix.cols()]; matrix.rows()];
                for (value, (row, col)) in matrix.iter() {
                    out[row][col] = *value;
                }
                Ok(out)
            }
            PoolData::Rows(rows) => Ok(rows.clone()),
            PoolData::Keyed(_) => Err(QueryError::UnsupportedType {
                operation: "rows",
                found: self.kind(),
            }),
        }
    }

    /// Return a new pool holding the rows at `indices`, in that order.
    pub fn retrieve_rows(&self, indices: &[usize]) -> QueryResult<PoolData> {
        rows::retrieve_rows(self, indices)
    }

    /// Return a new pool without the rows at `indices`.
    pub fn drop_rows(&self, indices: &[usize]) -> QueryResult<PoolData> {
        rows::drop_rows(self, indices)
    }

    /// Split the pool into row-aligned chunks of at most `batch_size` rows.
    ///
    /// Only dense arrays and keyed groups of dense arrays can be fed to a model.
    pub fn batches(&self, batch_size: usize) -> QueryResult<Vec<Batch<'_>>> {
        batch::split(self, batch_size)
    }
}

impl From<ArrayD<f32>> for PoolData {
    fn from(array: ArrayD<f32>) -> Self {
        PoolData::Dense(array)
    }
}

impl From<ndarray::Array2<f32>> for PoolData {
    fn from(array: ndarray::Array2<f32>) -> Self {
        PoolData::Dense(array.into_dyn())
    }
}

impl From<CsMat<f32>> for PoolData {
    fn from(matrix: CsMat<f32>) -> Self {
        PoolData::Sparse(matrix)
    }
}

impl From<Vec<Vec<f32>>> for PoolData {
    fn from(rows: Vec<Vec<f32>>) -> Self {
        PoolData::Rows(rows)
    }
}
