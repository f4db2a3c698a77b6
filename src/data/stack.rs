use std::collections::BTreeMap;

use ndarray::{ArrayD, ArrayViewD, Axis};
use sprs::{CsMat, TriMat};

use super::PoolData;
use crate::error::{ConfigurationError, QueryError, QueryResult};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Vertical,
    Horizontal,
}

/// Stack blocks on top of each other (row-wise concatenation).
///
/// Any sparse block turns the result sparse; otherwise all blocks must share a variant.
pub fn vstack(blocks: &[PoolData]) -> QueryResult<PoolData> {
    stack(blocks, Direction::Vertical)
}

/// Stack blocks side by side (column-wise concatenation).
pub fn hstack(blocks: &[PoolData]) -> QueryResult<PoolData> {
    stack(blocks, Direction::Horizontal)
}

/// Append a single row (or block of rows) below `data`.
pub fn add_row(data: &PoolData, row: PoolData) -> QueryResult<PoolData> {
    let row = match (data, row) {
        (PoolData::Dense(array), PoolData::Dense(single)) if single.ndim() + 1 == array.ndim() => {
            PoolData::Dense(single.insert_axis(Axis(0)))
        }
        (_, row) => row,
    };
    vstack(&[data.clone(), row])
}

fn stack(blocks: &[PoolData], direction: Direction) -> QueryResult<PoolData> {
    let Some(first) = blocks.first() else {
        return Err(ConfigurationError::Invalid("nothing to stack".to_string()).into());
    };
    if blocks.iter().any(|block| matches!(block, PoolData::Sparse(_))) {
        return stack_sparse(blocks, direction).map(PoolData::Sparse);
    }
    let operation = match direction {
        Direction::Vertical => "vstack",
        Direction::Horizontal => "hstack",
    };
    match first {
        PoolData::Dense(_) => {
            let mut views: Vec<ArrayViewD<'_, f32>> = Vec::with_capacity(blocks.len());
            for block in blocks {
                match block {
                    PoolData::Dense(array) => views.push(array.view()),
                    other => return Err(mixed(operation, other)),
                }
            }
            let axis = match direction {
                Direction::Vertical => Axis(0),
                Direction::Horizontal if first_ndim(&views) <= 1 => Axis(0),
                Direction::Horizontal => Axis(1),
            };
            let stacked: ArrayD<f32> = ndarray::concatenate(axis, &views)?;
            Ok(PoolData::Dense(stacked))
        }
        PoolData::Rows(_) => {
            let mut parts = Vec::with_capacity(blocks.len());
            for block in blocks {
                match block {
                    PoolData::Rows(rows) => parts.push(rows),
                    other => return Err(mixed(operation, other)),
                }
            }
            match direction {
                Direction::Vertical => Ok(PoolData::Rows(
                    parts.into_iter().flat_map(|rows| rows.iter().cloned()).collect(),
                )),
                Direction::Horizontal => hstack_rows(&parts).map(PoolData::Rows),
            }
        }
        PoolData::Keyed(_) => {
            let mut grouped: BTreeMap<String, Vec<PoolData>> = BTreeMap::new();
            for block in blocks {
                let PoolData::Keyed(map) = block else {
                    return Err(mixed(operation, block));
                };
                for (key, value) in map {
                    grouped.entry(key.clone()).or_default().push(value.clone());
                }
            }
            let mut out = BTreeMap::new();
            for (key, values) in grouped {
                if values.len() != blocks.len() {
                    return Err(ConfigurationError::Invalid(format!(
                        "input `{key}` is missing from some blocks"
                    ))
                    .into());
                }
                out.insert(key, stack(&values, direction)?);
            }
            Ok(PoolData::Keyed(out))
        }
        PoolData::Sparse(_) => Err(mixed(operation, first)),
    }
}

fn first_ndim(views: &[ArrayViewD<'_, f32>]) -> usize {
    views.first().map(|view| view.ndim()).unwrap_or(0)
}

fn mixed(operation: &'static str, found: &PoolData) -> QueryError {
    QueryError::UnsupportedType {
        operation,
        found: found.kind(),
    }
}

fn hstack_rows(parts: &[&Vec<Vec<f32>>]) -> QueryResult<Vec<Vec<f32>>> {
    let n_rows = parts.first().map(|rows| rows.len()).unwrap_or(0);
    if let Some(bad) = parts.iter().find(|rows| rows.len() != n_rows) {
        return Err(ConfigurationError::Invalid(format!(
            "cannot hstack blocks with {} and {} rows",
            n_rows,
            bad.len()
        ))
        .into());
    }
    Ok((0..n_rows)
        .map(|row| {
            parts
                .iter()
                .flat_map(|rows| rows[row].iter().copied())
                .collect()
        })
        .collect())
}

/// Dense 2-D view of a block as `(rows, cols, triplets)`.
fn triplets(block: &PoolData) -> QueryResult<(usize, usize, Vec<(usize, usize, f32)>)> {
    match block {
        PoolData::Sparse(matrix) => Ok((
            matrix.rows(),
            matrix.cols(),
            matrix
                .iter()
                .map(|(value, (row, col))| (row, col, *value))
                .collect(),
        )),
        PoolData::Dense(array) if array.ndim() == 2 => {
            let shape = array.shape();
            let entries = array
                .indexed_iter()
                .filter(|(_, value)| **value != 0.0)
                .map(|(idx, value)| (idx[0], idx[1], *value))
                .collect();
            Ok((shape[0], shape[1], entries))
        }
        PoolData::Rows(_) => {
            let rows = block.rows()?;
            let width = rows.first().map(Vec::len).unwrap_or(0);
            let mut entries = Vec::new();
            for (r, row) in rows.iter().enumerate() {
                for (c, &value) in row.iter().enumerate() {
                    if value != 0.0 {
                        entries.push((r, c, value));
                    }
                }
            }
            Ok((rows.len(), width, entries))
        }
        other => Err(mixed("sparse stack", other)),
    }
}

fn stack_sparse(blocks: &[PoolData], direction: Direction) -> QueryResult<CsMat<f32>> {
    let mut parts = Vec::with_capacity(blocks.len());
    for block in blocks {
        parts.push(triplets(block)?);
    }
    let (rows, cols) = match direction {
        Direction::Vertical => {
            let cols = parts[0].1;
            if let Some(bad) = parts.iter().find(|part| part.1 != cols) {
                return Err(ConfigurationError::Invalid(format!(
                    "cannot vstack blocks with {cols} and {} columns",
                    bad.1
                ))
                .into());
            }
            (parts.iter().map(|part| part.0).sum(), cols)
        }
        Direction::Horizontal => {
            let rows = parts[0].0;
            if let Some(bad) = parts.iter().find(|part| part.0 != rows) {
                return Err(ConfigurationError::Invalid(format!(
                    "cannot hstack blocks with {rows} and {} rows",
                    bad.0
                ))
                .into());
            }
            (rows, parts.iter().map(|part| part.1).sum())
        }
    };
    let mut tri = TriMat::new((rows, cols));
    let mut offset = 0usize;
    for (part_rows, part_cols, entries) in parts {
        for (row, col, value) in entries {
            match direction {
                Direction::Vertical => tri.add_triplet(row + offset, col, value),
                Direction::Horizontal => tri.add_triplet(row, col + offset, value),
            }
        }
        offset += match direction {
            Direction::Vertical => part_rows,
            Direction::Horizontal => part_cols,
        };
    }
    Ok(tri.to_csr())
}
