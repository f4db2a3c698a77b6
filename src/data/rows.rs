use std::collections::BTreeSet;

use ndarray::Axis;
use sprs::{CsMat, TriMat};

use super::PoolData;
use crate::error::{ConfigurationError, QueryResult};

pub(super) fn retrieve_rows(data: &PoolData, indices: &[usize]) -> QueryResult<PoolData> {
    let n_rows = data.n_rows()?;
    check_indices(indices, n_rows)?;
    Ok(select_rows(data, indices))
}

pub(super) fn drop_rows(data: &PoolData, indices: &[usize]) -> QueryResult<PoolData> {
    let n_rows = data.n_rows()?;
    check_indices(indices, n_rows)?;
    let dropped: BTreeSet<usize> = indices.iter().copied().collect();
    let keep: Vec<usize> = (0..n_rows).filter(|idx| !dropped.contains(idx)).collect();
    Ok(select_rows(data, &keep))
}

fn check_indices(indices: &[usize], n_rows: usize) -> QueryResult<()> {
    if let Some(&bad) = indices.iter().find(|&&idx| idx >= n_rows) {
        return Err(ConfigurationError::Invalid(format!(
            "row index {bad} is out of range for a pool of {n_rows} rows"
        ))
        .into());
    }
    Ok(())
}

fn select_rows(data: &PoolData, indices: &[usize]) -> PoolData {
    match data {
        PoolData::Dense(array) => PoolData::Dense(array.select(Axis(0), indices)),
        PoolData::Sparse(matrix) => PoolData::Sparse(select_sparse_rows(matrix, indices)),
        PoolData::Rows(rows) => PoolData::Rows(indices.iter().map(|&idx| rows[idx].clone()).collect()),
        PoolData::Keyed(map) => PoolData::Keyed(
            map.iter()
                .map(|(key, value)| (key.clone(), select_rows(value, indices)))
                .collect(),
        ),
    }
}

fn select_sparse_rows(matrix: &CsMat<f32>, indices: &[usize]) -> CsMat<f32> {
    let csr = if matrix.is_csr() {
        matrix.clone()
    } else {
        matrix.to_csr()
    };
    let mut tri = TriMat::new((indices.len(), csr.cols()));
    for (out_row, &src_row) in indices.iter().enumerate() {
        if let Some(row) = csr.outer_view(src_row) {
            for (col, &value) in row.iter() {
                tri.add_triplet(out_row, col, value);
            }
        }
    }
    let selected: CsMat<f32> = tri.to_csr();
    if matrix.is_csr() {
        selected
    } else {
        selected.to_csc()
    }
}
