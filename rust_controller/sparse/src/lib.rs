extern crate itertools;
extern crate nalgebra;

use itertools::Itertools;
use nalgebra::DMatrix;
use std::mem;

#[allow(non_camel_case_types)]
type float = f64;

/// Collects `(row, col, value)` triplets and compresses them into a `CscMatrix`.
#[derive(Clone, Debug)]
pub struct Builder {
    coords: Vec<(usize, usize, float)>,
    nrows: usize,
    ncols: usize,
}

impl Builder {
    pub fn with_capacity(nrows: usize, ncols: usize, nnz: usize) -> Builder {
        Builder {
            coords: Vec::with_capacity(nnz),
            nrows,
            ncols,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn nnz(&self) -> usize {
        self.coords.len()
    }

    /// Adds `val` at `(r, c)`. Entries pushed to the same cell are summed.
    pub fn push(&mut self, r: usize, c: usize, val: float) {
        assert!(
            r < self.nrows && c < self.ncols,
            "({}, {}) outside {}x{} matrix",
            r,
            c,
            self.nrows,
            self.ncols
        );
        self.coords.push((r, c, val));
    }

    /// Drops every entry below the diagonal, as required for the quadratic cost of a QP.
    pub fn upper_triangular(mut self) -> Builder {
        self.coords.retain(|&(r, c, _)| r <= c);
        self
    }

    pub fn build_csc(&mut self) -> CscMatrix {
        // Sort and sum any duplicates in the same cell
        let mut coords = mem::replace(&mut self.coords, Vec::new());
        coords.sort_unstable_by_key(|&(r, c, _)| (c, r));
        self.coords = coords
            .into_iter()
            .coalesce(|l, r| {
                if l.0 == r.0 && l.1 == r.1 {
                    Ok((l.0, l.1, l.2 + r.2))
                } else {
                    Err((l, r))
                }
            })
            .collect();

        let mut indptr = vec![0; self.ncols + 1];
        let mut indices = vec![0; self.coords.len()];
        let mut data = vec![0.0; self.coords.len()];

        // Fill in CSC column start and end pointer and row index
        let mut last_c = 0;
        for (i, &(r, c, val)) in self.coords.iter().enumerate() {
            while last_c < c {
                last_c += 1;
                indptr[last_c] = i;
            }
            indices[i] = r;
            data[i] = val;
        }
        // Set the remaining column index pointers to one past the end of the data array
        while last_c < self.ncols {
            last_c += 1;
            indptr[last_c] = self.coords.len();
        }

        CscMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            indptr,
            indices,
            data,
        }
    }
}

pub fn eye(n: usize) -> Builder {
    let mut builder = Builder::with_capacity(n, n, n);
    for i in 0..n {
        builder.coords.push((i, i, 1.0));
    }
    builder
}

pub fn vstack(blocks: &[Builder]) -> Builder {
    let ncols = blocks.get(0).map(|b| b.ncols).unwrap_or(0);
    let nnz = blocks.iter().map(Builder::nnz).sum();
    let nrows = blocks.iter().map(|b| b.nrows).sum();

    let mut stacked = Builder::with_capacity(nrows, ncols, nnz);
    let mut row_shift = 0;
    for block in blocks {
        assert_eq!(
            ncols, block.ncols,
            "vstack requires matrices to have the same number of columns"
        );
        stacked
            .coords
            .extend(block.coords.iter().map(|&(r, c, v)| (r + row_shift, c, v)));
        row_shift += block.nrows;
    }
    stacked
}

#[derive(Clone, Debug)]
pub struct CscMatrix {
    nrows: usize,
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<float>,
}

impl CscMatrix {
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn data(&self) -> &[float] {
        &self.data
    }

    pub fn to_dense(&self) -> DMatrix<float> {
        let mut mat = DMatrix::zeros(self.nrows, self.ncols);

        for c in 0..self.ncols {
            for i in self.indptr[c]..self.indptr[c + 1] {
                let r = self.indices[i];
                mat[(r, c)] = self.data[i];
            }
        }

        mat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, Matrix3};

    fn block(block: &DMatrix<float>) -> Builder {
        let (nrows, ncols) = block.shape();

        let coords = (0..nrows)
            .flat_map(move |r| (0..ncols).map(move |c| (r, c, block[(r, c)])))
            .filter(|&(_, _, val)| val != 0.0)
            .collect();

        Builder {
            coords,
            nrows,
            ncols,
        }
    }

    fn dense(m: Matrix3<float>) -> DMatrix<float> {
        DMatrix::from_iterator(3, 3, m.iter().cloned())
    }

    #[test]
    fn empty_ops_should_not_panic() {
        vstack(&[]);
        let csc = Builder::with_capacity(3, 2, 0).build_csc();
        assert_eq!(csc.indptr(), &[0, 0, 0]);
        assert!(csc.data().is_empty());
    }

    #[test]
    fn duplicates_are_summed() {
        let mut builder = Builder::with_capacity(3, 3, 4);
        builder.push(2, 0, 1.0);
        builder.push(0, 2, 9.0);
        builder.push(2, 0, 0.5);
        builder.push(1, 1, 4.0);

        #[cfg_attr(rustfmt, rustfmt_skip)]
        let expected = dense(Matrix3::new(
            0.0, 0.0, 9.0,
            0.0, 4.0, 0.0,
            1.5, 0.0, 0.0,
        ));

        let csc = builder.build_csc();
        assert_eq!(csc.data().len(), 3);
        assert_eq!(csc.indptr(), &[0, 1, 2, 3]);
        assert_eq!(expected, csc.to_dense());
    }

    #[test]
    fn upper_triangular_drops_lower_entries() {
        #[cfg_attr(rustfmt, rustfmt_skip)]
        let a = dense(Matrix3::new(
            4.0, 1.0, 0.0,
            1.0, 2.0, 3.0,
            0.0, 3.0, 5.0,
        ));

        #[cfg_attr(rustfmt, rustfmt_skip)]
        let expected = dense(Matrix3::new(
            4.0, 1.0, 0.0,
            0.0, 2.0, 3.0,
            0.0, 0.0, 5.0,
        ));

        assert_eq!(expected, block(&a).upper_triangular().build_csc().to_dense());
    }

    #[test]
    fn vstack_with_identity() {
        let mut top = Builder::with_capacity(1, 3, 2);
        top.push(0, 0, 2.0);
        top.push(0, 2, -1.0);

        let stacked = vstack(&[top, eye(3)]).build_csc();
        assert_eq!(stacked.shape(), (4, 3));

        let d = stacked.to_dense();
        assert_eq!(d[(0, 0)], 2.0);
        assert_eq!(d[(0, 2)], -1.0);
        assert_eq!(d[(1, 0)], 1.0);
        assert_eq!(d[(3, 2)], 1.0);
        assert_eq!(d[(2, 0)], 0.0);
    }

    #[test]
    #[should_panic]
    fn push_outside_matrix_panics() {
        let mut builder = Builder::with_capacity(2, 2, 1);
        builder.push(2, 0, 1.0);
    }
}
