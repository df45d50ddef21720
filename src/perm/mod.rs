//! Permutation matrices.
//!
//! A permutation `P` of size `n` is stored as its forward array and its inverse, with
//! `(P * A)[i, :] = A[forward[i], :]`. The forward array is also called the image of `P`: it is the
//! vector `P * [0, 1, ..., n - 1]`.
//!
//! Factorizations record their row exchanges as *pivots*: `pivots[i] = r` means that row `i` was
//! exchanged with row `r >= i` at step `i`, with indices relative to the first row of the range
//! the pivots were computed on. A pivot sequence is turned into a [`Perm`] with
//! [`pivots_to_permutation`], or into a compact [`PartialPerm`] holding only the moved rows with
//! [`pivots_to_partial_permutation`].

use crate::{assert, Entity, MatMut, MatRef};
use reborrow::*;

/// Permutation of `0..n`, stored with its inverse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Perm {
    forward: Vec<usize>,
    inverse: Vec<usize>,
}

impl Perm {
    /// Returns the identity permutation of size `n`.
    pub fn identity(n: usize) -> Self {
        Self {
            forward: (0..n).collect(),
            inverse: (0..n).collect(),
        }
    }

    /// Creates a permutation from its forward array.
    ///
    /// # Panics
    /// Panics if `forward` is not a permutation of `0..forward.len()`.
    #[track_caller]
    pub fn from_forward(forward: Vec<usize>) -> Self {
        let n = forward.len();
        let mut inverse = vec![usize::MAX; n];
        for (i, &f) in forward.iter().enumerate() {
            assert!(f < n);
            assert!(inverse[f] == usize::MAX);
            inverse[f] = i;
        }
        Self { forward, inverse }
    }

    /// Creates a permutation from its forward and inverse arrays, without checking that they are
    /// inverse of each other.
    ///
    /// # Safety
    /// `forward` and `inverse` must be permutations of the same size that are inverse of each
    /// other.
    #[inline]
    pub unsafe fn new_unchecked(forward: Vec<usize>, inverse: Vec<usize>) -> Self {
        Self { forward, inverse }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Returns the forward and inverse arrays.
    #[inline]
    pub fn arrays(&self) -> (&[usize], &[usize]) {
        (&self.forward, &self.inverse)
    }

    /// Returns the forward array, which is the image of the permutation.
    #[inline]
    pub fn forward(&self) -> &[usize] {
        &self.forward
    }

    /// Returns the inverse permutation.
    #[inline]
    pub fn inverse(&self) -> Self {
        Self {
            forward: self.inverse.clone(),
            inverse: self.forward.clone(),
        }
    }

    #[inline]
    pub fn into_arrays(self) -> (Vec<usize>, Vec<usize>) {
        (self.forward, self.inverse)
    }

    /// Returns `true` if the permutation is a product of an odd number of transpositions.
    pub fn is_odd(&self) -> bool {
        let n = self.len();
        let mut visited = vec![false; n];
        let mut cycles = 0;
        for start in 0..n {
            if visited[start] {
                continue;
            }
            cycles += 1;
            let mut i = start;
            while !visited[i] {
                visited[i] = true;
                i = self.forward[i];
            }
        }
        (n - cycles) % 2 == 1
    }

    /// Returns `self * rhs`, the permutation that applies `rhs` first.
    ///
    /// # Panics
    /// Panics if the sizes differ.
    #[track_caller]
    pub fn compose(&self, rhs: &Perm) -> Perm {
        assert!(self.len() == rhs.len());
        // (self * rhs * A)[i] = (rhs * A)[self.forward[i]] = A[rhs.forward[self.forward[i]]]
        let forward: Vec<usize> = self.forward.iter().map(|&i| rhs.forward[i]).collect();
        let mut inverse = vec![0; forward.len()];
        for (i, &f) in forward.iter().enumerate() {
            inverse[f] = i;
        }
        Perm { forward, inverse }
    }
}

/// Permutation that only moves a few indices, stored as the list of `(destination, source)`
/// pairs of the moved indices, together with the pairs of its inverse.
///
/// Applying it to a matrix `A` sets `A[dst, :] = A_old[src, :]` for every pair.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartialPerm {
    forward: Vec<(usize, usize)>,
    inverse: Vec<(usize, usize)>,
    extent: usize,
}

impl PartialPerm {
    /// Moved `(destination, source)` pairs.
    #[inline]
    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.forward
    }

    /// One past the largest index touched by the permutation.
    #[inline]
    pub fn extent(&self) -> usize {
        self.extent
    }

    /// Returns `true` if no index is moved.
    #[inline]
    pub fn is_identity(&self) -> bool {
        self.forward.is_empty()
    }

    #[inline]
    pub fn inverse(&self) -> Self {
        Self {
            forward: self.inverse.clone(),
            inverse: self.forward.clone(),
            extent: self.extent,
        }
    }
}

impl From<&Perm> for PartialPerm {
    fn from(perm: &Perm) -> Self {
        let moved = |arr: &[usize]| {
            arr.iter()
                .enumerate()
                .filter(|&(i, &s)| i != s)
                .map(|(i, &s)| (i, s))
                .collect::<Vec<_>>()
        };
        Self {
            forward: moved(&perm.forward),
            inverse: moved(&perm.inverse),
            extent: perm.len(),
        }
    }
}

/// Image of the row exchanges in `pivots`, over `0..n`.
fn pivots_image(pivots: &[usize], n: usize) -> Vec<usize> {
    let mut image: Vec<usize> = (0..n).collect();
    for (i, &p) in pivots.iter().enumerate() {
        image.swap(i, p);
    }
    image
}

/// Returns the permutation of size `n` equivalent to applying the row exchanges in `pivots` in
/// order.
///
/// # Panics
/// Panics if a pivot is smaller than its position or not smaller than `n`.
#[track_caller]
pub fn pivots_to_permutation(pivots: &[usize], n: usize) -> Perm {
    assert!(pivots.len() <= n);
    for (i, &p) in pivots.iter().enumerate() {
        assert!(all(p >= i, p < n));
    }
    let forward = pivots_image(pivots, n);
    let mut inverse = vec![0; n];
    for (i, &f) in forward.iter().enumerate() {
        inverse[f] = i;
    }
    Perm { forward, inverse }
}

/// Returns the partial permutation equivalent to applying the row exchanges in `pivots` in
/// order.
///
/// # Panics
/// Panics if a pivot is smaller than its position.
#[track_caller]
pub fn pivots_to_partial_permutation(pivots: &[usize]) -> PartialPerm {
    let mut extent = pivots.len();
    for (i, &p) in pivots.iter().enumerate() {
        assert!(p >= i);
        extent = Ord::max(extent, p + 1);
    }
    let image = pivots_image(pivots, extent);

    let mut forward = Vec::new();
    let mut inverse = Vec::new();
    for (dst, &src) in image.iter().enumerate() {
        if dst != src {
            forward.push((dst, src));
            inverse.push((src, dst));
        }
    }
    inverse.sort_unstable();
    PartialPerm {
        forward,
        inverse,
        extent,
    }
}

/// Applies `perm` to the rows of `mat`, whose row `0` is index `0` of the permutation.
///
/// # Panics
/// Panics if `mat` has fewer rows than the extent of the permutation.
#[track_caller]
pub fn permute_rows<E: Entity>(mat: MatMut<'_, E>, perm: &PartialPerm) {
    assert!(perm.extent() <= mat.nrows());
    let mut mat = mat;
    let n = mat.ncols();
    let moved: Vec<Vec<E>> = perm
        .pairs()
        .iter()
        .map(|&(_, src)| (0..n).map(|j| mat.read(src, j)).collect())
        .collect();
    for (&(dst, _), row) in perm.pairs().iter().zip(moved) {
        for (j, value) in row.into_iter().enumerate() {
            mat.write(dst, j, value);
        }
    }
}

/// Computes `dst = perm * src`.
///
/// # Panics
/// Panics if the shapes differ or the size of the permutation is not the number of rows.
#[track_caller]
pub fn permute_rows_into<E: Entity>(dst: MatMut<'_, E>, src: MatRef<'_, E>, perm: &Perm) {
    let mut dst = dst;
    assert!(all(
        dst.nrows() == src.nrows(),
        dst.ncols() == src.ncols(),
        perm.len() == src.nrows(),
    ));
    let forward = perm.forward();
    for j in 0..src.ncols() {
        for (i, &f) in forward.iter().enumerate() {
            dst.write(i, j, src.read(f, j));
        }
    }
}

/// Computes `dst = src * perm^T`, so that `dst[:, j] = src[:, perm.forward()[j]]`.
#[track_caller]
pub fn permute_cols_into<E: Entity>(dst: MatMut<'_, E>, src: MatRef<'_, E>, perm: &Perm) {
    permute_rows_into(dst.transpose_mut(), src.transpose(), perm)
}

/// Applies `perm` to the rows of `mat` in place.
#[track_caller]
pub fn permute_rows_in_place<E: Entity>(mat: MatMut<'_, E>, perm: &Perm) {
    let mut mat = mat;
    assert!(perm.len() == mat.nrows());
    let src = mat.rb().to_owned();
    permute_rows_into(mat.rb_mut(), src.as_ref(), perm);
}
