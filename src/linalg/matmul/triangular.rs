//! Triangular matrix multiplication.

use crate::{assert, ComplexField, Conj, Mat, MatMut, MatRef, Parallelism};

/// Describes the parts of the matrix that must be accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStructure {
    /// The full matrix is accessed.
    Rectangular,
    /// The lower triangular half (including the diagonal) is accessed.
    TriangularLower,
    /// The lower triangular half (excluding the diagonal) is accessed.
    StrictTriangularLower,
    /// The lower triangular half (excluding the diagonal, which is assumed to be equal to
    /// `1.0`) is accessed.
    UnitTriangularLower,
    /// The upper triangular half (including the diagonal) is accessed.
    TriangularUpper,
    /// The upper triangular half (excluding the diagonal) is accessed.
    StrictTriangularUpper,
    /// The upper triangular half (excluding the diagonal, which is assumed to be equal to
    /// `1.0`) is accessed.
    UnitTriangularUpper,
}

impl BlockStructure {
    #[inline]
    pub fn is_dense(self) -> bool {
        matches!(self, BlockStructure::Rectangular)
    }

    #[inline]
    pub fn is_lower(self) -> bool {
        use BlockStructure::*;
        matches!(
            self,
            TriangularLower | StrictTriangularLower | UnitTriangularLower
        )
    }

    #[inline]
    pub fn is_upper(self) -> bool {
        use BlockStructure::*;
        matches!(
            self,
            TriangularUpper | StrictTriangularUpper | UnitTriangularUpper
        )
    }

    /// Returns the block structure corresponding to the transposed matrix.
    #[inline]
    pub fn transpose(self) -> Self {
        use BlockStructure::*;
        match self {
            Rectangular => Rectangular,
            TriangularLower => TriangularUpper,
            StrictTriangularLower => StrictTriangularUpper,
            UnitTriangularLower => UnitTriangularUpper,
            TriangularUpper => TriangularLower,
            StrictTriangularUpper => StrictTriangularLower,
            UnitTriangularUpper => UnitTriangularLower,
        }
    }

    /// Whether the element `(i, j)` is part of the structure, and if so, whether it is an
    /// implicit one.
    #[inline]
    fn classify(self, i: usize, j: usize) -> Option<bool> {
        use BlockStructure::*;
        let accessed = match self {
            Rectangular => true,
            TriangularLower => i >= j,
            StrictTriangularLower | UnitTriangularLower => i > j,
            TriangularUpper => i <= j,
            StrictTriangularUpper | UnitTriangularUpper => i < j,
        };
        if accessed {
            Some(false)
        } else if i == j && matches!(self, UnitTriangularLower | UnitTriangularUpper) {
            Some(true)
        } else {
            None
        }
    }
}

fn densify<E: ComplexField>(src: MatRef<'_, E>, structure: BlockStructure) -> Mat<E> {
    Mat::from_fn(src.nrows(), src.ncols(), |i, j| {
        match structure.classify(i, j) {
            Some(false) => src.read(i, j),
            Some(true) => E::one(),
            None => E::zero(),
        }
    })
}

#[track_caller]
fn precondition(
    dst: (usize, usize),
    dst_structure: BlockStructure,
    lhs: (usize, usize),
    lhs_structure: BlockStructure,
    rhs: (usize, usize),
    rhs_structure: BlockStructure,
) {
    assert!(all(dst.0 == lhs.0, dst.1 == rhs.1, lhs.1 == rhs.0));
    if !dst_structure.is_dense() {
        assert!(dst.0 == dst.1);
    }
    if !lhs_structure.is_dense() {
        assert!(lhs.0 == lhs.1);
    }
    if !rhs_structure.is_dense() {
        assert!(rhs.0 == rhs.1);
    }
}

/// Computes the matrix product `[alpha * acc] + beta * op(lhs) * op(rhs)` and stores the result
/// in `acc`, where `op` optionally conjugates its argument.
///
/// The left hand side and right hand side are interpreted as triangular depending on the given
/// corresponding matrix structure. For the destination matrix, only the part described by
/// `dst_structure` is written; the diagonal is not written if it is strict or unit triangular.
///
/// # Panics
/// Panics if the matrix dimensions are not compatible for matrix multiplication, or if a matrix
/// marked as triangular is not square.
#[track_caller]
pub fn matmul_with_conj<E: ComplexField>(
    acc: MatMut<'_, E>,
    dst_structure: BlockStructure,
    lhs: MatRef<'_, E>,
    lhs_structure: BlockStructure,
    conj_lhs: Conj,
    rhs: MatRef<'_, E>,
    rhs_structure: BlockStructure,
    conj_rhs: Conj,
    alpha: Option<E>,
    beta: E,
    parallelism: Parallelism,
) {
    precondition(
        acc.shape(),
        dst_structure,
        lhs.shape(),
        lhs_structure,
        rhs.shape(),
        rhs_structure,
    );
    let mut acc = acc;

    let lhs_dense;
    let lhs = if lhs_structure.is_dense() {
        lhs
    } else {
        lhs_dense = densify(lhs, lhs_structure);
        lhs_dense.as_ref()
    };
    let rhs_dense;
    let rhs = if rhs_structure.is_dense() {
        rhs
    } else {
        rhs_dense = densify(rhs, rhs_structure);
        rhs_dense.as_ref()
    };

    if dst_structure.is_dense() {
        super::matmul_with_conj(acc, lhs, conj_lhs, rhs, conj_rhs, alpha, beta, parallelism);
        return;
    }

    let (m, n) = acc.shape();
    let mut prod = Mat::<E>::zeros(m, n);
    super::matmul_with_conj(
        prod.as_mut(),
        lhs,
        conj_lhs,
        rhs,
        conj_rhs,
        None,
        beta,
        parallelism,
    );
    for j in 0..n {
        for i in 0..m {
            if dst_structure.classify(i, j) != Some(false) {
                continue;
            }
            let old = match alpha {
                Some(alpha) => alpha * acc.read(i, j),
                None => E::zero(),
            };
            acc.write(i, j, old + prod.read(i, j));
        }
    }
}

/// Computes the matrix product `[alpha * acc] + beta * lhs * rhs` with structured operands.
///
/// See [`matmul_with_conj`].
#[track_caller]
#[inline]
pub fn matmul<E: ComplexField>(
    acc: MatMut<'_, E>,
    dst_structure: BlockStructure,
    lhs: MatRef<'_, E>,
    lhs_structure: BlockStructure,
    rhs: MatRef<'_, E>,
    rhs_structure: BlockStructure,
    alpha: Option<E>,
    beta: E,
    parallelism: Parallelism,
) {
    matmul_with_conj(
        acc,
        dst_structure,
        lhs,
        lhs_structure,
        Conj::No,
        rhs,
        rhs_structure,
        Conj::No,
        alpha,
        beta,
        parallelism,
    )
}
