use criterion::{criterion_group, criterion_main, Criterion};
use dyn_stack::{GlobalPodBuffer, PodStack};
use rand::random;

use plaid::{
    dist::McMr,
    linalg::{
        condense::{bidiag, hessenberg},
        funcs::sign,
        lu::{full_pivoting, partial_pivoting},
    },
    BlockParams, DistMatrix, Grid, Mat, Parallelism, UpLo,
};

fn diagonally_dominant(n: usize) -> Mat<f64> {
    Mat::from_fn(n, n, |i, j| {
        if i == j {
            n as f64 + random::<f64>()
        } else {
            random::<f64>()
        }
    })
}

pub fn lu(c: &mut Criterion) {
    for n in [64, 128, 256, 512] {
        let mat = Mat::from_fn(n, n, |_, _| random::<f64>());

        c.bench_function(&format!("plaid-st-plu-{n}"), |b| {
            let mut pivots = vec![0; n];
            b.iter(|| {
                let mut lu = mat.clone();
                partial_pivoting::lu_in_place(lu.as_mut(), &mut pivots, Parallelism::None);
            })
        });
        c.bench_function(&format!("plaid-st-flu-{n}"), |b| {
            let mut row_pivots = vec![0; n];
            let mut col_pivots = vec![0; n];
            b.iter(|| {
                let mut lu = mat.clone();
                full_pivoting::compute::lu_in_place(
                    lu.as_mut(),
                    &mut row_pivots,
                    &mut col_pivots,
                    Parallelism::None,
                );
            })
        });

        for (r, c_) in [(1, 1), (2, 2)] {
            c.bench_function(&format!("plaid-dist-{r}x{c_}-plu-{n}"), |b| {
                b.iter(|| {
                    Grid::run(r, c_, |grid| {
                        let mut a = DistMatrix::<f64, McMr>::from_replicated(grid, mat.as_ref());
                        partial_pivoting::dist_lu_in_place(a.as_mut(), BlockParams::default())
                            .unwrap();
                    })
                })
            });
        }
    }
}

pub fn condense(c: &mut Criterion) {
    for n in [64, 128, 256] {
        let mat = Mat::from_fn(n, n, |_, _| random::<f64>());
        let params = BlockParams::default();

        c.bench_function(&format!("plaid-st-hessenberg-{n}"), |b| {
            let mut t = vec![0.0; n - 1];
            b.iter(|| {
                let mut a = mat.clone();
                hessenberg::reduce_in_place(UpLo::Upper, a.as_mut(), &mut t, params);
            })
        });
        c.bench_function(&format!("plaid-st-bidiag-{n}"), |b| {
            let mut tq = vec![0.0; n];
            let mut tp = vec![0.0; n - 1];
            b.iter(|| {
                let mut a = mat.clone();
                bidiag::reduce_in_place(a.as_mut(), &mut tq, &mut tp, params);
            })
        });
        c.bench_function(&format!("plaid-dist-2x2-hessenberg-{n}"), |b| {
            b.iter(|| {
                Grid::run(2, 2, |grid| {
                    let mut a = DistMatrix::<f64, McMr>::from_replicated(grid, mat.as_ref());
                    hessenberg::dist_reduce_in_place(UpLo::Upper, a.as_mut(), params).unwrap();
                })
            })
        });
    }
}

pub fn funcs(c: &mut Criterion) {
    for n in [32, 64, 128] {
        let mat = diagonally_dominant(n);
        let params = BlockParams::default();

        c.bench_function(&format!("plaid-st-sign-{n}"), |b| {
            b.iter(|| {
                let mut a = mat.clone();
                sign::sign(a.as_mut(), Default::default());
            })
        });
        c.bench_function(&format!("plaid-st-hermitian-sign-{n}"), |b| {
            let mut mem =
                GlobalPodBuffer::new(sign::hermitian_sign_req::<f64>(n, params).unwrap());
            b.iter(|| {
                let mut a = mat.clone();
                sign::hermitian_sign(
                    UpLo::Lower,
                    a.as_mut(),
                    params,
                    Default::default(),
                    PodStack::new(&mut mem),
                );
            })
        });
    }
}

criterion_group!(benches, lu, condense, funcs);
criterion_main!(benches);
