use plaid::{
    c64,
    linalg::funcs::sign::{sign, SignCtrl, SignScaling},
    Mat,
};
use std::{
    alloc::{GlobalAlloc, Layout, System},
    cell::Cell,
};

struct CountingAlloc;

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

fn allocations_during(f: impl FnOnce()) -> usize {
    let before = ALLOCATIONS.with(Cell::get);
    f();
    ALLOCATIONS.with(Cell::get) - before
}

#[test]
fn newton_iterations_reuse_their_buffers() {
    let n = 8;
    // far from its sign without scaling, so that no run below converges early
    let a = Mat::from_fn(n, n, |i, j| {
        if i == j {
            let value = 1000.0 * (i + 1) as f64;
            c64::new(if i % 2 == 0 { value } else { -value }, 0.0)
        } else if j == i + 1 {
            c64::new(1.0, 0.5)
        } else {
            c64::new(0.0, 0.0)
        }
    });
    let run = |max_iters: usize| {
        let ctrl = SignCtrl {
            max_iters,
            scaling: SignScaling::None,
            ..Default::default()
        };
        let mut s = a.clone();
        allocations_during(|| {
            assert_eq!(sign(s.as_mut(), ctrl), max_iters);
        })
    };

    run(1);
    let short = run(2);
    let long = run(6);
    assert_eq!(short, long);
}
