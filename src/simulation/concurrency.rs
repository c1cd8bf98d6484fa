pub use internal::*;

#[cfg(not(feature = "parallel"))]
mod internal {

    pub fn par_iter_reduce1<
        T1: Send + Sync,
        F: Fn(usize, &T1) -> X + Send + Sync,
        X: Send,
        C: Fn(X, X) -> X + Send + Sync,
        I: Fn() -> X + Send + Sync,
    >(
        arr1: &[T1],
        identity: I,
        combine: C,
        f: F,
    ) -> X {
        arr1.iter()
            .enumerate()
            .map(|(i, a)| f(i, a))
            .fold(identity(), |acc, value| combine(acc, value))
    }

    pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
        arr1.iter_mut().enumerate().for_each(|(idx, v1)| {
            f(idx, v1);
        });
    }

    pub fn par_iter_mut2<T1: Send + Sync, T2: Send + Sync, F: Fn(usize, &mut T1, &mut T2) + Send + Sync>(
        arr1: &mut [T1],
        arr2: &mut [T2],
        f: F,
    ) {
        arr1.iter_mut()
            .zip(arr2.iter_mut())
            .enumerate()
            .for_each(|(idx, (v1, v2))| {
                f(idx, v1, v2);
            });
    }

    pub fn par_iter_mut3<
        T1: Send + Sync,
        T2: Send + Sync,
        T3: Send + Sync,
        F: Fn(usize, &mut T1, &mut T2, &mut T3) + Send + Sync,
    >(
        arr1: &mut [T1],
        arr2: &mut [T2],
        arr3: &mut [T3],
        f: F,
    ) {
        arr1.iter_mut()
            .zip(arr2.iter_mut())
            .zip(arr3.iter_mut())
            .enumerate()
            .for_each(|(idx, ((v1, v2), v3))| {
                f(idx, v1, v2, v3);
            });
    }
}

#[cfg(feature = "parallel")]
mod internal {
    use rayon::prelude::*;

    /// Map every element to a value and fold all values with `combine`.
    /// `combine` has to be associative and commutative since rayon splits the
    /// range in an unspecified way.
    pub fn par_iter_reduce1<
        T1: Send + Sync,
        F: Fn(usize, &T1) -> X + Send + Sync,
        X: Send,
        C: Fn(X, X) -> X + Send + Sync,
        I: Fn() -> X + Send + Sync,
    >(
        arr1: &[T1],
        identity: I,
        combine: C,
        f: F,
    ) -> X {
        arr1.par_iter()
            .enumerate()
            .map(|(i, a)| f(i, a))
            .reduce(identity, combine)
    }

    pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
        arr1.into_par_iter().enumerate().for_each(|(idx, v1)| {
            f(idx, v1);
        });
    }

    pub fn par_iter_mut2<T1: Send + Sync, T2: Send + Sync, F: Fn(usize, &mut T1, &mut T2) + Send + Sync>(
        arr1: &mut [T1],
        arr2: &mut [T2],
        f: F,
    ) {
        arr1.into_par_iter()
            .zip(arr2.into_par_iter())
            .enumerate()
            .for_each(|(idx, (v1, v2))| {
                f(idx, v1, v2);
            });
    }

    pub fn par_iter_mut3<
        T1: Send + Sync,
        T2: Send + Sync,
        T3: Send + Sync,
        F: Fn(usize, &mut T1, &mut T2, &mut T3) + Send + Sync,
    >(
        arr1: &mut [T1],
        arr2: &mut [T2],
        arr3: &mut [T3],
        f: F,
    ) {
        arr1.into_par_iter()
            .zip(arr2.into_par_iter())
            .zip(arr3.into_par_iter())
            .enumerate()
            .for_each(|(idx, ((v1, v2), v3))| {
                f(idx, v1, v2, v3);
            });
    }
}

#[test]
fn reduce_max_is_order_insensitive() {
    let values: Vec<f64> = (0..1000).map(|i| ((i * 7919) % 1000) as f64 * 0.5).collect();
    let max = par_iter_reduce1(&values, || 0., f64::max, |_, v| *v);
    assert_eq!(max, 499.5);

    let empty: Vec<f64> = Vec::new();
    let seeded = par_iter_reduce1(&empty, || 3., f64::max, |_, v| *v);
    assert_eq!(seeded, 3.);
}

#[test]
fn par_iter_mut_writes_every_slot_once() {
    let mut a = vec![0usize; 257];
    let mut b = vec![0usize; 257];
    par_iter_mut2(&mut a, &mut b, |i, pa, pb| {
        *pa += i;
        *pb += 2 * i;
    });
    for i in 0..257 {
        assert_eq!(a[i], i);
        assert_eq!(b[i], 2 * i);
    }
}
