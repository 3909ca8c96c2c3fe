use lgs_core::Error;
use nalgebra::DMatrix;

/// Natural log of `2*pi` as an f64 constant.
///
/// We keep this as a literal because `ln()` is not a `const fn` on stable Rust.
pub(super) const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// Average `p` with its transpose in place.
#[inline]
pub(super) fn symmetrize_in_place(p: &mut DMatrix<f64>) {
    let n = p.nrows();
    for j in 0..n {
        for i in (j + 1)..n {
            let v = 0.5 * (p[(i, j)] + p[(j, i)]);
            p[(i, j)] = v;
            p[(j, i)] = v;
        }
    }
}

/// Prefix a factorization failure with the matrix it happened on.
pub(super) fn degenerate(what: &'static str) -> impl FnOnce(Error) -> Error {
    move |e| match e {
        Error::NumericalDegeneracy(msg) => Error::NumericalDegeneracy(format!("{what}: {msg}")),
        other => other,
    }
}
