use ndarray::{Array2, ArrayView2, ArrayViewMut2};

/// Numerically stable row-wise softmax, in place.
pub fn softmax_rows(mut x: ArrayViewMut2<f32>) {
    for mut row in x.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

/// Numerically stable row-wise log-softmax, `z - max - ln(sum(exp(z - max)))`.
pub fn log_softmax_rows(x: ArrayView2<f32>) -> Array2<f32> {
    let mut out = x.to_owned();

    for mut row in out.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        let lse = max + row.iter().map(|&v| (v - max).exp()).sum::<f32>().ln();
        row.mapv_inplace(|v| v - lse);
    }

    out
}
