//! Overflow- and underflow-safe Euclidean norm.

use ndarray::ArrayView1;

/// Components at or below this magnitude are accumulated relative to the
/// largest small component so their squares never underflow.
const RDWARF: f64 = 1.4916681462400413e-154; // sqrt(f64::MIN_POSITIVE)

/// Components above `RGIANT / n` are accumulated relative to the largest
/// component so their squares never overflow.
const RGIANT: f64 = 1.3407807929942596e154; // sqrt(f64::MAX)

/// Euclidean norm of `x`.
///
/// Components are split into three classes by magnitude. Large and small
/// components are summed as squares scaled by the running maximum of their
/// class, intermediate components are summed directly. The three partial sums
/// are then combined with the large class taking precedence.
pub fn enorm(x: ArrayView1<'_, f64>) -> f64 {
    let n = x.len();
    if n == 0 {
        return 0.0;
    }

    let mut s1 = 0.0;
    let mut s2 = 0.0;
    let mut s3 = 0.0;
    let mut x1max = 0.0;
    let mut x3max = 0.0;
    let agiant = RGIANT / n as f64;

    for &value in x.iter() {
        let xabs = value.abs();
        if xabs > RDWARF && xabs < agiant {
            // intermediate
            s2 += xabs * xabs;
        } else if xabs > RDWARF {
            // large
            if xabs > x1max {
                let r = x1max / xabs;
                s1 = 1.0 + s1 * r * r;
                x1max = xabs;
            } else {
                let r = xabs / x1max;
                s1 += r * r;
            }
        } else if xabs > x3max {
            // small
            let r = x3max / xabs;
            s3 = 1.0 + s3 * r * r;
            x3max = xabs;
        } else if xabs != 0.0 {
            let r = xabs / x3max;
            s3 += r * r;
        }
    }

    if s1 != 0.0 {
        x1max * (s1 + (s2 / x1max) / x1max).sqrt()
    } else if s2 != 0.0 {
        if s2 >= x3max {
            (s2 * (1.0 + (x3max / s2) * (x3max * s3))).sqrt()
        } else {
            (x3max * ((s2 / x3max) + (x3max * s3))).sqrt()
        }
    } else {
        x3max * s3.sqrt()
    }
}
