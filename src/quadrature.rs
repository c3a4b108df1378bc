//! Quadrature rules on reference cells.
//!
//! Rules are tabulated in `f64` and cast to the working precision at the
//! point of use. Points are point-major on the reference cell, the unit
//! interval `[0, 1]` or the unit triangle with vertices `(0,0)`, `(1,0)`,
//! `(0,1)`.

use crate::types::{BridgeError, BridgeResult};

/// Definition of a quadrature rule.
pub struct QuadratureRule {
    /// Dimension of the reference cell.
    pub dim: usize,
    /// Maximum polynomial degree integrated exactly.
    pub order: usize,
    /// Number of points.
    pub npoints: usize,
    /// Point coordinates, point-major.
    pub points: Vec<f64>,
    /// Weights, summing to the reference cell volume.
    pub weights: Vec<f64>,
}

/// Gauss-Legendre rule on the unit interval.
pub fn interval_rule(npoints: usize) -> BridgeResult<QuadratureRule> {
    let (points, weights): (Vec<f64>, Vec<f64>) = match npoints {
        1 => (vec![0.5], vec![1.0]),
        2 => (
            vec![0.5 - 0.2886751345948129, 0.5 + 0.2886751345948129],
            vec![0.5, 0.5],
        ),
        3 => (
            vec![0.5 - 0.3872983346207417, 0.5, 0.5 + 0.3872983346207417],
            vec![
                0.2777777777777778,
                0.4444444444444444,
                0.2777777777777778,
            ],
        ),
        4 => (
            vec![
                0.5 - 0.4305681557970262,
                0.5 - 0.1699905217924281,
                0.5 + 0.1699905217924281,
                0.5 + 0.4305681557970262,
            ],
            vec![
                0.1739274225687269,
                0.3260725774312731,
                0.3260725774312731,
                0.1739274225687269,
            ],
        ),
        5 => (
            vec![
                0.5 - 0.4530899229693320,
                0.5 - 0.2692346550528415,
                0.5,
                0.5 + 0.2692346550528415,
                0.5 + 0.4530899229693320,
            ],
            vec![
                0.1184634425280945,
                0.2393143352496832,
                0.2844444444444444,
                0.2393143352496832,
                0.1184634425280945,
            ],
        ),
        _ => {
            return Err(BridgeError::Validation(format!(
                "No interval rule with {npoints} points tabulated"
            )))
        }
    };
    Ok(QuadratureRule {
        dim: 1,
        order: 2 * npoints - 1,
        npoints,
        points,
        weights,
    })
}

/// Symmetric rule on the unit triangle, exact up to the given degree.
pub fn triangle_rule(degree: usize) -> BridgeResult<QuadratureRule> {
    let (order, points, weights): (usize, Vec<f64>, Vec<f64>) = match degree {
        0 | 1 => (
            1,
            vec![1.0 / 3.0, 1.0 / 3.0],
            vec![0.5],
        ),
        2 => (
            2,
            vec![
                1.0 / 6.0,
                1.0 / 6.0,
                2.0 / 3.0,
                1.0 / 6.0,
                1.0 / 6.0,
                2.0 / 3.0,
            ],
            vec![1.0 / 6.0, 1.0 / 6.0, 1.0 / 6.0],
        ),
        3 | 4 => {
            let a = 0.445948490915965;
            let b = 0.091576213509771;
            let wa = 0.111690794839005;
            let wb = 0.054975871827661;
            (
                4,
                vec![
                    a,
                    a,
                    1.0 - 2.0 * a,
                    a,
                    a,
                    1.0 - 2.0 * a,
                    b,
                    b,
                    1.0 - 2.0 * b,
                    b,
                    b,
                    1.0 - 2.0 * b,
                ],
                vec![wa, wa, wa, wb, wb, wb],
            )
        }
        _ => {
            return Err(BridgeError::Validation(format!(
                "No triangle rule of degree {degree} tabulated"
            )))
        }
    };
    let npoints = weights.len();
    Ok(QuadratureRule {
        dim: 2,
        order,
        npoints,
        points,
        weights,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn integrate_interval(rule: &QuadratureRule, f: impl Fn(f64) -> f64) -> f64 {
        rule.points
            .iter()
            .zip(&rule.weights)
            .map(|(x, w)| w * f(*x))
            .sum()
    }

    fn integrate_triangle(rule: &QuadratureRule, f: impl Fn(f64, f64) -> f64) -> f64 {
        (0..rule.npoints)
            .map(|q| rule.weights[q] * f(rule.points[2 * q], rule.points[2 * q + 1]))
            .sum()
    }

    #[test]
    fn test_interval_weights_sum_to_one() {
        for n in 1..=5 {
            let rule = interval_rule(n).unwrap();
            assert_relative_eq!(
                rule.weights.iter().sum::<f64>(),
                1.0,
                epsilon = 1e-14
            );
        }
    }

    #[test]
    fn test_interval_exactness() {
        for n in 1..=5 {
            let rule = interval_rule(n).unwrap();
            let degree = (2 * n - 1) as i32;
            // x^d integrates to 1 / (d + 1)
            assert_relative_eq!(
                integrate_interval(&rule, |x| x.powi(degree)),
                1.0 / (degree as f64 + 1.0),
                epsilon = 1e-13
            );
        }
    }

    #[test]
    fn test_triangle_weights_sum_to_area() {
        for degree in [1, 2, 4] {
            let rule = triangle_rule(degree).unwrap();
            assert_relative_eq!(
                rule.weights.iter().sum::<f64>(),
                0.5,
                epsilon = 1e-14
            );
        }
    }

    #[test]
    fn test_triangle_exactness() {
        // x^2 y^2 over the unit triangle is 1/180
        let rule = triangle_rule(4).unwrap();
        assert_relative_eq!(
            integrate_triangle(&rule, |x, y| x * x * y * y),
            1.0 / 180.0,
            epsilon = 1e-14
        );
        // x y over the unit triangle is 1/24
        let rule = triangle_rule(2).unwrap();
        assert_relative_eq!(
            integrate_triangle(&rule, |x, y| x * y),
            1.0 / 24.0,
            epsilon = 1e-14
        );
    }

    #[test]
    fn test_unknown_rule() {
        assert!(interval_rule(11).is_err());
        assert!(triangle_rule(9).is_err());
    }
}
