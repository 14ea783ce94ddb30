//! Fixed-order Gauss–Legendre quadrature.
//!
//! Nodes and weights are computed once by Newton iteration on the Legendre
//! polynomial `P_n`, starting from the Tricomi approximation of its roots. An
//! `n`-point rule integrates polynomials up to degree `2n - 1` exactly, which is
//! far more than needed for the smooth `1/E(z)` integrand over the short
//! intervals between neighbouring supernovae.

use crate::error::{LikelihoodError, Result};

/// Largest supported rule
pub const MAX_ORDER: usize = 128;

/// Default number of nodes per integration interval
pub const DEFAULT_ORDER: usize = 16;

const NEWTON_TOL: f64 = 1e-15;
const NEWTON_MAX_ITER: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct GaussLegendre {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl GaussLegendre {
    pub fn new(order: usize) -> Result<Self> {
        if order == 0 || order > MAX_ORDER {
            return Err(LikelihoodError::InvalidSettings(format!(
                "quadrature order must be between 1 and {}, got {}",
                MAX_ORDER, order
            )));
        }

        let n = order;
        let mut nodes = vec![0.0; n];
        let mut weights = vec![0.0; n];

        for i in 0..n.div_ceil(2) {
            let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
            let mut dp = 0.0;

            for _ in 0..NEWTON_MAX_ITER {
                let (p, d) = legendre(n, x);
                dp = d;
                let step = p / d;
                x -= step;
                if step.abs() <= NEWTON_TOL {
                    break;
                }
            }

            let w = 2.0 / ((1.0 - x * x) * dp * dp);
            nodes[i] = -x;
            nodes[n - 1 - i] = x;
            weights[i] = w;
            weights[n - 1 - i] = w;
        }

        Ok(GaussLegendre { nodes, weights })
    }

    pub fn order(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes and weights mapped from `[-1, 1]` onto `[a, b]`
    pub fn mapped(&self, a: f64, b: f64) -> impl Iterator<Item = (f64, f64)> + '_ {
        let half = 0.5 * (b - a);
        let mid = 0.5 * (b + a);
        self.nodes
            .iter()
            .zip(self.weights.iter())
            .map(move |(t, w)| (mid + half * t, half * w))
    }

    /// Integrate `f` over `[a, b]`
    pub fn integrate<F: Fn(f64) -> f64>(&self, a: f64, b: f64, f: F) -> f64 {
        self.mapped(a, b).map(|(x, w)| w * f(x)).sum()
    }
}

/// Evaluate `P_n(x)` and its derivative with the three-term recurrence
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut p_prev = 1.0;
    let mut p = x;
    if n == 0 {
        return (1.0, 0.0);
    }
    for j in 2..=n {
        let j = j as f64;
        let p_next = ((2.0 * j - 1.0) * x * p - (j - 1.0) * p_prev) / j;
        p_prev = p;
        p = p_next;
    }
    let dp = n as f64 * (x * p - p_prev) / (x * x - 1.0);
    (p, dp)
}
