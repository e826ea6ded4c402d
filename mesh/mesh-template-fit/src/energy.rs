//! Fitting energy and its analytic gradient.
//!
//! The objective over the per-vertex affine arena `p` is
//!
//! ```text
//! f(p) = w_data  · Σ_i valid_i · ‖A_i v_i + t_i − c_i‖²
//!      + w_reg   · Σ_(i,j) ‖p_i − p_j‖²
//!      + w_rigid · Σ_i [ (a1·a2)² + (a1·a3)² + (a2·a3)²
//!                      + (1 − ‖a1‖²)² + (1 − ‖a2‖²)² + (1 − ‖a3‖²)² ]
//! ```
//!
//! where `v_i` are the undeformed template vertices, `c_i` the current
//! correspondences, `(i, j)` ranges over template edges and `a1, a2, a3` are
//! the columns of `A_i`.
//!
//! Evaluation is split per vertex. Vertex `i` writes only its own twelve
//! gradient entries: the regularization gradient is gathered from the
//! neighbor table instead of scattered along edges. Per-vertex energies are
//! summed in index order, so results do not depend on thread scheduling.

use crate::affine::{PARAMS_PER_VERTEX, transform_point};
use crate::solver::Objective;
use crate::{Correspondences, EdgeSet};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Weights at or below this are treated as zero and their term is skipped.
pub const NEGLIGIBLE_WEIGHT: f64 = 1e-6;

/// Weights of the three energy terms for one outer iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnergyWeights {
    /// Data term weight.
    pub data: f64,
    /// Regularization term weight.
    pub regularization: f64,
    /// Rigidity term weight.
    pub rigidity: f64,
}

impl EnergyWeights {
    /// Creates a weight triple.
    #[must_use]
    pub const fn new(data: f64, regularization: f64, rigidity: f64) -> Self {
        Self {
            data,
            regularization,
            rigidity,
        }
    }
}

/// Per-term energy values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnergyBreakdown {
    /// Weighted data energy.
    pub data: f64,
    /// Weighted regularization energy.
    pub regularization: f64,
    /// Weighted rigidity energy.
    pub rigidity: f64,
}

impl EnergyBreakdown {
    /// Sum of the three terms.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.data + self.regularization + self.rigidity
    }
}

impl std::ops::Add for EnergyBreakdown {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            data: self.data + rhs.data,
            regularization: self.regularization + rhs.regularization,
            rigidity: self.rigidity + rhs.rigidity,
        }
    }
}

/// Energy for one outer iteration: fixed template, correspondences, edges and weights.
///
/// # Example
///
/// ```
/// use mesh_template_fit::{
///     AffineParams, Correspondences, EdgeSet, EnergyFunction, EnergyWeights,
/// };
/// use nalgebra::Point3;
///
/// let template = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let edges = EdgeSet::from_faces(3, &[[0, 1, 2]]);
/// let correspondences = Correspondences::identity(&template);
/// let energy = EnergyFunction::new(
///     &template,
///     &correspondences,
///     &edges,
///     EnergyWeights::new(1.0, 1000.0, 1000.0),
/// );
///
/// let breakdown = energy.breakdown(AffineParams::identity(3).as_slice());
/// assert_eq!(breakdown.total(), 0.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EnergyFunction<'a> {
    template: &'a [Point3<f64>],
    correspondences: &'a Correspondences,
    edges: &'a EdgeSet,
    weights: EnergyWeights,
}

impl<'a> EnergyFunction<'a> {
    /// Creates the energy for the given template vertices and correspondences.
    ///
    /// `correspondences` and `edges` should cover the same vertices as
    /// `template`; vertices missing from either contribute nothing to that term.
    #[must_use]
    pub const fn new(
        template: &'a [Point3<f64>],
        correspondences: &'a Correspondences,
        edges: &'a EdgeSet,
        weights: EnergyWeights,
    ) -> Self {
        Self {
            template,
            correspondences,
            edges,
            weights,
        }
    }

    /// Weights in effect.
    #[must_use]
    pub const fn weights(&self) -> EnergyWeights {
        self.weights
    }

    /// Evaluates each weighted term separately.
    #[must_use]
    pub fn breakdown(&self, x: &[f64]) -> EnergyBreakdown {
        let mut scratch = vec![0.0; x.len()];
        self.evaluate_terms(x, &mut scratch)
    }

    /// Evaluates every term and writes the gradient into `grad`.
    fn evaluate_terms(&self, x: &[f64], grad: &mut [f64]) -> EnergyBreakdown {
        debug_assert_eq!(x.len(), self.template.len() * PARAMS_PER_VERTEX);
        debug_assert_eq!(grad.len(), x.len());

        let use_data = self.weights.data > NEGLIGIBLE_WEIGHT;
        let use_reg = self.weights.regularization > NEGLIGIBLE_WEIGHT;
        let use_rigid = self.weights.rigidity > NEGLIGIBLE_WEIGHT;

        let per_vertex: Vec<EnergyBreakdown> = grad
            .par_chunks_exact_mut(PARAMS_PER_VERTEX)
            .enumerate()
            .map(|(i, g)| {
                g.fill(0.0);
                let p = &x[i * PARAMS_PER_VERTEX..(i + 1) * PARAMS_PER_VERTEX];
                let mut e = EnergyBreakdown::default();
                if use_data {
                    e.data = self.data_term(i, p, g);
                }
                if use_reg {
                    e.regularization = self.regularization_term(i, p, x, g);
                }
                if use_rigid {
                    e.rigidity = rigidity_term(self.weights.rigidity, p, g);
                }
                e
            })
            .collect();

        per_vertex
            .into_iter()
            .fold(EnergyBreakdown::default(), |acc, e| acc + e)
    }

    fn data_term(&self, i: usize, p: &[f64], g: &mut [f64]) -> f64 {
        let w = self.weights.data;
        let valid = self.correspondences.valid.get(i).copied().unwrap_or(false);
        let (Some(v), Some(c)) = (self.template.get(i), self.correspondences.targets.get(i))
        else {
            return 0.0;
        };
        if !valid {
            return 0.0;
        }

        let r = transform_point(p, v) - c;
        let s = 2.0 * w;
        for (col, coord) in [v.x, v.y, v.z].into_iter().enumerate() {
            g[3 * col] += s * r.x * coord;
            g[3 * col + 1] += s * r.y * coord;
            g[3 * col + 2] += s * r.z * coord;
        }
        g[9] += s * r.x;
        g[10] += s * r.y;
        g[11] += s * r.z;

        w * r.norm_squared()
    }

    /// Gathers the gradient over all incident edges and returns the energy of
    /// the edges to higher-indexed neighbors, so each edge is counted once.
    fn regularization_term(&self, i: usize, p: &[f64], x: &[f64], g: &mut [f64]) -> f64 {
        let w = self.weights.regularization;
        let mut energy = 0.0;
        for &j in self.edges.neighbors(i) {
            let j = j as usize;
            let Some(q) = x.get(j * PARAMS_PER_VERTEX..(j + 1) * PARAMS_PER_VERTEX) else {
                continue;
            };
            let mut edge_sq = 0.0;
            for k in 0..PARAMS_PER_VERTEX {
                let diff = p[k] - q[k];
                g[k] += 2.0 * w * diff;
                edge_sq += diff * diff;
            }
            if j > i {
                energy += w * edge_sq;
            }
        }
        energy
    }
}

/// Rigidity energy of one linear block, adding its gradient into `g`.
fn rigidity_term(w: f64, p: &[f64], g: &mut [f64]) -> f64 {
    let a1 = Vector3::new(p[0], p[1], p[2]);
    let a2 = Vector3::new(p[3], p[4], p[5]);
    let a3 = Vector3::new(p[6], p[7], p[8]);

    let d12 = a1.dot(&a2);
    let d13 = a1.dot(&a3);
    let d23 = a2.dot(&a3);
    let n1 = 1.0 - a1.norm_squared();
    let n2 = 1.0 - a2.norm_squared();
    let n3 = 1.0 - a3.norm_squared();

    let g1 = (a2 * (2.0 * d12) + a3 * (2.0 * d13) - a1 * (4.0 * n1)) * w;
    let g2 = (a1 * (2.0 * d12) + a3 * (2.0 * d23) - a2 * (4.0 * n2)) * w;
    let g3 = (a1 * (2.0 * d13) + a2 * (2.0 * d23) - a3 * (4.0 * n3)) * w;
    for k in 0..3 {
        g[k] += g1[k];
        g[3 + k] += g2[k];
        g[6 + k] += g3[k];
    }

    w * (d12 * d12 + d13 * d13 + d23 * d23 + n1 * n1 + n2 * n2 + n3 * n3)
}

impl Objective for EnergyFunction<'_> {
    fn dimension(&self) -> usize {
        self.template.len() * PARAMS_PER_VERTEX
    }

    fn evaluate(&self, x: &[f64], grad: &mut [f64]) -> f64 {
        self.evaluate_terms(x, grad).total()
    }
}
