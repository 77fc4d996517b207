use glam::{Quat, Vec2, Vec3, Vec4};

use crate::constraints::apply_orientation_delta;
use crate::math::EPSILON;
use crate::particle::ParticleStore;

/// One batch of rod bend/twist constraints over adjacent element frames.
///
/// The Darboux vector `q1^-1 * q2` is compared against a rest Darboux
/// vector, picking whichever of +-rest is closer; the Lagrange multiplier is
/// a Vec3 over the (bend1, bend2, torsion) axes. Plasticity folds excess
/// curvature into the rest Darboux vector in place.
pub struct BendTwistBatch {
    /// Flat orientation index pairs, 2 per constraint.
    pub orientation_indices: Vec<u32>,
    /// Rest Darboux vectors; mutated in place by plasticity and by the
    /// per-step rest shape update.
    pub rest_darboux: Vec<Quat>,
    /// Per-constraint (bend1, bend2, torsion) compliances.
    pub stiffnesses: Vec<Vec3>,
    /// Per-constraint (plastic yield, plastic creep) pairs.
    pub plasticity: Vec<Vec2>,
    pub lambdas: Vec<Vec3>,
    active_count: usize,
}

impl BendTwistBatch {
    pub fn new() -> Self {
        Self {
            orientation_indices: Vec::new(),
            rest_darboux: Vec::new(),
            stiffnesses: Vec::new(),
            plasticity: Vec::new(),
            lambdas: Vec::new(),
            active_count: 0,
        }
    }

    #[inline]
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn deactivate_all(&mut self) {
        self.active_count = 0;
    }

    /// Activate a constraint in the next free slot. Returns the slot index.
    pub fn activate(
        &mut self,
        qa: u32,
        qb: u32,
        rest_darboux: Quat,
        compliances: Vec3,
        plastic_yield: f32,
        plastic_creep: f32,
    ) -> usize {
        let slot = self.active_count;
        if slot * 2 == self.orientation_indices.len() {
            self.orientation_indices.extend_from_slice(&[qa, qb]);
            self.rest_darboux.push(rest_darboux);
            self.stiffnesses.push(compliances);
            self.plasticity.push(Vec2::new(plastic_yield, plastic_creep));
            self.lambdas.push(Vec3::ZERO);
        } else {
            self.orientation_indices[slot * 2] = qa;
            self.orientation_indices[slot * 2 + 1] = qb;
            self.rest_darboux[slot] = rest_darboux;
            self.stiffnesses[slot] = compliances;
            self.plasticity[slot] = Vec2::new(plastic_yield, plastic_creep);
            self.lambdas[slot] = Vec3::ZERO;
        }
        self.active_count = slot + 1;
        slot
    }

    pub fn reset_lambdas(&mut self) {
        for l in self.lambdas.iter_mut() {
            *l = Vec3::ZERO;
        }
    }

    pub fn evaluate(&mut self, particles: &mut ParticleStore, dt: f32) {
        for i in 0..self.active_count {
            let q1 = self.orientation_indices[i * 2] as usize;
            let q2 = self.orientation_indices[i * 2 + 1] as usize;

            let w1 = particles.inv_rotational_mass[q1];
            let w2 = particles.inv_rotational_mass[q2];

            let compliances = self.stiffnesses[i] / (dt * dt);

            // rest and current darboux vectors
            let rest = Vec4::from(self.rest_darboux[i]);
            let omega = Vec4::from(
                particles.predicted_orientation[q1].conjugate()
                    * particles.predicted_orientation[q2],
            );

            // delta omega with the sign of rest that lies closer
            let omega_plus = omega + rest;
            let mut omega = omega - rest;
            if omega.length_squared() > omega_plus.length_squared() {
                omega = omega_plus;
            }

            // plasticity
            if omega.length_squared() > self.plasticity[i].x * self.plasticity[i].x {
                self.rest_darboux[i] =
                    Quat::from_vec4(rest + omega * self.plasticity[i].y * dt);
            }

            let delta_lambda = (Vec3::new(omega.x, omega.y, omega.z)
                - compliances * self.lambdas[i])
                / (compliances + Vec3::splat(w1 + w2 + EPSILON));

            // discrete Darboux vector does not have a vanishing scalar part
            let delta_q = Quat::from_xyzw(delta_lambda.x, delta_lambda.y, delta_lambda.z, 0.0);

            if w1 > 0.0 {
                particles.orientation_deltas[q1] +=
                    Vec4::from(particles.predicted_orientation[q2] * delta_q) * w1;
                particles.orientation_delta_counts[q1] += 1;
            }
            if w2 > 0.0 {
                particles.orientation_deltas[q2] -=
                    Vec4::from(particles.predicted_orientation[q1] * delta_q) * w2;
                particles.orientation_delta_counts[q2] += 1;
            }

            self.lambdas[i] += delta_lambda;
        }
    }

    pub fn apply(&self, particles: &mut ParticleStore, sor_factor: f32) {
        for i in 0..self.active_count {
            let q1 = self.orientation_indices[i * 2] as usize;
            let q2 = self.orientation_indices[i * 2 + 1] as usize;
            apply_orientation_delta(particles, q1, sor_factor);
            apply_orientation_delta(particles, q2, sor_factor);
        }
    }
}

impl Default for BendTwistBatch {
    fn default() -> Self {
        Self::new()
    }
}
