use glam::{Quat, Vec3, Vec4};

use crate::constraints::{apply_orientation_delta, apply_position_delta};
use crate::math::EPSILON;
use crate::particle::ParticleStore;

/// One batch of rod stretch/shear constraints.
///
/// Couples a particle pair with the element frame between them: the rod
/// vector is rotated into element-local space and compared against the
/// third director (0, 0, 1). The Lagrange multiplier is a Vec3, one
/// component per (shear1, shear2, stretch) axis, and the correction moves
/// both particles and the frame.
///
/// Reference: "Position and Orientation Based Cosserat Rods",
/// Kugelstadt & Schoemer, 2016
pub struct StretchShearBatch {
    /// Flat particle index pairs, 2 per constraint.
    pub particle_indices: Vec<u32>,
    /// Orientation (element frame) index, 1 per constraint.
    pub orientation_indices: Vec<u32>,
    pub rest_lengths: Vec<f32>,
    pub rest_orientations: Vec<Quat>,
    /// Per-constraint (shear1, shear2, stretch) compliances.
    pub stiffnesses: Vec<Vec3>,
    pub lambdas: Vec<Vec3>,
    active_count: usize,
}

impl StretchShearBatch {
    pub fn new() -> Self {
        Self {
            particle_indices: Vec::new(),
            orientation_indices: Vec::new(),
            rest_lengths: Vec::new(),
            rest_orientations: Vec::new(),
            stiffnesses: Vec::new(),
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
        a: u32,
        b: u32,
        orientation: u32,
        rest_length: f32,
        rest_orientation: Quat,
        compliances: Vec3,
    ) -> usize {
        let slot = self.active_count;
        if slot * 2 == self.particle_indices.len() {
            self.particle_indices.extend_from_slice(&[a, b]);
            self.orientation_indices.push(orientation);
            self.rest_lengths.push(rest_length);
            self.rest_orientations.push(rest_orientation);
            self.stiffnesses.push(compliances);
            self.lambdas.push(Vec3::ZERO);
        } else {
            self.particle_indices[slot * 2] = a;
            self.particle_indices[slot * 2 + 1] = b;
            self.orientation_indices[slot] = orientation;
            self.rest_lengths[slot] = rest_length;
            self.rest_orientations[slot] = rest_orientation;
            self.stiffnesses[slot] = compliances;
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
        let dt_sq = dt * dt;

        for i in 0..self.active_count {
            let p1 = self.particle_indices[i * 2] as usize;
            let p2 = self.particle_indices[i * 2 + 1] as usize;
            let q = self.orientation_indices[i] as usize;

            let w1 = particles.inv_mass[p1];
            let w2 = particles.inv_mass[p2];
            let wq = particles.inv_rotational_mass[q];

            let rest_length = self.rest_lengths[i];
            let compliances = self.stiffnesses[i] / dt_sq;

            let e = self.rest_orientations[i] * Vec3::Z;
            let basis = particles.predicted_orientation[q] * self.rest_orientations[i];

            // rod vector in local element space, minus the third director:
            let mut gamma = basis.conjugate()
                * (particles.predicted[p2] - particles.predicted[p1])
                / (rest_length + EPSILON);
            gamma.z -= 1.0;

            let w = Vec3::splat((w1 + w2) / (rest_length + EPSILON) + wq * 4.0 * rest_length + EPSILON);
            let delta_lambda = (gamma - compliances * self.lambdas[i]) / (compliances + w);
            self.lambdas[i] += delta_lambda;

            // back to world space:
            let delta = basis * delta_lambda;

            if w1 > 0.0 {
                particles.deltas[p1] += delta * w1;
                particles.delta_counts[p1] += 1;
            }
            if w2 > 0.0 {
                particles.deltas[p2] -= delta * w2;
                particles.delta_counts[p2] += 1;
            }

            if wq > 0.0 {
                let e_3 = Quat::from_xyzw(e.x, e.y, e.z, 0.0);
                let q_e_3_bar = particles.predicted_orientation[q] * e_3.conjugate();

                let rot_delta =
                    Quat::from_xyzw(delta.x, delta.y, delta.z, 0.0) * q_e_3_bar;
                particles.orientation_deltas[q] +=
                    Vec4::from(rot_delta) * 2.0 * wq * rest_length;
                particles.orientation_delta_counts[q] += 1;
            }
        }
    }

    pub fn apply(&self, particles: &mut ParticleStore, sor_factor: f32) {
        for i in 0..self.active_count {
            let p1 = self.particle_indices[i * 2] as usize;
            let p2 = self.particle_indices[i * 2 + 1] as usize;
            let q = self.orientation_indices[i] as usize;
            apply_position_delta(particles, p1, sor_factor);
            apply_position_delta(particles, p2, sor_factor);
            apply_orientation_delta(particles, q, sor_factor);
        }
    }
}

impl Default for StretchShearBatch {
    fn default() -> Self {
        Self::new()
    }
}
