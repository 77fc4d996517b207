use glam::Vec2;

use crate::constraints::apply_position_delta;
use crate::math::EPSILON;
use crate::particle::ParticleStore;

/// One batch of XPBD distance constraints.
///
/// Maintains a rest length between particle pairs using XPBD (Extended
/// Position-Based Dynamics) with per-constraint compliance and a
/// compression slack that lets elements shorten freely up to a fraction of
/// their rest length.
///
/// Within a batch no particle appears in two active constraints, so the
/// whole batch can be evaluated as one unit of work. Slots past
/// `active_count` keep their data; deactivation never frees.
///
/// Reference: "XPBD: Position-Based Simulation of Compliant Constrained
/// Dynamics", Macklin et al., 2016
pub struct DistanceBatch {
    /// Flat particle index pairs, 2 per constraint.
    pub particle_indices: Vec<u32>,
    pub rest_lengths: Vec<f32>,
    /// Per-constraint (compliance, compression slack) pairs. Slack is
    /// pre-multiplied by the rest length.
    pub stiffnesses: Vec<Vec2>,
    /// Accumulated Lagrange multipliers (reset each substep).
    pub lambdas: Vec<f32>,
    active_count: usize,
}

impl DistanceBatch {
    pub fn new() -> Self {
        Self {
            particle_indices: Vec::new(),
            rest_lengths: Vec::new(),
            stiffnesses: Vec::new(),
            lambdas: Vec::new(),
            active_count: 0,
        }
    }

    #[inline]
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Deactivate every constraint, keeping slot data in place.
    pub fn deactivate_all(&mut self) {
        self.active_count = 0;
    }

    /// Activate a constraint in the next free slot, overwriting whatever the
    /// slot held before. Returns the slot index.
    pub fn activate(
        &mut self,
        a: u32,
        b: u32,
        rest_length: f32,
        compliance: f32,
        max_compression: f32,
    ) -> usize {
        let slot = self.active_count;
        if slot * 2 == self.particle_indices.len() {
            self.particle_indices.extend_from_slice(&[a, b]);
            self.rest_lengths.push(rest_length);
            self.stiffnesses
                .push(Vec2::new(compliance, max_compression * rest_length));
            self.lambdas.push(0.0);
        } else {
            self.particle_indices[slot * 2] = a;
            self.particle_indices[slot * 2 + 1] = b;
            self.rest_lengths[slot] = rest_length;
            self.stiffnesses[slot] = Vec2::new(compliance, max_compression * rest_length);
            self.lambdas[slot] = 0.0;
        }
        self.active_count = slot + 1;
        slot
    }

    /// Reset all Lagrange multipliers to zero. Called at substep start.
    pub fn reset_lambdas(&mut self) {
        for l in self.lambdas.iter_mut() {
            *l = 0.0;
        }
    }

    /// Evaluate every active constraint, scattering weighted corrections
    /// into the particle delta buffers.
    ///
    /// 1. C = |p_a - p_b| - rest, with compression inside the slack clamped
    ///    away so elements shorten freely up to `max_compression * rest`.
    /// 2. alpha_tilde = compliance / dt^2
    /// 3. delta_lambda = (-C - alpha_tilde * lambda) / (w_a + w_b + alpha_tilde + eps)
    /// 4. Corrections weighted by inverse mass; kinematic particles are not
    ///    touched.
    pub fn evaluate(&mut self, particles: &mut ParticleStore, dt: f32) {
        let dt_sq = dt * dt;

        for i in 0..self.active_count {
            let p1 = self.particle_indices[i * 2] as usize;
            let p2 = self.particle_indices[i * 2 + 1] as usize;

            let w1 = particles.inv_mass[p1];
            let w2 = particles.inv_mass[p2];

            let distance = particles.predicted[p1] - particles.predicted[p2];
            let d = distance.length();

            let mut constraint = d - self.rest_lengths[i];
            constraint -= constraint.min(0.0).max(-self.stiffnesses[i].y);

            let compliance = self.stiffnesses[i].x / dt_sq;
            let delta_lambda =
                (-constraint - compliance * self.lambdas[i]) / (w1 + w2 + compliance + EPSILON);
            self.lambdas[i] += delta_lambda;

            let delta = delta_lambda * distance / (d + EPSILON);

            if w1 > 0.0 {
                particles.deltas[p1] += delta * w1;
                particles.delta_counts[p1] += 1;
            }
            if w2 > 0.0 {
                particles.deltas[p2] -= delta * w2;
                particles.delta_counts[p2] += 1;
            }
        }
    }

    /// Apply the averaged corrections accumulated by [`evaluate`] and clear
    /// the scratch buffers.
    ///
    /// [`evaluate`]: DistanceBatch::evaluate
    pub fn apply(&self, particles: &mut ParticleStore, sor_factor: f32) {
        for i in 0..self.active_count {
            let p1 = self.particle_indices[i * 2] as usize;
            let p2 = self.particle_indices[i * 2 + 1] as usize;
            apply_position_delta(particles, p1, sor_factor);
            apply_position_delta(particles, p2, sor_factor);
        }
    }
}

impl Default for DistanceBatch {
    fn default() -> Self {
        Self::new()
    }
}
