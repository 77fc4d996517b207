use glam::Vec2;

use crate::constraints::apply_position_delta;
use crate::math::EPSILON;
use crate::particle::ParticleStore;

/// One batch of 3-particle bend constraints.
///
/// The bend value is the distance from the hinge particle to the centroid
/// of all three; the constraint drives it back toward a rest bend. A
/// dead zone (`max_bending`) leaves small bends uncorrected, and plastic
/// creep folds persistent large bends into the rest value.
pub struct BendingBatch {
    /// Flat particle index triplets (a, b, hinge), 3 per constraint.
    pub particle_indices: Vec<u32>,
    /// Rest bend values; mutated in place by plastic creep.
    pub rest_bends: Vec<f32>,
    /// Per-constraint (max bending, compliance) pairs.
    pub stiffnesses: Vec<Vec2>,
    /// Per-constraint (plastic yield, plastic creep) pairs.
    pub plasticity: Vec<Vec2>,
    pub lambdas: Vec<f32>,
    active_count: usize,
}

impl BendingBatch {
    pub fn new() -> Self {
        Self {
            particle_indices: Vec::new(),
            rest_bends: Vec::new(),
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
    #[allow(clippy::too_many_arguments)]
    pub fn activate(
        &mut self,
        a: u32,
        b: u32,
        hinge: u32,
        rest_bend: f32,
        max_bending: f32,
        compliance: f32,
        plastic_yield: f32,
        plastic_creep: f32,
    ) -> usize {
        let slot = self.active_count;
        if slot * 3 == self.particle_indices.len() {
            self.particle_indices.extend_from_slice(&[a, b, hinge]);
            self.rest_bends.push(rest_bend);
            self.stiffnesses.push(Vec2::new(max_bending, compliance));
            self.plasticity.push(Vec2::new(plastic_yield, plastic_creep));
            self.lambdas.push(0.0);
        } else {
            self.particle_indices[slot * 3] = a;
            self.particle_indices[slot * 3 + 1] = b;
            self.particle_indices[slot * 3 + 2] = hinge;
            self.rest_bends[slot] = rest_bend;
            self.stiffnesses[slot] = Vec2::new(max_bending, compliance);
            self.plasticity[slot] = Vec2::new(plastic_yield, plastic_creep);
            self.lambdas[slot] = 0.0;
        }
        self.active_count = slot + 1;
        slot
    }

    pub fn reset_lambdas(&mut self) {
        for l in self.lambdas.iter_mut() {
            *l = 0.0;
        }
    }

    /// Evaluate every active constraint.
    ///
    /// The hinge particle moves twice the amount of the other two, so its
    /// gradient carries modulus 2: weights are -2w, -2w, +4w and the
    /// denominator is w1 + w2 + 2*w3.
    pub fn evaluate(&mut self, particles: &mut ParticleStore, dt: f32) {
        for i in 0..self.active_count {
            let p1 = self.particle_indices[i * 3] as usize;
            let p2 = self.particle_indices[i * 3 + 1] as usize;
            let p3 = self.particle_indices[i * 3 + 2] as usize;

            let w1 = particles.inv_mass[p1];
            let w2 = particles.inv_mass[p2];
            let w3 = particles.inv_mass[p3];

            let wsum = w1 + w2 + 2.0 * w3;

            let bend_vector = particles.predicted[p3]
                - (particles.predicted[p1] + particles.predicted[p2] + particles.predicted[p3])
                    / 3.0;
            let bend = bend_vector.length();

            let mut constraint = bend - self.rest_bends[i];

            // dead zone: bends inside +-max_bending are left alone
            constraint = (constraint - self.stiffnesses[i].x).max(0.0)
                + (constraint + self.stiffnesses[i].x).min(0.0);

            // plasticity
            if constraint.abs() > self.plasticity[i].x {
                self.rest_bends[i] += constraint * self.plasticity[i].y * dt;
            }

            let compliance = self.stiffnesses[i].y / (dt * dt);

            let delta_lambda =
                (-constraint - compliance * self.lambdas[i]) / (wsum + compliance + EPSILON);
            let correction = delta_lambda * bend_vector / (bend + EPSILON);

            self.lambdas[i] += delta_lambda;

            if w1 > 0.0 {
                particles.deltas[p1] -= correction * 2.0 * w1;
                particles.delta_counts[p1] += 1;
            }
            if w2 > 0.0 {
                particles.deltas[p2] -= correction * 2.0 * w2;
                particles.delta_counts[p2] += 1;
            }
            if w3 > 0.0 {
                particles.deltas[p3] += correction * 4.0 * w3;
                particles.delta_counts[p3] += 1;
            }
        }
    }

    pub fn apply(&self, particles: &mut ParticleStore, sor_factor: f32) {
        for i in 0..self.active_count {
            let p1 = self.particle_indices[i * 3] as usize;
            let p2 = self.particle_indices[i * 3 + 1] as usize;
            let p3 = self.particle_indices[i * 3 + 2] as usize;
            apply_position_delta(particles, p1, sor_factor);
            apply_position_delta(particles, p2, sor_factor);
            apply_position_delta(particles, p3, sor_factor);
        }
    }
}

impl Default for BendingBatch {
    fn default() -> Self {
        Self::new()
    }
}
