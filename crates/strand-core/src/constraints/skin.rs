use glam::Vec3;

use crate::constraints::apply_position_delta;
use crate::math::EPSILON;
use crate::particle::ParticleStore;

/// One batch of skin constraints: per-particle tethers toward an animated
/// skin point.
///
/// Each constraint keeps its particle within `radius` of the skin point and
/// outside a backstop sphere behind it. Particle mass is deliberately
/// ignored (unit w in the equation) so skin compliance and particle mass
/// can be tuned independently; the backstop clamp runs at zero compliance.
pub struct SkinBatch {
    pub particle_indices: Vec<u32>,
    /// Skin attachment points, refreshed from the live pose every step.
    pub points: Vec<Vec3>,
    /// Skin surface normals at the attachment points.
    pub normals: Vec<Vec3>,
    /// Per-constraint (radius, collision radius, backstop distance).
    pub radii_backstops: Vec<Vec3>,
    pub compliances: Vec<f32>,
    pub lambdas: Vec<f32>,
    active_count: usize,
}

impl SkinBatch {
    pub fn new() -> Self {
        Self {
            particle_indices: Vec::new(),
            points: Vec::new(),
            normals: Vec::new(),
            radii_backstops: Vec::new(),
            compliances: Vec::new(),
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
        particle: u32,
        point: Vec3,
        normal: Vec3,
        radii_backstop: Vec3,
        compliance: f32,
    ) -> usize {
        let slot = self.active_count;
        if slot == self.particle_indices.len() {
            self.particle_indices.push(particle);
            self.points.push(point);
            self.normals.push(normal);
            self.radii_backstops.push(radii_backstop);
            self.compliances.push(compliance);
            self.lambdas.push(0.0);
        } else {
            self.particle_indices[slot] = particle;
            self.points[slot] = point;
            self.normals[slot] = normal;
            self.radii_backstops[slot] = radii_backstop;
            self.compliances[slot] = compliance;
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

    pub fn evaluate(&mut self, particles: &mut ParticleStore, dt: f32) {
        let dt_sq = dt * dt;

        for i in 0..self.active_count {
            let radius = self.radii_backstops[i].x;
            let collision_radius = self.radii_backstops[i].y;
            let backstop_distance = collision_radius + self.radii_backstops[i].z;

            let compliance = self.compliances[i] / dt_sq;
            let p = self.particle_indices[i] as usize;

            if particles.inv_mass[p] <= 0.0 {
                continue;
            }

            let to_skin = particles.predicted[p] - self.points[i];
            let to_backstop =
                particles.predicted[p] - (self.points[i] - self.normals[i] * backstop_distance);

            // distance to skin and backstop sphere centers:
            let d = to_skin.length();
            let b = to_backstop.length();

            // constrain particle within skin radius, unit mass:
            let constraint = (d - radius).max(0.0);
            let delta_lambda = (-constraint - compliance * self.lambdas[i]) / (1.0 + compliance);
            self.lambdas[i] += delta_lambda;
            particles.deltas[p] += delta_lambda * to_skin / (d + EPSILON);
            particles.delta_counts[p] += 1;

            // constrain particle outside the backstop sphere (0 compliance):
            let constraint = (b - collision_radius).min(0.0);
            particles.deltas[p] -= constraint * to_backstop / (b + EPSILON);
        }
    }

    pub fn apply(&self, particles: &mut ParticleStore, sor_factor: f32) {
        for i in 0..self.active_count {
            let p = self.particle_indices[i] as usize;
            apply_position_delta(particles, p, sor_factor);
        }
    }
}

impl Default for SkinBatch {
    fn default() -> Self {
        Self::new()
    }
}
