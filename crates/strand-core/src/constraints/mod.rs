pub mod bend_twist;
pub mod bending;
pub mod density;
pub mod distance;
pub mod skin;
pub mod stretch_shear;

use glam::{Quat, Vec4};

use crate::particle::ParticleStore;

/// Constraint kinds, in the order the solver schedules them.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConstraintKind {
    StretchShear,
    Distance,
    Bending,
    BendTwist,
    Skin,
    Density,
}

/// Fold the averaged position correction for particle `p` back into its
/// predicted position, scaled by the SOR factor, then clear the scratch.
#[inline]
pub(crate) fn apply_position_delta(particles: &mut ParticleStore, p: usize, sor_factor: f32) {
    let count = particles.delta_counts[p];
    if count > 0 {
        particles.predicted[p] += particles.deltas[p] * sor_factor / count as f32;
        particles.deltas[p] = glam::Vec3::ZERO;
        particles.delta_counts[p] = 0;
    }
}

/// Fold the averaged orientation correction for frame `q` back into its
/// predicted orientation and renormalize, then clear the scratch.
#[inline]
pub(crate) fn apply_orientation_delta(particles: &mut ParticleStore, q: usize, sor_factor: f32) {
    let count = particles.orientation_delta_counts[q];
    if count > 0 {
        let raw = Vec4::from(particles.predicted_orientation[q])
            + particles.orientation_deltas[q] * sor_factor / count as f32;
        particles.predicted_orientation[q] = Quat::from_vec4(raw).normalize();
        particles.orientation_deltas[q] = Vec4::ZERO;
        particles.orientation_delta_counts[q] = 0;
    }
}
