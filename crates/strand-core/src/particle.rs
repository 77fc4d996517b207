use glam::{Quat, Vec3, Vec4};
use std::ops::Range;

/// Build a collision filter word from a category index and an interaction
/// mask. Category lives in the low 16 bits, mask in the high 16.
#[inline]
pub fn make_filter(category: u32, mask: u32) -> u32 {
    (mask << 16) | (category & 0xffff)
}

/// Two filters interact when each particle's category is in the other's mask.
#[inline]
pub fn filters_collide(a: u32, b: u32) -> bool {
    let category_a = a & 0xffff;
    let category_b = b & 0xffff;
    let mask_a = a >> 16;
    let mask_b = b >> 16;
    (category_a & mask_b) != 0 && (category_b & mask_a) != 0
}

/// SoA particle arena shared by every actor bound to a solver.
///
/// Actors reserve their full blueprint pool up front via [`allocate`], so
/// tearing and other topology changes never grow these arrays mid-frame.
/// An inverse mass of 0 marks a kinematic particle: no solve path writes
/// its position or orientation.
///
/// [`allocate`]: ParticleStore::allocate
pub struct ParticleStore {
    count: usize,

    pub position: Vec<Vec3>,
    pub velocity: Vec<Vec3>,
    pub rest_position: Vec<Vec3>,
    pub orientation: Vec<Quat>,
    pub angular_velocity: Vec<Vec3>,
    pub rest_orientation: Vec<Quat>,
    pub inv_mass: Vec<f32>,
    pub inv_rotational_mass: Vec<f32>,
    /// Per-particle ellipsoid radii; `x` is the collision/render radius.
    pub principal_radii: Vec<Vec3>,
    /// Collision filter word (category | mask << 16).
    pub filter: Vec<u32>,
    /// External force accumulator, consumed during integration.
    pub external_force: Vec<Vec3>,

    // XPBD solver buffers
    /// Predicted positions for constraint solving.
    pub predicted: Vec<Vec3>,
    pub predicted_orientation: Vec<Quat>,
    /// Accumulated position corrections (Jacobi).
    pub deltas: Vec<Vec3>,
    /// Number of corrections per particle (for averaging).
    pub delta_counts: Vec<u32>,
    /// Accumulated orientation corrections, as raw quaternion components.
    pub orientation_deltas: Vec<Vec4>,
    pub orientation_delta_counts: Vec<u32>,

    // Fluid state. A particle participates in the density pipeline when its
    // smoothing radius is positive.
    pub smoothing_radius: Vec<f32>,
    pub rest_density: Vec<f32>,
    pub surface_tension: Vec<f32>,
    pub viscosity: Vec<f32>,
    pub vorticity_confinement: Vec<f32>,
    pub atmospheric_drag: Vec<f32>,
    pub atmospheric_pressure: Vec<f32>,
    /// Per-particle fluid scratch: density, lambda, kernel sum, squared
    /// gradient sum.
    pub fluid_data: Vec<Vec4>,
    pub vorticity: Vec<Vec3>,
    /// Vorticity confinement location gradient.
    pub eta: Vec<Vec3>,
    /// Color-field surface normal, length encodes surface proximity.
    pub normal: Vec<Vec3>,
    /// Laplacian-smoothed render position for fluid surfaces.
    pub smoothed_position: Vec<Vec3>,
    /// Ellipsoid anisotropy rows (axis xyz + scale w), identity when unused.
    pub anisotropy: Vec<[Vec4; 3]>,
}

impl ParticleStore {
    pub fn new() -> Self {
        Self {
            count: 0,
            position: Vec::new(),
            velocity: Vec::new(),
            rest_position: Vec::new(),
            orientation: Vec::new(),
            angular_velocity: Vec::new(),
            rest_orientation: Vec::new(),
            inv_mass: Vec::new(),
            inv_rotational_mass: Vec::new(),
            principal_radii: Vec::new(),
            filter: Vec::new(),
            external_force: Vec::new(),
            predicted: Vec::new(),
            predicted_orientation: Vec::new(),
            deltas: Vec::new(),
            delta_counts: Vec::new(),
            orientation_deltas: Vec::new(),
            orientation_delta_counts: Vec::new(),
            smoothing_radius: Vec::new(),
            rest_density: Vec::new(),
            surface_tension: Vec::new(),
            viscosity: Vec::new(),
            vorticity_confinement: Vec::new(),
            atmospheric_drag: Vec::new(),
            atmospheric_pressure: Vec::new(),
            fluid_data: Vec::new(),
            vorticity: Vec::new(),
            eta: Vec::new(),
            normal: Vec::new(),
            smoothed_position: Vec::new(),
            anisotropy: Vec::new(),
        }
    }

    /// Number of particles allocated in the arena.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Append `n` default-initialized particles and return their index range.
    pub fn allocate(&mut self, n: usize) -> Range<usize> {
        let start = self.count;
        let end = start + n;
        self.count = end;

        self.position.resize(end, Vec3::ZERO);
        self.velocity.resize(end, Vec3::ZERO);
        self.rest_position.resize(end, Vec3::ZERO);
        self.orientation.resize(end, Quat::IDENTITY);
        self.angular_velocity.resize(end, Vec3::ZERO);
        self.rest_orientation.resize(end, Quat::IDENTITY);
        self.inv_mass.resize(end, 0.0);
        self.inv_rotational_mass.resize(end, 0.0);
        self.principal_radii.resize(end, Vec3::ZERO);
        self.filter.resize(end, make_filter(1, 0xffff));
        self.external_force.resize(end, Vec3::ZERO);
        self.predicted.resize(end, Vec3::ZERO);
        self.predicted_orientation.resize(end, Quat::IDENTITY);
        self.deltas.resize(end, Vec3::ZERO);
        self.delta_counts.resize(end, 0);
        self.orientation_deltas.resize(end, Vec4::ZERO);
        self.orientation_delta_counts.resize(end, 0);
        self.smoothing_radius.resize(end, 0.0);
        self.rest_density.resize(end, 0.0);
        self.surface_tension.resize(end, 0.0);
        self.viscosity.resize(end, 0.0);
        self.vorticity_confinement.resize(end, 0.0);
        self.atmospheric_drag.resize(end, 0.0);
        self.atmospheric_pressure.resize(end, 0.0);
        self.fluid_data.resize(end, Vec4::ZERO);
        self.vorticity.resize(end, Vec3::ZERO);
        self.eta.resize(end, Vec3::ZERO);
        self.normal.resize(end, Vec3::ZERO);
        self.smoothed_position.resize(end, Vec3::ZERO);
        self.anisotropy.resize(
            end,
            [
                Vec4::new(1.0, 0.0, 0.0, 1.0),
                Vec4::new(0.0, 1.0, 0.0, 1.0),
                Vec4::new(0.0, 0.0, 1.0, 1.0),
            ],
        );

        start..end
    }

    /// Clone the full dynamic state of `src` onto `dst`. Used when a tear
    /// splits a particle into an inactive pool slot.
    pub fn copy_particle(&mut self, src: usize, dst: usize) {
        self.position[dst] = self.position[src];
        self.velocity[dst] = self.velocity[src];
        self.rest_position[dst] = self.rest_position[src];
        self.orientation[dst] = self.orientation[src];
        self.angular_velocity[dst] = self.angular_velocity[src];
        self.rest_orientation[dst] = self.rest_orientation[src];
        self.inv_mass[dst] = self.inv_mass[src];
        self.inv_rotational_mass[dst] = self.inv_rotational_mass[src];
        self.principal_radii[dst] = self.principal_radii[src];
        self.filter[dst] = self.filter[src];
        self.external_force[dst] = self.external_force[src];
        self.predicted[dst] = self.predicted[src];
        self.predicted_orientation[dst] = self.predicted_orientation[src];
        self.smoothing_radius[dst] = self.smoothing_radius[src];
        self.rest_density[dst] = self.rest_density[src];
        self.surface_tension[dst] = self.surface_tension[src];
        self.viscosity[dst] = self.viscosity[src];
        self.vorticity_confinement[dst] = self.vorticity_confinement[src];
        self.atmospheric_drag[dst] = self.atmospheric_drag[src];
        self.atmospheric_pressure[dst] = self.atmospheric_pressure[src];
    }
}

impl Default for ParticleStore {
    fn default() -> Self {
        Self::new()
    }
}
