use glam::{Mat3, Vec3, Vec4};

use crate::fluids::{poly6_kernel, spiky_gradient, FluidInteraction};
use crate::math::{eigen_solve, MIN_NORMAL};
use crate::particle::ParticleStore;

/// Position-based fluids over a transient neighbor pair list.
///
/// Per substep: clear per-particle fluid data, refresh pair kernels from
/// predicted positions, accumulate density and gradient sums, compute one
/// lambda per particle and apply symmetric corrections along each pair.
/// After the velocity update the velocity-space passes run (XSPH viscosity,
/// vorticity confinement, drag and ambient pressure), still per substep;
/// only the anisotropy pass runs once per frame after the substep loop.
///
/// Reference: "Position Based Fluids", Macklin & Muller, SIGGRAPH 2013

/// Zero the fluid scratch of every fluid particle. Substep start.
pub fn clear_fluid_data(particles: &mut ParticleStore, fluid: &[u32]) {
    for &i in fluid {
        particles.fluid_data[i as usize] = Vec4::ZERO;
    }
}

/// Refresh the normalized gradient and averaged kernel values of every pair
/// from predicted positions.
pub fn update_interactions(particles: &ParticleStore, pairs: &mut [FluidInteraction]) {
    for pair in pairs.iter_mut() {
        let a = pair.particle_a as usize;
        let b = pair.particle_b as usize;

        let mut gradient = particles.predicted[a] - particles.predicted[b];
        let distance = gradient.length();
        gradient /= distance + MIN_NORMAL;
        pair.gradient = gradient;

        let h_a = particles.smoothing_radius[a];
        let h_b = particles.smoothing_radius[b];
        pair.avg_kernel = (poly6_kernel(distance, h_a) + poly6_kernel(distance, h_b)) * 0.5;
        pair.avg_gradient = (spiky_gradient(distance, h_a) + spiky_gradient(distance, h_b)) * 0.5;
    }
}

/// Accumulate density, gradient and squared-gradient sums per particle,
/// weighted by the neighbor's rest volume so mixed-resolution fluids stay
/// symmetric.
pub fn update_densities(particles: &mut ParticleStore, pairs: &[FluidInteraction]) {
    for pair in pairs {
        let a = pair.particle_a as usize;
        let b = pair.particle_b as usize;

        let rest_volume_a = 1.0 / particles.inv_mass[a] / particles.rest_density[a];
        let rest_volume_b = 1.0 / particles.inv_mass[b] / particles.rest_density[b];

        let grad_a = rest_volume_b * pair.avg_gradient;
        let grad_b = rest_volume_a * pair.avg_gradient;

        let v_a = rest_volume_b / rest_volume_a;
        let v_b = rest_volume_a / rest_volume_b;

        particles.fluid_data[a] += Vec4::new(v_a * pair.avg_kernel, 0.0, grad_a, grad_a * grad_a);
        particles.fluid_data[b] += Vec4::new(v_b * pair.avg_kernel, 0.0, grad_b, grad_b * grad_b);
    }
}

/// Compute the density constraint lambda for every fluid particle,
/// including the self contribution, and reset the frame's normal and
/// vorticity accumulators.
///
/// The constraint is clamped from below by surface tension so slight
/// under-density (free surfaces) does not suck neighbors in:
/// `C = max(-0.5 * surface_tension, density / rest_density - 1)`.
pub fn calculate_lambdas(particles: &mut ParticleStore, fluid: &[u32]) {
    for &p in fluid {
        let i = p as usize;

        particles.normal[i] = Vec3::ZERO;
        particles.vorticity[i] = Vec3::ZERO;

        let mut data = particles.fluid_data[i];
        let w = particles.inv_mass[i];
        let h = particles.smoothing_radius[i];

        let grad = spiky_gradient(0.0, h) / w / particles.rest_density[i];

        // self particle contribution to density and gradient:
        data += Vec4::new(
            poly6_kernel(0.0, h),
            0.0,
            grad,
            grad * grad + data.z * data.z,
        );

        // weight by mass:
        data.x /= w;

        // evaluate density constraint (clamp pressure):
        let constraint = (data.x / particles.rest_density[i] - 1.0)
            .max(-0.5 * particles.surface_tension[i]);

        // calculate lambda:
        data.y = -constraint / (w * data.w + MIN_NORMAL);

        particles.fluid_data[i] = data;
    }
}

/// Apply symmetric position corrections along each pair's gradient, with a
/// tensile instability term (scorr) scaled by surface tension.
///
/// Corrections go straight into predicted positions; the density stage runs
/// once per substep with no Jacobi averaging, relying on substeps for
/// convergence.
pub fn apply_density_constraints(
    particles: &mut ParticleStore,
    pairs: &[FluidInteraction],
    sor_factor: f32,
) {
    for pair in pairs {
        let a = pair.particle_a as usize;
        let b = pair.particle_b as usize;

        let w_a = particles.inv_mass[a];
        let w_b = particles.inv_mass[b];

        let rest_volume_a = 1.0 / w_a / particles.rest_density[a];
        let rest_volume_b = 1.0 / w_b / particles.rest_density[b];

        // tensile instability correction factor:
        let w_avg = pair.avg_kernel
            / ((poly6_kernel(0.0, particles.smoothing_radius[a])
                + poly6_kernel(0.0, particles.smoothing_radius[b]))
                * 0.5);
        let scorr_a = -(0.001 + 0.2 * particles.surface_tension[a]) * w_avg
            / (w_a * particles.fluid_data[a].w);
        let scorr_b = -(0.001 + 0.2 * particles.surface_tension[b]) * w_avg
            / (w_b * particles.fluid_data[b].w);

        let delta = pair.gradient
            * pair.avg_gradient
            * ((particles.fluid_data[a].y + scorr_a) * rest_volume_b
                + (particles.fluid_data[b].y + scorr_b) * rest_volume_a)
            * sor_factor;

        if w_a > 0.0 {
            particles.predicted[a] += delta * w_a;
        }
        if w_b > 0.0 {
            particles.predicted[b] -= delta * w_b;
        }
    }
}

/// Velocity pass after the position solve: XSPH viscosity, vorticity
/// accumulation and color-field surface normals over the pair list.
pub fn viscosity_and_normals(particles: &mut ParticleStore, pairs: &[FluidInteraction]) {
    for pair in pairs {
        let a = pair.particle_a as usize;
        let b = pair.particle_b as usize;

        let rest_volume_a = 1.0 / particles.inv_mass[a] / particles.rest_density[a];
        let rest_volume_b = 1.0 / particles.inv_mass[b] / particles.rest_density[b];

        // XSPH viscosity:
        let viscosity_coeff = particles.viscosity[a].min(particles.viscosity[b]);
        let rel_velocity = particles.velocity[b] - particles.velocity[a];
        let viscosity = viscosity_coeff * rel_velocity * pair.avg_kernel;
        particles.velocity[a] += viscosity * rest_volume_b;
        particles.velocity[b] -= viscosity * rest_volume_a;

        // vorticity:
        let vgrad = pair.gradient * pair.avg_gradient;
        let vorticity = rel_velocity.cross(vgrad);
        particles.vorticity[a] += vorticity * rest_volume_b;
        particles.vorticity[b] += vorticity * rest_volume_a;

        // color field normal:
        let radius = (particles.smoothing_radius[a] + particles.smoothing_radius[b]) * 0.5;
        particles.normal[a] +=
            vgrad * radius / particles.inv_mass[b] / particles.fluid_data[b].x;
        particles.normal[b] -=
            vgrad * radius / particles.inv_mass[a] / particles.fluid_data[a].x;
    }
}

/// Accumulate the vorticity confinement location gradient (eta) per
/// particle. Must run after [`viscosity_and_normals`].
pub fn calculate_vorticity_eta(particles: &mut ParticleStore, pairs: &[FluidInteraction]) {
    for pair in pairs {
        let a = pair.particle_a as usize;
        let b = pair.particle_b as usize;

        let vgrad = pair.gradient * pair.avg_gradient;
        particles.eta[a] += particles.vorticity[a].length() * vgrad
            / particles.inv_mass[b]
            / particles.rest_density[b];
        particles.eta[b] -= particles.vorticity[b].length() * vgrad
            / particles.inv_mass[a]
            / particles.rest_density[a];
    }
}

/// Apply atmospheric drag (surface-weighted), ambient pressure along the
/// color-field normal and vorticity confinement to fluid velocities.
pub fn apply_vorticity_and_atmosphere(
    particles: &mut ParticleStore,
    fluid: &[u32],
    wind: Vec3,
    dt: f32,
) {
    for &p in fluid {
        let i = p as usize;

        // particles near the surface should experience drag:
        let velocity_diff = particles.velocity[i] - wind;
        particles.velocity[i] -= particles.atmospheric_drag[i]
            * velocity_diff
            * (1.0 - particles.fluid_data[i].x / particles.rest_density[i]).max(0.0)
            * dt;

        // ambient pressure:
        particles.velocity[i] += particles.atmospheric_pressure[i] * particles.normal[i] * dt;

        // vorticity confinement:
        particles.velocity[i] += particles.eta[i].normalize_or_zero().cross(particles.vorticity[i])
            * particles.vorticity_confinement[i]
            * dt;

        particles.eta[i] = Vec3::ZERO;
    }
}

/// Accumulate Laplacian-smoothed neighbor centroids. `smooth_accum` holds
/// the weighted position sum in xyz and the weight sum in w.
pub fn accumulate_smooth_positions(
    particles: &ParticleStore,
    pairs: &[FluidInteraction],
    smooth_accum: &mut [Vec4],
) {
    for pair in pairs {
        let a = pair.particle_a as usize;
        let b = pair.particle_b as usize;

        let distance = (particles.position[a] - particles.position[b]).length();
        let avg_kernel = (poly6_kernel(distance, particles.smoothing_radius[a])
            + poly6_kernel(distance, particles.smoothing_radius[b]))
            * 0.5;

        smooth_accum[a] += Vec4::new(
            particles.position[b].x,
            particles.position[b].y,
            particles.position[b].z,
            1.0,
        ) * avg_kernel;
        smooth_accum[b] += Vec4::new(
            particles.position[a].x,
            particles.position[a].y,
            particles.position[a].z,
            1.0,
        ) * avg_kernel;
    }
}

/// Divide smoothed position sums by their weights; isolated particles fall
/// back to their own position.
pub fn average_smooth_positions(
    particles: &ParticleStore,
    fluid: &[u32],
    smooth_accum: &mut [Vec4],
) {
    for &p in fluid {
        let i = p as usize;
        if smooth_accum[i].w > 0.0 {
            smooth_accum[i] /= smooth_accum[i].w;
        } else {
            let pos = particles.position[i];
            smooth_accum[i] = Vec4::new(pos.x, pos.y, pos.z, 1.0);
        }
    }
}

/// Accumulate the neighborhood covariance of every fluid particle around
/// its smoothed position.
pub fn accumulate_anisotropy(
    particles: &ParticleStore,
    pairs: &[FluidInteraction],
    smooth_accum: &[Vec4],
    covariance: &mut [Mat3],
) {
    for pair in pairs {
        let a = pair.particle_a as usize;
        let b = pair.particle_b as usize;

        let distance_a = particles.position[b] - smooth_accum[a].truncate();
        let distance_b = particles.position[a] - smooth_accum[b].truncate();

        covariance[a] += outer_product(distance_a) * pair.avg_kernel;
        covariance[b] += outer_product(distance_b) * pair.avg_kernel;
    }
}

/// Eigen-decompose each particle's covariance into ellipsoid axes, clamping
/// the aspect ratio to `max_anisotropy`, and move the render position to
/// the smoothed centroid.
pub fn average_anisotropy(
    particles: &mut ParticleStore,
    fluid: &[u32],
    smooth_accum: &[Vec4],
    covariance: &[Mat3],
    max_anisotropy: f32,
) {
    for &p in fluid {
        let i = p as usize;

        let trace = covariance[i].x_axis.x + covariance[i].y_axis.y + covariance[i].z_axis.z;
        if smooth_accum[i].w > 0.0 && trace > 0.01 {
            let (singular_values, u) =
                eigen_solve(covariance[i] * (1.0 / smooth_accum[i].w));

            let max = singular_values.x;
            let s = singular_values.max(Vec3::splat(max / max_anisotropy)) / max
                * particles.principal_radii[i].x;

            particles.anisotropy[i] = [
                u.x_axis.extend(s.x),
                u.y_axis.extend(s.y),
                u.z_axis.extend(s.z),
            ];
        } else {
            let radius = particles.principal_radii[i].x / max_anisotropy;
            particles.anisotropy[i] = [
                Vec4::new(1.0, 0.0, 0.0, radius),
                Vec4::new(0.0, 1.0, 0.0, radius),
                Vec4::new(0.0, 0.0, 1.0, radius),
            ];
        }

        particles.smoothed_position[i] = smooth_accum[i].truncate();
    }
}

/// Identity ellipsoids for every fluid particle; used when anisotropy is
/// disabled.
pub fn identity_anisotropy(particles: &mut ParticleStore, fluid: &[u32]) {
    for &p in fluid {
        let i = p as usize;
        let radius = particles.principal_radii[i].x;
        particles.anisotropy[i] = [
            Vec4::new(1.0, 0.0, 0.0, radius),
            Vec4::new(0.0, 1.0, 0.0, radius),
            Vec4::new(0.0, 0.0, 1.0, radius),
        ];
        particles.smoothed_position[i] = particles.position[i];
    }
}

#[inline]
fn outer_product(v: Vec3) -> Mat3 {
    Mat3::from_cols(v * v.x, v * v.y, v * v.z)
}
