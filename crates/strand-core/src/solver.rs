use glam::{Mat3, Quat, Vec3, Vec4};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::actor::Actor;
use crate::config::SolverConfig;
use crate::constraints::bend_twist::BendTwistBatch;
use crate::constraints::bending::BendingBatch;
use crate::constraints::density;
use crate::constraints::distance::DistanceBatch;
use crate::constraints::skin::SkinBatch;
use crate::constraints::stretch_shear::StretchShearBatch;
use crate::constraints::ConstraintKind;
use crate::fluids::FluidInteraction;
use crate::grid::SpatialHashGrid;
use crate::observer::StepObserver;
use crate::particle::ParticleStore;

/// XPBD constraint solver over a shared particle arena.
///
/// Owns the particle store, the aggregate constraint batches of every kind
/// and the fluid neighbor structures. Actors allocate particles and batches
/// at bind time and drive topology changes through the [`Actor`] hooks; the
/// solver runs the fixed-order substep loop.
///
/// Batches of one kind never share a particle between two active
/// constraints, so each batch is a self-contained unit of work; kinds form
/// a sequential dependency chain.
pub struct Solver {
    pub particles: ParticleStore,
    pub config: SolverConfig,
    grid: SpatialHashGrid,

    pub distance: Vec<DistanceBatch>,
    pub bending: Vec<BendingBatch>,
    pub skin: Vec<SkinBatch>,
    pub stretch_shear: Vec<StretchShearBatch>,
    pub bend_twist: Vec<BendTwistBatch>,

    /// Indices of particles with a positive smoothing radius, rebuilt each
    /// frame.
    fluid_particles: Vec<u32>,
    pairs: Vec<FluidInteraction>,
    smooth_accum: Vec<Vec4>,
    covariance: Vec<Mat3>,
}

impl Solver {
    pub fn new() -> Self {
        Self {
            particles: ParticleStore::new(),
            config: SolverConfig::default(),
            grid: SpatialHashGrid::new(0.2, 131072),
            distance: Vec::new(),
            bending: Vec::new(),
            skin: Vec::new(),
            stretch_shear: Vec::new(),
            bend_twist: Vec::new(),
            fluid_particles: Vec::new(),
            pairs: Vec::new(),
            smooth_accum: Vec::new(),
            covariance: Vec::new(),
        }
    }

    // Batch management. Actors hold the returned ids; accessors return None
    // for ids that were never created, and actors skip the kind in that
    // case.

    pub fn add_distance_batch(&mut self) -> usize {
        self.distance.push(DistanceBatch::new());
        self.distance.len() - 1
    }

    pub fn add_bending_batch(&mut self) -> usize {
        self.bending.push(BendingBatch::new());
        self.bending.len() - 1
    }

    pub fn add_skin_batch(&mut self) -> usize {
        self.skin.push(SkinBatch::new());
        self.skin.len() - 1
    }

    pub fn add_stretch_shear_batch(&mut self) -> usize {
        self.stretch_shear.push(StretchShearBatch::new());
        self.stretch_shear.len() - 1
    }

    pub fn add_bend_twist_batch(&mut self) -> usize {
        self.bend_twist.push(BendTwistBatch::new());
        self.bend_twist.len() - 1
    }

    pub fn distance_batch_mut(&mut self, id: usize) -> Option<&mut DistanceBatch> {
        self.distance.get_mut(id)
    }

    pub fn bending_batch_mut(&mut self, id: usize) -> Option<&mut BendingBatch> {
        self.bending.get_mut(id)
    }

    pub fn skin_batch_mut(&mut self, id: usize) -> Option<&mut SkinBatch> {
        self.skin.get_mut(id)
    }

    pub fn stretch_shear_batch_mut(&mut self, id: usize) -> Option<&mut StretchShearBatch> {
        self.stretch_shear.get_mut(id)
    }

    pub fn bend_twist_batch_mut(&mut self, id: usize) -> Option<&mut BendTwistBatch> {
        self.bend_twist.get_mut(id)
    }

    /// Step the simulation by `step_time` seconds split into `substeps`
    /// equal substeps.
    ///
    /// Frame layout: actor `prepare_frame` and `begin_step` hooks, then per
    /// substep integrate -> constraint passes -> velocity update -> fluid
    /// velocity corrections -> actor `substep` hooks. The anisotropy pass
    /// runs once per frame after the last substep, before `end_step`.
    pub fn step<O: StepObserver>(
        &mut self,
        actors: &mut [&mut dyn Actor],
        step_time: f32,
        substeps: u32,
        observer: &mut O,
    ) {
        if step_time <= 0.0 || substeps == 0 {
            return;
        }

        for actor in actors.iter_mut() {
            actor.prepare_frame(self);
        }
        for actor in actors.iter_mut() {
            actor.begin_step(self, step_time, substeps);
        }

        self.collect_fluid_particles();

        let dt = step_time / substeps as f32;
        let count = self.particles.count();

        for _ in 0..substeps {
            self.reset_lambdas();

            self.integrate(dt);
            observer.on_integrate(&self.particles, dt);

            if !self.fluid_particles.is_empty() {
                self.grid.build(&self.particles.predicted, count);
                self.grid.collect_pairs(
                    &self.particles.predicted,
                    &self.particles.smoothing_radius,
                    &self.particles.filter,
                    &self.fluid_particles,
                    &mut self.pairs,
                );
            }

            for _ in 0..self.config.iterations {
                self.solve_position_kinds(dt);
            }
            for kind in [
                ConstraintKind::StretchShear,
                ConstraintKind::Distance,
                ConstraintKind::Bending,
                ConstraintKind::BendTwist,
                ConstraintKind::Skin,
            ] {
                observer.on_constraint_pass(kind, &self.particles);
            }

            if !self.fluid_particles.is_empty() {
                self.solve_density(dt);
                observer.on_constraint_pass(ConstraintKind::Density, &self.particles);
            }

            self.update_velocities(dt);

            if !self.fluid_particles.is_empty() {
                self.fluid_velocity_corrections(dt);
            }

            observer.on_substep_complete(&self.particles, dt);

            for actor in actors.iter_mut() {
                actor.substep(self, dt);
            }
        }

        if !self.fluid_particles.is_empty() {
            self.update_anisotropy();
        }

        for actor in actors.iter_mut() {
            actor.end_step(self, dt);
        }

        for f in self.particles.external_force.iter_mut() {
            *f = Vec3::ZERO;
        }

        observer.on_step_complete(&self.particles, step_time);
    }

    fn reset_lambdas(&mut self) {
        for batch in self.distance.iter_mut() {
            batch.reset_lambdas();
        }
        for batch in self.bending.iter_mut() {
            batch.reset_lambdas();
        }
        for batch in self.skin.iter_mut() {
            batch.reset_lambdas();
        }
        for batch in self.stretch_shear.iter_mut() {
            batch.reset_lambdas();
        }
        for batch in self.bend_twist.iter_mut() {
            batch.reset_lambdas();
        }
    }

    /// Integrate forces into velocities and predict positions and
    /// orientations. Kinematic particles (inverse mass 0) keep their exact
    /// state: prediction copies it bit for bit.
    fn integrate(&mut self, dt: f32) {
        let count = self.particles.count();
        let gravity = self.config.gravity;
        let damping = self.config.damping;
        let max_velocity = self.config.max_velocity;

        for i in 0..count {
            if self.particles.inv_mass[i] > 0.0 {
                let mut vel = self.particles.velocity[i];
                vel += (gravity + self.particles.external_force[i] * self.particles.inv_mass[i])
                    * dt;
                vel *= damping;

                let speed = vel.length();
                if speed > max_velocity {
                    vel = vel / speed * max_velocity;
                }

                self.particles.velocity[i] = vel;
            }
        }

        #[cfg(feature = "parallel")]
        {
            let predicted: Vec<Vec3> = (0..count)
                .into_par_iter()
                .map(|i| {
                    if self.particles.inv_mass[i] > 0.0 {
                        self.particles.position[i] + self.particles.velocity[i] * dt
                    } else {
                        self.particles.position[i]
                    }
                })
                .collect();
            self.particles.predicted[..count].copy_from_slice(&predicted);
        }

        #[cfg(not(feature = "parallel"))]
        for i in 0..count {
            self.particles.predicted[i] = if self.particles.inv_mass[i] > 0.0 {
                self.particles.position[i] + self.particles.velocity[i] * dt
            } else {
                self.particles.position[i]
            };
        }

        for i in 0..count {
            self.particles.predicted_orientation[i] = if self.particles.inv_rotational_mass[i]
                > 0.0
            {
                let omega = self.particles.angular_velocity[i];
                let spin = Quat::from_xyzw(omega.x, omega.y, omega.z, 0.0)
                    * self.particles.orientation[i];
                let raw =
                    Vec4::from(self.particles.orientation[i]) + Vec4::from(spin) * 0.5 * dt;
                Quat::from_vec4(raw).normalize()
            } else {
                self.particles.orientation[i]
            };
        }
    }

    /// One pass over the position constraint kinds in their fixed order:
    /// stretch-shear and distance, then bending and bend-twist, then skin.
    /// Within a kind every batch is evaluated before any is applied.
    fn solve_position_kinds(&mut self, dt: f32) {
        let sor = self.config.sor_factor;

        for batch in self.stretch_shear.iter_mut() {
            batch.evaluate(&mut self.particles, dt);
        }
        for batch in self.stretch_shear.iter() {
            batch.apply(&mut self.particles, sor);
        }

        for batch in self.distance.iter_mut() {
            batch.evaluate(&mut self.particles, dt);
        }
        for batch in self.distance.iter() {
            batch.apply(&mut self.particles, sor);
        }

        for batch in self.bending.iter_mut() {
            batch.evaluate(&mut self.particles, dt);
        }
        for batch in self.bending.iter() {
            batch.apply(&mut self.particles, sor);
        }

        for batch in self.bend_twist.iter_mut() {
            batch.evaluate(&mut self.particles, dt);
        }
        for batch in self.bend_twist.iter() {
            batch.apply(&mut self.particles, sor);
        }

        for batch in self.skin.iter_mut() {
            batch.evaluate(&mut self.particles, dt);
        }
        for batch in self.skin.iter() {
            batch.apply(&mut self.particles, sor);
        }
    }

    /// Density stage, once per substep. Substep count is the convergence
    /// knob for fluids.
    fn solve_density(&mut self, _dt: f32) {
        density::clear_fluid_data(&mut self.particles, &self.fluid_particles);
        density::update_interactions(&self.particles, &mut self.pairs);
        density::update_densities(&mut self.particles, &self.pairs);
        density::calculate_lambdas(&mut self.particles, &self.fluid_particles);
        density::apply_density_constraints(&mut self.particles, &self.pairs, self.config.sor_factor);
    }

    /// PBD velocity update: velocities from position change, angular
    /// velocities from orientation change, then finalize state.
    fn update_velocities(&mut self, dt: f32) {
        let count = self.particles.count();
        let inv_dt = 1.0 / dt;

        #[cfg(feature = "parallel")]
        {
            let velocities: Vec<Vec3> = (0..count)
                .into_par_iter()
                .map(|i| {
                    if self.particles.inv_mass[i] > 0.0 {
                        (self.particles.predicted[i] - self.particles.position[i]) * inv_dt
                    } else {
                        self.particles.velocity[i]
                    }
                })
                .collect();
            self.particles.velocity[..count].copy_from_slice(&velocities);
        }

        #[cfg(not(feature = "parallel"))]
        for i in 0..count {
            if self.particles.inv_mass[i] > 0.0 {
                self.particles.velocity[i] =
                    (self.particles.predicted[i] - self.particles.position[i]) * inv_dt;
            }
        }

        for i in 0..count {
            if self.particles.inv_mass[i] > 0.0 {
                self.particles.position[i] = self.particles.predicted[i];
            }

            if self.particles.inv_rotational_mass[i] > 0.0 {
                let delta = self.particles.predicted_orientation[i]
                    * self.particles.orientation[i].conjugate();
                self.particles.angular_velocity[i] =
                    Vec3::new(delta.x, delta.y, delta.z) * 2.0 * inv_dt;
                self.particles.orientation[i] = self.particles.predicted_orientation[i];
            }
        }
    }

    /// Per-substep fluid velocity corrections over the substep's pair list.
    fn fluid_velocity_corrections(&mut self, dt: f32) {
        density::viscosity_and_normals(&mut self.particles, &self.pairs);
        density::calculate_vorticity_eta(&mut self.particles, &self.pairs);
        density::apply_vorticity_and_atmosphere(
            &mut self.particles,
            &self.fluid_particles,
            self.config.wind,
            dt,
        );
    }

    /// Frame-end anisotropy pass: ellipsoid axes from the neighborhood
    /// covariance, or identity ellipsoids when disabled.
    fn update_anisotropy(&mut self) {
        if self.config.max_anisotropy <= 1.0 {
            density::identity_anisotropy(&mut self.particles, &self.fluid_particles);
            return;
        }

        let count = self.particles.count();
        self.smooth_accum.clear();
        self.smooth_accum.resize(count, Vec4::ZERO);
        self.covariance.clear();
        self.covariance.resize(count, Mat3::ZERO);

        density::accumulate_smooth_positions(&self.particles, &self.pairs, &mut self.smooth_accum);
        density::average_smooth_positions(
            &self.particles,
            &self.fluid_particles,
            &mut self.smooth_accum,
        );
        density::accumulate_anisotropy(
            &self.particles,
            &self.pairs,
            &self.smooth_accum,
            &mut self.covariance,
        );
        density::average_anisotropy(
            &mut self.particles,
            &self.fluid_particles,
            &self.smooth_accum,
            &self.covariance,
            self.config.max_anisotropy,
        );
    }

    /// Rebuild the fluid particle list and fit the grid cell size to the
    /// largest smoothing radius.
    fn collect_fluid_particles(&mut self) {
        self.fluid_particles.clear();
        let mut max_radius: f32 = 0.0;
        for i in 0..self.particles.count() {
            let h = self.particles.smoothing_radius[i];
            if h > 0.0 {
                self.fluid_particles.push(i as u32);
                max_radius = max_radius.max(h);
            }
        }
        if max_radius > 0.0 && (max_radius - self.grid.cell_size()).abs() > f32::EPSILON {
            self.grid.set_cell_size(max_radius);
        }
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}
