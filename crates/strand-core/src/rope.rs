use glam::Vec3;

use crate::actor::Actor;
use crate::blueprint::RopeBlueprint;
use crate::math::rest_bending_constraint;
use crate::particle::make_filter;
use crate::solver::Solver;

/// One rope segment: equivalent to 1 distance constraint plus the bend
/// constraints it shares with its neighbors. Particle indices are solver
/// arena indices.
#[derive(Clone, Copy, Debug)]
pub struct StructuralElement {
    pub particle1: u32,
    pub particle2: u32,
    pub rest_length: f32,
    /// Force exerted by the matching distance constraint during the last
    /// substep, in newtons. Negative under tension.
    pub constraint_force: f32,
    /// Per-element scale on the rope's tear resistance.
    pub tear_resistance: f32,
}

/// Payload passed to the torn callback, synchronously from inside the
/// substep that tore the element.
#[derive(Clone, Copy, Debug)]
pub struct RopeTornEvent {
    /// The element that was torn, after its endpoint was redirected.
    pub element: StructuralElement,
    /// Arena index of the freshly activated particle.
    pub particle_index: u32,
}

type RopeTornCallback = Box<dyn FnMut(&RopeTornEvent)>;

/// A tearable rope actor.
///
/// The rope keeps a list of structural elements as the source of truth for
/// its topology. Constraints are regenerated from elements after tearing
/// and whenever a tunable marked a kind dirty; regeneration interleaves
/// distance constraints across 2 batches (even/odd) and bend constraints
/// across 3, so no batch ever holds two constraints sharing a particle.
/// Closed loops add dedicated loop-closing batches.
pub struct Rope {
    /// Local ordinal -> arena index, covering the whole particle pool.
    solver_indices: Vec<u32>,
    active_particle_count: usize,
    pub elements: Vec<StructuralElement>,
    closed: bool,
    inter_particle_distance: f32,
    rest_length: f32,

    distance_batches: Vec<usize>,
    bending_batches: Vec<usize>,

    stretching_scale: f32,
    stretch_compliance: f32,
    max_compression: f32,
    bend_compliance: f32,
    max_bending: f32,
    plastic_yield: f32,
    plastic_creep: f32,

    pub tearing_enabled: bool,
    /// How much force a structural element withstands before tearing.
    pub tear_resistance_multiplier: f32,
    /// Maximum number of elements torn per substep.
    pub tear_rate: u32,

    self_collisions: bool,
    category: u32,

    distance_dirty: bool,
    bending_dirty: bool,

    torn_callback: Option<RopeTornCallback>,
    torn_candidates: Vec<usize>,
}

impl Rope {
    /// Bind a rope blueprint to a solver: reserves the full particle pool
    /// (active particles plus tearing headroom), creates the constraint
    /// batches and populates them from the initial element list.
    pub fn new(solver: &mut Solver, blueprint: &RopeBlueprint) -> Self {
        let particle_count = blueprint.particle_count();
        let pool = particle_count + blueprint.pool_capacity;
        let range = solver.particles.allocate(pool);
        let solver_indices: Vec<u32> = range.map(|i| i as u32).collect();

        for (local, &global) in solver_indices.iter().enumerate().take(particle_count) {
            let g = global as usize;
            solver.particles.position[g] = blueprint.positions[local];
            solver.particles.predicted[g] = blueprint.positions[local];
            solver.particles.rest_position[g] = blueprint.positions[local];
            solver.particles.velocity[g] = Vec3::ZERO;
            solver.particles.inv_mass[g] = blueprint.inv_masses[local];
            solver.particles.principal_radii[g] = Vec3::splat(blueprint.radii[local]);
            solver.particles.filter[g] = blueprint.filter;
        }

        // interleaved batches, plus loop-closing ones for closed ropes:
        let mut distance_batches = vec![solver.add_distance_batch(), solver.add_distance_batch()];
        let mut bending_batches = vec![
            solver.add_bending_batch(),
            solver.add_bending_batch(),
            solver.add_bending_batch(),
        ];
        if blueprint.closed {
            distance_batches.push(solver.add_distance_batch());
            bending_batches.push(solver.add_bending_batch());
            bending_batches.push(solver.add_bending_batch());
        }

        let mut elements = Vec::with_capacity(particle_count);
        let element_count = if blueprint.closed {
            particle_count
        } else {
            particle_count - 1
        };
        for i in 0..element_count {
            let a = solver_indices[i];
            let b = solver_indices[(i + 1) % particle_count];
            let rest = (blueprint.positions[(i + 1) % particle_count] - blueprint.positions[i])
                .length();
            elements.push(StructuralElement {
                particle1: a,
                particle2: b,
                rest_length: rest,
                constraint_force: 0.0,
                tear_resistance: 1.0,
            });
        }

        let mut rope = Self {
            solver_indices,
            active_particle_count: particle_count,
            elements,
            closed: blueprint.closed,
            inter_particle_distance: blueprint.inter_particle_distance,
            rest_length: 0.0,
            distance_batches,
            bending_batches,
            stretching_scale: 1.0,
            stretch_compliance: 0.0,
            max_compression: 0.0,
            bend_compliance: 0.0,
            max_bending: 0.025,
            plastic_yield: 0.0,
            plastic_creep: 0.0,
            tearing_enabled: false,
            tear_resistance_multiplier: 1000.0,
            tear_rate: 1,
            self_collisions: false,
            category: 1,
            distance_dirty: false,
            bending_dirty: false,
            torn_callback: None,
            torn_candidates: Vec::new(),
        };

        rope.rebuild_constraints_from_elements(solver);
        rope.recalculate_rest_length();
        rope
    }

    #[inline]
    pub fn active_particle_count(&self) -> usize {
        self.active_particle_count
    }

    #[inline]
    pub fn solver_indices(&self) -> &[u32] {
        &self.solver_indices
    }

    /// Average rest distance between consecutive particle centers.
    #[inline]
    pub fn inter_particle_distance(&self) -> f32 {
        self.inter_particle_distance
    }

    /// Rest length of the whole rope, sum of element rest lengths.
    #[inline]
    pub fn rest_length(&self) -> f32 {
        self.rest_length
    }

    /// Recompute the rest length from the current element list.
    pub fn recalculate_rest_length(&mut self) {
        self.rest_length = self.elements.iter().map(|e| e.rest_length).sum();
    }

    /// Register a callback fired synchronously whenever an element tears.
    pub fn on_torn(&mut self, callback: impl FnMut(&RopeTornEvent) + 'static) {
        self.torn_callback = Some(Box::new(callback));
    }

    // Tunables. Setters mark the affected constraint kind dirty; the data
    // is regenerated at the start of the next step, not immediately.

    pub fn stretching_scale(&self) -> f32 {
        self.stretching_scale
    }

    pub fn set_stretching_scale(&mut self, value: f32) {
        self.stretching_scale = value;
        self.distance_dirty = true;
    }

    pub fn stretch_compliance(&self) -> f32 {
        self.stretch_compliance
    }

    pub fn set_stretch_compliance(&mut self, value: f32) {
        self.stretch_compliance = value;
        self.distance_dirty = true;
    }

    pub fn max_compression(&self) -> f32 {
        self.max_compression
    }

    /// Compression slack, as a fraction of the scaled rest length.
    pub fn set_max_compression(&mut self, value: f32) {
        self.max_compression = value;
        self.distance_dirty = true;
    }

    pub fn bend_compliance(&self) -> f32 {
        self.bend_compliance
    }

    pub fn set_bend_compliance(&mut self, value: f32) {
        self.bend_compliance = value;
        self.bending_dirty = true;
    }

    pub fn max_bending(&self) -> f32 {
        self.max_bending
    }

    pub fn set_max_bending(&mut self, value: f32) {
        self.max_bending = value;
        self.bending_dirty = true;
    }

    pub fn plastic_yield(&self) -> f32 {
        self.plastic_yield
    }

    pub fn set_plastic_yield(&mut self, value: f32) {
        self.plastic_yield = value;
        self.bending_dirty = true;
    }

    pub fn plastic_creep(&self) -> f32 {
        self.plastic_creep
    }

    pub fn set_plastic_creep(&mut self, value: f32) {
        self.plastic_creep = value;
        self.bending_dirty = true;
    }

    pub fn self_collisions(&self) -> bool {
        self.self_collisions
    }

    /// Whether this rope's particles interact with others in its own
    /// collision category.
    pub fn set_self_collisions(&mut self, solver: &mut Solver, enabled: bool) {
        self.self_collisions = enabled;
        let mask = if enabled {
            0xffff
        } else {
            0xffff & !self.category
        };
        for &g in &self.solver_indices {
            solver.particles.filter[g as usize] = make_filter(self.category, mask);
        }
    }

    /// Rebuild the element list from the current constraint batches:
    /// un-interleave the two distance batches, then the loop-closing batch.
    pub fn rebuild_elements_from_constraints(&mut self, solver: &mut Solver) {
        if self.distance_batches.len() < 2 {
            return;
        }

        let (count0, count1) = {
            let b0 = match solver.distance_batch_mut(self.distance_batches[0]) {
                Some(b) => b.active_count(),
                None => return,
            };
            let b1 = match solver.distance_batch_mut(self.distance_batches[1]) {
                Some(b) => b.active_count(),
                None => return,
            };
            (b0, b1)
        };

        let constraint_count = count0 + count1;
        self.elements.clear();
        self.elements.reserve(constraint_count);

        for i in 0..constraint_count {
            let batch = match solver.distance_batch_mut(self.distance_batches[i % 2]) {
                Some(b) => b,
                None => return,
            };
            let c = i / 2;
            self.elements.push(StructuralElement {
                particle1: batch.particle_indices[c * 2],
                particle2: batch.particle_indices[c * 2 + 1],
                rest_length: batch.rest_lengths[c],
                constraint_force: 0.0,
                tear_resistance: 1.0,
            });
        }

        // loop-closing element:
        if self.distance_batches.len() > 2 {
            if let Some(batch) = solver.distance_batch_mut(self.distance_batches[2]) {
                if batch.active_count() > 0 {
                    self.elements.push(StructuralElement {
                        particle1: batch.particle_indices[0],
                        particle2: batch.particle_indices[1],
                        rest_length: batch.rest_lengths[0],
                        constraint_force: 0.0,
                        tear_resistance: 1.0,
                    });
                }
            }
        }
    }

    /// Regenerate every distance and bend constraint from the element
    /// list. O(elements); preserves batch disjointness by construction.
    pub fn rebuild_constraints_from_elements(&mut self, solver: &mut Solver) {
        for &id in &self.distance_batches {
            if let Some(batch) = solver.distance_batch_mut(id) {
                batch.deactivate_all();
            }
        }
        for &id in &self.bending_batches {
            if let Some(batch) = solver.bending_batch_mut(id) {
                batch.deactivate_all();
            }
        }

        let element_count = self.elements.len() - usize::from(self.closed);
        for i in 0..element_count {
            let e = self.elements[i];
            let rest = e.rest_length * self.stretching_scale;

            if let Some(batch) = solver.distance_batch_mut(self.distance_batches[i % 2]) {
                batch.activate(
                    e.particle1,
                    e.particle2,
                    rest,
                    self.stretch_compliance,
                    self.max_compression,
                );
            }

            // bend constraint only if there's continuity between elements:
            if i + 1 < element_count && e.particle2 == self.elements[i + 1].particle1 {
                let index_a = e.particle1 as usize;
                let index_b = self.elements[i + 1].particle2 as usize;
                let index_c = e.particle2 as usize;
                let rest_bend = rest_bending_constraint(
                    solver.particles.rest_position[index_a],
                    solver.particles.rest_position[index_b],
                    solver.particles.rest_position[index_c],
                );

                if let Some(batch) = solver.bending_batch_mut(self.bending_batches[i % 3]) {
                    batch.activate(
                        index_a as u32,
                        index_b as u32,
                        index_c as u32,
                        rest_bend,
                        self.max_bending,
                        self.bend_compliance,
                        self.plastic_yield,
                        self.plastic_creep,
                    );
                }
            }
        }

        // loop-closing constraints:
        if self.distance_batches.len() > 2 {
            let last = self.elements[self.elements.len() - 1];
            if let Some(batch) = solver.distance_batch_mut(self.distance_batches[2]) {
                batch.activate(
                    last.particle1,
                    last.particle2,
                    last.rest_length * self.stretching_scale,
                    self.stretch_compliance,
                    self.max_compression,
                );
            }
        }

        if self.bending_batches.len() > 4 && self.elements.len() > 2 {
            let last = self.elements[self.elements.len() - 2];
            let first = self.elements[0];

            let rest_bend_a = rest_bending_constraint(
                solver.particles.rest_position[last.particle1 as usize],
                solver.particles.rest_position[first.particle1 as usize],
                solver.particles.rest_position[last.particle2 as usize],
            );
            let rest_bend_b = rest_bending_constraint(
                solver.particles.rest_position[last.particle2 as usize],
                solver.particles.rest_position[first.particle2 as usize],
                solver.particles.rest_position[first.particle1 as usize],
            );

            if let Some(batch) = solver.bending_batch_mut(self.bending_batches[3]) {
                batch.activate(
                    last.particle1,
                    first.particle1,
                    last.particle2,
                    rest_bend_a,
                    self.max_bending,
                    self.bend_compliance,
                    self.plastic_yield,
                    self.plastic_creep,
                );
            }
            if let Some(batch) = solver.bending_batch_mut(self.bending_batches[4]) {
                batch.activate(
                    last.particle2,
                    first.particle2,
                    first.particle1,
                    rest_bend_b,
                    self.max_bending,
                    self.bend_compliance,
                    self.plastic_yield,
                    self.plastic_creep,
                );
            }
        }

        self.distance_dirty = false;
        self.bending_dirty = false;
    }

    /// Sample element forces from the distance constraint lambdas, tear the
    /// weakest candidates and rebuild constraints if anything tore.
    fn apply_tearing(&mut self, solver: &mut Solver, substep_time: f32) {
        if !self.tearing_enabled {
            return;
        }

        let sqr_time = substep_time * substep_time;

        self.torn_candidates.clear();

        for j in 0..2 {
            let batch = match solver.distance_batch_mut(self.distance_batches[j]) {
                Some(b) => b,
                None => return,
            };

            for i in 0..batch.active_count() {
                let element_index = j + 2 * i;

                // divide lambda by squared delta time to get force in newtons:
                let force = batch.lambdas[i] / sqr_time;
                self.elements[element_index].constraint_force = force;

                if -force > self.tear_resistance_multiplier {
                    self.torn_candidates.push(element_index);
                }
            }
        }

        if self.torn_candidates.is_empty() {
            return;
        }

        // tear the most stressed elements first:
        let mut candidates = std::mem::take(&mut self.torn_candidates);
        candidates.sort_by(|&a, &b| {
            self.elements[a]
                .constraint_force
                .total_cmp(&self.elements[b].constraint_force)
        });

        let mut torn_count = 0;
        for &index in &candidates {
            if self.tear(solver, index) {
                torn_count += 1;
            }
            if torn_count >= self.tear_rate {
                break;
            }
        }

        self.torn_candidates = candidates;

        if torn_count > 0 {
            self.rebuild_constraints_from_elements(solver);
        }
    }

    /// Tear the given element. Returns false without side effects when the
    /// particle pool is exhausted, the element's first particle is
    /// kinematic, or its predecessor was already split this substep.
    /// Callers must rebuild constraints afterwards.
    pub fn tear(&mut self, solver: &mut Solver, element_index: usize) -> bool {
        // no free particles left in the pool:
        if self.active_particle_count >= self.solver_indices.len() {
            return false;
        }

        let p1 = self.elements[element_index].particle1 as usize;

        // cannot split fixed particles:
        if solver.particles.inv_mass[p1] == 0.0 {
            return false;
        }

        // or particles that have already been split:
        if element_index > 0
            && self.elements[element_index - 1].particle2 != self.elements[element_index].particle1
        {
            return false;
        }

        let new_index = self.split_particle(solver, p1);
        self.elements[element_index].particle1 = new_index;

        let event = RopeTornEvent {
            element: self.elements[element_index],
            particle_index: new_index,
        };
        if let Some(mut callback) = self.torn_callback.take() {
            callback(&event);
            self.torn_callback = Some(callback);
        }

        true
    }

    /// Halve the particle's mass and clone it onto the next free pool slot.
    /// Returns the arena index of the clone.
    fn split_particle(&mut self, solver: &mut Solver, split_index: usize) -> u32 {
        solver.particles.inv_mass[split_index] *= 2.0;

        let new_global = self.solver_indices[self.active_particle_count] as usize;
        solver.particles.copy_particle(split_index, new_global);
        self.active_particle_count += 1;

        new_global as u32
    }
}

impl Actor for Rope {
    fn prepare_frame(&mut self, solver: &mut Solver) {
        if self.distance_dirty || self.bending_dirty {
            self.rebuild_constraints_from_elements(solver);
        }
    }

    fn substep(&mut self, solver: &mut Solver, substep_time: f32) {
        self.apply_tearing(solver, substep_time);
    }
}
