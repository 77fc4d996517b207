use glam::{Quat, Vec3};

use crate::actor::Actor;
use crate::blueprint::{BoneBlueprint, BonePose, PropertyCurve};
use crate::math::{mass_to_inv_mass, rest_darboux};
use crate::particle::make_filter;
use crate::solver::Solver;

/// Per-bone property curves, evaluated over the normalized arc-length
/// coordinate of each bone and baked to per-particle scalars whenever the
/// hierarchy data is regenerated.
pub struct BoneCurves {
    pub radius: PropertyCurve,
    pub mass: PropertyCurve,
    pub rotational_mass: PropertyCurve,
    pub skin_compliance: PropertyCurve,
    pub skin_radius: PropertyCurve,
    pub stretch_compliance: PropertyCurve,
    pub shear1_compliance: PropertyCurve,
    pub shear2_compliance: PropertyCurve,
    pub bend1_compliance: PropertyCurve,
    pub bend2_compliance: PropertyCurve,
    pub torsion_compliance: PropertyCurve,
    pub plastic_yield: PropertyCurve,
    pub plastic_creep: PropertyCurve,
}

impl Default for BoneCurves {
    fn default() -> Self {
        Self {
            radius: PropertyCurve::constant(0.1),
            mass: PropertyCurve::constant(1.0),
            rotational_mass: PropertyCurve::constant(1.0),
            skin_compliance: PropertyCurve::constant(1.0),
            skin_radius: PropertyCurve::constant(0.1),
            stretch_compliance: PropertyCurve::constant(0.0),
            shear1_compliance: PropertyCurve::constant(0.0),
            shear2_compliance: PropertyCurve::constant(0.0),
            bend1_compliance: PropertyCurve::constant(0.0),
            bend2_compliance: PropertyCurve::constant(0.0),
            torsion_compliance: PropertyCurve::constant(0.0),
            plastic_yield: PropertyCurve::constant(0.0),
            plastic_creep: PropertyCurve::constant(0.0),
        }
    }
}

/// Slot bookkeeping for one hierarchy edge: which batch (index into the
/// actor's batch id list) and which slot within it hold the edge's
/// constraint.
#[derive(Clone, Copy)]
struct EdgeSlot {
    batch: usize,
    slot: usize,
}

/// A simulated bone hierarchy actor.
///
/// One particle per bone. An external animation system writes the target
/// skeleton pose into the actor's pose buffer every frame; the actor turns
/// it into skin attachment targets and rest shapes for the rod constraints
/// at the start of each step, and writes the simulated transforms back into
/// the buffer at the end. Edges are colored greedily into batches so no
/// batch holds two constraints touching the same bone.
pub struct Bone {
    solver_indices: Vec<u32>,
    parents: Vec<Option<usize>>,
    rest_poses: Vec<BonePose>,
    normalized_lengths: Vec<f32>,
    /// Live pose feed, in simulation space. Written by the animation
    /// system before stepping and by the actor after stepping.
    poses: Vec<BonePose>,

    /// Hierarchy edges as (parent, child) bone indices, parents first.
    edges: Vec<(usize, usize)>,
    rest_edge_lengths: Vec<f32>,

    skin_batch: usize,
    stretch_shear_batches: Vec<usize>,
    bend_twist_batches: Vec<usize>,
    stretch_slots: Vec<EdgeSlot>,
    bend_slots: Vec<EdgeSlot>,

    curves: BoneCurves,
    baked_inv_mass: Vec<f32>,
    baked_inv_rotational_mass: Vec<f32>,
    baked_skin_radius: Vec<f32>,
    baked_skin_compliance: Vec<f32>,

    /// Pin root bones to the animated pose instead of simulating them.
    pub fix_root: bool,
    /// Write simulated positions back verbatim; when false, bone lengths
    /// are preserved on write-back and only directions follow the
    /// simulation.
    pub stretch_bones: bool,

    dirty: bool,
}

impl Bone {
    /// Bind a bone hierarchy blueprint to a solver.
    pub fn new(solver: &mut Solver, blueprint: &BoneBlueprint) -> Self {
        let bone_count = blueprint.bone_count();
        let range = solver.particles.allocate(bone_count);
        let solver_indices: Vec<u32> = range.map(|i| i as u32).collect();

        let mut edges = Vec::with_capacity(bone_count.saturating_sub(1));
        let mut rest_edge_lengths = Vec::with_capacity(edges.capacity());
        for (child, parent) in blueprint.parents.iter().enumerate() {
            if let Some(p) = *parent {
                edges.push((p, child));
                rest_edge_lengths.push(
                    (blueprint.rest_poses[child].position - blueprint.rest_poses[p].position)
                        .length(),
                );
            }
        }

        let skin_batch = solver.add_skin_batch();

        let mut bone = Self {
            solver_indices,
            parents: blueprint.parents.clone(),
            rest_poses: blueprint.rest_poses.clone(),
            normalized_lengths: blueprint.normalized_lengths.clone(),
            poses: blueprint.rest_poses.clone(),
            edges,
            rest_edge_lengths,
            skin_batch,
            stretch_shear_batches: Vec::new(),
            bend_twist_batches: Vec::new(),
            stretch_slots: Vec::new(),
            bend_slots: Vec::new(),
            curves: BoneCurves::default(),
            baked_inv_mass: Vec::new(),
            baked_inv_rotational_mass: Vec::new(),
            baked_skin_radius: Vec::new(),
            baked_skin_compliance: Vec::new(),
            fix_root: true,
            stretch_bones: true,
            dirty: false,
        };

        bone.bake_and_rebuild(solver);
        bone.reset_to_current_shape(solver);
        bone
    }

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.solver_indices.len()
    }

    #[inline]
    pub fn solver_indices(&self) -> &[u32] {
        &self.solver_indices
    }

    pub fn curves(&self) -> &BoneCurves {
        &self.curves
    }

    /// Mutable access to the property curves; marks the hierarchy data
    /// dirty, so it is re-baked at the start of the next step.
    pub fn curves_mut(&mut self) -> &mut BoneCurves {
        self.dirty = true;
        &mut self.curves
    }

    /// Current pose of one bone, as last written back by the simulation.
    pub fn pose(&self, bone: usize) -> BonePose {
        self.poses[bone]
    }

    /// Feed the animated target pose for one bone.
    pub fn set_pose(&mut self, bone: usize, pose: BonePose) {
        self.poses[bone] = pose;
    }

    /// Mutable access to the whole pose buffer.
    pub fn poses_mut(&mut self) -> &mut [BonePose] {
        &mut self.poses
    }

    /// Snap particles to the live pose feed and zero their velocities.
    pub fn reset_to_current_shape(&mut self, solver: &mut Solver) {
        for (bone, &g) in self.solver_indices.iter().enumerate() {
            let g = g as usize;
            solver.particles.position[g] = self.poses[bone].position;
            solver.particles.predicted[g] = self.poses[bone].position;
            solver.particles.orientation[g] = self.poses[bone].rotation;
            solver.particles.predicted_orientation[g] = self.poses[bone].rotation;
            solver.particles.velocity[g] = Vec3::ZERO;
            solver.particles.angular_velocity[g] = Vec3::ZERO;
        }
    }

    /// Bake every curve at the bones' normalized coordinates, write particle
    /// state and regenerate all three constraint kinds.
    fn bake_and_rebuild(&mut self, solver: &mut Solver) {
        let coords = &self.normalized_lengths;

        let radii = self.curves.radius.bake(coords);
        let masses = self.curves.mass.bake(coords);
        let rotational_masses = self.curves.rotational_mass.bake(coords);
        self.baked_skin_radius = self.curves.skin_radius.bake(coords);
        self.baked_skin_compliance = self.curves.skin_compliance.bake(coords);

        self.baked_inv_mass = masses.iter().map(|&m| mass_to_inv_mass(m)).collect();
        self.baked_inv_rotational_mass = rotational_masses
            .iter()
            .map(|&m| mass_to_inv_mass(m))
            .collect();

        for (bone, &g) in self.solver_indices.iter().enumerate() {
            let g = g as usize;
            let root = self.parents[bone].is_none();
            let pinned = root && self.fix_root;

            solver.particles.inv_mass[g] = if pinned {
                0.0
            } else {
                self.baked_inv_mass[bone]
            };
            solver.particles.inv_rotational_mass[g] = if pinned {
                0.0
            } else {
                self.baked_inv_rotational_mass[bone]
            };
            solver.particles.principal_radii[g] = Vec3::splat(radii[bone]);
            solver.particles.rest_position[g] = self.rest_poses[bone].position;
            solver.particles.rest_orientation[g] = self.rest_poses[bone].rotation;
            solver.particles.filter[g] = make_filter(2, 0xffff);
        }

        self.rebuild_constraints(solver);
        self.dirty = false;
    }

    /// Regenerate skin, stretch-shear and bend-twist constraints from the
    /// hierarchy. Edges are assigned to the first batch not already using
    /// one of their bones, creating batches on demand.
    fn rebuild_constraints(&mut self, solver: &mut Solver) {
        if let Some(batch) = solver.skin_batch_mut(self.skin_batch) {
            batch.deactivate_all();
            for bone in 0..self.bone_count() {
                batch.activate(
                    self.solver_indices[bone],
                    self.poses[bone].position,
                    self.skin_normal(bone),
                    Vec3::new(self.baked_skin_radius[bone], 0.0, 0.0),
                    self.baked_skin_compliance[bone],
                );
            }
        }

        for &id in &self.stretch_shear_batches {
            if let Some(batch) = solver.stretch_shear_batch_mut(id) {
                batch.deactivate_all();
            }
        }
        for &id in &self.bend_twist_batches {
            if let Some(batch) = solver.bend_twist_batch_mut(id) {
                batch.deactivate_all();
            }
        }

        self.stretch_slots.clear();
        self.bend_slots.clear();
        let mut stretch_used: Vec<Vec<usize>> = vec![Vec::new(); self.stretch_shear_batches.len()];
        let mut bend_used: Vec<Vec<usize>> = vec![Vec::new(); self.bend_twist_batches.len()];

        for (edge, &(parent, child)) in self.edges.iter().enumerate() {
            let coord = self.normalized_lengths[child];
            let pg = self.solver_indices[parent];
            let cg = self.solver_indices[child];

            let rest_dir =
                direction_or_z(self.rest_poses[child].position - self.rest_poses[parent].position);
            let rest_orientation = self.rest_poses[parent].rotation.conjugate()
                * Quat::from_rotation_arc(Vec3::Z, rest_dir);

            let batch_index = color_edge(&mut stretch_used, parent, child);
            while batch_index >= self.stretch_shear_batches.len() {
                self.stretch_shear_batches.push(solver.add_stretch_shear_batch());
            }
            if let Some(batch) =
                solver.stretch_shear_batch_mut(self.stretch_shear_batches[batch_index])
            {
                let slot = batch.activate(
                    pg,
                    cg,
                    pg,
                    self.rest_edge_lengths[edge],
                    rest_orientation,
                    Vec3::new(
                        self.curves.shear1_compliance.evaluate(coord),
                        self.curves.shear2_compliance.evaluate(coord),
                        self.curves.stretch_compliance.evaluate(coord),
                    ),
                );
                self.stretch_slots.push(EdgeSlot {
                    batch: batch_index,
                    slot,
                });
            }

            let batch_index = color_edge(&mut bend_used, parent, child);
            while batch_index >= self.bend_twist_batches.len() {
                self.bend_twist_batches.push(solver.add_bend_twist_batch());
            }
            if let Some(batch) = solver.bend_twist_batch_mut(self.bend_twist_batches[batch_index])
            {
                let slot = batch.activate(
                    pg,
                    cg,
                    rest_darboux(
                        self.rest_poses[parent].rotation,
                        self.rest_poses[child].rotation,
                    ),
                    Vec3::new(
                        self.curves.bend1_compliance.evaluate(coord),
                        self.curves.bend2_compliance.evaluate(coord),
                        self.curves.torsion_compliance.evaluate(coord),
                    ),
                    self.curves.plastic_yield.evaluate(coord),
                    self.curves.plastic_creep.evaluate(coord),
                );
                self.bend_slots.push(EdgeSlot {
                    batch: batch_index,
                    slot,
                });
            }
        }
    }

    /// Refresh skin targets and constraint rest shapes from the live pose
    /// feed, so the simulation tracks the animation instead of the bind
    /// pose.
    fn update_rest_shape(&mut self, solver: &mut Solver) {
        if let Some(batch) = solver.skin_batch_mut(self.skin_batch) {
            for bone in 0..self.bone_count().min(batch.active_count()) {
                batch.points[bone] = self.poses[bone].position;
            }
        }
        // normals need &self, so a second pass:
        for bone in 0..self.bone_count() {
            let normal = self.skin_normal(bone);
            if let Some(batch) = solver.skin_batch_mut(self.skin_batch) {
                if bone < batch.active_count() {
                    batch.normals[bone] = normal;
                }
            }
        }

        for (edge, &(parent, child)) in self.edges.iter().enumerate() {
            let edge_vector = self.poses[child].position - self.poses[parent].position;
            let rest_orientation = self.poses[parent].rotation.conjugate()
                * Quat::from_rotation_arc(Vec3::Z, direction_or_z(edge_vector));
            let darboux = rest_darboux(self.poses[parent].rotation, self.poses[child].rotation);

            let s = self.stretch_slots[edge];
            if let Some(batch) = solver.stretch_shear_batch_mut(self.stretch_shear_batches[s.batch])
            {
                batch.rest_lengths[s.slot] = edge_vector.length();
                batch.rest_orientations[s.slot] = rest_orientation;
            }

            let s = self.bend_slots[edge];
            if let Some(batch) = solver.bend_twist_batch_mut(self.bend_twist_batches[s.batch]) {
                batch.rest_darboux[s.slot] = darboux;
            }
        }
    }

    /// Skin surface normal at a bone: along the bone direction for
    /// children, along the pose frame's third axis for roots.
    fn skin_normal(&self, bone: usize) -> Vec3 {
        match self.parents[bone] {
            Some(p) => {
                (self.poses[bone].position - self.poses[p].position).normalize_or_zero()
            }
            None => self.poses[bone].rotation * Vec3::Z,
        }
    }

    /// Pin root bones to the animated pose.
    fn apply_fixed_roots(&mut self, solver: &mut Solver) {
        for (bone, &g) in self.solver_indices.iter().enumerate() {
            if self.parents[bone].is_some() {
                continue;
            }
            let g = g as usize;
            if self.fix_root {
                solver.particles.inv_mass[g] = 0.0;
                solver.particles.inv_rotational_mass[g] = 0.0;
                solver.particles.position[g] = self.poses[bone].position;
                solver.particles.orientation[g] = self.poses[bone].rotation;
                solver.particles.velocity[g] = Vec3::ZERO;
                solver.particles.angular_velocity[g] = Vec3::ZERO;
            } else {
                solver.particles.inv_mass[g] = self.baked_inv_mass[bone];
                solver.particles.inv_rotational_mass[g] = self.baked_inv_rotational_mass[bone];
            }
        }
    }

    /// Write the simulated particle transforms back into the pose buffer.
    fn write_back_poses(&mut self, solver: &Solver) {
        for bone in 0..self.bone_count() {
            let g = self.solver_indices[bone] as usize;
            self.poses[bone].rotation = solver.particles.orientation[g];
            self.poses[bone].position = solver.particles.position[g];
        }

        if !self.stretch_bones {
            // preserve bone lengths, keeping only simulated directions:
            for (edge, &(parent, child)) in self.edges.iter().enumerate() {
                let dir = (self.poses[child].position - self.poses[parent].position)
                    .normalize_or_zero();
                self.poses[child].position =
                    self.poses[parent].position + dir * self.rest_edge_lengths[edge];
            }
        }
    }
}

/// Unit direction of `v`, or +z when the vector is degenerate.
#[inline]
fn direction_or_z(v: Vec3) -> Vec3 {
    let dir = v.normalize_or_zero();
    if dir == Vec3::ZERO {
        Vec3::Z
    } else {
        dir
    }
}

/// First batch index whose used-bone list is disjoint from {parent, child},
/// registering the bones with it. May return one past the end, meaning a
/// new batch is needed.
fn color_edge(used: &mut Vec<Vec<usize>>, parent: usize, child: usize) -> usize {
    for (i, bones) in used.iter_mut().enumerate() {
        if !bones.contains(&parent) && !bones.contains(&child) {
            bones.push(parent);
            bones.push(child);
            return i;
        }
    }
    used.push(vec![parent, child]);
    used.len() - 1
}

impl Actor for Bone {
    fn prepare_frame(&mut self, solver: &mut Solver) {
        if self.dirty {
            self.bake_and_rebuild(solver);
        }
    }

    fn begin_step(&mut self, solver: &mut Solver, _step_time: f32, _substeps: u32) {
        self.apply_fixed_roots(solver);
        self.update_rest_shape(solver);
    }

    fn end_step(&mut self, solver: &mut Solver, _substep_time: f32) {
        self.write_back_poses(solver);
    }
}
