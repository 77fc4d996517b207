use glam::{Quat, Vec3};
use std::fmt;

use crate::math::mass_to_inv_mass;
use crate::particle::make_filter;

/// Errors detected while validating blueprint inputs. Construction is the
/// only place the crate returns errors; the solver hot loop never does.
#[derive(Debug, Clone, PartialEq)]
pub enum BlueprintError {
    /// The rope path needs at least two distinct points.
    PathTooShort,
    /// Thickness and resolution must be positive.
    InvalidSampling { thickness: f32, resolution: f32 },
    /// Particle mass must be positive (use `f32::INFINITY` for kinematic).
    InvalidMass(f32),
    /// A bone hierarchy needs at least two bones.
    HierarchyTooSmall,
    /// Parent list length must match the pose list length.
    MismatchedParents { poses: usize, parents: usize },
    /// Every non-root bone must reference an earlier bone as its parent.
    InvalidParent { bone: usize },
}

impl fmt::Display for BlueprintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlueprintError::PathTooShort => {
                write!(f, "rope path needs at least two distinct points")
            }
            BlueprintError::InvalidSampling {
                thickness,
                resolution,
            } => write!(
                f,
                "invalid sampling parameters: thickness {thickness}, resolution {resolution}"
            ),
            BlueprintError::InvalidMass(mass) => write!(f, "invalid particle mass {mass}"),
            BlueprintError::HierarchyTooSmall => {
                write!(f, "bone hierarchy needs at least two bones")
            }
            BlueprintError::MismatchedParents { poses, parents } => write!(
                f,
                "parent list length {parents} does not match pose count {poses}"
            ),
            BlueprintError::InvalidParent { bone } => {
                write!(f, "bone {bone} references an invalid parent")
            }
        }
    }
}

impl std::error::Error for BlueprintError {}

/// A piecewise-linear 1-D curve scaled by a multiplier, evaluated at a
/// normalized coordinate in [0, 1].
///
/// Actors bake curve values to per-particle scalars when constraints are
/// (re)generated, so the hot loop never interpolates; editing the curve or
/// the multiplier marks the owning constraint kind dirty instead.
#[derive(Clone, Debug)]
pub struct PropertyCurve {
    pub multiplier: f32,
    /// (coordinate, value) keys sorted by coordinate.
    keys: Vec<(f32, f32)>,
}

impl PropertyCurve {
    /// A flat curve: every coordinate evaluates to `multiplier`.
    pub fn constant(multiplier: f32) -> Self {
        Self {
            multiplier,
            keys: vec![(0.0, 1.0), (1.0, 1.0)],
        }
    }

    /// Build a curve from (coordinate, value) keys. Keys are sorted by
    /// coordinate; an empty list behaves like `constant`.
    pub fn from_keys(multiplier: f32, mut keys: Vec<(f32, f32)>) -> Self {
        if keys.is_empty() {
            keys = vec![(0.0, 1.0), (1.0, 1.0)];
        }
        keys.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { multiplier, keys }
    }

    /// Evaluate the curve at `t`, clamped to the key range, scaled by the
    /// multiplier.
    pub fn evaluate(&self, t: f32) -> f32 {
        let first = self.keys[0];
        let last = self.keys[self.keys.len() - 1];

        let raw = if t <= first.0 {
            first.1
        } else if t >= last.0 {
            last.1
        } else {
            let mut value = last.1;
            for w in self.keys.windows(2) {
                if t <= w[1].0 {
                    let span = w[1].0 - w[0].0;
                    let s = if span > 0.0 { (t - w[0].0) / span } else { 1.0 };
                    value = w[0].1 + (w[1].1 - w[0].1) * s;
                    break;
                }
            }
            value
        };

        raw * self.multiplier
    }

    /// Bake the curve at each of the given normalized coordinates.
    pub fn bake(&self, coords: &[f32]) -> Vec<f32> {
        coords.iter().map(|&t| self.evaluate(t)).collect()
    }
}

/// Rest-state description of a rope: particle positions sampled along a
/// path plus pool headroom for tearing.
pub struct RopeBlueprint {
    pub positions: Vec<Vec3>,
    pub inv_masses: Vec<f32>,
    pub radii: Vec<f32>,
    pub filter: u32,
    /// Extra inactive particle slots reserved for tearing.
    pub pool_capacity: usize,
    /// Rest distance between adjacent particles.
    pub inter_particle_distance: f32,
    pub closed: bool,
}

impl RopeBlueprint {
    /// Sample a polyline into rope particles.
    ///
    /// The particle spacing is `2 * thickness / resolution`; a path whose
    /// last point coincides with its first produces a closed loop. `mass`
    /// is per particle; `pool_capacity` extra slots are reserved so tearing
    /// can split particles without reallocating.
    pub fn from_path(
        path: &[Vec3],
        thickness: f32,
        resolution: f32,
        mass: f32,
        pool_capacity: usize,
    ) -> Result<Self, BlueprintError> {
        if thickness <= 0.0 || resolution <= 0.0 {
            return Err(BlueprintError::InvalidSampling {
                thickness,
                resolution,
            });
        }
        if !(mass > 0.0) {
            return Err(BlueprintError::InvalidMass(mass));
        }

        let closed = path.len() > 2 && (path[0] - path[path.len() - 1]).length() < 1e-6;
        let points = if closed { &path[..path.len() - 1] } else { path };
        if points.len() < 2 {
            return Err(BlueprintError::PathTooShort);
        }

        let mut length = 0.0;
        for w in points.windows(2) {
            length += (w[1] - w[0]).length();
        }
        if closed {
            length += (points[0] - points[points.len() - 1]).length();
        }
        if length < 1e-6 {
            return Err(BlueprintError::PathTooShort);
        }

        let spacing = 2.0 * thickness / resolution;
        let segments = (length / spacing).ceil().max(1.0) as usize;
        let particle_count = if closed { segments } else { segments + 1 };
        let actual_spacing = length / segments as f32;

        let mut positions = Vec::with_capacity(particle_count);
        for i in 0..particle_count {
            positions.push(sample_polyline(points, closed, actual_spacing * i as f32));
        }

        Ok(Self {
            positions,
            inv_masses: vec![mass_to_inv_mass(mass); particle_count],
            radii: vec![thickness; particle_count],
            filter: make_filter(1, 0xffff),
            pool_capacity,
            inter_particle_distance: actual_spacing,
            closed,
        })
    }

    #[inline]
    pub fn particle_count(&self) -> usize {
        self.positions.len()
    }
}

/// One bone transform, in simulation space. Used both for rest poses in a
/// blueprint and as the live pose feed an external animation system updates
/// every frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BonePose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl BonePose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }
}

/// Rest-state description of a bone hierarchy: one particle per bone,
/// parent links and the normalized arc-length coordinate used to evaluate
/// property curves.
pub struct BoneBlueprint {
    pub rest_poses: Vec<BonePose>,
    /// Parent bone index, `None` for roots. Parents always precede their
    /// children.
    pub parents: Vec<Option<usize>>,
    /// Arc-length distance from the root, normalized to [0, 1].
    pub normalized_lengths: Vec<f32>,
}

impl BoneBlueprint {
    /// Build a blueprint from rest poses and parent links.
    pub fn new(
        rest_poses: Vec<BonePose>,
        parents: Vec<Option<usize>>,
    ) -> Result<Self, BlueprintError> {
        if rest_poses.len() < 2 {
            return Err(BlueprintError::HierarchyTooSmall);
        }
        if parents.len() != rest_poses.len() {
            return Err(BlueprintError::MismatchedParents {
                poses: rest_poses.len(),
                parents: parents.len(),
            });
        }
        for (i, parent) in parents.iter().enumerate() {
            if let Some(p) = *parent {
                if p >= i {
                    return Err(BlueprintError::InvalidParent { bone: i });
                }
            }
        }

        // arc length from the root, accumulated down the hierarchy:
        let mut lengths = vec![0.0_f32; rest_poses.len()];
        let mut max_length = 0.0_f32;
        for i in 0..rest_poses.len() {
            if let Some(p) = parents[i] {
                lengths[i] = lengths[p]
                    + (rest_poses[i].position - rest_poses[p].position).length();
                max_length = max_length.max(lengths[i]);
            }
        }
        if max_length > 0.0 {
            for l in lengths.iter_mut() {
                *l /= max_length;
            }
        }

        Ok(Self {
            rest_poses,
            parents,
            normalized_lengths: lengths,
        })
    }

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.rest_poses.len()
    }
}

/// Walk a polyline (optionally closed) to the point at arc distance `d`.
fn sample_polyline(points: &[Vec3], closed: bool, d: f32) -> Vec3 {
    let mut remaining = d;
    let segment_count = if closed {
        points.len()
    } else {
        points.len() - 1
    };

    for s in 0..segment_count {
        let a = points[s];
        let b = points[(s + 1) % points.len()];
        let len = (b - a).length();
        if remaining <= len || s == segment_count - 1 {
            let t = if len > 0.0 {
                (remaining / len).clamp(0.0, 1.0)
            } else {
                0.0
            };
            return a.lerp(b, t);
        }
        remaining -= len;
    }

    points[points.len() - 1]
}
