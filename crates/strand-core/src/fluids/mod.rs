use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use std::f32::consts::PI;

/// Poly6 smoothing kernel for SPH density estimation.
///
/// Returns `W(r, h) = 315 / (64 * PI * h^9) * (h^2 - r^2)^3` when `r < h`,
/// and `0.0` when `r >= h`.
#[inline]
pub fn poly6_kernel(r: f32, h: f32) -> f32 {
    if r >= h {
        return 0.0;
    }
    let h2 = h * h;
    let r2 = r * r;
    let diff = h2 - r2;
    let h9 = h2 * h2 * h2 * h2 * h; // h^9
    let coeff = 315.0 / (64.0 * PI * h9);
    coeff * diff * diff * diff
}

/// Spiky kernel radial derivative for SPH pressure gradients.
///
/// Returns `dW/dr = -45 / (PI * h^6) * (h - r)^2` when `r < h`, and `0.0`
/// when `r >= h`. Negative inside the support: pressure pushes neighbors
/// apart along the pair direction.
#[inline]
pub fn spiky_gradient(r: f32, h: f32) -> f32 {
    if r >= h {
        return 0.0;
    }
    let h6 = h * h * h * h * h * h;
    let coeff = -45.0 / (PI * h6);
    let diff = h - r;
    coeff * diff * diff
}

/// One fluid neighbor pair, rebuilt from the spatial grid every substep.
///
/// Kernel values are averaged over both particles' smoothing radii so pairs
/// with mismatched radii stay symmetric.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FluidInteraction {
    /// Unit vector from particle B toward particle A.
    pub gradient: Vec3,
    /// Averaged poly6 kernel value at the pair distance.
    pub avg_kernel: f32,
    /// Averaged spiky kernel derivative at the pair distance.
    pub avg_gradient: f32,
    pub particle_a: u32,
    pub particle_b: u32,
}
