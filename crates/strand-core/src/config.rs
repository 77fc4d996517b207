use glam::Vec3;

pub struct SolverConfig {
    /// Constraint iterations per substep for the position kinds.
    pub iterations: u32,
    pub gravity: Vec3,
    /// Ambient wind velocity, blended into fluid drag.
    pub wind: Vec3,
    /// Velocity damping factor in [0, 1], applied once per substep during
    /// integration (the effective per-step factor is `damping^substeps`).
    pub damping: f32,
    /// Successive over-relaxation factor applied when averaged corrections
    /// are folded back into predicted positions.
    pub sor_factor: f32,
    /// Maximum fluid ellipsoid aspect ratio; values <= 1 disable the
    /// anisotropy pass.
    pub max_anisotropy: f32,
    pub max_velocity: f32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            iterations: 3,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            wind: Vec3::ZERO,
            damping: 0.99,
            sor_factor: 1.0,
            max_anisotropy: 3.0,
            max_velocity: 18.0,
        }
    }
}
