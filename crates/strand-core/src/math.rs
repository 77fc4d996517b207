use glam::{Mat3, Quat, Vec3};

/// Small-float floor added to solver denominators to keep degenerate
/// geometry (coincident particles, zero-length gradients) finite.
pub const EPSILON: f32 = 1e-8;

/// Smallest positive normal f32, used as a strict near-zero test.
pub const MIN_NORMAL: f32 = f32::MIN_POSITIVE;

/// Geometric rest-bend value for a 3-particle hinge: the distance from the
/// hinge particle `c` to the centroid of the triangle (a, b, c).
#[inline]
pub fn rest_bending_constraint(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let center = (a + b + c) / 3.0;
    (c - center).length()
}

/// Rest Darboux vector between two element frames: `qa^-1 * qb`,
/// sign-corrected so the result is the rotation closer to identity.
pub fn rest_darboux(qa: Quat, qb: Quat) -> Quat {
    let darboux = qa.conjugate() * qb;
    let omega_plus = Vec3::new(darboux.x, darboux.y, darboux.z).length_squared()
        + (darboux.w + 1.0) * (darboux.w + 1.0);
    let omega_minus = Vec3::new(darboux.x, darboux.y, darboux.z).length_squared()
        + (darboux.w - 1.0) * (darboux.w - 1.0);
    if omega_minus > omega_plus {
        Quat::from_xyzw(-darboux.x, -darboux.y, -darboux.z, -darboux.w)
    } else {
        darboux
    }
}

/// Closed-form eigen-decomposition of a symmetric 3x3 matrix.
///
/// Returns eigenvalues in descending order together with a matrix whose
/// columns are the matching (orthonormal) eigenvectors. Used by the fluid
/// anisotropy pass on the neighborhood covariance matrix.
pub fn eigen_solve(d: Mat3) -> (Vec3, Mat3) {
    let s = eigen_values(d);

    let (v0, v1, v2);
    if s.x - s.y > s.y - s.z {
        v0 = eigen_vector(d, s.x);
        if s.y - s.z < MIN_NORMAL {
            v2 = unit_orthogonal(v0);
        } else {
            let raw = eigen_vector(d, s.z);
            v2 = (raw - v0 * v0.dot(raw)).normalize();
        }
        v1 = v2.cross(v0);
    } else {
        v2 = eigen_vector(d, s.z);
        if s.x - s.y < MIN_NORMAL {
            v1 = unit_orthogonal(v2);
        } else {
            let raw = eigen_vector(d, s.y);
            v1 = (raw - v2 * v2.dot(raw)).normalize();
        }
        v0 = v1.cross(v2);
    }

    (s, Mat3::from_cols(v0, v1, v2))
}

/// Eigenvalues of a symmetric 3x3 matrix via the trigonometric solution of
/// the characteristic cubic. Returned in descending order.
fn eigen_values(d: Mat3) -> Vec3 {
    let one_third = 1.0 / 3.0;
    let one_sixth = 1.0 / 6.0;
    let three_sqrt = 3.0_f32.sqrt();

    let c0 = d.x_axis;
    let c1 = d.y_axis;
    let c2 = d.z_axis;

    let m = one_third * (c0.x + c1.y + c2.z);

    let k00 = c0.x - m;
    let k11 = c1.y - m;
    let k22 = c2.z - m;

    let k01s = c1.x * c1.x;
    let k02s = c2.x * c2.x;
    let k12s = c2.y * c2.y;

    let q = 0.5 * (k00 * (k11 * k22 - k12s) - k22 * k01s - k11 * k02s) + c1.x * c2.y * c0.z;
    let p = one_sixth * (k00 * k00 + k11 * k11 + k22 * k22 + 2.0 * (k01s + k02s + k12s));

    let p_sqrt = p.sqrt();

    let tmp = p * p * p - q * q;
    let phi = one_third * tmp.max(0.0).sqrt().atan2(q);
    let phi_c = phi.cos();
    let phi_s = phi.sin();
    let sqrt_p_c_phi = p_sqrt * phi_c;
    let sqrt_p_3_s_phi = p_sqrt * three_sqrt * phi_s;

    let mut e0 = m + 2.0 * sqrt_p_c_phi;
    let mut e1 = m - sqrt_p_c_phi - sqrt_p_3_s_phi;
    let mut e2 = m - sqrt_p_c_phi + sqrt_p_3_s_phi;

    if e0 > e1 {
        std::mem::swap(&mut e0, &mut e1);
    }
    if e0 > e2 {
        std::mem::swap(&mut e0, &mut e2);
    }
    if e1 > e2 {
        std::mem::swap(&mut e1, &mut e2);
    }

    Vec3::new(e2, e1, e0)
}

/// Eigenvector of a symmetric 3x3 matrix for a known eigenvalue, via the
/// cofactor matrix of `d - s*I` (largest-norm column wins).
fn eigen_vector(d: Mat3, s: f32) -> Vec3 {
    let mut c0 = d.x_axis;
    let mut c1 = d.y_axis;
    let mut c2 = d.z_axis;
    c0.x -= s;
    c1.y -= s;
    c2.z -= s;

    // Upper triangle of the cofactor matrix.
    let c0p = Vec3::new(c1.y * c2.z - c2.y * c2.y, 0.0, 0.0);
    let c1p = Vec3::new(c2.y * c2.x - c1.x * c2.z, c0.x * c2.z - c2.x * c2.x, 0.0);
    let c2p = Vec3::new(
        c1.x * c2.y - c1.y * c2.x,
        c1.x * c2.x - c0.x * c2.y,
        c0.x * c1.y - c1.x * c1.x,
    );

    let c01s = c1p.x * c1p.x;
    let c02s = c2p.x * c2p.x;
    let c12s = c2p.y * c2p.y;
    let norm = Vec3::new(
        c0p.x * c0p.x + c01s + c02s,
        c01s + c1p.y * c1p.y + c12s,
        c02s + c12s + c2p.z * c2p.z,
    );

    let index = if norm.x > norm.y && norm.x > norm.z {
        0
    } else if norm.y > norm.x && norm.y > norm.z {
        1
    } else {
        2
    };

    let largest = [norm.x, norm.y, norm.z][index];
    if largest < MIN_NORMAL {
        return Vec3::X;
    }

    let v = match index {
        0 => Vec3::new(c0p.x, c1p.x, c2p.x),
        1 => Vec3::new(c1p.x, c1p.y, c2p.y),
        _ => c2p,
    };
    v.normalize()
}

/// Any unit vector orthogonal to the input.
fn unit_orthogonal(input: Vec3) -> Vec3 {
    if !(input.x.abs() < input.z.abs() * EPSILON) || !(input.y.abs() < input.z.abs() * EPSILON) {
        let invnm = 1.0 / Vec3::new(input.x, input.y, 0.0).length();
        Vec3::new(-input.y * invnm, input.x * invnm, 0.0)
    } else {
        let invnm = 1.0 / Vec3::new(0.0, input.y, input.z).length();
        Vec3::new(0.0, -input.z * invnm, input.y * invnm)
    }
}

/// Convert a particle mass to an inverse mass, flooring tiny masses so the
/// result stays finite. A mass of `f32::INFINITY` yields 0 (kinematic).
#[inline]
pub fn mass_to_inv_mass(mass: f32) -> f32 {
    if mass.is_infinite() {
        0.0
    } else {
        1.0 / mass.max(1e-5)
    }
}
