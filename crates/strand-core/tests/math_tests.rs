use glam::{Mat3, Quat, Vec3};
use strand_core::math::*;
use strand_core::particle::{filters_collide, make_filter};

#[test]
fn test_eigen_solve_diagonal() {
    let d = Mat3::from_diagonal(Vec3::new(3.0, 1.0, 2.0));
    let (values, vectors) = eigen_solve(d);

    assert!((values.x - 3.0).abs() < 1e-4, "largest eigenvalue: {}", values.x);
    assert!((values.y - 2.0).abs() < 1e-4, "middle eigenvalue: {}", values.y);
    assert!((values.z - 1.0).abs() < 1e-4, "smallest eigenvalue: {}", values.z);

    // first eigenvector should align with the x axis:
    assert!(
        vectors.x_axis.dot(Vec3::X).abs() > 0.999,
        "eigenvector not axis aligned: {:?}",
        vectors.x_axis
    );
}

#[test]
fn test_eigen_solve_reconstruction() {
    let d = Mat3::from_cols(
        Vec3::new(2.0, 1.0, 0.0),
        Vec3::new(1.0, 2.0, 0.0),
        Vec3::new(0.0, 0.0, 1.0),
    );
    let (values, vectors) = eigen_solve(d);

    for (value, vector) in [
        (values.x, vectors.x_axis),
        (values.y, vectors.y_axis),
        (values.z, vectors.z_axis),
    ] {
        let residual = (d * vector - vector * value).length();
        assert!(
            residual < 1e-3,
            "d*v != s*v for s={}: residual {}",
            value,
            residual
        );
    }
}

#[test]
fn test_eigen_vectors_orthonormal() {
    let d = Mat3::from_cols(
        Vec3::new(4.0, 1.0, 0.5),
        Vec3::new(1.0, 3.0, 0.2),
        Vec3::new(0.5, 0.2, 2.0),
    );
    let (_, v) = eigen_solve(d);

    assert!((v.x_axis.length() - 1.0).abs() < 1e-4);
    assert!((v.y_axis.length() - 1.0).abs() < 1e-4);
    assert!((v.z_axis.length() - 1.0).abs() < 1e-4);
    assert!(v.x_axis.dot(v.y_axis).abs() < 1e-3);
    assert!(v.x_axis.dot(v.z_axis).abs() < 1e-3);
    assert!(v.y_axis.dot(v.z_axis).abs() < 1e-3);
}

#[test]
fn test_rest_bending_collinear_is_zero() {
    let value = rest_bending_constraint(
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(2.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
    );
    assert!(value.abs() < 1e-6, "collinear rest bend: {}", value);
}

#[test]
fn test_rest_bending_offset_hinge() {
    // hinge 1 unit above the midpoint: distance to the centroid is 2/3
    let value = rest_bending_constraint(
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(2.0, 0.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
    );
    assert!((value - 2.0 / 3.0).abs() < 1e-5, "offset rest bend: {}", value);
}

#[test]
fn test_rest_darboux_identical_frames() {
    let q = Quat::from_rotation_y(0.7);
    let darboux = rest_darboux(q, q);
    assert!((darboux.w - 1.0).abs() < 1e-5, "w: {}", darboux.w);
    assert!(darboux.x.abs() < 1e-5 && darboux.y.abs() < 1e-5 && darboux.z.abs() < 1e-5);
}

#[test]
fn test_rest_darboux_sign_corrected() {
    // -q represents the same rotation; the darboux vector should still be
    // the one closer to identity
    let q = Quat::from_rotation_x(0.3);
    let negated = Quat::from_xyzw(-q.x, -q.y, -q.z, -q.w);
    let darboux = rest_darboux(q, negated);
    assert!(darboux.w > 0.99, "sign correction failed: w = {}", darboux.w);
}

#[test]
fn test_mass_to_inv_mass() {
    assert_eq!(mass_to_inv_mass(f32::INFINITY), 0.0);
    assert!((mass_to_inv_mass(2.0) - 0.5).abs() < 1e-6);
    // tiny masses are floored, not infinite:
    assert!(mass_to_inv_mass(0.0).is_finite());
    assert!(mass_to_inv_mass(1e-20).is_finite());
}

#[test]
fn test_filters_default_collide() {
    let a = make_filter(1, 0xffff);
    let b = make_filter(2, 0xffff);
    assert!(filters_collide(a, b));
    assert!(filters_collide(a, a));
}

#[test]
fn test_filters_disjoint_masks() {
    // each only interacts with its own category:
    let a = make_filter(1, 1);
    let b = make_filter(2, 2);
    assert!(!filters_collide(a, b));
    assert!(filters_collide(a, a));
}

#[test]
fn test_filters_one_sided_mask_blocks() {
    // a would interact with b, but b's mask excludes a's category:
    let a = make_filter(1, 0xffff);
    let b = make_filter(2, 2);
    assert!(!filters_collide(a, b));
}
