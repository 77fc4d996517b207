use glam::Vec3;
use strand_core::fluids::FluidInteraction;
use strand_core::grid::SpatialHashGrid;
use strand_core::particle::make_filter;

#[test]
fn test_grid_build_and_query() {
    let positions = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(0.5, 0.0, 0.0),
        Vec3::new(10.0, 10.0, 10.0),
    ];

    let mut grid = SpatialHashGrid::new(1.0, 1024);
    grid.build(&positions, positions.len());

    let mut found = Vec::new();
    grid.query_neighbors(Vec3::ZERO, |i| found.push(i));

    assert!(found.contains(&0), "did not find particle 0: {:?}", found);
    assert!(found.contains(&1), "did not find particle 1: {:?}", found);
}

#[test]
fn test_query_covers_adjacent_cells() {
    // neighbors one cell over must be visible from the 3x3x3 query
    let positions = vec![Vec3::new(0.95, 0.0, 0.0), Vec3::new(1.05, 0.0, 0.0)];

    let mut grid = SpatialHashGrid::new(1.0, 1024);
    grid.build(&positions, positions.len());

    let mut found = Vec::new();
    grid.query_neighbors(positions[0], |i| found.push(i));
    assert!(found.contains(&1), "cross-cell neighbor missed: {:?}", found);
}

#[test]
fn test_collect_pairs_dedup() {
    let positions = vec![Vec3::ZERO, Vec3::new(0.05, 0.0, 0.0)];
    let smoothing = vec![0.1, 0.1];
    let filter = vec![make_filter(1, 0xffff); 2];
    let fluid = vec![0u32, 1u32];

    let mut grid = SpatialHashGrid::new(0.1, 1024);
    grid.build(&positions, positions.len());

    let mut pairs: Vec<FluidInteraction> = Vec::new();
    grid.collect_pairs(&positions, &smoothing, &filter, &fluid, &mut pairs);

    assert_eq!(pairs.len(), 1, "expected exactly one pair");
    assert!(pairs[0].particle_a < pairs[0].particle_b);
}

#[test]
fn test_collect_pairs_respects_range() {
    let positions = vec![Vec3::ZERO, Vec3::new(0.2, 0.0, 0.0)];
    let smoothing = vec![0.1, 0.1];
    let filter = vec![make_filter(1, 0xffff); 2];
    let fluid = vec![0u32, 1u32];

    let mut grid = SpatialHashGrid::new(0.1, 1024);
    grid.build(&positions, positions.len());

    let mut pairs: Vec<FluidInteraction> = Vec::new();
    grid.collect_pairs(&positions, &smoothing, &filter, &fluid, &mut pairs);

    assert!(pairs.is_empty(), "out-of-range pair emitted");
}

#[test]
fn test_collect_pairs_respects_filters() {
    let positions = vec![Vec3::ZERO, Vec3::new(0.05, 0.0, 0.0)];
    let smoothing = vec![0.1, 0.1];
    // categories 1 and 2, each masked to itself only:
    let filter = vec![make_filter(1, 1), make_filter(2, 2)];
    let fluid = vec![0u32, 1u32];

    let mut grid = SpatialHashGrid::new(0.1, 1024);
    grid.build(&positions, positions.len());

    let mut pairs: Vec<FluidInteraction> = Vec::new();
    grid.collect_pairs(&positions, &smoothing, &filter, &fluid, &mut pairs);

    assert!(pairs.is_empty(), "filtered pair emitted");
}

#[test]
fn test_collect_pairs_skips_non_fluid() {
    // particle 1 has no smoothing radius, so no pair forms
    let positions = vec![Vec3::ZERO, Vec3::new(0.05, 0.0, 0.0)];
    let smoothing = vec![0.1, 0.0];
    let filter = vec![make_filter(1, 0xffff); 2];
    let fluid = vec![0u32];

    let mut grid = SpatialHashGrid::new(0.1, 1024);
    grid.build(&positions, positions.len());

    let mut pairs: Vec<FluidInteraction> = Vec::new();
    grid.collect_pairs(&positions, &smoothing, &filter, &fluid, &mut pairs);

    assert!(pairs.is_empty());
}
