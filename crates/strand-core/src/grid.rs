use glam::Vec3;

use crate::fluids::FluidInteraction;
use crate::particle::filters_collide;

/// Uniform spatial hash grid for O(1) neighbor queries.
///
/// Uses counting sort for O(N) construction: count particles per cell ->
/// prefix sum -> scatter.
pub struct SpatialHashGrid {
    cell_size: f32,
    inv_cell_size: f32,
    table_size: usize,
    /// Count array (reused): cell_count[hash] = number of particles in cell
    cell_count: Vec<u32>,
    /// Prefix sum: cell_start[hash] = index where particles for this cell begin in sorted_indices
    cell_start: Vec<u32>,
    /// Particle indices sorted by cell hash
    sorted_indices: Vec<u32>,
    /// Cell hash per particle (used during build)
    particle_hashes: Vec<u32>,
}

impl SpatialHashGrid {
    /// Create a grid with the given cell size. cell_size should be >= the
    /// largest smoothing radius so a 3x3x3 neighborhood covers the support.
    pub fn new(cell_size: f32, table_size: usize) -> Self {
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            table_size,
            cell_count: vec![0u32; table_size],
            cell_start: vec![0u32; table_size],
            sorted_indices: Vec::new(),
            particle_hashes: Vec::new(),
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Change the cell size; takes effect on the next build.
    pub fn set_cell_size(&mut self, cell_size: f32) {
        self.cell_size = cell_size;
        self.inv_cell_size = 1.0 / cell_size;
    }

    /// Build the grid from current positions. O(N) using counting sort.
    pub fn build(&mut self, positions: &[Vec3], count: usize) {
        self.sorted_indices.resize(count, 0);
        self.particle_hashes.resize(count, 0);

        // 1. Clear cell_count
        for v in self.cell_count.iter_mut() {
            *v = 0;
        }

        // 2. For each particle, compute cell hash, store it, and increment count
        for i in 0..count {
            let (cx, cy, cz) = self.cell_coords(positions[i]);
            let h = self.hash_cell(cx, cy, cz);
            self.particle_hashes[i] = h as u32;
            self.cell_count[h] += 1;
        }

        // 3. Prefix sum on cell_count -> cell_start
        self.cell_start[0] = 0;
        for k in 1..self.table_size {
            self.cell_start[k] = self.cell_start[k - 1] + self.cell_count[k - 1];
        }

        // 4. Reset cell_count to 0 (reuse for scatter offsets)
        for v in self.cell_count.iter_mut() {
            *v = 0;
        }

        // 5. Scatter particles into sorted_indices
        for i in 0..count {
            let h = self.particle_hashes[i] as usize;
            let idx = self.cell_start[h] + self.cell_count[h];
            self.sorted_indices[idx as usize] = i as u32;
            self.cell_count[h] += 1;
        }
    }

    /// Query all neighbors within the given position's cell and its 26
    /// neighbors (3x3x3). Calls `callback(particle_index)` for each particle
    /// found in those cells. The caller is responsible for distance checks.
    pub fn query_neighbors<F: FnMut(u32)>(&self, pos: Vec3, mut callback: F) {
        let (cx, cy, cz) = self.cell_coords(pos);
        for dx in -1..=1_i32 {
            for dy in -1..=1_i32 {
                for dz in -1..=1_i32 {
                    let h = self.hash_cell(cx + dx, cy + dy, cz + dz);
                    let start = self.cell_start[h] as usize;
                    let end = start + self.cell_count[h] as usize;
                    for idx in start..end {
                        callback(self.sorted_indices[idx]);
                    }
                }
            }
        }
    }

    /// Collect the deduplicated fluid neighbor pairs for this substep.
    ///
    /// A pair (a, b) with a < b is emitted when both particles are fluid
    /// (positive smoothing radius), their collision filters interact, and
    /// they sit within the larger of the two smoothing radii. Kernel values
    /// are left zeroed; the density pipeline fills them from predicted
    /// positions.
    pub fn collect_pairs(
        &self,
        positions: &[Vec3],
        smoothing_radius: &[f32],
        filter: &[u32],
        fluid: &[u32],
        pairs: &mut Vec<FluidInteraction>,
    ) {
        pairs.clear();
        for &a in fluid {
            let i = a as usize;
            let pos_i = positions[i];
            let h_i = smoothing_radius[i];
            self.query_neighbors(pos_i, |b| {
                let j = b as usize;
                if j <= i {
                    return;
                }
                let h_j = smoothing_radius[j];
                if h_j <= 0.0 {
                    return;
                }
                if !filters_collide(filter[i], filter[j]) {
                    return;
                }
                let range = h_i.max(h_j);
                if (pos_i - positions[j]).length_squared() < range * range {
                    pairs.push(FluidInteraction {
                        gradient: Vec3::ZERO,
                        avg_kernel: 0.0,
                        avg_gradient: 0.0,
                        particle_a: a,
                        particle_b: b,
                    });
                }
            });
        }
    }

    /// Hash function: cell coords -> table index
    #[inline]
    fn hash_cell(&self, cx: i32, cy: i32, cz: i32) -> usize {
        let h = (cx as u32)
            .wrapping_mul(73856093)
            ^ (cy as u32).wrapping_mul(19349663)
            ^ (cz as u32).wrapping_mul(83492791);
        (h as usize) % self.table_size
    }

    /// Convert world position to cell coordinates
    #[inline]
    fn cell_coords(&self, pos: Vec3) -> (i32, i32, i32) {
        (
            (pos.x * self.inv_cell_size).floor() as i32,
            (pos.y * self.inv_cell_size).floor() as i32,
            (pos.z * self.inv_cell_size).floor() as i32,
        )
    }
}
