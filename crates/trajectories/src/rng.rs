/// PCG-RXS-M-XS 32-bit hash, shared with `trajectories.wgsl`.
pub fn pcg_hash(value: u32) -> u32 {
    let state = value.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Seed of one path. Depends only on the release texel, the path index and
/// the run seed, so the order in which release cells are compacted does not
/// change the result.
pub fn path_seed(release_x: u32, release_y: u32, path_index: u32, run_seed: u32) -> u32 {
    pcg_hash(release_x ^ pcg_hash(release_y ^ pcg_hash(path_index ^ pcg_hash(run_seed))))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathRng {
    state: u32,
}

impl PathRng {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = pcg_hash(self.state);
        self.state
    }

    /// Uniform in `[0, 1)` from the top 24 bits, exact in `f32`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / 16_777_216.0
    }
}
