// Minimal PRNG (no external crates).
//
// This is NOT cryptographically secure.
// It is used for encoder/intercept sampling, evaluation points and the
// randomized termination reset, all of which must be reproducible from a seed.

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: seed }
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    #[inline]
    pub fn next_f32_01(&mut self) -> f32 {
        // Convert to [0,1).
        let x = self.next_u32();
        (x as f32) / (u32::MAX as f32 + 1.0)
    }

    #[inline]
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32_01()
    }

    /// Standard normal sample (Box-Muller, one value per call).
    pub fn next_gaussian(&mut self) -> f32 {
        // Keep u1 away from 0 so ln() stays finite.
        let u1 = self.next_f32_01().max(f32::MIN_POSITIVE);
        let u2 = self.next_f32_01();
        (-2.0 * u1.ln()).sqrt() * (core::f32::consts::TAU * u2).cos()
    }

    /// Uniformly distributed unit vector.
    pub fn unit_vector(&mut self, dimension: usize) -> Vec<f32> {
        loop {
            let v: Vec<f32> = (0..dimension).map(|_| self.next_gaussian()).collect();
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 1e-6 {
                return v.into_iter().map(|x| x / norm).collect();
            }
        }
    }

    /// Uniformly distributed point inside the ball of the given radius.
    pub fn in_ball(&mut self, dimension: usize, radius: f32) -> Vec<f32> {
        let direction = self.unit_vector(dimension);
        let r = radius * self.next_f32_01().powf(1.0 / dimension.max(1) as f32);
        direction.into_iter().map(|x| x * r).collect()
    }
}
