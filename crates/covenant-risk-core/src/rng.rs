use rand::Rng;

const LCG_MULTIPLIER: u64 = 1_103_515_245;
const LCG_INCREMENT: u64 = 12_345;
/// 2^31; the state never leaves [0, 2^31).
const LCG_MODULUS: u64 = 1 << 31;

/// Deterministic random source for a single simulation run.
///
/// Owns a 31-bit linear-congruential state. The same seed and call sequence
/// produce a bit-identical stream of draws; that determinism is a hard
/// contract relied on by regression tests and reproducible runs. The
/// generator is an explicitly owned value passed into every sampling call,
/// never process-wide state.
#[derive(Debug, Clone)]
pub struct SimulationRng {
    state: u64,
    seed: u64,
}

impl SimulationRng {
    /// Seeds the generator. Seeds at or above 2^31 are reduced into the
    /// 31-bit state space, so `seed` and `seed + 2^31` yield the same stream.
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed % LCG_MODULUS,
            seed,
        }
    }

    /// Seeds from OS entropy, for callers that did not pin a seed.
    pub fn from_entropy() -> Self {
        Self::new(rand::thread_rng().gen())
    }

    /// The seed this generator was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Next uniform draw in [0, 1].
    pub fn uniform(&mut self) -> f64 {
        self.state = (self.state * LCG_MULTIPLIER + LCG_INCREMENT) % LCG_MODULUS;
        self.state as f64 / (LCG_MODULUS - 1) as f64
    }

    /// Uniform draw in [min, max].
    pub fn uniform_range(&mut self, min: f64, max: f64) -> f64 {
        min + self.uniform() * (max - min)
    }

    /// Normal draw via the Box–Muller transform (two uniforms per draw).
    ///
    /// A zero first uniform is substituted with the smallest positive double
    /// before the log; the substitution is itself deterministic.
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let mut u1 = self.uniform();
        let u2 = self.uniform();
        if u1 <= 0.0 {
            u1 = f64::MIN_POSITIVE;
        }
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    /// Triangular draw via inverse-CDF sampling with breakpoint
    /// `fc = (mode - min) / (max - min)`. Requires `min < max` and
    /// `min <= mode <= max`; configuration validation enforces both.
    pub fn triangular(&mut self, min: f64, max: f64, mode: f64) -> f64 {
        let u = self.uniform();
        triangular_inverse_cdf(u, min, max, mode)
    }

    /// Lognormal draw parameterised by the target arithmetic mean and
    /// standard deviation. Requires `mean > 0`; configuration validation
    /// rejects non-positive means before any sampling happens.
    pub fn lognormal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let sigma = (1.0 + (std_dev / mean).powi(2)).ln().sqrt();
        let mu = mean.ln() - 0.5 * sigma * sigma;
        (mu + sigma * self.normal(0.0, 1.0)).exp()
    }
}

/// Inverse CDF of the triangular distribution, shared between direct draws
/// and the correlated sampler so both use the identical breakpoint formula.
pub(crate) fn triangular_inverse_cdf(u: f64, min: f64, max: f64, mode: f64) -> f64 {
    let fc = (mode - min) / (max - min);
    if u < fc {
        min + (u * (max - min) * (mode - min)).sqrt()
    } else {
        max - ((1.0 - u) * (max - min) * (max - mode)).sqrt()
    }
}
