//! Deterministic chaotic maps.
//!
//! Every trajectory starts from fixed constants, so a map driven for `n`
//! steps always yields the same `n` states. The scheduler walks the logistic
//! map; the dimensional stack and the whitening pass read attractor states
//! one step per byte.

use crate::config::{ChaosConfig, ChaosLevel};

const WHITENING_CONTEXT: &str = "QuantumShield 2024-01 attractor whitening";

/// Point in a three-dimensional phase space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChaosState {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl ChaosState {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// `floor((x + y + z) * 1000) & 0xFF`.
    pub fn byte(&self) -> u8 {
        (((self.x + self.y + self.z) * 1000.0).floor() as i64 & 0xFF) as u8
    }
}

/// `x' = r·x·(1 − x)`.
pub fn logistic_step(x: f64, r: f64) -> f64 {
    r * x * (1.0 - x)
}

/// One explicit Euler step of the Lorenz system.
pub fn lorenz_step(state: ChaosState, sigma: f64, rho: f64, beta: f64, dt: f64) -> ChaosState {
    let dx = sigma * (state.y - state.x);
    let dy = state.x * (rho - state.z) - state.y;
    let dz = state.x * state.y - beta * state.z;
    ChaosState::new(state.x + dx * dt, state.y + dy * dt, state.z + dz * dt)
}

/// Attractor family used by the whitening pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attractor {
    Lorenz,
    Rossler,
    Chua,
    Henon,
}

impl Attractor {
    pub const ALL: [Attractor; 4] = [
        Attractor::Lorenz,
        Attractor::Rossler,
        Attractor::Chua,
        Attractor::Henon,
    ];

    pub fn from_key_byte(byte: u8) -> Self {
        Self::ALL[byte as usize % Self::ALL.len()]
    }

    pub fn initial_state(&self) -> ChaosState {
        match self {
            Attractor::Lorenz => ChaosState::new(1.0, 1.0, 1.0),
            Attractor::Rossler => ChaosState::new(0.1, 0.0, 0.0),
            Attractor::Chua => ChaosState::new(0.7, 0.0, 0.0),
            Attractor::Henon => ChaosState::new(0.0, 0.0, 0.0),
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Attractor::Lorenz => 0,
            Attractor::Rossler => 1,
            Attractor::Chua => 2,
            Attractor::Henon => 3,
        }
    }
}

pub trait ChaosEngine: Send + Sync {
    fn logistic_step(&self, x: f64) -> f64;
    fn lorenz_step(&self, state: ChaosState) -> ChaosState;
    fn attractor_step(&self, attractor: Attractor, state: ChaosState) -> ChaosState;
}

/// Parameterised Lorenz / Rössler / Chua / Hénon maps plus the logistic map.
#[derive(Clone, Debug, Default)]
pub struct ClassicChaos {
    config: ChaosConfig,
}

impl ClassicChaos {
    pub fn new(config: ChaosConfig) -> Self {
        Self { config }
    }

    fn rossler(&self, s: ChaosState) -> ChaosState {
        let ChaosConfig {
            rossler_a: a,
            rossler_b: b,
            rossler_c: c,
            dt,
            ..
        } = self.config;
        let dx = -s.y - s.z;
        let dy = s.x + a * s.y;
        let dz = b + s.z * (s.x - c);
        ChaosState::new(s.x + dx * dt, s.y + dy * dt, s.z + dz * dt)
    }

    fn chua(&self, s: ChaosState) -> ChaosState {
        const M0: f64 = -1.143;
        const M1: f64 = -0.714;
        let ChaosConfig {
            chua_alpha: alpha,
            chua_beta: beta,
            chua_gamma: gamma,
            dt,
            ..
        } = self.config;
        let f = M1 * s.x + 0.5 * (M0 - M1) * ((s.x + 1.0).abs() - (s.x - 1.0).abs());
        let dx = alpha * (s.y - s.x - f);
        let dy = s.x - s.y + s.z;
        let dz = -beta * s.y - gamma * s.z;
        ChaosState::new(s.x + dx * dt, s.y + dy * dt, s.z + dz * dt)
    }

    fn henon(&self, s: ChaosState) -> ChaosState {
        let x = 1.0 - self.config.henon_a * s.x * s.x + s.y;
        let y = self.config.henon_b * s.x;
        ChaosState::new(x, y, s.x)
    }
}

impl ChaosEngine for ClassicChaos {
    fn logistic_step(&self, x: f64) -> f64 {
        logistic_step(x, self.config.logistic_r)
    }

    fn lorenz_step(&self, state: ChaosState) -> ChaosState {
        lorenz_step(
            state,
            self.config.lorenz_sigma,
            self.config.lorenz_rho,
            self.config.lorenz_beta,
            self.config.dt,
        )
    }

    fn attractor_step(&self, attractor: Attractor, state: ChaosState) -> ChaosState {
        match attractor {
            Attractor::Lorenz => self.lorenz_step(state),
            Attractor::Rossler => self.rossler(state),
            Attractor::Chua => self.chua(state),
            Attractor::Henon => self.henon(state),
        }
    }
}

/// Byte trajectory of `attractor`, one step per position.
///
/// A trajectory that leaves the finite range restarts from the initial
/// state, which keeps the stream a function of position alone.
pub fn attractor_stream<C: ChaosEngine + ?Sized>(
    chaos: &C,
    attractor: Attractor,
    len: usize,
) -> Vec<u8> {
    let mut state = attractor.initial_state();
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        state = chaos.attractor_step(attractor, state);
        if !state.is_finite() {
            state = attractor.initial_state();
        }
        out.push(state.byte());
    }
    out
}

/// Attractors applied for `level`, given the whitening key slice.
pub fn whitening_schedule(level: ChaosLevel, key: &[u8]) -> Vec<Attractor> {
    match level {
        ChaosLevel::Minimal => Vec::new(),
        ChaosLevel::Standard => {
            vec![Attractor::from_key_byte(key.first().copied().unwrap_or_default())]
        }
        ChaosLevel::Maximum => Attractor::ALL.to_vec(),
    }
}

/// XOR `data` with attractor bytes and a keyed blake3 stream.
///
/// Self-inverse: applying it twice with the same key and level restores
/// the input.
pub fn whiten<C: ChaosEngine + ?Sized>(chaos: &C, level: ChaosLevel, key: &[u8], data: &mut [u8]) {
    for attractor in whitening_schedule(level, key) {
        let trajectory = attractor_stream(chaos, attractor, data.len());
        let mut hasher = blake3::Hasher::new_derive_key(WHITENING_CONTEXT);
        hasher.update(&[attractor.tag()]);
        hasher.update(key);
        let mut keystream = vec![0u8; data.len()];
        hasher.finalize_xof().fill(&mut keystream);
        for ((byte, chaos_byte), key_byte) in data.iter_mut().zip(trajectory).zip(keystream) {
            *byte ^= chaos_byte ^ key_byte;
        }
    }
}
