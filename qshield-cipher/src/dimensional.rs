//! Seven keyed, position-driven XOR stages.
//!
//! Each stage XORs `data[i]` with a byte computed from `(i, data.len(), key)`
//! only, so every stage is its own inverse. The stack runs attractor
//! whitening and then stages 1..7 forward, and the mirror order backward.

use std::f64::consts::{FRAC_PI_2, PI};
use std::sync::Arc;

use crate::{
    chaos::{self, ChaosEngine, ChaosState},
    config::ChaosLevel,
    matrix::KeyBlock,
};

/// Bytes of the key block handed to each stage.
pub const STAGE_KEY_LEN: usize = 8;
const WHITENING_KEY: std::ops::Range<usize> = 56..64;
const MANDELBROT_MAX_ITER: u32 = 100;
const LATTICE_SIZE: usize = 16;
const LATTICE_MODULUS: u64 = 257;
const TORUS_MAJOR: f64 = 3.0;
const TORUS_MINOR: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DimensionStage {
    Spiral,
    Fractal,
    QuantumState,
    Lorenz,
    Lattice,
    Torus,
    Hyperbolic,
}

impl DimensionStage {
    /// Encrypt order.
    pub const ALL: [DimensionStage; 7] = [
        DimensionStage::Spiral,
        DimensionStage::Fractal,
        DimensionStage::QuantumState,
        DimensionStage::Lorenz,
        DimensionStage::Lattice,
        DimensionStage::Torus,
        DimensionStage::Hyperbolic,
    ];

    /// 1-based position in the stack.
    pub fn ordinal(&self) -> usize {
        match self {
            DimensionStage::Spiral => 1,
            DimensionStage::Fractal => 2,
            DimensionStage::QuantumState => 3,
            DimensionStage::Lorenz => 4,
            DimensionStage::Lattice => 5,
            DimensionStage::Torus => 6,
            DimensionStage::Hyperbolic => 7,
        }
    }

    /// Disjoint 8-byte slice of `key` owned by this stage.
    pub fn key_slice<'a>(&self, key: &'a KeyBlock) -> &'a [u8] {
        let start = (self.ordinal() - 1) * STAGE_KEY_LEN;
        &key.as_bytes()[start..start + STAGE_KEY_LEN]
    }

    /// XOR `data` with this stage's stream. Applying twice is the identity.
    pub fn apply<C: ChaosEngine + ?Sized>(&self, chaos: &C, key: &[u8], data: &mut [u8]) {
        if data.is_empty() || key.is_empty() {
            return;
        }
        let len = data.len();
        match self {
            DimensionStage::Spiral => {
                let key_int = key_u32(key);
                for (i, byte) in data.iter_mut().enumerate() {
                    let index = spiral_index(i, len);
                    *byte ^= key[index % key.len()] ^ (key_int >> (i % 32)) as u8;
                }
            }
            DimensionStage::Fractal => {
                for (i, byte) in data.iter_mut().enumerate() {
                    let x = plane(i, len);
                    let y = plane((i * 7) % len, len);
                    let escape = mandelbrot(x, y, MANDELBROT_MAX_ITER);
                    *byte ^= key[i % key.len()] ^ escape as u8;
                }
            }
            DimensionStage::QuantumState => {
                for (i, byte) in data.iter_mut().enumerate() {
                    let key_byte = key[i % key.len()];
                    let position = position_byte(i);
                    let first = qubit(position, key_byte);
                    let second = qubit(key_byte, position);
                    *byte ^= key_byte ^ entangle(first, second);
                }
            }
            DimensionStage::Lorenz => {
                let origin = lorenz_origin(key);
                let mut state = origin;
                for (i, byte) in data.iter_mut().enumerate() {
                    state = chaos.lorenz_step(state);
                    if !state.is_finite() {
                        state = origin;
                    }
                    *byte ^= key[i % key.len()] ^ state.byte();
                }
            }
            DimensionStage::Lattice => {
                let basis = lattice_basis(key);
                for (i, byte) in data.iter_mut().enumerate() {
                    let cell = (i % LATTICE_SIZE, (i / LATTICE_SIZE) % LATTICE_SIZE);
                    *byte ^= key[i % key.len()] ^ lattice_value(cell, &basis);
                }
            }
            DimensionStage::Torus => {
                for (i, byte) in data.iter_mut().enumerate() {
                    let theta = i as f64 / len as f64 * 2.0 * PI;
                    let phi = ((i * 13) % len) as f64 / len as f64 * 2.0 * PI;
                    let ring = TORUS_MAJOR + TORUS_MINOR * phi.cos();
                    let sum = ring * theta.cos() + ring * theta.sin() + TORUS_MINOR * phi.sin();
                    *byte ^= key[i % key.len()] ^ scaled_byte(sum);
                }
            }
            DimensionStage::Hyperbolic => {
                for (i, byte) in data.iter_mut().enumerate() {
                    let x = plane(i, len);
                    let y = plane((i * 11) % len, len);
                    let distance = (1.0 + (x * x + y * y) / 2.0).acosh();
                    *byte ^= key[i % key.len()] ^ scaled_byte(distance);
                }
            }
        }
    }
}

/// Whitening plus the seven dimensional stages, all keyed by one temporal key.
pub struct DimensionalTransformStack<C> {
    chaos: Arc<C>,
    level: ChaosLevel,
}

impl<C: ChaosEngine> DimensionalTransformStack<C> {
    pub fn new(chaos: Arc<C>, level: ChaosLevel) -> Self {
        Self { chaos, level }
    }

    pub fn forward(&self, key: &KeyBlock, data: &mut [u8]) {
        chaos::whiten(self.chaos.as_ref(), self.level, &key.as_bytes()[WHITENING_KEY], data);
        for stage in DimensionStage::ALL {
            stage.apply(self.chaos.as_ref(), stage.key_slice(key), data);
        }
    }

    pub fn inverse(&self, key: &KeyBlock, data: &mut [u8]) {
        for stage in DimensionStage::ALL.iter().rev() {
            stage.apply(self.chaos.as_ref(), stage.key_slice(key), data);
        }
        chaos::whiten(self.chaos.as_ref(), self.level, &key.as_bytes()[WHITENING_KEY], data);
    }
}

/// Keyed starting point for the Lorenz stage.
///
/// Offset from the whitening pass origin `(1, 1, 1)` so the two Lorenz
/// trajectories never coincide and cancel.
fn lorenz_origin(key: &[u8]) -> ChaosState {
    let at = |i: usize| f64::from(key[i % key.len()]) / 64.0;
    ChaosState::new(2.0 + at(0), 3.0 + at(1), 4.0 + at(2))
}

fn key_u32(key: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    for (dst, src) in word.iter_mut().zip(key) {
        *dst = *src;
    }
    u32::from_be_bytes(word)
}

/// Archimedean spiral index of `index` on a `sqrt(len)`-wide grid.
fn spiral_index(index: usize, len: usize) -> usize {
    let side = (len as f64).sqrt();
    let x = (index as f64) % side;
    let y = (index as f64 / side).floor();
    let dx = x - side / 2.0;
    let dy = y - side / 2.0;
    let angle = dy.atan2(dx);
    let radius = (dx * dx + dy * dy).sqrt();
    ((angle + radius) * 1000.0).floor().rem_euclid(len as f64) as usize
}

/// Map `i / len` onto `[-2, 2)`.
fn plane(i: usize, len: usize) -> f64 {
    i as f64 / len as f64 * 4.0 - 2.0
}

fn mandelbrot(cx: f64, cy: f64, max_iter: u32) -> u32 {
    let (mut zx, mut zy) = (0.0f64, 0.0f64);
    let mut iter = 0;
    while zx * zx + zy * zy < 4.0 && iter < max_iter {
        let next = zx * zx - zy * zy + cx;
        zy = 2.0 * zx * zy + cy;
        zx = next;
        iter += 1;
    }
    iter
}

fn position_byte(i: usize) -> u8 {
    ((i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 56) as u8
}

fn qubit(a: u8, b: u8) -> u32 {
    let alpha = (f64::from(a) / 255.0 * FRAC_PI_2).cos();
    let beta = (f64::from(b) / 255.0 * FRAC_PI_2).sin();
    ((alpha * alpha + beta * beta) * 255.0).floor() as u32
}

fn entangle(first: u32, second: u32) -> u8 {
    ((first ^ second) + ((first & second) << 1)) as u8
}

fn lattice_basis(key: &[u8]) -> [u64; 3] {
    let at = |i: usize| u64::from(key[i % key.len()]);
    [
        (at(0) << 8) | at(1),
        (at(2) << 8) | at(3),
        (at(4) << 16) | (at(5) << 8) | at(6),
    ]
}

fn lattice_value((cx, cy): (usize, usize), basis: &[u64; 3]) -> u8 {
    let dot = cx as u64 * basis[0] + cy as u64 * basis[1] + basis[2];
    (dot % LATTICE_MODULUS) as u8
}

fn scaled_byte(value: f64) -> u8 {
    ((value * 1000.0).floor() as i64 & 0xFF) as u8
}
