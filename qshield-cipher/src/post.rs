//! Keyed byte-mixing passes run over the base-cipher body.
//!
//! Each pass draws a keystream from blake3 keyed by the post-processing
//! sub-key and tagged with the pass name. Streams depend on byte position
//! only, so every forward pass has an exact inverse.

use crate::config::MAX_POST_PASSES;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostPass {
    /// Rotate each byte left by `ks[i] & 7`.
    RotateMix,
    /// Wrapping-add `ks[i]`.
    AddMix,
    /// XOR with `ks[i]`.
    HashMix,
}

impl PostPass {
    pub const ALL: [PostPass; MAX_POST_PASSES as usize] =
        [PostPass::RotateMix, PostPass::AddMix, PostPass::HashMix];

    pub fn name(&self) -> &'static str {
        match self {
            PostPass::RotateMix => "rotate-mix",
            PostPass::AddMix => "add-mix",
            PostPass::HashMix => "hash-mix",
        }
    }

    fn keystream(&self, key: &[u8; 32], len: usize) -> Vec<u8> {
        let mut hasher = blake3::Hasher::new_keyed(key);
        hasher.update(self.name().as_bytes());
        let mut stream = vec![0u8; len];
        hasher.finalize_xof().fill(&mut stream);
        stream
    }

    pub fn forward(&self, key: &[u8; 32], data: &mut [u8]) {
        let stream = self.keystream(key, data.len());
        for (byte, k) in data.iter_mut().zip(stream) {
            *byte = match self {
                PostPass::RotateMix => byte.rotate_left(u32::from(k & 7)),
                PostPass::AddMix => byte.wrapping_add(k),
                PostPass::HashMix => *byte ^ k,
            };
        }
    }

    pub fn inverse(&self, key: &[u8; 32], data: &mut [u8]) {
        let stream = self.keystream(key, data.len());
        for (byte, k) in data.iter_mut().zip(stream) {
            *byte = match self {
                PostPass::RotateMix => byte.rotate_right(u32::from(k & 7)),
                PostPass::AddMix => byte.wrapping_sub(k),
                PostPass::HashMix => *byte ^ k,
            };
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PostProcessingStack {
    passes: u8,
}

impl PostProcessingStack {
    /// `passes` is clamped to the number of implemented passes.
    pub fn new(passes: u8) -> Self {
        Self {
            passes: passes.min(MAX_POST_PASSES),
        }
    }

    pub fn passes(&self) -> &'static [PostPass] {
        let all: &'static [PostPass] = &PostPass::ALL;
        &all[..self.passes as usize]
    }

    pub fn forward(&self, key: &[u8; 32], data: &mut [u8]) {
        for pass in self.passes() {
            pass.forward(key, data);
        }
    }

    pub fn inverse(&self, key: &[u8; 32], data: &mut [u8]) {
        for pass in self.passes().iter().rev() {
            pass.inverse(key, data);
        }
    }
}

impl Default for PostProcessingStack {
    fn default() -> Self {
        Self::new(MAX_POST_PASSES)
    }
}
