//! The processor/augmentor shape shared by every modality

use crate::error::Result;
use crate::modality::Modality;
use crate::technique::{Technique, TechniqueReport};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

/// One modality's preview, preprocessing and augmentation stages
pub trait Pipeline: Send + Sync {
    type Process: Technique;
    type Augment: Technique;

    const MODALITY: Modality;

    /// Lightweight representation of a stored file for display
    fn preview(&self, path: &Path) -> Result<String>;

    /// Apply preprocessing techniques, each from the original input
    fn process(&self, path: &Path, techniques: &[Self::Process]) -> Result<TechniqueReport>;

    /// Apply augmentation techniques, each from the original input
    fn augment(&self, path: &Path, techniques: &[Self::Augment]) -> Result<TechniqueReport>;
}

/// Deterministic RNG when a seed is configured, entropy-seeded otherwise
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_base64(payload: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(payload.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let a: Vec<u32> = (0..4).map({
            let mut rng = rng_from_seed(Some(7));
            move |_| rng.gen()
        }).collect();
        let b: Vec<u32> = (0..4).map({
            let mut rng = rng_from_seed(Some(7));
            move |_| rng.gen()
        }).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_base64_round_trip_ignores_surrounding_whitespace() {
        let encoded = encode_base64(b"\x89PNG");
        assert_eq!(decode_base64(&format!(" {}\n", encoded)).unwrap(), b"\x89PNG");
    }
}
