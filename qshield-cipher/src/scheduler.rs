use std::sync::Arc;

use qshield_entropy::{EntropyPool, EntropySample, EntropySource};
use tracing::debug;

use crate::{
    chaos::ChaosEngine,
    error::{QshieldError, QshieldResult},
    matrix::{DimensionCoordinates, KeyBlock, KeyMatrix, AXES},
};

/// Substitute for logistic states that hit a fixed point or leave (0, 1).
const RESEED_STATE: f64 = 0.381_966_011_250_105;
const EDGE: f64 = 1e-9;

/// Temporal key selected for one encrypt call.
#[derive(Clone, Debug)]
pub struct ScheduledKey {
    pub coordinates: DimensionCoordinates,
    pub key: Arc<KeyBlock>,
}

/// Walks the logistic map from a time slice to lattice coordinates.
pub struct TemporalKeyScheduler<C> {
    chaos: Arc<C>,
    rotation_interval_ms: u64,
}

impl<C: ChaosEngine> TemporalKeyScheduler<C> {
    pub fn new(chaos: Arc<C>, rotation_interval_ms: u64) -> QshieldResult<Self> {
        validate_interval(rotation_interval_ms)?;
        Ok(Self {
            chaos,
            rotation_interval_ms,
        })
    }

    /// Pure coordinate walk for a time slice and an entropy sample.
    pub fn coordinates_for(
        &self,
        timestamp_ms: u64,
        interval_ms: u64,
        dimensions: u8,
        entropy: &EntropySample,
    ) -> DimensionCoordinates {
        let interval = interval_ms.max(1);
        let time_slice = timestamp_ms % interval;
        let extent = u64::from(dimensions.max(1));
        let mut state = open_unit((time_slice as f64 + 1.0) / (interval as f64 + 1.0));
        let mut coords = [0u8; AXES];
        for (axis, coord) in coords.iter_mut().enumerate() {
            state = open_unit(self.chaos.logistic_step(state));
            *coord = ((state * extent as f64).floor() as u64 % extent) as u8;
            let mix = f64::from(entropy.byte_at(axis)) / 256.0;
            state = open_unit((state + mix).fract());
        }
        DimensionCoordinates::from_reduced(coords)
    }

    /// Draw one entropy sample, walk to coordinates and fetch the leaf.
    pub fn schedule<S: EntropySource>(
        &self,
        timestamp_ms: u64,
        interval_ms: Option<u64>,
        pool: &EntropyPool<S>,
        matrix: &KeyMatrix,
    ) -> QshieldResult<ScheduledKey> {
        let interval = interval_ms.unwrap_or(self.rotation_interval_ms);
        validate_interval(interval)?;
        let entropy = pool.sample(timestamp_ms)?;
        let coordinates =
            self.coordinates_for(timestamp_ms, interval, matrix.dimensions(), &entropy);
        let key = matrix.derive(&coordinates)?;
        debug!(
            "temporal key scheduled timestamp_ms={timestamp_ms} interval_ms={interval} coordinates={coordinates}"
        );
        Ok(ScheduledKey {
            coordinates,
            key,
        })
    }

    /// Decrypt side: re-derive the leaf for coordinates carried by an envelope.
    pub fn reconstruct(
        &self,
        coordinates: &DimensionCoordinates,
        matrix: &KeyMatrix,
    ) -> QshieldResult<Arc<KeyBlock>> {
        matrix.derive(coordinates)
    }
}

fn validate_interval(interval_ms: u64) -> QshieldResult<()> {
    if interval_ms == 0 {
        return Err(QshieldError::InvalidConfig(
            "rotation interval must be > 0".into(),
        ));
    }
    Ok(())
}

fn open_unit(x: f64) -> f64 {
    if x.is_finite() && x > EDGE && x < 1.0 - EDGE {
        x
    } else {
        RESEED_STATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaos::ClassicChaos;
    use qshield_entropy::SimEntropySource;

    fn scheduler() -> TemporalKeyScheduler<ClassicChaos> {
        TemporalKeyScheduler::new(Arc::new(ClassicChaos::default()), 1_000).unwrap()
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(TemporalKeyScheduler::new(Arc::new(ClassicChaos::default()), 0).is_err());
    }

    #[test]
    fn walk_is_reproducible_for_a_cached_sample() {
        let scheduler = scheduler();
        let pool = EntropyPool::new(SimEntropySource::with_seed(11));
        let sample = pool.sample(1_234).unwrap();
        let first = scheduler.coordinates_for(1_234, 1_000, 7, &sample);
        let second = scheduler.coordinates_for(1_234, 1_000, 7, &sample);
        assert_eq!(first, second);
    }

    #[test]
    fn walk_stays_inside_lattice() {
        let scheduler = scheduler();
        let pool = EntropyPool::new(SimEntropySource::with_seed(12));
        for dimensions in [1u8, 2, 3, 7, 16] {
            for ts in (0..5_000u64).step_by(37) {
                let sample = pool.sample(ts).unwrap();
                let coords = scheduler.coordinates_for(ts, 1_000, dimensions, &sample);
                assert!(coords.as_array().iter().all(|c| *c < dimensions));
            }
        }
    }

    #[test]
    fn open_unit_replaces_fixed_points() {
        assert_eq!(open_unit(0.0), RESEED_STATE);
        assert_eq!(open_unit(1.0), RESEED_STATE);
        assert_eq!(open_unit(f64::NAN), RESEED_STATE);
        assert_eq!(open_unit(0.25), 0.25);
    }

    #[test]
    fn schedule_fetches_leaf_for_walked_coordinates() {
        let scheduler = scheduler();
        let pool = EntropyPool::new(SimEntropySource::with_seed(13));
        let matrix = KeyMatrix::generate(&pool, 3, 8, 16, 0).unwrap();
        let scheduled = scheduler.schedule(500, None, &pool, &matrix).unwrap();
        let rebuilt = scheduler.reconstruct(&scheduled.coordinates, &matrix).unwrap();
        assert_eq!(scheduled.key.as_bytes(), rebuilt.as_bytes());
    }

    #[test]
    fn schedule_rejects_zero_override() {
        let scheduler = scheduler();
        let pool = EntropyPool::new(SimEntropySource::with_seed(14));
        let matrix = KeyMatrix::generate(&pool, 3, 8, 16, 0).unwrap();
        assert!(matches!(
            scheduler.schedule(0, Some(0), &pool, &matrix),
            Err(QshieldError::InvalidConfig(_))
        ));
    }
}
