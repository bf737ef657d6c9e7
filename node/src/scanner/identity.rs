//! Rotating broadcast identity.
//!
//! A fresh identifier is drawn every wake cycle so that advertisements from
//! different cycles cannot be linked to the same device.

use proxtrace_primitives::{BroadcastId, BROADCAST_ID_CHARSET, BROADCAST_ID_LEN};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub struct IdentityRotator {
    rng: ChaCha8Rng,
    current: Option<BroadcastId>,
}

impl IdentityRotator {
    pub fn from_entropy() -> Self {
        Self::with_rng(ChaCha8Rng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(rng: ChaCha8Rng) -> Self {
        Self { rng, current: None }
    }

    pub fn current(&self) -> Option<&BroadcastId> {
        self.current.as_ref()
    }

    /// Draw the identifier for the next cycle. Never repeats the current one.
    pub fn rotate(&mut self) -> BroadcastId {
        loop {
            let next = random_broadcast_id(&mut self.rng);
            if self.current.as_ref() != Some(&next) {
                log::debug!("Broadcast id rotated to {}", next);
                self.current = Some(next.clone());
                return next;
            }
        }
    }
}

pub fn random_broadcast_id<R: Rng>(rng: &mut R) -> BroadcastId {
    BroadcastId::from_indices(
        (0..BROADCAST_ID_LEN).map(|_| rng.gen_range(0..BROADCAST_ID_CHARSET.len())),
    )
}
