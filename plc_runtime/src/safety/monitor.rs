//! Consecutive-failure threshold on required inputs.
//!
//! The cache already counts consecutive failed reads per point (a valid
//! read resets the count). The monitor only decides when a required input
//! has crossed the threshold.

use crate::cache::IoCache;
use plc_common::io::registry::PointRegistry;
use plc_common::point::{Address, Validity};

/// A required input that reached the failure threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdBreach {
    pub address: Address,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone)]
pub struct FailureMonitor {
    threshold: u32,
    required: Vec<Address>,
}

impl FailureMonitor {
    pub fn new(threshold: u32, registry: &PointRegistry) -> Self {
        Self {
            threshold: threshold.max(1),
            required: registry
                .inputs()
                .filter(|b| b.required)
                .map(|b| b.address.clone())
                .collect(),
        }
    }

    #[inline]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// First required input (in configuration order) at or over the threshold.
    pub fn check(&self, cache: &IoCache) -> Option<ThresholdBreach> {
        self.required.iter().find_map(|address| {
            let Ok(pv) = cache.read(address) else {
                return None;
            };
            match pv.validity() {
                Validity::Stale {
                    consecutive_failures,
                } if consecutive_failures >= self.threshold => Some(ThresholdBreach {
                    address: address.clone(),
                    consecutive_failures,
                }),
                _ => None,
            }
        })
    }
}
