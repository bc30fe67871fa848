// In-process firing claims: at most one in-flight firing per schedule name

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Set of schedule names that currently have a firing in flight
#[derive(Debug, Clone, Default)]
pub struct FiringClaims {
    names: Arc<Mutex<HashSet<String>>>,
}

impl FiringClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name`, or `None` if a firing for it is still in flight
    pub fn try_claim(&self, name: &str) -> Option<FiringClaim> {
        let key = name.to_lowercase();
        let inserted = self
            .names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        if !inserted {
            return None;
        }
        Some(FiringClaim {
            name: key,
            names: Arc::clone(&self.names),
            acquired_at: Instant::now(),
        })
    }

    pub fn is_claimed(&self, name: &str) -> bool {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Claim guard that releases the name when dropped, including on panic unwind
#[derive(Debug)]
pub struct FiringClaim {
    name: String,
    names: Arc<Mutex<HashSet<String>>>,
    acquired_at: Instant,
}

impl FiringClaim {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time since the claim was taken
    pub fn elapsed(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for FiringClaim {
    fn drop(&mut self) {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
        debug!(
            schedule = %self.name,
            held_ms = self.acquired_at.elapsed().as_millis() as u64,
            "Firing claim released"
        );
    }
}
