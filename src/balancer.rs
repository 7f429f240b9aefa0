//! Endpoint selection.
//!
//! A [`Balancer`] picks one endpoint out of the current set for a new link. It sees only
//! the set, never load or health data.

use crate::resolver::Endpoint;
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

pub trait Balancer: fmt::Debug + Send + Sync {
    /// `None` only when `endpoints` is empty
    fn pick<'a>(&self, endpoints: &'a [Endpoint]) -> Option<&'a Endpoint>;
}

/// Cycles through the set in order
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    next: AtomicUsize,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Balancer for RoundRobinBalancer {
    fn pick<'a>(&self, endpoints: &'a [Endpoint]) -> Option<&'a Endpoint> {
        if endpoints.is_empty() {
            return None;
        }
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        endpoints.get(n % endpoints.len())
    }
}

/// Uniformly random choice
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomBalancer;

impl Balancer for RandomBalancer {
    fn pick<'a>(&self, endpoints: &'a [Endpoint]) -> Option<&'a Endpoint> {
        if endpoints.is_empty() {
            return None;
        }
        let i = rand::rng().random_range(0..endpoints.len());
        endpoints.get(i)
    }
}
