//! Rate limiting for the progress API
//!
//! Reactive: limiters stay idle until the server answers 429 for a
//! category, after which every request in that category waits its turn.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;

/// Progress API endpoint groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointCategory {
    /// GET /api/progress/{user}/{course}/{video}
    Read,
    /// GET /api/progress?userId= (also used by subscription polling)
    List,
    /// PUT /api/progress/{user}/{course}/{video}
    Write,
}

impl EndpointCategory {
    pub const ALL: [EndpointCategory; 3] = [
        EndpointCategory::Read,
        EndpointCategory::List,
        EndpointCategory::Write,
    ];

    /// Categorize a request by path and method.
    pub fn from_request(path: &str, method: &reqwest::Method) -> Self {
        if *method != reqwest::Method::GET {
            return EndpointCategory::Write;
        }
        let path = path.split('?').next().unwrap_or(path);
        if path.trim_end_matches('/') == "/api/progress" {
            EndpointCategory::List
        } else {
            EndpointCategory::Read
        }
    }

    /// Requests per second once limiting is active
    pub fn rate_limit(&self) -> u32 {
        match self {
            EndpointCategory::Read => 20,
            EndpointCategory::List => 2,
            EndpointCategory::Write => 5,
        }
    }
}

struct EndpointRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    active: AtomicBool,
    category: EndpointCategory,
}

impl EndpointRateLimiter {
    fn new(category: EndpointCategory) -> Self {
        let quota =
            Quota::per_second(NonZeroU32::new(category.rate_limit()).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::direct(quota),
            active: AtomicBool::new(false),
            category,
        }
    }

    fn activate(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            debug!("Rate limiting activated for {:?}", self.category);
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn wait_if_active(&self) {
        if self.is_active() {
            debug!("Waiting for rate limiter {:?}", self.category);
            self.limiter.until_ready().await;
        }
    }
}

/// One limiter per endpoint category
pub struct RateLimiterSet {
    limiters: HashMap<EndpointCategory, EndpointRateLimiter>,
}

impl Default for RateLimiterSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterSet {
    pub fn new() -> Self {
        let limiters = EndpointCategory::ALL
            .into_iter()
            .map(|c| (c, EndpointRateLimiter::new(c)))
            .collect();
        Self { limiters }
    }

    pub async fn wait_for(&self, category: EndpointCategory) {
        if let Some(limiter) = self.limiters.get(&category) {
            limiter.wait_if_active().await;
        }
    }

    /// Called on 429
    pub fn activate(&self, category: EndpointCategory) {
        if let Some(limiter) = self.limiters.get(&category) {
            limiter.activate();
        }
    }

    pub fn is_active(&self, category: EndpointCategory) -> bool {
        self.limiters
            .get(&category)
            .is_some_and(EndpointRateLimiter::is_active)
    }
}
