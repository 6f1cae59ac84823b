use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::sync::Arc;

pub type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub fn create_rate_limiter(qps: u32) -> Arc<DirectLimiter> {
  let qps_value = std::num::NonZeroU32::new(qps.max(1))
    .unwrap_or(std::num::NonZeroU32::new(1).unwrap());

  Arc::new(RateLimiter::direct(Quota::per_second(qps_value)))
}

lazy_static::lazy_static! {
  // Token endpoint allows bursts but punishes sustained hammering.
  pub static ref OAUTH_LIMITER: Arc<DirectLimiter> = create_rate_limiter(20);
  // Admin SDK directory reads.
  pub static ref DIRECTORY_LIMITER: Arc<DirectLimiter> =
    create_rate_limiter(10);
  // Drive list/about calls, two per reported user.
  pub static ref DRIVE_LIMITER: Arc<DirectLimiter> = create_rate_limiter(100);
}
