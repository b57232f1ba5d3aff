//! Feed integrations for new-token discovery.
//!
//! ## Poll feeds
//! - Birdeye new listings (API key required)
//! - DexScreener pair search
//!
//! ## Push feeds
//! - PumpPortal new-token websocket
//!
//! Every feed normalizes into [`Candidate`] and passes through the shared
//! [`RateLimiter`] before each request.

mod birdeye;
mod dexscreener;
pub mod mock;
pub mod normalize;
mod pumpportal;
mod rate_limiter;
mod traits;
mod types;

pub use birdeye::{BirdeyeFeed, BIRDEYE_BASE_URL};
pub use dexscreener::{DexScreenerFeed, DEXSCREENER_BASE_URL};
pub use pumpportal::{PumpPortalFeed, PUMPPORTAL_WS_URL};
pub use rate_limiter::{RateLimit, RateLimitWindow, RateLimiter};
pub use traits::{normalize_batch, Feed, PollFeed, PushFeed, RawStream, SourceDescriptor};
pub use types::{Candidate, SourceId, TrustTier};

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

/// Build every enabled feed from configuration.
///
/// Fails when an enabled source lacks mandatory credentials.
pub fn build_feeds(config: &Config) -> Result<Vec<Feed>> {
    let mut feeds = Vec::new();
    let sources = &config.sources;

    if sources.birdeye.enabled {
        feeds.push(Feed::Poll(Arc::new(BirdeyeFeed::new(&sources.birdeye)?)));
    }
    if sources.dexscreener.enabled {
        feeds.push(Feed::Poll(Arc::new(DexScreenerFeed::new(
            &sources.dexscreener,
        )?)));
    }
    if sources.pumpportal.enabled {
        feeds.push(Feed::Push(Arc::new(PumpPortalFeed::new(
            &sources.pumpportal,
            config.trading.sol_usd,
        ))));
    }

    for feed in &feeds {
        let d = feed.descriptor();
        info!(
            source = %d.id,
            priority = d.priority,
            tier = %d.trust_tier(),
            interval_secs = d.interval.as_secs(),
            push = feed.is_push(),
            "Feed enabled"
        );
    }

    Ok(feeds)
}

/// Build the limiter from each enabled source's configured window.
pub fn build_rate_limiter(config: &Config) -> RateLimiter {
    config
        .sources
        .iter()
        .filter(|(_, source)| source.enabled)
        .filter_map(|(id, source)| source.rate_limit.map(|limit| (id, limit)))
        .fold(RateLimiter::new(), |limiter, (id, limit)| {
            limiter.with_limit(id, limit)
        })
}
