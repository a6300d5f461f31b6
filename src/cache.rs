//! In-memory caching using moka
//!
//! Holds ZIP and service-area reference data. It changes rarely (admin edits),
//! so entries live for a while and are refreshed by a background warmer.

use moka::future::Cache;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};
use uuid::Uuid;

use crate::pricing::models::{Location, ServiceArea};
use crate::pricing::queries;

/// Application cache holding pricing reference data
#[derive(Clone)]
pub struct AppCache {
    /// ZIP locations (zip_code -> Location)
    pub locations: Cache<String, Arc<Location>>,
    /// Service areas (id -> ServiceArea)
    pub service_areas: Cache<Uuid, Arc<ServiceArea>>,
}

impl AppCache {
    /// Create a new cache instance with configured TTLs
    pub fn new() -> Self {
        Self {
            // ZIP locations: 50k entries, 1 hour TTL
            locations: Cache::builder()
                .max_capacity(50_000)
                .time_to_live(Duration::from_secs(60 * 60))
                .build(),

            // Service areas: a handful of counties, 15 min TTL so permit
            // schedule edits show up quickly
            service_areas: Cache::builder()
                .max_capacity(500)
                .time_to_live(Duration::from_secs(15 * 60))
                .build(),
        }
    }

    /// Get cache statistics for monitoring
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            locations_size: self.locations.entry_count(),
            service_areas_size: self.service_areas.entry_count(),
        }
    }

    pub async fn get_location(&self, zip_code: &str) -> Option<Arc<Location>> {
        self.locations.get(zip_code).await
    }

    pub async fn put_location(&self, location: Location) -> Arc<Location> {
        let location = Arc::new(location);
        self.locations
            .insert(location.zip_code.clone(), Arc::clone(&location))
            .await;
        location
    }

    pub async fn get_service_area(&self, id: Uuid) -> Option<Arc<ServiceArea>> {
        self.service_areas.get(&id).await
    }

    pub async fn put_service_area(&self, area: ServiceArea) -> Arc<ServiceArea> {
        let area = Arc::new(area);
        self.service_areas.insert(area.id, Arc::clone(&area)).await;
        area
    }
}

impl Default for AppCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics for monitoring endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub locations_size: u64,
    pub service_areas_size: u64,
}

/// Start background cache warmer
///
/// Warms the cache on startup and refreshes every 10 minutes.
pub async fn start_cache_warmer(cache: AppCache, db: PgPool) {
    let mut interval = interval(Duration::from_secs(10 * 60));
    loop {
        // First tick completes immediately
        interval.tick().await;
        warm_cache(&cache, &db).await;
    }
}

/// Load all reference data into the cache
pub async fn warm_cache(cache: &AppCache, db: &PgPool) {
    info!("Starting cache warm-up...");

    match queries::get_all_service_areas(db).await {
        Ok(areas) => {
            for area in areas {
                cache.put_service_area(area).await;
            }
        }
        Err(e) => warn!("Failed to warm service area cache: {}", e),
    }

    match queries::get_all_locations(db).await {
        Ok(locations) => {
            for location in locations {
                cache.put_location(location).await;
            }
        }
        Err(e) => warn!("Failed to warm location cache: {}", e),
    }

    cache.locations.run_pending_tasks().await;
    cache.service_areas.run_pending_tasks().await;
    info!("Cache warm-up complete. Stats: {:?}", cache.stats());
}
