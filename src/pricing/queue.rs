//! Install queue positions within a service area.
//!
//! Positions come from a per-area sequence that hands out each number once,
//! so two orders finalized at the same time never share a position. The
//! Postgres-backed sequence lives in `queries::next_queue_position`.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

use super::error::PricingError;
use super::models::{Order, OrderStatus, ServiceArea};

/// Source of monotonically increasing queue positions per service area.
pub trait QueueSequence {
    fn next_position(&self, service_area_id: Uuid) -> u32;
}

/// In-process sequence guarded by a mutex.
#[derive(Debug, Default)]
pub struct InstallQueue {
    counters: Mutex<HashMap<Uuid, u32>>,
}

impl InstallQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing queue lengths, e.g. loaded from storage.
    pub fn seeded(existing: impl IntoIterator<Item = (Uuid, u32)>) -> Self {
        Self {
            counters: Mutex::new(existing.into_iter().collect()),
        }
    }

    pub fn last_position(&self, service_area_id: Uuid) -> Option<u32> {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&service_area_id)
            .copied()
    }
}

impl QueueSequence for InstallQueue {
    fn next_position(&self, service_area_id: Uuid) -> u32 {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let position = counters.entry(service_area_id).or_insert(0);
        *position += 1;
        *position
    }
}

/// What queue assignment needs to do for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePlan {
    /// No resolvable service area; nothing to do
    NoServiceArea,
    /// Position already set and stays as is
    AlreadyQueued { service_area_id: Uuid, position: u32 },
    NeedsPosition { service_area_id: Uuid },
}

/// Record the install service area and decide whether a position is needed.
///
/// Only finalized (non-cart) orders are queued.
pub fn plan_queue_assignment(
    order: &mut Order,
    service_area: Option<&ServiceArea>,
) -> Result<QueuePlan, PricingError> {
    if order.status == OrderStatus::Cart {
        return Err(PricingError::invalid_state(format!(
            "order {} must be finalized before it is queued",
            order.id
        )));
    }

    let Some(area) = service_area else {
        return Ok(QueuePlan::NoServiceArea);
    };

    if order.install_service_area_id != Some(area.id) {
        order.install_service_area_id = Some(area.id);
    }

    Ok(match order.install_queue_position {
        Some(position) => QueuePlan::AlreadyQueued {
            service_area_id: area.id,
            position,
        },
        None => QueuePlan::NeedsPosition {
            service_area_id: area.id,
        },
    })
}

/// Assign a queue position if the order does not have one yet.
///
/// Returns the order's position after assignment, or `None` when there is no
/// service area.
pub fn assign_queue_position<S: QueueSequence + ?Sized>(
    order: &mut Order,
    service_area: Option<&ServiceArea>,
    sequence: &S,
) -> Result<Option<u32>, PricingError> {
    match plan_queue_assignment(order, service_area)? {
        QueuePlan::NoServiceArea => Ok(None),
        QueuePlan::AlreadyQueued { position, .. } => Ok(Some(position)),
        QueuePlan::NeedsPosition { service_area_id } => {
            let position = sequence.next_position(service_area_id);
            order.install_queue_position = Some(position);
            tracing::info!(
                order_id = %order.id,
                service_area_id = %service_area_id,
                position,
                "install queue position assigned"
            );
            Ok(Some(position))
        }
    }
}
