use std::sync::Arc;
use tracing::{debug, warn};

use super::events::RideEvent;
use super::registry::{BroadcastReport, ConnectionRegistry, PeerRole};
use crate::api::metrics::record_broadcast;
use crate::db::{Ride, RideStatus};

/// Fans ride lifecycle events out to connected drivers and riders.
///
/// Fire-and-forget: nothing is acknowledged or retried, and a peer that is
/// not connected at publish time never sees the event.
#[derive(Debug, Clone)]
pub struct RideEventBroadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl RideEventBroadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Relay a driver's location frame to every connected rider.
    pub fn driver_location(&self, driver_key: &str, frame: &str) -> BroadcastReport {
        self.publish(
            &RideEvent::driver_location(driver_key, frame),
            &[PeerRole::Rider],
        )
    }

    /// Announce a freshly created ride to every connected driver.
    pub fn new_request(&self, ride: &Ride) -> BroadcastReport {
        self.publish(
            &RideEvent::NewRequest { ride: ride.clone() },
            &[PeerRole::Driver],
        )
    }

    /// Tell every driver and rider that a ride changed status.
    pub fn ride_status(
        &self,
        ride_id: &str,
        status: RideStatus,
        driver_name: &str,
    ) -> BroadcastReport {
        self.publish(
            &RideEvent::RideStatus {
                ride_id: ride_id.to_string(),
                status,
                driver_name: driver_name.to_string(),
            },
            &[PeerRole::Driver, PeerRole::Rider],
        )
    }

    fn publish(&self, event: &RideEvent, roles: &[PeerRole]) -> BroadcastReport {
        let message = match event.to_message() {
            Ok(message) => message,
            Err(e) => {
                warn!(event = event.name(), error = %e, "Failed to serialize realtime event");
                return BroadcastReport::default();
            }
        };

        let mut total = BroadcastReport::default();
        for role in roles {
            let report = self.registry.broadcast_all(*role, message.clone());
            record_broadcast(event.name(), *role, report);
            total += report;
        }

        debug!(
            event = event.name(),
            delivered = total.delivered,
            dropped = total.dropped,
            "Realtime event published"
        );
        total
    }
}
