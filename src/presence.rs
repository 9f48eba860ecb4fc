//! Presence broadcasts
//!
//! On every join or leave each registered client gets the current user
//! list (minus itself), the name that changed and the new state.

use tracing::{debug, warn};

use crate::protocol::Frame;
use crate::registry::UserRegistry;
use crate::types::PresenceState;

/// Send a presence update to every registered connection
///
/// Returns how many connections accepted the frame. Delivery is
/// best-effort: a stalled or closed connection is skipped.
pub fn broadcast(
    registry: &UserRegistry,
    server_name: &str,
    changed: &str,
    state: PresenceState,
) -> usize {
    let mut delivered = 0;

    for (name, connection) in registry.iter() {
        let frame = Frame::PresenceUpdate {
            others: registry.snapshot_names_excluding(name),
            changed: changed.to_string(),
            state,
            server_name: server_name.to_string(),
        };

        match connection.try_send_frame(&frame) {
            Ok(()) => delivered += 1,
            Err(e) => warn!("Presence update to '{}' dropped: {}", name, e),
        }
    }

    debug!(
        "Presence {} for '{}' sent to {}/{} users",
        state,
        changed,
        delivered,
        registry.len()
    );
    delivered
}
