//! Room membership and event dispatch
//!
//! Joining a conversation room returns a [`RoomGuard`]; the room is left when
//! the guard is dropped or [`RoomGuard::leave`] is called, so a component can
//! never forget to leave. Guards are reference counted per conversation by
//! the [`ChannelHandle`]: only the first join and the last leave reach the
//! wire, and live rooms are re-joined after a reconnect.
//!
//! Components that consume inbound events implement [`EventHandler`] and own
//! their broadcast receiver; dropping the component deregisters it.

use super::connection::{ChannelHandle, InboundEvent};
use uuid::Uuid;

/// Scoped membership in one conversation room
#[must_use = "dropping the guard leaves the room immediately"]
pub struct RoomGuard {
    channel: ChannelHandle,
    conversation_id: Uuid,
    active: bool,
}

impl RoomGuard {
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Leave the room now
    pub fn leave(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.active {
            self.active = false;
            self.channel.release_room(self.conversation_id);
        }
    }
}

impl Drop for RoomGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for RoomGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomGuard")
            .field("conversation_id", &self.conversation_id)
            .field("active", &self.active)
            .finish()
    }
}

impl ChannelHandle {
    /// Join a conversation room for as long as the guard lives
    pub fn join(&self, conversation_id: Uuid) -> RoomGuard {
        self.acquire_room(conversation_id);
        RoomGuard {
            channel: self.clone(),
            conversation_id,
            active: true,
        }
    }
}

/// A component reacting to inbound events
pub trait EventHandler {
    fn handle(&mut self, event: &InboundEvent);
}
