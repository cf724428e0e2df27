//! Typing presence for one open conversation
//!
//! Local side: the first keystroke of a burst emits `typing`; every keystroke
//! pushes the stop deadline forward; the deadline passing or a send emits a
//! single `stop_typing`, whichever comes first.
//!
//! Remote side: indicators of other participants expire on `user_stop_typing`
//! or after a local fallback timeout, so a lost frame cannot pin them.
//!
//! The tracker never reads the clock itself except in its [`EventHandler`]
//! impl; callers pass `now`, which keeps it deterministic under test.

use super::connection::InboundEvent;
use super::membership::EventHandler;
use crate::config::TypingConfig;
use crate::server::exposure::websocket::protocol::ClientMessage;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// What the local side has to put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

impl TypingSignal {
    pub fn frame(self, conversation_id: Uuid) -> ClientMessage {
        match self {
            TypingSignal::Start => ClientMessage::Typing { conversation_id },
            TypingSignal::Stop => ClientMessage::StopTyping { conversation_id },
        }
    }
}

#[derive(Debug, Clone)]
struct RemoteTyping {
    name: String,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
pub struct TypingTracker {
    conversation_id: Uuid,
    stop_after: Duration,
    remote_timeout: Duration,
    /// Stop deadline of the current local burst
    deadline: Option<Instant>,
    remote: HashMap<Uuid, RemoteTyping>,
}

impl TypingTracker {
    pub fn new(conversation_id: Uuid, config: &TypingConfig) -> Self {
        Self {
            conversation_id,
            stop_after: config.stop_after(),
            remote_timeout: config.remote_timeout(),
            deadline: None,
            remote: HashMap::new(),
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// A keystroke in the composer
    pub fn on_local_input(&mut self, now: Instant) -> Option<TypingSignal> {
        let starting = self.deadline.is_none();
        self.deadline = Some(now + self.stop_after);
        starting.then_some(TypingSignal::Start)
    }

    /// Emit `Stop` once the burst deadline has passed
    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }

    /// A message is being sent: end the burst now if there is one
    pub fn on_send(&mut self) -> Option<TypingSignal> {
        self.deadline.take().map(|_| TypingSignal::Stop)
    }

    pub fn is_typing(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn on_remote_typing(&mut self, user_id: Uuid, name: impl Into<String>, now: Instant) {
        self.remote.insert(
            user_id,
            RemoteTyping {
                name: name.into(),
                expires_at: now + self.remote_timeout,
            },
        );
    }

    pub fn on_remote_stop(&mut self, user_id: Uuid) {
        self.remote.remove(&user_id);
    }

    /// Name of the participant shown as typing, if any is still fresh
    pub fn remote_typing(&self, now: Instant) -> Option<&str> {
        self.remote
            .values()
            .filter(|r| r.expires_at > now)
            .max_by_key(|r| r.expires_at)
            .map(|r| r.name.as_str())
    }

    /// Drop expired remote indicators
    pub fn expire_remote(&mut self, now: Instant) {
        self.remote.retain(|_, r| r.expires_at > now);
    }

    /// Earliest instant at which `poll` or `remote_typing` may change
    pub fn next_deadline(&self) -> Option<Instant> {
        self.remote
            .values()
            .map(|r| r.expires_at)
            .chain(self.deadline)
            .min()
    }

    /// Forget everything (reconnect, refresh, close)
    pub fn reset(&mut self) {
        self.deadline = None;
        self.remote.clear();
    }
}

impl EventHandler for TypingTracker {
    fn handle(&mut self, event: &InboundEvent) {
        if event.conversation_id() != self.conversation_id {
            return;
        }
        match event {
            InboundEvent::UserTyping {
                user_id, user_name, ..
            } => self.on_remote_typing(*user_id, user_name.clone(), Instant::now()),
            InboundEvent::UserStopTyping { user_id, .. } => self.on_remote_stop(*user_id),
            // A message from someone ends their indicator
            InboundEvent::NewMessage(message) => self.on_remote_stop(message.sender_id),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> TypingTracker {
        TypingTracker::new(Uuid::new_v4(), &TypingConfig::default())
    }

    #[test]
    fn test_burst_emits_one_start_and_one_stop() {
        let mut t = tracker();
        let t0 = Instant::now();

        let mut signals = Vec::new();
        // Keystrokes every 500ms for 3 seconds
        for i in 0..=6u64 {
            let now = t0 + Duration::from_millis(i * 500);
            signals.extend(t.poll(now));
            signals.extend(t.on_local_input(now));
        }
        assert_eq!(signals, vec![TypingSignal::Start]);

        // Still inside the window after the last keystroke (t0 + 3s)
        assert_eq!(t.poll(t0 + Duration::from_millis(4_900)), None);
        assert_eq!(
            t.poll(t0 + Duration::from_millis(5_000)),
            Some(TypingSignal::Stop)
        );
        assert_eq!(t.poll(t0 + Duration::from_millis(9_000)), None);
    }

    #[test]
    fn test_send_before_deadline_wins() {
        let mut t = tracker();
        let t0 = Instant::now();
        assert_eq!(t.on_local_input(t0), Some(TypingSignal::Start));

        assert_eq!(t.on_send(), Some(TypingSignal::Stop));
        // The timer firing later is a no-op
        assert_eq!(t.poll(t0 + Duration::from_secs(10)), None);
        assert_eq!(t.on_send(), None);
    }

    #[test]
    fn test_deadline_before_send_wins() {
        let mut t = tracker();
        let t0 = Instant::now();
        t.on_local_input(t0);

        assert_eq!(
            t.poll(t0 + Duration::from_secs(2)),
            Some(TypingSignal::Stop)
        );
        assert_eq!(t.on_send(), None);
    }

    #[test]
    fn test_new_burst_after_stop_starts_again() {
        let mut t = tracker();
        let t0 = Instant::now();
        t.on_local_input(t0);
        t.poll(t0 + Duration::from_secs(3));

        assert_eq!(
            t.on_local_input(t0 + Duration::from_secs(4)),
            Some(TypingSignal::Start)
        );
    }

    #[test]
    fn test_remote_indicator_expires_without_stop() {
        let mut t = tracker();
        let t0 = Instant::now();
        let lars = Uuid::new_v4();

        t.on_remote_typing(lars, "Lars", t0);
        assert_eq!(t.remote_typing(t0 + Duration::from_secs(1)), Some("Lars"));
        assert_eq!(t.next_deadline(), Some(t0 + Duration::from_secs(5)));
        assert_eq!(t.remote_typing(t0 + Duration::from_secs(5)), None);

        t.on_remote_typing(lars, "Lars", t0);
        t.on_remote_stop(lars);
        assert_eq!(t.remote_typing(t0), None);
    }

    #[test]
    fn test_events_for_other_conversations_are_ignored() {
        let mut t = tracker();
        t.handle(&InboundEvent::UserTyping {
            conversation_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_name: "Sam".into(),
        });
        assert_eq!(t.remote_typing(Instant::now()), None);
    }

    #[test]
    fn test_frames_and_reset() {
        let mut t = tracker();
        let conv = t.conversation_id();
        assert_eq!(
            TypingSignal::Start.frame(conv),
            ClientMessage::Typing {
                conversation_id: conv
            }
        );

        t.on_local_input(Instant::now());
        t.on_remote_typing(Uuid::new_v4(), "Lars", Instant::now());
        t.reset();
        assert!(!t.is_typing());
        assert_eq!(t.next_deadline(), None);
    }
}
