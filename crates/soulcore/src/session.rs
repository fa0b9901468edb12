use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::message::{Message, MessageId, UserId};
use crate::rooms::RoomId;

/// Live state of one playing user.
///
/// Shared as `Arc<Session>`. [`SessionStorage`] owns the table exclusively;
/// the dispatcher only ever holds a session for the scope of one message.
/// The room reference is bound at creation and is never unset while the
/// session is alive.
#[derive(Debug)]
pub struct Session {
    id: UserId,
    display_name: String,
    room: Mutex<RoomId>,
    reply_target: Mutex<Option<MessageId>>,
}

impl Session {
    fn new(id: UserId, display_name: String, room: RoomId) -> Self {
        Self {
            id,
            display_name,
            room: Mutex::new(room),
            reply_target: Mutex::new(None),
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The room this session currently occupies.
    pub fn room(&self) -> RoomId {
        self.room.lock().expect("session lock poisoned").clone()
    }

    /// Rebind the session to `room`. Called by the room graph on movement.
    pub fn set_room(&self, room: RoomId) {
        *self.room.lock().expect("session lock poisoned") = room;
    }

    /// Last-processed message id, the target for addressed replies.
    pub fn reply_target(&self) -> Option<MessageId> {
        *self.reply_target.lock().expect("session lock poisoned")
    }

    pub fn set_reply_target(&self, id: MessageId) {
        *self.reply_target.lock().expect("session lock poisoned") = Some(id);
    }
}

/// In-memory table of active sessions, keyed by user identity.
///
/// Mutated only by the dispatch consumer in the reference design, but
/// guarded by a mutex regardless: a `/who`-style enumeration running on
/// another task must never observe a torn mutation. Iteration order is the
/// key order of the underlying map, so listings are deterministic.
#[derive(Debug)]
pub struct SessionStorage {
    start_room: RoomId,
    inner: Mutex<BTreeMap<UserId, Arc<Session>>>,
}

impl SessionStorage {
    /// New sessions are bound to `start_room`.
    pub fn new(start_room: RoomId) -> Self {
        Self {
            start_room,
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    /// True iff a session exists for `id`.
    pub fn is_active(&self, id: UserId) -> bool {
        self.inner.lock().expect("storage lock poisoned").contains_key(&id)
    }

    /// Create a session bound to the start room.
    ///
    /// Precondition: no active session for `id`. The dispatcher's `/start`
    /// rule guards this; violating it is a programmer error, not a runtime
    /// condition.
    pub fn create(&self, id: UserId, display_name: &str) -> Arc<Session> {
        let session = Arc::new(Session::new(
            id,
            display_name.to_string(),
            self.start_room.clone(),
        ));
        let prev = self
            .inner
            .lock()
            .expect("storage lock poisoned")
            .insert(id, session.clone());
        debug_assert!(prev.is_none(), "session {id} already active");
        debug!(user = %id, name = %display_name, "session created");
        session
    }

    /// Resolve the acting session for a message, if one is active.
    pub fn get(&self, message: &Message) -> Option<Arc<Session>> {
        self.inner
            .lock()
            .expect("storage lock poisoned")
            .get(&message.author.id)
            .cloned()
    }

    /// Remove a session. Precondition: the session is active; removing a
    /// non-existent id is a caller error.
    pub fn abandon(&self, id: UserId) {
        let prev = self
            .inner
            .lock()
            .expect("storage lock poisoned")
            .remove(&id);
        debug_assert!(prev.is_some(), "abandon of inactive session {id}");
        debug!(user = %id, "session abandoned");
    }

    /// Snapshot of all active sessions, in storage iteration order.
    ///
    /// The copy is taken under the lock, so callers can iterate without
    /// racing a concurrent create or abandon.
    pub fn list(&self) -> Vec<Arc<Session>> {
        self.inner
            .lock()
            .expect("storage lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::msg;

    fn storage() -> SessionStorage {
        SessionStorage::new(RoomId::new("gate"))
    }

    #[test]
    fn create_binds_the_start_room() {
        let s = storage();
        let session = s.create(UserId(7), "Alice");
        assert_eq!(session.room(), RoomId::new("gate"));
        assert_eq!(session.display_name(), "Alice");
        assert!(session.reply_target().is_none());
    }

    #[test]
    fn lifecycle_is_tracked() {
        let s = storage();
        assert!(!s.is_active(UserId(7)));

        s.create(UserId(7), "Alice");
        assert!(s.is_active(UserId(7)));

        s.abandon(UserId(7));
        assert!(!s.is_active(UserId(7)));
    }

    #[test]
    fn get_resolves_by_author_id() {
        let s = storage();
        s.create(UserId(7), "Alice");

        assert!(s.get(&msg(7, "Alice", "hi", 1)).is_some());
        assert!(s.get(&msg(8, "Bob", "hi", 2)).is_none());
    }

    #[test]
    fn list_is_ordered_by_user_id() {
        let s = storage();
        s.create(UserId(2), "Bob");
        s.create(UserId(1), "Alice");

        let names: Vec<_> = s
            .list()
            .iter()
            .map(|v| v.display_name().to_string())
            .collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn reply_target_tracks_last_message() {
        let s = storage();
        let session = s.create(UserId(7), "Alice");

        session.set_reply_target(MessageId(41));
        session.set_reply_target(MessageId(42));
        assert_eq!(session.reply_target(), Some(MessageId(42)));
    }

    #[test]
    fn set_room_rebinds() {
        let s = storage();
        let session = s.create(UserId(7), "Alice");
        session.set_room(RoomId::new("square"));
        assert_eq!(session.room(), RoomId::new("square"));
    }
}
