//! Connection registry: participant id ↔ live connection handle.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ws::{ADMIN_ID, ParticipantId, ServerMessage};

/// Identifier of one WebSocket connection (not of a participant).
pub type ConnectionId = String;

/// Why a write to a handle did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The connection is closing or already gone
    Closed,
    /// The outbound queue is full
    Full,
}

/// Outbound side of one connection.
///
/// Cloning shares the same queue and close signal.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<ServerMessage>,
    close: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(
        id: ConnectionId,
        tx: mpsc::Sender<ServerMessage>,
        close: CancellationToken,
    ) -> Self {
        Self { id, tx, close }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed() && !self.close.is_cancelled()
    }

    /// Non-blocking write. Liveness is re-checked here, at write time.
    pub fn try_send(&self, message: ServerMessage) -> Result<(), SendFailure> {
        if !self.is_open() {
            return Err(SendFailure::Closed);
        }
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SendFailure::Full),
            Err(TrySendError::Closed(_)) => Err(SendFailure::Closed),
        }
    }

    /// Ask the transport to close this connection.
    pub fn close(&self) {
        self.close.cancel();
    }
}

/// Role under which a participant registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParticipantKind {
    Doctor,
    Admin,
    Patient,
    Guest,
}

impl ParticipantKind {
    /// `init{doctorId}` is shared by doctors and the admin desk.
    pub fn for_staff_id(id: &str) -> Self {
        if id == ADMIN_ID { Self::Admin } else { Self::Doctor }
    }
}

/// An id can only be taken over by a participant of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("already registered as {existing:?}")]
pub struct KindConflict {
    pub existing: ParticipantKind,
}

#[derive(Debug)]
struct Entry {
    handle: ConnectionHandle,
    kind: ParticipantKind,
}

/// Participant → connection map with a reverse index by connection.
///
/// Last writer wins among participants of the same kind: registering an id
/// that is already present replaces the entry and hands the previous handle
/// back to the caller.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: HashMap<ParticipantId, Entry>,
    by_connection: HashMap<ConnectionId, HashSet<ParticipantId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle` for `id`. Returns the superseded handle when it
    /// belonged to a different connection.
    ///
    /// Fails without touching the registry when `id` is held by a participant
    /// of another kind.
    pub fn register(
        &mut self,
        id: &str,
        handle: ConnectionHandle,
        kind: ParticipantKind,
    ) -> Result<Option<ConnectionHandle>, KindConflict> {
        if let Some(existing) = self.kind_of(id).filter(|existing| *existing != kind) {
            return Err(KindConflict { existing });
        }

        self.by_connection
            .entry(handle.id.clone())
            .or_default()
            .insert(id.to_string());

        let Some(previous) = self.entries.insert(id.to_string(), Entry { handle, kind }) else {
            return Ok(None);
        };

        let new_conn = &self.entries[id].handle.id;
        if previous.handle.id == *new_conn {
            return Ok(None);
        }

        if let Some(ids) = self.by_connection.get_mut(&previous.handle.id) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_connection.remove(&previous.handle.id);
            }
        }
        debug!(
            participant = %id,
            old_conn = %previous.handle.id,
            new_conn = %new_conn,
            "registry entry superseded"
        );
        Ok(Some(previous.handle))
    }

    pub fn lookup(&self, id: &str) -> Option<&ConnectionHandle> {
        self.entries.get(id).map(|e| &e.handle)
    }

    pub fn kind_of(&self, id: &str) -> Option<ParticipantKind> {
        self.entries.get(id).map(|e| e.kind)
    }

    /// True when `connection_id` currently owns the entry for `id`.
    pub fn is_bound(&self, connection_id: &str, id: &str) -> bool {
        self.entries
            .get(id)
            .is_some_and(|e| e.handle.id == connection_id)
    }

    /// True when the connection owns at least one entry.
    pub fn has_connection(&self, connection_id: &str) -> bool {
        self.by_connection.contains_key(connection_id)
    }

    /// True when the connection owns an entry registered as `kind`.
    pub fn connection_has_kind(&self, connection_id: &str, kind: ParticipantKind) -> bool {
        self.by_connection.get(connection_id).is_some_and(|ids| {
            ids.iter()
                .any(|id| self.entries.get(id).is_some_and(|e| e.kind == kind))
        })
    }

    /// Remove every entry owned by `connection_id`.
    ///
    /// Entries already taken over by a newer connection are left alone.
    pub fn unregister(&mut self, connection_id: &str) -> Vec<(ParticipantId, ParticipantKind)> {
        let Some(ids) = self.by_connection.remove(connection_id) else {
            return Vec::new();
        };
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if !self.is_bound(connection_id, &id) {
                continue;
            }
            if let Some(entry) = self.entries.remove(&id) {
                removed.push((id, entry.kind));
            }
        }
        removed
    }

    /// Write to `id` if it is registered and open.
    pub fn send_to(&self, id: &str, message: ServerMessage) -> Result<(), SendFailure> {
        let Some(handle) = self.lookup(id) else {
            return Err(SendFailure::Closed);
        };
        let kind = message.kind();
        handle.try_send(message).inspect_err(|failure| {
            warn!(
                participant = %id,
                conn_id = %handle.id,
                envelope = kind,
                ?failure,
                "dropping outbound message"
            );
        })
    }

    /// Ids registered with `kind` whose handle is still open.
    pub fn online(&self, kind: ParticipantKind) -> Vec<ParticipantId> {
        let mut ids: Vec<ParticipantId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.kind == kind && e.handle.is_open())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn is_online(&self, id: &str) -> bool {
        self.lookup(id).is_some_and(|h| h.is_open())
    }

    pub fn count(&self, kind: ParticipantKind) -> usize {
        self.entries.values().filter(|e| e.kind == kind).count()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_handle(
    id: &str,
    capacity: usize,
) -> (ConnectionHandle, mpsc::Receiver<ServerMessage>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        ConnectionHandle::new(id.to_string(), tx, CancellationToken::new()),
        rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping() -> ServerMessage {
        ServerMessage::error("ping")
    }

    #[test]
    fn test_register_and_lookup() {
        let mut reg = ConnectionRegistry::new();
        let (h, _rx) = test_handle("c1", 4);
        assert!(reg.register("BS0001", h, ParticipantKind::Doctor).unwrap().is_none());

        assert_eq!(reg.lookup("BS0001").map(|h| h.id()), Some("c1"));
        assert_eq!(reg.kind_of("BS0001"), Some(ParticipantKind::Doctor));
        assert!(reg.is_bound("c1", "BS0001"));
        assert!(!reg.is_bound("c2", "BS0001"));
        assert!(reg.lookup("BS0002").is_none());
    }

    #[test]
    fn test_reregister_keeps_only_latest() {
        let mut reg = ConnectionRegistry::new();
        let (old, mut old_rx) = test_handle("c1", 4);
        let (new, mut new_rx) = test_handle("c2", 4);

        reg.register("BN0001", old, ParticipantKind::Patient).unwrap();
        let superseded = reg.register("BN0001", new, ParticipantKind::Patient).unwrap();
        assert_eq!(superseded.as_ref().map(|h| h.id()), Some("c1"));
        assert_eq!(reg.len(), 1);
        assert!(!reg.has_connection("c1"));

        reg.send_to("BN0001", ping()).unwrap();
        assert!(new_rx.try_recv().is_ok());
        assert!(old_rx.try_recv().is_err());
    }

    #[test]
    fn test_reregister_same_connection_is_not_superseded() {
        let mut reg = ConnectionRegistry::new();
        let (h, _rx) = test_handle("c1", 4);
        reg.register("g-1", h.clone(), ParticipantKind::Guest).unwrap();
        assert!(reg.register("g-1", h, ParticipantKind::Guest).unwrap().is_none());
        assert!(reg.is_bound("c1", "g-1"));
    }

    #[test]
    fn test_other_kind_cannot_take_over_id() {
        let mut reg = ConnectionRegistry::new();
        let (patient, mut patient_rx) = test_handle("c1", 4);
        let (doctor, _doctor_rx) = test_handle("c2", 4);
        let (guest, _guest_rx) = test_handle("c3", 4);
        reg.register("BN0001", patient.clone(), ParticipantKind::Patient).unwrap();
        reg.register("BS0001", doctor.clone(), ParticipantKind::Doctor).unwrap();

        assert_eq!(
            reg.register("BN0001", guest.clone(), ParticipantKind::Guest)
                .unwrap_err(),
            KindConflict {
                existing: ParticipantKind::Patient
            }
        );
        assert_eq!(
            reg.register("BS0001", guest, ParticipantKind::Patient)
                .unwrap_err(),
            KindConflict {
                existing: ParticipantKind::Doctor
            }
        );

        assert!(patient.is_open() && doctor.is_open());
        assert!(reg.is_bound("c1", "BN0001"));
        assert!(reg.is_bound("c2", "BS0001"));
        assert!(!reg.has_connection("c3"));
        reg.send_to("BN0001", ping()).unwrap();
        assert!(patient_rx.try_recv().is_ok());
    }

    #[test]
    fn test_connection_has_kind() {
        let mut reg = ConnectionRegistry::new();
        let (h, _rx) = test_handle("c1", 4);
        reg.register("BS0001", h, ParticipantKind::Doctor).unwrap();

        assert!(reg.connection_has_kind("c1", ParticipantKind::Doctor));
        assert!(!reg.connection_has_kind("c1", ParticipantKind::Admin));
        assert!(!reg.connection_has_kind("c2", ParticipantKind::Doctor));
    }

    #[test]
    fn test_unregister_removes_everything_owned() {
        let mut reg = ConnectionRegistry::new();
        let (h, _rx) = test_handle("c1", 4);
        reg.register("BS0001", h.clone(), ParticipantKind::Doctor).unwrap();
        reg.register("BN0001", h, ParticipantKind::Patient).unwrap();

        let mut removed = reg.unregister("c1");
        removed.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            removed,
            vec![
                ("BN0001".to_string(), ParticipantKind::Patient),
                ("BS0001".to_string(), ParticipantKind::Doctor),
            ]
        );
        assert!(reg.is_empty());
        assert!(reg.lookup("BS0001").is_none());
        assert!(reg.unregister("c1").is_empty());
    }

    #[test]
    fn test_unregister_of_superseded_connection_keeps_new_entry() {
        let mut reg = ConnectionRegistry::new();
        let (old, _old_rx) = test_handle("c1", 4);
        let (new, _new_rx) = test_handle("c2", 4);
        reg.register("Admin", old, ParticipantKind::Admin).unwrap();
        reg.register("Admin", new, ParticipantKind::Admin).unwrap();

        assert!(reg.unregister("c1").is_empty());
        assert!(reg.is_bound("c2", "Admin"));
    }

    #[test]
    fn test_send_rechecks_liveness() {
        let mut reg = ConnectionRegistry::new();
        let (h, rx) = test_handle("c1", 4);
        reg.register("BS0001", h.clone(), ParticipantKind::Doctor).unwrap();

        h.close();
        assert_eq!(reg.send_to("BS0001", ping()), Err(SendFailure::Closed));
        drop(rx);
        assert!(!reg.is_online("BS0001"));
    }

    #[test]
    fn test_send_to_dropped_receiver() {
        let mut reg = ConnectionRegistry::new();
        let (h, rx) = test_handle("c1", 4);
        reg.register("BS0001", h, ParticipantKind::Doctor).unwrap();
        drop(rx);
        assert_eq!(reg.send_to("BS0001", ping()), Err(SendFailure::Closed));
    }

    #[test]
    fn test_full_queue_drops() {
        let mut reg = ConnectionRegistry::new();
        let (h, _rx) = test_handle("c1", 1);
        reg.register("BS0001", h, ParticipantKind::Doctor).unwrap();
        assert!(reg.send_to("BS0001", ping()).is_ok());
        assert_eq!(reg.send_to("BS0001", ping()), Err(SendFailure::Full));
    }

    #[test]
    fn test_online_filters_by_kind() {
        let mut reg = ConnectionRegistry::new();
        let (a, _a) = test_handle("c1", 4);
        let (b, _b) = test_handle("c2", 4);
        let (c, _c) = test_handle("c3", 4);
        reg.register("BS0002", a, ParticipantKind::Doctor).unwrap();
        reg.register("BS0001", b, ParticipantKind::Doctor).unwrap();
        reg.register("Admin", c, ParticipantKind::for_staff_id("Admin")).unwrap();

        assert_eq!(reg.online(ParticipantKind::Doctor), vec!["BS0001", "BS0002"]);
        assert_eq!(reg.online(ParticipantKind::Admin), vec!["Admin"]);
        assert_eq!(reg.count(ParticipantKind::Patient), 0);
    }
}
