//! Explicit session table for dispatchers that multiplex answers.

use std::collections::{HashMap, HashSet, VecDeque};

use sitescout_shared::SessionId;
use tracing::debug;

use crate::aggregator::{ClientEvent, StreamAggregator};
use crate::event::StreamEvent;

/// How many finished session ids are remembered by default.
const DEFAULT_FINISHED_MEMORY: usize = 1024;

/// One [`StreamAggregator`] per live session.
///
/// State is created on a session's first event and removed when the answer
/// ends or the client disconnects. Finished ids are remembered (up to a
/// bound) so that stragglers are dropped instead of opening a new answer.
#[derive(Debug)]
pub struct SessionTable {
    sessions: HashMap<SessionId, StreamAggregator>,
    finished: VecDeque<SessionId>,
    finished_set: HashSet<SessionId>,
    finished_memory: usize,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::with_finished_memory(DEFAULT_FINISHED_MEMORY)
    }
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_finished_memory(finished_memory: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            finished: VecDeque::new(),
            finished_set: HashSet::new(),
            finished_memory,
        }
    }

    /// Route `event` to its session's aggregator.
    pub fn dispatch(&mut self, id: SessionId, event: StreamEvent) -> Vec<ClientEvent> {
        if self.finished_set.contains(&id) {
            debug!(session = %id, kind = event.kind(), "event for finished session dropped");
            return Vec::new();
        }

        let aggregator = self.sessions.entry(id).or_insert_with(|| {
            debug!(session = %id, "session opened");
            StreamAggregator::new()
        });
        let out = aggregator.apply(event);

        if aggregator.is_finished() {
            debug!(session = %id, phase = ?aggregator.phase(), "session finished");
            self.sessions.remove(&id);
            self.remember(id);
        }
        out
    }

    /// Drop a session's state. Later events for it are ignored.
    pub fn disconnect(&mut self, id: SessionId) -> bool {
        let existed = self.sessions.remove(&id).is_some();
        self.remember(id);
        debug!(session = %id, existed, "session disconnected");
        existed
    }

    pub fn get(&self, id: &SessionId) -> Option<&StreamAggregator> {
        self.sessions.get(id)
    }

    pub fn is_active(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn remember(&mut self, id: SessionId) {
        if self.finished_memory == 0 || !self.finished_set.insert(id) {
            return;
        }
        self.finished.push_back(id);
        while self.finished.len() > self.finished_memory {
            if let Some(oldest) = self.finished.pop_front() {
                self.finished_set.remove(&oldest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(seq: u64, content: &str) -> StreamEvent {
        StreamEvent::ContentDelta {
            seq,
            content: content.into(),
        }
    }

    #[test]
    fn sessions_are_independent() {
        let mut table = SessionTable::new();
        let (a, b) = (SessionId::new(), SessionId::new());

        table.dispatch(a, delta(1, "alpha"));
        table.dispatch(b, delta(1, "beta"));

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&a).unwrap().state().content(), "alpha");
        assert_eq!(table.get(&b).unwrap().state().content(), "beta");
    }

    #[test]
    fn terminal_event_removes_session_and_late_events_are_dropped() {
        let mut table = SessionTable::new();
        let id = SessionId::new();

        table.dispatch(id, StreamEvent::Started { seq: 0 });
        let out = table.dispatch(
            id,
            StreamEvent::Error {
                seq: 1,
                message: "boom".into(),
            },
        );
        assert_eq!(out.len(), 1);
        assert!(!table.is_active(&id));

        assert!(table.dispatch(id, delta(2, "late")).is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn disconnect_releases_state() {
        let mut table = SessionTable::new();
        let id = SessionId::new();
        table.dispatch(id, delta(1, "partial"));

        assert!(table.disconnect(id));
        assert!(!table.disconnect(id));
        assert!(table.dispatch(id, delta(2, "partial more")).is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn finished_memory_is_bounded() {
        let mut table = SessionTable::with_finished_memory(2);
        let ids: Vec<SessionId> = (0..3).map(|_| SessionId::new()).collect();
        for id in &ids {
            table.disconnect(*id);
        }

        // The oldest id was forgotten and may start a fresh answer.
        assert_eq!(table.dispatch(ids[0], delta(1, "again")).len(), 1);
        assert!(table.dispatch(ids[2], delta(1, "again")).is_empty());
    }
}
