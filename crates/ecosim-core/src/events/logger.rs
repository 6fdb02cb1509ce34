//! Event Logger
//!
//! Append-only JSONL event logging, plus the in-world queue systems push
//! events into during a tick.

use bevy_ecs::prelude::*;
use ecosim_events::{generate_event_id, EventKind, EventType, SimEvent};
use std::collections::{BTreeMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// JSONL sink for the analytics event stream, one event per line
pub struct EventLogger {
    sink: Option<(PathBuf, BufWriter<File>)>,
    written: u64,
    by_type: BTreeMap<EventType, u64>,
}

impl EventLogger {
    /// Truncate or create `path` and write events to it
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        tracing::debug!(path = %path.display(), "event log opened");
        Ok(Self {
            sink: Some((path, BufWriter::new(file))),
            written: 0,
            by_type: BTreeMap::new(),
        })
    }

    /// Count events without writing them anywhere
    pub fn null() -> Self {
        Self {
            sink: None,
            written: 0,
            by_type: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|(path, _)| path.as_path())
    }

    pub fn event_count(&self) -> u64 {
        self.written
    }

    /// Events logged so far of the given category
    pub fn count_of(&self, event_type: EventType) -> u64 {
        self.by_type.get(&event_type).copied().unwrap_or(0)
    }

    /// Per-category totals in category order
    pub fn counts(&self) -> impl Iterator<Item = (EventType, u64)> + '_ {
        self.by_type.iter().map(|(event_type, count)| (*event_type, *count))
    }

    pub fn log(&mut self, event: &SimEvent) -> std::io::Result<()> {
        if let Some((_, writer)) = self.sink.as_mut() {
            serde_json::to_writer(&mut *writer, event)?;
            writer.write_all(b"\n")?;
        }
        self.written += 1;
        *self.by_type.entry(event.event_type).or_insert(0) += 1;
        Ok(())
    }

    pub fn log_batch(&mut self, events: &[SimEvent]) -> std::io::Result<()> {
        events.iter().try_for_each(|event| self.log(event))
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        match self.sink.as_mut() {
            Some((_, writer)) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for EventLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "failed to flush event log");
        }
    }
}

/// Events emitted during the current run, waiting to be collected.
///
/// When nobody collects them the oldest events are discarded once the queue
/// reaches its capacity.
#[derive(Resource, Debug)]
pub struct EventQueue {
    events: VecDeque<SimEvent>,
    capacity: usize,
    next_event_id: u64,
    dropped: u64,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
            next_event_id: 1,
            dropped: 0,
        }
    }

    /// Sequential id for the next event
    pub fn next_id(&mut self) -> String {
        let id = generate_event_id(self.next_event_id);
        self.next_event_id += 1;
        id
    }

    pub fn push(&mut self, tick: u64, kind: EventKind) {
        let id = self.next_id();
        self.events.push_back(SimEvent::new(id, tick, kind));
        while self.events.len() > self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
    }

    pub fn extend(&mut self, tick: u64, kinds: impl IntoIterator<Item = EventKind>) {
        for kind in kinds {
            self.push(tick, kind);
        }
    }

    pub fn drain(&mut self) -> Vec<SimEvent> {
        self.events.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimEvent> {
        self.events.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosim_events::{AgentId, AgentKind, Vec3};
    use std::io::BufRead;

    fn birth(id: u64) -> EventKind {
        EventKind::Birth {
            agent_id: AgentId(id),
            kind: AgentKind::Basic,
            parent_id: None,
            position: Vec3::ZERO,
        }
    }

    #[test]
    fn test_event_logging() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let mut queue = EventQueue::new(16);
        queue.push(3, birth(1));
        queue.push(3, birth(2));
        let events = queue.drain();

        let mut logger = EventLogger::new(&path).unwrap();
        logger.log_batch(&events).unwrap();
        logger.flush().unwrap();
        assert_eq!(logger.event_count(), 2);
        assert_eq!(logger.count_of(EventType::Birth), 2);
        assert_eq!(logger.count_of(EventType::Death), 0);
        assert_eq!(logger.path(), Some(path.as_path()));

        let file = File::open(&path).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(file)
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 2);

        let parsed: SimEvent = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed.event_id, "evt_00000001");
        assert_eq!(parsed.event_type, EventType::Birth);
        assert_eq!(parsed.tick, 3);
    }

    #[test]
    fn test_counts_follow_category_order() {
        let mut logger = EventLogger::null();
        let death = EventKind::Death {
            agent_id: AgentId(4),
            kind: AgentKind::Basic,
            cause: ecosim_events::DeathCause::Starvation,
            age: 12,
            energy: 0.0,
            hazard: false,
        };
        logger.log(&SimEvent::new("evt_1", 1, death)).unwrap();
        logger.log(&SimEvent::new("evt_2", 1, birth(5))).unwrap();
        logger.log(&SimEvent::new("evt_3", 2, birth(6))).unwrap();

        let counts: Vec<(EventType, u64)> = logger.counts().collect();
        assert_eq!(counts, vec![(EventType::Birth, 2), (EventType::Death, 1)]);
    }

    #[test]
    fn test_null_logger() {
        let mut logger = EventLogger::null();
        let event = SimEvent::new("evt_1", 1, birth(1));
        logger.log(&event).unwrap();
        assert_eq!(logger.event_count(), 1);
        assert!(logger.path().is_none());
    }

    #[test]
    fn test_event_id_generation() {
        let mut queue = EventQueue::new(8);
        assert_eq!(queue.next_id(), "evt_00000001");
        assert_eq!(queue.next_id(), "evt_00000002");
        queue.push(0, birth(1));
        assert_eq!(queue.iter().next().unwrap().event_id, "evt_00000003");
    }

    #[test]
    fn test_queue_capacity_drops_oldest() {
        let mut queue = EventQueue::new(3);
        for id in 1..=5 {
            queue.push(id, birth(id));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 2);
        let ticks: Vec<u64> = queue.drain().iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![3, 4, 5]);
        assert!(queue.is_empty());
    }
}
