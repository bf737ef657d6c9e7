//! Fixed-capacity record of peers seen across wake cycles.
//!
//! The table survives the low-power suspension and is reset only on cold
//! start. Once it holds `capacity` peers, further peers are dropped for the
//! rest of the boot epoch: existing entries are never displaced. Memory on the
//! device is a hard bound, so a full table is not reported as an error.


use parity_scale_codec::{Decode, Encode};
use proxtrace_primitives::{PeerId, Timestamp, UNKNOWN_TIME};

/// Close-contact accounting for one peer.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct PeerEntry {
    peer: PeerId,
    first_seen: Timestamp,
    close_contact_accumulated: u64,
    close_session_start: Option<Timestamp>,
}

impl PeerEntry {
    fn new(peer: PeerId, first_seen: Timestamp) -> Self {
        Self {
            peer,
            first_seen,
            close_contact_accumulated: 0,
            close_session_start: None,
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn first_seen(&self) -> Timestamp {
        self.first_seen
    }

    /// Seconds of completed close-contact sessions.
    pub fn close_contact_accumulated(&self) -> u64 {
        self.close_contact_accumulated
    }

    pub fn close_session_start(&self) -> Option<Timestamp> {
        self.close_session_start
    }

    pub fn in_close_session(&self) -> bool {
        self.close_session_start.is_some()
    }

    /// Open a close-contact session. A session already in progress keeps its
    /// original start.
    pub fn begin_close_session(&mut self, now: Timestamp) -> bool {
        if self.close_session_start.is_some() {
            return false;
        }
        self.close_session_start = Some(now);
        true
    }

    /// Fold the running session into the accumulator and return the seconds
    /// added. Time never runs backwards: a `now` before the start adds zero.
    pub fn end_close_session(&mut self, now: Timestamp) -> Option<u64> {
        let start = self.close_session_start.take()?;
        let added = now.saturating_sub(start);
        self.close_contact_accumulated = self.close_contact_accumulated.saturating_add(added);
        Some(added)
    }

    /// Accumulated close time plus the running session, as seen at `now`.
    pub fn close_contact_at(&self, now: Timestamp) -> u64 {
        let ongoing = self
            .close_session_start
            .map(|start| now.saturating_sub(start))
            .unwrap_or(0);
        self.close_contact_accumulated.saturating_add(ongoing)
    }
}

/// Outcome of offering a peer to the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    AlreadyTracked,
    Inserted,
    /// Capacity exhausted. The peer stays untracked until the table is reset.
    TableFull,
    /// `0` is reserved for "not tracked" and cannot become a first-seen time.
    UnknownTime,
}

impl Admission {
    pub const fn is_tracked(&self) -> bool {
        matches!(self, Self::AlreadyTracked | Self::Inserted)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerTable {
    capacity: usize,
    entries: Vec<PeerEntry>,
}

impl PeerTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Rebuild a table from persisted entries. Duplicates and anything past
    /// `capacity` are discarded, keeping the earliest admitted entries.
    pub fn from_entries(capacity: usize, persisted: Vec<PeerEntry>) -> Self {
        let mut table = Self::new(capacity);
        let offered = persisted.len();

        for entry in persisted {
            if table.is_full() {
                break;
            }
            if entry.first_seen == UNKNOWN_TIME || table.find(&entry.peer).is_some() {
                continue;
            }
            table.entries.push(entry);
        }

        if table.len() != offered {
            log::warn!(
                "Peer table restore kept {} of {} persisted entries (capacity {})",
                table.len(),
                offered,
                capacity
            );
        }

        table
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Linear lookup. The table is small enough that hashing does not pay off.
    pub fn find(&self, peer: &PeerId) -> Option<&PeerEntry> {
        self.entries.iter().find(|e| &e.peer == peer)
    }

    pub fn find_mut(&mut self, peer: &PeerId) -> Option<&mut PeerEntry> {
        self.entries.iter_mut().find(|e| &e.peer == peer)
    }

    /// First-seen time, or `0` when the peer is not tracked.
    pub fn first_seen_time(&self, peer: &PeerId) -> Timestamp {
        self.find(peer).map(|e| e.first_seen).unwrap_or(UNKNOWN_TIME)
    }

    pub fn record_first_contact(&mut self, peer: &PeerId, now: Timestamp) -> Admission {
        if self.find(peer).is_some() {
            return Admission::AlreadyTracked;
        }
        if now == UNKNOWN_TIME {
            return Admission::UnknownTime;
        }
        if self.is_full() {
            log::debug!("Peer table full ({}), not tracking {}", self.capacity, peer);
            return Admission::TableFull;
        }

        self.entries.push(PeerEntry::new(peer.clone(), now));
        log::debug!("Tracking new peer {} (first seen {})", peer, now);
        Admission::Inserted
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[PeerEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<PeerEntry> {
        self.entries
    }

    /// Cold-start reset.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
