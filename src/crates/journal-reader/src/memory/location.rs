use super::filter::FilterExpr;
use super::StoredEntry;

/// Position of a handle within the in-memory store.
///
/// Only `Entry` points at a concrete entry. The other variants describe a
/// place between entries that the next movement resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Location {
    Head,
    Tail,
    /// Before the first entry at or after this realtime timestamp.
    Realtime(u64),
    /// At the entry carrying this sequence number, or where it would be.
    Seqnum(u64),
    /// Between the entries `index - 1` and `index`.
    Gap(usize),
    Entry(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Forward,
    Backward,
}

fn accepts(filter: Option<&FilterExpr>, entry: &StoredEntry) -> bool {
    filter.map_or(true, |f| f.matches(entry))
}

impl Location {
    /// Where a move in `direction` starts scanning: forward moves scan
    /// `bound..len`, backward moves scan `..bound` in reverse.
    fn bounds(self, entries: &[StoredEntry], direction: Direction) -> usize {
        let len = entries.len();
        match (self, direction) {
            (Location::Head, _) => 0,
            (Location::Tail, _) => len,
            (Location::Realtime(usec), _) => entries
                .iter()
                .position(|e| e.realtime >= usec)
                .unwrap_or(len),
            (Location::Seqnum(seqnum), Direction::Forward) => {
                entries.partition_point(|e| e.seqnum < seqnum)
            }
            (Location::Seqnum(seqnum), Direction::Backward) => {
                entries.partition_point(|e| e.seqnum <= seqnum)
            }
            (Location::Gap(index), _) => index.min(len),
            (Location::Entry(index), Direction::Forward) => index.saturating_add(1).min(len),
            (Location::Entry(index), Direction::Backward) => index.min(len),
        }
    }

    /// Move one matching entry in `direction`.
    ///
    /// Reports `false` at the boundary; the location then stays put, except a
    /// failed forward move from the tail, which settles after the last entry
    /// so entries appended later are found.
    pub(crate) fn step(
        self,
        entries: &[StoredEntry],
        filter: Option<&FilterExpr>,
        direction: Direction,
    ) -> (Location, bool) {
        let bound = self.bounds(entries, direction);
        let found = match direction {
            Direction::Forward => (bound..entries.len()).find(|&i| accepts(filter, &entries[i])),
            Direction::Backward => (0..bound).rev().find(|&i| accepts(filter, &entries[i])),
        };

        match found {
            Some(index) => (Location::Entry(index), true),
            None if self == Location::Tail && direction == Direction::Forward => {
                (Location::Gap(entries.len()), false)
            }
            None => (self, false),
        }
    }

    /// Move up to `skip` matching entries, returning how many were passed.
    ///
    /// A zero skip only pins a sequence-number location to the entry it
    /// names, so a following move continues after it.
    pub(crate) fn skip(
        mut self,
        entries: &[StoredEntry],
        filter: Option<&FilterExpr>,
        direction: Direction,
        skip: u64,
    ) -> (Location, u64) {
        if skip == 0 {
            if let Location::Seqnum(seqnum) = self {
                let index = entries.partition_point(|e| e.seqnum < seqnum);
                if entries
                    .get(index)
                    .is_some_and(|e| e.seqnum == seqnum && accepts(filter, e))
                {
                    return (Location::Entry(index), 0);
                }
            }
            return (self, 0);
        }

        let mut moved = 0;
        while moved < skip {
            let (next, advanced) = self.step(entries, filter, direction);
            self = next;
            if !advanced {
                break;
            }
            moved += 1;
        }
        (self, moved)
    }

    pub(crate) fn entry(self) -> Option<usize> {
        match self {
            Location::Entry(index) => Some(index),
            _ => None,
        }
    }
}
