use parking_lot::RwLock;

use super::replacer::{FrameId, Replacer};

/// One descriptor per frame id. A frame is a candidate for eviction only
/// while `tracked` is set; `referenced` is the clock sweep's second-chance
/// bit.
#[derive(Debug, Clone, Copy, Default)]
struct ClockEntry {
    tracked: bool,
    referenced: bool,
}

#[derive(Debug)]
struct ClockState {
    entries: Vec<ClockEntry>,
    /// Next descriptor the sweep will examine; `None` iff nothing is tracked.
    hand: Option<usize>,
    evictable: usize,
}

impl ClockState {
    /// Stop tracking `frame_id`. The caller guarantees it is tracked.
    /// Advances the hand first when it points at the removed descriptor, so
    /// the next sweep resumes at the successor.
    fn remove(&mut self, frame_id: usize) {
        if self.hand == Some(frame_id) {
            self.hand = Some((frame_id + 1) % self.entries.len());
        }
        self.entries[frame_id].tracked = false;
        self.entries[frame_id].referenced = false;
        self.evictable -= 1;
        if self.evictable == 0 {
            self.hand = None;
        }
    }
}

/// Clock-sweep approximation of LRU.
///
/// Descriptors live in a fixed circular array, one slot per frame id, with
/// an integer cursor as the clock hand. Newly tracked frames start with the
/// reference bit set and therefore survive at least one full sweep before
/// they can be selected.
#[derive(Debug)]
pub struct ClockReplacer {
    state: RwLock<ClockState>,
}

impl ClockReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            state: RwLock::new(ClockState {
                entries: vec![ClockEntry::default(); num_frames],
                hand: None,
                evictable: 0,
            }),
        }
    }
}

impl Replacer for ClockReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.write();
        let mut hand = state.hand?;
        let num_frames = state.entries.len();

        // Sweep: clear reference bits until a descriptor without one is
        // under the hand. Untracked slots are skipped. Terminates within
        // two revolutions because at least one frame is tracked.
        loop {
            if !state.entries[hand].tracked {
                hand = (hand + 1) % num_frames;
                continue;
            }
            if state.entries[hand].referenced {
                state.entries[hand].referenced = false;
                hand = (hand + 1) % num_frames;
                continue;
            }
            break;
        }

        state.hand = Some(hand);
        state.remove(hand);
        Some(hand)
    }

    fn pin(&self, frame_id: FrameId) {
        let mut state = self.state.write();
        if state.entries.get(frame_id).is_some_and(|e| e.tracked) {
            state.remove(frame_id);
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.write();
        match state.entries.get_mut(frame_id) {
            // Already evictable: keep the existing reference bit untouched.
            Some(entry) if entry.tracked => return,
            Some(entry) => {
                entry.tracked = true;
                entry.referenced = true;
            }
            None => return,
        }
        state.evictable += 1;
        if state.hand.is_none() {
            state.hand = Some(frame_id);
        }
    }

    fn size(&self) -> usize {
        self.state.read().evictable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_victim_on_empty() {
        let replacer = ClockReplacer::new(3);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_second_chance_order() {
        let replacer = ClockReplacer::new(3);
        replacer.unpin(0);
        replacer.unpin(1);
        replacer.unpin(2);
        assert_eq!(replacer.size(), 3);

        // Every frame starts with its reference bit set, so the first sweep
        // clears all three and comes back around to frame 0.
        assert_eq!(replacer.victim(), Some(0));
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_pin_removes_candidate() {
        let replacer = ClockReplacer::new(3);
        replacer.unpin(0);
        replacer.unpin(1);

        replacer.pin(0);
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_pin_untracked_is_noop() {
        let replacer = ClockReplacer::new(3);
        replacer.unpin(1);

        replacer.pin(2);
        replacer.pin(999);
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn test_unpin_tracked_keeps_cleared_bit() {
        let replacer = ClockReplacer::new(3);
        replacer.unpin(0);
        replacer.unpin(1);
        replacer.unpin(2);

        // First victim clears the bits of frames 1 and 2 on its way around.
        assert_eq!(replacer.victim(), Some(0));

        // Frame 1 is already tracked; this unpin must not hand it a fresh
        // second chance.
        replacer.unpin(1);
        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn test_pin_under_hand_advances_hand() {
        let replacer = ClockReplacer::new(3);
        replacer.unpin(0);
        replacer.unpin(1);
        replacer.unpin(2);

        // The hand rests on frame 0; pinning it moves the hand to frame 1,
        // and re-tracking frame 0 appends it behind the sweep.
        replacer.pin(0);
        replacer.unpin(0);
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn test_singleton_pin_then_retrack() {
        let replacer = ClockReplacer::new(1);
        replacer.unpin(0);
        replacer.pin(0);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);

        replacer.unpin(0);
        assert_eq!(replacer.victim(), Some(0));
    }

    #[test]
    fn test_unpin_out_of_range_ignored() {
        let replacer = ClockReplacer::new(2);
        replacer.unpin(7);
        assert_eq!(replacer.size(), 0);
    }
}
