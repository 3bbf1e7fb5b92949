use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use super::replacer::{FrameId, Replacer};

#[derive(Debug)]
struct LruState {
    /// Evictable frames, least recently unpinned at the front.
    order: VecDeque<FrameId>,
    members: HashSet<FrameId>,
    num_frames: usize,
}

/// Strict LRU over unpin order.
#[derive(Debug)]
pub struct LruReplacer {
    state: Mutex<LruState>,
}

impl LruReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            state: Mutex::new(LruState {
                order: VecDeque::with_capacity(num_frames),
                members: HashSet::with_capacity(num_frames),
                num_frames,
            }),
        }
    }
}

impl Replacer for LruReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let frame_id = state.order.pop_front()?;
        state.members.remove(&frame_id);
        Some(frame_id)
    }

    fn pin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if state.members.remove(&frame_id) {
            state.order.retain(|&f| f != frame_id);
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if frame_id >= state.num_frames || state.members.contains(&frame_id) {
            return;
        }
        state.members.insert(frame_id);
        state.order.push_back(frame_id);
    }

    fn size(&self) -> usize {
        self.state.lock().order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_lru_operations() {
        let replacer = LruReplacer::new(3);

        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);

        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(0);
        assert_eq!(replacer.size(), 3);

        // Evicted in unpin order.
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(0));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_pin_unpin() {
        let replacer = LruReplacer::new(3);

        replacer.unpin(1);
        replacer.unpin(2);
        assert_eq!(replacer.size(), 2);

        replacer.pin(1);
        assert_eq!(replacer.size(), 1);

        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), None);

        replacer.unpin(1);
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn test_duplicate_unpin() {
        let replacer = LruReplacer::new(2);

        replacer.unpin(1);
        replacer.unpin(1);
        assert_eq!(replacer.size(), 1);
    }

    #[test]
    fn test_pin_non_existent() {
        let replacer = LruReplacer::new(2);

        replacer.pin(999);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_unpin_out_of_range_ignored() {
        let replacer = LruReplacer::new(2);

        replacer.unpin(2);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_complex_scenario() {
        let replacer = LruReplacer::new(4);

        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(3);

        replacer.pin(2);
        assert_eq!(replacer.size(), 2);

        assert_eq!(replacer.victim(), Some(1));

        replacer.unpin(2);
        replacer.unpin(0);

        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(0));
    }
}
