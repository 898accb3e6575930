use artrack_core::Pose;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug)]
struct Entry {
    pose: Pose,
    frames_since_seen: u32,
}

/// Last known pose per marker id with a staleness counter.
#[derive(Clone, Debug, Default)]
pub struct TrackingHistory {
    entries: HashMap<u32, Entry>,
    max_stale_frames: u32,
}

impl TrackingHistory {
    pub fn new(max_stale_frames: u32) -> Self {
        Self {
            entries: HashMap::new(),
            max_stale_frames,
        }
    }

    /// Age every entry by one frame and drop the expired ones.
    pub fn begin_frame(&mut self) {
        let max = self.max_stale_frames;
        self.entries.retain(|_, e| {
            e.frames_since_seen += 1;
            e.frames_since_seen <= max + 1
        });
    }

    /// Pose usable as a seed for `id` this frame.
    pub fn previous(&self, id: u32) -> Option<&Pose> {
        self.entries.get(&id).map(|e| &e.pose)
    }

    pub fn frames_since_seen(&self, id: u32) -> Option<u32> {
        self.entries.get(&id).map(|e| e.frames_since_seen)
    }

    pub fn record(&mut self, id: u32, pose: Pose) {
        self.entries.insert(
            id,
            Entry {
                pose,
                frames_since_seen: 0,
            },
        );
    }

    pub fn forget(&mut self, id: u32) {
        self.entries.remove(&id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_max_stale_frames() {
        let mut h = TrackingHistory::new(1);
        h.begin_frame();
        h.record(5, Pose::identity());

        // seen last frame
        h.begin_frame();
        assert_eq!(h.frames_since_seen(5), Some(1));
        assert!(h.previous(5).is_some());

        // missed one frame: still within the budget
        h.begin_frame();
        assert_eq!(h.frames_since_seen(5), Some(2));

        h.begin_frame();
        assert!(h.previous(5).is_none());
        assert!(h.is_empty());
    }

    #[test]
    fn zero_budget_keeps_only_the_previous_frame() {
        let mut h = TrackingHistory::new(0);
        h.record(1, Pose::identity());
        h.begin_frame();
        assert!(h.previous(1).is_some());
        h.begin_frame();
        assert!(h.previous(1).is_none());
    }
}
