use artrack_pattern::TemplatePattern;

use crate::error::TrackerError;

/// Fixed-capacity table of template patterns.
///
/// Ids are slot indices. A freed slot is handed out again by the next
/// registration, lowest index first; an active id never changes.
#[derive(Clone, Debug)]
pub struct PatternRegistry {
    slots: Vec<Option<TemplatePattern>>,
}

impl PatternRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn register(&mut self, pattern: TemplatePattern) -> Result<u32, TrackerError> {
        let Some(idx) = self.slots.iter().position(Option::is_none) else {
            return Err(TrackerError::RegistryFull(self.slots.len()));
        };
        self.slots[idx] = Some(pattern);
        Ok(idx as u32)
    }

    pub fn unregister(&mut self, id: u32) -> Result<TemplatePattern, TrackerError> {
        self.slots
            .get_mut(id as usize)
            .and_then(Option::take)
            .ok_or(TrackerError::UnknownPattern(id))
    }

    pub fn get(&self, id: u32) -> Option<&TemplatePattern> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.get(id).is_some()
    }

    /// Active patterns in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &TemplatePattern)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|p| (i as u32, p)))
    }
}
