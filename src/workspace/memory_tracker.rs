use crate::utils::error::{Result, ShadowError};

/// Byte budget for every buffer a workspace owns.
#[derive(Debug)]
pub struct MemoryTracker {
    maximum: u64,
    current: u64,
}

impl MemoryTracker {
    pub fn new(maximum: u64) -> Self {
        Self {
            maximum,
            current: 0,
        }
    }

    pub fn allocate(&mut self, size: u64) -> Result<()> {
        let new = self.current.checked_add(size).ok_or_else(|| {
            ShadowError::OutOfMemory(format!(
                "allocation would overflow: current {} + size {}",
                self.current, size
            ))
        })?;

        if new > self.maximum {
            return Err(ShadowError::OutOfMemory(format!(
                "tried to allocate {} bytes with {} of {} bytes available",
                size,
                self.get_available(),
                self.maximum
            )));
        }

        self.current = new;
        Ok(())
    }

    pub fn deallocate(&mut self, size: u64) {
        self.current = self.current.saturating_sub(size);
    }

    pub fn get_current(&self) -> u64 {
        self.current
    }

    pub fn get_available(&self) -> u64 {
        self.maximum - self.current
    }

    pub fn get_maximum(&self) -> u64 {
        self.maximum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_and_rejects_over_budget() {
        let mut tracker = MemoryTracker::new(100);
        tracker.allocate(60).unwrap();
        assert_eq!(tracker.get_available(), 40);
        assert!(matches!(
            tracker.allocate(41),
            Err(ShadowError::OutOfMemory(_))
        ));
        assert_eq!(tracker.get_current(), 60);
        tracker.deallocate(60);
        tracker.allocate(100).unwrap();
        assert_eq!(tracker.get_maximum(), 100);
    }

    #[test]
    fn overflow_is_an_error() {
        let mut tracker = MemoryTracker::new(u64::MAX);
        tracker.allocate(u64::MAX - 1).unwrap();
        assert!(tracker.allocate(2).is_err());
    }
}
