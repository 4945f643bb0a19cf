use serde::{Deserialize, Serialize};

/// The single progress cursor: which chunk prefix is unlocked.
///
/// The unlocked set is always the contiguous prefix `0..=current_chunk`; it is
/// derived from the cursor and never stored independently. The cursor only
/// moves forward, and only the chunk gate moves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    current_chunk: u32,
}

impl Progress {
    /// Progress at the start of a fresh run: only chunk 0 unlocked.
    #[must_use]
    pub fn start() -> Self {
        Self { current_chunk: 0 }
    }

    /// Rebuild from a persisted cursor.
    #[must_use]
    pub fn from_persisted(current_chunk: u32) -> Self {
        Self { current_chunk }
    }

    #[must_use]
    pub fn current_chunk(&self) -> u32 {
        self.current_chunk
    }

    /// True if the chunk is within the unlocked prefix.
    #[must_use]
    pub fn is_unlocked(&self, chunk: u32) -> bool {
        chunk <= self.current_chunk
    }

    /// The cursor after one forward step, saturating at `max_chunk`.
    ///
    /// Advancing from the last chunk is a no-op (terminal state).
    #[must_use]
    pub fn advanced(self, max_chunk: u32) -> Self {
        Self {
            current_chunk: self.current_chunk.saturating_add(1).min(max_chunk),
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_unlocks_only_chunk_zero() {
        let p = Progress::start();
        assert_eq!(p.current_chunk(), 0);
        assert!(p.is_unlocked(0));
        assert!(!p.is_unlocked(1));
    }

    #[test]
    fn advanced_moves_one_chunk_forward() {
        let p = Progress::start().advanced(5);
        assert_eq!(p.current_chunk(), 1);
        assert!(p.is_unlocked(1));
    }

    #[test]
    fn advanced_saturates_at_last_chunk() {
        let p = Progress::from_persisted(3);
        assert_eq!(p.advanced(3).current_chunk(), 3);
        assert_eq!(p.advanced(3).advanced(3).current_chunk(), 3);
    }
}
