use std::fmt::Debug;

/// Index of a frame in the buffer pool's frame table.
pub type FrameId = usize;

/// Eviction order over the frames currently holding a page.
pub trait Replacer: Send + Sync + Debug {
    /// Marks a frame as just used; tracks it if it was not tracked yet.
    fn record_access(&mut self, frame_id: FrameId);

    /// Removes and returns the best victim for which `evictable` holds.
    /// Returns None if no tracked frame can be evicted.
    fn evict(&mut self, evictable: &dyn Fn(FrameId) -> bool) -> Option<FrameId>;

    /// Stops tracking a frame.
    fn remove(&mut self, frame_id: FrameId);

    /// Get the number of tracked frames.
    fn size(&self) -> usize;
}
