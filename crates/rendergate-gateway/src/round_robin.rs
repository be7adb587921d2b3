/// Round-robin cursor over the worker set.
///
/// Reads return the current slot and advance by one modulo the limit. The
/// cursor is never reset by a successful dispatch, which keeps the rotation
/// fair under sustained load while letting light load exit early.
pub struct RoundRobin {
    cursor: usize,
    limit: usize,
}

impl RoundRobin {
    /// Creates a cursor over `limit` slots.
    ///
    /// # Panics
    /// Panics if `limit` is zero; a balancer without workers is a
    /// configuration error, not a runtime condition.
    pub fn new(limit: usize) -> Self {
        assert!(limit >= 1, "round-robin limit must be at least 1");
        Self { cursor: 0, limit }
    }

    /// Returns the current slot and advances the cursor.
    pub fn next(&mut self) -> usize {
        let slot = self.cursor;
        self.cursor = (self.cursor + 1) % self.limit;
        slot
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
