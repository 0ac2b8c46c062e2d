//! Cursor regions: the `(base, next, limit)` triples behind get and put areas.

/// Contiguous readable or writable span, as indices into a channel's storage.
///
/// Invariant: `base <= next <= limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorRegion {
    base: usize,
    next: usize,
    limit: usize,
}

impl CursorRegion {
    /// Region with nothing in it.
    pub const EMPTY: Self = Self {
        base: 0,
        next: 0,
        limit: 0,
    };

    /// Create a region. `next` and `limit` are clamped to keep the invariant.
    #[must_use]
    pub fn new(base: usize, next: usize, limit: usize) -> Self {
        let limit = limit.max(base);
        let next = next.clamp(base, limit);
        Self { base, next, limit }
    }

    /// Start of the region.
    #[must_use]
    pub fn base(&self) -> usize {
        self.base
    }

    /// Current cursor.
    #[must_use]
    pub fn next(&self) -> usize {
        self.next
    }

    /// End of the region.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes between the cursor and the end.
    #[must_use]
    pub fn available(&self) -> usize {
        self.limit - self.next
    }

    /// Bytes between the start and the cursor.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.next - self.base
    }

    /// Total span of the region.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.limit - self.base
    }

    /// No span at all; any access must go to the backend.
    #[must_use]
    pub fn is_collapsed(&self) -> bool {
        self.base == self.limit
    }

    /// Move the cursor forward by `n`, stopping at `limit`.
    pub fn bump(&mut self, n: usize) {
        self.next = (self.next + n).min(self.limit);
    }

    /// Move the cursor back by one. Returns false at `base`.
    pub fn unbump(&mut self) -> bool {
        if self.next > self.base {
            self.next -= 1;
            true
        } else {
            false
        }
    }

    /// Reposition the cursor to `base + pos`, clamped to the region.
    pub fn set_position(&mut self, pos: usize) {
        self.next = (self.base + pos).min(self.limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_cursor() {
        let r = CursorRegion::new(4, 10, 8);
        assert_eq!((r.base(), r.next(), r.limit()), (4, 8, 8));
        let r = CursorRegion::new(4, 0, 2);
        assert_eq!((r.base(), r.next(), r.limit()), (4, 4, 4));
        assert!(r.is_collapsed());
    }

    #[test]
    fn bump_and_unbump() {
        let mut r = CursorRegion::new(0, 0, 3);
        r.bump(2);
        assert_eq!(r.available(), 1);
        assert_eq!(r.consumed(), 2);
        r.bump(5);
        assert_eq!(r.next(), 3);
        assert!(r.unbump());
        assert_eq!(r.next(), 2);
        let mut start = CursorRegion::new(0, 0, 3);
        assert!(!start.unbump());
    }

    #[test]
    fn set_position_is_relative_to_base() {
        let mut r = CursorRegion::new(2, 2, 10);
        r.set_position(3);
        assert_eq!(r.next(), 5);
        r.set_position(100);
        assert_eq!(r.next(), 10);
        assert_eq!(r.capacity(), 8);
    }
}
