//! The [`LengthCache`] shared by the two write passes.
use crate::common::unit_error;

/// Ordered byte lengths computed while estimating parameter sizes.
///
/// Writing a statement parameters is done in two passes. The first pass call
/// `validate_and_get_length` on every parameter, codecs whose length is costly
/// to compute (utf8 text, nested array elements) [`set`][1] it here. After
/// [`rewind`][2], the second pass call `validate_and_get_length` again in the
/// same order, and codecs [`get`][3] the cached lengths back in the order they
/// were produced.
///
/// [1]: LengthCache::set
/// [2]: LengthCache::rewind
/// [3]: LengthCache::get
#[derive(Debug, Clone, Default)]
pub struct LengthCache {
    lengths: Vec<i32>,
    position: usize,
    populated: bool,
}

impl LengthCache {
    /// Create new empty cache.
    pub fn new() -> LengthCache {
        Self::default()
    }

    /// Returns `true` once the first pass is complete and [`rewind`][LengthCache::rewind] is called.
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Returns the number of cached lengths.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    /// Returns `true` if no length is cached.
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Returns the current read position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Append a length, returning it back.
    pub fn set(&mut self, len: i32) -> i32 {
        self.lengths.push(len);
        self.position += 1;
        len
    }

    /// Append a placeholder whose value is only known after nested lengths are set.
    ///
    /// Returns the slot to [`fill`][LengthCache::fill].
    pub fn reserve(&mut self) -> usize {
        let slot = self.lengths.len();
        self.set(0);
        slot
    }

    /// Fill a slot returned by [`reserve`][LengthCache::reserve].
    pub fn fill(&mut self, slot: usize, len: i32) -> Result<(), LengthCacheError> {
        let Some(cached) = self.lengths.get_mut(slot) else {
            return Err(LengthCacheError);
        };
        *cached = len;
        Ok(())
    }

    /// Read the next length, in the order they were set.
    pub fn get(&mut self) -> Result<i32, LengthCacheError> {
        let len = *self.lengths.get(self.position).ok_or(LengthCacheError)?;
        self.position += 1;
        Ok(len)
    }

    /// Returns the length most recently returned by [`get`][LengthCache::get] or [`set`][LengthCache::set].
    pub fn last(&self) -> Result<i32, LengthCacheError> {
        self.position
            .checked_sub(1)
            .and_then(|i| self.lengths.get(i))
            .copied()
            .ok_or(LengthCacheError)
    }

    /// Start reading lengths from the beginning.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.populated = true;
    }

    /// Remove all lengths, ready for a new first pass.
    pub fn clear(&mut self) {
        self.lengths.clear();
        self.position = 0;
        self.populated = false;
    }
}

unit_error! {
    /// An error when the write pass consume more lengths than the estimation pass produced.
    pub struct LengthCacheError("length cache exhausted, write pass diverged from estimation pass");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut cache = LengthCache::new();
        assert_eq!(cache.set(3), 3);
        let slot = cache.reserve();
        cache.set(7);
        cache.fill(slot, 11).unwrap();
        assert_eq!(cache.last(), Ok(7));
        assert!(!cache.is_populated());

        cache.rewind();
        assert!(cache.is_populated());
        assert_eq!(cache.get(), Ok(3));
        assert_eq!(cache.get(), Ok(11));
        assert_eq!(cache.last(), Ok(11));
        assert_eq!(cache.get(), Ok(7));
        assert_eq!(cache.get(), Err(LengthCacheError));
    }

    #[test]
    fn clear_resets() {
        let mut cache = LengthCache::new();
        cache.set(1);
        cache.rewind();
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.is_populated());
        assert_eq!(cache.last(), Err(LengthCacheError));
    }
}
