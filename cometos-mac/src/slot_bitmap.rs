//! Fixed-capacity bit vector for superframe slot bookkeeping
//!
//! A [`SlotBitmap`] stores up to `32 * W` bits. The runtime length selects how many of them are
//! meaningful; every operation ignores positions at or beyond the length, so no access can go
//! out of bounds. Bits beyond the length are kept cleared.

const WORD_BITS: usize = u32::BITS as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotBitmap<const W: usize> {
    words: [u32; W],
    length: usize,
}

impl<const W: usize> SlotBitmap<W> {
    pub const MAX_LENGTH: usize = W * WORD_BITS;

    /// Creates an empty bitmap of zero length.
    pub const fn new() -> Self {
        Self {
            words: [0; W],
            length: 0,
        }
    }

    pub fn with_length(length: usize, value: bool) -> Self {
        let mut bitmap = Self::new();
        bitmap.set_length(length, value);
        bitmap
    }

    /// Resizes the bitmap and sets every bit to `value`.
    ///
    /// Lengths above [`Self::MAX_LENGTH`] are clamped.
    pub fn set_length(&mut self, length: usize, value: bool) {
        self.length = length.min(Self::MAX_LENGTH);
        self.fill(value);
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn fill(&mut self, value: bool) {
        let pattern = if value { u32::MAX } else { 0 };
        for (idx, word) in self.words.iter_mut().enumerate() {
            *word = pattern & Self::valid_mask(self.length, idx);
        }
    }

    /// Returns the bit at `position`, `false` beyond the length.
    pub fn get(&self, position: usize) -> bool {
        if position >= self.length {
            return false;
        }
        (self.words[position / WORD_BITS] >> (position % WORD_BITS)) & 0x1 != 0
    }

    /// Sets the bit at `position`. Ignored beyond the length.
    pub fn set(&mut self, position: usize, value: bool) {
        if position >= self.length {
            return;
        }
        let bit = 1u32 << (position % WORD_BITS);
        let word = &mut self.words[position / WORD_BITS];
        if value {
            *word |= bit;
        } else {
            *word &= !bit;
        }
    }

    /// Number of bits within the length equal to `value`
    pub fn count(&self, value: bool) -> usize {
        let ones: usize = self.words.iter().map(|word| word.count_ones() as usize).sum();
        if value { ones } else { self.length - ones }
    }

    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    /// Sets bit `offset + i` to `self[offset + i] OR mask[i]` for every bit of the mask.
    pub fn set_operation_join<const MW: usize>(&mut self, mask: &SlotBitmap<MW>, offset: usize) {
        for position in mask.set_bits() {
            self.set(offset.saturating_add(position), true);
        }
    }

    /// Sets bit `offset + i` to `self[offset + i] AND NOT mask[i]` for every bit of the mask.
    pub fn set_operation_complement<const MW: usize>(
        &mut self,
        mask: &SlotBitmap<MW>,
        offset: usize,
    ) {
        for position in mask.set_bits() {
            self.set(offset.saturating_add(position), false);
        }
    }

    pub fn first_unset(&self) -> Option<usize> {
        let position = self.find_from(0, false);
        (position < self.length).then_some(position)
    }

    /// Iterates over the positions of set bits.
    pub fn set_bits(&self) -> BitCursor<'_, W> {
        self.begin_set_bits()
    }

    /// Iterates over the positions of unset bits.
    pub fn unset_bits(&self) -> BitCursor<'_, W> {
        self.begin_unset_bits()
    }

    pub fn begin_set_bits(&self) -> BitCursor<'_, W> {
        BitCursor::begin(self, true)
    }

    pub fn end_set_bits(&self) -> BitCursor<'_, W> {
        BitCursor::end(self, true)
    }

    pub fn begin_unset_bits(&self) -> BitCursor<'_, W> {
        BitCursor::begin(self, false)
    }

    pub fn end_unset_bits(&self) -> BitCursor<'_, W> {
        BitCursor::end(self, false)
    }

    /// Position of the first bit at or after `from` equal to `value`, or the length
    fn find_from(&self, from: usize, value: bool) -> usize {
        let mut idx = from / WORD_BITS;
        let mut skip = from % WORD_BITS;
        while idx < W && idx * WORD_BITS < self.length {
            let word = if value {
                self.words[idx]
            } else {
                !self.words[idx] & Self::valid_mask(self.length, idx)
            };
            let candidates = word & (u32::MAX << skip);
            if candidates != 0 {
                let position = idx * WORD_BITS + candidates.trailing_zeros() as usize;
                return position.min(self.length);
            }
            idx += 1;
            skip = 0;
        }
        self.length
    }

    /// Mask of the bits of word `idx` that lie below `length`
    fn valid_mask(length: usize, idx: usize) -> u32 {
        let start = idx * WORD_BITS;
        if length >= start + WORD_BITS {
            u32::MAX
        } else if length <= start {
            0
        } else {
            u32::MAX >> (WORD_BITS - (length - start))
        }
    }
}

impl<const W: usize> Default for SlotBitmap<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward cursor over the positions holding a given bit value
///
/// A cursor is an iterator yielding its current position before advancing. It compares equal
/// to the matching `end_*` cursor once it moved past the last matching bit; the end position
/// equals the bitmap length.
#[derive(Debug, Clone)]
pub struct BitCursor<'a, const W: usize> {
    bitmap: &'a SlotBitmap<W>,
    position: usize,
    value: bool,
}

impl<'a, const W: usize> BitCursor<'a, W> {
    fn begin(bitmap: &'a SlotBitmap<W>, value: bool) -> Self {
        Self {
            bitmap,
            position: bitmap.find_from(0, value),
            value,
        }
    }

    fn end(bitmap: &'a SlotBitmap<W>, value: bool) -> Self {
        Self {
            bitmap,
            position: bitmap.length,
            value,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_end(&self) -> bool {
        self.position >= self.bitmap.length
    }
}

impl<const W: usize> PartialEq for BitCursor<'_, W> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.bitmap, other.bitmap)
            && self.value == other.value
            && self.position == other.position
    }
}

impl<const W: usize> Iterator for BitCursor<'_, W> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_end() {
            return None;
        }
        let current = self.position;
        self.position = self.bitmap.find_from(current + 1, self.value);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use std::vec::Vec;

    type Bitmap = SlotBitmap<4>;

    fn assert_counts(bitmap: &Bitmap) {
        assert_eq!(bitmap.count(true) + bitmap.count(false), bitmap.length());
    }

    #[test]
    fn test_complement_at_offset() {
        let mut bitmap = Bitmap::with_length(20, true);
        let mask = SlotBitmap::<1>::with_length(10, true);
        assert_counts(&bitmap);

        bitmap.set_operation_complement(&mask, 5);
        assert_counts(&bitmap);

        for position in 0..20 {
            assert_eq!(bitmap.get(position), !(5..15).contains(&position));
        }
        assert_eq!(bitmap.count(false), 10);
    }

    #[test]
    fn test_join_across_word_boundary() {
        let mut bitmap = Bitmap::with_length(70, false);
        let mut mask = SlotBitmap::<1>::with_length(8, false);
        mask.set(0, true);
        mask.set(7, true);

        bitmap.set_operation_join(&mask, 29);
        assert_counts(&bitmap);
        let set: Vec<usize> = bitmap.begin_set_bits().collect();
        assert_eq!(set, [29, 36]);

        // Mask bits landing beyond the length are ignored
        bitmap.set_operation_join(&mask, 63);
        let set: Vec<usize> = bitmap.begin_set_bits().collect();
        assert_eq!(set, [29, 36, 63]);
        assert_counts(&bitmap);
    }

    #[test]
    fn test_out_of_range_access() {
        let mut bitmap = Bitmap::with_length(10, false);
        bitmap.set(10, true);
        bitmap.set(usize::MAX, true);
        assert!(bitmap.is_zero());
        assert!(!bitmap.get(10));

        bitmap.set_length(Bitmap::MAX_LENGTH + 5, true);
        assert_eq!(bitmap.length(), Bitmap::MAX_LENGTH);
        assert_eq!(bitmap.count(true), Bitmap::MAX_LENGTH);
        assert_eq!(bitmap.first_unset(), None);
    }

    #[test]
    fn test_shrinking_clears_tail() {
        let mut bitmap = Bitmap::with_length(40, true);
        bitmap.set_length(3, true);
        assert_eq!(bitmap.count(true), 3);
        assert_eq!(bitmap.count(false), 0);
        bitmap.set_length(40, false);
        assert!(bitmap.is_zero());
    }

    #[test]
    fn test_iteration() {
        let mut bitmap = Bitmap::with_length(33, false);
        for position in [0, 4, 31, 32] {
            bitmap.set(position, true);
        }

        let set: Vec<usize> = bitmap.begin_set_bits().collect();
        assert_eq!(set, [0, 4, 31, 32]);

        let unset: Vec<usize> = bitmap.begin_unset_bits().collect();
        assert_eq!(unset.len(), 29);
        assert_eq!(unset.first(), Some(&1));
        assert_eq!(unset.last(), Some(&30));
        assert_eq!(bitmap.first_unset(), Some(1));

        // Restartable: a new cursor reflects the current state
        bitmap.set(4, false);
        let set: Vec<usize> = bitmap.begin_set_bits().collect();
        assert_eq!(set, [0, 31, 32]);
    }

    #[test]
    fn test_end_cursor() {
        let mut bitmap = Bitmap::with_length(12, false);
        assert!(bitmap.begin_set_bits() == bitmap.end_set_bits());
        assert_eq!(bitmap.end_set_bits().position(), 12);

        bitmap.set(11, true);
        let mut cursor = bitmap.begin_set_bits();
        assert!(cursor != bitmap.end_set_bits());
        assert_eq!(cursor.next(), Some(11));
        assert!(cursor == bitmap.end_set_bits());
        assert_eq!(cursor.next(), None);
    }
}
