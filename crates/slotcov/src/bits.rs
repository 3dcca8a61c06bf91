//! Slot Bit-Vector
//!
//! Fixed-capacity bit-vector over the slot address space, backed by 64-bit
//! words. Setting a bit past the capacity grows the storage; every other
//! operation treats missing words as zero.
//!
//! Bit `i` lives in word `i / 64` at position `i % 64`:
//!
//! ```text
//! Word 0: [bit 0][bit 1]...[bit 63]
//! Word 1: [bit 64][bit 65]...[bit 127]
//! ```

use crate::result::{SlotcovError, SlotcovResult};
use std::io::{Read, Write};

const LOG_BITS: usize = 6;
const BITS_PER_WORD: usize = 1 << LOG_BITS;
const BIT_INDEX_MASK: usize = BITS_PER_WORD - 1;

/// 1-based position of the lowest set bit of each byte value; `0` means the byte is zero.
static LOWEST_BIT_TABLE: [u8; 256] = build_lowest_bit_table();

const fn build_lowest_bit_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut value = 1;
    while value < 256 {
        table[value] = (value as u8).trailing_zeros() as u8 + 1;
        value += 1;
    }
    table
}

/// Index of the lowest set bit of a non-zero word, scanning one byte at a time.
#[inline]
fn lowest_set_bit(word: u64) -> usize {
    let mut shift = 0;
    while shift < BITS_PER_WORD {
        let position = LOWEST_BIT_TABLE[((word >> shift) & 0xff) as usize];
        if position != 0 {
            return shift + position as usize - 1;
        }
        shift += 8;
    }
    BITS_PER_WORD
}

#[inline]
const fn words_for(nbits: usize) -> usize {
    (nbits + BIT_INDEX_MASK) >> LOG_BITS
}

/// Bit-vector over coverage slots.
///
/// Mutating operations set a "possibly modified" flag that callers can use
/// for change detection without diffing contents. The flag records that a
/// mutator ran, not that a bit actually changed.
#[derive(Debug, Clone, Default)]
pub struct BitVector {
    words: Vec<u64>,
    modified: bool,
}

impl BitVector {
    /// Create an all-zero vector with room for `nbits` slots
    #[must_use]
    pub fn new(nbits: usize) -> Self {
        Self {
            words: vec![0; words_for(nbits)],
            modified: false,
        }
    }

    /// Wrap raw words verbatim
    #[must_use]
    pub fn from_words(words: Vec<u64>) -> Self {
        Self {
            words,
            modified: false,
        }
    }

    /// Build a vector from per-slot hit counters: slot `i` is set iff `counters[i] != 0`
    #[must_use]
    pub fn for_hits(counters: &[i32]) -> Self {
        let mut bits = Self::new(counters.len());
        for (slot, _) in counters.iter().enumerate().filter(|(_, &c)| c != 0) {
            bits.words[slot >> LOG_BITS] |= 1 << (slot & BIT_INDEX_MASK);
        }
        bits
    }

    /// Mask with exactly the slots in `[start, end)` set
    #[must_use]
    pub fn range_mask(start: usize, end: usize, nbits: usize) -> Self {
        let mut mask = Self::new(nbits.max(end));
        mask.not_range_in_place(start, end);
        mask.modified = false;
        mask
    }

    /// Backing words
    #[inline]
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Number of backing words
    #[inline]
    #[must_use]
    pub fn word_len(&self) -> usize {
        self.words.len()
    }

    /// Number of slots addressable without growing
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.words.len() << LOG_BITS
    }

    /// True if any mutator has run since construction
    #[inline]
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    fn ensure_words(&mut self, count: usize) {
        if self.words.len() < count {
            self.words.resize(count, 0);
        }
    }

    #[inline]
    fn word(&self, index: usize) -> u64 {
        self.words.get(index).copied().unwrap_or(0)
    }

    /// Set a slot, growing storage if needed
    pub fn set(&mut self, slot: usize) {
        self.modified = true;
        let index = slot >> LOG_BITS;
        self.ensure_words(index + 1);
        self.words[index] |= 1 << (slot & BIT_INDEX_MASK);
    }

    /// Clear a slot
    pub fn clear(&mut self, slot: usize) {
        self.modified = true;
        if let Some(word) = self.words.get_mut(slot >> LOG_BITS) {
            *word &= !(1 << (slot & BIT_INDEX_MASK));
        }
    }

    /// Test a slot; slots past the capacity read as unset
    #[inline]
    #[must_use]
    pub fn get(&self, slot: usize) -> bool {
        self.word(slot >> LOG_BITS) & (1 << (slot & BIT_INDEX_MASK)) != 0
    }

    /// `self &= other`
    pub fn and_in_place(&mut self, other: &Self) {
        self.modified = true;
        for (index, word) in self.words.iter_mut().enumerate() {
            *word &= other.word(index);
        }
    }

    /// `self |= other`
    pub fn or_in_place(&mut self, other: &Self) {
        self.modified = true;
        self.ensure_words(other.words.len());
        for (word, theirs) in self.words.iter_mut().zip(&other.words) {
            *word |= theirs;
        }
    }

    /// `self &= !other`
    pub fn subtract_in_place(&mut self, other: &Self) {
        self.modified = true;
        for (word, theirs) in self.words.iter_mut().zip(&other.words) {
            *word &= !theirs;
        }
    }

    /// Flip every slot within the capacity
    pub fn not_in_place(&mut self) {
        self.modified = true;
        for word in &mut self.words {
            *word = !*word;
        }
    }

    /// Flip slots in `[start, end)`, growing storage to cover `end`
    pub fn not_range_in_place(&mut self, start: usize, end: usize) {
        self.modified = true;
        if start >= end {
            return;
        }
        self.ensure_words(words_for(end));
        let first = start >> LOG_BITS;
        let last = (end - 1) >> LOG_BITS;
        let head = u64::MAX << (start & BIT_INDEX_MASK);
        let tail = u64::MAX >> (BIT_INDEX_MASK - ((end - 1) & BIT_INDEX_MASK));
        if first == last {
            self.words[first] ^= head & tail;
        } else {
            self.words[first] ^= head;
            for word in &mut self.words[first + 1..last] {
                *word = !*word;
            }
            self.words[last] ^= tail;
        }
    }

    /// Lowest set slot at or after `from`, or `None` when there is none.
    ///
    /// Whole zero words are skipped; inside the first non-zero word the
    /// lowest bit is found a byte at a time via a lookup table.
    #[must_use]
    pub fn next_set_bit(&self, from: usize) -> Option<usize> {
        let mut index = from >> LOG_BITS;
        let mut word = self.words.get(index)? & (u64::MAX << (from & BIT_INDEX_MASK));
        while word == 0 {
            index += 1;
            word = *self.words.get(index)?;
        }
        Some((index << LOG_BITS) + lowest_set_bit(word))
    }

    /// True if any slot in `[start, end)` is set
    #[must_use]
    pub fn any_in_range(&self, start: usize, end: usize) -> bool {
        self.next_set_bit(start).is_some_and(|slot| slot < end)
    }

    /// Iterate set slots in ascending order
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.next_set_bit(0), move |&slot| {
            self.next_set_bit(slot + 1)
        })
    }

    /// Number of set slots
    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Index of the highest set slot plus one; zero when empty
    #[must_use]
    pub fn len(&self) -> usize {
        self.words
            .iter()
            .rposition(|&w| w != 0)
            .map_or(0, |index| {
                (index << LOG_BITS) + BITS_PER_WORD - self.words[index].leading_zeros() as usize
            })
    }

    /// True if no slot is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// True if both vectors share a set slot
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .any(|(a, b)| a & b != 0)
    }

    /// Merge this vector's set slots into `target` without allocating a new vector.
    ///
    /// Most per-test vectors are sparse, so zero words are skipped outright.
    pub fn apply_to<'t>(&self, target: &'t mut Self) -> &'t mut Self {
        target.modified = true;
        if let Some(last) = self.words.iter().rposition(|&w| w != 0) {
            target.ensure_words(last + 1);
            for (index, &word) in self.words[..=last].iter().enumerate() {
                if word != 0 {
                    target.words[index] |= word;
                }
            }
        }
        target
    }

    /// Copy resized to `nbits` slots: bits below `nbits` are kept, the rest dropped
    #[must_use]
    pub fn resized(&self, nbits: usize) -> Self {
        let count = words_for(nbits);
        let mut words = vec![0; count];
        let keep = count.min(self.words.len());
        words[..keep].copy_from_slice(&self.words[..keep]);
        let spare = nbits & BIT_INDEX_MASK;
        if spare != 0 && keep == count {
            words[count - 1] &= (1 << spare) - 1;
        }
        Self::from_words(words)
    }

    /// Write the word count followed by the raw words (big-endian)
    pub fn write_to<W: Write>(&self, out: &mut W) -> SlotcovResult<()> {
        let count = i32::try_from(self.words.len())
            .map_err(|_| SlotcovError::corrupt("bit-vector too large to persist"))?;
        out.write_all(&count.to_be_bytes())?;
        for word in &self.words {
            out.write_all(&word.to_be_bytes())?;
        }
        Ok(())
    }

    /// Read a vector written by [`BitVector::write_to`]
    pub fn read_from<R: Read>(input: &mut R) -> SlotcovResult<Self> {
        let mut count = [0u8; 4];
        input.read_exact(&mut count)?;
        let count = usize::try_from(i32::from_be_bytes(count))
            .map_err(|_| SlotcovError::corrupt("negative bit-vector word count"))?;
        let mut words = Vec::with_capacity(count);
        let mut buf = [0u8; 8];
        for _ in 0..count {
            input.read_exact(&mut buf)?;
            words.push(u64::from_be_bytes(buf));
        }
        Ok(Self::from_words(words))
    }
}

impl PartialEq for BitVector {
    /// Equal when the same slots are set, regardless of capacity
    fn eq(&self, other: &Self) -> bool {
        let n = self.words.len().max(other.words.len());
        (0..n).all(|index| self.word(index) == other.word(index))
    }
}

impl Eq for BitVector {}

impl FromIterator<usize> for BitVector {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut bits = Self::default();
        for slot in iter {
            bits.set(slot);
        }
        bits.modified = false;
        bits
    }
}
