//! Sub-resource activity algebra (component A).
//!
//! No direct precedent for this algebra exists in the reference engine (its
//! own, now-superseded resource-usage tracker in `graph_template.rs` worked at
//! whole-pass granularity, not per-sub-resource-bitmask granularity). The
//! representation below follows the same idea the source describes — a
//! compact word that is either an inline bitmap or a handle to heap storage —
//! but expresses the tag as a safe Rust enum rather than a raw reinterpreted
//! pointer, in the spirit of `core/src/cast.rs`'s reinterpret helpers without
//! their unsafety: an enum discriminant is the idiomatic Rust way to carry
//! "this word means two different things" that the source encodes by
//! sentinel convention on a single integer.

use smallvec::SmallVec;

use crate::error::IncompatibleRangeError;

/// Bits beyond this count are always packed into heap storage; at or below,
/// a single `u64` holds the whole mask inline. Kept at 63 (not 64) so that
/// "all bits 1" is an unambiguous full-resource sentinel even when
/// `subresource_count == 64`.
const INLINE_BIT_LIMIT: u32 = 63;

fn word_count(subresource_count: u32) -> usize {
    ((subresource_count as usize) + 63) / 64
}

/// A bitmask over a texture's (slice, level) cells, or an inline word when
/// the resource is small enough. Move-only in spirit: `Clone` performs a deep
/// copy of heap storage rather than aliasing it, matching the source's
/// explicit-deep-copy requirement.
#[derive(Clone, Debug)]
pub enum SubresourceMask {
    Inline(u64),
    Heap(Box<[u64]>),
}

impl SubresourceMask {
    pub fn empty(subresource_count: u32) -> Self {
        if subresource_count <= INLINE_BIT_LIMIT {
            SubresourceMask::Inline(0)
        } else {
            SubresourceMask::Heap(vec![0u64; word_count(subresource_count)].into_boxed_slice())
        }
    }

    pub fn full(subresource_count: u32) -> Self {
        let mut mask = Self::empty(subresource_count);
        mask.fill_all(subresource_count);
        mask
    }

    fn fill_all(&mut self, subresource_count: u32) {
        match self {
            SubresourceMask::Inline(word) => {
                *word = if subresource_count == 0 {
                    0
                } else {
                    (1u64 << subresource_count) - 1
                };
            }
            SubresourceMask::Heap(words) => {
                for w in words.iter_mut() {
                    *w = u64::MAX;
                }
                Self::mask_trailing_bits(words, subresource_count);
            }
        }
    }

    fn mask_trailing_bits(words: &mut [u64], subresource_count: u32) {
        let full_words = (subresource_count / 64) as usize;
        let remainder = subresource_count % 64;
        if remainder != 0 && full_words < words.len() {
            words[full_words] &= (1u64 << remainder) - 1;
        }
    }

    pub fn set_bit(&mut self, index: u32, subresource_count: u32) {
        match self {
            SubresourceMask::Inline(word) => *word |= 1u64 << index,
            SubresourceMask::Heap(words) => {
                words[(index / 64) as usize] |= 1u64 << (index % 64);
                Self::mask_trailing_bits(words, subresource_count);
            }
        }
    }

    pub fn clear_bit(&mut self, index: u32) {
        match self {
            SubresourceMask::Inline(word) => *word &= !(1u64 << index),
            SubresourceMask::Heap(words) => words[(index / 64) as usize] &= !(1u64 << (index % 64)),
        }
    }

    pub fn get_bit(&self, index: u32) -> bool {
        match self {
            SubresourceMask::Inline(word) => (word >> index) & 1 != 0,
            SubresourceMask::Heap(words) => (words[(index / 64) as usize] >> (index % 64)) & 1 != 0,
        }
    }

    pub fn is_inactive(&self) -> bool {
        match self {
            SubresourceMask::Inline(word) => *word == 0,
            SubresourceMask::Heap(words) => words.iter().all(|w| *w == 0),
        }
    }

    pub fn is_full(&self, subresource_count: u32) -> bool {
        match self {
            SubresourceMask::Inline(word) => {
                let full = if subresource_count == 0 {
                    0
                } else {
                    (1u64 << subresource_count) - 1
                };
                *word == full
            }
            SubresourceMask::Heap(words) => {
                let full_words = (subresource_count / 64) as usize;
                let remainder = subresource_count % 64;
                if words[..full_words].iter().any(|w| *w != u64::MAX) {
                    return false;
                }
                if remainder != 0 {
                    let expected = (1u64 << remainder) - 1;
                    words.get(full_words).copied().unwrap_or(0) == expected
                } else {
                    true
                }
            }
        }
    }

    fn combine(&self, other: &Self, f: impl Fn(u64, u64) -> u64, subresource_count: u32) -> Self {
        match (self, other) {
            (SubresourceMask::Inline(a), SubresourceMask::Inline(b)) => SubresourceMask::Inline(f(*a, *b)),
            _ => {
                let a = self.as_words(subresource_count);
                let b = other.as_words(subresource_count);
                let mut out: Vec<u64> = a.iter().zip(b.iter()).map(|(x, y)| f(*x, *y)).collect();
                Self::mask_trailing_bits(&mut out, subresource_count);
                if subresource_count <= INLINE_BIT_LIMIT {
                    SubresourceMask::Inline(out.first().copied().unwrap_or(0))
                } else {
                    SubresourceMask::Heap(out.into_boxed_slice())
                }
            }
        }
    }

    fn as_words(&self, subresource_count: u32) -> SmallVec<[u64; 4]> {
        match self {
            SubresourceMask::Inline(word) => SmallVec::from_slice(&[*word]),
            SubresourceMask::Heap(words) => {
                let mut v = SmallVec::with_capacity(word_count(subresource_count));
                v.extend_from_slice(words);
                v
            }
        }
    }

    pub fn union(&self, other: &Self, subresource_count: u32) -> Self {
        self.combine(other, |a, b| a | b, subresource_count)
    }

    pub fn intersect(&self, other: &Self, subresource_count: u32) -> Self {
        self.combine(other, |a, b| a & b, subresource_count)
    }

    pub fn subtract(&self, other: &Self, subresource_count: u32) -> Self {
        self.combine(other, |a, b| a & !b, subresource_count)
    }

    pub fn intersects(&self, other: &Self, subresource_count: u32) -> bool {
        !self.intersect(other, subresource_count).is_inactive()
    }
}

impl PartialEq for SubresourceMask {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SubresourceMask::Inline(a), SubresourceMask::Inline(b)) => a == b,
            _ => {
                // Only ever compared after canonicalisation at equal subresource
                // counts by the caller, so a plain word-by-word compare is valid.
                let count = match self {
                    SubresourceMask::Inline(_) => 0,
                    SubresourceMask::Heap(w) => w.len() as u32 * 64,
                };
                self.as_words(count) == other.as_words(count)
            }
        }
    }
}

/// A half-open byte range `[start, end)` within a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    fn hull(&self, other: &Self) -> Self {
        ByteRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    fn overlap(&self, other: &Self) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            Some(ByteRange { start, end })
        } else {
            None
        }
    }
}

/// Which sub-part of a resource a usage applies to. Tagged union over the two
/// resource shapes (buffer: byte range; texture: sub-resource bitmask) plus
/// the two degenerate cases (nothing active, everything active).
#[derive(Clone, Debug, PartialEq)]
pub enum ActiveResourceRange {
    Inactive,
    FullResource,
    Buffer(ByteRange),
    Texture(SubresourceMask),
}

impl ActiveResourceRange {
    pub fn is_inactive(&self) -> bool {
        matches!(self, ActiveResourceRange::Inactive)
    }

    /// Collapses a texture mask whose bits are all set/all clear to the
    /// canonical `FullResource`/`Inactive` form, and a buffer range that spans
    /// the whole resource to `FullResource`. Operations on this type must
    /// always return a canonicalised value.
    pub fn canonicalize(self, subresource_count: u32, buffer_len: u64) -> Self {
        match self {
            ActiveResourceRange::Texture(mask) => {
                if mask.is_inactive() {
                    ActiveResourceRange::Inactive
                } else if mask.is_full(subresource_count) {
                    ActiveResourceRange::FullResource
                } else {
                    ActiveResourceRange::Texture(mask)
                }
            }
            ActiveResourceRange::Buffer(range) => {
                if range.is_empty() {
                    ActiveResourceRange::Inactive
                } else if range.start == 0 && range.end >= buffer_len {
                    ActiveResourceRange::FullResource
                } else {
                    ActiveResourceRange::Buffer(range)
                }
            }
            other => other,
        }
    }

    /// One-line panic site for every public combinator below: the internal
    /// helpers return `Result` so the panic message lives in exactly one
    /// place rather than once per call site.
    fn union_checked(&self, other: &Self, subresource_count: u32) -> Result<Self, IncompatibleRangeError> {
        match (self, other) {
            (ActiveResourceRange::FullResource, _) | (_, ActiveResourceRange::FullResource) => {
                Ok(ActiveResourceRange::FullResource)
            }
            (ActiveResourceRange::Inactive, x) | (x, ActiveResourceRange::Inactive) => Ok(x.clone()),
            (ActiveResourceRange::Buffer(a), ActiveResourceRange::Buffer(b)) => Ok(ActiveResourceRange::Buffer(a.hull(b))),
            (ActiveResourceRange::Texture(a), ActiveResourceRange::Texture(b)) => {
                Ok(ActiveResourceRange::Texture(a.union(b, subresource_count)))
            }
            _ => Err(IncompatibleRangeError {}),
        }
    }

    pub fn union(&self, other: &Self, subresource_count: u32, buffer_len: u64) -> Self {
        self.union_checked(other, subresource_count)
            .expect("union of incompatible ActiveResourceRange variants")
            .canonicalize(subresource_count, buffer_len)
    }

    fn intersection_checked(&self, other: &Self, subresource_count: u32) -> Result<Self, IncompatibleRangeError> {
        match (self, other) {
            (ActiveResourceRange::Inactive, _) | (_, ActiveResourceRange::Inactive) => Ok(ActiveResourceRange::Inactive),
            (ActiveResourceRange::FullResource, x) | (x, ActiveResourceRange::FullResource) => Ok(x.clone()),
            (ActiveResourceRange::Buffer(a), ActiveResourceRange::Buffer(b)) => Ok(match a.overlap(b) {
                Some(r) => ActiveResourceRange::Buffer(r),
                None => ActiveResourceRange::Inactive,
            }),
            (ActiveResourceRange::Texture(a), ActiveResourceRange::Texture(b)) => {
                Ok(ActiveResourceRange::Texture(a.intersect(b, subresource_count)))
            }
            _ => Err(IncompatibleRangeError {}),
        }
    }

    pub fn intersection(&self, other: &Self, subresource_count: u32, buffer_len: u64) -> Self {
        self.intersection_checked(other, subresource_count)
            .expect("intersection of incompatible ActiveResourceRange variants")
            .canonicalize(subresource_count, buffer_len)
    }

    /// Only `Texture - Texture` and `FullResource - Texture` are supported.
    /// Buffer subtraction is an explicit programmer-error panic, matching the
    /// source exactly (see DESIGN.md open question #2) rather than introducing
    /// an interval-set representation to support it; true variant mismatches
    /// (not buffer subtraction) go through the same `IncompatibleRangeError`
    /// helper as `union`/`intersection`.
    fn subtract_checked(&self, other: &Self, subresource_count: u32) -> Result<Self, IncompatibleRangeError> {
        match (self, other) {
            (ActiveResourceRange::Inactive, _) => Ok(ActiveResourceRange::Inactive),
            (x, ActiveResourceRange::Inactive) => Ok(x.clone()),
            (_, ActiveResourceRange::FullResource) => Ok(ActiveResourceRange::Inactive),
            (ActiveResourceRange::FullResource, ActiveResourceRange::Texture(b)) => {
                let full = SubresourceMask::full(subresource_count);
                Ok(ActiveResourceRange::Texture(full.subtract(b, subresource_count)))
            }
            (ActiveResourceRange::Texture(a), ActiveResourceRange::Texture(b)) => {
                Ok(ActiveResourceRange::Texture(a.subtract(b, subresource_count)))
            }
            (ActiveResourceRange::Buffer(_), _) | (_, ActiveResourceRange::Buffer(_)) => {
                panic!("buffer range subtraction is not supported")
            }
            _ => Err(IncompatibleRangeError {}),
        }
    }

    pub fn subtract(&self, other: &Self, subresource_count: u32, buffer_len: u64) -> Self {
        self.subtract_checked(other, subresource_count)
            .expect("subtract of incompatible ActiveResourceRange variants")
            .canonicalize(subresource_count, buffer_len)
    }

    pub fn intersects(&self, other: &Self, subresource_count: u32, buffer_len: u64) -> bool {
        !self.intersection(other, subresource_count, buffer_len).is_inactive()
    }

    /// Buffer-only: shift the active range by a byte offset, used when a
    /// sub-allocation's local range needs translating into its parent buffer.
    pub fn offset(&self, by_bytes: i64) -> Self {
        match self {
            ActiveResourceRange::Buffer(r) => ActiveResourceRange::Buffer(ByteRange {
                start: (r.start as i64 + by_bytes).max(0) as u64,
                end: (r.end as i64 + by_bytes).max(0) as u64,
            }),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_buffer_union_intersect() {
        let a = ActiveResourceRange::Buffer(ByteRange { start: 10, end: 30 });
        let b = ActiveResourceRange::Buffer(ByteRange { start: 20, end: 40 });
        assert_eq!(a.union(&b, 0, 1000), ActiveResourceRange::Buffer(ByteRange { start: 10, end: 40 }));
        assert_eq!(a.intersection(&b, 0, 1000), ActiveResourceRange::Buffer(ByteRange { start: 20, end: 30 }));
        let c = ActiveResourceRange::Buffer(ByteRange { start: 40, end: 50 });
        assert!(!a.intersects(&c, 0, 1000));
    }

    #[test]
    fn s2_texture_mask_collapse() {
        let count = 6;
        let mut mask = SubresourceMask::empty(count);
        for i in 0..6 {
            mask.set_bit(i, count);
        }
        let range = ActiveResourceRange::Texture(mask).canonicalize(count, 0);
        assert_eq!(range, ActiveResourceRange::FullResource);

        let mut mask = SubresourceMask::full(count);
        mask.clear_bit(3);
        let range = ActiveResourceRange::Texture(mask).canonicalize(count, 0);
        match range {
            ActiveResourceRange::Texture(SubresourceMask::Inline(word)) => assert_eq!(word, 0b110111),
            other => panic!("expected inline texture mask, got {other:?}"),
        }
    }

    #[test]
    fn union_is_commutative_associative_idempotent() {
        let count = 6;
        let mut m1 = SubresourceMask::empty(count);
        m1.set_bit(0, count);
        m1.set_bit(2, count);
        let a = ActiveResourceRange::Texture(m1);
        let mut m2 = SubresourceMask::empty(count);
        m2.set_bit(2, count);
        m2.set_bit(4, count);
        let b = ActiveResourceRange::Texture(m2);

        assert_eq!(a.union(&b, count, 0), b.union(&a, count, 0));
        assert_eq!(a.union(&a, count, 0), a);
        assert_eq!(a.intersection(&a, count, 0), a);
        let ab_intersect = a.intersection(&b, count, 0);
        assert!(a.intersects(&b, count, 0) == !ab_intersect.is_inactive());
    }

    #[test]
    fn union_with_inactive_and_full_absorb() {
        let a = ActiveResourceRange::Buffer(ByteRange { start: 0, end: 10 });
        assert_eq!(a.union(&ActiveResourceRange::Inactive, 0, 100), a.clone());
        assert_eq!(a.union(&ActiveResourceRange::FullResource, 0, 100), ActiveResourceRange::FullResource);
    }

    #[test]
    fn subtract_is_disjoint_from_subtrahend() {
        let count = 8;
        let mut m1 = SubresourceMask::full(count);
        let mut m2 = SubresourceMask::empty(count);
        m2.set_bit(3, count);
        let diff = m1.subtract(&m2, count);
        assert!(!diff.get_bit(3));
        m1.clear_bit(3);
        assert_eq!(diff, m1);
    }

    #[test]
    #[should_panic]
    fn buffer_subtraction_panics() {
        let a = ActiveResourceRange::Buffer(ByteRange { start: 0, end: 10 });
        let b = ActiveResourceRange::Buffer(ByteRange { start: 2, end: 4 });
        let _ = a.subtract(&b, 0, 100);
    }
}
