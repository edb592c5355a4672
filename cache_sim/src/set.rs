use std::ops::Range;

use thiserror::Error;

use crate::geometry::Geometry;

/// The LRU order and the tag array disagree. Always repaired in place; the
/// run goes on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("set {set}: touched tag {tag:#x} is not in the LRU order; reinserted as most recently used")]
    MissingFromLru { set: usize, tag: u32 },
    #[error("set {set}: LRU order names tag {tag:#x} which no line holds; entry dropped")]
    StaleLruEntry { set: usize, tag: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    Empty,
    PartiallyResident,
    FullyResident,
}

/// result of [`CacheSet::allocate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocated {
    pub way: usize,
    /// tag that previously owned `way`, if the set was full.
    pub evicted: Option<u32>,
    pub repaired: Option<ConsistencyError>,
}

/// packed residency bits of every line, `line_bytes` bits per line.
struct Directory {
    words: Vec<u64>,
}

impl Directory {
    fn new(bits: usize) -> Self {
        Self {
            words: vec![0; bits.div_ceil(64)],
        }
    }
    #[inline]
    fn get(&self, bit: usize) -> bool {
        self.words[bit / 64] & (1 << (bit % 64)) != 0
    }
    #[inline]
    fn set(&mut self, bit: usize) {
        self.words[bit / 64] |= 1 << (bit % 64);
    }
    fn count(&self, bits: Range<usize>) -> usize {
        bits.filter(|&b| self.get(b)).count()
    }
    fn clear(&mut self, bits: Range<usize>) {
        for b in bits {
            self.words[b / 64] &= !(1 << (b % 64));
        }
    }
}

/// Every line of one cache in flat arrays.
///
/// Line `(set, way)` lives at `set * K + way` in `tags`; its directory bits
/// start at `(set * K + way) * L`. The LRU order of a set occupies the `K`
/// slots of `recency` starting at `set * K`, least recently used first, and
/// only its first `resident[set]` slots are meaningful.
pub struct Lines {
    associativity: usize,
    line_bytes: usize,
    tags: Vec<Option<u32>>,
    directory: Directory,
    recency: Vec<u32>,
    resident: Vec<usize>,
}

impl Lines {
    pub fn new(geometry: &Geometry) -> Self {
        let k = geometry.associativity();
        let n = geometry.sets();
        let l = geometry.line_bytes();
        Self {
            associativity: k,
            line_bytes: l,
            tags: vec![None; n * k],
            directory: Directory::new(n * k * l),
            recency: vec![0; n * k],
            resident: vec![0; n],
        }
    }

    /// borrows set `index`. panics if `index` is out of range.
    pub fn set(&mut self, index: usize) -> CacheSet<'_> {
        let k = self.associativity;
        let lines = index * k..(index + 1) * k;
        CacheSet {
            index,
            line_bytes: self.line_bytes,
            first_line: lines.start,
            tags: &mut self.tags[lines.clone()],
            recency: &mut self.recency[lines],
            resident: &mut self.resident[index],
            directory: &mut self.directory,
        }
    }

    /// empties the LRU order of set `index` while its lines stay resident.
    #[cfg(test)]
    pub(crate) fn forget_recency(&mut self, index: usize) {
        self.resident[index] = 0;
    }
}

/// Mutable view of one set of a [`Lines`] arena.
///
/// Lookups and LRU maintenance scan the `K` ways linearly. Associativity is
/// at most 8 in practice, so this beats keeping an index-linked list in sync.
pub struct CacheSet<'a> {
    index: usize,
    line_bytes: usize,
    first_line: usize,
    tags: &'a mut [Option<u32>],
    recency: &'a mut [u32],
    resident: &'a mut usize,
    directory: &'a mut Directory,
}

impl CacheSet<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn lookup(&self, tag: u32) -> Option<usize> {
        self.tags.iter().position(|&t| t == Some(tag))
    }

    pub fn tag(&self, way: usize) -> Option<u32> {
        self.tags[way]
    }

    /// resident tags, least recently used first.
    pub fn lru_order(&self) -> &[u32] {
        &self.recency[..*self.resident]
    }

    /// installs `tag` in an empty way, or in the way of the least recently
    /// used tag when the set is full. the chosen way starts with an empty
    /// directory and `tag` becomes the most recently used.
    pub fn allocate(&mut self, tag: u32) -> Allocated {
        let (way, evicted, repaired) = match self.tags.iter().position(Option::is_none) {
            Some(way) => (way, None, None),
            None => self.evict(),
        };
        self.tags[way] = Some(tag);
        let bits = self.bits_of(way);
        self.directory.clear(bits);
        self.push_mru(tag);
        Allocated {
            way,
            evicted,
            repaired,
        }
    }

    pub fn mark_resident(&mut self, way: usize, offset: usize) {
        let bit = self.bit_of(way, offset);
        self.directory.set(bit);
    }

    pub fn is_resident(&self, way: usize, offset: usize) -> bool {
        self.directory.get(self.bit_of(way, offset))
    }

    pub fn line_state(&self, way: usize) -> LineState {
        if self.tags[way].is_none() {
            return LineState::Empty;
        }
        if self.directory.count(self.bits_of(way)) == self.line_bytes {
            LineState::FullyResident
        } else {
            LineState::PartiallyResident
        }
    }

    /// makes `tag` the most recently used. if `tag` is missing from the LRU
    /// order it is appended anyway and the inconsistency is returned.
    pub fn touch(&mut self, tag: u32) -> Result<(), ConsistencyError> {
        let len = *self.resident;
        match self.recency[..len].iter().position(|&t| t == tag) {
            Some(pos) => {
                self.recency[pos..len].rotate_left(1);
                Ok(())
            }
            None => {
                self.push_mru(tag);
                Err(ConsistencyError::MissingFromLru {
                    set: self.index,
                    tag,
                })
            }
        }
    }

    /// pops the LRU head and returns the way it held. entries naming no line
    /// are dropped until one does; way 0 is the victim if none does.
    fn evict(&mut self) -> (usize, Option<u32>, Option<ConsistencyError>) {
        let mut repaired = None;
        while *self.resident > 0 {
            let head = self.pop_lru();
            match self.lookup(head) {
                Some(way) => return (way, Some(head), repaired),
                None => {
                    repaired.get_or_insert(ConsistencyError::StaleLruEntry {
                        set: self.index,
                        tag: head,
                    });
                }
            }
        }
        let evicted = self.tags[0];
        if let Some(tag) = evicted {
            repaired.get_or_insert(ConsistencyError::MissingFromLru {
                set: self.index,
                tag,
            });
        }
        (0, evicted, repaired)
    }

    fn pop_lru(&mut self) -> u32 {
        let len = *self.resident;
        let head = self.recency[0];
        self.recency[..len].rotate_left(1);
        *self.resident -= 1;
        head
    }

    fn push_mru(&mut self, tag: u32) {
        let len = *self.resident;
        if let Some(pos) = self.recency[..len].iter().position(|&t| t == tag) {
            self.recency[pos..len].rotate_left(1);
            return;
        }
        if len == self.recency.len() {
            // full of stale entries; the oldest goes
            self.recency.rotate_left(1);
            self.recency[len - 1] = tag;
        } else {
            self.recency[len] = tag;
            *self.resident += 1;
        }
    }

    fn bit_of(&self, way: usize, offset: usize) -> usize {
        (self.first_line + way) * self.line_bytes + offset
    }

    fn bits_of(&self, way: usize) -> Range<usize> {
        let start = self.bit_of(way, 0);
        start..start + self.line_bytes
    }
}
