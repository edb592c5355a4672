use std::fmt;

use crate::{
    geometry::{Decomposed, Geometry},
    set::{ConsistencyError, Lines},
    stat::{Stat, StatView},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    Hit,
    /// no line of the set holds the tag.
    TagMiss,
    /// the tag is resident but the addressed sub-block was never fetched.
    OffsetMiss,
}

impl AccessOutcome {
    pub fn is_hit(self) -> bool {
        self == AccessOutcome::Hit
    }
}

/// Set-associative cache with per-line residency directories and LRU
/// replacement. Writes are write-through and write-allocate.
///
/// Every request counts `1 + burst` access units. Only the triggering
/// sub-block can miss, so a miss adds exactly one to `misses` and the `burst`
/// dependent transfers are credited as hits either way.
pub struct Cache {
    name: String,
    geometry: Geometry,
    lines: Lines,
    stat: CacheStat,
}

impl Cache {
    pub fn new(name: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            name: name.into(),
            lines: Lines::new(&geometry),
            geometry,
            stat: CacheStat::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }
    pub fn stat(&self) -> &CacheStat {
        &self.stat
    }

    #[cfg(test)]
    fn set_of(&mut self, addr: u32) -> crate::set::CacheSet<'_> {
        let Decomposed { set, .. } = self.geometry.decode(addr);
        self.lines.set(set)
    }

    pub fn read(&mut self, addr: u32, burst: u32) -> AccessOutcome {
        let outcome = self.access(addr, false);
        self.stat.account(outcome, burst, false);
        log::trace!("{}: read {addr:#09x} +{burst}: {outcome:?}", self.name);
        outcome
    }

    pub fn write(&mut self, addr: u32, burst: u32) -> AccessOutcome {
        let outcome = self.access(addr, true);
        self.stat.account(outcome, burst, true);
        log::trace!("{}: write {addr:#09x} +{burst}: {outcome:?}", self.name);
        outcome
    }

    fn access(&mut self, addr: u32, is_write: bool) -> AccessOutcome {
        let Decomposed { tag, set, offset } = self.geometry.decode(addr);
        let mut set = self.lines.set(set);
        let (outcome, repaired) = match set.lookup(tag) {
            None => {
                let allocated = set.allocate(tag);
                set.mark_resident(allocated.way, offset);
                if let Some(evicted) = allocated.evicted {
                    log::trace!("{}: set {} evicts tag {evicted:#x}", self.name, set.index());
                }
                (AccessOutcome::TagMiss, allocated.repaired)
            }
            // a write refreshes the line whatever was resident before
            Some(way) if is_write => {
                set.mark_resident(way, offset);
                (AccessOutcome::Hit, set.touch(tag).err())
            }
            Some(way) if !set.is_resident(way, offset) => {
                set.mark_resident(way, offset);
                (AccessOutcome::OffsetMiss, None)
            }
            Some(_) => (AccessOutcome::Hit, set.touch(tag).err()),
        };
        if let Some(e) = repaired {
            self.repair(e);
        }
        outcome
    }

    fn repair(&mut self, e: ConsistencyError) {
        log::warn!("{}: {e}", self.name);
        self.stat.consistency_repairs += 1;
    }
}

/// Counters of one cache, in access units.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStat {
    pub hits: u64,
    pub misses: u64,
    pub read_accesses: u64,
    pub write_accesses: u64,
    pub consistency_repairs: u64,
}

impl CacheStat {
    fn account(&mut self, outcome: AccessOutcome, burst: u32, is_write: bool) {
        let burst = burst as u64;
        if outcome.is_hit() {
            self.hits += 1 + burst;
        } else {
            self.misses += 1;
            self.hits += burst;
        }
        if is_write {
            self.write_accesses += 1 + burst;
        } else {
            self.read_accesses += 1 + burst;
        }
    }

    pub fn total_accesses(&self) -> u64 {
        self.read_accesses + self.write_accesses
    }

    /// hits per access unit, in percent. `None` before any access.
    pub fn hit_rate(&self) -> Option<f64> {
        match self.total_accesses() {
            0 => None,
            total => Some(self.hits as f64 / total as f64 * 100.),
        }
    }
}

pub struct CacheStatView<'a> {
    cache: &'a Cache,
}

impl Stat for Cache {
    fn view(&self) -> Box<dyn StatView + '_> {
        Box::new(CacheStatView { cache: self })
    }
}

impl StatView for CacheStatView<'_> {
    fn header(&self) -> &str {
        &self.cache.name
    }
    fn width(&self) -> usize {
        33
    }
}

impl fmt::Display for CacheStatView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.cache.stat;
        let geometry = format!("{}", self.cache.geometry);
        let rate = match s.hit_rate() {
            Some(r) => format!("{r:.2}%"),
            None => "N/A".to_string(),
        };
        writeln!(f, "       geometry: {geometry:>14}")?;
        writeln!(f, "  total accesses: {:>13}", s.total_accesses())?;
        writeln!(f, "   read accesses: {:>13}", s.read_accesses)?;
        writeln!(f, "  write accesses: {:>13}", s.write_accesses)?;
        writeln!(f, "            hits: {:>13}", s.hits)?;
        writeln!(f, "          misses: {:>13}", s.misses)?;
        write!(f, "        hit rate: {rate:>13}")?;
        if s.consistency_repairs != 0 {
            write!(f, "\n         repairs: {:>13}", s.consistency_repairs)?;
        }
        Ok(())
    }
}
