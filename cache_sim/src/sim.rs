use std::fmt;

use crate::{
    cache::{AccessOutcome, Cache},
    config::SimConfig,
    record::{AccessKind, AccessRecord, DecodeError},
    stat::{AddStats, Stats},
    trace::Trace,
};

/// Drives an instruction cache and a data cache from one bus trace.
/// The two caches never interact.
pub struct Simulator {
    icache: Cache,
    dcache: Cache,
    stat_builder: stat::RunStatBuilder,
}

impl Simulator {
    pub fn new(config: &SimConfig) -> Self {
        log::info!(
            "instruction cache {}, data cache {}",
            config.icache,
            config.dcache
        );
        Self {
            icache: Cache::new("instruction cache", config.icache),
            dcache: Cache::new("data cache", config.dcache),
            stat_builder: stat::RunStatBuilder::new(),
        }
    }

    pub fn icache(&self) -> &Cache {
        &self.icache
    }
    pub fn dcache(&self) -> &Cache {
        &self.dcache
    }

    /// routes one record to the cache serving its access type.
    pub fn dispatch(&mut self, record: AccessRecord) -> AccessOutcome {
        let AccessRecord { kind, addr, burst } = record;
        self.stat_builder.dispatched += 1;
        match kind {
            AccessKind::InstructionRead => self.icache.read(addr, burst),
            AccessKind::DataRead => self.dcache.read(addr, burst),
            AccessKind::DataWrite => self.dcache.write(addr, burst),
        }
    }

    /// feeds decoded words in order. records that are not cache accesses
    /// are skipped and only counted.
    pub fn run<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = Result<AccessRecord, DecodeError>>,
    {
        for r in records {
            self.stat_builder.words += 1;
            match r {
                Ok(record) => {
                    self.dispatch(record);
                }
                Err(e) => {
                    log::trace!("dropped: {e}");
                    self.stat_builder.skipped += 1;
                }
            }
        }
    }

    pub fn run_trace(&mut self, trace: &Trace) {
        log::info!("processing {} records.", trace.len());
        self.run(trace.records());
        self.exit_sim();
        log::info!("finished processing.");
    }

    /// stops the clock. statistics report the time up to the last call.
    pub fn exit_sim(&mut self) {
        self.stat_builder.stop_timer();
    }

    pub fn run_stat(&self) -> stat::RunStat {
        self.stat_builder.finish()
    }

    pub fn collect_stat(&self) -> Stats<'_> {
        let mut ss = Stats::default();
        self.add_stats(&mut ss);
        ss
    }
}

impl AddStats for Simulator {
    fn add_stats<'s>(&'s self, buf: &mut Stats<'s>) {
        buf.push(&self.stat_builder);
        buf.push(&self.icache);
        buf.push(&self.dcache);
    }
}

pub mod stat {
    use crate::stat::*;

    use super::*;
    use std::time;

    pub struct RunStatBuilder {
        begin: time::Instant,
        pub(super) words: u64,
        pub(super) dispatched: u64,
        pub(super) skipped: u64,
        elapsed: Option<time::Duration>,
    }

    impl RunStatBuilder {
        pub fn new() -> Self {
            Self {
                begin: time::Instant::now(),
                words: 0,
                dispatched: 0,
                skipped: 0,
                elapsed: None,
            }
        }
        pub fn stop_timer(&mut self) {
            self.elapsed = Some(time::Instant::now() - self.begin)
        }
        pub fn finish(&self) -> RunStat {
            RunStat {
                words: self.words,
                dispatched: self.dispatched,
                skipped: self.skipped,
                elapsed: self.elapsed.unwrap_or_else(|| self.begin.elapsed()),
            }
        }
    }

    impl Default for RunStatBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RunStat {
        pub words: u64,
        pub dispatched: u64,
        pub skipped: u64,
        pub elapsed: time::Duration,
    }

    impl Stat for RunStatBuilder {
        fn view(&self) -> Box<dyn StatView + '_> {
            Box::new(self.finish())
        }
    }

    impl StatView for RunStat {
        fn header(&self) -> &str {
            "simulator stat"
        }
        fn width(&self) -> usize {
            33
        }
    }

    impl fmt::Display for RunStat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let ms = format!("{:.3} ms", self.elapsed.as_secs_f64() * 1000.);
            writeln!(f, "   elapsed total: {ms:>13}")?;
            writeln!(f, "     words total: {:>13}", self.words)?;
            writeln!(f, "      dispatched: {:>13}", self.dispatched)?;
            write!(f, "         skipped: {:>13}", self.skipped)
        }
    }
}

impl fmt::Display for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.collect_stat().view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;

    fn ir(addr: u32) -> AccessRecord {
        AccessRecord::new(AccessKind::InstructionRead, addr, 0)
    }

    #[test]
    fn test_instruction_scenario() {
        let mut sim = Simulator::new(&SimConfig::default());
        sim.run([ir(0x10), ir(0x10), ir(0x20)].map(Ok));
        let s = sim.icache().stat();
        assert_eq!((2, 1, 3), (s.misses, s.hits, s.read_accesses));
        assert_eq!(0, sim.dcache().stat().total_accesses());
    }
    #[test]
    fn test_routing() {
        let mut sim = Simulator::new(&SimConfig::default());
        sim.dispatch(AccessRecord::new(AccessKind::DataWrite, 0x400, 1));
        sim.dispatch(AccessRecord::new(AccessKind::DataRead, 0x400, 0));
        let d = sim.dcache().stat();
        assert_eq!((1, 2), (d.read_accesses, d.write_accesses));
        assert_eq!((1, 2), (d.misses, d.hits));
        assert_eq!(0, sim.icache().stat().total_accesses());
    }
    #[test]
    fn test_unmapped_words_are_skipped() {
        let trace = Trace::new(vec![0x0000_0010, 0x8000_0010, 0xa000_0010, 0xc000_0010]);
        let mut sim = Simulator::new(&SimConfig::default());
        sim.run_trace(&trace);
        let r = sim.run_stat();
        assert_eq!((4, 2, 2), (r.words, r.dispatched, r.skipped));
        assert_eq!(1, sim.icache().stat().misses);
        assert_eq!(1, sim.dcache().stat().misses);
    }
    #[test]
    fn test_engines_are_independent() {
        let config = SimConfig {
            icache: Geometry::new(4, 1, 1).unwrap(),
            ..Default::default()
        };
        let mut sim = Simulator::new(&config);
        sim.dispatch(ir(0x100));
        sim.dispatch(AccessRecord::new(AccessKind::DataRead, 0x100, 0));
        sim.dispatch(ir(0x200));
        // 0x100 left the single-line icache but stays in the dcache
        assert_eq!(AccessOutcome::TagMiss, sim.dispatch(ir(0x100)));
        assert_eq!(
            AccessOutcome::Hit,
            sim.dispatch(AccessRecord::new(AccessKind::DataRead, 0x100, 0))
        );
    }
    #[test]
    fn test_report() {
        let mut sim = Simulator::new(&SimConfig::default());
        sim.run_trace(&Trace::new(vec![0x8000_0010, 0x8000_0010]));
        let text = sim.to_string();
        assert!(text.contains("simulator stat:"));
        assert!(text.contains("instruction cache:"));
        assert!(text.contains("data cache:"));
        assert_eq!(3, sim.collect_stat().len());
    }
}
