//! Drift-compensating FIFO.
//!
//! When producer and consumer run on different clocks their rates never match
//! exactly, and the fill level slowly walks toward empty or full. Instead of
//! failing, [`DriftFifo`] absorbs the mismatch:
//!
//! - a write that does not fit drops the excess (an *overrun*);
//! - a read that would take the fill level below the minimum is padded with
//!   the filler value (an *underrun*).
//!
//! Each side has its own started/stopped flag and data only flows while both
//! are started. Whichever side starts second sees a freshly cleared buffer and
//! first receives `desired_fill_count` filler values, which gives the writer
//! time to bring the fill level up to its operating point. Too many xruns in a
//! row stop the session; both sides restart it just by calling `write` and
//! `read` again.
//!
//! `DriftFifo` has no synchronization of its own. Share it behind a lock.

use tracing::{debug, warn};

use crate::error::{FifoError, Result};
use crate::fifo::Fifo;
use crate::ring::RingBuffer;

const DEFAULT_MAX_XRUNS_IN_SUCCESSION: u32 = 10;

/// Fill levels and stop thresholds of a [`DriftFifo`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DriftConfig {
    /// Reads never take the fill level below this.
    pub minimum_fill_count: usize,
    /// Fill level the FIFO starts each session at.
    pub desired_fill_count: usize,
    /// Capacity of the underlying buffer.
    pub maximum_fill_count: usize,
    /// Stop once this many writes in a row came up short.
    pub max_writer_xruns_in_succession: u32,
    /// Stop once this many reads in a row came up short.
    pub max_reader_xruns_in_succession: u32,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            minimum_fill_count: 0,
            desired_fill_count: 0,
            maximum_fill_count: 0,
            max_writer_xruns_in_succession: DEFAULT_MAX_XRUNS_IN_SUCCESSION,
            max_reader_xruns_in_succession: DEFAULT_MAX_XRUNS_IN_SUCCESSION,
        }
    }
}

impl DriftConfig {
    /// Fill levels with the default stop thresholds of 10 xruns.
    pub fn new(minimum_fill_count: usize, desired_fill_count: usize, maximum_fill_count: usize) -> Self {
        Self {
            minimum_fill_count,
            desired_fill_count,
            maximum_fill_count,
            ..Self::default()
        }
    }

    /// Set the writer's consecutive-xrun threshold.
    pub fn with_max_writer_xruns(mut self, xruns: u32) -> Self {
        self.max_writer_xruns_in_succession = xruns;
        self
    }

    /// Set the reader's consecutive-xrun threshold.
    pub fn with_max_reader_xruns(mut self, xruns: u32) -> Self {
        self.max_reader_xruns_in_succession = xruns;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.desired_fill_count > self.maximum_fill_count {
            return Err(FifoError::Argument {
                what: "desired fill count",
                value: self.desired_fill_count,
                limit: self.maximum_fill_count,
            });
        }
        if self.minimum_fill_count > self.desired_fill_count {
            return Err(FifoError::Argument {
                what: "minimum fill count",
                value: self.minimum_fill_count,
                limit: self.desired_fill_count,
            });
        }
        Ok(())
    }
}

/// Xrun counters of one side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SideXruns {
    /// Since the FIFO was created.
    pub total: u32,
    /// Since the current session started.
    pub since_start: u32,
    /// Since the last transfer that did not come up short.
    pub in_succession: u32,
}

impl SideXruns {
    /// Count one xrun; `true` if `limit` is now exceeded.
    fn record(&mut self, limit: u32) -> bool {
        self.total = self.total.saturating_add(1);
        self.since_start = self.since_start.saturating_add(1);
        self.in_succession = self.in_succession.saturating_add(1);
        self.in_succession > limit
    }

    fn restart(&mut self) {
        self.since_start = 0;
        self.in_succession = 0;
    }
}

/// Snapshot of both sides' xrun counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct XrunStats {
    /// Overruns: writes that lost data.
    pub writer: SideXruns,
    /// Underruns: reads that were padded with filler.
    pub reader: SideXruns,
}

/// A FIFO that drops or invents data instead of failing on xruns.
///
/// ```
/// use puffer::{DriftConfig, DriftFifo, Fifo};
///
/// let mut fifo = DriftFifo::new(DriftConfig::new(0, 2, 8), 0.0f32).unwrap();
///
/// // Nothing flows until both sides have started.
/// fifo.write(&[1.0, 2.0]).unwrap();
///
/// // The reader's first session delivers the desired fill count as filler.
/// let mut out = [9.0; 2];
/// fifo.read(&mut out).unwrap();
/// assert_eq!(out, [0.0, 0.0]);
///
/// fifo.write(&[3.0, 4.0]).unwrap();
/// fifo.read(&mut out).unwrap();
/// assert_eq!(out, [3.0, 4.0]);
/// ```
#[derive(Clone, Debug)]
pub struct DriftFifo<T> {
    ring: RingBuffer<T>,
    config: DriftConfig,
    filler: T,
    writer_started: bool,
    reader_started: bool,
    xruns: XrunStats,
    /// Filler values still owed to the reader before real data.
    startup_zeros: usize,
}

impl<T: Clone> DriftFifo<T> {
    /// Create a drift-compensating FIFO.
    ///
    /// `filler` initialises the storage and is what the reader receives in
    /// place of missing data. Fails if `minimum <= desired <= maximum` does not
    /// hold or the buffer cannot be allocated.
    pub fn new(config: DriftConfig, filler: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ring: RingBuffer::new(config.maximum_fill_count, filler.clone())?,
            startup_zeros: config.desired_fill_count,
            config,
            filler,
            writer_started: false,
            reader_started: false,
            xruns: XrunStats::default(),
        })
    }

    /// Force both sides back to stopped. The buffer keeps its contents until
    /// the next side starts.
    pub fn stop(&mut self) {
        self.writer_started = false;
        self.reader_started = false;
    }

    /// Reset for a new session: clear the buffer, owe the reader
    /// `desired_fill_count` filler values, zero the per-session counters.
    ///
    /// Runs automatically whenever a stopped side calls `write` or `read`.
    pub fn starting(&mut self) {
        self.ring.clear();
        self.startup_zeros = self.config.desired_fill_count;
        self.xruns.writer.restart();
        self.xruns.reader.restart();
    }

    /// `true` while both sides are started and data flows.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.writer_started && self.reader_started
    }

    pub fn writer_started(&self) -> bool {
        self.writer_started
    }

    pub fn reader_started(&self) -> bool {
        self.reader_started
    }

    pub fn xruns(&self) -> XrunStats {
        self.xruns
    }

    pub fn startup_zeros(&self) -> usize {
        self.startup_zeros
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    pub fn minimum_fill_count(&self) -> usize {
        self.config.minimum_fill_count
    }

    pub fn desired_fill_count(&self) -> usize {
        self.config.desired_fill_count
    }

    pub fn filler(&self) -> &T {
        &self.filler
    }
}

impl<T: Clone> Fifo<T> for DriftFifo<T> {
    /// Never fails: data that does not fit is dropped and counted.
    fn write(&mut self, data: &[T]) -> Result<()> {
        if !self.writer_started {
            self.starting();
            self.writer_started = true;
            debug!(running = self.is_running(), "drift fifo writer started");
        }
        if !self.is_running() {
            return Ok(());
        }

        let transferred = self.available_space().min(data.len());
        self.ring.write(&data[..transferred])?;

        if transferred < data.len() {
            let limit = self.config.max_writer_xruns_in_succession;
            let exceeded = self.xruns.writer.record(limit);
            debug!(
                dropped = data.len() - transferred,
                in_succession = self.xruns.writer.in_succession,
                "drift fifo overrun"
            );
            if exceeded {
                warn!(
                    xruns = self.xruns.writer.in_succession,
                    "too many overruns in succession, stopping drift fifo"
                );
                self.stop();
            }
        } else {
            self.xruns.writer.in_succession = 0;
        }
        Ok(())
    }

    /// Never fails: missing data is replaced with the filler and counted.
    fn read(&mut self, out: &mut [T]) -> Result<()> {
        if !self.reader_started {
            self.starting();
            self.reader_started = true;
            debug!(running = self.is_running(), "drift fifo reader started");
        }
        if !self.is_running() {
            out.fill(self.filler.clone());
            return Ok(());
        }

        let transferred = self
            .fill_count()
            .saturating_sub(self.config.minimum_fill_count)
            .min(out.len());
        let zeros = self.startup_zeros.min(transferred);

        let (head, tail) = out.split_at_mut(transferred);
        let (startup, data) = head.split_at_mut(zeros);
        startup.fill(self.filler.clone());
        self.startup_zeros -= zeros;
        self.ring.read(data)?;

        if tail.is_empty() {
            self.xruns.reader.in_succession = 0;
        } else {
            tail.fill(self.filler.clone());
            let limit = self.config.max_reader_xruns_in_succession;
            let exceeded = self.xruns.reader.record(limit);
            debug!(
                missing = tail.len(),
                in_succession = self.xruns.reader.in_succession,
                "drift fifo underrun"
            );
            if exceeded {
                warn!(
                    xruns = self.xruns.reader.in_succession,
                    "too many underruns in succession, stopping drift fifo"
                );
                self.stop();
            }
        }
        Ok(())
    }

    /// Buffered data plus the filler values still owed to the reader.
    fn fill_count(&self) -> usize {
        self.ring.fill_count() + self.startup_zeros
    }

    /// Free space minus the filler values still owed to the reader, never
    /// below zero.
    fn available_space(&self) -> usize {
        self.ring.available_space().saturating_sub(self.startup_zeros)
    }

    fn max_fill_count(&self) -> usize {
        self.ring.max_fill_count()
    }

    fn clear(&mut self) {
        self.ring.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(config: DriftConfig) -> DriftFifo<i32> {
        let mut fifo = DriftFifo::new(config, 0).unwrap();
        fifo.write(&[0; 0]).unwrap();
        fifo.read(&mut [0; 0]).unwrap();
        assert!(fifo.is_running());
        fifo
    }

    #[test]
    fn rejects_inconsistent_fill_counts() {
        let err = DriftFifo::new(DriftConfig::new(0, 9, 8), 0u8).unwrap_err();
        assert!(matches!(err, FifoError::Argument { what: "desired fill count", .. }));

        let err = DriftFifo::new(DriftConfig::new(5, 4, 8), 0u8).unwrap_err();
        assert!(matches!(err, FifoError::Argument { what: "minimum fill count", .. }));
    }

    #[test]
    fn discards_writes_until_reader_starts() {
        let mut fifo = DriftFifo::new(DriftConfig::new(0, 0, 8), 0).unwrap();
        fifo.write(&[1, 2, 3]).unwrap();
        assert!(fifo.writer_started());
        assert!(!fifo.is_running());
        assert_eq!(fifo.fill_count(), 0);
    }

    #[test]
    fn stopped_reader_gets_filler_only() {
        let mut fifo = DriftFifo::new(DriftConfig::new(0, 2, 8), -1).unwrap();
        let mut out = [5; 4];
        fifo.read(&mut out).unwrap();
        assert_eq!(out, [-1; 4]);
        assert!(fifo.reader_started());
        assert!(!fifo.is_running());
        assert_eq!(fifo.xruns(), XrunStats::default());
    }

    #[test]
    fn startup_zeros_come_before_data() {
        let mut fifo = started(DriftConfig::new(0, 3, 8));
        assert_eq!(fifo.startup_zeros(), 3);
        assert_eq!(fifo.fill_count(), 3);
        assert_eq!(fifo.available_space(), 5);

        fifo.write(&[7, 8]).unwrap();
        assert_eq!(fifo.fill_count(), 5);

        let mut out = [-1; 1];
        for _ in 0..3 {
            fifo.read(&mut out).unwrap();
            assert_eq!(out, [0]);
        }
        assert_eq!(fifo.startup_zeros(), 0);

        let mut out = [-1; 2];
        fifo.read(&mut out).unwrap();
        assert_eq!(out, [7, 8]);
        assert_eq!(fifo.xruns().reader.total, 0);
    }

    #[test]
    fn startup_zeros_and_data_share_one_read() {
        let mut fifo = started(DriftConfig::new(0, 2, 8));
        fifo.write(&[4, 5, 6]).unwrap();

        let mut out = [-1; 4];
        fifo.read(&mut out).unwrap();
        assert_eq!(out, [0, 0, 4, 5]);
        assert_eq!(fifo.fill_count(), 1);
    }

    #[test]
    fn overrun_drops_excess_and_counts() {
        let mut fifo = started(DriftConfig::new(0, 0, 4));
        fifo.write(&[1, 2, 3, 4, 5, 6]).unwrap();

        assert_eq!(fifo.fill_count(), 4);
        let xruns = fifo.xruns().writer;
        assert_eq!((xruns.total, xruns.since_start, xruns.in_succession), (1, 1, 1));

        let mut out = [0; 4];
        fifo.read(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);

        fifo.write(&[9]).unwrap();
        assert_eq!(fifo.xruns().writer.in_succession, 0);
        assert_eq!(fifo.xruns().writer.total, 1);
    }

    #[test]
    fn underrun_keeps_minimum_and_pads_with_filler() {
        let mut fifo = started(DriftConfig::new(2, 2, 8));
        // Two startup zeros sit at the minimum, so nothing is readable yet.
        let mut out = [-1; 2];
        fifo.read(&mut out).unwrap();
        assert_eq!(out, [0, 0]);
        assert_eq!(fifo.xruns().reader.in_succession, 1);

        fifo.write(&[1, 2, 3]).unwrap();
        let mut out = [-1; 4];
        fifo.read(&mut out).unwrap();
        // Three of five are readable; the fourth is padding.
        assert_eq!(out, [0, 0, 1, 0]);
        assert_eq!(fifo.fill_count(), 2);
        assert_eq!(fifo.xruns().reader.total, 2);
    }

    #[test]
    fn too_many_overruns_stop_the_session() {
        let config = DriftConfig::new(0, 0, 4).with_max_writer_xruns(3);
        let mut fifo = started(config);

        for round in 1..=4 {
            fifo.write(&[1; 5]).unwrap();
            assert_eq!(fifo.is_running(), round <= 3, "round {}", round);
        }
        assert!(!fifo.writer_started());
        assert!(!fifo.reader_started());
        assert_eq!(fifo.xruns().writer.total, 4);

        // The writer restarts alone; its data is discarded until the reader
        // comes back.
        fifo.write(&[2; 2]).unwrap();
        assert!(fifo.writer_started());
        assert!(!fifo.is_running());
        assert_eq!(fifo.fill_count(), 0);
        assert_eq!(fifo.xruns().writer.since_start, 0);
        assert_eq!(fifo.xruns().writer.total, 4);

        let mut out = [9; 2];
        fifo.read(&mut out).unwrap();
        assert!(fifo.is_running());
    }

    #[test]
    fn too_many_underruns_stop_the_session() {
        let mut fifo = started(DriftConfig::new(0, 0, 4).with_max_reader_xruns(1));
        let mut out = [0; 2];
        fifo.read(&mut out).unwrap();
        assert!(fifo.is_running());
        fifo.read(&mut out).unwrap();
        assert!(!fifo.is_running());
    }

    #[test]
    fn available_space_never_underflows() {
        let mut fifo = started(DriftConfig::new(0, 4, 4));
        assert_eq!(fifo.available_space(), 0);

        // Data sneaked into the ring while zeros are still owed.
        fifo.ring.write(&[1, 2]).unwrap();
        assert_eq!(fifo.available_space(), 0);
        assert_eq!(fifo.fill_count(), 6);
    }

    #[test]
    fn explicit_stop_keeps_buffer_until_restart() {
        let mut fifo = started(DriftConfig::new(0, 0, 4));
        fifo.write(&[1, 2]).unwrap();
        fifo.stop();
        assert_eq!(fifo.fill_count(), 2);

        fifo.write(&[3]).unwrap();
        assert_eq!(fifo.fill_count(), 0);
    }
}
