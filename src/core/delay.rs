use std::collections::VecDeque;

use hashbrown::HashMap;

pub type TimeInSeconds = f64;
pub type SourceId = usize;
pub type ChannelId = usize;

/// Tolerance used when matching sample times on the fixed control grid.
pub const TIME_EPSILON: TimeInSeconds = 1e-9;

/// A single delayed channel: values written at `t` become observable at `t + delay`.
///
/// Reads return the newest sample recorded at or before `time - delay`
/// (no interpolation), or the channel default when nothing that old exists.
/// Sample times are compared with a [`TIME_EPSILON`] tolerance, so a read
/// less than `TIME_EPSILON` before `t + delay` already sees the sample
/// written at `t`.
///
/// Both writes and reads must be monotonic in time, and a read may not
/// precede the newest write. Violating that is a programming error and
/// panics. History is pruned on both write and read, so a line that is
/// written every step and never read still holds at most
/// `delay / step + 2` samples.
#[derive(Debug, Clone)]
pub struct DelayLine {
    delay: TimeInSeconds,
    default: f64,
    samples: VecDeque<(TimeInSeconds, f64)>,
    last_read: Option<TimeInSeconds>,
}

impl DelayLine {
    pub fn new(delay: TimeInSeconds, default: f64) -> Self {
        assert!(
            delay.is_finite() && delay >= 0.0,
            "delay line requires a finite, non-negative delay (got {delay})"
        );
        Self {
            delay,
            default,
            samples: VecDeque::new(),
            last_read: None,
        }
    }

    pub fn delay(&self) -> TimeInSeconds {
        self.delay
    }

    pub fn default_value(&self) -> f64 {
        self.default
    }

    /// Number of samples currently retained.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last_write_time(&self) -> Option<TimeInSeconds> {
        self.samples.back().map(|&(t, _)| t)
    }

    /// Record `value` as produced at `time`.
    ///
    /// Writing again at the time of the newest sample replaces it.
    pub fn write(&mut self, time: TimeInSeconds, value: f64) {
        if let Some(back) = self.samples.back_mut() {
            assert!(
                time >= back.0 - TIME_EPSILON,
                "out-of-order delay line write: t={time} precedes t={}",
                back.0
            );
            if time <= back.0 + TIME_EPSILON {
                back.1 = value;
                return;
            }
        }
        self.samples.push_back((time, value));
        // No later read can look further back than this write allows.
        self.prune(time);
    }

    /// Drop every sample older than the newest one at or before `time - delay`.
    fn prune(&mut self, time: TimeInSeconds) {
        let cutoff = time - self.delay + TIME_EPSILON;
        while self.samples.len() >= 2 && self.samples[1].0 <= cutoff {
            self.samples.pop_front();
        }
    }

    /// Value as observed at `time`, i.e. the value produced at `time - delay`.
    pub fn read(&mut self, time: TimeInSeconds) -> f64 {
        if let Some(last) = self.last_read {
            assert!(
                time >= last - TIME_EPSILON,
                "out-of-order delay line read: t={time} precedes t={last}"
            );
        }
        if let Some(newest) = self.last_write_time() {
            assert!(
                time >= newest - TIME_EPSILON,
                "delay line read at t={time} precedes newest write at t={newest}"
            );
        }
        self.last_read = Some(time);

        self.prune(time);
        let cutoff = time - self.delay + TIME_EPSILON;
        match self.samples.front() {
            Some(&(t, v)) if t <= cutoff => v,
            _ => self.default,
        }
    }
}

#[derive(Debug, Clone)]
struct Source {
    name: String,
    channels: Vec<ChannelId>,
}

#[derive(Debug, Clone)]
struct Channel {
    source: SourceId,
    line: DelayLine,
}

/// Registry of delayed signals.
///
/// A *source* is one physical signal (a muscle length, a leg load, a motor
/// command). A *channel* is that source seen at one particular latency.
/// Channels are keyed by `(source, delay)`, so one source consumed at two
/// latencies owns two independent lines while repeated requests for the
/// same latency share one.
#[derive(Debug, Clone, Default)]
pub struct DelayBus {
    sources: Vec<Source>,
    source_index: HashMap<String, SourceId>,
    channels: Vec<Channel>,
    channel_index: HashMap<(SourceId, u64), ChannelId>,
}

impl DelayBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named source; returns the existing id if already known.
    pub fn add_source(&mut self, name: &str) -> SourceId {
        if let Some(&id) = self.source_index.get(name) {
            return id;
        }
        let id = self.sources.len();
        self.sources.push(Source {
            name: name.to_string(),
            channels: Vec::new(),
        });
        self.source_index.insert(name.to_string(), id);
        id
    }

    pub fn source_id(&self, name: &str) -> Option<SourceId> {
        self.source_index.get(name).copied()
    }

    pub fn source_name(&self, source: SourceId) -> &str {
        &self.sources[source].name
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Get (or create) the channel observing `source` with `delay`.
    ///
    /// `default` is the value reported before any sample is old enough;
    /// only the first acquisition of a `(source, delay)` pair sets it.
    pub fn acquire(&mut self, source: SourceId, delay: TimeInSeconds, default: f64) -> ChannelId {
        assert!(
            source < self.sources.len(),
            "delay bus source {source} out of range"
        );
        // Fold -0.0 into 0.0 so both map to the same key.
        let key = (source, (delay + 0.0).to_bits());
        if let Some(&id) = self.channel_index.get(&key) {
            return id;
        }
        let id = self.channels.len();
        self.channels.push(Channel {
            source,
            line: DelayLine::new(delay, default),
        });
        self.sources[source].channels.push(id);
        self.channel_index.insert(key, id);
        id
    }

    /// Record a sample of `source` on every channel that observes it.
    pub fn write_source(&mut self, source: SourceId, time: TimeInSeconds, value: f64) {
        for &ch in &self.sources[source].channels {
            self.channels[ch].line.write(time, value);
        }
    }

    /// Record a sample on a single channel.
    pub fn write(&mut self, channel: ChannelId, time: TimeInSeconds, value: f64) {
        self.channels[channel].line.write(time, value);
    }

    pub fn read(&mut self, channel: ChannelId, time: TimeInSeconds) -> f64 {
        self.channels[channel].line.read(time)
    }

    pub fn delay(&self, channel: ChannelId) -> TimeInSeconds {
        self.channels[channel].line.delay()
    }

    pub fn channel_source(&self, channel: ChannelId) -> SourceId {
        self.channels[channel].source
    }

    pub fn line(&self, channel: ChannelId) -> &DelayLine {
        &self.channels[channel].line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_becomes_visible_exactly_after_delay() {
        let mut line = DelayLine::new(0.02, 0.0);
        line.write(0.01, 3.5);
        assert_eq!(line.read(0.029), 0.0);
        assert_eq!(line.read(0.03), 3.5);
    }

    #[test]
    fn read_returns_nearest_prior_sample() {
        let dt = 0.001;
        let mut line = DelayLine::new(0.005, -1.0);
        let write_until = |line: &mut DelayLine, from: usize, to: usize| {
            for k in from..=to {
                line.write(k as f64 * dt, k as f64);
            }
        };

        // Before anything is old enough: default.
        write_until(&mut line, 0, 4);
        assert_eq!(line.read(0.004), -1.0);

        // Between grid points: the last sample at or before t - delay.
        write_until(&mut line, 5, 12);
        assert_eq!(line.read(0.0125), 7.0);
        write_until(&mut line, 13, 13);
        assert_eq!(line.read(0.013), 8.0);
        assert_eq!(line.read(0.0139), 8.0);
        write_until(&mut line, 14, 19);
        assert_eq!(line.read(0.019), 14.0);
    }

    #[test]
    fn sample_times_match_within_grid_tolerance() {
        let mut line = DelayLine::new(0.02, 0.0);
        line.write(0.01, 5.0);
        let mut early = line.clone();
        assert_eq!(early.read(0.03 - 1e-6), 0.0);
        assert_eq!(line.read(0.03 - 1e-10), 5.0);
    }

    #[test]
    fn unread_line_history_stays_bounded() {
        let dt = 0.005;
        let mut line = DelayLine::new(0.02, 0.0);
        for k in 0..10_000 {
            line.write(k as f64 * dt, k as f64);
        }
        assert!(line.len() <= 6, "retained {} samples", line.len());
        assert_eq!(line.read(9_999.0 * dt), 9_995.0);
    }

    #[test]
    #[should_panic(expected = "precedes newest write")]
    fn read_behind_newest_write_panics() {
        let mut line = DelayLine::new(0.01, 0.0);
        line.write(0.05, 1.0);
        let _ = line.read(0.04);
    }

    #[test]
    fn zero_delay_reads_current_sample() {
        let mut line = DelayLine::new(0.0, 0.0);
        line.write(0.0, 1.0);
        assert_eq!(line.read(0.0), 1.0);
        line.write(0.01, 2.0);
        assert_eq!(line.read(0.01), 2.0);
    }

    #[test]
    fn rewrite_at_same_time_replaces_sample() {
        let mut line = DelayLine::new(0.0, 0.0);
        line.write(0.0, 1.0);
        line.write(0.0, 4.0);
        assert_eq!(line.len(), 1);
        assert_eq!(line.read(0.0), 4.0);
    }

    #[test]
    fn retained_history_stays_bounded() {
        let dt = 0.001;
        let mut line = DelayLine::new(0.01, 0.0);
        for k in 0..1000 {
            let t = k as f64 * dt;
            line.write(t, k as f64);
            let _ = line.read(t);
        }
        assert!(line.len() <= 12, "retained {} samples", line.len());
    }

    #[test]
    #[should_panic(expected = "out-of-order delay line write")]
    fn out_of_order_write_panics() {
        let mut line = DelayLine::new(0.01, 0.0);
        line.write(0.02, 1.0);
        line.write(0.01, 1.0);
    }

    #[test]
    #[should_panic(expected = "out-of-order delay line read")]
    fn out_of_order_read_panics() {
        let mut line = DelayLine::new(0.01, 0.0);
        line.write(0.0, 1.0);
        let _ = line.read(0.05);
        let _ = line.read(0.04);
    }

    #[test]
    fn bus_keys_channels_by_source_and_delay() {
        let mut bus = DelayBus::new();
        let len = bus.add_source("soleus_r.L");
        assert_eq!(bus.add_source("soleus_r.L"), len);

        let fast = bus.acquire(len, 0.01, 0.0);
        let slow = bus.acquire(len, 0.03, 0.0);
        assert_ne!(fast, slow);
        assert_eq!(bus.acquire(len, 0.01, 9.0), fast);
        assert_eq!(bus.channel_count(), 2);

        let dt = 0.01;
        for k in 0..5 {
            bus.write_source(len, k as f64 * dt, k as f64 + 1.0);
        }
        let t = 0.04;
        assert_eq!(bus.read(fast, t), 4.0);
        assert_eq!(bus.read(slow, t), 2.0);
    }

    #[test]
    fn bus_single_channel_write_leaves_siblings_alone() {
        let mut bus = DelayBus::new();
        let src = bus.add_source("glut_max_l.A");
        let a = bus.acquire(src, 0.0, 0.25);
        let b = bus.acquire(src, 0.02, 0.25);
        bus.write(a, 0.0, 1.0);
        assert_eq!(bus.read(a, 0.0), 1.0);
        assert_eq!(bus.read(b, 0.05), 0.25);
        assert_eq!(bus.channel_source(b), src);
        assert_eq!(bus.source_name(src), "glut_max_l.A");
    }
}
