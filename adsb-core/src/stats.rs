//! Flat counters for the demod/decode/tracker pipeline.
//!
//! Mirrors dump1090's `struct stats`: every counter is `u64`, `add_stats`
//! sums two snapshots (taking min/max for the timestamp bounds and peak
//! signal), and `reset_stats` zeros in place. The background thread rotates
//! a running snapshot into 1-minute, 5-minute, 15-minute, and all-time
//! buckets (§4.H).

/// Demodulator/CRC counters common to the raw and phase-corrected paths.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DemodStats {
    pub demodulated0: u64,
    pub demodulated1: u64,
    pub demodulated2: u64,
    pub demodulated3: u64,
    pub goodcrc: u64,
    pub badcrc: u64,
    pub fixed: u64,
    /// `bit_fix[0]` = single-bit corrections, `bit_fix[1]` = double-bit, etc.
    pub bit_fix: [u64; 2],
}

impl DemodStats {
    fn add(&self, other: &DemodStats) -> DemodStats {
        DemodStats {
            demodulated0: self.demodulated0 + other.demodulated0,
            demodulated1: self.demodulated1 + other.demodulated1,
            demodulated2: self.demodulated2 + other.demodulated2,
            demodulated3: self.demodulated3 + other.demodulated3,
            goodcrc: self.goodcrc + other.goodcrc,
            badcrc: self.badcrc + other.badcrc,
            fixed: self.fixed + other.fixed,
            bit_fix: [
                self.bit_fix[0] + other.bit_fix[0],
                self.bit_fix[1] + other.bit_fix[1],
            ],
        }
    }
}

/// One interval's worth of pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    pub start: f64,
    pub end: f64,

    // Preamble / demod
    pub preamble_no_correlation: u64,
    pub preamble_not_quiet: u64,
    pub valid_preamble: u64,
    pub demod: DemodStats,
    pub demod_phasecorrected: DemodStats,
    pub out_of_phase: u64,

    // Framing
    pub df_len_corrected: u64,
    pub df_type_corrected: u64,
    pub modeac: u64,

    // Blocks
    pub blocks_processed: u64,
    pub blocks_dropped: u64,

    // Signal
    pub noise_power_sum: f64,
    pub noise_power_count: u64,
    pub signal_power_sum: f64,
    pub signal_power_count: u64,
    pub peak_signal_power: f64,
    pub strong_signal_count: u64,

    // CPR
    pub cpr_surface: u64,
    pub cpr_airborne: u64,
    pub cpr_global_ok: u64,
    pub cpr_global_bad: u64,
    pub cpr_global_range_checks: u64,
    pub cpr_global_speed_checks: u64,
    pub cpr_global_skipped: u64,
    pub cpr_local_ok: u64,
    pub cpr_local_aircraft_relative: u64,
    pub cpr_local_receiver_relative: u64,
    pub cpr_local_skipped: u64,
    pub cpr_local_range_checks: u64,
    pub cpr_local_speed_checks: u64,
    pub cpr_filtered: u64,

    // Aircraft
    pub unique_aircraft: u64,
    pub single_message_aircraft: u64,

    // Remote / network
    pub remote_accepted: u64,
    pub remote_rejected: u64,
    pub http_requests: u64,

    // Totals
    pub messages_total: u64,

    // CPU time (seconds) per stage, accumulated
    pub demod_cpu: f64,
    pub reader_cpu: f64,
    pub background_cpu: f64,
}

impl Stats {
    pub fn new() -> Self {
        Stats::default()
    }
}

/// Element-wise sum of `a` and `b` into `out`.
///
/// `start` takes the earliest non-zero value, `end` and `peak_signal_power`
/// take the max — everything else is additive.
pub fn add_stats(a: &Stats, b: &Stats, out: &mut Stats) {
    out.start = match (a.start, b.start) {
        (0.0, s) => s,
        (s, 0.0) => s,
        (sa, sb) => sa.min(sb),
    };
    out.end = a.end.max(b.end);

    out.preamble_no_correlation = a.preamble_no_correlation + b.preamble_no_correlation;
    out.preamble_not_quiet = a.preamble_not_quiet + b.preamble_not_quiet;
    out.valid_preamble = a.valid_preamble + b.valid_preamble;
    out.demod = a.demod.add(&b.demod);
    out.demod_phasecorrected = a.demod_phasecorrected.add(&b.demod_phasecorrected);
    out.out_of_phase = a.out_of_phase + b.out_of_phase;

    out.df_len_corrected = a.df_len_corrected + b.df_len_corrected;
    out.df_type_corrected = a.df_type_corrected + b.df_type_corrected;
    out.modeac = a.modeac + b.modeac;

    out.blocks_processed = a.blocks_processed + b.blocks_processed;
    out.blocks_dropped = a.blocks_dropped + b.blocks_dropped;

    out.noise_power_sum = a.noise_power_sum + b.noise_power_sum;
    out.noise_power_count = a.noise_power_count + b.noise_power_count;
    out.signal_power_sum = a.signal_power_sum + b.signal_power_sum;
    out.signal_power_count = a.signal_power_count + b.signal_power_count;
    out.peak_signal_power = a.peak_signal_power.max(b.peak_signal_power);
    out.strong_signal_count = a.strong_signal_count + b.strong_signal_count;

    out.cpr_surface = a.cpr_surface + b.cpr_surface;
    out.cpr_airborne = a.cpr_airborne + b.cpr_airborne;
    out.cpr_global_ok = a.cpr_global_ok + b.cpr_global_ok;
    out.cpr_global_bad = a.cpr_global_bad + b.cpr_global_bad;
    out.cpr_global_range_checks = a.cpr_global_range_checks + b.cpr_global_range_checks;
    out.cpr_global_speed_checks = a.cpr_global_speed_checks + b.cpr_global_speed_checks;
    out.cpr_global_skipped = a.cpr_global_skipped + b.cpr_global_skipped;
    out.cpr_local_ok = a.cpr_local_ok + b.cpr_local_ok;
    out.cpr_local_aircraft_relative = a.cpr_local_aircraft_relative + b.cpr_local_aircraft_relative;
    out.cpr_local_receiver_relative = a.cpr_local_receiver_relative + b.cpr_local_receiver_relative;
    out.cpr_local_skipped = a.cpr_local_skipped + b.cpr_local_skipped;
    out.cpr_local_range_checks = a.cpr_local_range_checks + b.cpr_local_range_checks;
    out.cpr_local_speed_checks = a.cpr_local_speed_checks + b.cpr_local_speed_checks;
    out.cpr_filtered = a.cpr_filtered + b.cpr_filtered;

    out.unique_aircraft = a.unique_aircraft + b.unique_aircraft;
    out.single_message_aircraft = a.single_message_aircraft + b.single_message_aircraft;

    out.remote_accepted = a.remote_accepted + b.remote_accepted;
    out.remote_rejected = a.remote_rejected + b.remote_rejected;
    out.http_requests = a.http_requests + b.http_requests;

    out.messages_total = a.messages_total + b.messages_total;

    out.demod_cpu = a.demod_cpu + b.demod_cpu;
    out.reader_cpu = a.reader_cpu + b.reader_cpu;
    out.background_cpu = a.background_cpu + b.background_cpu;
}

/// Zero `st` in place, keeping allocation (there isn't any — `Stats` is
/// plain-old-data, so this is just a reassignment).
pub fn reset_stats(st: &mut Stats) {
    *st = Stats::default();
}

/// Rolling 1-min / 5-min / 15-min / all-time aggregation, rotated by the
/// background thread on a 1-second tick (spec.md §4.H, §5 Background).
pub struct StatsRotation {
    pub latest: Stats,
    pub last_1min: [Stats; 1],
    pub last_5min: Stats,
    pub last_15min: Stats,
    pub total: Stats,
    tick: usize,
}

impl StatsRotation {
    pub fn new() -> Self {
        StatsRotation {
            latest: Stats::new(),
            last_1min: [Stats::new()],
            last_5min: Stats::new(),
            last_15min: Stats::new(),
            total: Stats::new(),
            tick: 0,
        }
    }

    /// Roll `current` (the just-completed 1-minute interval) into the
    /// 5-min/15-min/all-time buckets and reset it for the next interval.
    pub fn rotate(&mut self, current: Stats) {
        let mut total = Stats::new();
        add_stats(&self.total, &current, &mut total);
        self.total = total;

        let mut five = Stats::new();
        add_stats(&self.last_5min, &current, &mut five);
        self.last_5min = five;

        let mut fifteen = Stats::new();
        add_stats(&self.last_15min, &current, &mut fifteen);
        self.last_15min = fifteen;

        self.last_1min[0] = current;
        self.latest = Stats::new();
        self.tick += 1;

        // Every 5th/15th minute, decay the rolling window back down so
        // `last_5min`/`last_15min` stay a true trailing window rather than
        // an ever-growing all-time sum.
        if self.tick % 5 == 0 {
            self.last_5min = Stats::new();
        }
        if self.tick % 15 == 0 {
            self.last_15min = Stats::new();
        }
    }
}

impl Default for StatsRotation {
    fn default() -> Self {
        StatsRotation::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_stats() {
        let mut st = Stats::new();
        st.messages_total = 42;
        st.preamble_not_quiet = 7;
        reset_stats(&mut st);
        assert_eq!(st, Stats::new());
    }

    #[test]
    fn test_add_stats_sums_counters() {
        let mut a = Stats::new();
        a.messages_total = 10;
        a.cpr_global_ok = 3;
        let mut b = Stats::new();
        b.messages_total = 5;
        b.cpr_global_ok = 2;

        let mut out = Stats::new();
        add_stats(&a, &b, &mut out);
        assert_eq!(out.messages_total, 15);
        assert_eq!(out.cpr_global_ok, 5);
    }

    #[test]
    fn test_add_stats_start_end_min_max() {
        let mut a = Stats::new();
        a.start = 100.0;
        a.end = 160.0;
        let mut b = Stats::new();
        b.start = 90.0;
        b.end = 150.0;

        let mut out = Stats::new();
        add_stats(&a, &b, &mut out);
        assert_eq!(out.start, 90.0);
        assert_eq!(out.end, 160.0);
    }

    #[test]
    fn test_add_stats_start_zero_uses_other() {
        let a = Stats::new(); // start == 0.0, meaning "unset"
        let mut b = Stats::new();
        b.start = 42.0;

        let mut out = Stats::new();
        add_stats(&a, &b, &mut out);
        assert_eq!(out.start, 42.0);
    }

    #[test]
    fn test_add_stats_peak_signal_is_max() {
        let mut a = Stats::new();
        a.peak_signal_power = 0.4;
        let mut b = Stats::new();
        b.peak_signal_power = 0.9;

        let mut out = Stats::new();
        add_stats(&a, &b, &mut out);
        assert_eq!(out.peak_signal_power, 0.9);
    }

    #[test]
    fn test_demod_stats_bit_fix_histogram() {
        let mut a = DemodStats::default();
        a.bit_fix[0] = 4;
        a.bit_fix[1] = 1;
        let mut b = DemodStats::default();
        b.bit_fix[0] = 2;

        let out = a.add(&b);
        assert_eq!(out.bit_fix[0], 6);
        assert_eq!(out.bit_fix[1], 1);
    }

    #[test]
    fn test_rotation_accumulates_into_total() {
        let mut rot = StatsRotation::new();
        let mut minute = Stats::new();
        minute.messages_total = 100;
        rot.rotate(minute);
        assert_eq!(rot.total.messages_total, 100);
        assert_eq!(rot.last_1min[0].messages_total, 100);
        // latest resets for the next interval
        assert_eq!(rot.latest.messages_total, 0);

        let mut minute2 = Stats::new();
        minute2.messages_total = 50;
        rot.rotate(minute2);
        assert_eq!(rot.total.messages_total, 150);
    }
}
