//! Adaptive RTCP transmission scheduler (RFC 3550 §6.3, spec.md §4.3).

use std::time::Duration;

use rand::Rng;

/// Compensation factor applied to the randomized interval so the
/// average converges on `T_d` rather than `1.0 * T_d` (RFC 3550 §6.3.1).
const COMPENSATION: f64 = std::f64::consts::E - 1.5;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerParams {
    pub session_bandwidth: f64,
    pub control_traffic_fraction: f64,
    pub sender_control_bandwidth_fraction: f64,
    pub min_rtcp_interval: Duration,
    pub use_half_at_startup: bool,
    pub immediate_bye: bool,
    pub header_overhead: usize,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        SchedulerParams {
            session_bandwidth: 10_000.0,
            control_traffic_fraction: 0.05,
            sender_control_bandwidth_fraction: 0.25,
            min_rtcp_interval: Duration::from_secs(5),
            use_half_at_startup: true,
            immediate_bye: true,
            header_overhead: 28,
        }
    }
}

/// Parallel bookkeeping for a scheduled report, shared by the regular
/// RTCP schedule and the BYE sub-schedule (spec.md §4.3 "State").
#[derive(Debug, Clone, Copy)]
struct ReportSchedule {
    avg_size: f64,
    prev_members: u32,
}

impl ReportSchedule {
    fn new(initial_avg_size: f64) -> Self {
        ReportSchedule { avg_size: initial_avg_size, prev_members: 1 }
    }

    fn update_avg_size(&mut self, size: usize) {
        self.avg_size = self.avg_size * (15.0 / 16.0) + size as f64 * (1.0 / 16.0);
    }

    fn deterministic_interval(
        &self,
        params: &SchedulerParams,
        n_members: u32,
        n_senders: u32,
        first_call: bool,
    ) -> Duration {
        let bandwidth = params.session_bandwidth * params.control_traffic_fraction;
        if bandwidth <= 0.0 {
            return params.min_rtcp_interval;
        }

        let n_members = n_members.max(1) as f64;
        let n_senders = n_senders as f64;

        let bandwidth_share = if n_senders > 0.0 && n_senders < n_members * params.sender_control_bandwidth_fraction {
            bandwidth * params.sender_control_bandwidth_fraction / n_senders.max(1.0)
        } else {
            bandwidth / n_members
        };

        let packet_size = self.avg_size + params.header_overhead as f64;
        let t_d = (packet_size / bandwidth_share).max(
            if params.use_half_at_startup && first_call {
                params.min_rtcp_interval.as_secs_f64() / 2.0
            } else {
                params.min_rtcp_interval.as_secs_f64()
            },
        );

        Duration::from_secs_f64(t_d)
    }
}

/// Drives RTCP (and, separately, BYE) transmission timing per RFC 3550
/// §6.3's reconsideration algorithm.
pub struct RtcpScheduler {
    params: SchedulerParams,
    report: ReportSchedule,
    bye: ReportSchedule,

    has_sent_rtcp: bool,
    first_call: bool,
    prev_rtcp_time: Duration,
    next_rtcp_time: Duration,

    bye_scheduled: bool,
    send_bye_now: bool,
}

impl RtcpScheduler {
    pub fn new(params: SchedulerParams, now: Duration) -> Self {
        // A reasonable prior for a first SR/RR + SDES compound packet,
        // before any real average is observed.
        let initial_avg_size = 64.0;
        let mut scheduler = RtcpScheduler {
            params,
            report: ReportSchedule::new(initial_avg_size),
            bye: ReportSchedule::new(initial_avg_size),
            has_sent_rtcp: false,
            first_call: true,
            prev_rtcp_time: now,
            next_rtcp_time: now,
            bye_scheduled: false,
            send_bye_now: false,
        };
        scheduler.reschedule(now, 1, 0, &mut rand::rng());
        scheduler
    }

    pub fn deterministic_interval(&self, n_members: u32, n_senders: u32) -> Duration {
        self.report.deterministic_interval(&self.params, n_members, n_senders, self.first_call)
    }

    fn randomized_interval(t_d: Duration, rng: &mut impl Rng) -> Duration {
        let u: f64 = rng.random_range(0.5..=1.5);
        Duration::from_secs_f64(t_d.as_secs_f64() * u / COMPENSATION)
    }

    fn reschedule(&mut self, now: Duration, n_members: u32, n_senders: u32, rng: &mut impl Rng) {
        let t_d = self.deterministic_interval(n_members, n_senders);
        let interval = Self::randomized_interval(t_d, rng);
        self.prev_rtcp_time = now;
        self.next_rtcp_time = now + interval;
    }

    /// spec.md §4.3 "IsTime()": true iff `now >= next_rtcp_time`, applying
    /// forward reconsideration when it isn't yet time after recomputing.
    pub fn is_time(&mut self, now: Duration, n_members: u32, n_senders: u32, rng: &mut impl Rng) -> bool {
        if now < self.next_rtcp_time {
            return false;
        }

        let t_d = self.deterministic_interval(n_members, n_senders);
        let interval = Self::randomized_interval(t_d, rng);
        let candidate = self.prev_rtcp_time + interval;

        if now >= candidate {
            self.prev_rtcp_time = now;
            self.next_rtcp_time = now + interval;
            self.first_call = false;
            true
        } else {
            self.next_rtcp_time = candidate;
            false
        }
    }

    /// spec.md §4.3 "Reverse reconsideration": pull the schedule forward
    /// when the member count shrinks.
    pub fn member_left(&mut self, now: Duration, n_members: u32) {
        let prev = self.report.prev_members.max(1);
        if n_members < prev {
            let factor = n_members as f64 / prev as f64;
            let scale = |t: Duration| -> Duration {
                let delta = t.as_secs_f64() - now.as_secs_f64();
                Duration::from_secs_f64((now.as_secs_f64() + delta * factor).max(0.0))
            };
            self.next_rtcp_time = scale(self.next_rtcp_time);
            self.prev_rtcp_time = scale(self.prev_rtcp_time);
        }
        self.report.prev_members = n_members.max(1);
    }

    pub fn on_rtcp_sent(&mut self, size: usize) {
        self.report.update_avg_size(size);
        self.has_sent_rtcp = true;
    }

    pub fn on_rtcp_received(&mut self, size: usize) {
        self.report.update_avg_size(size);
    }

    pub fn has_sent_rtcp(&self) -> bool {
        self.has_sent_rtcp
    }

    /// spec.md §4.3 "BYE scheduling": immediate if few enough members,
    /// otherwise scheduled through the parallel BYE sub-schedule.
    pub fn schedule_bye(&mut self, now: Duration, n_members: u32, rng: &mut impl Rng) {
        self.bye_scheduled = true;
        if self.params.immediate_bye && n_members <= 50 {
            self.send_bye_now = true;
            return;
        }
        let t_d = self.bye.deterministic_interval(&self.params, n_members, 0, false);
        let interval = Self::randomized_interval(t_d, rng);
        self.next_rtcp_time = now + interval;
    }

    pub fn bye_ready(&mut self, now: Duration) -> bool {
        if !self.bye_scheduled {
            return false;
        }
        if self.send_bye_now || now >= self.next_rtcp_time {
            self.send_bye_now = false;
            self.bye_scheduled = false;
            true
        } else {
            false
        }
    }

    pub fn on_bye_sent(&mut self, size: usize) {
        self.bye.update_avg_size(size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_interval_with_two_members() {
        let params = SchedulerParams::default();
        let scheduler = RtcpScheduler::new(params, Duration::ZERO);
        let interval = scheduler.deterministic_interval(2, 1);
        assert!(interval >= Duration::from_secs_f64(2.5));
    }

    #[test]
    fn zero_bandwidth_floors_to_min_interval() {
        let mut params = SchedulerParams::default();
        params.session_bandwidth = 0.0;
        let scheduler = RtcpScheduler::new(params, Duration::ZERO);
        assert_eq!(scheduler.deterministic_interval(2, 1), params.min_rtcp_interval);
    }

    #[test]
    fn reverse_reconsideration_pulls_schedule_forward() {
        let params = SchedulerParams::default();
        let mut scheduler = RtcpScheduler::new(params, Duration::ZERO);
        scheduler.next_rtcp_time = Duration::from_secs(10);
        scheduler.prev_rtcp_time = Duration::from_secs(0);
        scheduler.report.prev_members = 4;
        scheduler.member_left(Duration::from_secs(2), 2);
        assert!(scheduler.next_rtcp_time < Duration::from_secs(10));
    }
}
