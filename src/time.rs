use rand::{thread_rng, Rng};
use tokio::time::{self, Duration};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Create a Tokio [`Interval`][time::Interval] with the given period
/// (±10% random jitter). Periods shorter than a millisecond are raised to one.
///
/// If the `Interval` is polled less frequently than the period (i.e., a period
/// task ends up taking longer than its period), further tasks will be
/// [delayed][time::MissedTickBehavior::Delay] until another interval elapses.
pub(crate) fn interval(period: Duration) -> time::Interval {
    let j = thread_rng().gen_range(0.9..1.1);
    let period = period.mul_f64(j).max(MIN_PERIOD);

    let mut interval = time::interval_at(time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    interval
}
