//! Remaining-time estimation for a batch of remote tasks.

use std::time::Duration;

/// Percent complete and expected time left for a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub percent_complete: f64,
    /// `None` until there is enough progress to extrapolate from.
    pub remaining: Option<Duration>,
}

/// Extrapolates the time left from the time spent so far.
///
/// With several tasks outstanding the average time per finished task is
/// projected over the rest. With one task left, its own `current_percent`
/// gives a finer projection once it is above zero.
pub fn estimate(
    elapsed: Duration,
    total: usize,
    completed: usize,
    current_percent: Option<u8>,
) -> Estimate {
    let completed = completed.min(total);
    let remaining_tasks = total - completed;
    if remaining_tasks == 0 {
        return Estimate {
            percent_complete: 100.0,
            remaining: Some(Duration::ZERO),
        };
    }

    let by_count = (completed > 0)
        .then(|| elapsed.mul_f64(remaining_tasks as f64 / completed as f64));

    if remaining_tasks == 1
        && let Some(percent) = current_percent.map(|p| p.min(100))
    {
        let percent_complete = (completed as f64 + f64::from(percent) / 100.0) / total as f64 * 100.0;
        let remaining = if percent > 0 {
            Some(elapsed.mul_f64(f64::from(100 - percent) / f64::from(percent)))
        } else {
            by_count
        };
        return Estimate {
            percent_complete,
            remaining,
        };
    }

    Estimate {
        percent_complete: completed as f64 / total as f64 * 100.0,
        remaining: by_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_known_yet() {
        let e = estimate(Duration::from_secs(3), 4, 0, None);
        assert_eq!(e.percent_complete, 0.0);
        assert_eq!(e.remaining, None);
    }

    #[test]
    fn projects_average_task_time() {
        // 2 of 5 done in 10s -> 5s per task, 3 left.
        let e = estimate(Duration::from_secs(10), 5, 2, Some(30));
        assert_eq!(e.percent_complete, 40.0);
        assert_eq!(e.remaining, Some(Duration::from_secs(15)));
    }

    #[test]
    fn single_task_uses_its_own_progress() {
        // 25% in 10s -> 30s more.
        let e = estimate(Duration::from_secs(10), 1, 0, Some(25));
        assert_eq!(e.percent_complete, 25.0);
        assert_eq!(e.remaining, Some(Duration::from_secs(30)));
    }

    #[test]
    fn last_of_several_blends_progress_into_percent() {
        let e = estimate(Duration::from_secs(20), 2, 1, Some(50));
        assert_eq!(e.percent_complete, 75.0);
        assert_eq!(e.remaining, Some(Duration::from_secs(20)));
    }

    #[test]
    fn zero_progress_falls_back_to_task_count() {
        let e = estimate(Duration::from_secs(8), 3, 2, Some(0));
        assert_eq!(e.remaining, Some(Duration::from_secs(4)));

        let e = estimate(Duration::from_secs(8), 1, 0, Some(0));
        assert_eq!(e.remaining, None);
    }

    #[test]
    fn all_done() {
        let e = estimate(Duration::from_secs(8), 3, 3, None);
        assert_eq!(e.percent_complete, 100.0);
        assert_eq!(e.remaining, Some(Duration::ZERO));

        let e = estimate(Duration::ZERO, 0, 0, None);
        assert_eq!(e.percent_complete, 100.0);
    }
}
