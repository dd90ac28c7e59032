use std::future::Future;
use std::io::Write;
use tokio::time::{interval, Duration, MissedTickBehavior};

pub const DEFAULT_MINUTES: u64 = 25;
pub const MAX_MINUTES: u64 = 120;

const BAR_WIDTH: usize = 30;

pub fn format_remaining(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

pub fn progress_bar(elapsed: u64, total: u64, width: usize) -> String {
    let filled = if total == 0 {
        width
    } else {
        ((elapsed.min(total) as u128 * width as u128) / total as u128) as usize
    };
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

fn frame(elapsed: u64, total: u64) -> String {
    format!(
        "{} {}",
        progress_bar(elapsed, total, BAR_WIDTH),
        format_remaining(total.saturating_sub(elapsed))
    )
}

/// Blocking focus countdown, one tick per second. Ctrl-C stops it early.
/// Returns true when the countdown ran to the end.
pub async fn run_countdown(title: &str, minutes: u64) -> bool {
    let total = minutes.clamp(1, MAX_MINUTES) * 60;
    println!("Focus: {title} ({minutes} min, Ctrl-C to stop)");

    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let left = countdown(total, ctrl_c, |line| {
        print!("\r{line}");
        let _ = std::io::stdout().flush();
    })
    .await;

    if left > 0 {
        println!("\nFocus stopped with {} left.", format_remaining(left));
        return false;
    }
    println!("\nDone!");
    true
}

/// Shows one frame per elapsed second until `total` seconds pass or `stop`
/// resolves. Returns the seconds left, 0 when it ran to the end.
async fn countdown(total: u64, stop: impl Future<Output = ()>, mut show: impl FnMut(String)) -> u64 {
    let mut ticker = interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    tokio::pin!(stop);

    show(frame(0, total));
    for elapsed in 1..=total {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut stop => return total - (elapsed - 1),
        }
        show(frame(elapsed, total));
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_is_mm_ss() {
        assert_eq!(format_remaining(25 * 60), "25:00");
        assert_eq!(format_remaining(61), "01:01");
        assert_eq!(format_remaining(0), "00:00");
        assert_eq!(format_remaining(120 * 60), "120:00");
    }

    #[test]
    fn bar_fills_proportionally() {
        assert_eq!(progress_bar(0, 60, 10), "[----------]");
        assert_eq!(progress_bar(30, 60, 10), "[#####-----]");
        assert_eq!(progress_bar(60, 60, 10), "[##########]");
        assert_eq!(progress_bar(90, 60, 10), "[##########]");
    }

    #[test]
    fn last_frame_reads_zero() {
        assert!(frame(0, 60).ends_with(" 01:00"));
        let last = frame(60, 60);
        assert!(last.ends_with(" 00:00"), "{last}");
        assert!(!last.contains('-'));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_runs_the_whole_duration() {
        let start = tokio::time::Instant::now();
        let mut frames = Vec::new();
        let left = countdown(3, std::future::pending(), |f| frames.push(f)).await;
        assert_eq!(left, 0);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(frames.len(), 4);
        assert!(frames[0].ends_with("00:03"));
        assert!(frames[3].ends_with("00:00"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_reports_time_left() {
        let stop = tokio::time::sleep(Duration::from_millis(2500));
        let mut frames = Vec::new();
        let left = countdown(5, stop, |f| frames.push(f)).await;
        assert_eq!(left, 3);
        assert!(frames.last().is_some_and(|f| f.ends_with("00:03")));
    }
}
