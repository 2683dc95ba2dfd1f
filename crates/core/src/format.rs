//! Human-readable renderings of exam timings.

/// Formats a countdown as `M:SS`, e.g. `59:07`.
#[must_use]
pub fn countdown(remaining_secs: u64) -> String {
    let minutes = remaining_secs / 60;
    let seconds = remaining_secs % 60;
    format!("{minutes}:{seconds:02}")
}

/// Formats time spent as `Xm Ys`, e.g. `12m 5s`.
#[must_use]
pub fn time_spent(secs: u64) -> String {
    let minutes = secs / 60;
    let seconds = secs % 60;
    format!("{minutes}m {seconds}s")
}
