//! C4 — Traffic Pattern Parser: parses the `start-end:rate%` DSL into a
//! step function of elapsed time (spec §4.4).

use pipegen_core::error::PipegenError;
use pipegen_core::model::{TrafficPattern, TrafficPatterns};
use std::time::Duration;

/// Parses a comma-separated list of `<start>-<end>:<percent>%` entries
/// against a base rate.
///
/// Each duration is `<n>(h|m|s|ms)` — a bare integer followed by a unit, no
/// combining (`1h30m` is not accepted; use `90m`). Percentages are relative
/// to `base_rate` and may exceed 100. Entries must be non-overlapping and
/// each entry's start must precede its end. An empty or whitespace-only
/// pattern yields a constant pattern at `base_rate`.
pub fn parse_traffic_pattern(
    pattern: &str,
    base_rate: f64,
) -> Result<TrafficPatterns, PipegenError> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return Ok(TrafficPatterns::constant(base_rate));
    }

    let mut entries = Vec::new();
    for raw_entry in trimmed.split(',') {
        let raw_entry = raw_entry.trim();
        if raw_entry.is_empty() {
            continue;
        }
        entries.push(parse_entry(raw_entry)?);
    }

    entries.sort_by_key(|e: &TrafficPattern| e.start);
    for window in entries.windows(2) {
        if window[0].end > window[1].start {
            return Err(PipegenError::ProjectInvalid(format!(
                "overlapping traffic pattern entries: {:?}-{:?} and {:?}-{:?}",
                window[0].start, window[0].end, window[1].start, window[1].end
            )));
        }
    }

    Ok(TrafficPatterns {
        base_rate,
        entries,
    })
}

fn parse_entry(entry: &str) -> Result<TrafficPattern, PipegenError> {
    let (range, percent) = entry.split_once(':').ok_or_else(|| {
        PipegenError::ProjectInvalid(format!("malformed traffic pattern entry: {entry}"))
    })?;
    let (start_raw, end_raw) = range.split_once('-').ok_or_else(|| {
        PipegenError::ProjectInvalid(format!("malformed traffic pattern range: {range}"))
    })?;

    let percent_raw = percent.trim().strip_suffix('%').ok_or_else(|| {
        PipegenError::ProjectInvalid(format!(
            "traffic pattern rate must end in '%': {percent}"
        ))
    })?;
    let percent: f64 = percent_raw.trim().parse().map_err(|_| {
        PipegenError::ProjectInvalid(format!("invalid traffic pattern rate: {percent}"))
    })?;
    if percent <= 0.0 {
        return Err(PipegenError::ProjectInvalid(format!(
            "traffic pattern rate must be positive, got {percent}%"
        )));
    }

    let start = parse_duration(start_raw.trim())?;
    let end = parse_duration(end_raw.trim())?;
    if start >= end {
        return Err(PipegenError::ProjectInvalid(format!(
            "traffic pattern entry has an inverted or empty range: {start_raw}-{end_raw}"
        )));
    }

    Ok(TrafficPattern {
        start,
        end,
        multiplier: percent / 100.0,
    })
}

/// Parses a single `<n><unit>` duration where unit is one of `ms`, `s`,
/// `m`, `h`. No combining of units within one token.
fn parse_duration(raw: &str) -> Result<Duration, PipegenError> {
    let unit_start = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| PipegenError::ProjectInvalid(format!("duration missing unit: {raw}")))?;
    let (digits, unit) = raw.split_at(unit_start);
    if digits.is_empty() {
        return Err(PipegenError::ProjectInvalid(format!(
            "duration missing numeric value: {raw}"
        )));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| PipegenError::ProjectInvalid(format!("invalid duration value: {raw}")))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        other => Err(PipegenError::ProjectInvalid(format!(
            "unknown duration unit '{other}' in {raw}; expected ms, s, m, or h"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pattern_is_constant() {
        let patterns = parse_traffic_pattern("", 10.0).unwrap();
        assert_eq!(patterns.rate_at(Duration::from_secs(999)), 10.0);
    }

    #[test]
    fn single_entry_scales_rate_within_window() {
        let patterns = parse_traffic_pattern("0s-30s:200%", 10.0).unwrap();
        assert_eq!(patterns.rate_at(Duration::from_secs(10)), 20.0);
        assert_eq!(patterns.rate_at(Duration::from_secs(40)), 10.0);
    }

    #[test]
    fn multiple_entries_step_over_time() {
        let patterns = parse_traffic_pattern("0s-10s:50%,10s-20s:300%", 5.0).unwrap();
        assert_eq!(patterns.rate_at(Duration::from_secs(5)), 2.5);
        assert_eq!(patterns.rate_at(Duration::from_secs(15)), 15.0);
        assert_eq!(patterns.rate_at(Duration::from_secs(25)), 5.0);
    }

    #[test]
    fn rejects_overlapping_entries() {
        let result = parse_traffic_pattern("0s-15s:100%,10s-20s:100%", 10.0);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_inverted_range() {
        let result = parse_traffic_pattern("20s-10s:100%", 10.0);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_non_positive_rate() {
        let result = parse_traffic_pattern("0s-10s:0%", 10.0);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_malformed_syntax() {
        assert!(parse_traffic_pattern("0s10s:100", 10.0).is_err());
        assert!(parse_traffic_pattern("0x-10s:100%", 10.0).is_err());
    }

    #[test]
    fn accepts_mixed_units() {
        let patterns = parse_traffic_pattern("1m-2m:150%", 10.0).unwrap();
        assert_eq!(patterns.rate_at(Duration::from_secs(90)), 15.0);
    }
}
