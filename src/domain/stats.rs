//! Stats — per-scope counters keyed by (`all` | year | year-month |
//! year-month-day) and stat name.

use chrono::{DateTime, Utc};

/// The four counter names tracked across scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatName {
    ApiCalls,
    Assets,
    Variations,
    Length,
}

impl StatName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApiCalls => "api_calls",
            Self::Assets => "assets",
            Self::Variations => "variations",
            Self::Length => "length",
        }
    }
}

/// A single `(stat_name, delta)` increment to apply across scopes.
#[derive(Debug, Clone, Copy)]
pub struct StatDelta {
    pub name: StatName,
    pub delta: i64,
}

impl StatDelta {
    pub fn new(name: StatName, delta: i64) -> Self {
        Self { name, delta }
    }
}

/// Build the set of storage keys that a single `Stats::inc` call touches
/// for one scope prefix: `all` time-scopes and one `account_id` scope,
/// each suffixed with the stat name.
///
/// `Stats.inc` increments four time-scopes per call (`all`, the 4-digit
/// year, the `YYYY-MM` month, and the `YYYY-MM-DD` day), doubled across the
/// global `all` account-scope and the per-account scope — see
/// [`inc_keys`].
pub fn time_scopes(at: DateTime<Utc>) -> [String; 4] {
    [
        "all".to_string(),
        at.format("%Y").to_string(),
        at.format("%Y-%m").to_string(),
        at.format("%Y-%m-%d").to_string(),
    ]
}

/// All storage keys touched by incrementing `stat` at `at`, for both the
/// global `all` account scope and `account_id`'s own scope. Callers apply
/// `delta` atomically to every key returned.
pub fn inc_keys(account_id: &str, stat: StatName, at: DateTime<Utc>) -> Vec<String> {
    let mut keys = Vec::with_capacity(8);
    for account_scope in ["all", account_id] {
        for time_scope in time_scopes(at) {
            keys.push(format!("stats:{account_scope}:{time_scope}:{}", stat.as_str()));
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn inc_keys_covers_all_and_account_scope_across_four_time_scopes() {
        let at = Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap();
        let keys = inc_keys("acct-1", StatName::Assets, at);
        assert_eq!(keys.len(), 8);
        assert!(keys.contains(&"stats:all:all:assets".to_string()));
        assert!(keys.contains(&"stats:acct-1:2026:assets".to_string()));
        assert!(keys.contains(&"stats:acct-1:2026-03:assets".to_string()));
        assert!(keys.contains(&"stats:acct-1:2026-03-05:assets".to_string()));
    }
}
