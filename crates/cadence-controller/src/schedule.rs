//! Scheduled-transition clock.
//!
//! Pure time arithmetic for resources whose desired state expires at an
//! instant, plus the rules that pick the next such instant. Randomness is
//! always passed in, so a seeded generator makes schedules reproducible.

use crate::{ReconcileError, Result};
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Added to every future delay so the next pass lands after the boundary
pub const REQUEUE_GUARD: Duration = Duration::from_secs(1);

/// True iff `at` is not in the future
pub fn has_passed(now: DateTime<Utc>, at: DateTime<Utc>) -> bool {
    at <= now
}

/// Time left until `at`, zero once it has passed
pub fn delay_until(now: DateTime<Utc>, at: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}

/// Pick the next transition instant after `now` according to `rule`.
///
/// The result is rounded up to a whole second, the precision timestamps are
/// persisted at, so it stays strictly after `now` once stored.
pub fn next_transition<R: Rng>(
    now: DateTime<Utc>,
    rule: &ScheduleRule,
    rng: &mut R,
) -> DateTime<Utc> {
    let delay = TimeDelta::from_std(rule.sample(rng)).unwrap_or(TimeDelta::MAX);
    let at = now
        .checked_add_signed(delay)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let whole = at.trunc_subsecs(0);
    if whole == at {
        at
    } else {
        whole.checked_add_signed(TimeDelta::seconds(1)).unwrap_or(whole)
    }
}

/// How far ahead the next transition is scheduled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "camelCase")]
pub enum ScheduleRule {
    /// `k * base` for a uniformly chosen integer `k` in `multiples[0]..=multiples[1]`
    #[serde(rename_all = "camelCase")]
    DiscreteMultiples {
        #[serde(with = "millis")]
        base: Duration,
        multiples: [u32; 2],
    },

    /// Uniform delay in `min..=max`, millisecond resolution
    UniformRange {
        #[serde(with = "millis")]
        min: Duration,
        #[serde(with = "millis")]
        max: Duration,
    },

    /// Always the same delay
    Fixed {
        #[serde(with = "millis")]
        after: Duration,
    },
}

impl Default for ScheduleRule {
    fn default() -> Self {
        Self::DiscreteMultiples {
            base: Duration::from_secs(10),
            multiples: [1, 2],
        }
    }
}

impl ScheduleRule {
    /// Reject rules that could schedule a transition at `now` or that draw
    /// from an empty range
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::DiscreteMultiples {
                base,
                multiples: [lo, hi],
            } => {
                if base.is_zero() {
                    return Err(ReconcileError::invalid_config(
                        "discreteMultiples base must be positive",
                        "Use a base of at least one millisecond, e.g. 10s",
                    ));
                }
                if *lo == 0 || lo > hi {
                    return Err(ReconcileError::invalid_config(
                        format!("discreteMultiples range [{}, {}] is empty or includes 0", lo, hi),
                        "Use multiples like [1, 2] with 1 <= lo <= hi",
                    ));
                }
            }
            Self::UniformRange { min, max } => {
                if min.is_zero() || min > max {
                    return Err(ReconcileError::invalid_config(
                        format!("uniformRange [{:?}, {:?}] is empty or includes 0", min, max),
                        "Use 0 < min <= max",
                    ));
                }
            }
            Self::Fixed { after } => {
                if after.is_zero() {
                    return Err(ReconcileError::invalid_config(
                        "fixed delay must be positive",
                        "Use a delay of at least one millisecond",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Draw one delay
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Duration {
        match self {
            Self::DiscreteMultiples {
                base,
                multiples: [lo, hi],
            } => {
                let k = rng.random_range(*lo..=(*hi).max(*lo));
                base.saturating_mul(k)
            }
            Self::UniformRange { min, max } => {
                let lo = min.as_millis() as u64;
                let hi = (max.as_millis() as u64).max(lo);
                Duration::from_millis(rng.random_range(lo..=hi))
            }
            Self::Fixed { after } => *after,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_has_passed_boundary() {
        let now = at("2024-01-01T00:00:00Z");
        assert!(has_passed(now, now));
        assert!(has_passed(now, now - TimeDelta::seconds(5)));
        assert!(!has_passed(now, now + TimeDelta::milliseconds(1)));
    }

    #[test]
    fn test_delay_until() {
        let now = at("2024-01-01T00:00:00Z");
        assert_eq!(delay_until(now, now), Duration::ZERO);
        assert_eq!(delay_until(now, now - TimeDelta::seconds(5)), Duration::ZERO);
        assert_eq!(
            delay_until(now, now + TimeDelta::seconds(30)),
            Duration::from_secs(30)
        );
        assert_eq!(
            delay_until(now, now + TimeDelta::milliseconds(1500)),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_default_rule_picks_ten_or_twenty_seconds() {
        let now = at("2024-01-01T00:00:00Z");
        let rule = ScheduleRule::default();
        let mut rng = StdRng::seed_from_u64(7);

        let mut seen: HashMap<i64, usize> = HashMap::new();
        for _ in 0..200 {
            let next = next_transition(now, &rule, &mut rng);
            *seen.entry((next - now).num_seconds()).or_default() += 1;
        }

        assert_eq!(seen.len(), 2);
        assert!(seen[&10] > 50, "10s chosen {} times", seen[&10]);
        assert!(seen[&20] > 50, "20s chosen {} times", seen[&20]);
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let now = at("2024-01-01T00:00:00Z");
        let rule = ScheduleRule::UniformRange {
            min: Duration::from_secs(5),
            max: Duration::from_secs(60),
        };

        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            assert_eq!(
                next_transition(now, &rule, &mut a),
                next_transition(now, &rule, &mut b)
            );
        }
    }

    #[test]
    fn test_uniform_range_stays_in_bounds() {
        let now = at("2024-01-01T00:00:00Z");
        let rule = ScheduleRule::UniformRange {
            min: Duration::from_secs(5),
            max: Duration::from_secs(8),
        };
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..100 {
            let next = next_transition(now, &rule, &mut rng);
            let secs = (next - now).num_seconds();
            assert!((5..=8).contains(&secs), "delay {}s out of range", secs);
        }
    }

    #[test]
    fn test_next_transition_rounds_up_to_whole_seconds() {
        let now = at("2024-01-01T00:00:00.250Z");
        let rule = ScheduleRule::Fixed {
            after: Duration::from_millis(500),
        };
        let mut rng = StdRng::seed_from_u64(0);

        let next = next_transition(now, &rule, &mut rng);
        assert_eq!(next, at("2024-01-01T00:00:01Z"));
        assert!(next > now);
    }

    #[test]
    fn test_validate_rejects_empty_ranges() {
        assert!(ScheduleRule::default().validate().is_ok());
        assert!(ScheduleRule::DiscreteMultiples {
            base: Duration::ZERO,
            multiples: [1, 2],
        }
        .validate()
        .is_err());
        assert!(ScheduleRule::DiscreteMultiples {
            base: Duration::from_secs(1),
            multiples: [3, 2],
        }
        .validate()
        .is_err());
        assert!(ScheduleRule::UniformRange {
            min: Duration::ZERO,
            max: Duration::from_secs(1),
        }
        .validate()
        .is_err());
        assert!(ScheduleRule::Fixed {
            after: Duration::ZERO
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_rule_config_format() {
        let rule: ScheduleRule = serde_json::from_str(
            r#"{"rule":"discreteMultiples","base":10000,"multiples":[1,2]}"#,
        )
        .unwrap();
        assert_eq!(rule, ScheduleRule::default());

        let rule: ScheduleRule =
            serde_json::from_str(r#"{"rule":"uniformRange","min":5000,"max":20000}"#).unwrap();
        assert_eq!(
            rule,
            ScheduleRule::UniformRange {
                min: Duration::from_secs(5),
                max: Duration::from_secs(20),
            }
        );

        let json = serde_json::to_value(ScheduleRule::Fixed {
            after: Duration::from_secs(3),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"rule": "fixed", "after": 3000}));
    }
}
