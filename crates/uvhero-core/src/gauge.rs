//! Gauge scoring.
//!
//! Four 0–3 gauges are derived from a day's committed records. Only the inner
//! channel feeds the score, after the same adjustment the display applies:
//! `adjusted = (max_inner + 1.0) * 2.1`.
//!
//! | gauge      | input                               | mapping                       |
//! |------------|-------------------------------------|-------------------------------|
//! | fatigue    | records with adjusted >= 6.0        | thresholds `[0, 10, 20, 30]`  |
//! | sunburn    | sum of adjusted                     | thresholds `[0, 300, 600, 1200]` |
//! | energy     | records with 2.0 <= adjusted <= 5.0 | step table, peaks at 10..30   |
//! | sleepiness | fatigue and energy levels           | first matching rule           |

use serde::{Deserialize, Serialize};

use crate::sensor::{adjusted_inner, AggregatedRecord};

/// Highest level any gauge can report.
pub const MAX_LEVEL: u8 = 3;

const FATIGUE_ADJUSTED_MIN: f64 = 6.0;
const FATIGUE_THRESHOLDS: [f64; 4] = [0.0, 10.0, 20.0, 30.0];
const SUNBURN_THRESHOLDS: [f64; 4] = [0.0, 300.0, 600.0, 1200.0];
const MODERATE_RANGE: std::ops::RangeInclusive<f64> = 2.0..=5.0;

/// The four gauge levels, each in `0..=3`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeLevels {
    pub fatigue: u8,
    pub sunburn: u8,
    pub energy: u8,
    pub sleepiness: u8,
}

/// Score a set of committed records. Empty input scores all zero.
pub fn score(records: &[AggregatedRecord]) -> GaugeLevels {
    score_adjusted(records.iter().map(|r| adjusted_inner(r.max_inner)))
}

/// Score already-adjusted inner values.
pub fn score_adjusted(adjusted: impl IntoIterator<Item = f64>) -> GaugeLevels {
    let mut fatigue_count = 0usize;
    let mut moderate_count = 0usize;
    let mut total = 0.0;
    let mut seen = false;

    for value in adjusted {
        seen = true;
        total += value;
        if value >= FATIGUE_ADJUSTED_MIN {
            fatigue_count += 1;
        }
        if MODERATE_RANGE.contains(&value) {
            moderate_count += 1;
        }
    }

    if !seen {
        return GaugeLevels::default();
    }

    let fatigue = threshold_level(fatigue_count as f64, &FATIGUE_THRESHOLDS);
    let sunburn = threshold_level(total, &SUNBURN_THRESHOLDS);
    let energy = energy_level(moderate_count);
    let sleepiness = sleepiness_level(fatigue, energy);

    GaugeLevels {
        fatigue,
        sunburn,
        energy,
        sleepiness,
    }
}

/// Index of the highest threshold strictly exceeded, or 0 when none is.
///
/// The first threshold is the floor of level 0, so `[0, 10, 20, 30]` maps
/// 1..=10 to 0, 11..=20 to 1, 21..=30 to 2 and anything above to 3.
fn threshold_level(value: f64, thresholds: &[f64; 4]) -> u8 {
    let exceeded = thresholds.iter().filter(|&&t| value > t).count();
    (exceeded.saturating_sub(1) as u8).min(MAX_LEVEL)
}

/// Non-monotonic on purpose: long stretches of moderate exposure lower the
/// score again.
fn energy_level(moderate_count: usize) -> u8 {
    match moderate_count {
        0 => 0,
        1..=4 => 1,
        5..=9 => 2,
        10..=29 => 3,
        30..=49 => 2,
        _ => 1,
    }
}

fn sleepiness_level(fatigue: u8, energy: u8) -> u8 {
    if energy == 0 {
        3
    } else if fatigue < 3 && energy == 3 {
        0
    } else if fatigue < 10 && energy == 2 {
        1
    } else if fatigue < 10 && energy == 1 {
        2
    } else {
        3
    }
}

/// What to suggest while the active window is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Advice {
    TakeAWalk,
    CoolDownIndoors,
    SeekShade,
}

impl Advice {
    pub fn for_levels(levels: &GaugeLevels) -> Self {
        if levels.energy == 0 {
            Advice::TakeAWalk
        } else if levels.fatigue >= levels.sunburn {
            Advice::CoolDownIndoors
        } else {
            Advice::SeekShade
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Advice::TakeAWalk => "Head out for a short walk!",
            Advice::CoolDownIndoors => "Cool down indoors for a bit, and don't forget to drink water!",
            Advice::SeekShade => "Is there shade nearby? Try walking in the shade!",
        }
    }
}

/// End-of-day remark based on how often exposure was prevented.
pub fn praise(prevent_count: u32) -> &'static str {
    if prevent_count >= 2 {
        "You blocked the UV well today. Great job!"
    } else {
        "Take a parasol or a hat when you go out tomorrow!"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(max_inner: f64) -> AggregatedRecord {
        AggregatedRecord {
            id: 0,
            timestamp: Utc::now(),
            max_outer: 0.0,
            max_inner,
        }
    }

    #[test]
    fn empty_input_scores_zero() {
        assert_eq!(score(&[]), GaugeLevels::default());
        assert_eq!(score_adjusted(Vec::new()), GaugeLevels::default());
    }

    #[test]
    fn two_fatigue_eligible_records_stay_at_zero() {
        let levels = score_adjusted([6.5, 7.0]);
        assert_eq!(levels.fatigue, 0);
        assert_eq!(levels.sunburn, 0);
        assert_eq!(levels.energy, 0);
        assert_eq!(levels.sleepiness, 3);
    }

    #[test]
    fn adjustment_is_applied_to_inner_channel() {
        // (0.0 + 1.0) * 2.1 = 2.1 -> moderate
        let levels = score(&[record(0.0)]);
        assert_eq!(levels.energy, 1);
        assert_eq!(levels.fatigue, 0);
        // (2.0 + 1.0) * 2.1 = 6.3 -> fatigue-eligible, not moderate
        let levels = score(&[record(2.0)]);
        assert_eq!(levels.energy, 0);
    }

    #[test]
    fn fatigue_thresholds() {
        let levels = |n: usize| score_adjusted(std::iter::repeat(6.0).take(n)).fatigue;
        assert_eq!(levels(10), 0);
        assert_eq!(levels(11), 1);
        assert_eq!(levels(20), 1);
        assert_eq!(levels(21), 2);
        assert_eq!(levels(31), 3);
        assert_eq!(levels(500), 3);
    }

    #[test]
    fn sunburn_thresholds() {
        let sunburn = |v: f64| score_adjusted([v]).sunburn;
        assert_eq!(sunburn(300.0), 0);
        assert_eq!(sunburn(300.5), 1);
        assert_eq!(sunburn(600.5), 2);
        assert_eq!(sunburn(1200.5), 3);
    }

    #[test]
    fn energy_step_table_is_non_monotonic() {
        let energy = |n: usize| score_adjusted(std::iter::repeat(3.0).take(n)).energy;
        assert_eq!(energy(1), 1);
        assert_eq!(energy(4), 1);
        assert_eq!(energy(5), 2);
        assert_eq!(energy(9), 2);
        assert_eq!(energy(10), 3);
        assert_eq!(energy(29), 3);
        assert_eq!(energy(30), 2);
        assert_eq!(energy(49), 2);
        assert_eq!(energy(50), 1);
    }

    #[test]
    fn moderate_range_is_inclusive() {
        assert_eq!(score_adjusted([2.0]).energy, 1);
        assert_eq!(score_adjusted([5.0]).energy, 1);
        assert_eq!(score_adjusted([5.01]).energy, 0);
        assert_eq!(score_adjusted([1.99]).energy, 0);
    }

    #[test]
    fn sleepiness_rules_in_order() {
        assert_eq!(sleepiness_level(0, 0), 3);
        assert_eq!(sleepiness_level(2, 3), 0);
        assert_eq!(sleepiness_level(3, 3), 3);
        assert_eq!(sleepiness_level(3, 2), 1);
        assert_eq!(sleepiness_level(3, 1), 2);
    }

    #[test]
    fn all_levels_bounded() {
        let levels = score_adjusted((0..2000).map(|i| (i % 13) as f64));
        for level in [levels.fatigue, levels.sunburn, levels.energy, levels.sleepiness] {
            assert!(level <= MAX_LEVEL);
        }
    }

    #[test]
    fn advice_follows_levels() {
        let mut levels = GaugeLevels::default();
        assert_eq!(Advice::for_levels(&levels), Advice::TakeAWalk);
        levels.energy = 2;
        levels.fatigue = 1;
        assert_eq!(Advice::for_levels(&levels), Advice::CoolDownIndoors);
        levels.sunburn = 2;
        assert_eq!(Advice::for_levels(&levels), Advice::SeekShade);
    }

    #[test]
    fn praise_depends_on_prevent_count() {
        assert_ne!(praise(2), praise(1));
    }
}
