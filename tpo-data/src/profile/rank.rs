use super::{BreakdownRow, DayProfile, DayRank, ProfileContext};
use crate::error::DataError;

/// Rank every day of `context` and summarise the most recent one.
///
/// Directional factors (each `-1`, `0` or `1`): close vs POC, close vs value area, POC
/// migration against the prior day and range extension beyond the initial balance.
/// `power1` is their plain sum scaled to ±100, `power` weights `power1` by the day's
/// volume relative to the `avglen` preceding days.
pub fn day_rank(context: &ProfileContext) -> Result<DayRank, DataError> {
    let latest = context
        .last()
        .ok_or_else(|| DataError::Profile("cannot rank an empty profile context".to_string()))?;

    let avglen = context.params.avglen.max(1);
    let breakdown: Vec<BreakdownRow> = context
        .profiles
        .iter()
        .enumerate()
        .map(|(index, profile)| {
            let prior = &context.profiles[index.saturating_sub(avglen)..index];
            breakdown_row(profile, prior)
        })
        .collect();

    let (power, power1) = breakdown
        .last()
        .map(|row| (row.power, row.power1))
        .unwrap_or_default();

    Ok(DayRank {
        power,
        power1,
        highd: latest.high,
        lowd: latest.low,
        breakdown,
    })
}

fn direction(delta: f64) -> f64 {
    if delta > 0.0 {
        1.0
    } else if delta < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// `prior` holds the preceding days, oldest first.
fn breakdown_row(profile: &DayProfile, prior: &[DayProfile]) -> BreakdownRow {
    let close_vs_poc = direction(profile.close - profile.poc);

    let close_vs_value = if profile.close > profile.vah {
        1.0
    } else if profile.close < profile.val {
        -1.0
    } else {
        0.0
    };

    let poc_migration = prior
        .last()
        .map_or(0.0, |previous| direction(profile.poc - previous.poc));

    let range_extension = f64::from(u8::from(profile.high > profile.ib_high))
        - f64::from(u8::from(profile.low < profile.ib_low));

    let relative_volume = match prior.len() {
        0 => 1.0,
        n => {
            let average = prior.iter().map(|day| day.volume).sum::<f64>() / n as f64;
            if average > 0.0 {
                profile.volume / average
            } else {
                1.0
            }
        }
    };

    let power1 = (close_vs_poc + close_vs_value + poc_migration + range_extension) / 4.0 * 100.0;
    let power = (power1 * relative_volume).clamp(-100.0, 100.0);

    BreakdownRow {
        date: profile.date,
        close_vs_poc,
        close_vs_value,
        poc_migration,
        range_extension,
        relative_volume,
        power1,
        power,
    }
}
