//!
//! The Deprivation module maps deprivation ranks to percentile bands.  [BandingScheme],
//! [MissingRankPolicy], [deprivation_class] and [TERMINAL_BAND] are re-exported.
//!

use std::collections::BTreeMap;
use std::ops::Bound;

use serde::{Serialize, Deserialize};

use crate::error::{CensusError, Result};
use crate::records::{FieldValue, Record};
use crate::schema::RecordSchema;

/// The band for ranks beyond every boundary, i.e. the least deprived areas
pub const TERMINAL_BAND : u8 = 100;

/// How a rank is turned into a percentile band.  Rank 1 is the most deprived area.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum BandingScheme {
    /// Precomputed boundaries: a rank gets the label of the smallest threshold strictly greater than
    /// it, or `terminal` if there's none
    Thresholds { thresholds : BTreeMap<i32, u8>, terminal : u8 },
    /// Boundaries every `class_width` ranks: a rank no greater than `class_width * k` gets band
    /// `percentage_band * k`, for the first such `k` up to `number_of_classes`
    FixedWidth { class_width : i32, number_of_classes : u32, percentage_band : u8 },
}

impl BandingScheme {

    /// Builds thresholds so that, out of `area_count` ranked areas, ranks `1..=ceil(area_count * p / 100)`
    /// fall in band `p` for each of `percents`
    ///
    /// ```
    /// use census_store::BandingScheme;
    ///
    /// let scheme = BandingScheme::percentiles(32844, &[3, 5, 10, 20]);
    /// assert_eq!(scheme.band(986), 3);
    /// assert_eq!(scheme.band(987), 5);
    /// assert_eq!(scheme.band(6569), 20);
    /// assert_eq!(scheme.band(6570), 100);
    /// ```
    pub fn percentiles(area_count : u32, percents : &[u8]) -> Self {
        let thresholds = percents.iter()
            .map(|percent| {
                let last_rank = (area_count as u64 * *percent as u64).div_ceil(100);
                (i32::try_from(last_rank + 1).unwrap_or(i32::MAX), *percent)
            })
            .collect();
        BandingScheme::Thresholds{ thresholds, terminal : TERMINAL_BAND }
    }

    pub fn band(&self, rank : i32) -> u8 {
        match self {
            BandingScheme::Thresholds{ thresholds, terminal } => {
                thresholds.range((Bound::Excluded(rank), Bound::Unbounded))
                    .next()
                    .map(|(_threshold, label)| *label)
                    .unwrap_or(*terminal)
            },
            BandingScheme::FixedWidth{ class_width, number_of_classes, percentage_band } => {
                (1..=*number_of_classes)
                    .find(|k| rank as i64 <= *class_width as i64 * *k as i64)
                    .map(|k| u8::try_from(*percentage_band as u32 * k).unwrap_or(TERMINAL_BAND))
                    .unwrap_or(TERMINAL_BAND)
            }
        }
    }
}

/// What [deprivation_class] does with a record whose rank is missing
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingRankPolicy {
    /// Fail with [CensusError::MissingRank]
    #[default]
    Reject,
    /// Put the record in [TERMINAL_BAND]
    TerminalBand,
    /// Treat the rank as 0, which puts the record in the most deprived band.  Matches older
    /// tooling; only use it to reproduce old outputs.
    MostDeprived,
}

/// Returns the band of a record, from the integer rank in `rank_field`
pub fn deprivation_class(record : &Record, schema : &RecordSchema, rank_field : &str, scheme : &BandingScheme, policy : MissingRankPolicy) -> Result<u8> {
    let rank = match schema.value(record, rank_field)? {
        FieldValue::Missing => match policy {
            MissingRankPolicy::Reject => return Err(CensusError::MissingRank(rank_field.to_string())),
            MissingRankPolicy::TerminalBand => return Ok(TERMINAL_BAND),
            MissingRankPolicy::MostDeprived => 0,
        },
        value => value.as_i64()
            .and_then(|rank| i32::try_from(rank).ok())
            .ok_or_else(|| CensusError::InvalidValue{ field : rank_field.to_string(), reason : format!("{value:?} is not a rank") })?,
    };
    Ok(scheme.band(rank))
}
