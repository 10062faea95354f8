//! Threshold calendar
//!
//! Snapshot policies score a page "as of" fixed calendar instants: the first
//! day of every month, of January and July, or of January, for each year from
//! [`START_YEAR`] through the sunset's year.

use crate::config::ConfigError;
use crate::types::Timestamp;
use std::fmt;
use std::str::FromStr;

/// First year of every threshold calendar
pub const START_YEAR: i32 = 2001;

/// Which revisions of a page get scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreAt {
    /// Every revision, at its own timestamp
    Revision,
    /// The last revision, reported at the sunset
    Latest,
    Monthly,
    Biannually,
    Annually,
}

impl ScoreAt {
    pub const ALL: [ScoreAt; 5] = [
        ScoreAt::Revision,
        ScoreAt::Monthly,
        ScoreAt::Biannually,
        ScoreAt::Annually,
        ScoreAt::Latest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Revision => "revision",
            Self::Latest => "latest",
            Self::Monthly => "monthly",
            Self::Biannually => "biannually",
            Self::Annually => "annually",
        }
    }

    /// Calendar granularity, `None` for the structural policies
    pub fn granularity(&self) -> Option<Granularity> {
        match self {
            Self::Monthly => Some(Granularity::Monthly),
            Self::Biannually => Some(Granularity::Biannually),
            Self::Annually => Some(Granularity::Annually),
            Self::Revision | Self::Latest => None,
        }
    }
}

impl FromStr for ScoreAt {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownScoreAt {
                value: s.to_string(),
            })
    }
}

impl fmt::Display for ScoreAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spacing of calendar thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Monthly,
    Biannually,
    Annually,
}

impl Granularity {
    fn months(&self) -> &'static [u32] {
        match self {
            Self::Monthly => &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
            Self::Biannually => &[1, 7],
            Self::Annually => &[1],
        }
    }
}

/// Thresholds from [`START_YEAR`] through the end of the sunset's year
pub fn thresholds(sunset: Timestamp, granularity: Granularity) -> Vec<Timestamp> {
    thresholds_from(START_YEAR, sunset, granularity)
}

/// Thresholds from `start_year` through the end of the sunset's year, ascending.
///
/// Instants after the sunset within its own year are included; the sampling
/// strategies drop them per page.
pub fn thresholds_from(start_year: i32, sunset: Timestamp, granularity: Granularity) -> Vec<Timestamp> {
    let months = granularity.months();
    (start_year..=sunset.year())
        .flat_map(|year| {
            months
                .iter()
                .filter_map(move |&month| Timestamp::from_ymd_hms(year, month, 1, 0, 0, 0))
        })
        .collect()
}
