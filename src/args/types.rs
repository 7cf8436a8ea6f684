use std::num::NonZeroU64;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositiveU64(NonZeroU64);

impl PositiveU64 {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl TryFrom<u64> for PositiveU64 {
    type Error = ValidationError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        NonZeroU64::new(value)
            .map(PositiveU64)
            .ok_or(ValidationError::ValueTooSmall { min: 1 })
    }
}

impl std::str::FromStr for PositiveU64 {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u64 = s
            .trim()
            .parse()
            .map_err(|err| ValidationError::InvalidNumber { source: err })?;
        PositiveU64::try_from(value)
    }
}

impl From<PositiveU64> for u64 {
    fn from(value: PositiveU64) -> Self {
        value.get()
    }
}

/// How many instances `stop` should terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCount {
    Count(usize),
    /// Every matching instance.
    All,
}

impl StopCount {
    #[must_use]
    pub const fn limit(self) -> usize {
        match self {
            StopCount::Count(count) => count,
            StopCount::All => usize::MAX,
        }
    }
}

impl std::str::FromStr for StopCount {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(StopCount::All);
        }
        trimmed
            .parse::<usize>()
            .map(StopCount::Count)
            .map_err(|_| ValidationError::InvalidStopCount {
                value: s.to_owned(),
            })
    }
}
