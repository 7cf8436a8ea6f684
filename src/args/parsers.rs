use super::types::{PositiveU64, StopCount};
use crate::error::{AppError, AppResult};

pub(crate) fn parse_positive_u64(s: &str) -> AppResult<PositiveU64> {
    s.parse::<PositiveU64>().map_err(AppError::from)
}

pub(crate) fn parse_stop_count(s: &str) -> AppResult<StopCount> {
    s.parse::<StopCount>().map_err(AppError::from)
}
