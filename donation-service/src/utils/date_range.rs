use chrono::NaiveDate;
use service_core::error::AppError;

/// An optional, inclusive window of calendar days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Parse `YYYY-MM-DD` bounds. Blank bounds are treated as absent; an end
    /// before the start is rejected.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, AppError> {
        let start = parse_day("start", start)?;
        let end = parse_day("end", end)?;

        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "end date {} is before start date {}",
                    end,
                    start
                )));
            }
        }

        Ok(Self { start, end })
    }
}

fn parse_day(param: &str, value: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    // chrono accepts unpadded fields, so also insist on the exact shape.
    let well_formed = value.len() == 10
        && value
            .char_indices()
            .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });

    if !well_formed {
        return Err(invalid_date(param, value));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| invalid_date(param, value))
}

fn invalid_date(param: &str, value: &str) -> AppError {
    AppError::BadRequest(anyhow::anyhow!(
        "{} must be a valid YYYY-MM-DD date, got {:?}",
        param,
        value
    ))
}
