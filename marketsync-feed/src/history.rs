//! Price history requests.
//!
//! The API accepts only certain period and frequency combinations; requests
//! are validated before anything goes on the wire.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::FeedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodType {
    Day,
    Month,
    Year,
    Ytd,
}

impl PeriodType {
    pub fn valid_periods(self) -> &'static [u32] {
        match self {
            PeriodType::Day => &[1, 2, 3, 4, 5, 10],
            PeriodType::Month => &[1, 2, 3, 6],
            PeriodType::Year => &[1, 2, 3, 5, 10, 15, 20],
            PeriodType::Ytd => &[1],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PeriodType::Day => "day",
            PeriodType::Month => "month",
            PeriodType::Year => "year",
            PeriodType::Ytd => "ytd",
        }
    }
}

impl FromStr for PeriodType {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(PeriodType::Day),
            "month" => Ok(PeriodType::Month),
            "year" => Ok(PeriodType::Year),
            "ytd" => Ok(PeriodType::Ytd),
            other => Err(FeedError::InvalidRequest(format!(
                "period type '{other}' is not one of day, month, year, ytd"
            ))),
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyType {
    Minute,
    Daily,
    Weekly,
    Monthly,
}

impl FrequencyType {
    pub fn valid_frequencies(self) -> &'static [u32] {
        match self {
            FrequencyType::Minute => &[1, 5, 10, 15, 30],
            FrequencyType::Daily | FrequencyType::Weekly | FrequencyType::Monthly => &[1],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FrequencyType::Minute => "minute",
            FrequencyType::Daily => "daily",
            FrequencyType::Weekly => "weekly",
            FrequencyType::Monthly => "monthly",
        }
    }
}

impl FromStr for FrequencyType {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minute" => Ok(FrequencyType::Minute),
            "daily" => Ok(FrequencyType::Daily),
            "weekly" => Ok(FrequencyType::Weekly),
            "monthly" => Ok(FrequencyType::Monthly),
            other => Err(FeedError::InvalidRequest(format!(
                "frequency type '{other}' is not one of minute, daily, weekly, monthly"
            ))),
        }
    }
}

impl fmt::Display for FrequencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceHistoryRequest {
    pub symbol: String,
    pub period_type: PeriodType,
    pub period: u32,
    pub frequency_type: FrequencyType,
    pub frequency: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub need_extended_hours_data: bool,
    pub need_previous_close: bool,
}

impl PriceHistoryRequest {
    /// Daily candles over one month, the most common pull.
    pub fn daily(symbol: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            period_type: PeriodType::Month,
            period: 1,
            frequency_type: FrequencyType::Daily,
            frequency: 1,
            start_date,
            end_date,
            need_extended_hours_data: true,
            need_previous_close: true,
        }
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        if self.symbol.trim().is_empty() {
            return Err(FeedError::InvalidRequest("symbol is empty".into()));
        }
        if !self.period_type.valid_periods().contains(&self.period) {
            return Err(FeedError::InvalidRequest(format!(
                "period {} is not valid for period type {} (expected one of {:?})",
                self.period,
                self.period_type,
                self.period_type.valid_periods()
            )));
        }
        if !self.frequency_type.valid_frequencies().contains(&self.frequency) {
            return Err(FeedError::InvalidRequest(format!(
                "frequency {} is not valid for frequency type {} (expected one of {:?})",
                self.frequency,
                self.frequency_type,
                self.frequency_type.valid_frequencies()
            )));
        }
        if self.end_date < self.start_date {
            return Err(FeedError::InvalidRequest(format!(
                "end date {} precedes start date {}",
                self.end_date, self.start_date
            )));
        }
        Ok(())
    }

    /// Query parameters, dates as epoch milliseconds at UTC midnight.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", self.symbol.clone()),
            ("periodType", self.period_type.to_string()),
            ("period", self.period.to_string()),
            ("frequencyType", self.frequency_type.to_string()),
            ("frequency", self.frequency.to_string()),
            ("startDate", epoch_millis(self.start_date).to_string()),
            ("endDate", epoch_millis(self.end_date).to_string()),
            ("needExtendedHoursData", self.need_extended_hours_data.to_string()),
            ("needPreviousClose", self.need_previous_close.to_string()),
        ]
    }
}

fn epoch_millis(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map_or(0, |dt| dt.and_utc().timestamp_millis())
}
