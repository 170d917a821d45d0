//! Alias records and the interval rules they obey.
//!
//! An alias binds a text value to a target for the half-open interval
//! `[start, end)`. A missing `end` means the binding is open-ended.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AliasError, AliasId, AliasResult, Timestamp};

pub const MAX_TARGET_LEN: usize = 24;

/// Identifier of the aliased entity, at most [`MAX_TARGET_LEN`] characters.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target(String);

impl Target {
    pub fn new(value: impl Into<String>) -> AliasResult<Self> {
        let value = value.into();
        let len = value.chars().count();
        if len > MAX_TARGET_LEN {
            return Err(AliasError::invalid(format!(
                "target '{value}' is {len} characters, limit is {MAX_TARGET_LEN}"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Target {
    type Error = AliasError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Target::new(value)
    }
}

impl TryFrom<&str> for Target {
    type Error = AliasError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Target::new(value)
    }
}

impl From<Target> for String {
    fn from(value: Target) -> Self {
        value.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Half-open validity interval; `end == None` extends to +infinity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: Timestamp,
    pub end: Option<Timestamp>,
}

impl Interval {
    /// Fails with `EndBeforeStart` unless `end` is absent or strictly after `start`.
    pub fn new(start: Timestamp, end: Option<Timestamp>) -> AliasResult<Self> {
        if let Some(end) = end
            && end <= start
        {
            return Err(AliasError::end_before_start(start, end));
        }
        Ok(Self { start, end })
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub id: AliasId,
    pub alias: String,
    pub target: Target,
    pub start: Timestamp,
    pub end: Option<Timestamp>,
}

impl Alias {
    /// An open-ended record is active regardless of `now`.
    pub fn is_active(&self, now: Timestamp) -> bool {
        match self.end {
            None => true,
            Some(end) => end > now,
        }
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}. alias: {} - target: {}",
            self.id, self.alias, self.target
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateAliasInput {
    pub alias: String,
    pub target: Target,
    pub start: Timestamp,
    pub end: Option<Timestamp>,
}

impl CreateAliasInput {
    pub fn open(alias: impl Into<String>, target: Target, start: Timestamp) -> Self {
        Self {
            alias: alias.into(),
            target,
            start,
            end: None,
        }
    }

    pub fn bounded(
        alias: impl Into<String>,
        target: Target,
        start: Timestamp,
        end: Timestamp,
    ) -> Self {
        Self {
            alias: alias.into(),
            target,
            start,
            end: Some(end),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplaceAliasInput {
    /// Snapshot of the record being closed. Only its id is trusted once the
    /// write lock is held; the stored row is re-read.
    pub record: Alias,
    pub replace_at: Timestamp,
    pub new_alias: String,
}

/// Optional bounds for [`crate::AliasQueryApi::get_aliases`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct AliasRange {
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
}

/// Which filter a lookup applies. The branches do not reduce to one range
/// formula: bounded lookups ignore activity and drop open-ended rows, and the
/// single-bound lookups treat `from` and `to` differently.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RangeFilter {
    /// `start >= from AND end <= to`.
    Within { from: Timestamp, to: Timestamp },
    /// `end >= now OR end IS NULL`.
    ActiveNow,
    /// `start >= from AND (end >= now OR end IS NULL)`.
    ActiveStartingFrom { from: Timestamp },
    /// `end <= to`.
    EndingBy { to: Timestamp },
}

impl AliasRange {
    pub fn active() -> Self {
        Self::default()
    }

    pub fn between(from: Timestamp, to: Timestamp) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn starting_from(from: Timestamp) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    pub fn ending_by(to: Timestamp) -> Self {
        Self {
            from: None,
            to: Some(to),
        }
    }

    pub fn filter(&self) -> RangeFilter {
        match (self.from, self.to) {
            (Some(from), Some(to)) => RangeFilter::Within { from, to },
            (None, None) => RangeFilter::ActiveNow,
            (Some(from), None) => RangeFilter::ActiveStartingFrom { from },
            (None, Some(to)) => RangeFilter::EndingBy { to },
        }
    }
}

impl RangeFilter {
    /// In-memory form of the predicate the store runs in SQL.
    pub fn matches(&self, record: &Alias, now: Timestamp) -> bool {
        let active = record.end.is_none_or(|end| end >= now);
        match *self {
            RangeFilter::Within { from, to } => {
                record.start >= from && record.end.is_some_and(|end| end <= to)
            }
            RangeFilter::ActiveNow => active,
            RangeFilter::ActiveStartingFrom { from } => record.start >= from && active,
            RangeFilter::EndingBy { to } => record.end.is_some_and(|end| end <= to),
        }
    }
}
