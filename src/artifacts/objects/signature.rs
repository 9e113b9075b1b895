//! Author, committer and tagger identities
//!
//! ## Format
//!
//! `<name> <<email>> <unix-seconds> <+hhmm>`

use crate::errors::{Error, Result};
use chrono::{DateTime, FixedOffset, TimeZone};

/// Which pair of `GIT_*` variables a signature is loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureRole {
    Author,
    Committer,
}

impl SignatureRole {
    fn env_prefix(&self) -> &'static str {
        match self {
            SignatureRole::Author => "GIT_AUTHOR",
            SignatureRole::Committer => "GIT_COMMITTER",
        }
    }
}

/// Name, email and timestamp with timezone information
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Signature {
    name: String,
    email: String,
    timestamp: DateTime<FixedOffset>,
}

impl Signature {
    /// Create a signature stamped with the current local time
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Result<Self> {
        Self::new_with_timestamp(name, email, chrono::Local::now().fixed_offset())
    }

    pub fn new_with_timestamp(
        name: impl Into<String>,
        email: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
    ) -> Result<Self> {
        let name = name.into();
        let email = email.into();

        for (field, value) in [("name", &name), ("email", &email)] {
            if value.contains(['<', '>', '\n']) {
                return Err(Error::invalid_argument(format!(
                    "signature {field} {value:?} contains '<', '>' or a newline"
                )));
            }
        }

        Ok(Signature {
            name: name.trim().to_string(),
            email,
            timestamp,
        })
    }

    /// Build a signature from seconds since the epoch and an offset in minutes
    pub fn from_parts(
        name: impl Into<String>,
        email: impl Into<String>,
        seconds: i64,
        offset_minutes: i32,
    ) -> Result<Self> {
        let offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            Error::invalid_argument(format!("invalid timezone offset {offset_minutes}"))
        })?;
        let timestamp = offset
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| Error::invalid_argument(format!("invalid timestamp {seconds}")))?;

        Self::new_with_timestamp(name, email, timestamp)
    }

    /// Load an identity from `GIT_<ROLE>_NAME`, `GIT_<ROLE>_EMAIL` and `GIT_<ROLE>_DATE`
    ///
    /// The date is optional and falls back to the current time.
    pub fn load_from_env(role: SignatureRole) -> Result<Self> {
        let prefix = role.env_prefix();
        let read = |suffix: &str| {
            let variable = format!("{prefix}_{suffix}");
            std::env::var(&variable)
                .map_err(|_| Error::invalid_argument(format!("{variable} not set")))
        };

        let name = read("NAME")?;
        let email = read("EMAIL")?;

        match read("DATE").ok().and_then(|date| parse_date(&date)) {
            Some(timestamp) => Self::new_with_timestamp(name, email, timestamp),
            None => Self::now(name, email),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    pub fn seconds(&self) -> i64 {
        self.timestamp.timestamp()
    }

    pub fn offset_minutes(&self) -> i32 {
        self.timestamp.offset().local_minus_utc() / 60
    }

    /// "Name <email@example.com>"
    pub fn display_name(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }

    /// "Name <email> timestamp timezone", as stored in objects and reflogs
    pub fn display(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.timestamp.timestamp(),
            self.timestamp.format("%z")
        )
    }
}

impl TryFrom<&str> for Signature {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        // split from the right: timezone, timestamp, then "name <email>"
        let parts: Vec<&str> = value.rsplitn(3, ' ').collect();
        if parts.len() < 3 {
            return Err(Error::malformed(format!("invalid signature {value:?}")));
        }

        let offset_minutes = parse_offset(parts[0])
            .ok_or_else(|| Error::malformed(format!("invalid timezone {:?}", parts[0])))?;
        let seconds = parts[1]
            .parse::<i64>()
            .map_err(|_| Error::malformed(format!("invalid timestamp {:?}", parts[1])))?;
        let name_email = parts[2];

        let email_start = name_email
            .find('<')
            .ok_or_else(|| Error::malformed("invalid signature: missing '<'"))?;
        let email_end = name_email
            .rfind('>')
            .filter(|&end| end > email_start)
            .ok_or_else(|| Error::malformed("invalid signature: missing '>'"))?;

        let name = name_email[..email_start].trim();
        let email = &name_email[email_start + 1..email_end];

        Self::from_parts(name, email, seconds, offset_minutes)
            .map_err(|error| Error::malformed(error.to_string()))
    }
}

/// Parse `+hhmm` / `-hhmm` into minutes east of UTC
fn parse_offset(value: &str) -> Option<i32> {
    let (sign, digits) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    Some(sign * (hours * 60 + minutes))
}

/// Accepts git's raw `"<unix> <+zzzz>"` form, RFC 2822, and `%Y-%m-%d %H:%M:%S %z`
pub fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();

    if let Some((seconds, offset)) = value.trim_start_matches('@').split_once(' ')
        && let (Ok(seconds), Some(offset_minutes)) = (seconds.parse::<i64>(), parse_offset(offset))
    {
        return FixedOffset::east_opt(offset_minutes * 60)?
            .timestamp_opt(seconds, 0)
            .single();
    }

    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S %z"))
        .ok()
}
