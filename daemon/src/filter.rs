//! Filter, sort and limit pipeline over process records

use crate::error::{Error, Result};
use crate::protocol::{LimitArg, ListProcessesParams};
use crate::record::ProcessRecord;
use crate::sampler::SortKey;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Duration;

pub const STATUS_VALUES: [&str; 4] = ["running", "sleeping", "stopped", "zombie"];

/// Accounts treated as part of the OS and hidden unless asked for.
#[derive(Debug, Clone)]
pub struct SystemUsers {
    names: HashSet<String>,
}

impl SystemUsers {
    pub fn detect() -> Self {
        let names: &[&str] = if cfg!(windows) {
            &["SYSTEM", "NT AUTHORITY\\SYSTEM", "LocalService", "NetworkService"]
        } else {
            &["root"]
        };
        Self::from_names(names.iter().copied())
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { names: names.into_iter().map(Into::into).collect() }
    }

    pub fn with_extra<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(extra.into_iter().map(Into::into));
        self
    }

    pub fn contains(&self, username: &str) -> bool {
        self.names.contains(username)
    }
}

/// Validated arguments of a `list_processes` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ListOptions {
    pub sort_by: SortKey,
    /// `None` means the configured default window.
    pub duration: Option<Duration>,
    pub limit: Option<usize>,
    pub name_filter: Option<String>,
    pub user_filter: Option<String>,
    pub status_filter: Option<String>,
    pub min_cpu: Option<f64>,
    pub min_memory: Option<u64>,
    pub include_system: bool,
    pub sort_asc: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            sort_by: SortKey::Cpu,
            duration: None,
            limit: None,
            name_filter: None,
            user_filter: None,
            status_filter: None,
            min_cpu: None,
            min_memory: None,
            include_system: false,
            sort_asc: false,
        }
    }
}

fn parse_limit(limit: LimitArg) -> Result<usize> {
    let value = match limit {
        LimitArg::Number(n) => n,
        LimitArg::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::invalid_argument("limit must be an integer or null"))?,
    };
    usize::try_from(value).map_err(|_| Error::invalid_argument("limit must not be negative"))
}

impl TryFrom<ListProcessesParams> for ListOptions {
    type Error = Error;

    fn try_from(params: ListProcessesParams) -> Result<Self> {
        let sort_by = params.sort_by.as_deref().unwrap_or("cpu").parse()?;
        let duration = params
            .duration
            .map(|secs| {
                u64::try_from(secs)
                    .map(Duration::from_secs)
                    .map_err(|_| Error::invalid_argument("duration must not be negative"))
            })
            .transpose()?;
        let limit = params.limit.map(parse_limit).transpose()?;
        if let Some(status) = &params.status_filter {
            if !STATUS_VALUES.contains(&status.as_str()) {
                return Err(Error::invalid_argument(format!(
                    "status_filter must be one of {}",
                    STATUS_VALUES.join(", ")
                )));
            }
        }
        Ok(Self {
            sort_by,
            duration,
            limit,
            name_filter: params.name_filter,
            user_filter: params.user_filter,
            status_filter: params.status_filter,
            min_cpu: params.min_cpu,
            // Every record clears a threshold below zero.
            min_memory: params.min_memory.map(|bytes| u64::try_from(bytes).unwrap_or(0)),
            include_system: params.include_system.unwrap_or(false),
            sort_asc: params.sort_asc.unwrap_or(false),
        })
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl ListOptions {
    /// Whether a record survives every configured predicate.
    pub fn matches(&self, record: &ProcessRecord, system_users: &SystemUsers) -> bool {
        if !self.include_system && system_users.contains(&record.username) {
            return false;
        }
        if let Some(name) = &self.name_filter {
            if !contains_ignore_case(&record.name, name) {
                return false;
            }
        }
        if let Some(user) = &self.user_filter {
            if !contains_ignore_case(&record.username, user) {
                return false;
            }
        }
        if let Some(status) = &self.status_filter {
            if record.status != *status {
                return false;
            }
        }
        if let Some(min_cpu) = self.min_cpu {
            if record.cpu_percent < min_cpu {
                return false;
            }
        }
        if let Some(min_memory) = self.min_memory {
            if record.rss < min_memory {
                return false;
            }
        }
        true
    }

    fn compare(&self, a: &ProcessRecord, b: &ProcessRecord) -> Ordering {
        let ord = match self.sort_by {
            SortKey::Cpu => a.cpu_percent.partial_cmp(&b.cpu_percent).unwrap_or(Ordering::Equal),
            SortKey::Memory => a.rss.cmp(&b.rss),
        };
        if self.sort_asc { ord } else { ord.reverse() }
    }

    /// Filters, stable-sorts and truncates.
    pub fn apply(&self, records: Vec<ProcessRecord>, system_users: &SystemUsers) -> Vec<ProcessRecord> {
        let mut kept: Vec<ProcessRecord> = records
            .into_iter()
            .filter(|r| self.matches(r, system_users))
            .collect();
        kept.sort_by(|a, b| self.compare(a, b));
        if let Some(limit) = self.limit {
            kept.truncate(limit);
        }
        kept
    }
}
