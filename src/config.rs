/*!
Poller configuration, read from a JSON file.

Hosts may be plain strings, which try every credential group in file order, or
objects naming the groups to try (and their order) in `snmp_groups`.
*/

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data_aquisition::{
    credentials::{CredentialProfile, Host},
    snmp::SnmpOptions,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid timeout {value:?}: {source}")]
    Timeout {
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("credential group {0:?} is defined more than once")]
    DuplicateGroup(String),
    #[error("host list contains an empty hostname")]
    EmptyHostname,
    #[error("host {0:?} is listed more than once")]
    DuplicateHost(String),
    #[error("host {host:?} refers to unknown credential group {group:?}")]
    UnknownGroup { host: String, group: String },
    #[error("host {0:?} has no credential groups to try")]
    NoGroups(String),
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    snmp_directory: PathBuf,
    #[serde(default = "default_workers")]
    workers: usize,
    #[serde(default = "default_timeout")]
    timeout: String,
    #[serde(default = "default_max_walk_responses")]
    max_walk_responses: usize,
    #[serde(default = "default_max_repetitions")]
    max_repetitions: u32,
    #[serde(default)]
    snmp_auth: Vec<CredentialProfile>,
    #[serde(default)]
    hosts: Vec<HostEntry>,
}

fn default_workers() -> usize {
    1
}

fn default_timeout() -> String {
    "3s".to_string()
}

fn default_max_walk_responses() -> usize {
    SnmpOptions::default().max_walk_responses
}

fn default_max_repetitions() -> u32 {
    SnmpOptions::default().max_repetitions
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostEntry {
    Name(String),
    Detailed {
        hostname: String,
        #[serde(default)]
        snmp_groups: Option<Vec<String>>,
    },
}

impl HostEntry {
    fn hostname(&self) -> &str {
        match self {
            HostEntry::Name(hostname) | HostEntry::Detailed { hostname, .. } => hostname,
        }
    }
}

/// A host and the credential groups it is tried with, as printed by `config --hosts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostSummary {
    pub hostname: String,
    pub snmp_groups: Vec<String>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub snmp_directory: PathBuf,
    pub workers: usize,
    pub snmp: SnmpOptions,
    pub snmp_auth: Vec<CredentialProfile>,
    pub hosts: Vec<Host>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text)?;

        if raw.workers == 0 {
            return Err(ConfigError::Zero("workers"));
        }
        if raw.max_walk_responses == 0 {
            return Err(ConfigError::Zero("max_walk_responses"));
        }
        if raw.max_repetitions == 0 {
            return Err(ConfigError::Zero("max_repetitions"));
        }
        let timeout = humantime::parse_duration(&raw.timeout).map_err(|source| ConfigError::Timeout {
            value: raw.timeout.clone(),
            source,
        })?;
        if timeout == Duration::ZERO {
            return Err(ConfigError::Zero("timeout"));
        }

        let mut groups = HashSet::new();
        for profile in &raw.snmp_auth {
            if !groups.insert(profile.group_name.as_str()) {
                return Err(ConfigError::DuplicateGroup(profile.group_name.clone()));
            }
        }

        let mut seen = HashSet::new();
        let mut hosts = Vec::with_capacity(raw.hosts.len());
        for entry in &raw.hosts {
            if entry.hostname().is_empty() {
                return Err(ConfigError::EmptyHostname);
            }
            if !seen.insert(entry.hostname()) {
                return Err(ConfigError::DuplicateHost(entry.hostname().to_string()));
            }
            hosts.push(resolve_host(entry, &raw.snmp_auth)?);
        }

        Ok(Self {
            snmp_directory: raw.snmp_directory,
            workers: raw.workers,
            snmp: SnmpOptions {
                timeout,
                max_walk_responses: raw.max_walk_responses,
                max_repetitions: raw.max_repetitions,
            },
            snmp_auth: raw.snmp_auth,
            hosts,
        })
    }

    /// A host outside the configured list, tried with every credential group.
    pub fn ad_hoc_host(&self, hostname: &str) -> Host {
        Host::new(hostname, self.snmp_auth.clone())
    }

    pub fn host_summaries(&self) -> Vec<HostSummary> {
        self.hosts
            .iter()
            .map(|host| HostSummary {
                hostname: host.hostname.clone(),
                snmp_groups: host.candidates.iter().map(|p| p.group_name.clone()).collect(),
            })
            .collect()
    }

    /// Credential groups with secrets masked.
    pub fn redacted_auth(&self) -> Vec<CredentialProfile> {
        self.snmp_auth.iter().map(CredentialProfile::redacted).collect()
    }
}

fn resolve_host(entry: &HostEntry, profiles: &[CredentialProfile]) -> Result<Host, ConfigError> {
    let (hostname, candidates) = match entry {
        HostEntry::Name(hostname) | HostEntry::Detailed { hostname, snmp_groups: None } => {
            (hostname, profiles.to_vec())
        }
        HostEntry::Detailed {
            hostname,
            snmp_groups: Some(names),
        } => {
            let candidates = names
                .iter()
                .map(|name| {
                    profiles
                        .iter()
                        .find(|p| &p.group_name == name)
                        .cloned()
                        .ok_or_else(|| ConfigError::UnknownGroup {
                            host: hostname.clone(),
                            group: name.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            (hostname, candidates)
        }
    };
    if candidates.is_empty() {
        return Err(ConfigError::NoGroups(hostname.clone()));
    }
    Ok(Host::new(hostname.clone(), candidates))
}
