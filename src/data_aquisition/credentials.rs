/*!
Credential profiles and the validator that finds which one a device answers to.

This module defines:
- `CredentialProfile`: one SNMP authentication configuration (v1/v2c community or v3 USM).
- `Host`: a device plus its ordered candidate profiles.
- `TransportFactory`: how a transport is opened for a (host, profile) pair.
- `CredentialValidator`: tries candidates in order and keeps the first that answers.
*/

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::core::{SnmpTransport, TransportResult};

/// sysDescr.0, present on every SNMP agent.
pub const PROBE_OID: &str = ".1.3.6.1.2.1.1.1.0";

pub const DEFAULT_SNMP_PORT: u16 = 161;

const REDACTED: &str = "********";

/// One set of SNMP authentication parameters.
///
/// Profiles are opaque to the rest of the poller: they are never compared, only tried.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialProfile {
    pub group_name: String,
    #[serde(default = "default_port")]
    pub snmp_port: u16,
    #[serde(flatten)]
    pub auth: SnmpAuth,
}

fn default_port() -> u16 {
    DEFAULT_SNMP_PORT
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "snmp_version")]
pub enum SnmpAuth {
    #[serde(rename = "1")]
    V1 { snmp_community: String },
    #[serde(rename = "2c", alias = "2")]
    V2c { snmp_community: String },
    #[serde(rename = "3")]
    V3(UsmParams),
}

/// SNMPv3 user-based security parameters.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct UsmParams {
    pub snmp_secname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snmp_authprotocol: Option<AuthProtocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snmp_authpassword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snmp_privprotocol: Option<PrivProtocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snmp_privpassword: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProtocol {
    Md5,
    #[serde(alias = "sha1")]
    Sha,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivProtocol {
    Des,
    #[serde(alias = "aes128")]
    Aes,
    Aes192,
    Aes256,
}

impl CredentialProfile {
    pub fn v2c(group_name: &str, community: &str) -> Self {
        Self {
            group_name: group_name.to_string(),
            snmp_port: DEFAULT_SNMP_PORT,
            auth: SnmpAuth::V2c {
                snmp_community: community.to_string(),
            },
        }
    }

    pub fn version(&self) -> &'static str {
        match self.auth {
            SnmpAuth::V1 { .. } => "1",
            SnmpAuth::V2c { .. } => "2c",
            SnmpAuth::V3(_) => "3",
        }
    }

    /// A copy with every secret replaced, safe to print.
    pub fn redacted(&self) -> Self {
        let auth = match &self.auth {
            SnmpAuth::V1 { .. } => SnmpAuth::V1 {
                snmp_community: REDACTED.to_string(),
            },
            SnmpAuth::V2c { .. } => SnmpAuth::V2c {
                snmp_community: REDACTED.to_string(),
            },
            SnmpAuth::V3(usm) => SnmpAuth::V3(UsmParams {
                snmp_authpassword: usm.snmp_authpassword.as_ref().map(|_| REDACTED.to_string()),
                snmp_privpassword: usm.snmp_privpassword.as_ref().map(|_| REDACTED.to_string()),
                ..usm.clone()
            }),
        };
        Self {
            group_name: self.group_name.clone(),
            snmp_port: self.snmp_port,
            auth,
        }
    }
}

impl fmt::Debug for CredentialProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProfile")
            .field("group_name", &self.group_name)
            .field("snmp_version", &self.version())
            .field("snmp_port", &self.snmp_port)
            .finish_non_exhaustive()
    }
}

/// A device to poll and the profiles to try against it, in order.
#[derive(Debug, Clone)]
pub struct Host {
    pub hostname: String,
    pub candidates: Vec<CredentialProfile>,
}

impl Host {
    pub fn new(hostname: impl Into<String>, candidates: Vec<CredentialProfile>) -> Self {
        Self {
            hostname: hostname.into(),
            candidates,
        }
    }
}

/// Opens a transport for one (host, profile) pair.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(
        &self,
        hostname: &str,
        profile: &CredentialProfile,
    ) -> TransportResult<Arc<dyn SnmpTransport>>;
}

/// A host together with the first profile that answered and the live transport.
///
/// Dropping the session closes the transport.
pub struct ValidatedSession {
    host: Host,
    profile: CredentialProfile,
    transport: Arc<dyn SnmpTransport>,
}

impl ValidatedSession {
    pub fn hostname(&self) -> &str {
        &self.host.hostname
    }

    pub fn profile(&self) -> &CredentialProfile {
        &self.profile
    }

    pub fn transport(&self) -> Arc<dyn SnmpTransport> {
        Arc::clone(&self.transport)
    }
}

pub struct CredentialValidator {
    factory: Arc<dyn TransportFactory>,
}

impl CredentialValidator {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self { factory }
    }

    /// Returns a session for the first candidate profile the device answers to.
    ///
    /// Unreachable devices and devices rejecting every profile both yield `None`.
    pub async fn credentials(&self, host: &Host) -> Option<ValidatedSession> {
        for profile in &host.candidates {
            let transport = match self.factory.connect(&host.hostname, profile).await {
                Ok(transport) => transport,
                Err(e) => {
                    debug!(host = %host.hostname, group = %profile.group_name, error = %e, "could not open transport");
                    continue;
                }
            };
            if transport.oid_exists(PROBE_OID).await {
                info!(host = %host.hostname, group = %profile.group_name, version = profile.version(), "valid credentials found");
                return Some(ValidatedSession {
                    host: host.clone(),
                    profile: profile.clone(),
                    transport,
                });
            }
            debug!(host = %host.hostname, group = %profile.group_name, "no response to probe");
        }
        None
    }
}
