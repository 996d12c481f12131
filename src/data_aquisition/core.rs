use std::{collections::BTreeMap, net::Ipv4Addr, time::Duration};

use async_trait::async_trait;
use snmp2::Value;
use thiserror::Error;
use tracing::debug;

use super::normalize::{self, NativeValue};

/// Mapping from an OID (or its trailing index, when normalized) to a decoded value.
pub type OidWalkResult = BTreeMap<String, NativeValue>;

pub type TransportResult<T> = Result<T, TransportError>;

/// Owned replacement for `snmp2::Value`, which borrows from the response PDU.
#[derive(Debug, Clone, PartialEq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectIdentifier(String),
    IpAddress(Ipv4Addr),
    Counter32(u32),
    Unsigned32(u32),
    Timeticks(u32),
    Counter64(u64),
    Opaque(Vec<u8>),
    Boolean(bool),
    Null,

    // Exceptions an agent answers with instead of a value
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,

    // Fallback
    Unknown,
}

impl SnmpValue {
    /// True for the v2c/v3 exception values and NULL, which carry no data.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            SnmpValue::Null
                | SnmpValue::NoSuchObject
                | SnmpValue::NoSuchInstance
                | SnmpValue::EndOfMibView
                | SnmpValue::Unknown
        )
    }
}

impl From<&Value<'_>> for SnmpValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Integer(i) => SnmpValue::Integer(*i),
            Value::OctetString(s) => SnmpValue::OctetString(s.to_vec()),
            Value::ObjectIdentifier(oid) => SnmpValue::ObjectIdentifier(format!(".{oid}")),
            Value::IpAddress(ip) => SnmpValue::IpAddress(Ipv4Addr::from(*ip)),
            Value::Counter32(c) => SnmpValue::Counter32(*c),
            Value::Unsigned32(u) => SnmpValue::Unsigned32(*u),
            Value::Timeticks(t) => SnmpValue::Timeticks(*t),
            Value::Counter64(c) => SnmpValue::Counter64(*c),
            Value::Opaque(o) => SnmpValue::Opaque(o.to_vec()),
            Value::Boolean(b) => SnmpValue::Boolean(*b),
            Value::Null => SnmpValue::Null,
            Value::NoSuchObject => SnmpValue::NoSuchObject,
            Value::NoSuchInstance => SnmpValue::NoSuchInstance,
            Value::EndOfMibView => SnmpValue::EndOfMibView,
            _ => SnmpValue::Unknown,
        }
    }
}

/// One OID/value pair as returned by the agent. OIDs are kept in dotted form with a leading dot.
#[derive(Debug, Clone, PartialEq)]
pub struct Varbind {
    pub oid: String,
    pub value: SnmpValue,
}

impl Varbind {
    pub fn new(oid: impl Into<String>, value: SnmpValue) -> Self {
        Self {
            oid: oid.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("could not resolve {0}")]
    Resolve(String),
    #[error("could not open session to {target}: {reason}")]
    Connect { target: String, reason: String },
    #[error("request for {oid} timed out after {after:?}")]
    Timeout { oid: String, after: Duration },
    #[error("SNMP error: {0}")]
    Protocol(String),
    #[error("agent returned error-status {status} (index {index}) for {oid}")]
    ErrorStatus { oid: String, status: u32, index: u32 },
    #[error("invalid OID: {0}")]
    InvalidOid(String),
    #[error("SNMPv3 profile is missing a security name")]
    NoV3Security,
}

/// Narrow SNMP access to a single device through one credential profile.
///
/// Implementors only supply raw varbind fetches; `get`, `walk` and `oid_exists`
/// layer index extraction and value normalization on top.
#[async_trait]
pub trait SnmpTransport: Send + Sync {
    /// Hostname or address the transport is bound to.
    fn target(&self) -> &str;

    /// Fetches exactly the requested instance.
    async fn get_varbinds(&self, oid: &str) -> TransportResult<Vec<Varbind>>;

    /// Fetches the first instance following `oid` in lexicographic order.
    async fn get_next_varbind(&self, oid: &str) -> TransportResult<Option<Varbind>>;

    /// Fetches every instance below `oid`, in agent order.
    async fn walk_varbinds(&self, oid: &str) -> TransportResult<Vec<Varbind>>;

    async fn get(&self, oid: &str, normalized: bool) -> TransportResult<OidWalkResult> {
        let varbinds = self.get_varbinds(oid).await?;
        Ok(collect_result(varbinds, normalized))
    }

    async fn walk(&self, oid: &str, normalized: bool) -> TransportResult<OidWalkResult> {
        let varbinds = self.walk_varbinds(oid).await?;
        Ok(collect_result(varbinds, normalized))
    }

    /// True if the OID resolves as an instance (GET) or has at least one instance
    /// below it (a single GETNEXT step).
    async fn oid_exists(&self, oid: &str) -> bool {
        match self.get_varbinds(oid).await {
            Ok(varbinds) if varbinds.iter().any(|vb| !vb.value.is_absent()) => return true,
            Ok(_) => {}
            Err(e @ TransportError::Timeout { .. }) => {
                debug!(host = self.target(), oid, error = %e, "GET probe failed");
                return false;
            }
            Err(e) => debug!(host = self.target(), oid, error = %e, "GET probe failed, trying GETNEXT"),
        }
        match self.get_next_varbind(oid).await {
            Ok(Some(vb)) => !vb.value.is_absent() && is_in_subtree(&vb.oid, oid),
            Ok(None) => false,
            Err(e) => {
                debug!(host = self.target(), oid, error = %e, "GETNEXT probe failed");
                false
            }
        }
    }
}

fn collect_result(varbinds: Vec<Varbind>, normalized: bool) -> OidWalkResult {
    let mut result = OidWalkResult::new();
    for Varbind { oid, value } in varbinds {
        let value = match normalize::normalize(value, normalized) {
            Some(value) => value,
            None => continue,
        };
        let key = if normalized {
            trailing_index(&oid).map(str::to_string).unwrap_or(oid)
        } else {
            oid
        };
        result.insert(key, value);
    }
    result
}

/// Returns the last sub-identifier of a dotted OID.
pub fn trailing_index(oid: &str) -> Option<&str> {
    oid.rsplit('.').next().filter(|s| !s.is_empty())
}

/// Splits a dotted OID into numeric components. A leading dot is accepted.
pub fn oid_components(oid: &str) -> Option<Vec<u64>> {
    oid.trim_start_matches('.')
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// Canonical form used for keys: leading dot, no trailing dot.
pub fn canonical_oid(oid: &str) -> TransportResult<String> {
    let components = oid_components(oid.trim_end_matches('.'))
        .filter(|c| !c.is_empty())
        .ok_or_else(|| TransportError::InvalidOid(oid.to_string()))?;
    let dotted: Vec<String> = components.iter().map(u64::to_string).collect();
    Ok(format!(".{}", dotted.join(".")))
}

/// True if `next` sorts after `prev` in OID order.
pub fn oid_increases(prev: &str, next: &str) -> bool {
    match (oid_components(prev), oid_components(next)) {
        (Some(prev), Some(next)) => next > prev,
        _ => false,
    }
}

/// True if `oid` lies strictly below `root`.
pub fn is_in_subtree(oid: &str, root: &str) -> bool {
    match (oid_components(oid), oid_components(root)) {
        (Some(oid), Some(root)) => oid.len() > root.len() && oid.starts_with(&root),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_index() {
        assert_eq!(trailing_index(".1.3.6.1.2.1.10.7.2.1.19.24"), Some("24"));
        assert_eq!(trailing_index("7"), Some("7"));
        assert_eq!(trailing_index(".1.3."), None);
    }

    #[test]
    fn test_subtree_is_component_wise() {
        let root = ".1.3.6.1.2.1.2.2.1.1";
        assert!(is_in_subtree(".1.3.6.1.2.1.2.2.1.1.5", root));
        assert!(!is_in_subtree(".1.3.6.1.2.1.2.2.1.10.5", root));
        assert!(!is_in_subtree(root, root));
    }

    #[test]
    fn test_oid_order_is_numeric() {
        assert!(oid_increases(".1.3.6.1.2.1.2.2.1.1.9", ".1.3.6.1.2.1.2.2.1.1.10"));
        assert!(!oid_increases(".1.3.6.1.2.1.2.2.1.1.10", ".1.3.6.1.2.1.2.2.1.1.10"));
        assert!(oid_increases(".1.3.6.1.2.1.2.2.1.1.10", ".1.3.6.1.2.1.2.2.1.2.1"));
    }

    #[test]
    fn test_canonical_oid() {
        assert_eq!(canonical_oid("1.3.6.1.2.1.1").unwrap(), ".1.3.6.1.2.1.1");
        assert_eq!(canonical_oid(".1.3.6.1.2.1.1.").unwrap(), ".1.3.6.1.2.1.1");
        assert!(canonical_oid(".1.3.x").is_err());
        assert!(canonical_oid("").is_err());
    }

    #[test]
    fn test_absent_values() {
        assert!(SnmpValue::NoSuchInstance.is_absent());
        assert!(SnmpValue::EndOfMibView.is_absent());
        assert!(!SnmpValue::Integer(0).is_absent());
    }
}
