//! In-memory SNMP agents for tests.
//!
//! A `MockDevice` holds a fixed MIB view; `MockFactory` hands out transports for
//! (host, credential group) pairs that are known to work and records every attempt.

use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use super::{
    core::{
        SnmpTransport, SnmpValue, TransportError, TransportResult, Varbind, canonical_oid,
        is_in_subtree, oid_components,
    },
    credentials::{CredentialProfile, TransportFactory},
};

/// Simulated agent state.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    hostname: String,
    objects: BTreeMap<Vec<u64>, SnmpValue>,
    /// Subtrees whose walk fails mid-way with a transport error.
    failing: Vec<String>,
    unreachable: bool,
}

impl MockDevice {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            ..Default::default()
        }
    }

    /// A device that never answers.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    /// A device answering the SNMPv2-MIB system group.
    pub fn system(hostname: &str) -> Self {
        Self::new(hostname)
            .with(".1.3.6.1.2.1.1.1.0", text("Cisco IOS Software, C2960 Software"))
            .with(
                ".1.3.6.1.2.1.1.2.0",
                SnmpValue::ObjectIdentifier(".1.3.6.1.4.1.9.1.1208".into()),
            )
            .with(".1.3.6.1.2.1.1.3.0", SnmpValue::Timeticks(123_456))
            .with(".1.3.6.1.2.1.1.4.0", text("noc@example.net"))
            .with(".1.3.6.1.2.1.1.5.0", text(hostname))
            .with(".1.3.6.1.2.1.1.6.0", text("rack 4"))
    }

    pub fn with(mut self, oid: &str, value: SnmpValue) -> Self {
        let key = oid_components(oid).expect("mock OIDs are numeric");
        self.objects.insert(key, value);
        self
    }

    pub fn failing_walk(mut self, root: &str) -> Self {
        self.failing.push(root.to_string());
        self
    }
}

pub fn text(s: &str) -> SnmpValue {
    SnmpValue::OctetString(s.as_bytes().to_vec())
}

fn dotted(components: &[u64]) -> String {
    let parts: Vec<String> = components.iter().map(u64::to_string).collect();
    format!(".{}", parts.join("."))
}

#[async_trait]
impl SnmpTransport for MockDevice {
    fn target(&self) -> &str {
        &self.hostname
    }

    async fn get_varbinds(&self, oid: &str) -> TransportResult<Vec<Varbind>> {
        if self.unreachable {
            return Err(TransportError::Timeout {
                oid: oid.to_string(),
                after: std::time::Duration::from_secs(1),
            });
        }
        let oid = canonical_oid(oid)?;
        let key = oid_components(&oid).ok_or_else(|| TransportError::InvalidOid(oid.clone()))?;
        let value = self.objects.get(&key).cloned().unwrap_or(SnmpValue::NoSuchInstance);
        Ok(vec![Varbind::new(oid, value)])
    }

    async fn get_next_varbind(&self, oid: &str) -> TransportResult<Option<Varbind>> {
        if self.unreachable {
            return Err(TransportError::Timeout {
                oid: oid.to_string(),
                after: std::time::Duration::from_secs(1),
            });
        }
        let start = oid_components(&canonical_oid(oid)?).unwrap_or_default();
        Ok(self
            .objects
            .range((Bound::Excluded(start), Bound::Unbounded))
            .next()
            .map(|(key, value)| Varbind::new(dotted(key), value.clone())))
    }

    async fn walk_varbinds(&self, oid: &str) -> TransportResult<Vec<Varbind>> {
        if self.unreachable {
            return Err(TransportError::Timeout {
                oid: oid.to_string(),
                after: std::time::Duration::from_secs(1),
            });
        }
        let root = canonical_oid(oid)?;
        if self.failing.iter().any(|f| f == &root) {
            return Err(TransportError::Protocol("response truncated".to_string()));
        }
        Ok(self
            .objects
            .iter()
            .map(|(key, value)| Varbind::new(dotted(key), value.clone()))
            .filter(|vb| is_in_subtree(&vb.oid, &root))
            .collect())
    }
}

/// Hands out mock transports keyed by (hostname, credential group).
#[derive(Default)]
pub struct MockFactory {
    devices: HashMap<(String, String), MockDevice>,
    attempts: Mutex<HashMap<String, Vec<String>>>,
}

impl MockFactory {
    pub fn with_device(mut self, hostname: &str, group: &str, device: MockDevice) -> Self {
        self.devices
            .insert((hostname.to_string(), group.to_string()), device);
        self
    }

    /// Credential groups tried against a host, in order.
    pub fn attempts(&self, hostname: &str) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .get(hostname)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn connect(
        &self,
        hostname: &str,
        profile: &CredentialProfile,
    ) -> TransportResult<Arc<dyn SnmpTransport>> {
        self.attempts
            .lock()
            .unwrap()
            .entry(hostname.to_string())
            .or_default()
            .push(profile.group_name.clone());

        let key = (hostname.to_string(), profile.group_name.clone());
        // A wrong community looks like silence to the poller
        let device = self
            .devices
            .get(&key)
            .cloned()
            .unwrap_or_else(MockDevice::unreachable);
        Ok(Arc::new(device))
    }
}
