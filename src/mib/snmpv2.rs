//! SNMPv2-MIB system group: device identity.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Decode, MibQuery, MibRecord, get_scalar};
use crate::data_aquisition::core::{SnmpTransport, TransportResult};

const SUPPORT_OID: &str = ".1.3.6.1.2.1.1.1.0";

/// The system group has a single instance per device.
pub const SYSTEM_KEY: u64 = 0;

/// `.1.3.6.1.2.1.1.{n}.0` scalars, in OID order.
const SYSTEM_SCALARS: [(&str, &str, Decode); 6] = [
    ("sysDescr", ".1.3.6.1.2.1.1.1.0", Decode::Text),
    ("sysObjectID", ".1.3.6.1.2.1.1.2.0", Decode::Text),
    ("sysUpTime", ".1.3.6.1.2.1.1.3.0", Decode::Integer),
    ("sysContact", ".1.3.6.1.2.1.1.4.0", Decode::Text),
    ("sysName", ".1.3.6.1.2.1.1.5.0", Decode::Text),
    ("sysLocation", ".1.3.6.1.2.1.1.6.0", Decode::Text),
];

pub struct Snmpv2Mib {
    transport: Arc<dyn SnmpTransport>,
}

impl Snmpv2Mib {
    pub fn new(transport: Arc<dyn SnmpTransport>) -> Self {
        Self { transport }
    }

    pub fn boxed(transport: Arc<dyn SnmpTransport>) -> Box<dyn MibQuery> {
        Box::new(Self::new(transport))
    }
}

#[async_trait]
impl MibQuery for Snmpv2Mib {
    fn name(&self) -> &'static str {
        "SNMPv2-MIB"
    }

    async fn supported(&self) -> bool {
        self.transport.oid_exists(SUPPORT_OID).await
    }

    async fn system(&self) -> TransportResult<Option<MibRecord>> {
        let mut record = MibRecord::new();
        for (attribute, oid, decode) in SYSTEM_SCALARS {
            if let Some(value) = get_scalar(self.transport.as_ref(), oid, attribute, decode).await? {
                record.merge(SYSTEM_KEY, attribute, value);
            }
        }
        Ok(Some(record))
    }
}
