//! CISCO-VTP-MIB.
//!
//! The VLAN table and the trunk port table are indexed differently (VLAN id vs.
//! ifIndex), so each is its own module with its own snapshot key.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Decode, MibQuery, MibRecord, collect_columns};
use crate::data_aquisition::core::{SnmpTransport, TransportResult};

/// vtpVlanState, also used as the VLAN table support check.
const VTP_VLAN_STATE: &str = ".1.3.6.1.4.1.9.9.46.1.3.1.1.2";
const VTP_VLAN_TYPE: &str = ".1.3.6.1.4.1.9.9.46.1.3.1.1.3";
const VTP_VLAN_NAME: &str = ".1.3.6.1.4.1.9.9.46.1.3.1.1.4";

const TRUNK_NATIVE_VLAN: &str = ".1.3.6.1.4.1.9.9.46.1.6.1.1.5";
/// vlanTrunkPortDynamicState, also used as the trunk table support check.
const TRUNK_DYNAMIC_STATE: &str = ".1.3.6.1.4.1.9.9.46.1.6.1.1.13";
const TRUNK_DYNAMIC_STATUS: &str = ".1.3.6.1.4.1.9.9.46.1.6.1.1.14";

// vlanTrunkPortTable is indexed by ifIndex
const TRUNK_COLUMNS: &[(&str, &str, Decode)] = &[
    ("vlanTrunkPortDynamicState", TRUNK_DYNAMIC_STATE, Decode::Integer),
    ("vlanTrunkPortDynamicStatus", TRUNK_DYNAMIC_STATUS, Decode::Integer),
    ("vlanTrunkPortNativeVlan", TRUNK_NATIVE_VLAN, Decode::Integer),
];

// vtpVlanTable is indexed by (managementDomainIndex, vtpVlanIndex); the trailing
// component is the VLAN id
const VLAN_COLUMNS: &[(&str, &str, Decode)] = &[
    ("vtpVlanName", VTP_VLAN_NAME, Decode::Text),
    ("vtpVlanType", VTP_VLAN_TYPE, Decode::Integer),
    ("vtpVlanState", VTP_VLAN_STATE, Decode::Integer),
];

/// VLAN table (layer 2), keyed by VLAN id.
pub struct CiscoVtpMib {
    transport: Arc<dyn SnmpTransport>,
}

impl CiscoVtpMib {
    pub fn new(transport: Arc<dyn SnmpTransport>) -> Self {
        Self { transport }
    }

    pub fn boxed(transport: Arc<dyn SnmpTransport>) -> Box<dyn MibQuery> {
        Box::new(Self::new(transport))
    }
}

#[async_trait]
impl MibQuery for CiscoVtpMib {
    fn name(&self) -> &'static str {
        "CISCO-VTP-MIB"
    }

    async fn supported(&self) -> bool {
        self.transport.oid_exists(VTP_VLAN_STATE).await
    }

    async fn layer2(&self) -> TransportResult<Option<MibRecord>> {
        let record = collect_columns(self.transport.as_ref(), VLAN_COLUMNS).await?;
        Ok(Some(record))
    }
}

/// Trunk port state (layer 1), keyed by ifIndex.
pub struct CiscoVtpTrunkMib {
    transport: Arc<dyn SnmpTransport>,
}

impl CiscoVtpTrunkMib {
    pub fn new(transport: Arc<dyn SnmpTransport>) -> Self {
        Self { transport }
    }

    pub fn boxed(transport: Arc<dyn SnmpTransport>) -> Box<dyn MibQuery> {
        Box::new(Self::new(transport))
    }
}

#[async_trait]
impl MibQuery for CiscoVtpTrunkMib {
    fn name(&self) -> &'static str {
        "CISCO-VTP-MIB::vlanTrunkPortTable"
    }

    async fn supported(&self) -> bool {
        self.transport.oid_exists(TRUNK_DYNAMIC_STATE).await
    }

    async fn layer1(&self) -> TransportResult<Option<MibRecord>> {
        let record = collect_columns(self.transport.as_ref(), TRUNK_COLUMNS).await?;
        Ok(Some(record))
    }
}
