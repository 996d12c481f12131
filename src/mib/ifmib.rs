//! IF-MIB: the interface table (`ifTable`) and its extension (`ifXTable`),
//! both keyed by ifIndex.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Decode, MibQuery, MibRecord, collect_columns};
use crate::data_aquisition::core::{SnmpTransport, TransportResult};

/// ifIndex column, answered by every agent that implements the interfaces group.
const IF_INDEX: &str = ".1.3.6.1.2.1.2.2.1.1";

const LAYER1_COLUMNS: &[(&str, &str, Decode)] = &[
    ("ifDescr", ".1.3.6.1.2.1.2.2.1.2", Decode::Text),
    ("ifType", ".1.3.6.1.2.1.2.2.1.3", Decode::Integer),
    ("ifMtu", ".1.3.6.1.2.1.2.2.1.4", Decode::Integer),
    // Gauge32, saturates at 4294967295 on fast links; see ifHighSpeed
    ("ifSpeed", ".1.3.6.1.2.1.2.2.1.5", Decode::Native),
    ("ifPhysAddress", ".1.3.6.1.2.1.2.2.1.6", Decode::Raw),
    ("ifAdminStatus", ".1.3.6.1.2.1.2.2.1.7", Decode::Integer),
    ("ifOperStatus", ".1.3.6.1.2.1.2.2.1.8", Decode::Integer),
    ("ifName", ".1.3.6.1.2.1.31.1.1.1.1", Decode::Text),
    ("ifHighSpeed", ".1.3.6.1.2.1.31.1.1.1.15", Decode::Native),
    ("ifAlias", ".1.3.6.1.2.1.31.1.1.1.18", Decode::Text),
];

pub struct IfMib {
    transport: Arc<dyn SnmpTransport>,
}

impl IfMib {
    pub fn new(transport: Arc<dyn SnmpTransport>) -> Self {
        Self { transport }
    }

    pub fn boxed(transport: Arc<dyn SnmpTransport>) -> Box<dyn MibQuery> {
        Box::new(Self::new(transport))
    }
}

#[async_trait]
impl MibQuery for IfMib {
    fn name(&self) -> &'static str {
        "IF-MIB"
    }

    async fn supported(&self) -> bool {
        self.transport.oid_exists(IF_INDEX).await
    }

    async fn layer1(&self) -> TransportResult<Option<MibRecord>> {
        let record = collect_columns(self.transport.as_ref(), LAYER1_COLUMNS).await?;
        Ok(Some(record))
    }
}
