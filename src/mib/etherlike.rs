//! ETHERLIKE-MIB: per-port duplex state.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Decode, MibQuery, MibRecord, collect_columns};
use crate::data_aquisition::core::{SnmpTransport, TransportResult};

/// dot3StatsDuplexStatus
const DUPLEX_STATUS: &str = ".1.3.6.1.2.1.10.7.2.1.19";

const LAYER1_COLUMNS: &[(&str, &str, Decode)] =
    &[("dot3StatsDuplexStatus", DUPLEX_STATUS, Decode::Integer)];

pub struct EtherLikeMib {
    transport: Arc<dyn SnmpTransport>,
}

impl EtherLikeMib {
    pub fn new(transport: Arc<dyn SnmpTransport>) -> Self {
        Self { transport }
    }

    pub fn boxed(transport: Arc<dyn SnmpTransport>) -> Box<dyn MibQuery> {
        Box::new(Self::new(transport))
    }
}

#[async_trait]
impl MibQuery for EtherLikeMib {
    fn name(&self) -> &'static str {
        "ETHERLIKE-MIB"
    }

    async fn supported(&self) -> bool {
        self.transport.oid_exists(DUPLEX_STATUS).await
    }

    /// Keyed by ifIndex.
    async fn layer1(&self) -> TransportResult<Option<MibRecord>> {
        let record = collect_columns(self.transport.as_ref(), LAYER1_COLUMNS).await?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_aquisition::{core::SnmpValue, mock::MockDevice, normalize::NativeValue};

    #[tokio::test]
    async fn test_duplex_by_ifindex() {
        let device = MockDevice::new("sw1")
            .with(".1.3.6.1.2.1.10.7.2.1.19.24", SnmpValue::Integer(3))
            .with(".1.3.6.1.2.1.10.7.2.1.19.3", SnmpValue::Integer(2))
            .with(".1.3.6.1.2.1.10.7.2.1.20.3", SnmpValue::Integer(99));
        let mib = EtherLikeMib::new(Arc::new(device));

        assert!(mib.supported().await);
        let record = mib.layer1().await.unwrap().unwrap();

        assert_eq!(record.indexes().collect::<Vec<_>>(), vec![3, 24]);
        let row = record.get(3).unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row["dot3StatsDuplexStatus"], NativeValue::Integer(2));
    }

    #[tokio::test]
    async fn test_not_supported_without_table() {
        let mib = EtherLikeMib::new(Arc::new(MockDevice::system("sw1")));
        assert!(!mib.supported().await);
    }
}
