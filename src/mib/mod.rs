/*!
Per-MIB query modules.

Every module implements `MibQuery`: a single-OID support probe plus the layer
extractors that make sense for that MIB. Extractors are built from attribute
walkers (`walk_column`), each reading one column across all instances, and
merge them into a `MibRecord` keyed by the instance index.

Modules receive the session transport at construction and hold nothing else,
so they are cheap to build per host. `REGISTRY` lists every module the
aggregator runs.
*/

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::data_aquisition::{
    core::{SnmpTransport, TransportResult},
    normalize::{DecodeError, NativeValue},
};

pub mod ciscovtp;
pub mod etherlike;
pub mod ifmib;
pub mod record;
pub mod snmpv2;

pub use record::{DeviceSnapshot, MibRecord};

/// Common contract of all MIB modules.
///
/// Extractors a MIB has no data for keep the default, which returns `None`.
/// The records returned by one module are folded together row by row, so every
/// extractor of a module must use the same index space. Tables indexed
/// differently belong in separate modules.
#[async_trait]
pub trait MibQuery: Send + Sync {
    /// MIB name used as the top-level snapshot key.
    fn name(&self) -> &'static str;

    /// True if the device answers the MIB's well-known OID.
    async fn supported(&self) -> bool;

    async fn system(&self) -> TransportResult<Option<MibRecord>> {
        Ok(None)
    }

    async fn layer1(&self) -> TransportResult<Option<MibRecord>> {
        Ok(None)
    }

    async fn layer2(&self) -> TransportResult<Option<MibRecord>> {
        Ok(None)
    }
}

/// Builds a module around a session transport.
pub type MibFactory = fn(Arc<dyn SnmpTransport>) -> Box<dyn MibQuery>;

/// Every module the aggregator queries, in snapshot order.
pub const REGISTRY: &[MibFactory] = &[
    snmpv2::Snmpv2Mib::boxed,
    ifmib::IfMib::boxed,
    etherlike::EtherLikeMib::boxed,
    ciscovtp::CiscoVtpMib::boxed,
    ciscovtp::CiscoVtpTrunkMib::boxed,
];

/// How an attribute walker interprets each value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decode {
    /// Keep the normalized value as is.
    Native,
    /// The value must be UTF-8 text.
    Text,
    /// The value must be an integer (enumerations, counters).
    Integer,
    /// The value must be an octet string and is kept as raw bytes.
    Raw,
}

impl Decode {
    fn apply(self, value: NativeValue) -> Result<NativeValue, DecodeError> {
        match self {
            Decode::Native => Ok(value),
            Decode::Text => value.into_text().map(NativeValue::Text),
            Decode::Integer => value.into_integer().map(NativeValue::Integer),
            Decode::Raw => value.into_bytes().map(NativeValue::Bytes),
        }
    }
}

/// Walks one column and returns its values keyed by integer instance index,
/// in ascending numeric order.
///
/// Values that fail `decode` are left out; an index that is not numeric is skipped.
pub async fn walk_column(
    transport: &dyn SnmpTransport,
    oid: &str,
    attribute: &str,
    decode: Decode,
) -> TransportResult<BTreeMap<u64, NativeValue>> {
    let results = transport.walk(oid, true).await?;
    let mut column = BTreeMap::new();
    for (key, value) in results {
        let index = match key.parse::<u64>() {
            Ok(index) => index,
            Err(_) => {
                debug!(host = transport.target(), oid, key = %key, "ignoring non-numeric instance index");
                continue;
            }
        };
        match decode.apply(value) {
            Ok(value) => {
                column.insert(index, value);
            }
            Err(e) => {
                warn!(host = transport.target(), attribute, index, error = %e, "dropping undecodable value");
            }
        }
    }
    Ok(column)
}

/// Reads a single instance with GET and applies `decode`.
pub async fn get_scalar(
    transport: &dyn SnmpTransport,
    oid: &str,
    attribute: &str,
    decode: Decode,
) -> TransportResult<Option<NativeValue>> {
    let results = transport.get(oid, true).await?;
    let Some(value) = results.into_values().next() else {
        return Ok(None);
    };
    match decode.apply(value) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(host = transport.target(), attribute, error = %e, "dropping undecodable value");
            Ok(None)
        }
    }
}

/// Walks every `(attribute, oid, decode)` column and merges them into one record.
pub async fn collect_columns(
    transport: &dyn SnmpTransport,
    columns: &[(&str, &str, Decode)],
) -> TransportResult<MibRecord> {
    let mut record = MibRecord::new();
    for (attribute, oid, decode) in columns {
        let column = walk_column(transport, oid, attribute, *decode).await?;
        record.merge_column(attribute, column);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_aquisition::{
        core::SnmpValue,
        mock::{MockDevice, text},
    };

    const DUPLEX: &str = ".1.3.6.1.2.1.10.7.2.1.19";

    #[tokio::test]
    async fn test_walk_column_keys_are_numeric_and_ascending() {
        let device = MockDevice::new("sw1")
            .with(".1.3.6.1.2.1.10.7.2.1.19.24", SnmpValue::Integer(3))
            .with(".1.3.6.1.2.1.10.7.2.1.19.3", SnmpValue::Integer(2));

        let column = walk_column(&device, DUPLEX, "dot3StatsDuplexStatus", Decode::Integer)
            .await
            .unwrap();

        assert_eq!(column.keys().copied().collect::<Vec<_>>(), vec![3, 24]);
        assert_eq!(column[&3], NativeValue::Integer(2));
        assert_eq!(column[&24], NativeValue::Integer(3));
    }

    #[tokio::test]
    async fn test_walk_column_drops_undecodable_values() {
        let device = MockDevice::new("sw1")
            .with(".1.3.6.1.4.1.9.9.46.1.3.1.1.4.1.1", text("default"))
            .with(
                ".1.3.6.1.4.1.9.9.46.1.3.1.1.4.1.10",
                SnmpValue::OctetString(vec![0xff, 0x00, 0xfe]),
            );

        let column = walk_column(&device, ".1.3.6.1.4.1.9.9.46.1.3.1.1.4", "vtpVlanName", Decode::Text)
            .await
            .unwrap();

        assert_eq!(column.len(), 1);
        assert_eq!(column[&1], NativeValue::Text("default".into()));
    }

    #[tokio::test]
    async fn test_missing_column_leaves_attribute_absent() {
        let device = MockDevice::new("sw1")
            .with(".1.3.6.1.2.1.10.7.2.1.19.1", SnmpValue::Integer(3));

        let record = collect_columns(
            &device,
            &[
                ("dot3StatsDuplexStatus", DUPLEX, Decode::Integer),
                ("nothingHere", ".1.3.6.1.2.1.10.7.2.1.99", Decode::Integer),
            ],
        )
        .await
        .unwrap();

        let row = record.get(1).unwrap();
        assert!(row.contains_key("dot3StatsDuplexStatus"));
        assert!(!row.contains_key("nothingHere"));
    }

    #[tokio::test]
    async fn test_collect_columns_propagates_transport_failure() {
        let device = MockDevice::new("sw1")
            .with(".1.3.6.1.2.1.10.7.2.1.19.1", SnmpValue::Integer(3))
            .failing_walk(DUPLEX);

        let result = collect_columns(&device, &[("dot3StatsDuplexStatus", DUPLEX, Decode::Integer)]).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_registry_names_are_unique() {
        let transport: Arc<dyn SnmpTransport> = Arc::new(MockDevice::new("sw1"));
        let mut names: Vec<&str> = REGISTRY.iter().map(|f| f(Arc::clone(&transport)).name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), REGISTRY.len());
    }
}
