use tracing::{debug, info, warn};

use crate::{
    data_aquisition::{core::TransportResult, credentials::ValidatedSession},
    mib::{DeviceSnapshot, MibFactory, MibQuery, MibRecord, REGISTRY},
};

/// Runs every registered MIB module against one validated device and merges the results.
pub struct SnapshotAggregator {
    registry: Vec<MibFactory>,
}

impl Default for SnapshotAggregator {
    fn default() -> Self {
        Self::with_registry(REGISTRY.to_vec())
    }
}

impl SnapshotAggregator {
    pub fn with_registry(registry: Vec<MibFactory>) -> Self {
        Self { registry }
    }

    /// Builds the snapshot of one device.
    ///
    /// Modules that fail their support probe are never extracted. A module whose
    /// extractor hits a transport error is left out, the others still run.
    pub async fn snapshot(&self, session: &ValidatedSession) -> DeviceSnapshot {
        let mut snapshot = DeviceSnapshot::new();
        for factory in &self.registry {
            let module = factory(session.transport());
            let mib = module.name();
            if !module.supported().await {
                debug!(host = session.hostname(), mib, "MIB not supported");
                continue;
            }
            match extract(module.as_ref()).await {
                Ok(record) if record.is_empty() => {
                    debug!(host = session.hostname(), mib, "MIB returned no data");
                }
                Ok(record) => {
                    snapshot.insert(mib.to_string(), record);
                }
                Err(e) => {
                    warn!(host = session.hostname(), mib, error = %e, "partial snapshot: skipping MIB");
                }
            }
        }
        info!(host = session.hostname(), mibs = snapshot.len(), "snapshot complete");
        snapshot
    }
}

/// Calls every extractor of a module and folds them into one record.
async fn extract(module: &dyn MibQuery) -> TransportResult<MibRecord> {
    let mut record = MibRecord::new();
    for part in [module.system().await?, module.layer1().await?, module.layer2().await?]
        .into_iter()
        .flatten()
    {
        record.absorb(part);
    }
    Ok(record)
}
