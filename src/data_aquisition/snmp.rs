use std::{net::SocketAddr, str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use snmp2::{
    AsyncSession, MessageType, Oid, Version,
    v3::{self, Security},
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{
    core::{
        SnmpTransport, SnmpValue, TransportError, TransportResult, Varbind, canonical_oid,
        is_in_subtree, oid_increases,
    },
    credentials::{AuthProtocol, CredentialProfile, PrivProtocol, SnmpAuth, TransportFactory, UsmParams},
};

/// error-status noSuchName, which SNMPv1 agents use to signal the end of a walk.
const V1_NO_SUCH_NAME: u32 = 2;

/// Per-call limits applied to every request a client sends.
#[derive(Debug, Clone)]
pub struct SnmpOptions {
    pub timeout: Duration,
    /// Upper bound on instances collected by a single walk.
    pub max_walk_responses: usize,
    pub max_repetitions: u32,
}

impl Default for SnmpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            max_walk_responses: 10_000,
            max_repetitions: 25,
        }
    }
}

/// SNMP client bound to one device and one credential profile.
pub struct SnmpClient {
    target: String,
    address: SocketAddr,
    snmp_version: Version,
    session: Arc<Mutex<AsyncSession>>,
    options: SnmpOptions,
}

impl SnmpClient {
    /// Resolves the device and opens a session with the profile's parameters.
    /// For SNMPv3 this includes engine discovery, so it may touch the network.
    pub async fn connect(
        hostname: &str,
        profile: &CredentialProfile,
        options: SnmpOptions,
    ) -> TransportResult<Self> {
        let address = resolve(hostname, profile.snmp_port, options.timeout).await?;
        let connect_err = |reason: String| TransportError::Connect {
            target: hostname.to_string(),
            reason,
        };

        let (session, snmp_version) = match &profile.auth {
            SnmpAuth::V1 { snmp_community } => {
                let session = AsyncSession::new_v1(address, snmp_community.as_bytes(), 0)
                    .await
                    .map_err(|e| connect_err(e.to_string()))?;
                (session, Version::V1)
            }
            SnmpAuth::V2c { snmp_community } => {
                let session = AsyncSession::new_v2c(address, snmp_community.as_bytes(), 0)
                    .await
                    .map_err(|e| connect_err(e.to_string()))?;
                (session, Version::V2C)
            }
            SnmpAuth::V3(usm) => {
                let mut session = AsyncSession::new_v3(address, 0, security(usm)?)
                    .await
                    .map_err(|e| connect_err(e.to_string()))?;
                tokio::time::timeout(options.timeout, session.init())
                    .await
                    .map_err(|_| TransportError::Timeout {
                        oid: "engine discovery".to_string(),
                        after: options.timeout,
                    })?
                    .map_err(|e| connect_err(format!("{e:?}")))?;
                (session, Version::V3)
            }
        };

        debug!(host = hostname, %address, group = %profile.group_name, "session opened");
        Ok(Self {
            target: hostname.to_string(),
            address,
            snmp_version,
            session: Arc::new(Mutex::new(session)),
            options,
        })
    }

    /// Start building a new query.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder {
            session: Arc::clone(&self.session),
            oids: Vec::new(),
            operation: None,
            timeout: Some(self.options.timeout),
            max_repetitions: None,
            non_repeaters: None,
        }
    }
}

async fn resolve(hostname: &str, port: u16, timeout: Duration) -> TransportResult<SocketAddr> {
    let lookup = tokio::net::lookup_host((hostname, port));
    let mut addresses = tokio::time::timeout(timeout, lookup)
        .await
        .map_err(|_| TransportError::Resolve(format!("{hostname} (timed out)")))?
        .map_err(|e| TransportError::Resolve(format!("{hostname}: {e}")))?;
    addresses
        .next()
        .ok_or_else(|| TransportError::Resolve(hostname.to_string()))
}

fn security(usm: &UsmParams) -> TransportResult<Security> {
    if usm.snmp_secname.is_empty() {
        return Err(TransportError::NoV3Security);
    }
    let auth_password = usm.snmp_authpassword.as_deref().unwrap_or_default();
    let level = match (&usm.snmp_authpassword, &usm.snmp_privpassword) {
        (None, _) => v3::Auth::NoAuthNoPriv,
        (Some(_), None) => v3::Auth::AuthNoPriv,
        (Some(_), Some(privacy_password)) => v3::Auth::AuthPriv {
            cipher: cipher(usm.snmp_privprotocol.unwrap_or(PrivProtocol::Aes)),
            privacy_password: privacy_password.as_bytes().to_vec(),
        },
    };
    let security = Security::new(usm.snmp_secname.as_bytes(), auth_password.as_bytes())
        .with_auth_protocol(auth_protocol(usm.snmp_authprotocol.unwrap_or(AuthProtocol::Sha)))
        .with_auth(level);
    Ok(security)
}

fn auth_protocol(protocol: AuthProtocol) -> v3::AuthProtocol {
    match protocol {
        AuthProtocol::Md5 => v3::AuthProtocol::Md5,
        AuthProtocol::Sha => v3::AuthProtocol::Sha1,
        AuthProtocol::Sha224 => v3::AuthProtocol::Sha224,
        AuthProtocol::Sha256 => v3::AuthProtocol::Sha256,
        AuthProtocol::Sha384 => v3::AuthProtocol::Sha384,
        AuthProtocol::Sha512 => v3::AuthProtocol::Sha512,
    }
}

fn cipher(protocol: PrivProtocol) -> v3::Cipher {
    match protocol {
        PrivProtocol::Des => v3::Cipher::Des,
        PrivProtocol::Aes => v3::Cipher::Aes128,
        PrivProtocol::Aes192 => v3::Cipher::Aes192,
        PrivProtocol::Aes256 => v3::Cipher::Aes256,
    }
}

pub struct QueryBuilder {
    session: Arc<Mutex<AsyncSession>>,
    oids: Vec<Oid<'static>>,
    operation: Option<MessageType>,
    timeout: Option<Duration>,
    non_repeaters: Option<u32>,
    max_repetitions: Option<u32>,
}

impl QueryBuilder {
    pub fn get(mut self) -> Self {
        self.operation = Some(MessageType::GetRequest);
        self
    }

    pub fn get_next(mut self) -> Self {
        self.operation = Some(MessageType::GetNextRequest);
        self
    }

    pub fn get_bulk(mut self, non_repeaters: u32, max_repetitions: u32) -> Self {
        self.operation = Some(MessageType::GetBulkRequest);
        self.non_repeaters = Some(non_repeaters);
        self.max_repetitions = Some(max_repetitions);
        self
    }

    pub fn oid(mut self, oid: Oid<'static>) -> Self {
        self.oids.push(oid);
        self
    }

    pub fn oid_str(self, oid_str: &str) -> TransportResult<Self> {
        let oid = Oid::from_str(oid_str.trim_start_matches('.'))
            .map_err(|_| TransportError::InvalidOid(oid_str.to_string()))?;
        Ok(self.oid(oid))
    }

    pub async fn execute(self) -> TransportResult<Vec<Varbind>> {
        let operation = self
            .operation
            .ok_or_else(|| TransportError::Protocol("query has no operation".to_string()))?;
        let first = self
            .oids
            .first()
            .map(|oid| format!(".{oid}"))
            .ok_or_else(|| TransportError::Protocol("query has no OIDs".to_string()))?;
        if self.oids.len() != 1 && !matches!(operation, MessageType::GetBulkRequest) {
            return Err(TransportError::Protocol(
                "GET and GETNEXT take exactly one OID".to_string(),
            ));
        }
        let timeout = self.timeout.unwrap_or(SnmpOptions::default().timeout);
        let non_repeaters = self.non_repeaters.unwrap_or(0);
        let max_repetitions = self.max_repetitions.unwrap_or(0);

        let mut session = self.session.lock().await;
        let oids = &self.oids;
        let request = async {
            let response = match operation {
                MessageType::GetRequest => session.get(&oids[0]).await,
                MessageType::GetNextRequest => session.getnext(&oids[0]).await,
                MessageType::GetBulkRequest => {
                    let oid_refs: Vec<&Oid> = oids.iter().collect();
                    session
                        .getbulk(&oid_refs, non_repeaters, max_repetitions)
                        .await
                }
                _ => {
                    return Err(TransportError::Protocol(
                        "unsupported SNMP operation".to_string(),
                    ));
                }
            }
            .map_err(|e| TransportError::Protocol(format!("{e:?}")))?;

            if response.error_status != 0 {
                return Err(TransportError::ErrorStatus {
                    oid: first.clone(),
                    status: response.error_status,
                    index: response.error_index,
                });
            }

            // Values borrow from the response, so they are copied out while the session is held
            let varbinds: Vec<Varbind> = response
                .varbinds
                .into_iter()
                .map(|(oid, value)| Varbind::new(format!(".{oid}"), SnmpValue::from(&value)))
                .collect();
            Ok(varbinds)
        };

        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| TransportError::Timeout {
                oid: first.clone(),
                after: timeout,
            })?
    }
}

#[async_trait]
impl SnmpTransport for SnmpClient {
    fn target(&self) -> &str {
        &self.target
    }

    async fn get_varbinds(&self, oid: &str) -> TransportResult<Vec<Varbind>> {
        self.query().get().oid_str(oid)?.execute().await
    }

    async fn get_next_varbind(&self, oid: &str) -> TransportResult<Option<Varbind>> {
        match self.query().get_next().oid_str(oid)?.execute().await {
            Ok(varbinds) => Ok(varbinds.into_iter().next()),
            Err(TransportError::ErrorStatus { status, .. })
                if status == V1_NO_SUCH_NAME && matches!(self.snmp_version, Version::V1) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn walk_varbinds(&self, oid: &str) -> TransportResult<Vec<Varbind>> {
        let root = canonical_oid(oid)?;
        let limit = self.options.max_walk_responses;
        let mut cursor = root.clone();
        let mut collected: Vec<Varbind> = Vec::new();

        loop {
            let batch = match self.snmp_version {
                Version::V1 => self.get_next_varbind(&cursor).await?.into_iter().collect(),
                _ => {
                    self.query()
                        .get_bulk(0, self.options.max_repetitions)
                        .oid_str(&cursor)?
                        .execute()
                        .await?
                }
            };
            match absorb_batch(&root, &mut cursor, batch, &mut collected, limit) {
                WalkStep::Continue => {}
                WalkStep::Done => break,
                WalkStep::NonIncreasing(at) => {
                    warn!(host = %self.target, oid = %root, at = %at, "agent returned a non-increasing OID, stopping walk");
                    break;
                }
                WalkStep::Truncated => {
                    warn!(host = %self.target, oid = %root, limit, "walk hit the response limit, result truncated");
                    break;
                }
            }
        }

        debug!(host = %self.target, address = %self.address, oid = %root, count = collected.len(), "walk complete");
        Ok(collected)
    }
}

/// What a walk does after taking in one response batch.
#[derive(Debug, PartialEq, Eq)]
enum WalkStep {
    /// Ask for the next batch from `cursor`.
    Continue,
    /// End of the subtree or of the MIB view.
    Done,
    /// The agent went backwards or repeated itself at this OID.
    NonIncreasing(String),
    /// `limit` instances were collected.
    Truncated,
}

/// Appends the in-subtree part of `batch` to `collected` and advances `cursor`.
///
/// An empty batch ends the walk.
fn absorb_batch(
    root: &str,
    cursor: &mut String,
    batch: Vec<Varbind>,
    collected: &mut Vec<Varbind>,
    limit: usize,
) -> WalkStep {
    if batch.is_empty() {
        return WalkStep::Done;
    }
    for varbind in batch {
        if varbind.value == SnmpValue::EndOfMibView || !is_in_subtree(&varbind.oid, root) {
            return WalkStep::Done;
        }
        if !oid_increases(cursor, &varbind.oid) {
            return WalkStep::NonIncreasing(varbind.oid);
        }
        cursor.clone_from(&varbind.oid);
        collected.push(varbind);
        if collected.len() >= limit {
            return WalkStep::Truncated;
        }
    }
    WalkStep::Continue
}

/// Opens real `snmp2` sessions.
#[derive(Debug, Clone, Default)]
pub struct SnmpConnector {
    options: SnmpOptions,
}

impl SnmpConnector {
    pub fn new(options: SnmpOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl TransportFactory for SnmpConnector {
    async fn connect(
        &self,
        hostname: &str,
        profile: &CredentialProfile,
    ) -> TransportResult<Arc<dyn SnmpTransport>> {
        let client = SnmpClient::connect(hostname, profile, self.options.clone()).await?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;

    use super::*;
    use crate::data_aquisition::credentials::{CredentialValidator, Host};

    /// A bound socket that never answers, so requests to it time out.
    fn silent_agent() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    fn short_options() -> SnmpOptions {
        SnmpOptions {
            timeout: Duration::from_millis(200),
            ..SnmpOptions::default()
        }
    }

    #[tokio::test]
    async fn test_silent_agent_times_out() {
        let (_agent, port) = silent_agent();
        let mut profile = CredentialProfile::v2c("core", "public");
        profile.snmp_port = port;

        let client = SnmpClient::connect("127.0.0.1", &profile, short_options())
            .await
            .unwrap();
        assert_eq!(client.address.port(), port);

        let err = client.get_varbinds(".1.3.6.1.2.1.1.1.0").await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
        assert!(!client.oid_exists(".1.3.6.1.2.1.1.1.0").await);
    }

    #[tokio::test]
    async fn test_validator_folds_network_failure_into_none() {
        let (_agent, port) = silent_agent();
        let mut profile = CredentialProfile::v2c("core", "public");
        profile.snmp_port = port;

        let validator = CredentialValidator::new(Arc::new(SnmpConnector::new(short_options())));
        let host = Host::new("127.0.0.1", vec![profile]);
        assert!(validator.credentials(&host).await.is_none());
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let profile = CredentialProfile::v2c("core", "public");
        let result = SnmpClient::connect("host.invalid", &profile, short_options()).await;
        assert!(matches!(result, Err(TransportError::Resolve(_))));
    }

    #[test]
    fn test_v3_security_requires_name() {
        assert!(matches!(
            security(&UsmParams::default()),
            Err(TransportError::NoV3Security)
        ));
        let usm = UsmParams {
            snmp_secname: "poller".to_string(),
            snmp_authpassword: Some("authpass".to_string()),
            snmp_privpassword: Some("privpass".to_string()),
            ..UsmParams::default()
        };
        assert!(security(&usm).is_ok());
    }

    const IF_DESCR: &str = ".1.3.6.1.2.1.2.2.1.2";

    fn descr(index: u32) -> Varbind {
        Varbind::new(format!("{IF_DESCR}.{index}"), SnmpValue::OctetString(b"Gi0/1".to_vec()))
    }

    #[test]
    fn test_walk_pages_across_batches() {
        let mut cursor = IF_DESCR.to_string();
        let mut collected = Vec::new();

        let step = absorb_batch(IF_DESCR, &mut cursor, vec![descr(1), descr(2)], &mut collected, 100);
        assert_eq!(step, WalkStep::Continue);
        assert_eq!(cursor, format!("{IF_DESCR}.2"));

        let step = absorb_batch(IF_DESCR, &mut cursor, vec![descr(3)], &mut collected, 100);
        assert_eq!(step, WalkStep::Continue);
        assert_eq!(collected.len(), 3);

        let step = absorb_batch(IF_DESCR, &mut cursor, Vec::new(), &mut collected, 100);
        assert_eq!(step, WalkStep::Done);
        assert_eq!(collected.len(), 3);
    }

    #[test]
    fn test_walk_stops_at_response_limit() {
        let mut cursor = IF_DESCR.to_string();
        let mut collected = Vec::new();

        let batch = vec![descr(1), descr(2), descr(3), descr(4)];
        let step = absorb_batch(IF_DESCR, &mut cursor, batch, &mut collected, 2);

        assert_eq!(step, WalkStep::Truncated);
        assert_eq!(collected, vec![descr(1), descr(2)]);
    }

    #[test]
    fn test_walk_stops_on_non_increasing_oid() {
        let mut cursor = IF_DESCR.to_string();
        let mut collected = Vec::new();

        // Agent loops back to an instance it already returned
        let batch = vec![descr(1), descr(2), descr(2), descr(3)];
        let step = absorb_batch(IF_DESCR, &mut cursor, batch, &mut collected, 100);

        assert_eq!(step, WalkStep::NonIncreasing(format!("{IF_DESCR}.2")));
        assert_eq!(collected, vec![descr(1), descr(2)]);
        assert_eq!(cursor, format!("{IF_DESCR}.2"));
    }

    #[test]
    fn test_walk_stops_at_end_of_mib_view_mid_batch() {
        let mut cursor = IF_DESCR.to_string();
        let mut collected = Vec::new();

        let batch = vec![
            descr(1),
            Varbind::new(format!("{IF_DESCR}.2"), SnmpValue::EndOfMibView),
            descr(3),
        ];
        let step = absorb_batch(IF_DESCR, &mut cursor, batch, &mut collected, 100);

        assert_eq!(step, WalkStep::Done);
        assert_eq!(collected, vec![descr(1)]);
    }

    #[test]
    fn test_walk_stops_when_leaving_subtree() {
        let mut cursor = IF_DESCR.to_string();
        let mut collected = Vec::new();

        // GETBULK runs past the end of ifDescr into ifType
        let batch = vec![
            descr(1),
            Varbind::new(".1.3.6.1.2.1.2.2.1.3.1", SnmpValue::Integer(6)),
            descr(2),
        ];
        let step = absorb_batch(IF_DESCR, &mut cursor, batch, &mut collected, 100);

        assert_eq!(step, WalkStep::Done);
        assert_eq!(collected, vec![descr(1)]);
    }

    #[tokio::test]
    async fn test_query_without_operation_is_rejected() {
        let (_agent, port) = silent_agent();
        let mut profile = CredentialProfile::v2c("core", "public");
        profile.snmp_port = port;
        let client = SnmpClient::connect("127.0.0.1", &profile, short_options())
            .await
            .unwrap();
        let result = client
            .query()
            .oid_str(".1.3.6.1.2.1.1.1.0")
            .unwrap()
            .execute()
            .await;
        assert!(matches!(result, Err(TransportError::Protocol(_))));
    }
}
