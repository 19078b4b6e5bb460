//! Protocol message types for WebSocket communication.
//!
//! This module defines all message types exchanged over the vehicle shadow
//! WebSocket RPC surface:
//! - Client → Server: Get, Set, Lock, Unlock, Subscribe, Unsubscribe
//! - Server → Client: Hello, Response, Notification, SubscriptionClosed
//!
//! Messages are serialized as JSON over WebSocket text frames. Paths and
//! tokens travel as plain strings so a malformed one can be answered with an
//! error carrying the request id instead of a decode failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shadow_core::{
    ErrorCode, LockToken, SetResult, ShadowError, SignalPath, SignalRecord, SignalUpdate,
    SignalValue, SubscriptionId, Value,
};

// ============================================================================
// Client → Server
// ============================================================================

/// Get request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequest {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub get: PathsSpec,
}

/// A set of paths. Empty means every known path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsSpec {
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Set request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRequest {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub set: SetSpec,
}

/// One atomic batch of writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub signals: Vec<SetSignal>,
}

/// One path/value pair of a set batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSignal {
    pub path: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Sample time; the server's clock is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SetSignal {
    pub fn new(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
            unit: None,
            timestamp: None,
        }
    }

    /// The store-side value for this entry.
    pub fn to_signal_value(&self) -> SignalValue {
        SignalValue::at(
            self.value.clone(),
            self.unit.clone(),
            self.timestamp.unwrap_or_else(Utc::now),
        )
    }
}

/// Lock request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequest {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub lock: LockSpec,
}

/// Paths to lock and an optional TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSpec {
    pub paths: Vec<String>,
    /// Requested lifetime; the server default applies when absent.
    #[serde(rename = "ttlMs", skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

/// Unlock request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockRequest {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub unlock: TokenSpec,
}

/// A lock token reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSpec {
    pub token: String,
}

/// Subscribe request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub subscribe: PathsSpec,
}

/// Unsubscribe request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub unsubscribe: UnsubscribeSpec,
}

/// Subscription to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeSpec {
    #[serde(rename = "subscriptionId")]
    pub subscription_id: SubscriptionId,
}

// ============================================================================
// Server → Client
// ============================================================================

/// Hello message sent by server immediately on WebSocket connection.
///
/// # Example
/// ```json
/// {
///   "type": "hello",
///   "name": "vehicle-shadow",
///   "version": "0.1.0",
///   "timestamp": "2024-01-17T10:30:00.000Z"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloMessage {
    /// Server name identifier.
    pub name: String,

    /// Server version.
    pub version: String,

    /// Current server timestamp in ISO 8601 format.
    pub timestamp: String,
}

impl HelloMessage {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}

/// Error details carried by a response or a closure message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&ShadowError> for ErrorBody {
    fn from(err: &ShadowError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<ShadowError> for ErrorBody {
    fn from(err: ShadowError) -> Self {
        Self::from(&err)
    }
}

/// Reply to exactly one client request.
///
/// Carries either `result` or `error`, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Absent only when the request could not be parsed far enough to read it.
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResponseResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ok(request_id: impl Into<String>, result: ResponseResult) -> Self {
        Self {
            request_id: Some(request_id.into()),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(request_id: Option<String>, error: impl Into<ErrorBody>) -> Self {
        Self {
            request_id,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Operation-specific payload of a successful response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseResult {
    Get { signals: Vec<GetEntry> },
    Set { results: Vec<SetResult> },
    Lock(LockGrant),
    Unlock {},
    Subscribe {
        #[serde(rename = "subscriptionId")]
        subscription_id: SubscriptionId,
    },
    Unsubscribe {
        #[serde(rename = "subscriptionId")]
        subscription_id: SubscriptionId,
    },
}

/// One path of a get result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetEntry {
    pub path: SignalPath,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub record: Option<SignalRecord>,

    #[serde(rename = "notFound", default, skip_serializing_if = "std::ops::Not::not")]
    pub not_found: bool,
}

impl GetEntry {
    pub fn new(path: SignalPath, record: Option<SignalRecord>) -> Self {
        Self {
            path,
            not_found: record.is_none(),
            record,
        }
    }
}

/// A granted lock as reported to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockGrant {
    pub token: String,
    pub paths: Vec<SignalPath>,
    pub expires_at: DateTime<Utc>,
}

impl From<&LockToken> for LockGrant {
    fn from(token: &LockToken) -> Self {
        Self {
            token: token.id().to_string(),
            paths: token.paths().iter().cloned().collect(),
            expires_at: token.expires_at(),
        }
    }
}

/// A change delivered on a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub subscription_id: SubscriptionId,

    pub path: SignalPath,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<SignalValue>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub not_found: bool,

    pub version: u64,

    pub initial: bool,
}

impl Notification {
    pub fn new(subscription_id: SubscriptionId, update: SignalUpdate) -> Self {
        Self {
            subscription_id,
            not_found: update.is_not_found(),
            path: update.path,
            value: update.value,
            version: update.version,
            initial: update.initial,
        }
    }
}

/// Final message of a subscription that the server ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionClosedMessage {
    pub subscription_id: SubscriptionId,
    pub code: ErrorCode,
    pub message: String,
}

impl SubscriptionClosedMessage {
    pub fn new(subscription_id: SubscriptionId, reason: &ShadowError) -> Self {
        Self {
            subscription_id,
            code: reason.code(),
            message: reason.to_string(),
        }
    }
}

// ============================================================================
// Unified Message Enums
// ============================================================================

/// Messages that can be sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Hello message sent on connection.
    Hello(HelloMessage),

    /// Reply to a request.
    Response(Response),

    /// Change on a subscription.
    Notification(Notification),

    /// The server ended a subscription.
    SubscriptionClosed(SubscriptionClosedMessage),
}

/// Messages that can be received from client.
///
/// Uses untagged deserialization - the operation is determined by which
/// field accompanies `requestId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Get(GetRequest),
    Set(SetRequest),
    Lock(LockRequest),
    Unlock(UnlockRequest),
    Subscribe(SubscribeRequest),
    Unsubscribe(UnsubscribeRequest),
}

impl ClientMessage {
    pub fn request_id(&self) -> &str {
        match self {
            ClientMessage::Get(r) => &r.request_id,
            ClientMessage::Set(r) => &r.request_id,
            ClientMessage::Lock(r) => &r.request_id,
            ClientMessage::Unlock(r) => &r.request_id,
            ClientMessage::Subscribe(r) => &r.request_id,
            ClientMessage::Unsubscribe(r) => &r.request_id,
        }
    }
}

// ============================================================================
// Discovery Endpoint
// ============================================================================

/// Discovery response for `/vehicle-shadow` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub endpoints: DiscoveryEndpoints,
}

/// Endpoints advertised in discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryEndpoints {
    pub v1: DiscoveryV1,
}

/// Version 1 API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryV1 {
    pub version: String,
    #[serde(rename = "shadow-http")]
    pub shadow_http: String,
    #[serde(rename = "shadow-ws")]
    pub shadow_ws: String,
}

impl DiscoveryResponse {
    /// Create a discovery response for the given host and ports.
    pub fn new(host: &str, http_port: u16, ws_port: u16, version: &str) -> Self {
        Self {
            endpoints: DiscoveryEndpoints {
                v1: DiscoveryV1 {
                    version: version.to_string(),
                    shadow_http: format!("http://{}:{}/vehicle-shadow/v1", host, http_port),
                    shadow_ws: format!("ws://{}:{}/vehicle-shadow/v1/stream", host, ws_port),
                },
            },
        }
    }
}
