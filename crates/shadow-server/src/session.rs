//! Per-connection request handling.
//!
//! A [`ClientSession`] runs decoded requests against the store and owns
//! everything the connection acquired: its subscriptions (with their
//! delivery tasks) and its lock tokens. Dropping the session releases both.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use shadow_core::{
    SetResult, SetStatus, ShadowError, ShadowResult, SignalPath, SignalStore, Subscription,
    SubscriptionId, TokenId,
};
use shadow_protocol::{
    ClientMessage, GetEntry, LockGrant, Notification, Response, ResponseResult, ServerMessage,
    SubscriptionClosedMessage,
};

/// State of one client connection.
pub struct ClientSession {
    store: Arc<SignalStore>,
    /// Where delivery tasks push notifications for this connection.
    outbound: mpsc::Sender<ServerMessage>,
    subscriptions: HashMap<SubscriptionId, JoinHandle<()>>,
    locks: HashSet<TokenId>,
}

impl ClientSession {
    pub fn new(store: Arc<SignalStore>, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            store,
            outbound,
            subscriptions: HashMap::new(),
            locks: HashSet::new(),
        }
    }

    /// Run one request and build its reply.
    ///
    /// Must be called from within a tokio runtime: subscribe spawns the
    /// subscription's delivery task.
    pub fn handle(&mut self, msg: ClientMessage) -> Response {
        let request_id = msg.request_id().to_string();
        match self.dispatch(msg) {
            Ok(result) => Response::ok(request_id, result),
            Err(err) => {
                debug!("Request {} failed: {}", request_id, err);
                Response::error(Some(request_id), err)
            }
        }
    }

    /// Whether a message from a delivery task should still reach the client.
    ///
    /// Notifications of a subscription this session has already ended are
    /// dropped, so nothing follows an unsubscribe reply.
    pub fn accepts(&mut self, msg: &ServerMessage) -> bool {
        match msg {
            ServerMessage::Notification(n) => self.subscriptions.contains_key(&n.subscription_id),
            ServerMessage::SubscriptionClosed(c) => {
                self.subscriptions.remove(&c.subscription_id).is_some()
            }
            _ => true,
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    fn dispatch(&mut self, msg: ClientMessage) -> ShadowResult<ResponseResult> {
        match msg {
            ClientMessage::Get(req) => {
                let paths = parse_paths(&req.get.paths)?;
                let signals = self
                    .store
                    .get(&paths)
                    .into_iter()
                    .map(|(path, record)| GetEntry::new(path, record))
                    .collect();
                Ok(ResponseResult::Get { signals })
            }
            ClientMessage::Set(req) => {
                let entries = req
                    .set
                    .signals
                    .iter()
                    .map(|s| -> ShadowResult<_> {
                        Ok((parse_path(&s.path)?, s.to_signal_value()))
                    })
                    .collect::<ShadowResult<Vec<_>>>()?;
                let results = match set_token(req.set.token.as_deref()) {
                    Ok(token) => self.store.set(entries, token.as_ref()),
                    // A token that cannot even be parsed names no live lock.
                    Err(_) => entries
                        .into_iter()
                        .map(|(path, _)| SetResult {
                            path,
                            status: SetStatus::InvalidToken,
                        })
                        .collect(),
                };
                Ok(ResponseResult::Set { results })
            }
            ClientMessage::Lock(req) => {
                let paths = parse_paths(&req.lock.paths)?;
                let ttl = req.lock.ttl_ms.map(Duration::from_millis);
                let token = self.store.lock(paths, ttl)?;
                self.locks.insert(token.id());
                Ok(ResponseResult::Lock(LockGrant::from(&token)))
            }
            ClientMessage::Unlock(req) => {
                let id = TokenId::parse(&req.unlock.token)?;
                self.locks.remove(&id);
                self.store.unlock(&id)?;
                Ok(ResponseResult::Unlock {})
            }
            ClientMessage::Subscribe(req) => {
                let paths = parse_paths(&req.subscribe.paths)?;
                let subscription = self.store.subscribe(paths);
                let id = subscription.id();
                let task = tokio::spawn(deliver(subscription, self.outbound.clone()));
                self.subscriptions.insert(id, task);
                Ok(ResponseResult::Subscribe {
                    subscription_id: id,
                })
            }
            ClientMessage::Unsubscribe(req) => {
                let id = req.unsubscribe.subscription_id;
                // Ids owned by other connections are left alone.
                if let Some(task) = self.subscriptions.remove(&id) {
                    self.store.unsubscribe(id);
                    task.abort();
                }
                Ok(ResponseResult::Unsubscribe {
                    subscription_id: id,
                })
            }
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        for (id, task) in self.subscriptions.drain() {
            task.abort();
            self.store.unsubscribe(id);
        }
        for token in self.locks.drain() {
            match self.store.unlock(&token) {
                Ok(()) => debug!("Released lock {} of closed connection", token),
                Err(_) => debug!("Lock {} had already expired", token),
            }
        }
    }
}

/// Forward a subscription's queue to its connection until either side ends.
async fn deliver(mut subscription: Subscription, outbound: mpsc::Sender<ServerMessage>) {
    let id = subscription.id();
    loop {
        let msg = match subscription.recv().await {
            Ok(update) => ServerMessage::Notification(Notification::new(id, update)),
            Err(ShadowError::SubscriptionClosed) => break,
            Err(err) => {
                warn!("Subscription {} terminated: {}", id, err);
                let closed = SubscriptionClosedMessage::new(id, &err);
                let _ = outbound.send(ServerMessage::SubscriptionClosed(closed)).await;
                break;
            }
        };
        if outbound.send(msg).await.is_err() {
            break;
        }
    }
    debug!("Delivery for subscription {} finished", id);
}

/// Token presented with a set. An empty string means no token.
fn set_token(raw: Option<&str>) -> ShadowResult<Option<TokenId>> {
    match raw {
        None | Some("") => Ok(None),
        Some(raw) => TokenId::parse(raw).map(Some),
    }
}

fn parse_path(raw: &str) -> ShadowResult<SignalPath> {
    SignalPath::parse(raw).map_err(|e| ShadowError::InvalidRequest {
        reason: e.to_string(),
    })
}

fn parse_paths(raw: &[String]) -> ShadowResult<BTreeSet<SignalPath>> {
    raw.iter().map(|p| parse_path(p)).collect()
}
