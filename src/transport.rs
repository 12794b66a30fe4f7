use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

use crate::common::TaskDescriptor;

/// The remote call primitive the scheduler dispatches through. `false` covers
/// every failure cause; callers never get to distinguish them.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, address: &str, args: TaskDescriptor) -> bool;
}

pub struct RpcRequest {
    pub args: TaskDescriptor,
    pub reply: oneshot::Sender<bool>,
}

/// In-process transport: every bound address is a channel a worker serves
/// from; replies come back over a oneshot. A dropped endpoint or reply shows
/// up as an ordinary call failure.
#[derive(Default)]
pub struct LocalTransport {
    endpoints: Mutex<HashMap<String, async_channel::Sender<RpcRequest>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds an address, returning the receiving end the worker serves from.
    pub fn bind(&self, address: &str) -> async_channel::Receiver<RpcRequest> {
        let (tx, rx) = async_channel::unbounded();
        self.endpoints
            .lock()
            .unwrap()
            .insert(address.to_string(), tx);
        rx
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn call(&self, address: &str, args: TaskDescriptor) -> bool {
        let sender = {
            let endpoints = self.endpoints.lock().unwrap();
            match endpoints.get(address) {
                Some(tx) => tx.clone(),
                None => return false,
            }
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if sender
            .send(RpcRequest {
                args,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }
}

#[derive(Default)]
struct RegistryInner {
    workers: Vec<String>,
    subscribers: Vec<async_channel::Sender<String>>,
}

/// Registration stream with replay: a late subscriber first receives every
/// worker registered so far, then new registrations as they happen.
#[derive(Default)]
pub struct WorkerRegistry {
    inner: Mutex<RegistryInner>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, address: String) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .subscribers
            .retain(|sub| sub.try_send(address.clone()).is_ok());
        inner.workers.push(address);
    }

    pub fn subscribe(&self) -> async_channel::Receiver<String> {
        let (tx, rx) = async_channel::unbounded();
        let mut inner = self.inner.lock().unwrap();
        for address in &inner.workers {
            let _ = tx.try_send(address.clone());
        }
        inner.subscribers.push(tx);
        rx
    }
}
