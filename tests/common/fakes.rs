//! Fake fetch functions for driving the explorer tree from tests

use explorer::view::explorer_tree::BoxFuture;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// What a gated fetch resolves to; `Err` becomes a fetch failure
pub type GateResult<C> = Result<Vec<C>, String>;

/// Fetches that block until the test releases them
///
/// Every call takes the next gate registered with `expect`, in call order,
/// so a test can complete overlapping loads in any order it likes. A call
/// without a registered gate fails immediately.
pub struct Gated<C> {
    gates: Arc<Mutex<VecDeque<oneshot::Receiver<GateResult<C>>>>>,
    calls: Arc<AtomicUsize>,
}

impl<C: Send + 'static> Gated<C> {
    pub fn new() -> Self {
        Self {
            gates: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Register the gate the next fetch call will wait on
    pub fn expect(&self) -> oneshot::Sender<GateResult<C>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fetch function to hand to `Node::add_children` or `ChildLoader::keyed`
    pub fn fetch<T: Send + Sync + 'static>(
        &self,
    ) -> impl Fn(Arc<T>) -> BoxFuture<'static, anyhow::Result<Vec<C>>> + Send + Sync + 'static
    {
        let gates = Arc::clone(&self.gates);
        let calls = Arc::clone(&self.calls);
        move |_owner: Arc<T>| -> BoxFuture<'static, anyhow::Result<Vec<C>>> {
            calls.fetch_add(1, Ordering::SeqCst);
            let gate = gates.lock().unwrap().pop_front();
            Box::pin(async move {
                let Some(gate) = gate else {
                    anyhow::bail!("unexpected fetch");
                };
                match gate.await {
                    Ok(Ok(items)) => Ok(items),
                    Ok(Err(message)) => Err(anyhow::anyhow!(message)),
                    Err(_) => anyhow::bail!("gate dropped"),
                }
            })
        }
    }
}

/// Fetches that immediately return whatever the test last scripted
pub struct Scripted<C> {
    next: Arc<Mutex<GateResult<C>>>,
    calls: Arc<AtomicUsize>,
}

impl<C: Clone + Send + 'static> Scripted<C> {
    pub fn new(items: Vec<C>) -> Self {
        Self {
            next: Arc::new(Mutex::new(Ok(items))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set(&self, items: Vec<C>) {
        *self.next.lock().unwrap() = Ok(items);
    }

    pub fn fail(&self, message: &str) {
        *self.next.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fetch<T: Send + Sync + 'static>(
        &self,
    ) -> impl Fn(Arc<T>) -> BoxFuture<'static, anyhow::Result<Vec<C>>> + Send + Sync + 'static
    {
        let next = Arc::clone(&self.next);
        let calls = Arc::clone(&self.calls);
        move |_owner: Arc<T>| -> BoxFuture<'static, anyhow::Result<Vec<C>>> {
            calls.fetch_add(1, Ordering::SeqCst);
            let result = next.lock().unwrap().clone();
            Box::pin(async move { result.map_err(|message| anyhow::anyhow!(message)) })
        }
    }
}

/// Poll `condition` until it holds, failing the test after five seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached within 5s");
}

/// Run `future` with a five second limit
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}
