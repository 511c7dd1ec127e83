//! Batched mutations run on the next frame.

use anyhow::Result;
use core::pin::Pin;
use core::task::{Context, Poll};
use log::{debug, error, warn};
use squirrel_cache::ResourceCache;
use squirrel_host::{Document, Host, NodeKey};
use std::rc::Rc;
use tokio::sync::oneshot;

/// One deferred mutation.
pub type Operation<T> = Box<dyn FnOnce() -> Result<T>>;

/// Suspends transitions on a subtree until dropped.
pub struct TransitionGuard {
    document: Rc<dyn Document>,
    scope: NodeKey,
}

impl TransitionGuard {
    pub fn suspend(document: Rc<dyn Document>, scope: NodeKey) -> Self {
        document.set_transitions_suspended(scope, true);
        Self { document, scope }
    }
}

impl Drop for TransitionGuard {
    fn drop(&mut self) {
        self.document.set_transitions_suspended(self.scope, false);
    }
}

/// Results of a [`batch`], available once the host ran the frame.
///
/// Never fails: a failed operation yields `None` in its slot, and a frame the
/// host discarded yields `None` everywhere.
pub struct BatchHandle<T> {
    receiver: oneshot::Receiver<Vec<Option<T>>>,
    len: usize,
}

impl<T> BatchHandle<T> {
    /// Number of operations in the batch.
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Future for BatchHandle<T> {
    type Output = Vec<Option<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let len = self.len;
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                warn!("batch of {len} operations was discarded before it ran");
                (0..len).map(|_| None).collect()
            })
        })
    }
}

/// Run `operations` on the next frame, each on its own.
///
/// Batches larger than `threshold` run with transitions suspended on the
/// document root.
pub fn batch<T: 'static>(
    host: &Host,
    threshold: usize,
    operations: Vec<Operation<T>>,
) -> BatchHandle<T> {
    let (sender, receiver) = oneshot::channel();
    let len = operations.len();
    let document = Rc::clone(&host.document);
    host.scheduler.request_frame(Box::new(move || {
        let results = {
            let _suspended = (len > threshold).then(|| {
                let root = document.root();
                TransitionGuard::suspend(Rc::clone(&document), root)
            });
            run_all(operations)
        };
        if sender.send(results).is_err() {
            debug!("batch of {len} operations finished after its handle was dropped");
        }
    }));
    BatchHandle { receiver, len }
}

fn run_all<T>(operations: Vec<Operation<T>>) -> Vec<Option<T>> {
    operations
        .into_iter()
        .enumerate()
        .map(|(index, operation)| match operation() {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("batch operation {index} failed: {err:#}");
                None
            }
        })
        .collect()
}

/// Run `update` on `node` with its transitions suspended, then drop every
/// cached read of `node`. Returns whether the update succeeded.
pub fn batch_update(
    document: &Rc<dyn Document>,
    cache: &ResourceCache,
    node: NodeKey,
    update: impl FnOnce() -> Result<()>,
) -> bool {
    let outcome = {
        let _suspended = TransitionGuard::suspend(Rc::clone(document), node);
        update()
    };
    cache.invalidate(node);
    match outcome {
        Ok(()) => true,
        Err(err) => {
            error!("batched update of node {} failed: {err:#}", node.get());
            false
        }
    }
}
