//! Inbound link delivery and the mounted callback listener.

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::callback::{CallbackHandler, Outcome};
use crate::navigation::DispatcherHandle;

const BUS_CAPACITY: usize = 16;

/// In-process link dispatch: the link that started the process plus a
/// broadcast of links arriving while it runs.
#[derive(Clone)]
pub struct LinkBus {
    initial_url: Option<String>,
    tx: broadcast::Sender<String>,
}

impl LinkBus {
    pub fn new(initial_url: Option<String>) -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { initial_url, tx }
    }

    /// The cold-start link, if the process was started by one.
    pub fn initial_url(&self) -> Option<&str> {
        self.initial_url.as_deref()
    }

    /// Delivers a live link. Returns how many listeners received it.
    pub fn deliver(&self, url: impl Into<String>) -> usize {
        self.tx.send(url.into()).unwrap_or(0)
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

/// Registers the callback handler for as long as a screen is mounted.
pub struct LinkListener;

impl LinkListener {
    /// Handles the cold-start link, then every live link until unmounted.
    ///
    /// Each link runs in its own task with a child token of the mount; its
    /// navigation command is discarded if the mount is gone by then.
    pub fn mount<B>(
        bus: &LinkBus,
        handler: CallbackHandler<B>,
        dispatcher: DispatcherHandle,
    ) -> Mounted
    where
        B: Backend + 'static,
    {
        let token = CancellationToken::new();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let mut rx = bus.subscribe();
        let invoker = Invoker {
            handler,
            dispatcher,
            outcomes: outcome_tx,
            mount: token.clone(),
        };

        if let Some(url) = bus.initial_url() {
            debug!("Handling cold-start link");
            invoker.spawn(url.to_string());
        }

        let mount = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = mount.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(url) => invoker.spawn(url),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Link listener lagged; links dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("Link listener stopped");
        });

        Mounted {
            token,
            outcomes: outcome_rx,
        }
    }
}

struct Invoker<B> {
    handler: CallbackHandler<B>,
    dispatcher: DispatcherHandle,
    outcomes: mpsc::UnboundedSender<Outcome>,
    mount: CancellationToken,
}

impl<B: Backend + 'static> Invoker<B> {
    fn spawn(&self, url: String) {
        if self.mount.is_cancelled() {
            return;
        }
        let cancel = self.mount.child_token();
        let handler = self.handler.clone();
        let dispatcher = self.dispatcher.clone();
        let outcomes = self.outcomes.clone();
        tokio::spawn(async move {
            let outcome = handler.handle(&url).await;
            dispatcher.dispatch(outcome.command(), cancel);
            let _ = outcomes.send(outcome);
        });
    }
}

/// A mounted listener. Dropping it unmounts.
pub struct Mounted {
    token: CancellationToken,
    outcomes: mpsc::UnboundedReceiver<Outcome>,
}

impl Mounted {
    /// Stops listening and cancels in-flight invocations' navigation.
    pub fn unmount(&self) {
        self.token.cancel();
    }

    /// Waits for the next invocation to finish.
    pub async fn next_outcome(&mut self) -> Option<Outcome> {
        self.outcomes.recv().await
    }
}

impl Drop for Mounted {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
