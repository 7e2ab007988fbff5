//! Execution Worker
//!
//! The controller that owns one script engine and executes run requests
//! against it, one at a time. It is generic over the engine, the same way
//! a conductor is generic over its model backend: everything here is about
//! lifecycle and message flow, nothing about what the scripts mean.
//!
//! # Lifecycle
//!
//! The engine is constructed lazily, at most once, on the first `init` or
//! `run`. A failed boot leaves the slot empty so the next request retries
//! with a freshly built instance. While a run is in flight the worker keeps
//! servicing its event channel: input replies resume the blocked script,
//! further run requests join a bounded queue, and extra inits are ignored.
//! The worker stops when the inbound channel closes.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::engine::{EngineError, EngineHost, ScriptEngine};
use crate::events::EaselEvent;
use crate::host::WorkerHost;
use crate::messages::{RunId, WorkerMessage};
use crate::outbox::Outbox;

/// One execution context: engine slot, host state, and the run loop.
pub struct Worker<E: ScriptEngine> {
    make_engine: Box<dyn Fn() -> E + Send + Sync>,
    engine: OnceCell<Arc<E>>,
    host: Arc<WorkerHost>,
    outbox: Outbox,
    events: mpsc::Receiver<EaselEvent>,
    queue: VecDeque<(RunId, String)>,
    queue_depth: usize,
    closed: bool,
}

impl<E: ScriptEngine> Worker<E> {
    /// Wire a worker between an event receiver and a message sender.
    ///
    /// `make_engine` is called once per boot attempt; it runs again only if
    /// a previous boot failed.
    pub fn new(
        make_engine: impl Fn() -> E + Send + Sync + 'static,
        config: &WorkerConfig,
        events: mpsc::Receiver<EaselEvent>,
        messages: mpsc::UnboundedSender<WorkerMessage>,
    ) -> Self {
        let outbox = Outbox::new(messages);
        let host = Arc::new(WorkerHost::new(outbox.clone()));
        Self {
            make_engine: Box::new(make_engine),
            engine: OnceCell::new(),
            host,
            outbox,
            events,
            queue: VecDeque::new(),
            queue_depth: config.run_queue_depth,
            closed: false,
        }
    }

    /// Drive the worker until the presentation side hangs up.
    pub async fn run(mut self) {
        info!("worker started");
        while !self.closed {
            let Some(event) = self.events.recv().await else {
                break;
            };
            match event {
                EaselEvent::Init => self.handle_init().await,
                EaselEvent::InputResponse { text } => self.deliver_reply(text),
                EaselEvent::Run { run_id, code } => {
                    self.enqueue(run_id, code);
                    self.drain_runs().await;
                }
            }
        }
        info!("worker stopped");
    }

    async fn handle_init(&mut self) {
        if let Err(e) = self.ensure_engine().await {
            self.outbox.error(e.to_string());
        }
    }

    fn deliver_reply(&self, text: String) {
        if !self.host.resolve_input(text) {
            debug!("dropping stale input response");
        }
    }

    fn enqueue(&mut self, run_id: RunId, code: String) {
        if self.queue.len() >= self.queue_depth {
            warn!(run = %run_id, "run queue full, rejecting");
            self.outbox.error_for(run_id, "run queue full, try again later");
            return;
        }
        self.queue.push_back((run_id, code));
    }

    async fn drain_runs(&mut self) {
        while let Some((run_id, code)) = self.queue.pop_front() {
            if self.closed {
                break;
            }
            self.execute(run_id, code).await;
        }
    }

    /// Execute one run to its terminal message, servicing events meanwhile.
    async fn execute(&mut self, run_id: RunId, code: String) {
        debug!(run = %run_id, "run started");
        self.outbox.set_active(run_id);

        let engine = match self.ensure_engine().await {
            Ok(engine) => engine,
            Err(e) => {
                self.outbox.error(e.to_string());
                self.outbox.clear_active();
                return;
            }
        };

        let exec = async move { engine.exec(&code).await };
        tokio::pin!(exec);

        let result = loop {
            tokio::select! {
                result = &mut exec => break result,
                event = self.events.recv() => match event {
                    Some(EaselEvent::InputResponse { text }) => self.deliver_reply(text),
                    Some(EaselEvent::Run { run_id: next_run, code: next_code }) => {
                        self.enqueue(next_run, next_code);
                    }
                    Some(EaselEvent::Init) => {
                        debug!("init while engine already up");
                    }
                    None => {
                        // Presentation side is gone; abandon the script.
                        self.closed = true;
                        break Err(EngineError::Script(
                            "presentation side disconnected".to_string(),
                        ));
                    }
                },
            }
        };

        // Partial output lines land before the terminal message, and a
        // still-blocked input call unwinds instead of leaking.
        self.host.flush_output();
        self.host.abort_pending_input();
        match result {
            Ok(()) => self.outbox.done(),
            Err(e) => self.outbox.error(e.to_string()),
        }
        self.outbox.clear_active();
        debug!(run = %run_id, "run finished");
    }

    /// Boot the engine if it is not up yet. Every caller before completion
    /// awaits the same construction; a failure leaves the slot empty.
    async fn ensure_engine(&self) -> Result<Arc<E>, EngineError> {
        let booting = !self.engine.initialized();
        if booting {
            self.outbox.status("starting script engine");
        }
        let host = Arc::clone(&self.host) as Arc<dyn EngineHost>;
        let make = &self.make_engine;
        let engine = self
            .engine
            .get_or_try_init(|| async {
                let engine = Arc::new(make());
                engine.boot(host).await?;
                info!(engine = engine.name(), "engine booted");
                Ok(engine)
            })
            .await?;
        if booting {
            self.outbox.ready();
        }
        Ok(Arc::clone(engine))
    }
}
