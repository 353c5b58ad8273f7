use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, warn};

use crate::{ACTOR_TARGET, ActorError};

/// State machine driven by a single worker thread.
///
/// `handle` and `on_deadline` must not block: blocking work belongs on other
/// threads, which report back by sending messages.
pub trait Service: Send + 'static {
    /// Message type accepted by the mailbox.
    type Message: Send + 'static;

    /// Processes one message.
    fn handle(&mut self, message: Self::Message, now: Instant);

    /// Earliest instant at which [`Service::on_deadline`] must run.
    fn next_deadline(&self) -> Option<Instant>;

    /// Fires every timer due at `now`.
    fn on_deadline(&mut self, now: Instant);

    /// Runs once on the worker thread after the mailbox closes.
    fn on_stop(&mut self) {}
}

enum Envelope<M> {
    Message(M),
    Shutdown,
}

/// Sending half of a service mailbox.
pub struct Mailbox<M> {
    name: Arc<str>,
    sender: Sender<Envelope<M>>,
}

impl<M> Clone for Mailbox<M> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            sender: self.sender.clone(),
        }
    }
}

impl<M> std::fmt::Debug for Mailbox<M> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Mailbox")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<M: Send + 'static> Mailbox<M> {
    /// Enqueues `message` for the worker.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::Stopped`] once the worker has exited.
    pub fn send(&self, message: M) -> Result<(), ActorError> {
        self.sender
            .send(Envelope::Message(message))
            .map_err(|_| self.stopped())
    }

    /// Sends a message carrying a reply channel and waits for the answer.
    ///
    /// Used for snapshot queries so foreign threads never read service state
    /// directly.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::Stopped`] when the worker exits before replying.
    pub fn call<R, F>(&self, build: F) -> Result<R, ActorError>
    where
        F: FnOnce(Sender<R>) -> M,
    {
        let (reply, answer) = mpsc::channel();
        self.send(build(reply))?;
        answer.recv().map_err(|_| self.stopped())
    }

    /// Name of the worker thread behind this mailbox.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn stopped(&self) -> ActorError {
        ActorError::Stopped {
            name: self.name.to_string(),
        }
    }
}

/// Owner handle for a running service.
pub struct ServiceHandle<M> {
    mailbox: Mailbox<M>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<M: Send + 'static> ServiceHandle<M> {
    /// Mailbox for sending messages to the service.
    #[must_use]
    pub fn mailbox(&self) -> Mailbox<M> {
        self.mailbox.clone()
    }

    /// Enqueues `message` for the worker.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::Stopped`] once the worker has exited.
    pub fn send(&self, message: M) -> Result<(), ActorError> {
        self.mailbox.send(message)
    }

    /// Asks the worker to stop after draining earlier messages, then joins
    /// it. Calling this more than once is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::Panicked`] when the worker panicked.
    pub fn shutdown(&self) -> Result<(), ActorError> {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return Ok(());
        };
        if self.mailbox.sender.send(Envelope::Shutdown).is_err() {
            debug!(
                target: ACTOR_TARGET,
                service = %self.mailbox.name,
                "worker already exited before shutdown"
            );
        }
        worker.join().map_err(|_| ActorError::Panicked {
            name: self.mailbox.name.to_string(),
        })
    }
}

impl<M> Drop for ServiceHandle<M> {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            // The sender clone held by the worker's peers may outlive us, so
            // ask explicitly rather than waiting for the channel to close.
            let _sent = self.mailbox.sender.send(Envelope::Shutdown);
            if worker.join().is_err() {
                warn!(
                    target: ACTOR_TARGET,
                    service = %self.mailbox.name,
                    "worker panicked during shutdown"
                );
            }
        }
    }
}

/// Starts `service` on a named worker thread.
///
/// # Errors
///
/// Returns [`ActorError::Spawn`] when the thread cannot be created.
pub fn spawn<S: Service>(name: &str, service: S) -> Result<ServiceHandle<S::Message>, ActorError> {
    let (sender, receiver) = mpsc::channel();
    let worker = thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || run(service, &receiver))
        .map_err(|source| ActorError::Spawn {
            name: name.to_owned(),
            source,
        })?;
    Ok(ServiceHandle {
        mailbox: Mailbox {
            name: Arc::from(name),
            sender,
        },
        worker: Mutex::new(Some(worker)),
    })
}

fn run<S: Service>(mut service: S, receiver: &Receiver<Envelope<S::Message>>) {
    loop {
        let envelope = match service.next_deadline() {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match receiver.recv_timeout(wait) {
                    Ok(envelope) => Some(envelope),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match receiver.recv() {
                Ok(envelope) => Some(envelope),
                Err(_) => break,
            },
        };

        match envelope {
            Some(Envelope::Message(message)) => service.handle(message, Instant::now()),
            Some(Envelope::Shutdown) => break,
            None => {}
        }

        let now = Instant::now();
        if service.next_deadline().is_some_and(|deadline| deadline <= now) {
            service.on_deadline(now);
        }
    }
    service.on_stop();
    debug!(target: ACTOR_TARGET, "service loop exited");
}
