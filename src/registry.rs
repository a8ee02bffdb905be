//! Endpoint registry and link bootstrap.
//!
//! [`Registry`] owns one handle per endpoint and resolves them by id.
//! [`Link`] wires a registry to a [`Simulator`], spawns every worker on the
//! current tokio runtime, and exposes the two ends a caller needs: submit
//! commands in, receive deliveries out.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::command::{Command, CommandError};
use crate::config::{ConfigError, LinkConfig};
use crate::endpoint::{ReceiverEndpoint, SenderEndpoint, Transport};
use crate::receiver::Delivery;
use crate::simulator::{Faults, Simulator};

#[derive(Debug)]
pub struct Registry {
    senders: Vec<SenderEndpoint>,
    receivers: Vec<ReceiverEndpoint>,
}

impl Registry {
    /// Create senders `0..cfg.senders` and receivers `0..cfg.receivers`.
    /// Every receiver publishes its deliveries on `deliveries`.
    pub fn build(cfg: &LinkConfig, deliveries: mpsc::UnboundedSender<Delivery>) -> Self {
        let timing = cfg.timer();
        let senders = (0..cfg.senders)
            .map(|id| SenderEndpoint::new(id, cfg.sender_window, timing))
            .collect();
        let receivers = (0..cfg.receivers)
            .map(|id| ReceiverEndpoint::new(id, cfg.receiver_window, timing, deliveries.clone()))
            .collect();
        Self { senders, receivers }
    }

    pub fn sender(&self, id: u16) -> Option<&SenderEndpoint> {
        self.senders.get(usize::from(id))
    }

    pub fn receiver(&self, id: u16) -> Option<&ReceiverEndpoint> {
        self.receivers.get(usize::from(id))
    }

    pub fn senders(&self) -> &[SenderEndpoint] {
        &self.senders
    }

    pub fn receivers(&self) -> &[ReceiverEndpoint] {
        &self.receivers
    }
}

/// A running link: every endpoint worker spawned, deliveries flowing.
///
/// Dropping the `Link` aborts all of its workers.
#[derive(Debug)]
pub struct Link {
    registry: Arc<Registry>,
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    tasks: Vec<JoinHandle<()>>,
}

impl Link {
    /// Validate `cfg`, build the endpoints and start their workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(cfg: LinkConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Registry::build(&cfg, tx));
        let transport: Arc<dyn Transport> = Arc::new(Simulator::new(
            registry.clone(),
            Faults::from_config(&cfg),
            cfg.seed,
        ));

        let mut tasks = Vec::with_capacity(registry.senders().len() + registry.receivers().len());
        for sender in registry.senders() {
            tasks.push(tokio::spawn(sender.clone().run(transport.clone())));
        }
        for receiver in registry.receivers() {
            tasks.push(tokio::spawn(receiver.clone().run(transport.clone())));
        }
        log::info!(
            "[link] up: {} sender(s), {} receiver(s), sws={} rws={} drop={} corrupt={}",
            cfg.senders,
            cfg.receivers,
            cfg.sender_window,
            cfg.receiver_window,
            cfg.drop_prob,
            cfg.corrupt_prob,
        );

        Ok(Self {
            registry,
            deliveries: rx,
            tasks,
        })
    }

    /// Hand a message to the sender named by `cmd.src`.
    pub fn submit(&self, cmd: Command) -> Result<(), CommandError> {
        let sender = self
            .registry
            .sender(cmd.src)
            .ok_or(CommandError::UnknownSender(cmd.src))?;
        if self.registry.receiver(cmd.dst).is_none() {
            return Err(CommandError::UnknownReceiver(cmd.dst));
        }
        log::debug!(
            "[link] submit {} byte(s) {} → {}",
            cmd.message.len(),
            cmd.src,
            cmd.dst
        );
        sender.push_command(cmd);
        Ok(())
    }

    /// Next completed message, in delivery order.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.deliveries.recv().await
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
