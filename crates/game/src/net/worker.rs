use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use super::client::NetClient;
use super::error::NetError;
use super::event::NetworkEvent;
use super::flags::NetFlags;
use super::host::NetHost;
use super::packet::Packet;
use super::peer::PeerId;

const IDLE_SLEEP: Duration = Duration::from_millis(1);
/// Events held back per slot of event channel capacity.
const BACKLOG_FACTOR: usize = 4;

/// Request from the simulation thread to the network thread.
#[derive(Debug, Clone)]
pub enum Outbound {
    Send {
        peer: PeerId,
        packet: Packet,
        flags: NetFlags,
        channel: u8,
    },
    Broadcast {
        packet: Packet,
        flags: NetFlags,
        channel: u8,
    },
    Disconnect(PeerId),
}

/// A transport endpoint that can be driven from the network thread.
pub trait Session: Send + 'static {
    fn service(&mut self) -> Result<(), NetError>;
    fn pop_event(&mut self) -> Option<NetworkEvent>;
    fn execute(&mut self, request: Outbound) -> Result<(), NetError>;
    fn close(&mut self);
}

impl Session for NetHost {
    fn service(&mut self) -> Result<(), NetError> {
        NetHost::service(self)
    }

    fn pop_event(&mut self) -> Option<NetworkEvent> {
        NetHost::pop_event(self)
    }

    fn execute(&mut self, request: Outbound) -> Result<(), NetError> {
        match request {
            Outbound::Send {
                peer,
                packet,
                flags,
                channel,
            } => self.send(peer, &packet, flags, channel),
            Outbound::Broadcast {
                packet,
                flags,
                channel,
            } => self.broadcast(&packet, flags, channel),
            Outbound::Disconnect(peer) => self.disconnect(peer),
        }
    }

    fn close(&mut self) {
        NetHost::close(self);
    }
}

impl Session for NetClient {
    fn service(&mut self) -> Result<(), NetError> {
        NetClient::service(self)
    }

    fn pop_event(&mut self) -> Option<NetworkEvent> {
        NetClient::pop_event(self)
    }

    // A client has one peer, so targets are ignored.
    fn execute(&mut self, request: Outbound) -> Result<(), NetError> {
        match request {
            Outbound::Send {
                packet,
                flags,
                channel,
                ..
            }
            | Outbound::Broadcast {
                packet,
                flags,
                channel,
            } => self.send(&packet, flags, channel),
            Outbound::Disconnect(_) => {
                self.disconnect();
                Ok(())
            }
        }
    }

    fn close(&mut self) {
        self.disconnect();
    }
}

/// Simulation-side end of the network thread. Events are drained with
/// `poll` at one point of the tick; requests are queued with `send`,
/// `broadcast` and `disconnect`.
pub struct NetHandle {
    events: mpsc::Receiver<NetworkEvent>,
    outbound: mpsc::Sender<Outbound>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Moves `session` onto its own thread. Both directions use bounded
/// channels of `capacity`.
pub fn spawn<S: Session>(session: S, capacity: usize) -> Result<NetHandle, NetError> {
    let (event_tx, event_rx) = mpsc::channel(capacity.max(1));
    let (outbound_tx, outbound_rx) = mpsc::channel(capacity.max(1));
    let running = Arc::new(AtomicBool::new(true));

    let flag = Arc::clone(&running);
    let thread = thread::Builder::new()
        .name("net-worker".to_string())
        .spawn(move || run(session, event_tx, outbound_rx, flag, capacity))?;

    Ok(NetHandle {
        events: event_rx,
        outbound: outbound_tx,
        running,
        thread: Some(thread),
    })
}

fn run<S: Session>(
    mut session: S,
    events: mpsc::Sender<NetworkEvent>,
    mut outbound: mpsc::Receiver<Outbound>,
    running: Arc<AtomicBool>,
    capacity: usize,
) {
    info!("Network worker started");
    let mut backlog = Backlog::new(capacity.max(1) * BACKLOG_FACTOR);

    'worker: while running.load(Ordering::SeqCst) {
        loop {
            match outbound.try_recv() {
                Ok(request) => {
                    if let Err(e) = session.execute(request) {
                        debug!("Outbound request failed: {}", e);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'worker,
            }
        }

        if let Err(e) = session.service() {
            warn!("Network service error: {}", e);
        }

        while let Some(event) = session.pop_event() {
            backlog.push(event);
        }

        if !backlog.forward(&events) {
            break 'worker;
        }

        thread::sleep(IDLE_SLEEP);
    }

    session.close();
    info!("Network worker stopped");
}

/// Events the simulation has not taken yet. Once `limit` events are
/// waiting, further payloads are dropped; connection changes are always
/// kept.
struct Backlog {
    queue: VecDeque<NetworkEvent>,
    limit: usize,
    dropped: u64,
}

impl Backlog {
    fn new(limit: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            limit: limit.max(1),
            dropped: 0,
        }
    }

    fn push(&mut self, event: NetworkEvent) {
        if self.queue.len() >= self.limit && event.is_payload() {
            if self.dropped == 0 {
                warn!(
                    "Simulation is not draining events, dropping packets past {}",
                    self.limit
                );
            }
            self.dropped += 1;
            return;
        }
        self.queue.push_back(event);
    }

    /// Hands over as much as the channel accepts. Returns false once the
    /// receiving side is gone.
    fn forward(&mut self, events: &mpsc::Sender<NetworkEvent>) -> bool {
        while let Some(event) = self.queue.pop_front() {
            match events.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    self.queue.push_front(event);
                    return true;
                }
                Err(TrySendError::Closed(_)) => return false,
            }
        }

        if self.dropped > 0 {
            warn!("Dropped {} packets while the event channel was full", self.dropped);
            self.dropped = 0;
        }
        true
    }
}

impl NetHandle {
    /// Next event from the network thread, or `None` when nothing is waiting.
    pub fn poll(&mut self) -> Option<NetworkEvent> {
        self.events.try_recv().ok()
    }

    pub fn send(
        &self,
        peer: PeerId,
        packet: Packet,
        flags: NetFlags,
        channel: u8,
    ) -> Result<(), NetError> {
        self.request(Outbound::Send {
            peer,
            packet,
            flags,
            channel,
        })
    }

    pub fn broadcast(&self, packet: Packet, flags: NetFlags, channel: u8) -> Result<(), NetError> {
        self.request(Outbound::Broadcast {
            packet,
            flags,
            channel,
        })
    }

    pub fn disconnect(&self, peer: PeerId) -> Result<(), NetError> {
        self.request(Outbound::Disconnect(peer))
    }

    /// Blocks while the outbound channel is full. The worker never blocks,
    /// so this only waits for one service pass.
    pub fn request(&self, request: Outbound) -> Result<(), NetError> {
        self.outbound
            .blocking_send(request)
            .map_err(|_| NetError::WorkerClosed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the worker, which closes the session, and waits for it.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Network worker panicked");
            }
        }
    }
}

impl Drop for NetHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
