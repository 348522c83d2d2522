//! Loopback data channel for testing.
//!
//! Uses in-process [`tokio::sync::mpsc`] channels to simulate a peer-to-peer
//! data channel. Created via [`LoopbackChannel::pair`], which returns two
//! connected endpoints: sending on one delivers to the other.
//!
//! Unlike a plain mpsc pair, each direction tracks the bytes the sender has
//! queued and the receiver has not yet taken, so the transfer engine's
//! backpressure logic sees the same signals it would on a real channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{Mutex, Notify, mpsc};

use super::{ChannelError, ChannelMessage, DataChannel};

/// Byte accounting for one direction of the pair.
#[derive(Debug, Default)]
struct Lane {
    buffered: AtomicUsize,
    peak: AtomicUsize,
    drained: Notify,
}

impl Lane {
    fn reserve(&self, len: usize) {
        let now = self.buffered.fetch_add(len, Ordering::AcqRel) + len;
        self.peak.fetch_max(now, Ordering::AcqRel);
    }

    fn release(&self, len: usize) {
        self.buffered.fetch_sub(len, Ordering::AcqRel);
        self.drained.notify_waiters();
    }
}

/// Close state shared by both endpoints.
#[derive(Debug, Default)]
struct Link {
    closed: AtomicBool,
    shutdown: Notify,
}

/// In-process data channel backed by unbounded `tokio::sync::mpsc` channels.
///
/// The mpsc queues never push back on the sender; flow control comes from
/// the buffered amount, exactly as with a browser data channel.
pub struct LoopbackChannel {
    /// Sender toward the remote endpoint. Taken on close.
    tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<ChannelMessage>>>,
    /// Receiver for messages the remote endpoint sent.
    rx: Mutex<mpsc::UnboundedReceiver<ChannelMessage>>,
    /// Accounting for what this side has queued.
    outbound: Arc<Lane>,
    /// Accounting for what the remote side has queued toward us.
    inbound: Arc<Lane>,
    link: Arc<Link>,
}

impl LoopbackChannel {
    /// Create a pair of connected loopback channels.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use pairlink::channel::DataChannel;
    /// use pairlink::channel::loopback::LoopbackChannel;
    ///
    /// # async fn example() {
    /// let (alice, bob) = LoopbackChannel::pair();
    /// alice.send_text("hello").await.unwrap();
    /// let message = bob.recv().await.unwrap();
    /// # }
    /// ```
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        let a_to_b = Arc::new(Lane::default());
        let b_to_a = Arc::new(Lane::default());
        let link = Arc::new(Link::default());

        let a = Self {
            tx: parking_lot::Mutex::new(Some(tx_b)),
            rx: Mutex::new(rx_a),
            outbound: Arc::clone(&a_to_b),
            inbound: Arc::clone(&b_to_a),
            link: Arc::clone(&link),
        };

        let b = Self {
            tx: parking_lot::Mutex::new(Some(tx_a)),
            rx: Mutex::new(rx_b),
            outbound: b_to_a,
            inbound: a_to_b,
            link,
        };

        (a, b)
    }

    /// Highest buffered amount this side has reached.
    #[must_use]
    pub fn peak_buffered_amount(&self) -> usize {
        self.outbound.peak.load(Ordering::Acquire)
    }

    /// Whether either side has closed the channel.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.link.closed.load(Ordering::Acquire)
    }

    fn enqueue(&self, message: ChannelMessage) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(ChannelError::Closed);
        };

        // Count the bytes before the receiver can see them so the
        // remote's release never runs ahead of our reserve.
        let len = message.len();
        self.outbound.reserve(len);
        if tx.send(message).is_err() {
            self.outbound.release(len);
            return Err(ChannelError::Closed);
        }
        Ok(())
    }
}

impl DataChannel for LoopbackChannel {
    async fn send_text(&self, text: &str) -> Result<(), ChannelError> {
        self.enqueue(ChannelMessage::Text(text.to_owned()))
    }

    async fn send_binary(&self, data: &[u8]) -> Result<(), ChannelError> {
        self.enqueue(ChannelMessage::Binary(data.to_vec()))
    }

    fn buffered_amount(&self) -> usize {
        self.outbound.buffered.load(Ordering::Acquire)
    }

    async fn wait_drained(&self, threshold: usize) -> Result<(), ChannelError> {
        loop {
            // Register before checking so a release in between is not missed.
            let drained = self.outbound.drained.notified();
            if self.is_closed() {
                return Err(ChannelError::Closed);
            }
            if self.buffered_amount() < threshold {
                return Ok(());
            }
            drained.await;
        }
    }

    async fn recv(&self) -> Result<ChannelMessage, ChannelError> {
        let shutdown = self.link.shutdown.notified();
        tokio::pin!(shutdown);

        let mut rx = self.rx.lock().await;

        // Messages queued before a close are still delivered.
        if let Ok(message) = rx.try_recv() {
            self.inbound.release(message.len());
            return Ok(message);
        }
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        let message = tokio::select! {
            biased;
            message = rx.recv() => message.ok_or(ChannelError::Closed)?,
            () = &mut shutdown => return Err(ChannelError::Closed),
        };
        self.inbound.release(message.len());
        Ok(message)
    }

    fn close(&self) {
        if self.link.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.tx.lock().take();
        self.link.shutdown.notify_waiters();
        self.outbound.drained.notify_waiters();
        self.inbound.drained.notify_waiters();
        tracing::debug!("loopback channel closed");
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        self.close();
    }
}
