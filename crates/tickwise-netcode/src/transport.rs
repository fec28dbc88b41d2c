//! Transport boundary
//!
//! The netcode never opens sockets. Hosts implement `Transport` for their
//! network stack and push received bytes into `NetContext::deliver`.

use std::convert::Infallible;
use tickwise_core::ConnectionId;

/// Delivery guarantee requested for a send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Guaranteed, ordered delivery
    Reliable,
    /// Best effort; may be lost or reordered
    Unreliable,
}

/// Outbound half of a network stack
pub trait Transport {
    /// Error type for this transport
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send data to a connected peer
    fn send(&mut self, data: &[u8], channel: Channel, connection: ConnectionId)
        -> Result<(), Self::Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    fn send(
        &mut self,
        data: &[u8],
        channel: Channel,
        connection: ConnectionId,
    ) -> Result<(), Self::Error> {
        (**self).send(data, channel, connection)
    }
}

/// Bytes travelling between two peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Sender for inbound deliveries, recipient for outbound ones
    pub connection: ConnectionId,
    pub channel: Channel,
    pub bytes: Vec<u8>,
}

/// Transport that keeps everything it sends in memory
///
/// Useful for local simulation and tests: the host moves the queued
/// deliveries to the receiving side itself, optionally dropping some.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Vec<Delivery>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything sent since the last call
    pub fn take_sent(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.sent)
    }

    /// Deliveries queued so far
    pub fn sent(&self) -> &[Delivery] {
        &self.sent
    }
}

impl Transport for MemoryTransport {
    type Error = Infallible;

    fn send(
        &mut self,
        data: &[u8],
        channel: Channel,
        connection: ConnectionId,
    ) -> Result<(), Self::Error> {
        self.sent.push(Delivery {
            connection,
            channel,
            bytes: data.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_transport_queues() {
        let mut transport = MemoryTransport::new();
        transport.send(&[1, 2], Channel::Unreliable, ConnectionId(4)).unwrap();
        transport.send(&[3], Channel::Reliable, ConnectionId(5)).unwrap();
        assert_eq!(transport.sent().len(), 2);

        let sent = transport.take_sent();
        assert_eq!(sent[0].connection, ConnectionId(4));
        assert_eq!(sent[1].bytes, vec![3]);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_send_through_reference() {
        fn send_one(mut transport: impl Transport) {
            let _ = transport.send(&[7], Channel::Unreliable, ConnectionId(1));
        }
        let mut transport = MemoryTransport::new();
        send_one(&mut transport);
        assert_eq!(transport.sent().len(), 1);
    }
}
