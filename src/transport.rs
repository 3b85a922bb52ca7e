//! UDP transport between remote and vehicle.
//!
//! Datagrams may be lost, duplicated or reordered; nothing here retries.
//! A bad payload only means "no fresh state" and is left to the watchdog.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::codec::{self, Datagram, KEEPALIVE, MAX_DATAGRAM};
use crate::inbox::StateInbox;
use crate::state::ControlState;

pub struct Subscriber {
    socket: UdpSocket,
}

impl Subscriber {
    pub fn bind(addr: impl ToSocketAddrs, receive_timeout: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(receive_timeout.max(Duration::from_millis(1))))?;
        Ok(Subscriber { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// One receive attempt. `None` on timeout, keepalive or bad payload.
    pub fn receive(&self, buf: &mut [u8]) -> Option<ControlState> {
        let (len, from) = match self.socket.recv_from(buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return None;
            }
            Err(e) => {
                warn!("receive failed: {}", e);
                return None;
            }
        };

        match codec::decode(&buf[..len]) {
            Ok(Datagram::State(state)) => Some(state),
            Ok(Datagram::Keepalive) => {
                trace!("keepalive from {}", from);
                None
            }
            Err(e) => {
                warn!("dropped payload from {}: {}", from, e);
                None
            }
        }
    }

    /// Pushes every decoded state into `inbox` until the inbox is closed.
    pub fn run(&self, inbox: &StateInbox) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        while !inbox.is_closed() {
            if let Some(state) = self.receive(&mut buf) {
                inbox.push(state);
            }
        }
        debug!("subscriber exiting");
    }
}

pub fn subscriber_thread(subscriber: Subscriber, inbox: Arc<StateInbox>) -> io::Result<JoinHandle<()>> {
    if let Ok(addr) = subscriber.local_addr() {
        info!("listening for control states on {}", addr);
    }
    thread::Builder::new()
        .name(String::from("subscriber"))
        .spawn(move || subscriber.run(&inbox))
}

pub struct Publisher {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Publisher {
    pub fn connect(target: impl ToSocketAddrs) -> io::Result<Self> {
        let target = target
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no address for vehicle"))?;
        let bind: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind)?;
        Ok(Publisher { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send errors are logged and otherwise ignored.
    pub fn send(&self, state: &ControlState) {
        match codec::encode(state) {
            Ok(bytes) => self.send_bytes(&bytes),
            Err(e) => warn!("state not sent: {}", e),
        }
    }

    pub fn send_keepalive(&self) {
        self.send_bytes(KEEPALIVE);
    }

    fn send_bytes(&self, bytes: &[u8]) {
        if let Err(e) = self.socket.send_to(bytes, self.target) {
            debug!("send to {} failed: {}", self.target, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> (Subscriber, Publisher) {
        let subscriber = Subscriber::bind("127.0.0.1:0", Duration::from_millis(500)).unwrap();
        let publisher = Publisher::connect(subscriber.local_addr().unwrap()).unwrap();
        (subscriber, publisher)
    }

    #[test]
    fn state_crosses_loopback() {
        let (subscriber, publisher) = loopback();
        let state = ControlState::new(0.13, 0.0, 1.0);
        publisher.send(&state);

        let mut buf = vec![0u8; MAX_DATAGRAM];
        assert_eq!(subscriber.receive(&mut buf), Some(state));
    }

    #[test]
    fn keepalive_and_garbage_are_not_states() {
        let (subscriber, publisher) = loopback();
        let mut buf = vec![0u8; MAX_DATAGRAM];

        publisher.send_keepalive();
        assert_eq!(subscriber.receive(&mut buf), None);

        publisher.send_bytes(b"__import__('os')");
        assert_eq!(subscriber.receive(&mut buf), None);
    }

    #[test]
    fn receive_times_out() {
        let subscriber = Subscriber::bind("127.0.0.1:0", Duration::from_millis(10)).unwrap();
        let mut buf = vec![0u8; 64];
        assert_eq!(subscriber.receive(&mut buf), None);
    }
}
