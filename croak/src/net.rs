use core::fmt::Debug;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

/// Data that came from a network socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Addrd<T>(pub T, pub SocketAddr);

impl<T> Addrd<T> {
  /// Borrow the contents of this Addressed
  pub fn as_ref(&self) -> Addrd<&T> {
    Addrd(self.data(), self.addr())
  }

  /// Mutably borrow the contents of this Addressed
  pub fn as_mut(&mut self) -> Addrd<&mut T> {
    Addrd(&mut self.0, self.1)
  }

  /// Map the data contained in this Addressed
  pub fn map<R>(self, f: impl FnOnce(T) -> R) -> Addrd<R> {
    Addrd(f(self.0), self.1)
  }

  /// Map the data contained in this Addressed (with a copy of the address)
  pub fn map_with_addr<R>(self, f: impl FnOnce(T, SocketAddr) -> R) -> Addrd<R> {
    Addrd(f(self.0, self.1), self.1)
  }

  /// Borrow the contents of the addressed item
  pub fn data(&self) -> &T {
    &self.0
  }

  /// Mutably borrow the contents of the addressed item
  pub fn data_mut(&mut self) -> &mut T {
    &mut self.0
  }

  /// Copy the socket address for the data
  pub fn addr(&self) -> SocketAddr {
    self.1
  }

  /// Discard the socket address and get the data in this Addressed
  pub fn unwrap(self) -> T {
    self.0
  }
}

impl<T> AsMut<T> for Addrd<T> {
  fn as_mut(&mut self) -> &mut T {
    &mut self.0
  }
}

/// Identifies a session with a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SessionId(pub u64);

/// What we know about the connection to a peer.
///
/// For plain UDP a session is simply the remote address; reliable or
/// secure transports add capabilities, some of which are learned from
/// the peer's Capabilities and Settings Message (CSM).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Session {
  /// Distinguishes sessions with the same peer
  pub id: SessionId,
  /// The peer
  pub remote: SocketAddr,
  /// Does the transport guarantee delivery (e.g. TCP)?
  pub reliable: bool,
  /// Is the transport secured (e.g. DTLS)?
  pub secure: bool,
  /// Largest message the peer accepts, if it told us
  pub max_message_size: Option<usize>,
  /// Did the peer advertise support for BERT blocks?
  pub block_wise_transfer: bool,
}

impl Session {
  /// A plain UDP session with a peer
  pub fn udp(remote: SocketAddr) -> Self {
    Self { id: SessionId::default(),
           remote,
           reliable: false,
           secure: false,
           max_message_size: None,
           block_wise_transfer: false }
  }

  /// Should blocks for this peer be BERT blocks?
  pub fn bert(&self) -> bool {
    self.reliable && self.block_wise_transfer
  }
}

/// A CoAP transport
///
/// The endpoint pulls datagrams from it with [`Channel::recv`]
/// and pushes datagrams to it with [`Channel::send`].
pub trait Channel: Send + Sync + 'static {
  /// Type of error yielded by transport operations
  type Error: Debug;

  /// The address we are listening on
  fn local_addr(&self) -> Result<SocketAddr, Self::Error>;

  /// Send a datagram to a peer
  fn send(&self, session: &Session, msg: Addrd<&[u8]>) -> nb::Result<(), Self::Error>;

  /// Pull a datagram from the transport, if there is one
  fn recv(&self, buffer: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error>;

  /// The session a datagram from `remote` belongs to
  fn session(&self, remote: SocketAddr) -> Session {
    Session::udp(remote)
  }

  /// Begin accepting traffic
  fn start(&self) -> Result<(), Self::Error> {
    Ok(())
  }

  /// Stop accepting traffic
  fn stop(&self) -> Result<(), Self::Error> {
    Ok(())
  }

  /// The peer asked to end the session gracefully (Release signal)
  fn release(&self, session: &Session) {
    log::debug!("peer {} released session {:?}", session.remote, session.id);
  }

  /// The peer aborted the session (Abort signal)
  fn abort(&self, session: &Session) {
    log::debug!("peer {} aborted session {:?}", session.remote, session.id);
  }
}

/// A shared channel is a channel, so the application can keep
/// a handle to the transport it gave the endpoint.
impl<C: Channel> Channel for Arc<C> {
  type Error = C::Error;

  fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
    C::local_addr(self)
  }

  fn send(&self, session: &Session, msg: Addrd<&[u8]>) -> nb::Result<(), Self::Error> {
    C::send(self, session, msg)
  }

  fn recv(&self, buffer: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error> {
    C::recv(self, buffer)
  }

  fn session(&self, remote: SocketAddr) -> Session {
    C::session(self, remote)
  }

  fn start(&self) -> Result<(), Self::Error> {
    C::start(self)
  }

  fn stop(&self) -> Result<(), Self::Error> {
    C::stop(self)
  }

  fn release(&self, session: &Session) {
    C::release(self, session)
  }

  fn abort(&self, session: &Session) {
    C::abort(self, session)
  }
}

/// Convert an io::Result to nb::Result, mapping
/// `WouldBlock` to `nb::Error::WouldBlock`
pub(crate) fn io_to_nb<T>(res: io::Result<T>) -> nb::Result<T, io::Error> {
  match res {
    | Ok(t) => Ok(t),
    | Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(nb::Error::WouldBlock),
    | Err(e) => Err(nb::Error::Other(e)),
  }
}

/// A UDP socket is a channel.
///
/// Set it to nonblocking (`set_nonblocking(true)`) so that polling
/// the endpoint doesn't block when there is nothing to read.
impl Channel for UdpSocket {
  type Error = io::Error;

  fn local_addr(&self) -> Result<SocketAddr, io::Error> {
    UdpSocket::local_addr(self)
  }

  fn send(&self, _: &Session, msg: Addrd<&[u8]>) -> nb::Result<(), io::Error> {
    io_to_nb(self.send_to(msg.data(), msg.addr())).map(|_| ())
  }

  fn recv(&self, buffer: &mut [u8]) -> nb::Result<Addrd<usize>, io::Error> {
    io_to_nb(self.recv_from(buffer)).map(|(n, addr)| Addrd(n, addr))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn udp_socket_round_trip() {
    let a = UdpSocket::bind("127.0.0.1:0").unwrap();
    let b = UdpSocket::bind("127.0.0.1:0").unwrap();
    b.set_nonblocking(true).unwrap();

    let mut buf = [0u8; 8];
    assert!(matches!(Channel::recv(&b, &mut buf), Err(nb::Error::WouldBlock)));

    let to = Channel::local_addr(&b).unwrap();
    Channel::send(&a, &Session::udp(to), Addrd(&[1u8, 2, 3][..], to)).unwrap();

    let Addrd(n, from) = nb::block!({
                           match Channel::recv(&b, &mut buf) {
                             | Err(nb::Error::WouldBlock) => {
                               std::thread::yield_now();
                               Err(nb::Error::WouldBlock)
                             },
                             | other => other,
                           }
                         }).unwrap();
    assert_eq!(&buf[..n], &[1, 2, 3]);
    assert_eq!(from, Channel::local_addr(&a).unwrap());
  }

  #[test]
  fn addrd_map() {
    let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
    let a = Addrd(1u8, addr).map(|n| n + 1);
    assert_eq!(a, Addrd(2, addr));
    assert_eq!(a.as_ref().map(|n| *n * 2).unwrap(), 4);
  }
}
