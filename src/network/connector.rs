//! Bounded outbound TCP connect
//!
//! Opens a socket in non-blocking mode, issues `connect`, and waits for
//! writability for at most the configured timeout. On success the caller
//! receives a connected stream that is back in blocking mode.
//!
//! The descriptor is owned by a `socket2::Socket` until it is handed over,
//! so every failure path closes it exactly once on drop.

use crate::network::service::ServiceAddr;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::AsFd;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Constants
// =============================================================================

/// Default connect timeout (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Longest single readiness wait while a cancellation token is attached
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(50);

// =============================================================================
// Errors
// =============================================================================

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Only IPv4 targets are supported: {0}")]
    UnsupportedFamily(ServiceAddr),
    #[error("Failed to create socket: {0}")]
    SocketCreateFailed(#[source] io::Error),
    #[error("Failed to configure socket: {0}")]
    SocketConfigureFailed(#[source] io::Error),
    #[error("Connection to {target} timed out after {timeout:?}")]
    ConnectTimedOut { target: ServiceAddr, timeout: Duration },
    #[error("Connection to {target} failed: {source}")]
    ConnectFailed {
        target: ServiceAddr,
        #[source]
        source: io::Error,
    },
    #[error("Connection attempt cancelled")]
    Cancelled,
}

// =============================================================================
// Options
// =============================================================================

/// Per-call connect options
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Upper bound on the whole connect
    pub timeout: Duration,
    /// Aborts the readiness wait early when cancelled
    pub cancel: Option<CancellationToken>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CONNECT_TIMEOUT,
            cancel: None,
        }
    }
}

impl ConnectOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Progress of a single connect attempt (logged at trace level)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    Created,
    NonBlockingConfigured,
    ConnectIssued,
    Immediate,
    Pending,
    Ready,
    TimedOut,
    Failed,
    BlockingRestored,
}

// =============================================================================
// Connect
// =============================================================================

/// Connect to an IPv4 target within `timeout`
pub fn connect(target: &ServiceAddr, timeout: Duration) -> Result<TcpStream, ConnectError> {
    connect_with(target, &ConnectOptions::with_timeout(timeout))
}

/// Connect to an IPv4 target using explicit options
pub fn connect_with(
    target: &ServiceAddr,
    options: &ConnectOptions,
) -> Result<TcpStream, ConnectError> {
    let Some(ip) = target.to_ipv4() else {
        return Err(ConnectError::UnsupportedFamily(*target));
    };
    let sockaddr = SockAddr::from(SocketAddr::from((ip, target.port())));
    let deadline = Instant::now() + options.timeout;

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .map_err(ConnectError::SocketCreateFailed)?;
    trace_state(target, ConnectState::Created);

    socket
        .set_nonblocking(true)
        .map_err(ConnectError::SocketConfigureFailed)?;
    trace_state(target, ConnectState::NonBlockingConfigured);

    let issued = socket.connect(&sockaddr);
    trace_state(target, ConnectState::ConnectIssued);

    match issued {
        Ok(()) => trace_state(target, ConnectState::Immediate),
        Err(e) if is_pending(&e) => {
            trace_state(target, ConnectState::Pending);
            wait_writable(&socket, target, deadline, options)?;
            trace_state(target, ConnectState::Ready);

            let pending = socket
                .take_error()
                .map_err(|e| failed(target, e))?;
            if let Some(e) = pending {
                return Err(failed(target, e));
            }
        }
        Err(e) => return Err(failed(target, e)),
    }

    socket
        .set_nonblocking(false)
        .map_err(ConnectError::SocketConfigureFailed)?;
    trace_state(target, ConnectState::BlockingRestored);

    log::debug!("Connected to {}", target);
    Ok(socket.into())
}

/// Async wrapper around [`connect_with`], run on the blocking pool
///
/// The returned stream is non-blocking again, as tokio requires.
pub async fn connect_async(
    target: ServiceAddr,
    options: ConnectOptions,
) -> Result<tokio::net::TcpStream, ConnectError> {
    let stream = tokio::task::spawn_blocking(move || connect_with(&target, &options))
        .await
        .map_err(|e| failed(&target, io::Error::other(e)))??;

    stream
        .set_nonblocking(true)
        .map_err(ConnectError::SocketConfigureFailed)?;
    tokio::net::TcpStream::from_std(stream).map_err(ConnectError::SocketConfigureFailed)
}

// =============================================================================
// Private helpers
// =============================================================================

/// Wait until the socket is writable, the deadline passes, or the attempt
/// is cancelled
fn wait_writable(
    socket: &Socket,
    target: &ServiceAddr,
    deadline: Instant,
    options: &ConnectOptions,
) -> Result<(), ConnectError> {
    loop {
        if options.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            trace_state(target, ConnectState::Failed);
            return Err(ConnectError::Cancelled);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out(target, options.timeout));
        }

        let slice = match options.cancel {
            Some(_) => remaining.min(CANCEL_CHECK_INTERVAL),
            None => remaining,
        };
        // Sub-millisecond remainders still wait; long waits are split up
        let slice_ms = slice.as_millis().clamp(1, u16::MAX as u128) as u16;
        let poll_timeout = PollTimeout::from(slice_ms);

        let mut fds = [PollFd::new(socket.as_fd(), PollFlags::POLLOUT)];
        match poll(&mut fds, poll_timeout) {
            Ok(0) => continue,
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(errno) => {
                trace_state(target, ConnectState::Failed);
                return Err(failed(target, io::Error::from(errno)));
            }
        }
    }
}

/// "In progress" and "would block" both mean the connect is still pending
fn is_pending(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error() == Some(Errno::EINPROGRESS as i32)
}

fn failed(target: &ServiceAddr, source: io::Error) -> ConnectError {
    log::debug!("Connect to {} failed: {}", target, source);
    ConnectError::ConnectFailed {
        target: *target,
        source,
    }
}

fn timed_out(target: &ServiceAddr, timeout: Duration) -> ConnectError {
    trace_state(target, ConnectState::TimedOut);
    log::debug!("Connect to {} timed out after {:?}", target, timeout);
    ConnectError::ConnectTimedOut {
        target: *target,
        timeout,
    }
}

fn trace_state(target: &ServiceAddr, state: ConnectState) {
    log::trace!("connect {}: {:?}", target, state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::fcntl::{fcntl, FcntlArg, OFlag};
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn local_listener() -> (TcpListener, ServiceAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = ServiceAddr::from(listener.local_addr().unwrap());
        (listener, addr)
    }

    /// A listener whose accept queue is full, so further SYNs go unanswered
    ///
    /// Returns the streams that filled the queue; they must stay open.
    #[cfg(target_os = "linux")]
    fn saturated_listener() -> (Socket, Vec<TcpStream>, ServiceAddr) {
        let listener = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).unwrap();
        let bind_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        listener.bind(&bind_addr.into()).unwrap();
        listener.listen(0).unwrap();
        let local = listener.local_addr().unwrap().as_socket().unwrap();

        let mut backlog = Vec::new();
        for _ in 0..16 {
            match TcpStream::connect_timeout(&local, Duration::from_millis(100)) {
                Ok(stream) => backlog.push(stream),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    return (listener, backlog, ServiceAddr::from(local));
                }
                Err(e) => panic!("unexpected error filling backlog: {}", e),
            }
        }
        panic!("accept queue never filled");
    }

    fn is_nonblocking(stream: &TcpStream) -> bool {
        let flags = fcntl(stream, FcntlArg::F_GETFL).unwrap();
        OFlag::from_bits_truncate(flags).contains(OFlag::O_NONBLOCK)
    }

    #[test]
    fn test_connect_loopback() {
        let (listener, target) = local_listener();

        let mut stream = connect(&target, Duration::from_secs(2)).unwrap();
        let (mut accepted, _) = listener.accept().unwrap();
        assert!(!is_nonblocking(&stream));

        stream.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        accepted.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        accepted.write_all(b"pong").unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn test_connect_refused() {
        let (listener, target) = local_listener();
        drop(listener);

        let start = Instant::now();
        let result = connect(&target, Duration::from_secs(5));
        assert!(matches!(result, Err(ConnectError::ConnectFailed { .. })));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_connect_timeout() {
        let (_listener, _backlog, target) = saturated_listener();

        let start = Instant::now();
        let result = connect(&target, Duration::from_millis(200));
        let elapsed = start.elapsed();

        match result {
            Err(ConnectError::ConnectTimedOut { target: t, timeout }) => {
                assert_eq!(t, target);
                assert_eq!(timeout, Duration::from_millis(200));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(elapsed >= Duration::from_millis(150), "took {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(400), "took {:?}", elapsed);
    }

    #[test]
    fn test_ipv6_rejected() {
        let target = ServiceAddr::new("::1".parse().unwrap(), 8333);
        assert!(matches!(
            connect(&target, Duration::from_millis(100)),
            Err(ConnectError::UnsupportedFamily(_))
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_cancelled_before_wait() {
        let (_listener, _backlog, target) = saturated_listener();
        let token = CancellationToken::new();
        token.cancel();
        let options = ConnectOptions::with_timeout(Duration::from_secs(5)).cancel_on(token);

        let start = Instant::now();
        let result = connect_with(&target, &options);
        assert!(matches!(result, Err(ConnectError::Cancelled)), "{:?}", result);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_cancelled_during_wait() {
        let (_listener, _backlog, target) = saturated_listener();
        let token = CancellationToken::new();
        let options = ConnectOptions::with_timeout(Duration::from_secs(5)).cancel_on(token.clone());

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            token.cancel();
        });

        let start = Instant::now();
        let result = connect_with(&target, &options);
        let elapsed = start.elapsed();
        canceller.join().unwrap();

        assert!(matches!(result, Err(ConnectError::Cancelled)), "{:?}", result);
        assert!(elapsed >= Duration::from_millis(90), "took {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(1), "took {:?}", elapsed);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failures_release_descriptors() {
        fn open_fds() -> usize {
            std::fs::read_dir("/proc/self/fd").unwrap().count()
        }

        let (_listener, _backlog, full) = saturated_listener();
        let (closed, refused) = local_listener();
        drop(closed);

        let token = CancellationToken::new();
        token.cancel();
        let cancelled = ConnectOptions::with_timeout(Duration::from_secs(5)).cancel_on(token);

        let before = open_fds();
        for _ in 0..32 {
            assert!(connect(&refused, Duration::from_secs(1)).is_err());
        }
        for _ in 0..16 {
            assert!(matches!(
                connect_with(&full, &cancelled),
                Err(ConnectError::Cancelled)
            ));
        }
        for _ in 0..16 {
            assert!(matches!(
                connect(&full, Duration::from_millis(20)),
                Err(ConnectError::ConnectTimedOut { .. })
            ));
        }
        let after = open_fds();

        // Other tests run concurrently in this process
        assert!(after < before + 8, "descriptors grew from {} to {}", before, after);
    }

    #[test]
    fn test_default_options() {
        let options = ConnectOptions::default();
        assert_eq!(options.timeout, Duration::from_millis(5000));
        assert!(options.cancel.is_none());
    }

    #[tokio::test]
    async fn test_connect_async() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = ServiceAddr::from(listener.local_addr().unwrap());

        let (stream, accepted) = tokio::join!(
            connect_async(target, ConnectOptions::with_timeout(Duration::from_secs(2))),
            listener.accept()
        );
        let stream = stream.unwrap();
        let (_, peer) = accepted.unwrap();
        assert_eq!(ServiceAddr::from(stream.local_addr().unwrap()), ServiceAddr::from(peer));
    }
}
