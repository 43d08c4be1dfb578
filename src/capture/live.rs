use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use super::CaptureSource;
use crate::error::CaptureError;
use crate::packet::Direction;
use crate::report;
use crate::stats::BandwidthStats;

/// Receive timeout; each expiry is a chance to check the deadline and flag
pub const RECV_TIMEOUT: Duration = Duration::from_millis(100);

const RECV_BUFFER_SIZE: usize = 1024 * 1024;
const MAX_DATAGRAM: usize = 65536;

/// Counts datagrams delivered to a UDP socket bound on the monitored port.
///
/// The socket only sees traffic addressed to it, so every datagram is
/// recorded as incoming.
pub struct LiveCapture {
    socket: UdpSocket,
    local_addr: SocketAddr,
    report_interval: Duration,
    running: Arc<AtomicBool>,
}

impl LiveCapture {
    /// Bind the receive socket. Failure here is fatal for the session.
    pub fn bind(
        bind_ip: IpAddr,
        port: u16,
        report_interval: Duration,
        running: Arc<AtomicBool>,
    ) -> Result<Self, CaptureError> {
        let socket = setup_udp_socket(SocketAddr::new(bind_ip, port))?;
        let local_addr = socket.local_addr()?;
        info!("Listening on UDP {}", local_addr);

        Ok(Self {
            socket,
            local_addr,
            report_interval,
            running,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl CaptureSource for LiveCapture {
    fn describe(&self) -> String {
        format!("UDP socket on {}", self.local_addr())
    }

    fn monitor(&mut self, duration: Duration) -> Result<BandwidthStats, CaptureError> {
        let mut stats = BandwidthStats::new();
        let mut buffer = vec![0u8; MAX_DATAGRAM];
        // A duration past the clock's range means "until stopped"
        let deadline = Instant::now().checked_add(duration);
        let mut last_report = Instant::now();

        while deadline.is_none_or(|deadline| Instant::now() < deadline) {
            if !self.running.load(Ordering::SeqCst) {
                info!("Monitoring stopped by user");
                break;
            }

            match self.socket.recv_from(&mut buffer) {
                Ok((size, src)) => {
                    debug!("Received {} bytes from {}", size, src);
                    stats.record(&buffer[..size], Direction::Incoming);
                }
                Err(e) if is_idle_wakeup(e.kind()) => {}
                Err(e) => {
                    warn!("Error receiving on {}: {}", self.local_addr, e);
                    thread::sleep(RECV_TIMEOUT);
                }
            }

            if last_report.elapsed() >= self.report_interval {
                info!("{}", report::progress_line(&stats));
                last_report = Instant::now();
            }
        }

        Ok(stats)
    }
}

/// Receive timeouts and signal interruptions are scheduling ticks, not errors
fn is_idle_wakeup(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

fn setup_udp_socket(addr: SocketAddr) -> Result<UdpSocket, CaptureError> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
        warn!("Failed to set large receive buffer for {}: {}", addr, e);
    }

    socket.bind(&addr.into()).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            CaptureError::PermissionDenied(format!("UDP {}", addr))
        } else {
            CaptureError::Bind {
                addr: addr.to_string(),
                source: e,
            }
        }
    })?;

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(RECV_TIMEOUT))?;
    Ok(socket)
}
