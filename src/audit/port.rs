use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::config::PORT_CHECK_INTERVAL_MS;

/// Check if something is accepting connections on a loopback port.
pub fn is_port_in_use(port: u16) -> bool {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
    let socket = match socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    ) {
        Ok(s) => s,
        Err(_) => return false,
    };

    socket
        .connect_timeout(&addr.into(), Duration::from_millis(200))
        .is_ok()
}

/// Ask the OS for a currently unused loopback port.
pub fn pick_free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

/// Wait for a port to start accepting connections.
/// Returns true if it did within the timeout.
pub async fn wait_for_port(port: u16, deadline: Duration) -> bool {
    let interval = Duration::from_millis(PORT_CHECK_INTERVAL_MS);

    let result = timeout(deadline, async {
        loop {
            if is_port_in_use(port) {
                debug!("Port {} is now in use", port);
                return true;
            }
            sleep(interval).await;
        }
    })
    .await;

    result.unwrap_or(false)
}
