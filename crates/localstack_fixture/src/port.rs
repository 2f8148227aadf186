//! Host port selection.

use std::net::{Ipv4Addr, SocketAddr, TcpListener};

use crate::errors::{Error, Result};

#[cfg(test)]
#[path = "port_tests.rs"]
mod tests;

/// Reserve an ephemeral port on the loopback interface and release it.
///
/// The port has to be known before the container is created because the
/// host side of the binding is declared up front. Another process can grab
/// the port between this call and container start; the runtime then fails
/// the start and the error propagates.
pub fn free_tcp_port() -> Result<u16> {
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .map_err(Error::PortSelection)?;
    let port = listener
        .local_addr()
        .map_err(Error::PortSelection)?
        .port();
    drop(listener);

    tracing::debug!(port = port, "Selected free host port");
    Ok(port)
}
