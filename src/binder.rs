//! Listening-socket acquisition with port fallback.

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::TcpListener;
use tracing::warn;

use crate::error::{ServerError, ServerResult};

/// Bind `host:requested`, moving to the next port while the current one is
/// in use. Ports listed in `reserved` are skipped without an attempt.
///
/// Only `AddrInUse` triggers a retry; every other bind error is returned
/// immediately. Returns the listener together with the port actually bound.
pub async fn bind_with_fallback(
    host: IpAddr,
    requested: u16,
    reserved: &[u16],
    max_retries: u16,
) -> ServerResult<(TcpListener, u16)> {
    let mut port = requested;
    let mut retries = 0u16;

    loop {
        if !reserved.contains(&port) {
            match TcpListener::bind(SocketAddr::new(host, port)).await {
                Ok(listener) => {
                    let bound = listener.local_addr()?.port();
                    return Ok((listener, bound));
                }
                Err(e) if e.kind() == ErrorKind::AddrInUse => {
                    if retries >= max_retries {
                        return Err(ServerError::PortExhausted {
                            first: requested,
                            last: port,
                        });
                    }
                    retries += 1;
                    warn!("Port {} is busy, trying {}...", port, port.wrapping_add(1));
                }
                Err(source) => return Err(ServerError::Bind { port, source }),
            }
        }

        port = match port.checked_add(1) {
            Some(next) => next,
            None => {
                return Err(ServerError::PortExhausted {
                    first: requested,
                    last: port,
                })
            }
        };
    }
}

/// Find a port nobody is listening on, starting at `first`.
///
/// The answer is only a snapshot: another process may take the port before
/// the caller uses it.
pub fn probe_free_port(first: u16, attempts: u16) -> Result<u16, (u16, u16)> {
    let mut last = first;
    for offset in 0..attempts {
        let Some(port) = first.checked_add(offset) else {
            break;
        };
        last = port;
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        if std::net::TcpListener::bind(addr).is_ok() {
            return Ok(port);
        }
    }
    Err((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn binds_requested_port_when_free() {
        let (probe, port) = bind_with_fallback(LOCALHOST, 0, &[], 0).await.unwrap();
        drop(probe);
        let (_listener, bound) = bind_with_fallback(LOCALHOST, port, &[], 0).await.unwrap();
        assert_eq!(bound, port);
    }

    #[tokio::test]
    async fn falls_back_when_port_is_taken() {
        let (_first, port) = bind_with_fallback(LOCALHOST, 0, &[], 0).await.unwrap();
        let (_second, bound) = bind_with_fallback(LOCALHOST, port, &[], 100)
            .await
            .unwrap();
        assert_ne!(bound, port);
        assert!(bound > port);
    }

    #[tokio::test]
    async fn reserved_port_is_skipped() {
        let (probe, port) = bind_with_fallback(LOCALHOST, 0, &[], 0).await.unwrap();
        drop(probe);
        let (_listener, bound) = bind_with_fallback(LOCALHOST, port, &[port], 100)
            .await
            .unwrap();
        assert_ne!(bound, port);
    }

    #[tokio::test]
    async fn exhausting_retries_reports_range() {
        let (_first, port) = bind_with_fallback(LOCALHOST, 0, &[], 0).await.unwrap();
        let err = bind_with_fallback(LOCALHOST, port, &[], 0).await.unwrap_err();
        match err {
            ServerError::PortExhausted { first, last } => {
                assert_eq!(first, port);
                assert_eq!(last, port);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn probe_skips_busy_port() {
        // Hold a port whose upper neighbour is free.
        let (_busy, port) = loop {
            let busy = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
            let port = busy.local_addr().unwrap().port();
            if port < u16::MAX && std::net::TcpListener::bind(("0.0.0.0", port + 1)).is_ok() {
                break (busy, port);
            }
        };
        assert_eq!(probe_free_port(port, 2), Ok(port + 1));
    }

    #[test]
    fn probe_with_no_attempts_fails() {
        assert_eq!(probe_free_port(40000, 0), Err((40000, 40000)));
    }
}
