//! Listener set: bind every configured address up front, then serve.
//!
//! Binding happens before any serving starts, so a taken port or a bad
//! address aborts startup outright instead of leaving the server partially
//! bound. Every listener drives the same router; TLS-terminating listeners
//! get an opaque [`RustlsConfig`] the rest of the server never inspects.

use std::fmt;
use std::net::{IpAddr, SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::Context;
use axum::{Extension, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::task::JoinHandle;

use crate::shutdown::ShutdownCoordinator;

/// Request extension recording whether the receiving listener terminates
/// TLS. Drives the optional HTTPS redirect.
#[derive(Debug, Clone, Copy)]
pub struct TlsListener(pub bool);

/// One address/port binding with an optional opaque TLS context.
pub struct ListenerSpec {
    pub address: String,
    pub port: u16,
    pub tls: Option<RustlsConfig>,
}

impl fmt::Debug for ListenerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSpec")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct Bound {
    listener: StdTcpListener,
    tls: Option<RustlsConfig>,
    addr: SocketAddr,
}

/// All listeners, bound and ready to serve.
#[derive(Debug)]
pub struct ListenerSet {
    bound: Vec<Bound>,
}

impl ListenerSet {
    /// Bind every spec. Any failure is fatal: the server either owns all
    /// of its addresses or does not start at all.
    pub fn bind(specs: Vec<ListenerSpec>) -> anyhow::Result<Self> {
        let mut bound = Vec::new();
        for spec in specs {
            let ip: IpAddr = spec
                .address
                .parse()
                .with_context(|| format!("Invalid listener address '{}'", spec.address))?;
            let addr = SocketAddr::new(ip, spec.port);
            let listener = StdTcpListener::bind(addr)
                .with_context(|| format!("Failed to bind {}", addr))?;
            listener
                .set_nonblocking(true)
                .with_context(|| format!("Failed to configure listener on {}", addr))?;
            let addr = listener.local_addr().unwrap_or(addr);
            tracing::info!(
                "Listening on {}{}",
                addr,
                if spec.tls.is_some() { " [TLS]" } else { "" }
            );
            bound.push(Bound {
                listener,
                tls: spec.tls,
                addr,
            });
        }
        Ok(Self { bound })
    }

    /// Bound socket addresses, in spec order.
    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.bound.iter().map(|b| b.addr).collect()
    }

    /// Serve the router on every bound listener.
    ///
    /// Each listener registers its [`Handle`] with the coordinator so drain
    /// can observe live connections and force-close them at the deadline.
    pub fn serve(
        self,
        app: Router,
        coordinator: &Arc<ShutdownCoordinator>,
    ) -> Vec<JoinHandle<std::io::Result<()>>> {
        let mut tasks = Vec::new();
        for bound in self.bound {
            let handle = Handle::new();
            coordinator.register_listener(handle.clone());
            let app = app
                .clone()
                .layer(Extension(TlsListener(bound.tls.is_some())));
            let task = match bound.tls {
                Some(config) => tokio::spawn(async move {
                    axum_server::from_tcp_rustls(bound.listener, config)
                        .handle(handle)
                        .serve(app.into_make_service())
                        .await
                }),
                None => tokio::spawn(async move {
                    axum_server::from_tcp(bound.listener)
                        .handle(handle)
                        .serve(app.into_make_service())
                        .await
                }),
            };
            tasks.push(task);
        }
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral_port() {
        let set = ListenerSet::bind(vec![ListenerSpec {
            address: "127.0.0.1".to_string(),
            port: 0,
            tls: None,
        }])
        .unwrap();
        let addrs = set.addrs();
        assert_eq!(addrs.len(), 1);
        assert_ne!(addrs[0].port(), 0);
    }

    #[test]
    fn test_any_bind_failure_is_fatal() {
        let first = ListenerSet::bind(vec![ListenerSpec {
            address: "127.0.0.1".to_string(),
            port: 0,
            tls: None,
        }])
        .unwrap();
        let taken = first.addrs()[0].port();

        // Second spec collides with the first listener's port: the whole
        // bind fails even though the first spec is fine.
        let result = ListenerSet::bind(vec![
            ListenerSpec {
                address: "127.0.0.1".to_string(),
                port: 0,
                tls: None,
            },
            ListenerSpec {
                address: "127.0.0.1".to_string(),
                port: taken,
                tls: None,
            },
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_address_rejected() {
        let result = ListenerSet::bind(vec![ListenerSpec {
            address: "not-an-ip".to_string(),
            port: 8080,
            tls: None,
        }]);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid listener address"));
    }
}
