//! Listen address selection for the local OAuth redirect endpoint.
//!
//! The browser that completes the OAuth flow must be able to reach the callback, so when the
//! listener is bound to an unspecified address we pick the most externally meaningful
//! interface address to put in the redirect URI.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket};

/// A lazily bound local socket plus the address to advertise for it.
///
/// Once bound it is never rebound: the same listener (and port) is reused for every
/// authorization attempt of the session.
#[derive(Debug)]
pub(crate) struct ListenEndpoint {
    listen_addr: String,
    bound: Option<BoundEndpoint>,
}

#[derive(Debug, Clone)]
pub(crate) struct BoundEndpoint {
    pub(crate) listener: Arc<TcpListener>,
    pub(crate) effective_addr: SocketAddr,
}

impl BoundEndpoint {
    pub(crate) fn redirect_uri(&self) -> String {
        format!("http://{}/callback", self.effective_addr)
    }
}

impl ListenEndpoint {
    pub(crate) fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            bound: None,
        }
    }

    /// Binds the requested address on first use and returns the bound endpoint.
    ///
    /// Subsequent calls return the endpoint bound by the first successful call.
    pub(crate) async fn resolve(&mut self) -> Result<BoundEndpoint> {
        if let Some(bound) = &self.bound {
            return Ok(bound.clone());
        }

        let bind_error = |source: io::Error| Error::Bind {
            addr: self.listen_addr.clone(),
            source,
        };

        let requested = tokio::net::lookup_host(self.listen_addr.as_str())
            .await
            .map_err(bind_error)?
            .next()
            .ok_or_else(|| {
                bind_error(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    "address resolved to nothing",
                ))
            })?;

        let listener = bind_reusable(requested).map_err(bind_error)?;
        let local = listener.local_addr().map_err(bind_error)?;
        let effective_addr = if local.ip().is_unspecified() {
            SocketAddr::new(select_effective_ip(interface_addrs()), local.port())
        } else {
            local
        };
        tracing::debug!(%local, %effective_addr, "bound OAuth callback listener");

        let bound = BoundEndpoint {
            listener: Arc::new(listener),
            effective_addr,
        };
        self.bound = Some(bound.clone());
        Ok(bound)
    }
}

fn bind_reusable(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    socket.listen(1024)
}

/// One network interface as far as address selection cares.
#[derive(Debug, Clone)]
struct InterfaceAddrs {
    name: String,
    up: bool,
    addrs: Vec<IpAddr>,
}

impl From<netdev::Interface> for InterfaceAddrs {
    fn from(iface: netdev::Interface) -> Self {
        let v4 = iface.ipv4.iter().map(|net| IpAddr::V4(net.addr()));
        let v6 = iface.ipv6.iter().map(|net| IpAddr::V6(net.addr()));
        Self {
            up: iface.is_up(),
            addrs: v4.chain(v6).collect(),
            name: iface.name,
        }
    }
}

fn interface_addrs() -> Vec<IpAddr> {
    up_addrs(netdev::get_interfaces().into_iter().map(InterfaceAddrs::from))
}

/// Addresses of the interfaces that are up; a down interface may still hold an address
/// that nothing can reach.
fn up_addrs(interfaces: impl IntoIterator<Item = InterfaceAddrs>) -> Vec<IpAddr> {
    interfaces
        .into_iter()
        .filter(|iface| {
            if !iface.up {
                tracing::trace!(interface = %iface.name, "skipping interface that is down");
            }
            iface.up
        })
        .flat_map(|iface| iface.addrs)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Public,
    Private,
    Loopback,
}

fn bucket(ip: IpAddr) -> Bucket {
    if ip.is_loopback() {
        Bucket::Loopback
    } else if is_private(ip) {
        Bucket::Private
    } else {
        Bucket::Public
    }
}

/// RFC 1918 and IPv4 link-local, plus IPv6 unique-local (`fc00::/7`) and link-local
/// (`fe80::/10`) matched by prefix mask.
fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

fn is_global_unicast_v6(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(_) => false,
        IpAddr::V6(v6) => (v6.segments()[0] & 0xe000) == 0x2000,
    }
}

fn is_valid_candidate(ip: IpAddr) -> bool {
    !ip.is_loopback() && !ip.is_multicast() && !ip.is_unspecified()
}

/// IPv4 first, then global unicast IPv6, then everything else; ties broken by string form.
fn preference(a: &IpAddr, b: &IpAddr) -> Ordering {
    a.is_ipv6()
        .cmp(&b.is_ipv6())
        .then_with(|| is_global_unicast_v6(*b).cmp(&is_global_unicast_v6(*a)))
        .then_with(|| a.to_string().cmp(&b.to_string()))
}

/// Picks the address to advertise for a listener bound to an unspecified address.
///
/// Candidates are bucketed into public, private and loopback; the first valid address
/// scanning those buckets in that order wins. Falls back to `127.0.0.1`.
pub(crate) fn select_effective_ip(candidates: impl IntoIterator<Item = IpAddr>) -> IpAddr {
    let mut public = Vec::new();
    let mut private = Vec::new();
    let mut loopback = Vec::new();
    for ip in candidates {
        let ip = ip.to_canonical();
        match bucket(ip) {
            Bucket::Public => public.push(ip),
            Bucket::Private => private.push(ip),
            Bucket::Loopback => loopback.push(ip),
        }
    }

    for candidates in [&mut public, &mut private, &mut loopback] {
        candidates.sort_by(preference);
        if let Some(ip) = candidates.iter().copied().find(|ip| is_valid_candidate(*ip)) {
            return ip;
        }
    }

    IpAddr::V4(Ipv4Addr::LOCALHOST)
}
