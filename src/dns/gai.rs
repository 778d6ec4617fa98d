use super::{Name, Resolve};
use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

/// Resolver backed by the system's getaddrinfo.
///
/// Honors /etc/hosts and the system resolver configuration. IP literals,
/// bracketed or not, are answered without a lookup.
#[derive(Clone, Copy, Debug, Default)]
pub struct GaiResolver;

impl GaiResolver {
    pub fn new() -> Self {
        GaiResolver
    }
}

impl Resolve for GaiResolver {
    fn resolve(&self, name: Name) -> Result<Vec<SocketAddr>, NetError> {
        if let Some(ip) = ip_literal(name.as_str()) {
            return Ok(vec![SocketAddr::new(ip, 0)]);
        }

        let addrs: Vec<SocketAddr> = (name.as_str(), 0)
            .to_socket_addrs()
            .dns_context(name.as_str())?
            .collect();
        if addrs.is_empty() {
            return Err(NetError::NameNotResolved);
        }

        tracing::debug!(host = %name, count = addrs.len(), "resolved");
        Ok(family_first(addrs))
    }
}

fn ip_literal(host: &str) -> Option<IpAddr> {
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    bare.parse().ok()
}

/// Group addresses by the family getaddrinfo preferred, keeping its order
/// within each family, so a dead family is only tried after the other.
fn family_first(addrs: Vec<SocketAddr>) -> Vec<SocketAddr> {
    let v6_first = addrs.first().is_some_and(SocketAddr::is_ipv6);
    let (mut ordered, rest): (Vec<_>, Vec<_>) =
        addrs.into_iter().partition(|a| a.is_ipv6() == v6_first);
    ordered.extend(rest);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_literals_skip_lookup() {
        assert_eq!(ip_literal("10.0.0.1"), Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        assert_eq!(ip_literal("[::1]"), Some(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert_eq!(ip_literal("::1"), Some(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert_eq!(ip_literal("example.com"), None);

        let addrs = GaiResolver::new().resolve(Name::new("127.0.0.1")).unwrap();
        assert_eq!(addrs, [SocketAddr::from(([127, 0, 0, 1], 0))]);
    }

    #[test]
    fn test_family_first_keeps_relative_order() {
        let a = SocketAddr::from(([1, 1, 1, 1], 0));
        let b = SocketAddr::from((Ipv6Addr::LOCALHOST, 0));
        let c = SocketAddr::from(([2, 2, 2, 2], 0));
        assert_eq!(family_first(vec![a, b, c]), [a, c, b]);
        assert_eq!(family_first(vec![b, a, c]), [b, a, c]);
    }

    #[test]
    fn test_localhost_resolves() {
        let addrs = GaiResolver::new().resolve(Name::new("localhost")).unwrap();
        assert!(!addrs.is_empty());
    }
}
