use crate::base::neterror::NetError;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Host name handed to a resolver. Compared case-insensitively.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Name(String);

impl Name {
    pub fn new(host: impl Into<String>) -> Self {
        let mut host = host.into();
        host.make_ascii_lowercase();
        Name(host)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(host: &str) -> Self {
        Name::new(host)
    }
}

impl From<String> for Name {
    fn from(host: String) -> Self {
        Name::new(host)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns a host into candidate addresses. Blocks the calling thread.
///
/// One resolver is shared by every engine a client creates. Returned
/// addresses may carry port 0; the route selector fills in the port.
pub trait Resolve: Send + Sync {
    fn resolve(&self, name: Name) -> Result<Vec<SocketAddr>, NetError>;
}

impl<R: Resolve + ?Sized> Resolve for Arc<R> {
    fn resolve(&self, name: Name) -> Result<Vec<SocketAddr>, NetError> {
        R::resolve(self, name)
    }
}

/// Answers pinned hosts from a fixed table and forwards the rest.
pub struct DnsResolverWithOverrides {
    inner: Arc<dyn Resolve>,
    pinned: HashMap<Name, Vec<SocketAddr>>,
}

impl DnsResolverWithOverrides {
    pub fn new<I, H>(inner: Arc<dyn Resolve>, pinned: I) -> Self
    where
        I: IntoIterator<Item = (H, Vec<SocketAddr>)>,
        H: Into<Name>,
    {
        let pinned = pinned
            .into_iter()
            .map(|(host, addrs)| (host.into(), addrs))
            .collect();
        Self { inner, pinned }
    }

    pub fn override_count(&self) -> usize {
        self.pinned.len()
    }
}

impl Resolve for DnsResolverWithOverrides {
    fn resolve(&self, name: Name) -> Result<Vec<SocketAddr>, NetError> {
        match self.pinned.get(&name) {
            Some(addrs) => {
                tracing::trace!(host = %name, count = addrs.len(), "pinned host");
                Ok(addrs.clone())
            }
            None => self.inner.resolve(name),
        }
    }
}

impl fmt::Debug for DnsResolverWithOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsResolverWithOverrides")
            .field("pinned", &self.pinned.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    struct Upstream;

    impl Resolve for Upstream {
        fn resolve(&self, _name: Name) -> Result<Vec<SocketAddr>, NetError> {
            Ok(vec![SocketAddr::from(([8, 8, 8, 8], 0))])
        }
    }

    #[test]
    fn test_name_is_case_insensitive() {
        assert_eq!(Name::new("Example.COM"), Name::from("example.com"));
        assert_eq!(Name::from(String::from("A.b")).to_string(), "a.b");
    }

    #[test]
    fn test_pinned_host_answers_locally() {
        let resolver = DnsResolverWithOverrides::new(
            Arc::new(Upstream),
            [("Service.Test", vec![SocketAddr::from(([127, 0, 0, 1], 0))])],
        );
        assert_eq!(resolver.override_count(), 1);

        let addrs = resolver.resolve(Name::new("service.test")).unwrap();
        assert_eq!(addrs[0].ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_unpinned_host_goes_upstream() {
        let resolver =
            DnsResolverWithOverrides::new(Arc::new(Upstream), Vec::<(Name, Vec<SocketAddr>)>::new());
        let addrs = resolver.resolve(Name::new("elsewhere.test")).unwrap();
        assert_eq!(addrs[0].ip(), IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)));
    }
}
