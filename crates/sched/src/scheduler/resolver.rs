use std::collections::HashMap;
use std::io;

use tracing::debug;

/// All names a host is known by.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedHost {
    pub canonical: String,
    pub aliases: Vec<String>,
    /// Textual IP addresses.
    pub addresses: Vec<String>,
}

impl ResolvedHost {
    /// A host known only by its literal name.
    pub fn literal(host: &str) -> Self {
        Self {
            canonical: host.to_string(),
            aliases: Vec::new(),
            addresses: Vec::new(),
        }
    }

    /// Canonical name, then aliases, then addresses.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .chain(self.addresses.iter().map(String::as_str))
    }
}

/// Maps an offered host name to every name a task preference might use.
pub trait HostResolver: Send + Sync {
    fn resolve(&self, host: &str) -> io::Result<ResolvedHost>;
}

/// Resolves through the system resolver.
///
/// Addresses come from a forward lookup; canonical name and aliases come from
/// reverse lookups of those addresses.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn resolve(&self, host: &str) -> io::Result<ResolvedHost> {
        let ips = dns_lookup::lookup_host(host)?;

        let mut names: Vec<String> = Vec::new();
        for ip in &ips {
            match dns_lookup::lookup_addr(ip) {
                Ok(name) if !names.contains(&name) => names.push(name),
                Ok(_) => {}
                Err(e) => debug!(%ip, error = %e, "reverse lookup failed"),
            }
        }

        let mut addresses: Vec<String> = Vec::new();
        for ip in ips {
            let text = ip.to_string();
            if !addresses.contains(&text) {
                addresses.push(text);
            }
        }

        let mut names = names.into_iter();
        let canonical = names.next().unwrap_or_else(|| host.to_string());
        Ok(ResolvedHost {
            canonical,
            aliases: names.collect(),
            addresses,
        })
    }
}

/// In-memory alias table. Any name of a registered host resolves to the
/// whole entry; unknown names fail with `NotFound`.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    hosts: Vec<ResolvedHost>,
    by_name: HashMap<String, usize>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, canonical: &str, aliases: &[&str], addresses: &[&str]) -> Self {
        self.add_host(ResolvedHost {
            canonical: canonical.to_string(),
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
            addresses: addresses.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn add_host(&mut self, host: ResolvedHost) {
        let slot = self.hosts.len();
        for name in host.names() {
            self.by_name.insert(name.to_string(), slot);
        }
        self.hosts.push(host);
    }
}

impl HostResolver for StaticResolver {
    fn resolve(&self, host: &str) -> io::Result<ResolvedHost> {
        self.by_name
            .get(host)
            .map(|&slot| self.hosts[slot].clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown host {host}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_names() {
        let h = ResolvedHost::literal("node1");
        assert_eq!(h.names().collect::<Vec<_>>(), vec!["node1"]);
    }

    #[test]
    fn names_order() {
        let h = ResolvedHost {
            canonical: "node1.example.com".into(),
            aliases: vec!["node1".into()],
            addresses: vec!["10.0.0.1".into()],
        };
        assert_eq!(
            h.names().collect::<Vec<_>>(),
            vec!["node1.example.com", "node1", "10.0.0.1"]
        );
    }

    #[test]
    fn static_resolver_any_name_resolves_entry() {
        let r = StaticResolver::new().with_host("node1.example.com", &["node1"], &["10.0.0.1"]);
        for name in ["node1.example.com", "node1", "10.0.0.1"] {
            let h = r.resolve(name).unwrap();
            assert_eq!(h.canonical, "node1.example.com");
            assert_eq!(h.addresses, vec!["10.0.0.1".to_string()]);
        }
    }

    #[test]
    fn static_resolver_unknown_host() {
        let r = StaticResolver::new();
        let err = r.resolve("ghost").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn system_resolver_handles_ip_literal() {
        // IP literals resolve without touching the network.
        let h = SystemResolver.resolve("127.0.0.1").unwrap();
        assert!(h.addresses.iter().any(|a| a == "127.0.0.1"));
    }
}
