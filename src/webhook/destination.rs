//! Webhook destination validation. Everything here fails closed: a URL is
//! only accepted once every check has positively passed.

use async_trait::async_trait;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use url::{Host, Url};

use super::WebhookError;

/// A destination that passed validation, together with the addresses that
/// were checked. Delivery must connect to these and nothing else.
#[derive(Debug, Clone)]
pub struct ValidatedTarget {
    pub url: Url,
    pub host: String,
    pub addrs: Vec<SocketAddr>,
}

#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>>;
}

/// Resolves through the operating system's resolver.
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        Ok(tokio::net::lookup_host((host, port)).await?.collect())
    }
}

fn rejected(url: &str, reason: impl Into<String>) -> WebhookError {
    WebhookError::DestinationRejected {
        url: url.to_string(),
        reason: reason.into(),
    }
}

pub async fn validate_destination(
    raw: &str,
    allowed_hosts: Option<&HashSet<String>>,
    resolver: &dyn HostResolver,
) -> Result<ValidatedTarget, WebhookError> {
    let url = Url::parse(raw).map_err(|_| rejected(raw, "Invalid webhookUrl"))?;

    if url.scheme() != "https" {
        return Err(rejected(raw, "webhookUrl must use https"));
    }

    let host = match url.host_str() {
        Some(h) if !h.is_empty() => h.to_lowercase(),
        _ => return Err(rejected(raw, "webhookUrl hostname is required")),
    };

    if let Some(allowed) = allowed_hosts {
        if !allowed.contains(&host) {
            return Err(rejected(raw, "webhookUrl host is not in allowlist"));
        }
    }

    let is_ip_literal = match url.host() {
        Some(Host::Domain(d)) => d.parse::<IpAddr>().is_ok(),
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => true,
        None => true,
    };
    if is_ip_literal {
        return Err(rejected(
            raw,
            "IP literal webhookUrl hosts are not allowed",
        ));
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let addrs = resolver
        .resolve(&host, port)
        .await
        .map_err(|e| rejected(raw, format!("Failed to resolve webhook host: {}", e)))?;

    if addrs.is_empty() {
        return Err(rejected(raw, "webhook host did not resolve to any address"));
    }
    if addrs.iter().any(|a| is_blocked_ip(a.ip())) {
        return Err(rejected(raw, "webhookUrl resolves to a private IP"));
    }

    Ok(ValidatedTarget { url, host, addrs })
}

/// True for any address a webhook must never reach.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => is_blocked_v6(v6),
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    a == 0
        || a == 10
        || a == 127
        || a >= 224 // multicast, reserved, broadcast
        || (a == 100 && (64..=127).contains(&b)) // carrier-grade NAT
        || (a == 169 && b == 254)
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 168)
        || (a == 192 && b == 0 && (c == 0 || c == 2))
        || (a == 192 && b == 88 && c == 99)
        || (a == 198 && (b == 18 || b == 19))
        || (a == 198 && b == 51 && c == 100)
        || (a == 203 && b == 0 && c == 113)
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_v4(v4);
    }

    let seg = ip.segments();

    // NAT64 well-known prefix carries an IPv4 address in the low 32 bits.
    if seg[..6] == [0x64, 0xff9b, 0, 0, 0, 0] {
        let [a, b] = seg[6].to_be_bytes();
        let [c, d] = seg[7].to_be_bytes();
        return is_blocked_v4(Ipv4Addr::new(a, b, c, d));
    }

    // Only global unicast (2000::/3) is routable; this also covers ::, ::1,
    // fc00::/7, fe80::/10 and ff00::/8.
    if seg[0] & 0xe000 != 0x2000 {
        return true;
    }

    (seg[0] == 0x2001 && seg[1] < 0x0200) // 2001::/23 protocol assignments, Teredo
        || (seg[0] == 0x2001 && seg[1] == 0x0db8) // documentation
        || seg[0] == 0x2002 // 6to4
}
