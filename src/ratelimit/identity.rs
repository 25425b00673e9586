//! Client identity resolution.

use std::fmt;

/// Header carrying the proxy chain, left-most entry being the original client.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
/// Header set by reverse proxies with the peer address.
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Address used when a request carries neither address header.
const UNKNOWN_ADDRESS: &str = "unknown";

/// The key attempts are counted against.
///
/// Either `user:<id>` for an authenticated caller or `ip:<address>` for an
/// anonymous one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Identity of an authenticated user.
    pub fn user(identifier: &str) -> Self {
        Self(format!("user:{}", identifier))
    }

    /// Identity of an anonymous client seen at `address`.
    pub fn ip(address: &str) -> Self {
        Self(format!("ip:{}", address))
    }

    /// Resolve the identity for a request.
    ///
    /// An explicit identifier always wins; otherwise the first address of the
    /// forwarded-for chain, then the real-ip header, then `ip:unknown`.
    pub fn resolve(context: &RequestContext, identifier: Option<&str>) -> Self {
        match identifier.filter(|id| !id.is_empty()) {
            Some(id) => Self::user(id),
            None => Self::ip(context.client_address()),
        }
    }

    /// The identity as a string key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The parts of an incoming request the limiter reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Raw `x-forwarded-for` value, possibly a comma separated chain.
    pub forwarded_for: Option<String>,
    /// Raw `x-real-ip` value.
    pub real_ip: Option<String>,
}

impl RequestContext {
    /// An empty context; resolves to `ip:unknown`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forwarded_for(mut self, value: impl Into<String>) -> Self {
        self.forwarded_for = Some(value.into());
        self
    }

    pub fn with_real_ip(mut self, value: impl Into<String>) -> Self {
        self.real_ip = Some(value.into());
        self
    }

    /// Build a context from request headers.
    ///
    /// Header names are matched case-insensitively; the first occurrence of
    /// each header wins.
    pub fn from_headers<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut context = Self::default();
        for (name, value) in headers {
            let name = name.as_ref();
            if name.eq_ignore_ascii_case(FORWARDED_FOR_HEADER) && context.forwarded_for.is_none() {
                context.forwarded_for = Some(value.as_ref().to_string());
            } else if name.eq_ignore_ascii_case(REAL_IP_HEADER) && context.real_ip.is_none() {
                context.real_ip = Some(value.as_ref().to_string());
            }
        }
        context
    }

    /// The address the request is attributed to.
    ///
    /// A header whose first chain entry is blank is treated as absent.
    pub fn client_address(&self) -> &str {
        first_address(self.forwarded_for.as_deref())
            .or_else(|| first_address(self.real_ip.as_deref()))
            .unwrap_or(UNKNOWN_ADDRESS)
    }
}

/// The original client of a proxy chain, if the header names one.
fn first_address(value: Option<&str>) -> Option<&str> {
    value
        .and_then(|raw| raw.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
}
