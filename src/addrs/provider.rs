use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::constants::{
    BUILTIN_PROVIDER_HOST, BUILTIN_PROVIDER_NAMESPACE, DEFAULT_REGISTRY_HOST,
    LEGACY_PROVIDER_NAMESPACE,
};

/// Errors produced while parsing provider addresses and their parts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddrError {
    #[error("invalid provider source string {given:?}: must be in the format \"[hostname/][namespace/]type\"")]
    InvalidSourceString {
        given: String,
    },

    #[error("invalid provider {part} {given:?}: {reason}")]
    InvalidPart {
        part: &'static str,
        given: String,
        reason: String,
    },

    #[error("invalid provider source hostname {given:?}: {reason}")]
    InvalidHostname {
        given: String,
        reason: String,
    },

    #[error("the legacy provider namespace \"-\" can be used only with hostname {DEFAULT_REGISTRY_HOST}")]
    LegacyNamespaceOnWrongHost,
}

/// A registry hostname normalized for comparison.
///
/// Hostnames are case-folded to ASCII lowercase and may carry an explicit
/// port. Two `Hostname` values are equal exactly when they refer to the same
/// service host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hostname(String);

impl Hostname {
    /// Normalize a user-supplied hostname.
    pub fn parse(given: &str) -> Result<Self, AddrError> {
        let invalid = |reason: &str| AddrError::InvalidHostname {
            given: given.to_string(),
            reason: reason.to_string(),
        };

        if given.is_empty() {
            return Err(invalid("must not be empty"));
        }
        if !given.is_ascii() {
            return Err(invalid("internationalized hostnames must be given in punycode form"));
        }

        let lower = given.to_ascii_lowercase();
        let (host, port) = match lower.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (lower.as_str(), None),
        };

        if let Some(port) = port {
            match port.parse::<u16>() {
                Ok(0) | Err(_) => return Err(invalid("port must be a number between 1 and 65535")),
                Ok(_) => {}
            }
        }

        for label in host.split('.') {
            if label.is_empty() {
                return Err(invalid("must not contain empty labels"));
            }
            if label.starts_with('-') || label.ends_with('-') {
                return Err(invalid("labels may not start or end with a dash"));
            }
            if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(invalid("labels may contain only letters, digits, and dashes"));
            }
        }

        Ok(Self(lower))
    }

    /// The default public registry host.
    #[must_use]
    pub fn default_registry() -> Self {
        Self(DEFAULT_REGISTRY_HOST.to_string())
    }

    /// The host that owns built-in providers.
    #[must_use]
    pub fn builtin() -> Self {
        Self(BUILTIN_PROVIDER_HOST.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_default_registry(&self) -> bool {
        self.0 == DEFAULT_REGISTRY_HOST
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical address of a provider.
///
/// Ordering compares hostname, then namespace, then type. That ordering is
/// what the lock file uses to sort its provider blocks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Provider {
    pub hostname: Hostname,
    pub namespace: String,
    pub type_name: String,
}

impl Provider {
    /// Build an address from already-validated parts, normalizing namespace
    /// and type.
    pub fn new(hostname: Hostname, namespace: &str, type_name: &str) -> Result<Self, AddrError> {
        if namespace == LEGACY_PROVIDER_NAMESPACE {
            return Err(AddrError::InvalidPart {
                part: "namespace",
                given: namespace.to_string(),
                reason: "the legacy namespace is reserved for legacy addresses".to_string(),
            });
        }
        Ok(Self {
            hostname,
            namespace: parse_provider_part(namespace).map_err(|reason| AddrError::InvalidPart {
                part: "namespace",
                given: namespace.to_string(),
                reason,
            })?,
            type_name: parse_provider_part(type_name).map_err(|reason| AddrError::InvalidPart {
                part: "type",
                given: type_name.to_string(),
                reason,
            })?,
        })
    }

    /// Address on the default registry host.
    pub fn new_default(namespace: &str, type_name: &str) -> Result<Self, AddrError> {
        Self::new(Hostname::default_registry(), namespace, type_name)
    }

    /// Address of a built-in provider.
    pub fn new_builtin(type_name: &str) -> Result<Self, AddrError> {
        Self::new(Hostname::builtin(), BUILTIN_PROVIDER_NAMESPACE, type_name)
    }

    /// Legacy, unqualified address. The type is kept verbatim.
    #[must_use]
    pub fn new_legacy(type_name: &str) -> Self {
        Self {
            hostname: Hostname::default_registry(),
            namespace: LEGACY_PROVIDER_NAMESPACE.to_string(),
            type_name: type_name.to_string(),
        }
    }

    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.hostname.as_str() == BUILTIN_PROVIDER_HOST
            && self.namespace == BUILTIN_PROVIDER_NAMESPACE
    }

    #[must_use]
    pub fn is_legacy(&self) -> bool {
        self.hostname.is_default_registry() && self.namespace == LEGACY_PROVIDER_NAMESPACE
    }

    /// Short form for messages, omitting the default registry host.
    #[must_use]
    pub fn for_display(&self) -> String {
        if self.hostname.is_default_registry() {
            format!("{}/{}", self.namespace, self.type_name)
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.hostname, self.namespace, self.type_name)
    }
}

impl FromStr for Provider {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_provider_source(s)
    }
}

impl Serialize for Provider {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Provider {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_provider_source(&raw).map_err(serde::de::Error::custom)
    }
}

/// Whether a provider may appear in a lock file.
///
/// Built-in providers ship with the tool itself and legacy addresses are not
/// fully qualified, so neither can be pinned to an independent version.
#[must_use]
pub fn is_lockable(addr: &Provider) -> bool {
    !(addr.is_builtin() || addr.is_legacy())
}

/// Parse a provider source string.
///
/// Accepts `type` (legacy), `namespace/type` (default registry host), and
/// `hostname/namespace/type`. Parsing is lenient about case; the returned
/// address always renders in canonical form, so callers that require a
/// canonical input compare `addr.to_string()` against what they were given.
pub fn parse_provider_source(given: &str) -> Result<Provider, AddrError> {
    let parts: Vec<&str> = given.split('/').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(AddrError::InvalidSourceString {
            given: given.to_string(),
        });
    }

    let given_type = parts[parts.len() - 1];
    let type_name = parse_provider_part(given_type).map_err(|reason| AddrError::InvalidPart {
        part: "type",
        given: given_type.to_string(),
        reason,
    })?;
    if parts.len() == 1 {
        return Ok(Provider::new_legacy(&type_name));
    }

    let given_namespace = parts[parts.len() - 2];
    let namespace = if given_namespace == LEGACY_PROVIDER_NAMESPACE {
        LEGACY_PROVIDER_NAMESPACE.to_string()
    } else {
        parse_provider_part(given_namespace).map_err(|reason| AddrError::InvalidPart {
            part: "namespace",
            given: given_namespace.to_string(),
            reason,
        })?
    };

    let hostname = if parts.len() == 3 {
        Hostname::parse(parts[0])?
    } else {
        Hostname::default_registry()
    };

    if namespace == LEGACY_PROVIDER_NAMESPACE && !hostname.is_default_registry() {
        return Err(AddrError::LegacyNamespaceOnWrongHost);
    }

    Ok(Provider {
        hostname,
        namespace,
        type_name,
    })
}

/// Normalize a namespace or type part.
///
/// Parts follow DNS label rules: letters, digits and dashes, no leading or
/// trailing dash. Dots and consecutive dashes are rejected. The result is
/// lowercase, so passing it back in yields the same string.
pub fn parse_provider_part(given: &str) -> Result<String, String> {
    if given.is_empty() {
        return Err("must have at least one character".to_string());
    }
    if given.contains('.') {
        return Err("dots are not allowed".to_string());
    }
    if given.contains("--") {
        return Err("cannot use multiple consecutive dashes".to_string());
    }
    if given.starts_with('-')
        || given.ends_with('-')
        || !given.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(
            "must contain only letters, digits, and dashes, and may not use leading or trailing dashes"
                .to_string(),
        );
    }
    Ok(given.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_round_trip() {
        for s in [
            "registry.terraform.io/hashicorp/aws",
            "example.com/acme/widget",
            "example.com:8443/acme/widget",
        ] {
            let addr = parse_provider_source(s).unwrap();
            assert_eq!(addr.to_string(), s);
        }
    }

    #[test]
    fn test_non_canonical_normalizes() {
        let addr = parse_provider_source("HashiCorp/AWS").unwrap();
        assert_eq!(addr.to_string(), "registry.terraform.io/hashicorp/aws");

        let addr = parse_provider_source("Example.COM/acme/widget").unwrap();
        assert_eq!(addr.to_string(), "example.com/acme/widget");
    }

    #[test]
    fn test_two_part_uses_default_host() {
        let addr = parse_provider_source("ns/test").unwrap();
        assert!(addr.hostname.is_default_registry());
        assert_eq!(addr.for_display(), "ns/test");
    }

    #[test]
    fn test_legacy_single_part() {
        let addr = parse_provider_source("null").unwrap();
        assert!(addr.is_legacy());
        assert!(!is_lockable(&addr));
        assert_eq!(addr.to_string(), "registry.terraform.io/-/null");
    }

    #[test]
    fn test_legacy_single_part_is_normalized() {
        let addr = parse_provider_source("AWS").unwrap();
        assert_eq!(addr.to_string(), "registry.terraform.io/-/aws");
        assert_eq!(parse_provider_source(&addr.to_string()).unwrap(), addr);

        assert!(matches!(
            parse_provider_source("foo.bar"),
            Err(AddrError::InvalidPart { part: "type", .. })
        ));
    }

    #[test]
    fn test_legacy_namespace_wrong_host() {
        let err = parse_provider_source("example.com/-/null").unwrap_err();
        assert_eq!(err, AddrError::LegacyNamespaceOnWrongHost);
    }

    #[test]
    fn test_builtin_not_lockable() {
        let addr = parse_provider_source("terraform.io/builtin/terraform").unwrap();
        assert!(addr.is_builtin());
        assert!(!is_lockable(&addr));
    }

    #[test]
    fn test_invalid_strings() {
        assert!(parse_provider_source("").is_err());
        assert!(parse_provider_source("a/b/c/d").is_err());
        assert!(parse_provider_source("a//c").is_err());
        assert!(parse_provider_source("ns/foo.bar").is_err());
        assert!(parse_provider_source("ns/-foo").is_err());
        assert!(parse_provider_source("ns/foo--bar").is_err());
        assert!(parse_provider_source("ex ample.com/ns/foo").is_err());
    }

    #[test]
    fn test_parse_provider_part() {
        assert_eq!(parse_provider_part("AWS").unwrap(), "aws");
        assert_eq!(parse_provider_part("google-beta").unwrap(), "google-beta");
        assert!(parse_provider_part("").is_err());
        assert!(parse_provider_part("a.b").is_err());
        assert!(parse_provider_part("a_b").is_err());
    }

    #[test]
    fn test_ordering() {
        let a = parse_provider_source("a.example.com/z/z").unwrap();
        let b = parse_provider_source("b.example.com/a/a").unwrap();
        let c = parse_provider_source("b.example.com/a/b").unwrap();
        let mut list = vec![c.clone(), a.clone(), b.clone()];
        list.sort();
        assert_eq!(list, vec![a, b, c]);
    }

    #[test]
    fn test_hostname_port_validation() {
        assert!(Hostname::parse("example.com:0").is_err());
        assert!(Hostname::parse("example.com:notaport").is_err());
        assert_eq!(Hostname::parse("EXAMPLE.com:443").unwrap().as_str(), "example.com:443");
    }
}
