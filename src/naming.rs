//! Hostname handling: label extraction, prefix/postfix transform, FQDN
//! composition and the managed-suffix test.

/// Maximum length of a single DNS label (RFC 1035).
const MAX_LABEL_LEN: usize = 63;

/// First dot-delimited label of `hostname`, lower-cased.
///
/// An empty hostname yields an empty label.
pub fn first_label(hostname: &str) -> String {
    hostname.split('.').next().unwrap_or_default().to_lowercase()
}

/// RFC 1123 label check: 1-63 ASCII letters, digits or hyphens, not starting
/// or ending with a hyphen.
pub fn is_valid_label(label: &str) -> bool {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return false;
    }
    if label.starts_with('-') || label.ends_with('-') {
        return false;
    }
    label
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

/// Configured prefix/postfix applied around every hostname label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostnameTransform {
    prefix: String,
    postfix: String,
}

impl HostnameTransform {
    /// Create a transform from a prefix and a postfix (either may be empty).
    pub fn new(prefix: impl Into<String>, postfix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            postfix: postfix.into(),
        }
    }

    /// Apply the transform to a label.
    pub fn apply(&self, label: &str) -> String {
        format!("{}{}{}", self.prefix, label, self.postfix)
    }
}

/// Join a (transformed) label, optional subdomain and domain into a lower-case FQDN.
pub fn compose_fqdn(label: &str, subdomain: Option<&str>, domain: &str) -> String {
    match subdomain {
        Some(sub) => format!("{label}.{sub}.{domain}"),
        None => format!("{label}.{domain}"),
    }
    .to_lowercase()
}

/// How mesh hostnames map into the managed part of the zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    domain: String,
    subdomain: Option<String>,
    transform: HostnameTransform,
}

impl NamingScheme {
    /// Create a scheme. Domain and subdomain are lower-cased; an empty subdomain
    /// counts as none.
    pub fn new(domain: &str, subdomain: Option<&str>, transform: HostnameTransform) -> Self {
        Self {
            domain: domain.to_lowercase(),
            subdomain: subdomain
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase),
            transform,
        }
    }

    /// The managed domain.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The optional subdomain label.
    pub fn subdomain(&self) -> Option<&str> {
        self.subdomain.as_deref()
    }

    /// The configured hostname transform.
    pub fn transform(&self) -> &HostnameTransform {
        &self.transform
    }

    /// FQDN for an untransformed hostname label.
    pub fn fqdn(&self, label: &str) -> String {
        compose_fqdn(
            &self.transform.apply(label),
            self.subdomain(),
            &self.domain,
        )
    }

    /// `(.subdomain)?.domain`, lower-cased.
    pub fn managed_suffix(&self) -> String {
        match &self.subdomain {
            Some(sub) => format!(".{}.{}", sub, self.domain),
            None => format!(".{}", self.domain),
        }
    }

    /// Whether a zone record name falls inside the managed suffix.
    pub fn is_managed_name(&self, name: &str) -> bool {
        name.to_lowercase().ends_with(&self.managed_suffix())
    }
}
