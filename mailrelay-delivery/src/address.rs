use std::fmt;

use mailparse::MailAddr;

use crate::error::ResolveError;

/// A normalized mail identity: trimmed, lowercased and split at the last `@`
///
/// Display names and angle brackets are removed by the header parser before
/// an address gets here; nothing else is stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    local: String,
    domain: String,
}

impl Address {
    /// Parse a bare `local@domain` identity
    ///
    /// # Errors
    /// If either side of the `@` is empty or contains whitespace
    pub fn parse(identity: &str) -> Result<Self, ResolveError> {
        let normalized = identity.trim().to_lowercase();

        let Some((local, domain)) = normalized.rsplit_once('@') else {
            return Err(ResolveError::InvalidIdentity(identity.to_string()));
        };

        if local.is_empty()
            || domain.is_empty()
            || normalized.chars().any(char::is_whitespace)
        {
            return Err(ResolveError::InvalidIdentity(identity.to_string()));
        }

        Ok(Self {
            local: local.to_string(),
            domain: domain.to_string(),
        })
    }

    /// Every address in an RFC 5322 address-list header value, group members
    /// included, in header order
    ///
    /// # Errors
    /// If the list cannot be parsed or any entry is not a usable identity
    pub fn all_from_header(value: &str) -> Result<Vec<Self>, ResolveError> {
        let list = mailparse::addrparse(value)
            .map_err(|e| ResolveError::InvalidIdentity(format!("{value}: {e}")))?;

        let mut addresses = Vec::with_capacity(list.len());
        for entry in list.iter() {
            match entry {
                MailAddr::Single(single) => addresses.push(Self::parse(&single.addr)?),
                MailAddr::Group(group) => {
                    for single in &group.addrs {
                        addresses.push(Self::parse(&single.addr)?);
                    }
                }
            }
        }

        Ok(addresses)
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}
