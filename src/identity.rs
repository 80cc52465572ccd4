use std::future::Future;

use tracing::{debug, warn};

use crate::error::{AddressError, LookupError};
use crate::types::ResolvedIdentity;

/// Check for a `0x`-prefixed, 40-hex-digit address (either case).
pub fn is_valid_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Shorten an address to `0x1234...abcd` form.
pub fn shorten_address(address: &str) -> Result<String, AddressError> {
    if !is_valid_address(address) {
        return Err(AddressError::InvalidFormat(address.to_string()));
    }
    Ok(format!("{}...{}", &address[..6], &address[address.len() - 4..]))
}

/// Source of social handles keyed by on-chain address.
pub trait IdentityLookup: Send + Sync {
    /// `Ok(None)` means the service answered and has no profile for the address.
    fn lookup(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<String>, LookupError>> + Send;
}

/// Resolve an address to a handle, degrading to "no handle" on any failure.
pub async fn resolve<L: IdentityLookup>(lookup: &L, address: &str) -> ResolvedIdentity {
    match lookup.lookup(address).await {
        Ok(handle) => {
            debug!("Resolved {address} -> {handle:?}");
            ResolvedIdentity {
                address: address.to_string(),
                handle,
            }
        }
        Err(e) => {
            warn!("Identity lookup for {address} failed: {e}");
            ResolvedIdentity::unresolved(address)
        }
    }
}

impl ResolvedIdentity {
    /// `@handle` when resolved, otherwise the shortened address.
    ///
    /// An address that cannot be shortened is shown as-is.
    pub fn display(&self) -> String {
        match &self.handle {
            Some(handle) => format!("@{handle}"),
            None => shorten_address(&self.address).unwrap_or_else(|e| {
                warn!("{e}");
                self.address.clone()
            }),
        }
    }
}
