use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Geolocation derived from a reporter's public IP address
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Location {
    pub country: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Resolves an IP address into a location.
///
/// Implementations fail with `LocationLookupError` when the address is empty or
/// unparseable, or when the backing lookup is unavailable.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LocationService: Send + Sync {
    async fn get_location(&self, ip_address: &str) -> DomainResult<Location>;
}
