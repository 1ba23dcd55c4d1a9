use async_trait::async_trait;

/// Geo lookup result for an access-log entry (spec §4.K). Every field is
/// optional: a provider may resolve none, some, or all of them.
#[derive(Debug, Clone, Default)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub timezone: Option<String>,
}

/// External collaborator (spec §4.K): out of scope to implement a real IP
/// geolocation lookup here, so this is kept as an interface with a
/// no-op default. A real deployment swaps in a provider backed by a
/// MaxMind database or a hosted lookup API.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn locate(&self, ip: &str) -> GeoLocation;
}

pub struct NullGeoProvider;

#[async_trait]
impl GeoProvider for NullGeoProvider {
    async fn locate(&self, _ip: &str) -> GeoLocation {
        GeoLocation::default()
    }
}
