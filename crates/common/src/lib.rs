pub mod cache;
pub mod domain;
pub mod garde;
pub mod location;
pub mod postgres;
pub mod telemetry;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockLocationService;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockTelemetryRepository;
