//! Atomic models of household devices and their surroundings.

/// Mode-driven appliance model.
pub mod appliance;
/// Stationary battery storage model.
pub mod battery;
pub mod controller;
/// Built-in appliance profiles and the profile builder.
pub mod profiles;
pub mod relay;
/// Hot-water tank thermal model.
pub mod thermal;
pub mod types;
/// Wind speed model with AR(1) variability.
pub mod wind;

// Re-export the main types for convenience
pub use appliance::ApplianceModel;
pub use battery::BatteryModel;
pub use controller::ThresholdControllerModel;
pub use profiles::ApplianceProfile;
pub use relay::RelayModel;
pub use thermal::ThermalModel;
pub use wind::WindSpeedModel;
