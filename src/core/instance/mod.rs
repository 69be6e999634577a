pub mod manager;
pub mod model;

pub use manager::InstanceManager;
pub use model::{InstalledLoader, InstalledMod, InstanceManifest, Side};
