pub mod backup;
pub mod installer;
pub mod memory;
pub mod progress;
pub mod scripts;
pub mod session;
pub mod stage;

pub use backup::UserFileBackup;
pub use installer::{InstallOutcome, InstallRequest, InstanceInstaller};
pub use progress::{NoopProgress, ProgressSink, TracingProgress};
pub use scripts::ServerLaunch;
pub use session::InstallSession;
pub use stage::Stage;
