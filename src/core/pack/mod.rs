// ─── Pack Documents ───
// Pack index and version documents, mod selection and planning, post-install
// actions and the malware scan.

pub mod actions;
pub mod model;
pub mod resolver;
pub mod scan;

pub use actions::ActionRunner;
pub use model::{Action, ActionKind, CaseConversion, DownloadKind, Mod, ModType, PackIndex, PackVersion, Placement};
pub use resolver::{fetch_file_sizes, select_mods, ModPlan, ModPlanner, PackResolver};
pub use scan::scan_for_malware;
