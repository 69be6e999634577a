// ─── Packsmith Core ───
// Modpack instance installer: resolves a pack version and brings an
// instance directory to exactly that state.
//
// Architecture:
//   core/
//     config      — Installer settings + endpoint URLs
//     http        — Shared reqwest client + response helpers
//     integrity/  — Hashing, fingerprints, document cache
//     download/   — Fetch units, bounded pools, archive extraction
//     version/    — Mojang manifest + version JSON + OS rules
//     maven/      — Coordinates + maven-metadata.xml
//     assets/     — Asset index + object downloads
//     libraries/  — Library and native resolution
//     loaders/    — Forge/NeoForge strategies (modern and legacy)
//     pack/       — Pack documents, mod planning, actions, malware scan
//     instance/   — Instance manifest + persistence
//     install/    — Staged installer, session, progress, backups

pub mod assets;
pub mod config;
pub mod download;
pub mod error;
pub mod http;
pub mod install;
pub mod instance;
pub mod integrity;
pub mod libraries;
pub mod loaders;
pub mod maven;
pub mod pack;
pub mod version;

#[cfg(test)]
pub(crate) mod test_support;
