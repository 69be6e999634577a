/// Steps of an install, run strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ShowPreInstallMessage,
    ResolveModsAndActions,
    BackupLegacyUserFiles,
    CreateDirectories,
    SyncAssets,
    SyncLibraries,
    OrganizeLibraries,
    ExtractOrStripJarMods,
    SyncAndInstallMods,
    ApplyCaseConversions,
    RepackageJarMods,
    RepackageExtractedResourcePacks,
    RunPostInstallActions,
    ApplyConfigOverlay,
    RestoreLegacyUserFiles,
    WriteLauncherScripts,
    Done,
}

impl Stage {
    pub const ALL: [Stage; 17] = [
        Stage::ShowPreInstallMessage,
        Stage::ResolveModsAndActions,
        Stage::BackupLegacyUserFiles,
        Stage::CreateDirectories,
        Stage::SyncAssets,
        Stage::SyncLibraries,
        Stage::OrganizeLibraries,
        Stage::ExtractOrStripJarMods,
        Stage::SyncAndInstallMods,
        Stage::ApplyCaseConversions,
        Stage::RepackageJarMods,
        Stage::RepackageExtractedResourcePacks,
        Stage::RunPostInstallActions,
        Stage::ApplyConfigOverlay,
        Stage::RestoreLegacyUserFiles,
        Stage::WriteLauncherScripts,
        Stage::Done,
    ];

    /// Share of the overall percentage. Hand-assigned, sums to 100.
    pub fn weight(self) -> u8 {
        match self {
            Stage::ShowPreInstallMessage => 2,
            Stage::ResolveModsAndActions => 8,
            Stage::BackupLegacyUserFiles => 2,
            Stage::CreateDirectories => 3,
            Stage::SyncAssets => 20,
            Stage::SyncLibraries => 20,
            Stage::OrganizeLibraries => 8,
            Stage::ExtractOrStripJarMods => 3,
            Stage::SyncAndInstallMods => 20,
            Stage::ApplyCaseConversions => 1,
            Stage::RepackageJarMods => 4,
            Stage::RepackageExtractedResourcePacks => 2,
            Stage::RunPostInstallActions => 2,
            Stage::ApplyConfigOverlay => 2,
            Stage::RestoreLegacyUserFiles => 1,
            Stage::WriteLauncherScripts => 1,
            Stage::Done => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::ShowPreInstallMessage => "Preparing install",
            Stage::ResolveModsAndActions => "Resolving mods",
            Stage::BackupLegacyUserFiles => "Backing up user files",
            Stage::CreateDirectories => "Creating directories",
            Stage::SyncAssets => "Downloading resources",
            Stage::SyncLibraries => "Downloading libraries",
            Stage::OrganizeLibraries => "Organising libraries",
            Stage::ExtractOrStripJarMods => "Preparing game jar",
            Stage::SyncAndInstallMods => "Installing mods",
            Stage::ApplyCaseConversions => "Renaming mod files",
            Stage::RepackageJarMods => "Merging jar mods",
            Stage::RepackageExtractedResourcePacks => "Repackaging resource packs",
            Stage::RunPostInstallActions => "Running mod actions",
            Stage::ApplyConfigOverlay => "Installing configs",
            Stage::RestoreLegacyUserFiles => "Restoring user files",
            Stage::WriteLauncherScripts => "Writing server scripts",
            Stage::Done => "Finishing",
        }
    }

    pub fn applies(self, is_server: bool) -> bool {
        match self {
            Stage::WriteLauncherScripts => is_server,
            Stage::SyncAssets | Stage::ExtractOrStripJarMods | Stage::RepackageJarMods => !is_server,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one_hundred() {
        let total: u32 = Stage::ALL.iter().map(|s| s.weight() as u32).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn scripts_are_server_only() {
        assert!(Stage::WriteLauncherScripts.applies(true));
        assert!(!Stage::WriteLauncherScripts.applies(false));
        assert!(!Stage::SyncAssets.applies(true));
        assert!(Stage::Done.applies(false));
    }
}
