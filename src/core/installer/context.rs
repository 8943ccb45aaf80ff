use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::core::events::ProgressBus;
use crate::core::plan::InstallationTarget;

/// Everything one install run needs besides the plan.
pub struct InstallContext<'a> {
    pub run_id: Uuid,
    pub target: &'a InstallationTarget,
    /// `<root>/.silk/staging/<run-id>`; removed when the run ends.
    pub run_dir: PathBuf,
    pub bus: &'a ProgressBus,
}

impl<'a> InstallContext<'a> {
    pub fn new(target: &'a InstallationTarget, bus: &'a ProgressBus) -> Self {
        let run_id = Uuid::new_v4();
        Self {
            run_id,
            run_dir: target.staging_root().join(run_id.to_string()),
            target,
            bus,
        }
    }

    pub fn root(&self) -> &Path {
        &self.target.root
    }

    /// Where downloads land.
    pub fn staging_dir(&self) -> PathBuf {
        self.run_dir.join("files")
    }

    /// Previous contents saved for the revert rollback policy.
    pub fn backup_dir(&self) -> PathBuf {
        self.run_dir.join("backup")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_run_gets_its_own_directory() {
        let target = InstallationTarget::new("/games/Equilinox", "silk");
        let bus = ProgressBus::default();
        let a = InstallContext::new(&target, &bus);
        let b = InstallContext::new(&target, &bus);
        assert_ne!(a.run_dir, b.run_dir);
        assert!(a.staging_dir().starts_with("/games/Equilinox/.silk/staging"));
        assert_ne!(a.staging_dir(), a.backup_dir());
    }
}
