use std::path::Path;

use tempfile::TempDir;

/// Seed directory with automatic cleanup
pub struct TestSeedDir {
    dir: TempDir,
}

impl TestSeedDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Write one seed file into the directory
    pub fn with_file(self, name: &str, contents: &str) -> Self {
        std::fs::write(self.dir.path().join(name), contents).expect("Failed to write seed file");
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

pub const GCP_SEED: &str = r#"
organization "org_1"
folder "folder_1"
project "project_1"
user "adi@test.com"
user "bob@test.com"
group "eng"

parent "org_1" child="folder_1"
parent "folder_1" child="project_1"
member "bob@test.com" group="eng"
grant "owner" to="adi@test.com" on="folder_1"
grant "viewer" to="eng" on="org_1"

role "viewer" {
    permissions {
        - "projects.get"
    }
}
role "owner" {
    includes {
        - "viewer"
    }
    permissions {
        - "projects.delete"
    }
}
"#;
