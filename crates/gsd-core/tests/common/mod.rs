//! Shared fixtures for gsd-mle CLI tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use gsd_common::GridPoint;
use gsd_core::io::encode_grid;
use tempfile::TempDir;

/// A scratch directory with an isolated config environment.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).expect("write fixture");
        path
    }

    /// Two-point grid: point 0 favours category 0, point 1 is uniform.
    pub fn write_grid(&self, name: &str) -> PathBuf {
        let points = [
            GridPoint::new(0.9, 0.1, [0.6, 0.1, 0.1, 0.1, 0.1]).expect("grid point"),
            GridPoint::new(0.3, 0.4, [0.2, 0.2, 0.2, 0.2, 0.2]).expect("grid point"),
        ];
        self.write(name, encode_grid(&points, 7))
    }

    /// gsd-mle with config discovery pointed at this workspace.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("gsd-mle").expect("gsd-mle binary should exist");
        cmd.env_remove("GSD_CONFIG")
            .env_remove("RUST_LOG")
            .env("GSD_LOG", "warn")
            .env("XDG_CONFIG_HOME", self.dir.path())
            .current_dir(self.dir.path());
        cmd
    }

    pub fn read(&self, path: &Path) -> String {
        std::fs::read_to_string(path).expect("read output")
    }
}
