use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// A throwaway project root with `ci/` and `samples/` directories.
pub struct TestProject {
    temp_dir: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        fs::create_dir_all(temp_dir.path().join("ci"))?;
        fs::create_dir_all(temp_dir.path().join("samples"))?;
        Ok(Self { temp_dir })
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn write(&self, relative: &str, content: &str) -> Result<PathBuf> {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    pub fn write_manifest(&self, json: &str) -> Result<()> {
        self.write("ci/build-test.json", json)?;
        Ok(())
    }

    /// A stand-in interpreter that answers the environment probe with a
    /// fixed linux CPython 3.12 description.
    #[cfg(unix)]
    pub fn fake_python(&self) -> Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let prefix = self.root().join("prefix");
        let script = format!(
            "#!/bin/sh\ncat <<'JSON'\n{}\nJSON\n",
            serde_json::json!({
                "executable": "/usr/bin/python3",
                "prefix": prefix,
                "platform": "linux-x86_64",
                "version": [3, 12, 1],
                "releaselevel": "final",
                "python_version": "3.12",
                "py_version_nodot": "312",
                "ext_suffix": ".cpython-312-x86_64-linux-gnu.so",
            })
        );
        let path = self.write("bin/python", &script)?;
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms)?;
        Ok(path)
    }

    pub fn run(&self, args: &[&str], envs: &[(&str, &str)]) -> Result<CommandOutput> {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_build-test"));
        cmd.arg("--root")
            .arg(self.root())
            .arg("--no-color")
            .args(args)
            .env_remove("PIPENV_ACTIVE")
            .env_remove("PIP_UPGRADE")
            .current_dir(self.root());
        for (key, value) in envs {
            cmd.env(key, value);
        }
        let output = cmd.output()?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
