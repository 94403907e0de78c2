use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use zip::ZipArchive;

use crate::common::platform::{EnvironmentContext, Platform};
use crate::common::process::Invocation;

/// Archive prefix of the frozen-executable bases shipped in a wheel.
const BASES_PREFIX: &str = "cx_Freeze/bases/";

fn wheel_platform(ctx: &EnvironmentContext) -> String {
    ctx.interpreter.platform.replace("linux", "manylinux")
}

/// cibuildwheel `--only` selector for the running interpreter.
pub fn build_identifier(ctx: &EnvironmentContext) -> String {
    format!(
        "cp{}-{}",
        ctx.interpreter.py_version_nodot,
        wheel_platform(ctx).replace('-', "_")
    )
}

/// Glob matching wheels built for this interpreter, e.g.
/// `wheelhouse/cx_Freeze-7.2.0-*-cp312-manylinux*_x86_64.whl`.
pub fn wheel_pattern(root: &Path, version: &str, ctx: &EnvironmentContext) -> String {
    let name = format!(
        "cx_Freeze-{}-*-cp{}-{}.whl",
        version,
        ctx.interpreter.py_version_nodot,
        wheel_platform(ctx).replace('-', "*_")
    );
    root.join("wheelhouse").join(name).to_string_lossy().into_owned()
}

/// Newest wheel first.
pub fn find_wheels(root: &Path, version: &str, ctx: &EnvironmentContext) -> Result<Vec<PathBuf>> {
    let pattern = wheel_pattern(root, version, ctx);
    let mut wheels: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("Invalid wheel pattern {}", pattern))?
        .filter_map(|entry| entry.ok())
        .collect();
    wheels.sort();
    wheels.reverse();
    Ok(wheels)
}

/// `python -m cibuildwheel` for the running interpreter only.
pub fn cibuildwheel(ctx: &EnvironmentContext, root: &Path) -> Invocation {
    let mut invocation = Invocation::new(ctx.interpreter.executable_arg())
        .args(["-m", "cibuildwheel", "--only"])
        .arg(build_identifier(ctx))
        .current_dir(root);
    if ctx.is_preview() {
        invocation.push_arg("--prerelease-pythons");
    }
    if ctx.platform == Platform::Linux && which::which("podman").is_ok() {
        invocation = invocation.env("CIBW_CONTAINER_ENGINE", "podman");
    }
    invocation
}

/// Copy the `cx_Freeze/bases/` entries of `wheel` under `root`.
pub fn extract_bases(wheel: &Path, root: &Path) -> Result<usize> {
    let file = File::open(wheel).with_context(|| format!("Failed to open {}", wheel.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("Failed to read wheel {}", wheel.display()))?;

    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        if !entry.name().starts_with(BASES_PREFIX) || entry.is_dir() {
            continue;
        }
        let target = root.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out =
            File::create(&target).with_context(|| format!("Failed to create {}", target.display()))?;
        io::copy(&mut entry, &mut out)?;
        extracted += 1;
    }
    Ok(extracted)
}

/// Release URL of the prebuilt MSYS2 package on the project index.
pub fn mingw_package_url(index_url: &str, package_prefix: &str, version: &str) -> String {
    format!(
        "{}/mingw/{}-python-cx-freeze-{}-1-any.pkg.tar.zst",
        index_url.trim_end_matches('/'),
        package_prefix,
        version
    )
}

/// Download `url` into a temporary `.pkg.tar.zst` file. The file lives as
/// long as the returned handle.
pub fn download_package(url: &str) -> Result<tempfile::NamedTempFile> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("Failed to download {}", url))?;
    let content = response.bytes()?;

    let mut file = tempfile::Builder::new()
        .prefix("cx-freeze-")
        .suffix(".pkg.tar.zst")
        .tempfile()?;
    file.write_all(&content)?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::platform::EnvironmentManager;
    use zip::write::SimpleFileOptions;

    fn linux_ctx() -> EnvironmentContext {
        EnvironmentContext::fixture(Platform::Linux, EnvironmentManager::None)
    }

    #[test]
    fn test_build_identifier() {
        assert_eq!(build_identifier(&linux_ctx()), "cp312-manylinux_x86_64");
        let mac = EnvironmentContext::fixture(Platform::Macos, EnvironmentManager::None);
        assert_eq!(build_identifier(&mac), "cp312-macosx_11.0_arm64");
    }

    #[test]
    fn test_find_wheels_newest_first() {
        let root = tempfile::tempdir().unwrap();
        let wheelhouse = root.path().join("wheelhouse");
        fs::create_dir_all(&wheelhouse).unwrap();
        for name in [
            "cx_Freeze-7.2.0-cp312-cp312-manylinux_2_17_x86_64.manylinux2014_x86_64.whl",
            "cx_Freeze-7.2.0-cp312-cp312-manylinux_2_28_x86_64.whl",
            "cx_Freeze-7.2.0-cp311-cp311-manylinux_2_28_x86_64.whl",
            "cx_Freeze-7.1.0-cp312-cp312-manylinux_2_28_x86_64.whl",
        ] {
            fs::write(wheelhouse.join(name), b"").unwrap();
        }

        let found = find_wheels(root.path(), "7.2.0", &linux_ctx()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "cx_Freeze-7.2.0-cp312-cp312-manylinux_2_28_x86_64.whl",
                "cx_Freeze-7.2.0-cp312-cp312-manylinux_2_17_x86_64.manylinux2014_x86_64.whl",
            ]
        );
    }

    #[test]
    fn test_cibuildwheel_preview() {
        let mut ctx = EnvironmentContext::fixture(Platform::Macos, EnvironmentManager::None);
        ctx.release = crate::common::platform::ReleaseChannel::Preview;
        let invocation = cibuildwheel(&ctx, Path::new("/src"));
        assert_eq!(
            invocation.command_line(),
            "/usr/bin/python3 -m cibuildwheel --only cp312-macosx_11.0_arm64 --prerelease-pythons"
        );
        assert_eq!(invocation.cwd.as_deref(), Some(Path::new("/src")));
        assert!(invocation.env.is_empty());
    }

    #[test]
    fn test_extract_bases_only() {
        let dir = tempfile::tempdir().unwrap();
        let wheel = dir.path().join("cx_Freeze-7.2.0-cp312-cp312-manylinux_2_28_x86_64.whl");
        let mut writer = zip::ZipWriter::new(File::create(&wheel).unwrap());
        for (name, body) in [
            ("cx_Freeze/__init__.py", "__version__ = '7.2.0'"),
            ("cx_Freeze/bases/console-cpython-312-x86_64-linux-gnu", "ELF"),
            ("cx_Freeze/bases/lib-dynload/_bz2.so", "ELF"),
        ] {
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();

        let root = dir.path().join("root");
        assert_eq!(extract_bases(&wheel, &root).unwrap(), 2);
        assert!(root.join("cx_Freeze/bases/lib-dynload/_bz2.so").is_file());
        assert!(!root.join("cx_Freeze/__init__.py").exists());
    }

    #[test]
    fn test_mingw_package_url() {
        assert_eq!(
            mingw_package_url(
                "https://marcelotduarte.github.io/packages/",
                "mingw-w64-ucrt-x86_64",
                "7.2.0"
            ),
            "https://marcelotduarte.github.io/packages/mingw/mingw-w64-ucrt-x86_64-python-cx-freeze-7.2.0-1-any.pkg.tar.zst"
        );
    }
}
