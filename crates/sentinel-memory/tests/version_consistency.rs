//! Workspace manifests stay in lockstep: every member inherits the shared
//! version, and internal path dependencies pin that same version.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap()
        .to_path_buf()
}

fn manifest(path: &Path) -> toml::Value {
    let text = std::fs::read_to_string(path.join("Cargo.toml")).unwrap();
    text.parse().unwrap()
}

fn members() -> Vec<String> {
    manifest(&workspace_root())["workspace"]["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap().to_string())
        .collect()
}

#[test]
fn members_inherit_workspace_version() {
    let root = workspace_root();
    let members = members();
    assert_eq!(members.len(), 3, "unexpected members: {members:?}");

    for member in members {
        let doc = manifest(&root.join(&member));
        let inherits = doc["package"]["version"]
            .get("workspace")
            .and_then(toml::Value::as_bool);
        assert_eq!(inherits, Some(true), "{member} must set version.workspace = true");
    }
}

#[test]
fn internal_dependencies_pin_workspace_version() {
    let doc = manifest(&workspace_root());
    let version = doc["workspace"]["package"]["version"].as_str().unwrap();
    let deps = doc["workspace"]["dependencies"].as_table().unwrap();

    let internal: Vec<_> = deps
        .iter()
        .filter(|(_, spec)| spec.get("path").is_some())
        .collect();
    assert!(!internal.is_empty());
    for (name, spec) in internal {
        assert_eq!(
            spec["version"].as_str(),
            Some(version),
            "{name} pins a different version than the workspace"
        );
    }
}

#[test]
fn exported_version_is_workspace_version() {
    let doc = manifest(&workspace_root());
    assert_eq!(
        doc["workspace"]["package"]["version"].as_str(),
        Some(sentinel_memory::VERSION)
    );
    assert_eq!(sentinel_memory::VERSION, env!("CARGO_PKG_VERSION"));
}

#[test]
fn state_crate_keeps_tokio_out_of_its_library() {
    let doc = manifest(&workspace_root().join("crates/sentinel-state"));
    assert!(doc["dependencies"].get("tokio").is_none());
    assert!(doc["dev-dependencies"].get("tokio").is_some());
}
