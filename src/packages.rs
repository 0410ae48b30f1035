//! Package manifests and package attribution.
//!
//! Given a file location, attribution answers "which published package does
//! this symbol belong to". Three cases exist and must stay distinct:
//!
//! 1. The file lives under a `node_modules/` install directory — the
//!    dependency's own manifest is fetched and read.
//! 2. The file belongs to the primary workspace — the nearest enclosing
//!    manifest names the package.
//! 3. The workspace is DefinitelyTyped itself — manifest data is useless
//!    (one repository holds thousands of `@types/` packages), so the
//!    package name is derived from the `types/` subtree instead.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::Result;
use crate::fs::OverlayStore;
use crate::uri::{encode_component, uri_to_path};

/// Manifest name that marks a workspace as the DefinitelyTyped
/// meta-repository.
pub const DEFINITELY_TYPED_NAME: &str = "definitely-typed";

/// Namespace prefix of type-stub packages.
pub const TYPES_NAMESPACE: &str = "@types/";

/// Repository that hosts all `@types/` packages. Their own manifests carry
/// no reliable provenance, so attribution always points here.
pub const DEFINITELY_TYPED_REPO_URL: &str = "https://github.com/DefinitelyTyped/DefinitelyTyped";

/// Manifest keys that declare dependencies, in reporting order.
pub const DEPENDENCY_KEYS: [&str; 4] = [
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

/// Identity of a published unit of code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "repoURL", skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
}

/// The `repository` field of a manifest: either a bare URL string or an
/// object carrying a `url` member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RepositoryField {
    Url(String),
    Info {
        #[serde(default)]
        url: Option<String>,
    },
}

/// Parsed `package.json`. Only the fields attribution and dependency
/// reporting need; everything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_dependencies: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_dependencies: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_dependencies: Option<IndexMap<String, String>>,
}

impl PackageManifest {
    /// The repository URL, honored only when the manifest's `repository`
    /// field is an object with a `url` member. Bare string forms carry no
    /// machine-readable scheme and are ignored.
    pub fn repository_url(&self) -> Option<&str> {
        match &self.repository {
            Some(RepositoryField::Info { url: Some(url) }) => Some(url),
            _ => None,
        }
    }

    fn dependencies_for_key(&self, key: &str) -> Option<&IndexMap<String, String>> {
        match key {
            "dependencies" => self.dependencies.as_ref(),
            "devDependencies" => self.dev_dependencies.as_ref(),
            "peerDependencies" => self.peer_dependencies.as_ref(),
            "optionalDependencies" => self.optional_dependencies.as_ref(),
            _ => None,
        }
    }

    /// Every dependency declared by this manifest, across all dependency
    /// keys, with a dependee hint naming this package.
    pub fn dependency_references(&self) -> Vec<DependencyReference> {
        let mut references = Vec::new();
        for key in DEPENDENCY_KEYS {
            let Some(entries) = self.dependencies_for_key(key) else {
                continue;
            };
            for (name, version) in entries {
                references.push(DependencyReference {
                    attributes: DependencyAttributes {
                        name: name.clone(),
                        version: Some(version.clone()),
                    },
                    hints: DependencyHints {
                        dependee_package_name: self.name.clone(),
                    },
                });
            }
        }
        references
    }
}

/// A dependency declared by some manifest of the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReference {
    pub attributes: DependencyAttributes,
    pub hints: DependencyHints,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyAttributes {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependee_package_name: Option<String>,
}

/// A workspace package together with its declared dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInformation {
    pub package: PackageDescriptor,
    pub dependencies: Vec<DependencyReference>,
}

/// The external package-manifest manager. Parses and caches manifests per
/// URI; this crate only reads them.
pub trait PackageManager {
    /// The parsed manifest at `uri`, fetching it if necessary.
    fn package_json(&self, uri: &str) -> Result<PackageManifest>;

    /// The nearest manifest at or above `uri`, if any.
    fn closest_package_json(&self, uri: &str) -> Result<Option<PackageManifest>>;

    /// URIs of all manifests known to the workspace.
    fn package_json_uris(&self) -> Vec<String>;
}

/// Extract the dependency package name from a URI under a `node_modules/`
/// install directory. Scoped packages span two path components.
pub fn extract_node_modules_package_name(uri: &str) -> Option<String> {
    let path = uri_to_path(uri);
    let components: Vec<&str> = path.split('/').collect();
    let install_index = components.iter().rposition(|c| *c == "node_modules")?;
    let mut package_name = components.get(install_index + 1).copied()?.to_string();
    if package_name.is_empty() {
        return None;
    }
    if package_name.starts_with('@') {
        let scoped_name = components.get(install_index + 2).copied()?;
        if scoped_name.is_empty() {
            return None;
        }
        package_name.push('/');
        package_name.push_str(scoped_name);
    }
    Some(package_name)
}

/// Derive the `@types/` package name from a URI inside the DefinitelyTyped
/// repository, where every package lives under `types/<name>/`.
pub fn extract_definitely_typed_package_name(uri: &str) -> Option<String> {
    let path = uri_to_path(uri);
    let components: Vec<&str> = path.split('/').collect();
    let types_index = components.iter().rposition(|c| *c == "types")?;
    let package_name = components.get(types_index + 1).copied()?;
    if package_name.is_empty() {
        return None;
    }
    Some(format!("{TYPES_NAMESPACE}{package_name}"))
}

/// URI of the manifest governing a dependency file: the path truncated at
/// the install-directory boundary plus the dependency's own
/// `package.json`.
fn dependency_manifest_uri(uri: &str, package_name: &str) -> Option<String> {
    let encoded: Vec<String> = package_name.split('/').map(encode_component).collect();
    let encoded = encoded.join("/");
    for marker in [
        format!("/node_modules/{encoded}"),
        format!("/node_modules/{package_name}"),
    ] {
        if let Some(index) = uri.rfind(&marker) {
            return Some(format!("{}{}/package.json", &uri[..index], marker));
        }
    }
    None
}

/// Resolves the owning package of a file location.
#[derive(Clone)]
pub struct PackageResolver {
    overlay: Arc<dyn OverlayStore>,
    packages: Arc<dyn PackageManager>,
}

impl PackageResolver {
    pub fn new(overlay: Arc<dyn OverlayStore>, packages: Arc<dyn PackageManager>) -> Self {
        PackageResolver { overlay, packages }
    }

    /// The package a file belongs to, or `None` when no package can be
    /// determined. Manifest fetch and parse failures degrade to `None` —
    /// navigation keeps working without provenance.
    pub fn resolve_package(&self, uri: &str) -> Option<PackageDescriptor> {
        match extract_node_modules_package_name(uri) {
            Some(package_name) => self.resolve_dependency_package(uri, &package_name),
            None => self.resolve_own_package(uri),
        }
    }

    /// The symbol lives in an installed dependency: read that dependency's
    /// own manifest.
    fn resolve_dependency_package(
        &self,
        uri: &str,
        package_name: &str,
    ) -> Option<PackageDescriptor> {
        let manifest_uri = dependency_manifest_uri(uri, package_name)?;
        let manifest = match self.fetch_manifest(&manifest_uri) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(uri = %manifest_uri, %err, "could not read dependency manifest");
                return None;
            }
        };
        // An unnamed manifest means an unpublished dependency; there is
        // nothing to attribute to.
        let name = manifest.name.clone()?;
        let repo_url = if name.starts_with(TYPES_NAMESPACE) {
            // @types/ packages carry no reliable provenance of their own
            Some(DEFINITELY_TYPED_REPO_URL.to_string())
        } else {
            manifest.repository_url().map(str::to_string)
        };
        Some(PackageDescriptor {
            name,
            version: manifest.version,
            repo_url,
        })
    }

    /// The symbol lives in the primary workspace: the nearest enclosing
    /// manifest names the package, unless this workspace is DefinitelyTyped.
    fn resolve_own_package(&self, uri: &str) -> Option<PackageDescriptor> {
        let manifest = match self.packages.closest_package_json(uri) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => return None,
            Err(err) => {
                warn!(uri, %err, "could not resolve enclosing manifest");
                return None;
            }
        };
        if manifest.name.as_deref() == Some(DEFINITELY_TYPED_NAME) {
            let Some(name) = extract_definitely_typed_package_name(uri) else {
                error!(uri, "could not extract package name from DefinitelyTyped URI");
                return None;
            };
            return Some(PackageDescriptor {
                name,
                version: None,
                repo_url: Some(DEFINITELY_TYPED_REPO_URL.to_string()),
            });
        }
        let name = manifest.name.clone()?;
        let repo_url = manifest.repository_url().map(str::to_string);
        Some(PackageDescriptor {
            name,
            version: manifest.version,
            repo_url,
        })
    }

    fn fetch_manifest(&self, uri: &str) -> Result<PackageManifest> {
        self.overlay.ensure(uri)?;
        let content = self.overlay.content(uri)?;
        serde_json::from_str(&content).map_err(|err| crate::error::Error::FileSystem {
            uri: uri.to_string(),
            message: format!("manifest did not parse: {err}"),
        })
    }
}

#[cfg(test)]
mod packages_tests {
    use super::*;

    #[test]
    fn test_extract_node_modules_package_name_plain() {
        assert_eq!(
            extract_node_modules_package_name("file:///w/node_modules/left-pad/index.js"),
            Some("left-pad".to_string())
        );
    }

    #[test]
    fn test_extract_node_modules_package_name_scoped() {
        assert_eq!(
            extract_node_modules_package_name("file:///w/node_modules/@types/foo/index.d.ts"),
            Some("@types/foo".to_string())
        );
    }

    #[test]
    fn test_extract_node_modules_package_name_encoded_scope() {
        assert_eq!(
            extract_node_modules_package_name("file:///w/node_modules/%40types/foo/index.d.ts"),
            Some("@types/foo".to_string())
        );
    }

    #[test]
    fn test_extract_node_modules_package_name_nested_installs() {
        // The innermost install directory wins
        assert_eq!(
            extract_node_modules_package_name(
                "file:///w/node_modules/a/node_modules/b/index.js"
            ),
            Some("b".to_string())
        );
    }

    #[test]
    fn test_extract_node_modules_package_name_absent() {
        assert_eq!(
            extract_node_modules_package_name("file:///w/src/index.ts"),
            None
        );
    }

    #[test]
    fn test_extract_definitely_typed_package_name() {
        assert_eq!(
            extract_definitely_typed_package_name("file:///dt/types/node/index.d.ts"),
            Some("@types/node".to_string())
        );
        assert_eq!(
            extract_definitely_typed_package_name("file:///dt/README.md"),
            None
        );
    }

    #[test]
    fn test_dependency_manifest_uri_truncates_at_install_boundary() {
        assert_eq!(
            dependency_manifest_uri(
                "file:///w/node_modules/@types/foo/lib/deep/x.d.ts",
                "@types/foo"
            ),
            Some("file:///w/node_modules/@types/foo/package.json".to_string())
        );
    }

    #[test]
    fn test_repository_url_requires_object_form() {
        let object_form: PackageManifest = serde_json::from_str(
            r#"{"name": "a", "repository": {"type": "git", "url": "https://example.com/a.git"}}"#,
        )
        .unwrap();
        assert_eq!(
            object_form.repository_url(),
            Some("https://example.com/a.git")
        );

        let string_form: PackageManifest =
            serde_json::from_str(r#"{"name": "a", "repository": "https://example.com/a.git"}"#)
                .unwrap();
        assert_eq!(string_form.repository_url(), None);
    }

    #[test]
    fn test_dependency_references_cover_all_keys() {
        let manifest: PackageManifest = serde_json::from_str(
            r#"{
                "name": "app",
                "dependencies": {"left-pad": "^1.0.0"},
                "devDependencies": {"typescript": "^2.4"},
                "peerDependencies": {"react": "*"}
            }"#,
        )
        .unwrap();
        let references = manifest.dependency_references();
        let names: Vec<&str> = references
            .iter()
            .map(|r| r.attributes.name.as_str())
            .collect();
        assert_eq!(names, vec!["left-pad", "typescript", "react"]);
        for reference in &references {
            assert_eq!(
                reference.hints.dependee_package_name.as_deref(),
                Some("app")
            );
        }
    }
}
