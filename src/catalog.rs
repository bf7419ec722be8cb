//! The loaded command catalog

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use serde::{Serialize, Serializer};

use crate::catalog_file::{CatalogError, CatalogSource, Loader, SourceNode, SourcePackage};
use crate::commands::command::Command;
use crate::commands::group::CommandGroup;
use crate::commands::ids::NodeId;
use crate::commands::node::{CommandNode, find_in};

/// Package metadata kept when the source is a script package
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub id: Option<NodeId>,
    pub name: String,
    pub label: String,
    pub description: String,
    pub install: Option<String>,
    pub python: Option<String>,
}

/// Tree of groups and commands loaded from one source file.
///
/// Immutable once loaded; [`Catalog::reload`] builds a fresh catalog with
/// freshly assigned IDs rather than updating this one.
#[derive(Debug, Clone)]
pub struct Catalog {
    source: PathBuf,
    package: Option<PackageInfo>,
    nodes: Vec<CommandNode>,
}

impl Catalog {
    /// Load a catalog from a JSON source file.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the file is missing or unreadable, does not
    /// parse, or contains duplicate IDs, duplicate parameters or blank names.
    pub fn load(source: &Path) -> Result<Self, CatalogError> {
        if !source.exists() {
            return Err(CatalogError::NotFound(source.to_path_buf()));
        }
        let to_error = |e| CatalogError::Io {
            path: source.to_path_buf(),
            source: e,
        };
        let source = std::path::absolute(source).map_err(to_error)?;
        let text = std::fs::read_to_string(&source).map_err(to_error)?;
        let catalog = Self::parse(&text, &source)?;
        info!(
            "Loaded catalog {} ({} commands)",
            source.display(),
            catalog.commands().len()
        );
        Ok(catalog)
    }

    /// Build a catalog from JSON text, resolving relative script paths
    /// against the parent directory of `source`. A relative `source` is taken
    /// relative to the current directory.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnresolvableSource` if `source` has no parent
    /// directory, and the errors of [`Catalog::load`] otherwise.
    pub fn parse(text: &str, source: &Path) -> Result<Self, CatalogError> {
        let source = std::path::absolute(source).map_err(|e| CatalogError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        let base_dir = source
            .parent()
            .ok_or_else(|| CatalogError::UnresolvableSource(source.clone()))?;
        debug!(
            "Parsing catalog {} (base: {})",
            source.display(),
            base_dir.display()
        );

        let (package, nodes) = match CatalogSource::from_json(text, &source)? {
            CatalogSource::Nodes(nodes) => (None, nodes),
            CatalogSource::Package(pkg) => {
                let info = PackageInfo {
                    id: pkg.id,
                    name: pkg.name,
                    label: pkg.label,
                    description: pkg.description,
                    install: pkg.install,
                    python: pkg.python,
                };
                (Some(info), pkg.scripts)
            }
        };

        let mut loader = Loader::new(
            base_dir,
            package.as_ref().and_then(|p| p.python.as_deref()),
        );
        loader.claim_ids(&nodes)?;
        let nodes = loader.convert(nodes)?;
        let package = package.map(|p| PackageInfo {
            python: loader.default_python().map(str::to_string),
            ..p
        });

        let catalog = Self {
            source,
            package,
            nodes,
        };
        catalog.check_unique_ids()?;
        Ok(catalog)
    }

    /// Re-read the source file into a new catalog. IDs are reassigned.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` under the same conditions as [`Catalog::load`].
    pub fn reload(&self) -> Result<Self, CatalogError> {
        info!("Reloading catalog {}", self.source.display());
        Self::load(&self.source)
    }

    fn check_unique_ids(&self) -> Result<(), CatalogError> {
        fn walk(nodes: &[CommandNode], seen: &mut HashSet<NodeId>) -> Result<(), CatalogError> {
            for node in nodes {
                if !seen.insert(node.id()) {
                    return Err(CatalogError::DuplicateId(node.id()));
                }
                if let CommandNode::Group(group) = node {
                    walk(&group.children, seen)?;
                }
            }
            Ok(())
        }
        walk(&self.nodes, &mut HashSet::new())
    }

    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    #[must_use]
    pub fn package(&self) -> Option<&PackageInfo> {
        self.package.as_ref()
    }

    #[must_use]
    pub fn nodes(&self) -> &[CommandNode] {
        &self.nodes
    }

    /// Depth-first lookup of any node by ID.
    #[must_use]
    pub fn find_node(&self, id: NodeId) -> Option<&CommandNode> {
        find_in(&self.nodes, id)
    }

    /// Look up a command by ID; groups never match.
    #[must_use]
    pub fn find_command(&self, id: NodeId) -> Option<Arc<Command>> {
        match self.find_node(id)? {
            CommandNode::Command(cmd) => Some(Arc::clone(cmd)),
            CommandNode::Group(_) => None,
        }
    }

    /// Look up a group by ID; commands never match.
    #[must_use]
    pub fn find_group(&self, id: NodeId) -> Option<&CommandGroup> {
        match self.find_node(id)? {
            CommandNode::Group(group) => Some(group),
            CommandNode::Command(_) => None,
        }
    }

    /// All commands with the `>`-joined names of their enclosing groups.
    #[must_use]
    pub fn commands(&self) -> Vec<(String, Arc<Command>)> {
        fn walk(nodes: &[CommandNode], path: &str, out: &mut Vec<(String, Arc<Command>)>) {
            for node in nodes {
                match node {
                    CommandNode::Command(cmd) => out.push((path.to_string(), Arc::clone(cmd))),
                    CommandNode::Group(group) => {
                        let child_path = if path.is_empty() {
                            group.name.clone()
                        } else {
                            format!("{path} > {}", group.name)
                        };
                        walk(&group.children, &child_path, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.nodes, "", &mut out);
        out
    }

    /// The catalog in its source shape, with IDs assigned and paths resolved.
    #[must_use]
    pub fn to_source(&self) -> CatalogSource {
        let nodes: Vec<SourceNode> = self.nodes.iter().map(SourceNode::from).collect();
        match &self.package {
            None => CatalogSource::Nodes(nodes),
            Some(pkg) => CatalogSource::Package(SourcePackage {
                id: pkg.id,
                name: pkg.name.clone(),
                label: pkg.label.clone(),
                description: pkg.description.clone(),
                install: pkg.install.clone(),
                python: pkg.python.clone(),
                scripts: nodes,
            }),
        }
    }

    /// JSON Schema of the catalog source format, for client-side forms.
    #[must_use]
    pub fn schema() -> serde_json::Value {
        schemars::schema_for!(CatalogSource).to_value()
    }
}

impl Serialize for Catalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_source().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        {"type": "scriptgroup", "name": "tools", "label": "Tools", "description": "", "children": [
            {"type": "powershell", "name": "run", "label": "Run", "description": "", "path": "run.ps1", "parameters": []},
            {"type": "scriptgroup", "name": "nested", "label": "Nested", "description": "", "children": [
                {"type": "python", "name": "py", "label": "Py", "description": "", "path": "/opt/py.py", "parameters": []}
            ]}
        ]},
        {"type": "shell", "name": "top", "label": "Top", "description": "", "path": "top.sh", "parameters": []}
    ]"#;

    fn collect_ids(nodes: &[CommandNode], out: &mut Vec<NodeId>) {
        for node in nodes {
            out.push(node.id());
            if let CommandNode::Group(group) = node {
                collect_ids(&group.children, out);
            }
        }
    }

    #[test]
    fn test_ids_unique_and_sequential() {
        let catalog = Catalog::parse(CATALOG, Path::new("/cfg/scripts.json")).unwrap();
        let mut ids = Vec::new();
        collect_ids(catalog.nodes(), &mut ids);
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_find_round_trip() {
        let catalog = Catalog::parse(CATALOG, Path::new("/cfg/scripts.json")).unwrap();
        let mut ids = Vec::new();
        collect_ids(catalog.nodes(), &mut ids);
        for id in ids {
            assert_eq!(catalog.find_node(id).map(CommandNode::id), Some(id));
        }
        assert!(catalog.find_node(99).is_none());
    }

    #[test]
    fn test_group_and_command_lookups_are_disjoint() {
        let catalog = Catalog::parse(CATALOG, Path::new("/cfg/scripts.json")).unwrap();
        assert!(catalog.find_command(1).is_none());
        assert_eq!(catalog.find_group(1).map(|g| g.name.as_str()), Some("tools"));
        assert!(catalog.find_group(2).is_none());
        assert_eq!(catalog.find_command(2).map(|c| c.name.clone()), Some("run".into()));
    }

    #[test]
    fn test_paths_resolved_against_source() {
        let catalog = Catalog::parse(CATALOG, Path::new("/cfg/scripts.json")).unwrap();
        assert_eq!(
            catalog.find_command(2).unwrap().path,
            PathBuf::from("/cfg/run.ps1")
        );
        assert_eq!(
            catalog.find_command(4).unwrap().path,
            PathBuf::from("/opt/py.py")
        );
    }

    #[test]
    fn test_relative_source_yields_absolute_paths() {
        let catalog = Catalog::parse(CATALOG, Path::new("scripts.json")).unwrap();
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(catalog.source(), cwd.join("scripts.json"));
        let path = &catalog.find_command(2).unwrap().path;
        assert!(path.is_absolute());
        assert_eq!(*path, cwd.join("run.ps1"));
    }

    #[test]
    fn test_explicit_ids_preserved() {
        let catalog = Catalog::parse(
            r#"[
                {"type": "shell", "name": "a", "label": "A", "path": "a.sh"},
                {"type": "shell", "id": 1, "name": "b", "label": "B", "path": "b.sh"}
            ]"#,
            Path::new("/cfg/scripts.json"),
        )
        .unwrap();
        assert_eq!(catalog.find_command(1).unwrap().name, "b");
        assert_eq!(catalog.find_command(2).unwrap().name, "a");
    }

    #[test]
    fn test_command_paths_for_listing() {
        let catalog = Catalog::parse(CATALOG, Path::new("/cfg/scripts.json")).unwrap();
        let listed: Vec<(String, String)> = catalog
            .commands()
            .into_iter()
            .map(|(group, cmd)| (group, cmd.name.clone()))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("tools".to_string(), "run".to_string()),
                ("tools > nested".to_string(), "py".to_string()),
                (String::new(), "top".to_string()),
            ]
        );
    }

    #[test]
    fn test_serializes_back_to_source_shape() {
        let catalog = Catalog::parse(CATALOG, Path::new("/cfg/scripts.json")).unwrap();
        let value = serde_json::to_value(&catalog).unwrap();
        assert_eq!(value[0]["type"], "scriptgroup");
        assert_eq!(value[0]["id"], 1);
        assert_eq!(value[0]["children"][0]["type"], "powershell");
        assert_eq!(value[0]["children"][0]["path"], "/cfg/run.ps1");
        assert_eq!(value[1]["type"], "shell");
    }

    #[test]
    fn test_package_python_becomes_default_interpreter() {
        let catalog = Catalog::parse(
            r#"{"name": "pkg", "label": "Pkg", "python": "env/python", "scripts": [
                {"type": "python", "name": "a", "label": "A", "path": "a.py"},
                {"type": "python", "name": "b", "label": "B", "path": "b.py", "interpreter": "python3"},
                {"type": "shell", "name": "c", "label": "C", "path": "c.sh"}
            ]}"#,
            Path::new("/pkg/package.json"),
        )
        .unwrap();
        assert_eq!(
            catalog.find_command(1).unwrap().interpreter.as_deref(),
            Some("/pkg/env/python")
        );
        assert_eq!(
            catalog.find_command(2).unwrap().interpreter.as_deref(),
            Some("python3")
        );
        assert!(catalog.find_command(3).unwrap().interpreter.is_none());
        assert_eq!(
            catalog.package().and_then(|p| p.python.as_deref()),
            Some("/pkg/env/python")
        );
    }

    #[test]
    fn test_schema_describes_node_types() {
        let schema = Catalog::schema().to_string();
        assert!(schema.contains("scriptgroup"));
        assert!(schema.contains("winpowershell"));
        assert!(schema.contains("select"));
    }

    #[test]
    fn test_source_without_parent_is_unresolvable() {
        let result = Catalog::parse("[]", Path::new("/"));
        assert!(matches!(result, Err(CatalogError::UnresolvableSource(_))));
    }
}
