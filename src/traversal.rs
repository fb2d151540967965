//! Flattening of Testpad folder trees.
//!
//! Every walk is depth-first with children in the order Testpad returned
//! them, which is also display order. The tree is owned data so it cannot
//! contain cycles, and serde_json's recursion limit bounds its depth.

use serde::Serialize;

use crate::testpad::model::FolderNode;

/// A folder entry for "pick a source folder" lists.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FolderOption {
    pub id: String,
    pub name: String,
    pub depth: usize,
}

/// A script node plus the folder path it lives under.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedScript<'a> {
    pub folder_path: String,
    pub node: &'a FolderNode,
}

const PATH_SEPARATOR: &str = " / ";

/// Every script reachable from `root`, each exactly once.
pub fn collect_scripts(root: &FolderNode) -> Vec<&FolderNode> {
    let mut scripts = Vec::new();
    if root.is_script() {
        scripts.push(root);
        return scripts;
    }
    visit_scripts(&root.children, &mut scripts);
    scripts
}

fn visit_scripts<'a>(items: &'a [FolderNode], out: &mut Vec<&'a FolderNode>) {
    for item in items {
        if item.is_script() {
            out.push(item);
        } else if item.is_folder() {
            visit_scripts(&item.children, out);
        }
    }
}

/// Numeric ids of every reachable script. Scripts whose id is not numeric
/// are skipped.
pub fn collect_script_ids(root: &FolderNode) -> Vec<u64> {
    collect_scripts(root)
        .into_iter()
        .filter_map(FolderNode::script_id)
        .collect()
}

/// Every folder below `root` with its nesting depth (root's children are 0).
pub fn collect_folders(root: &FolderNode) -> Vec<FolderOption> {
    let mut folders = Vec::new();
    visit_folders(&root.children, 0, &mut folders);
    folders
}

fn visit_folders(items: &[FolderNode], depth: usize, out: &mut Vec<FolderOption>) {
    for item in items.iter().filter(|i| i.is_folder()) {
        out.push(FolderOption {
            id: item.id.clone(),
            name: item.name.clone(),
            depth,
        });
        visit_folders(&item.children, depth + 1, out);
    }
}

/// Scripts annotated with their folder path, e.g. `"Release 2 / Checkout"`.
/// The synthetic project root contributes no path segment.
pub fn collect_located_scripts(root: &FolderNode) -> Vec<LocatedScript<'_>> {
    let mut out = Vec::new();
    if root.is_script() {
        out.push(LocatedScript {
            folder_path: String::new(),
            node: root,
        });
        return out;
    }
    let mut path = Vec::new();
    if root.id != FolderNode::root(Vec::new()).id {
        path.push(root.name.as_str());
    }
    visit_located(&root.children, &mut path, &mut out);
    out
}

fn visit_located<'a>(
    items: &'a [FolderNode],
    path: &mut Vec<&'a str>,
    out: &mut Vec<LocatedScript<'a>>,
) {
    for item in items {
        if item.is_script() {
            out.push(LocatedScript {
                folder_path: path.join(PATH_SEPARATOR),
                node: item,
            });
        } else if item.is_folder() {
            path.push(item.name.as_str());
            visit_located(&item.children, path, out);
            path.pop();
        }
    }
}
