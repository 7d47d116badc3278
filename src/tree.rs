// ABOUTME: Resolves flat archive paths against the category schema and rebuilds the folder tree
// ABOUTME: The tree is an arena of nodes keyed by their slash-joined path, independent of input order

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::entities::categorized_file;
use crate::error::{AppError, Result};
use crate::schema::{Category, CategorySchema, Section, Subcategory};

/// Outcome of matching folder segments against the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<'a> {
    pub section: &'a Section,
    pub category: &'a Category,
    pub subcategory: Option<&'a Subcategory>,
    pub remainder: Vec<String>,
}

impl Resolved<'_> {
    /// Canonical key-based segments: section, category, subcategory, free folders.
    pub fn key_segments(&self) -> Vec<String> {
        let mut segments = vec![self.section.key.clone(), self.category.key.clone()];
        if let Some(sub) = self.subcategory {
            segments.push(sub.key.clone());
        }
        segments.extend(self.remainder.iter().cloned());
        segments
    }

    pub fn folder_key(&self) -> String {
        self.key_segments().join("/")
    }
}

/// Matches folder segments (filename excluded) to section, category and subcategory.
///
/// The segment after the category is taken as a subcategory whenever its key or label
/// matches one declared under that category, first match wins. A free folder named like
/// a subcategory is therefore always read as that subcategory.
pub fn resolve_path<'a, S: AsRef<str>>(
    schema: &'a CategorySchema,
    segments: &[S],
) -> Result<Resolved<'a>> {
    let mut iter = segments.iter().map(|s| s.as_ref());

    let section_segment = iter
        .next()
        .ok_or_else(|| AppError::schema_mismatch("path has no section"))?;
    let section = schema
        .find_section(section_segment)
        .ok_or_else(|| AppError::schema_mismatch(format!("unknown section '{}'", section_segment)))?;

    let category_segment = iter
        .next()
        .ok_or_else(|| AppError::schema_mismatch("path has no category"))?;
    let category = section.find_category(category_segment).ok_or_else(|| {
        AppError::schema_mismatch(format!(
            "unknown category '{}' in section '{}'",
            category_segment, section.key
        ))
    })?;

    let mut rest: Vec<String> = iter.map(str::to_string).collect();
    let subcategory = match rest.first() {
        Some(first) => category.find_subcategory(first),
        None => None,
    };
    if subcategory.is_some() {
        rest.remove(0);
    }

    Ok(Resolved {
        section,
        category,
        subcategory,
        remainder: rest,
    })
}

/// Keeps letters (Spanish accents included), digits, space and `-_.()`.
pub fn sanitize_segment(raw: &str) -> String {
    const ACCENTED: &str = "áéíóúÁÉÍÓÚñÑüÜ";
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || ACCENTED.contains(*c) || " -_.()".contains(*c))
        .collect();
    let trimmed = kept.trim();
    if trimmed.chars().all(|c| c == '.') {
        return String::new();
    }
    trimmed.to_string()
}

/// Splits an uploader-supplied sub-path on either slash style and drops empty segments.
pub fn split_subpath(raw: &str) -> Vec<String> {
    raw.split(['/', '\\'])
        .map(sanitize_segment)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Strips any directory part a client sent along with the filename.
pub fn clean_filename(raw: &str) -> Result<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base.chars().all(|c| c == '.') {
        return Err(AppError::Validation("filename must not be empty".to_string()));
    }
    Ok(base.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Section,
    Category,
    Subcategory,
    Folder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeFile {
    pub id: Uuid,
    pub filename: String,
    pub version: i32,
    pub size_bytes: i64,
    pub uploaded_at: i64,
    pub pending_delete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub key: String,
    pub label: String,
    pub kind: NodeKind,
    pub parent: Option<String>,
    pub children: BTreeSet<String>,
    pub files: Vec<TreeFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveTree {
    pub roots: Vec<String>,
    pub nodes: BTreeMap<String, TreeNode>,
    /// Files whose stored path no longer matches the schema.
    pub unresolved: Vec<Uuid>,
}

impl ArchiveTree {
    pub fn node(&self, key: &str) -> Option<&TreeNode> {
        self.nodes.get(key)
    }

    fn ensure_node(&mut self, key: String, label: &str, kind: NodeKind, parent: Option<&str>) {
        if !self.nodes.contains_key(&key) {
            self.nodes.insert(
                key.clone(),
                TreeNode {
                    key: key.clone(),
                    label: label.to_string(),
                    kind,
                    parent: parent.map(str::to_string),
                    children: BTreeSet::new(),
                    files: Vec::new(),
                },
            );
        }
        if let Some(parent_key) = parent {
            if let Some(parent_node) = self.nodes.get_mut(parent_key) {
                parent_node.children.insert(key);
            }
        }
    }
}

/// Groups archive files under one node per (section, category, subcategory, free-folder prefix).
pub fn build_tree(schema: &CategorySchema, files: &[categorized_file::Model]) -> ArchiveTree {
    let mut tree = ArchiveTree::default();

    // Schema skeleton first so empty categories stay navigable.
    for section in &schema.sections {
        tree.roots.push(section.key.clone());
        tree.ensure_node(section.key.clone(), &section.label, NodeKind::Section, None);
        for category in &section.categories {
            let category_key = format!("{}/{}", section.key, category.key);
            tree.ensure_node(category_key.clone(), &category.label, NodeKind::Category, Some(&section.key));
            for sub in &category.children {
                tree.ensure_node(
                    format!("{}/{}", category_key, sub.key),
                    &sub.label,
                    NodeKind::Subcategory,
                    Some(&category_key),
                );
            }
        }
    }

    for file in files {
        let segments = file.segments();
        let Some((_, folders)) = segments.split_last() else {
            tree.unresolved.push(file.id);
            continue;
        };
        let resolved = match resolve_path(schema, folders) {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::warn!(file_id = %file.id, path = %file.path, "archive path does not resolve: {}", err);
                tree.unresolved.push(file.id);
                continue;
            }
        };

        let mut parent = format!("{}/{}", resolved.section.key, resolved.category.key);
        if let Some(sub) = resolved.subcategory {
            parent = format!("{}/{}", parent, sub.key);
        }
        for folder in &resolved.remainder {
            let key = format!("{}/{}", parent, folder);
            tree.ensure_node(key.clone(), folder, NodeKind::Folder, Some(&parent));
            parent = key;
        }

        if let Some(node) = tree.nodes.get_mut(&parent) {
            node.files.push(TreeFile {
                id: file.id,
                filename: file.filename.clone(),
                version: file.version,
                size_bytes: file.size_bytes,
                uploaded_at: file.uploaded_at,
                pending_delete: file.pending_delete,
            });
        }
    }

    for node in tree.nodes.values_mut() {
        node.files
            .sort_by(|a, b| (&a.filename, a.version, a.id).cmp(&(&b.filename, b.version, b.id)));
    }
    tree.unresolved.sort();

    tree
}
