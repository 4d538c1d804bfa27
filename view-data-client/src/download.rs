//! Downloading translated derivatives
//!
//! Walks the manifest tree of a model, fetches every `resource` item and
//! writes it under a target directory, keeping the service's output layout.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::api_client::{Manifest, ManifestNode, ViewDataClient};
use crate::urn::ITEM_URN_PREFIX;

const MIME_SVF: &str = "application/autodesk-svf";
const MIME_F2D: &str = "application/autodesk-f2d";

/// What a downloaded item is used for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ItemKind {
    /// 3D viewable entry point (SVF)
    #[serde(rename = "3d")]
    ThreeD,
    /// 2D viewable entry point (F2D)
    #[serde(rename = "2d")]
    TwoD,
    /// Any other derivative file
    #[serde(rename = "resource")]
    Resource,
}

impl ItemKind {
    fn from_mime(mime: &str) -> Self {
        match mime {
            MIME_SVF => ItemKind::ThreeD,
            MIME_F2D => ItemKind::TwoD,
            _ => ItemKind::Resource,
        }
    }
}

/// A derivative written to disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadedItem {
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub urn: String,
    pub path: PathBuf,
}

/// Resource nodes of a manifest, depth first, each item URN once
pub fn collect_resources(manifest: &Manifest) -> Vec<&ManifestNode> {
    fn walk<'m>(nodes: &'m [ManifestNode], seen: &mut HashSet<&'m str>, out: &mut Vec<&'m ManifestNode>) {
        for node in nodes {
            if node.node_type == "resource" {
                if let Some(urn) = node.urn.as_deref() {
                    if seen.insert(urn) {
                        out.push(node);
                    }
                }
            }
            walk(&node.children, seen, out);
        }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    walk(&manifest.children, &mut seen, &mut out);
    out
}

/// Path of an item relative to the download directory
///
/// `urn:adsk.viewing:fs.file:<model urn>/output/1/model.svf` becomes
/// `output/1/model.svf`. Empty, `.` and `..` components are rejected.
pub fn relative_item_path(model_urn: &str, item_urn: &str) -> Result<PathBuf> {
    let path = item_urn.strip_prefix(ITEM_URN_PREFIX).unwrap_or(item_urn);
    let model_root = format!("{}/", model_urn);
    let path = path
        .strip_prefix(model_root.as_str())
        .unwrap_or_else(|| path.rsplit(':').next().unwrap_or(path));

    let mut relative = PathBuf::new();
    for segment in path.split('/') {
        match Path::new(segment).components().next() {
            Some(Component::Normal(_)) if !segment.contains('\\') => relative.push(segment),
            _ => anyhow::bail!("Refusing to write item outside download directory: {}", item_urn),
        }
    }

    if relative.as_os_str().is_empty() {
        anyhow::bail!("Item URN has no file path: {}", item_urn);
    }

    Ok(relative)
}

impl ViewDataClient {
    /// Download every derivative of `urn` into `directory`
    ///
    /// Returns one entry per written file; SVF and F2D entry points are
    /// tagged `3d` / `2d`.
    pub async fn download(&self, urn: &str, directory: &Path) -> Result<Vec<DownloadedItem>> {
        let manifest = self.get_manifest(urn).await?;
        let resources = collect_resources(&manifest);

        if resources.is_empty() {
            anyhow::bail!("Manifest of {} has no downloadable items", urn);
        }

        tracing::info!(
            "📥 Downloading {} item(s) of {} to {}",
            resources.len(),
            urn,
            directory.display()
        );

        let mut items = Vec::with_capacity(resources.len());
        for node in resources {
            // collect_resources only returns nodes with an item URN
            let Some(item_urn) = node.urn.as_deref() else {
                continue;
            };

            let target = directory.join(relative_item_path(urn, item_urn)?);
            let bytes = self.get_item(item_urn).await?;

            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tokio::fs::write(&target, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", target.display()))?;

            tracing::debug!("Wrote {} ({} bytes)", target.display(), bytes.len());

            items.push(DownloadedItem {
                kind: ItemKind::from_mime(&node.mime),
                urn: item_urn.to_string(),
                path: target,
            });
        }

        Ok(items)
    }
}
