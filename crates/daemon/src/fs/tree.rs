//! Mount-time tree population from a full bucket listing.

use std::sync::Arc;

use tracing::info;

use object_store::Bucket;

use crate::database::Database;
use crate::fs::{DirectoryNode, FsError};

/// Lists every object in the bucket and synthesizes the directory tree.
///
/// Each key is split on `/`; every ancestor directory is created on first
/// encounter and reused afterward, so common prefixes yield exactly one
/// node. Keys with a trailing slash are directory markers and create the
/// chain without a file leaf.
///
/// Failures (listing or metadata) are returned to the caller rather than
/// aborting the process, so a mount attempt can be retried.
pub async fn build_tree(
    bucket: Arc<dyn Bucket>,
    db: Database,
) -> Result<Arc<DirectoryNode>, FsError> {
    let root = DirectoryNode::root(bucket.clone(), db).await?;

    let objects = bucket.list().await?;
    info!(objects = objects.len(), "populating tree from listing");

    for object in &objects {
        let is_marker = object.key.ends_with('/');

        let mut dir = root.clone();
        let mut components = object.key.split('/').filter(|c| !c.is_empty()).peekable();
        while let Some(component) = components.next() {
            let is_leaf = components.peek().is_none();
            if is_leaf && !is_marker {
                dir.attach_file(component, object).await?;
            } else {
                dir = dir.ensure_dir(component).await?;
            }
        }
    }

    Ok(root)
}
