//! The renderer-owned scene handle and its edit guard.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::error::{SgError, SgResult};
use crate::graph::SgGraph;

/// A live renderer scene. Every mutation happens inside an edit
/// section obtained with [`SgScene::edit`].
#[derive(Debug, Default)]
pub struct SgScene {
    graph: Mutex<SgGraph>,
    closed: AtomicBool,
    edits: AtomicU64,
}

impl SgScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an edit section. Sections are not re-entrant: opening a second
    /// one from the same thread while the first is alive deadlocks.
    pub fn edit(&self) -> SgResult<SceneEdit<'_>> {
        if self.is_closed() {
            return Err(SgError::Closed);
        }
        Ok(SceneEdit {
            guard: self.graph.lock(),
            edits: &self.edits,
        })
    }

    /// Read-only view of the graph, for inspection and tests.
    pub fn read(&self) -> MutexGuard<'_, SgGraph> {
        self.graph.lock()
    }

    /// Mark the scene as gone. Later edits fail with [`SgError::Closed`].
    pub fn close(&self) {
        log::info!("Renderer scene closed");
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of completed edit sections.
    pub fn edit_count(&self) -> u64 {
        self.edits.load(Ordering::SeqCst)
    }
}

/// An open edit section. Dropping it commits the edit.
pub struct SceneEdit<'a> {
    guard: MutexGuard<'a, SgGraph>,
    edits: &'a AtomicU64,
}

impl Deref for SceneEdit<'_> {
    type Target = SgGraph;

    fn deref(&self) -> &SgGraph {
        &self.guard
    }
}

impl DerefMut for SceneEdit<'_> {
    fn deref_mut(&mut self) -> &mut SgGraph {
        &mut self.guard
    }
}

impl Drop for SceneEdit<'_> {
    fn drop(&mut self) {
        let n = self.edits.fetch_add(1, Ordering::SeqCst) + 1;
        log::trace!("edit section {} committed ({} nodes)", n, self.guard.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    #[test]
    fn test_edit_sections_are_counted() {
        let scene = SgScene::new();
        {
            let mut edit = scene.edit().unwrap();
            let g = edit.create_node(NodeKind::Group, "g");
            let root = edit.root();
            edit.add_child(root, g).unwrap();
        }
        assert_eq!(scene.edit_count(), 1);
        assert!(scene.read().find_by_name("g").is_some());
    }

    #[test]
    fn test_closed_scene_rejects_edits() {
        let scene = SgScene::new();
        scene.close();
        assert!(matches!(scene.edit(), Err(SgError::Closed)));
        assert_eq!(scene.edit_count(), 0);
    }
}
