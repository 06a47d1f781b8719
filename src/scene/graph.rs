//! The program scene and its batch-mutation primitive.
//!
//! Readers (the render thread, the push feeder) load an immutable `Arc<Scene>` snapshot and never
//! take a lock. Writers serialize on a mutex, edit a private copy and publish it with one pointer
//! swap, so a reader observes either the scene before a batch or the scene after it.

use crate::foundation::core::{Point, Vec2};
use crate::foundation::error::{StagecastError, StagecastResult};
use crate::scene::item::{Crop, ItemId, ItemInit, Scene, SceneItem};
use crate::scene::source::Source;
use arc_swap::ArcSwap;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

thread_local! {
    static IN_UPDATE: Cell<bool> = const { Cell::new(false) };
}

struct UpdateGuard;

impl UpdateGuard {
    fn enter() -> StagecastResult<Self> {
        if IN_UPDATE.with(|f| f.replace(true)) {
            return Err(StagecastError::validation(
                "atomic_update must not be re-entered from inside a scene mutation",
            ));
        }
        Ok(Self)
    }
}

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        IN_UPDATE.with(|f| f.set(false));
    }
}

struct Shared {
    program: ArcSwap<Scene>,
    writer: Mutex<()>,
    version: AtomicU64,
}

/// Handle to the program slot. Cloning is cheap and every clone sees the same scene.
#[derive(Clone)]
pub struct SceneGraph {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scene = self.bound_scene();
        f.debug_struct("SceneGraph")
            .field("scene", &scene.name())
            .field("items", &scene.len())
            .field("version", &self.version())
            .finish()
    }
}

/// Exclusive write access to a scene during [`SceneGraph::atomic_update`].
#[derive(Debug)]
pub struct SceneEdit<'a> {
    scene: &'a mut Scene,
    dirty: bool,
}

impl SceneEdit<'_> {
    /// Append an item for `source` with the given placement.
    pub fn add(&mut self, source: Arc<Source>, init: ItemInit) -> ItemId {
        let item = SceneItem::new(source, init);
        let id = item.id;
        self.scene.items.push(item);
        self.dirty = true;
        id
    }

    /// Remove an item, returning it.
    pub fn remove(&mut self, id: ItemId) -> Option<SceneItem> {
        let idx = self.scene.items.iter().position(|i| i.id == id)?;
        self.dirty = true;
        Some(self.scene.items.remove(idx))
    }

    /// Borrow an item.
    pub fn get(&self, id: ItemId) -> Option<&SceneItem> {
        self.scene.find(id)
    }

    /// Mutably borrow an item.
    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut SceneItem> {
        let item = self.scene.items.iter_mut().find(|i| i.id == id)?;
        self.dirty = true;
        Some(item)
    }

    /// Move an item to `index` in draw order (clamped to the end).
    pub fn reorder(&mut self, id: ItemId, index: usize) -> bool {
        let Some(from) = self.scene.items.iter().position(|i| i.id == id) else {
            return false;
        };
        let item = self.scene.items.remove(from);
        let to = index.min(self.scene.items.len());
        self.scene.items.insert(to, item);
        self.dirty = true;
        true
    }

    /// Remove every item.
    pub fn clear(&mut self) {
        if !self.scene.items.is_empty() {
            self.scene.items.clear();
            self.dirty = true;
        }
    }

    /// Items in their current (edited) order.
    pub fn items(&self) -> &[SceneItem] {
        self.scene.items()
    }

    /// Number of items in the edited scene.
    pub fn len(&self) -> usize {
        self.scene.len()
    }

    /// `true` when the edited scene has no items.
    pub fn is_empty(&self) -> bool {
        self.scene.is_empty()
    }
}

impl SceneGraph {
    /// Create a graph with an empty scene bound to the program slot.
    pub fn new(scene_name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                program: ArcSwap::from_pointee(Scene::new(scene_name)),
                writer: Mutex::new(()),
                version: AtomicU64::new(0),
            }),
        }
    }

    /// Current program scene snapshot.
    pub fn bound_scene(&self) -> Arc<Scene> {
        self.shared.program.load_full()
    }

    /// Number of batches published so far.
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::Acquire)
    }

    /// Run `f` with exclusive write access to the program scene and publish the result.
    ///
    /// `f` must not block on IO and must not call back into this graph; nested calls fail with a
    /// validation error. If `f` panics nothing is published.
    pub fn atomic_update<R>(&self, f: impl FnOnce(&mut SceneEdit<'_>) -> R) -> StagecastResult<R> {
        let _reentry = UpdateGuard::enter()?;
        let _writer = self
            .shared
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut next = self.shared.program.load().fork();
        let mut edit = SceneEdit {
            scene: &mut next,
            dirty: false,
        };
        let out = f(&mut edit);

        if edit.dirty {
            let items = next.len();
            self.shared.program.store(Arc::new(next));
            let version = self.shared.version.fetch_add(1, Ordering::AcqRel) + 1;
            tracing::trace!(version, items, "scene batch published");
        }
        Ok(out)
    }

    /// Append `source` and set its transform as one batch.
    pub fn add_source(
        &self,
        source: Arc<Source>,
        scale: Vec2,
        visible: bool,
    ) -> StagecastResult<ItemId> {
        self.atomic_update(|edit| {
            edit.add(
                source,
                ItemInit {
                    scale,
                    visible,
                    ..ItemInit::default()
                },
            )
        })
    }

    /// Remove an item. Returns `false` when the id is not in the scene.
    pub fn remove_item(&self, id: ItemId) -> StagecastResult<bool> {
        self.atomic_update(|edit| edit.remove(id).is_some())
    }

    /// Toggle item visibility.
    pub fn set_visible(&self, id: ItemId, visible: bool) -> StagecastResult<bool> {
        self.modify(id, |item| item.visible = visible)
    }

    /// Change item scale.
    pub fn set_scale(&self, id: ItemId, scale: Vec2) -> StagecastResult<bool> {
        self.modify(id, |item| item.scale = scale)
    }

    /// Move an item.
    pub fn set_position(&self, id: ItemId, position: Point) -> StagecastResult<bool> {
        self.modify(id, |item| item.position = position)
    }

    /// Change item crop.
    pub fn set_crop(&self, id: ItemId, crop: Crop) -> StagecastResult<bool> {
        self.modify(id, |item| item.crop = crop)
    }

    /// Bind a new empty scene to the program slot, returning the previous one.
    pub fn bind_scene(&self, name: impl Into<String>) -> StagecastResult<Arc<Scene>> {
        let _reentry = UpdateGuard::enter()?;
        let _writer = self
            .shared
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let prev = self.shared.program.swap(Arc::new(Scene::new(name)));
        self.shared.version.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(previous = prev.name(), "scene bound to program");
        Ok(prev)
    }

    fn modify(&self, id: ItemId, f: impl FnOnce(&mut SceneItem)) -> StagecastResult<bool> {
        self.atomic_update(|edit| match edit.get_mut(id) {
            Some(item) => {
                f(item);
                true
            }
            None => false,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/graph.rs"]
mod tests;
