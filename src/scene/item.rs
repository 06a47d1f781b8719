use crate::foundation::core::{Point, Rect, Vec2};
use crate::scene::source::Source;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique scene item identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(pub u64);

impl ItemId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Pixels trimmed from each edge of a source before placement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Crop {
    /// Pixels removed from the left edge.
    pub left: u32,
    /// Pixels removed from the top edge.
    pub top: u32,
    /// Pixels removed from the right edge.
    pub right: u32,
    /// Pixels removed from the bottom edge.
    pub bottom: u32,
}

/// Initial placement of a new item.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ItemInit {
    /// Scale applied to the source size.
    pub scale: Vec2,
    /// Visibility flag.
    pub visible: bool,
    /// Canvas position of the item's top-left corner.
    pub position: Point,
}

impl Default for ItemInit {
    fn default() -> Self {
        Self {
            scale: Vec2::new(1.0, 1.0),
            visible: true,
            position: Point::ORIGIN,
        }
    }
}

impl ItemInit {
    /// Uniform scale, visible, at the origin.
    pub fn scaled(scale: f64) -> Self {
        Self {
            scale: Vec2::new(scale, scale),
            ..Self::default()
        }
    }
}

/// Placement of one [`Source`] within a [`Scene`].
#[derive(Clone, Debug, PartialEq)]
pub struct SceneItem {
    /// Item identifier.
    pub id: ItemId,
    /// Placed source.
    pub source: Arc<Source>,
    /// Visibility flag.
    pub visible: bool,
    /// Scale applied to the (cropped) source size.
    pub scale: Vec2,
    /// Canvas position of the top-left corner.
    pub position: Point,
    /// Edge crop in source pixels.
    pub crop: Crop,
}

impl SceneItem {
    pub(crate) fn new(source: Arc<Source>, init: ItemInit) -> Self {
        Self {
            id: ItemId::next(),
            source,
            visible: init.visible,
            scale: init.scale,
            position: init.position,
            crop: Crop::default(),
        }
    }

    /// Canvas-space bounds, `None` for audio-only sources or fully cropped items.
    pub fn bounds(&self) -> Option<Rect> {
        let size = self.source.size()?;
        let w = size.width - f64::from(self.crop.left) - f64::from(self.crop.right);
        let h = size.height - f64::from(self.crop.top) - f64::from(self.crop.bottom);
        if w <= 0.0 || h <= 0.0 {
            return None;
        }
        let w = w * self.scale.x;
        let h = h * self.scale.y;
        Some(Rect::new(
            self.position.x,
            self.position.y,
            self.position.x + w,
            self.position.y + h,
        ))
    }
}

/// An ordered collection of scene items. Published scenes are immutable.
///
/// There is no public `Clone`: item ids stay unique to one scene.
#[derive(Debug, PartialEq)]
pub struct Scene {
    name: String,
    pub(crate) items: Vec<SceneItem>,
}

impl Scene {
    /// Empty scene named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    /// Scene name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Items in draw order (first is bottom-most).
    pub fn items(&self) -> &[SceneItem] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` when the scene has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up an item by id.
    pub fn find(&self, id: ItemId) -> Option<&SceneItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Visible items in draw order.
    pub fn visible_items(&self) -> impl Iterator<Item = &SceneItem> {
        self.items.iter().filter(|i| i.visible)
    }

    /// Copy that becomes the next version of this scene. The copy keeps the item ids, so only
    /// one of the two may ever be published.
    pub(crate) fn fork(&self) -> Self {
        Self {
            name: self.name.clone(),
            items: self.items.clone(),
        }
    }
}
