//! Page-indexed render surfaces
//!
//! Each mounted page owns one slot in an arena. A slot holds whatever
//! bitmap was last painted into it; the host reads slots when composing a
//! frame. Unmounting a page frees its slot for reuse and releases the
//! painted bitmap.

use pageflow_cache::{CachedBitmap, Tier};
use std::collections::{BTreeSet, HashMap};

/// Index of a slot in a [`SurfaceArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(usize);

impl SurfaceId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Bitmap currently shown by a surface
#[derive(Debug, Clone)]
pub struct Painted {
    pub bitmap: CachedBitmap,
    /// Tier the bitmap came from; `Warm` means a low quality placeholder
    pub tier: Tier,
}

#[derive(Debug, Clone)]
pub struct Surface {
    pub page: u32,
    pub painted: Option<Painted>,
}

impl Surface {
    pub fn is_blank(&self) -> bool {
        self.painted.is_none()
    }

    /// Whether the surface shows a placeholder awaiting a display render
    pub fn is_placeholder(&self) -> bool {
        self.painted.as_ref().is_some_and(|p| p.tier == Tier::Warm)
    }
}

#[derive(Debug, Default)]
pub struct SurfaceArena {
    slots: Vec<Option<Surface>>,
    free: Vec<usize>,
    by_page: HashMap<u32, SurfaceId>,
}

impl SurfaceArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a surface for `page`, returning the existing one if mounted
    pub fn mount(&mut self, page: u32) -> SurfaceId {
        if let Some(id) = self.by_page.get(&page) {
            return *id;
        }

        let surface = Surface { page, painted: None };
        let id = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(surface);
                SurfaceId(index)
            }
            None => {
                self.slots.push(Some(surface));
                SurfaceId(self.slots.len() - 1)
            }
        };
        self.by_page.insert(page, id);
        id
    }

    /// Unmount `page`, releasing its bitmap
    pub fn unmount(&mut self, page: u32) -> bool {
        let Some(id) = self.by_page.remove(&page) else {
            return false;
        };
        self.slots[id.0] = None;
        self.free.push(id.0);
        true
    }

    /// Make the mounted set equal `pages`
    ///
    /// Returns the pages that were newly mounted.
    pub fn sync(&mut self, pages: &BTreeSet<u32>) -> Vec<u32> {
        let stale: Vec<u32> =
            self.by_page.keys().filter(|p| !pages.contains(*p)).copied().collect();
        for page in stale {
            self.unmount(page);
        }

        let added: Vec<u32> =
            pages.iter().filter(|p| !self.by_page.contains_key(*p)).copied().collect();
        for page in &added {
            self.mount(*page);
        }
        added
    }

    pub fn id_for(&self, page: u32) -> Option<SurfaceId> {
        self.by_page.get(&page).copied()
    }

    pub fn get(&self, id: SurfaceId) -> Option<&Surface> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn surface(&self, page: u32) -> Option<&Surface> {
        self.id_for(page).and_then(|id| self.get(id))
    }

    pub fn is_mounted(&self, page: u32) -> bool {
        self.by_page.contains_key(&page)
    }

    /// Paint a bitmap into the surface of `page`
    ///
    /// Returns `false` if the page is not mounted.
    pub fn paint(&mut self, page: u32, bitmap: CachedBitmap, tier: Tier) -> bool {
        let Some(id) = self.id_for(page) else {
            return false;
        };
        match self.slots.get_mut(id.0).and_then(Option::as_mut) {
            Some(surface) => {
                surface.painted = Some(Painted { bitmap, tier });
                true
            }
            None => false,
        }
    }

    /// Blank every surface without unmounting it
    pub fn clear_paint(&mut self) {
        for surface in self.slots.iter_mut().flatten() {
            surface.painted = None;
        }
    }

    /// Mounted pages in ascending order
    pub fn mounted_pages(&self) -> BTreeSet<u32> {
        self.by_page.keys().copied().collect()
    }

    /// Unmount everything
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.by_page.clear();
    }

    pub fn len(&self) -> usize {
        self.by_page.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_page.is_empty()
    }
}
