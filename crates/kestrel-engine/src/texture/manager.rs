use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use crate::device::GpuDevice;

use super::texture::TextureData;
use super::TextureId;

/// Non-owning registry of live textures plus the dynamic-link graph.
///
/// Textures are owned by whoever created them; the manager only keeps weak
/// references for bulk operations. Links are stored as an adjacency map so the
/// relation is symmetric by construction and teardown never has to chase
/// back-pointers stored inside textures.
#[derive(Default)]
pub struct TextureManager {
    entries: HashMap<TextureId, Weak<RefCell<TextureData>>>,
    links: HashMap<TextureId, HashSet<TextureId>>,
}

impl TextureManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, id: TextureId, data: &Rc<RefCell<TextureData>>) {
        self.entries.insert(id, Rc::downgrade(data));
    }

    /// Removes the texture and every link touching it.
    pub(crate) fn unregister(&mut self, id: TextureId) {
        self.entries.remove(&id);
        self.remove_node(id);
    }

    /// Registered textures that are still alive.
    fn live(&self) -> Vec<Rc<RefCell<TextureData>>> {
        self.entries.values().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn get(&self, id: TextureId) -> Option<Rc<RefCell<TextureData>>> {
        self.entries.get(&id).and_then(Weak::upgrade)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn loaded_count(&self) -> usize {
        self.live().iter().filter(|t| t.borrow().is_loaded()).count()
    }

    /// Bytes held in RAM copies plus (estimated) GPU storage of loaded textures.
    pub fn memory_usage(&self) -> usize {
        self.live().iter().map(|t| t.borrow().memory_usage()).sum()
    }

    pub fn ids(&self) -> Vec<TextureId> {
        let mut ids: Vec<TextureId> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }

    // ── bulk operations ──────────────────────────────────────────────────

    /// Unloads every registered texture (low memory, focus loss, destroy).
    pub(crate) fn unload_all(&self, device: &mut dyn GpuDevice) -> usize {
        self.live()
            .iter()
            .filter(|t| t.borrow_mut().unload(device))
            .count()
    }

    /// Advances idle timers; dynamic textures idle longer than `threshold` unload.
    pub(crate) fn update_all(&self, dt: f32, threshold: f32, device: &mut dyn GpuDevice) {
        for tex in self.live() {
            tex.borrow_mut().update(dt, threshold, device);
        }
    }

    /// Device reset: backend handles are gone, textures stay registered.
    pub(crate) fn invalidate_gpu_handles(&self) {
        for tex in self.live() {
            tex.borrow_mut().invalidate_gpu_handle();
        }
    }

    /// Resets the idle timer of `id`; with `recursive`, also of its direct links.
    pub(crate) fn reset_unused_timer(&self, id: TextureId, recursive: bool) {
        if let Some(tex) = self.get(id) {
            tex.borrow_mut().unused_time = 0.0;
        }
        if recursive {
            for other in self.links_of(id) {
                if let Some(tex) = self.get(other) {
                    tex.borrow_mut().unused_time = 0.0;
                }
            }
        }
    }

    // ── dynamic-link graph ───────────────────────────────────────────────

    /// Links `a` and `b` both ways. Self-links are ignored.
    pub fn link(&mut self, a: TextureId, b: TextureId) -> bool {
        if a == b {
            return false;
        }
        let added = self.links.entry(a).or_default().insert(b);
        self.links.entry(b).or_default().insert(a);
        added
    }

    /// Removes the link from both sides.
    pub fn unlink(&mut self, a: TextureId, b: TextureId) -> bool {
        let removed = self.detach(a, b);
        self.detach(b, a);
        removed
    }

    fn detach(&mut self, from: TextureId, to: TextureId) -> bool {
        let Some(set) = self.links.get_mut(&from) else {
            return false;
        };
        let removed = set.remove(&to);
        if set.is_empty() {
            self.links.remove(&from);
        }
        removed
    }

    pub fn is_linked(&self, a: TextureId, b: TextureId) -> bool {
        self.links.get(&a).is_some_and(|s| s.contains(&b))
    }

    pub fn links_of(&self, id: TextureId) -> Vec<TextureId> {
        let mut out: Vec<TextureId> = self
            .links
            .get(&id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Drops `id` from the graph, severing all of its links.
    pub fn remove_node(&mut self, id: TextureId) {
        if let Some(peers) = self.links.remove(&id) {
            for peer in peers {
                self.detach(peer, id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (TextureId, TextureId, TextureId) {
        (TextureId::next(), TextureId::next(), TextureId::next())
    }

    #[test]
    fn link_is_symmetric() {
        let (a, b, _) = ids();
        let mut m = TextureManager::new();
        assert!(m.link(a, b));
        assert!(m.is_linked(a, b));
        assert!(m.is_linked(b, a));
        assert!(!m.link(b, a), "already linked");
    }

    #[test]
    fn unlink_from_either_side_removes_both() {
        let (a, b, _) = ids();
        let mut m = TextureManager::new();
        m.link(a, b);
        assert!(m.unlink(b, a));
        assert!(!m.is_linked(a, b));
        assert!(!m.is_linked(b, a));
        assert!(m.links_of(a).is_empty());
    }

    #[test]
    fn self_link_is_ignored() {
        let (a, _, _) = ids();
        let mut m = TextureManager::new();
        assert!(!m.link(a, a));
        assert!(m.links_of(a).is_empty());
    }

    #[test]
    fn removing_a_node_severs_all_links() {
        let (a, b, c) = ids();
        let mut m = TextureManager::new();
        m.link(a, b);
        m.link(a, c);
        m.link(b, c);
        m.remove_node(a);
        assert!(m.links_of(a).is_empty());
        assert_eq!(m.links_of(b), vec![c]);
        assert_eq!(m.links_of(c), vec![b]);
    }
}
