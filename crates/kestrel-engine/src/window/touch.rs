use glam::Vec2;

use super::queue::{MouseEventKind, TouchEventKind};

/// What a touch event turns into after tracking.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TouchOutput {
    /// Single-touch emulation of the left mouse button.
    Mouse(MouseEventKind, Vec2),
    /// Multi-touch: every active touch, in the order they went down.
    Touches(Vec<Vec2>),
}

/// Per-index touch tracking with single-touch mouse emulation.
///
/// A lone touch drives mouse down/move/up. When a second touch lands, the
/// emulated gesture is cancelled and delivery switches to multi-touch lists
/// until every touch has lifted.
#[derive(Debug, Default)]
pub(crate) struct TouchTracker {
    touches: Vec<(u32, Vec2)>,
    multi_touch: bool,
}

impl TouchTracker {
    pub(crate) fn is_multi_touch(&self) -> bool {
        self.multi_touch
    }

    pub(crate) fn active(&self) -> usize {
        self.touches.len()
    }

    pub(crate) fn clear(&mut self) {
        self.touches.clear();
        self.multi_touch = false;
    }

    fn slot(&self, index: u32) -> Option<usize> {
        self.touches.iter().position(|(i, _)| *i == index)
    }

    fn positions(&self) -> Vec<Vec2> {
        self.touches.iter().map(|(_, p)| *p).collect()
    }

    /// Duplicate downs and ups/moves for untracked indices produce nothing.
    pub(crate) fn handle(
        &mut self,
        kind: TouchEventKind,
        index: u32,
        position: Vec2,
    ) -> Vec<TouchOutput> {
        let slot = self.slot(index);
        match kind {
            TouchEventKind::Down => {
                if slot.is_some() {
                    log::debug!("touch {index} already down");
                    return Vec::new();
                }
                self.touches.push((index, position));
                if self.touches.len() == 1 && !self.multi_touch {
                    return vec![TouchOutput::Mouse(MouseEventKind::Down, position)];
                }
                let mut out = Vec::with_capacity(2);
                if !self.multi_touch {
                    self.multi_touch = true;
                    out.push(TouchOutput::Mouse(MouseEventKind::Cancel, self.touches[0].1));
                }
                out.push(TouchOutput::Touches(self.positions()));
                out
            }
            TouchEventKind::Move => {
                let Some(slot) = slot else {
                    return Vec::new();
                };
                self.touches[slot].1 = position;
                if self.multi_touch {
                    vec![TouchOutput::Touches(self.positions())]
                } else {
                    vec![TouchOutput::Mouse(MouseEventKind::Move, position)]
                }
            }
            TouchEventKind::Up => {
                let Some(slot) = slot else {
                    return Vec::new();
                };
                self.touches.remove(slot);
                if !self.multi_touch {
                    return vec![TouchOutput::Mouse(MouseEventKind::Up, position)];
                }
                let out = vec![TouchOutput::Touches(self.positions())];
                if self.touches.is_empty() {
                    self.multi_touch = false;
                }
                out
            }
        }
    }
}
