use std::collections::VecDeque;
use std::sync::Arc;

use glam::Vec2;
use parking_lot::Mutex;

use crate::input::{ControllerAxis, ControllerButton, InputMode, Key, MouseButton};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum KeyEventKind {
    Down,
    Up,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MouseEventKind {
    Down,
    Up,
    /// The gesture that produced the last `Down` was abandoned; no `Up` follows.
    Cancel,
    Move,
    /// `position` carries the scroll delta instead of a position.
    Scroll,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TouchEventKind {
    Down,
    Up,
    Move,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SystemEvent {
    FocusChanged(bool),
    LowMemory,
    /// The platform asks to close; `can_cancel` says whether a delegate may refuse.
    QuitRequest { can_cancel: bool },
    SizeChanged { width: u32, height: u32, fullscreen: bool },
    /// `height_ratio` is the share of the window covered by the keyboard.
    VirtualKeyboardChanged { visible: bool, height_ratio: f32 },
    InputModeChanged(InputMode),
}

/// One event waiting for the next drain.
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedEvent {
    /// `key` is `Key::None` for character-only events.
    Key { kind: KeyEventKind, key: Key, character: Option<char> },
    Mouse { kind: MouseEventKind, position: Vec2, button: MouseButton },
    Touch { kind: TouchEventKind, index: u32, position: Vec2 },
    ControllerButton { kind: KeyEventKind, controller: u32, button: ControllerButton },
    ControllerAxis { controller: u32, axis: ControllerAxis, value: f32 },
    System(SystemEvent),
}

type Shared = Arc<Mutex<VecDeque<QueuedEvent>>>;

/// Consumer side of a window's event queue.
///
/// Producers hold [`EventSender`]s and may live on any thread. Pushing only
/// takes the lock long enough to append; the consumer swaps the whole deque
/// out under the lock and processes it after releasing it.
#[derive(Debug, Default)]
pub struct EventQueue {
    inner: Shared,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> EventSender {
        EventSender { inner: Arc::clone(&self.inner) }
    }

    /// Takes every queued event, coalescing mouse motion and scrolling.
    pub fn drain(&self) -> Vec<QueuedEvent> {
        let events = std::mem::take(&mut *self.inner.lock());
        coalesce(events)
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Producer side of a window's event queue. Cheap to clone, `Send + Sync`.
///
/// Queuing never blocks on dispatch and never dispatches; delegates only see
/// events during the window's next update.
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: Shared,
}

impl EventSender {
    pub fn push(&self, event: QueuedEvent) {
        self.inner.lock().push_back(event);
    }

    pub fn queue_key_event(&self, kind: KeyEventKind, key: Key, character: Option<char>) {
        self.push(QueuedEvent::Key { kind, key, character });
    }

    /// Text input with no key attached (IME commits, virtual keyboards).
    pub fn queue_char(&self, character: char) {
        self.queue_key_event(KeyEventKind::Down, Key::None, Some(character));
    }

    pub fn queue_mouse_event(&self, kind: MouseEventKind, position: Vec2, button: MouseButton) {
        self.push(QueuedEvent::Mouse { kind, position, button });
    }

    pub fn queue_touch_event(&self, kind: TouchEventKind, position: Vec2, index: u32) {
        self.push(QueuedEvent::Touch { kind, index, position });
    }

    pub fn queue_controller_event(
        &self,
        kind: KeyEventKind,
        controller: u32,
        button: ControllerButton,
    ) {
        self.push(QueuedEvent::ControllerButton { kind, controller, button });
    }

    pub fn queue_controller_axis(&self, controller: u32, axis: ControllerAxis, value: f32) {
        self.push(QueuedEvent::ControllerAxis { controller, axis, value });
    }

    pub fn queue_system_event(&self, event: SystemEvent) {
        self.push(QueuedEvent::System(event));
    }
}

/// Collapses runs of mouse moves, and runs of moves of the same touch, to the
/// last one. Runs of scrolls are summed. Everything else keeps its order.
pub fn coalesce(events: impl IntoIterator<Item = QueuedEvent>) -> Vec<QueuedEvent> {
    let mut out: Vec<QueuedEvent> = Vec::new();
    for event in events {
        match (out.last_mut(), &event) {
            (
                Some(QueuedEvent::Mouse { kind: last_kind, position: last, button: last_button }),
                QueuedEvent::Mouse { kind, position, button },
            ) => match (*last_kind, *kind) {
                (MouseEventKind::Move, MouseEventKind::Move) => {
                    *last = *position;
                    *last_button = *button;
                    continue;
                }
                (MouseEventKind::Scroll, MouseEventKind::Scroll) => {
                    *last += *position;
                    continue;
                }
                _ => {}
            },
            (
                Some(QueuedEvent::Touch {
                    kind: TouchEventKind::Move,
                    index: last_index,
                    position: last,
                }),
                QueuedEvent::Touch { kind: TouchEventKind::Move, index, position },
            ) if *last_index == *index => {
                *last = *position;
                continue;
            }
            _ => {}
        }
        out.push(event);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mouse(kind: MouseEventKind, x: f32, y: f32) -> QueuedEvent {
        QueuedEvent::Mouse { kind, position: Vec2::new(x, y), button: MouseButton::Left }
    }

    #[test]
    fn consecutive_moves_collapse_to_last() {
        let q = EventQueue::new();
        let tx = q.sender();
        for i in 0..5 {
            tx.push(mouse(MouseEventKind::Move, i as f32, 0.0));
        }
        tx.push(mouse(MouseEventKind::Down, 9.0, 9.0));
        tx.push(mouse(MouseEventKind::Move, 1.0, 1.0));

        let out = q.drain();
        assert_eq!(
            out,
            vec![
                mouse(MouseEventKind::Move, 4.0, 0.0),
                mouse(MouseEventKind::Down, 9.0, 9.0),
                mouse(MouseEventKind::Move, 1.0, 1.0),
            ]
        );
        assert!(q.is_empty());
    }

    #[test]
    fn consecutive_scrolls_are_summed() {
        let out = coalesce(vec![
            mouse(MouseEventKind::Scroll, 0.0, 1.0),
            mouse(MouseEventKind::Scroll, 0.5, 2.0),
            mouse(MouseEventKind::Move, 3.0, 3.0),
            mouse(MouseEventKind::Scroll, 0.0, -1.0),
        ]);
        assert_eq!(
            out,
            vec![
                mouse(MouseEventKind::Scroll, 0.5, 3.0),
                mouse(MouseEventKind::Move, 3.0, 3.0),
                mouse(MouseEventKind::Scroll, 0.0, -1.0),
            ]
        );
    }

    #[test]
    fn touch_moves_collapse_per_touch() {
        let touch = |kind: TouchEventKind, index: u32, x: f32| QueuedEvent::Touch {
            kind,
            index,
            position: Vec2::new(x, 0.0),
        };
        let out = coalesce(vec![
            touch(TouchEventKind::Down, 0, 0.0),
            touch(TouchEventKind::Move, 0, 1.0),
            touch(TouchEventKind::Move, 0, 2.0),
            touch(TouchEventKind::Move, 0, 3.0),
            touch(TouchEventKind::Move, 1, 7.0),
            touch(TouchEventKind::Move, 0, 4.0),
            touch(TouchEventKind::Up, 0, 4.0),
        ]);
        assert_eq!(
            out,
            vec![
                touch(TouchEventKind::Down, 0, 0.0),
                touch(TouchEventKind::Move, 0, 3.0),
                touch(TouchEventKind::Move, 1, 7.0),
                touch(TouchEventKind::Move, 0, 4.0),
                touch(TouchEventKind::Up, 0, 4.0),
            ]
        );
    }

    #[test]
    fn non_mouse_events_break_runs() {
        let key = QueuedEvent::Key { kind: KeyEventKind::Down, key: Key::A, character: Some('a') };
        let out = coalesce(vec![
            mouse(MouseEventKind::Move, 1.0, 0.0),
            key.clone(),
            mouse(MouseEventKind::Move, 2.0, 0.0),
        ]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[1], key);
    }

    #[test]
    fn senders_work_across_threads() {
        let q = EventQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let tx = q.sender();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        tx.queue_controller_axis(i, ControllerAxis::LeftX, 0.5);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("producer thread");
        }
        assert_eq!(q.len(), 100);
        assert_eq!(q.drain().len(), 100);
    }
}
