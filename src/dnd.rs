// Copyright 2023 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! Drop target notifications and the listener that receives them.

use kurbo::Point;

use crate::backend::x11::{Atom, DropContext, Window};
use crate::common_util::Counter;

bitflags::bitflags! {
    /// The drop actions a source offers or a user asks for.
    ///
    /// An empty set means no action, which is how a drop target rejects a drag.
    #[derive(Default)]
    pub struct DropActions: u32 {
        const COPY = 0b001;
        const MOVE = 0b010;
        const LINK = 0b100;
    }
}

impl DropActions {
    /// The single action that is preferred when several are allowed.
    ///
    /// Copy wins over move, which wins over link.
    pub fn preferred(self) -> DropActions {
        [DropActions::COPY, DropActions::MOVE, DropActions::LINK]
            .into_iter()
            .find(|action| self.contains(*action))
            .unwrap_or_else(DropActions::empty)
    }
}

/// The kind of a drop notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DropEventKind {
    /// The drag entered a drop site.
    Enter,
    /// The drag moved over a drop site, or the offered actions changed.
    Motion,
    /// The drag left a drop site, or the session ended without a drop.
    Exit,
    /// The data was dropped.
    Drop,
}

/// The classification of a raw client message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    Enter,
    Motion,
    Leave,
    Drop,
    Unknown,
}

/// A unique identifier for a drag session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DragDropToken(std::num::NonZeroU64);

impl DragDropToken {
    /// Create a new, unique token.
    pub(crate) fn next() -> DragDropToken {
        static COUNTER: Counter = Counter::new();
        DragDropToken(COUNTER.next_nonzero())
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

/// A normalized drag event for one of our drop sites.
#[derive(Clone, Debug)]
pub struct DropNotification {
    /// The drop site the event is about.
    pub window: Window,
    pub kind: DropEventKind,
    /// The pointer position in the drop site's coordinates, in logical pixels.
    pub position: Point,
    /// The action the user asked for.
    pub action: DropActions,
    /// The actions the source allows.
    pub source_actions: DropActions,
    /// The formats the source can provide, as atoms.
    pub formats: Vec<Atom>,
    /// The message that caused the event, to be handed back when responding.
    ///
    /// This is `None` for the exits generated when a session is torn down.
    pub context: Option<DropContext>,
}

/// Receives the drop notifications of a [`DropTargetShell`].
///
/// The listener is called on the event thread, without any lock of the shell held, so it
/// may call back into the shell to respond.
///
/// [`DropTargetShell`]: crate::x11::DropTargetShell
pub trait DropTargetListener: Send {
    fn notify(&mut self, notification: DropNotification);
}

impl<F> DropTargetListener for F
where
    F: FnMut(DropNotification) + Send,
{
    fn notify(&mut self, notification: DropNotification) {
        self(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn preferred_action() {
        assert_eq!(DropActions::all().preferred(), DropActions::COPY);
        assert_eq!(
            (DropActions::MOVE | DropActions::LINK).preferred(),
            DropActions::MOVE
        );
        assert!(DropActions::empty().preferred().is_empty());
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(DragDropToken::next(), DragDropToken::next());
    }
}
