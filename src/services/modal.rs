use serde::Serialize;

use crate::errors::ModalError;

const MAX_DEPTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialog {
    StaffGrading,
    GradeEntry,
    ManageAnnotations,
    StaffDebug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalState {
    Closed,
    Single(Dialog),
    Stacked { parent: Dialog, child: Dialog },
}

/// What happened to the shared backdrop as a result of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackdropChange {
    Shown,
    Unchanged,
    Hidden,
}

/// Owns the dialog stack and the one backdrop beneath it. Dialogs ask this
/// coordinator to open and close; nothing else touches the backdrop.
#[derive(Debug, Default)]
pub struct ModalCoordinator {
    stack: Vec<Dialog>,
    backdrop_visible: bool,
}

impl ModalCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ModalState {
        match self.stack.as_slice() {
            [] => ModalState::Closed,
            [single] => ModalState::Single(*single),
            [.., parent, child] => ModalState::Stacked { parent: *parent, child: *child },
        }
    }

    pub fn backdrop_visible(&self) -> bool {
        self.backdrop_visible
    }

    pub fn top(&self) -> Option<Dialog> {
        self.stack.last().copied()
    }

    pub fn is_open(&self, dialog: Dialog) -> bool {
        self.stack.contains(&dialog)
    }

    /// Only the topmost dialog receives input.
    pub fn is_interactive(&self, dialog: Dialog) -> bool {
        self.top() == Some(dialog)
    }

    /// Pushes `dialog` on top of whatever is open. Re-opening the topmost
    /// dialog is a no-op.
    pub fn open(&mut self, dialog: Dialog) -> Result<BackdropChange, ModalError> {
        if self.top() == Some(dialog) {
            return Ok(BackdropChange::Unchanged);
        }
        if self.is_open(dialog) {
            return Err(ModalError::AlreadyOpen(dialog));
        }
        if self.stack.len() >= MAX_DEPTH {
            return Err(ModalError::StackFull);
        }

        self.stack.push(dialog);
        let change = self.sync_backdrop();
        tracing::debug!(dialog = ?dialog, depth = self.stack.len(), "Dialog opened");
        Ok(change)
    }

    /// Pops `dialog`, which must be the topmost one. The parent underneath
    /// stays open and the backdrop stays up until the stack is empty.
    pub fn close(&mut self, dialog: Dialog) -> Result<BackdropChange, ModalError> {
        match self.top() {
            Some(top) if top == dialog => {}
            _ if self.is_open(dialog) => return Err(ModalError::NotTopmost(dialog)),
            _ => return Err(ModalError::NotOpen(dialog)),
        }

        self.stack.pop();
        let change = self.sync_backdrop();
        tracing::debug!(dialog = ?dialog, depth = self.stack.len(), "Dialog closed");
        Ok(change)
    }

    /// Closes `dialog` together with anything stacked above it.
    pub fn close_through(&mut self, dialog: Dialog) -> Result<BackdropChange, ModalError> {
        let index = self
            .stack
            .iter()
            .position(|open| *open == dialog)
            .ok_or(ModalError::NotOpen(dialog))?;
        self.stack.truncate(index);
        let change = self.sync_backdrop();
        tracing::debug!(dialog = ?dialog, depth = self.stack.len(), "Dialog stack unwound");
        Ok(change)
    }

    fn sync_backdrop(&mut self) -> BackdropChange {
        let wanted = !self.stack.is_empty();
        if wanted == self.backdrop_visible {
            return BackdropChange::Unchanged;
        }
        self.backdrop_visible = wanted;
        if wanted {
            BackdropChange::Shown
        } else {
            BackdropChange::Hidden
        }
    }
}
