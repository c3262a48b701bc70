/// Lifecycle of one frame record as it moves through the processing steps.
///
/// ```text
/// Acquired → Grayscaled → Resized → Equalized → FacesDetected → Annotated → Delivered
///     └──────────┴──────────┴──────────┴─────────────┴─────────────┴──→ Dropped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameState {
    Acquired,
    Grayscaled,
    Resized,
    Equalized,
    FacesDetected,
    Annotated,
    Delivered,
    Dropped,
}

impl FrameState {
    /// The state reached by the next processing step, `None` for terminal states.
    pub fn next(self) -> Option<FrameState> {
        match self {
            FrameState::Acquired => Some(FrameState::Grayscaled),
            FrameState::Grayscaled => Some(FrameState::Resized),
            FrameState::Resized => Some(FrameState::Equalized),
            FrameState::Equalized => Some(FrameState::FacesDetected),
            FrameState::FacesDetected => Some(FrameState::Annotated),
            FrameState::Annotated => Some(FrameState::Delivered),
            FrameState::Delivered | FrameState::Dropped => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FrameState::Delivered | FrameState::Dropped)
    }

    pub fn can_transition_to(self, target: FrameState) -> bool {
        if self.is_terminal() {
            return false;
        }
        target == FrameState::Dropped || self.next() == Some(target)
    }

    /// Move to `target`. Out-of-order transitions are a programming error;
    /// they trip a debug assertion and are logged in release builds.
    pub fn transition(self, target: FrameState) -> FrameState {
        debug_assert!(
            self.can_transition_to(target),
            "invalid frame transition {:?} -> {:?}",
            self,
            target
        );
        if !self.can_transition_to(target) {
            log::warn!("⚠️ invalid frame transition {:?} -> {:?}", self, target);
        }
        target
    }
}
