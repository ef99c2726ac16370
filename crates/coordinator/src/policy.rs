//! Propagation policy: maps a requested mode onto the current stack.

use common::HandleId;

use crate::context::TransactionFrame;
use crate::definition::Propagation;

/// What `begin` must do for a new unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Push a logical frame on the existing handle.
    Join(HandleId),

    /// Open a physical transaction; nothing is active.
    OpenNew,

    /// Stash the existing handle on the new frame and open an independent
    /// physical transaction.
    SuspendAndOpenNew(HandleId),
}

/// Decides how a unit of work with `propagation` relates to `top`.
pub fn decide(propagation: Propagation, top: Option<&TransactionFrame>) -> Decision {
    match (propagation, top) {
        (_, None) => Decision::OpenNew,
        (Propagation::Required, Some(top)) => Decision::Join(top.handle()),
        (Propagation::RequiresNew, Some(top)) => Decision::SuspendAndOpenNew(top.handle()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::TransactionDefinition;

    fn frame() -> TransactionFrame {
        TransactionFrame::physical(HandleId::new(), None, TransactionDefinition::required())
    }

    #[test]
    fn required_on_empty_stack_opens_new() {
        assert_eq!(decide(Propagation::Required, None), Decision::OpenNew);
    }

    #[test]
    fn requires_new_on_empty_stack_opens_new() {
        assert_eq!(decide(Propagation::RequiresNew, None), Decision::OpenNew);
    }

    #[test]
    fn required_joins_existing_handle() {
        let top = frame();
        assert_eq!(
            decide(Propagation::Required, Some(&top)),
            Decision::Join(top.handle())
        );
    }

    #[test]
    fn requires_new_suspends_existing_handle() {
        let top = frame();
        assert_eq!(
            decide(Propagation::RequiresNew, Some(&top)),
            Decision::SuspendAndOpenNew(top.handle())
        );
    }
}
