use crate::config::PanPolicy;
use crate::event::{EventKind, PAN_CENTER, PAN_CONTROLLER};
use crate::passes::Pass;
use crate::store::EventStore;
use crate::Result;

/// Strips or centres the pan automation a file arrives with.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanningRemover {
    pub policy: PanPolicy,
}

impl PanningRemover {
    pub fn new(policy: PanPolicy) -> Self {
        Self { policy }
    }
}

impl Pass for PanningRemover {
    fn name(&self) -> &'static str {
        "panning-remover"
    }

    fn apply(&self, store: &mut EventStore) -> Result<()> {
        let mut touched = 0usize;
        match self.policy {
            PanPolicy::Remove => {
                store.retain(|ev| {
                    let pan = ev.is_pan();
                    touched += pan as usize;
                    !pan
                });
            }
            PanPolicy::Center => {
                for (_, _, kind) in store.kinds_mut() {
                    if let EventKind::ControlChange {
                        controller: PAN_CONTROLLER,
                        value,
                        ..
                    } = kind
                    {
                        *value = PAN_CENTER;
                        touched += 1;
                    }
                }
            }
        }
        tracing::debug!(policy = ?self.policy, touched, "panning removed");
        Ok(())
    }
}
