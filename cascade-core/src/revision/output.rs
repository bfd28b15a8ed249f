//! Output Computation
//!
//! The transformation that turns a revision's combined input into its output
//! is an external collaborator, the [`Processor`]. This module also holds the
//! write-once slot a revision keeps its output in.

use std::sync::OnceLock;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::Result;

/// The domain transformation from combined input to output.
///
/// Assumed deterministic for a given input and free of side effects the
/// engine could observe. It may be slow; the engine applies no timeout.
pub trait Processor: Send + Sync {
    fn process(&self, combined: String) -> String;
}

impl<F> Processor for F
where
    F: Fn(String) -> String + Send + Sync,
{
    fn process(&self, combined: String) -> String {
        self(combined)
    }
}

/// Returns the combined input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Processor for Passthrough {
    fn process(&self, combined: String) -> String {
        combined
    }
}

/// Write-once output storage with a single-flight guard.
#[derive(Debug, Default)]
pub(crate) struct OutputSlot {
    value: OnceLock<String>,

    /// Held while the value is being produced.
    in_flight: Mutex<()>,

    /// Woken once the value is stored.
    ready: Notify,
}

impl OutputSlot {
    pub(crate) fn get(&self) -> Option<&str> {
        self.value.get().map(String::as_str)
    }

    /// Return the stored value, producing it with `produce` if absent.
    ///
    /// The boolean is `true` only for the call that actually stored the
    /// value. Concurrent callers wait on the in-flight producer and then see
    /// its result. If `produce` fails the slot stays empty.
    pub(crate) fn get_or_try_fill<F>(&self, produce: F) -> Result<(String, bool)>
    where
        F: FnOnce() -> Result<String>,
    {
        if let Some(value) = self.value.get() {
            return Ok((value.clone(), false));
        }

        let _flight = self.in_flight.lock();
        if let Some(value) = self.value.get() {
            return Ok((value.clone(), false));
        }

        let value = produce()?;
        let stored = self.value.get_or_init(|| value).clone();
        self.ready.notify_waiters();
        Ok((stored, true))
    }

    /// Wait until a value is stored.
    pub(crate) async fn wait(&self) -> String {
        loop {
            // Registered before the check, so a store in between still wakes us.
            let notified = self.ready.notified();
            if let Some(value) = self.value.get() {
                return value.clone();
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::graph::NodeId;

    #[test]
    fn fills_once() {
        let slot = OutputSlot::default();
        assert!(slot.get().is_none());

        let (first, fresh) = slot.get_or_try_fill(|| Ok("out".to_string())).unwrap();
        assert_eq!(first, "out");
        assert!(fresh);

        let (second, fresh) = slot
            .get_or_try_fill(|| panic!("must not run twice"))
            .unwrap();
        assert_eq!(second, "out");
        assert!(!fresh);
    }

    #[test]
    fn failed_fill_leaves_slot_empty() {
        let slot = OutputSlot::default();
        let err = EngineError::MissingDependencyOutput {
            node: NodeId::from(0),
            slave: NodeId::from(1),
        };

        assert_eq!(slot.get_or_try_fill(|| Err(err.clone())), Err(err));
        assert!(slot.get().is_none());
    }

    #[test]
    fn panicking_fill_can_be_retried() {
        let slot = OutputSlot::default();

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            slot.get_or_try_fill(|| panic!("processor failed"))
        }));
        assert!(unwound.is_err());
        assert!(slot.get().is_none());

        let (value, fresh) = slot.get_or_try_fill(|| Ok("out".to_string())).unwrap();
        assert_eq!(value, "out");
        assert!(fresh);
    }

    #[test]
    fn closures_are_processors() {
        let shout = |combined: String| combined.to_uppercase();
        assert_eq!(shout.process("ab".into()), "AB");
        assert_eq!(Passthrough.process("ab".into()), "ab");
    }

    #[tokio::test]
    async fn wait_resolves_after_fill() {
        let slot = std::sync::Arc::new(OutputSlot::default());

        let waiter = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.wait().await })
        };

        tokio::task::yield_now().await;
        slot.get_or_try_fill(|| Ok("done".to_string())).unwrap();

        assert_eq!(waiter.await.unwrap(), "done");
    }
}
