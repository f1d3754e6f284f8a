//! Core value and identifier types for the runtime.
//!
//! The runtime moves opaque values between processes: task results, mailbox
//! messages, and effect payloads are all [`Value`]s. The core never inspects
//! them; only the code that produced a value knows how to downcast it back.

use core::fmt;
use std::any::Any;

/// An opaque value owned by the runtime on behalf of application code.
///
/// Task results, failure payloads, mailbox messages, and effect payloads are
/// all `Value`s. Use [`value`] to box one and [`Value::downcast`] (from
/// `Box<dyn Any>`) to recover the concrete type.
pub type Value = Box<dyn Any + Send>;

/// Boxes a concrete value for the runtime.
#[must_use]
pub fn value<T: Any + Send>(v: T) -> Value {
    Box::new(v)
}

/// A unique identifier for a process in the scheduler.
///
/// Ids are assigned monotonically and never reused, so a stale handle can
/// never address a recycled process.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub(crate) u64);

impl ProcessId {
    /// Returns the raw numeric id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Creates a process id for testing purposes.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessId({})", self.0)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_round_trips_through_any() {
        let v = value(42_u32);
        let back = v.downcast::<u32>().map(|b| *b);
        assert_eq!(back.ok(), Some(42));
    }

    #[test]
    fn process_id_display_is_compact() {
        let id = ProcessId::new_for_test(7);
        assert_eq!(id.to_string(), "P7");
        assert_eq!(format!("{id:?}"), "ProcessId(7)");
    }

    #[test]
    fn process_id_orders_by_allocation() {
        assert!(ProcessId::new_for_test(1) < ProcessId::new_for_test(2));
    }
}
