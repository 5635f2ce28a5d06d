// ── Main-stream fan-out ──
//
// Splits a `{ "data": [...] }` frame into zone updates and hands each one
// to the subscribers of its zone. A panicking subscriber is logged and
// skipped; the rest of the pass continues.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::Value;

use zonecast_api::MainFrame;

use crate::id::ZoneKey;
use crate::registry::SubscriptionRegistry;

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callback invocations that returned normally.
    pub delivered: usize,
    /// Callback invocations that panicked.
    pub failed: usize,
    /// Zone updates with no subscriber (or no usable zone name).
    pub unrouted: usize,
}

/// Fan a parsed main-stream frame out to `registry`.
///
/// Frames without a `data` array dispatch nothing.
pub fn dispatch_frame(registry: &SubscriptionRegistry, frame: &Value) -> DispatchReport {
    let mut report = DispatchReport::default();

    let Some(frame) = MainFrame::from_value(frame) else {
        tracing::trace!("frame has no data array, nothing to dispatch");
        return report;
    };
    report.unrouted += frame.skipped;

    for update in &frame.updates {
        let Ok(zone) = ZoneKey::new(&update.zone_name) else {
            report.unrouted += 1;
            continue;
        };

        let subscribers = registry.snapshot(&zone);
        if subscribers.is_empty() {
            report.unrouted += 1;
            continue;
        }

        for sub in subscribers {
            match catch_unwind(AssertUnwindSafe(|| (sub.callback)(update))) {
                Ok(()) => report.delivered += 1,
                Err(payload) => {
                    report.failed += 1;
                    tracing::warn!(
                        zone = %zone,
                        subscriber = %sub.id,
                        panic = %panic_message(payload.as_ref()),
                        "zone subscriber panicked"
                    );
                }
            }
        }
    }

    report
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_owned()
    }
}
