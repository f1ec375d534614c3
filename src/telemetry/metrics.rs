//! Metric instrument factories for governor-broker.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"governor-broker"` meter.

use opentelemetry::metrics::{Counter, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("governor-broker")
}

/// Counter: domain events synthesized from deltas.
/// Labels: `event` ("unit_added" | "unit_removed" | "unit_blocked" | "unit_error").
pub fn events_synthesized() -> Counter<u64> {
    meter()
        .u64_counter("broker.events.synthesized")
        .with_description("Domain events synthesized from unit deltas")
        .build()
}

/// Counter: domain events durably written to the event store.
pub fn events_persisted() -> Counter<u64> {
    meter()
        .u64_counter("broker.events.persisted")
        .with_description("Domain events written to the event store")
        .build()
}

/// Counter: flush attempts deferred because the store was locked.
pub fn store_locked() -> Counter<u64> {
    meter()
        .u64_counter("broker.store.locked")
        .with_description("Flushes deferred by event store lock contention")
        .build()
}

/// Counter: governor action invocations.
/// Labels: `result` ("sent" | "no_leader" | "error").
pub fn actions_invoked() -> Counter<u64> {
    meter()
        .u64_counter("broker.actions.invoked")
        .with_description("Governor action invocations after a flush")
        .build()
}

/// Counter: deltas dropped because their shape could not be parsed.
pub fn deltas_malformed() -> Counter<u64> {
    meter()
        .u64_counter("broker.deltas.malformed")
        .with_description("Deltas skipped as malformed")
        .build()
}
