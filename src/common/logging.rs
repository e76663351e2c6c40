//! Logging setup
//!
//! Components never reach for a global logger: each one is handed a
//! [`tracing::Span`] when it is built and records its events inside it.
//! The subscriber itself is installed once by the binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `default_level`.
pub fn init(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Root span for a node; every component span hangs off it.
pub fn node_span(role: crate::common::NodeRole, addr: &str) -> tracing::Span {
    tracing::info_span!("node", role = %role, addr = %addr)
}

/// Child span for one component of a node.
pub fn component_span(parent: &tracing::Span, component: &'static str) -> tracing::Span {
    tracing::info_span!(parent: parent, "component", name = component)
}
