pub mod api;
pub mod defaults;
pub mod errors;
pub mod loader;
pub mod model;

pub use api::apply_override;
pub use defaults::default_snapshot;
pub use errors::PolicyError;
pub use loader::{load_snapshot_from_vars, load_snapshot_with_options, LoadOptions};
pub use model::{PolicyProvenance, PolicySnapshot, PolicySource, TriggerPolicy};

#[cfg(test)]
mod tests;
