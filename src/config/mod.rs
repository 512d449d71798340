//! Runtime configuration: secrets (ordered lookup) and non-secret settings.

pub mod secrets;
pub mod settings;

pub use secrets::{Capabilities, EnvSecrets, MapSecrets, SecretResolver, SecretSource};
pub use settings::Settings;
