pub mod config;
pub mod logger;
pub mod paths;
pub mod screenshot;
pub mod system;

pub use config::RunConfiguration;
pub use paths::ArtifactPaths;
