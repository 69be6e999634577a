pub mod context;
pub mod descriptor;
pub mod legacy;
pub mod modern;
pub mod processor;
pub mod strategy;

pub use context::LoaderContext;
pub use descriptor::{list_loader_versions, ArtifactRole, LoaderKind, LoaderVersionDescriptor};
pub use strategy::{Loader, LoaderArguments, LoaderLibrary, LoaderStrategy};
