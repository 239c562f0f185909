pub mod compositor;
pub mod coordinator;
pub mod fetch;
pub mod loader;
pub mod mock;
pub mod parser;
pub mod sandbox;
pub mod session;

pub use compositor::Compositor;
pub use coordinator::Coordinator;
pub use fetch::{AssetFetcher, ModuleFetcher};
pub use loader::{cdn_base, AssetLoader};
pub use parser::{BoundaryParser, DEFAULT_BOUNDARY};
pub use sandbox::{
    Capabilities, ComponentRegistry, ExecutionUnit, ModuleCompiler, ModuleExecutor, ModuleResolver,
    TemplateCompiler, ViewLibrary,
};
pub use session::{LoadOutcome, LoadTask, Session};
