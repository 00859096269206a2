pub mod bridge;
pub mod clock;
pub mod context;
pub mod engine;
pub mod executors;
pub mod loader;
pub mod parser;
pub mod provider;
pub mod runtime;
pub mod sandbox;
pub mod validator;

pub use bridge::{BridgeError, QueuedUserInputBridge, UserInputBridge, UserInputRequestEvent, UserInputResponseEvent};
pub use clock::{Clock, SystemClock};
pub use engine::WorkflowEngine;
pub use executors::{ExecutorRegistry, GraphRunner, NodeExecutor};
pub use loader::{DefinitionLoader, InMemoryDefinitionLoader, LoaderError};
pub use parser::WorkflowParser;
pub use provider::{PromptProvider, PromptResponse, PromptUsage, ProviderError};
pub use runtime::RunningContext;
pub use validator::{ValidationError, ValidationResult, WorkflowValidator};
