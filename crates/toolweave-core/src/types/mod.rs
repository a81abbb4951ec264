//! Core types shared by connectors, the registry, the executor and the chat loop

mod message;
mod tool;
mod stream;
mod cancellation;

pub use message::{ChatMessage, MessageRole};
pub use tool::{
    ConnectorTool, ToolCall, ToolCallRequest, ToolDefinition, ToolExecutionRound, ToolInputSchema,
    ToolOutcome, ToolResult, CANCELLED_MESSAGE,
};
pub use stream::{GenerationEvent, ToolCallState, TurnChunk};
pub use cancellation::CancellationToken;
