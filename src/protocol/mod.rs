//! 流式响应协议：片段类型与 SSE 编解码

pub mod sse;
mod types;

pub use sse::{encode_done, encode_fragment, encode_stream, SseDecoder, SseEvent, DONE_SENTINEL};
pub use types::{
    ElementOption, ElementType, ImmediateDisplay, Intent, InteractionElement, InteractionRequest,
    InteractionType, StreamableResponse, SystemState, UserInteraction,
};
