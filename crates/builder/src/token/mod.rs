//! Token builder
//!
//! Two-stage compiler for per-packet instruction tokens. The slow
//! stage, [`build_context`], runs once per SA and condenses the SA
//! parameters into a small [`TokenContext`]. The fast stage,
//! [`build_token`], runs per packet against that context and emits the
//! instruction words the engine executes. As with the SA builder, no
//! cryptography happens here.

pub mod build;
pub mod context;

pub use build::{build_token, packet_flags, token_word_count, TokenDescriptor, TokenParams};
pub use context::{
    build_context, context_word_count, ContextState, IvHandling, TokenContext, TokenProtocol,
    UpdateHandling,
};
