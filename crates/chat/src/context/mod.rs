//! Context assembly for provider calls.

pub mod assembler;
pub mod token;

pub use assembler::{
    AssembledContext, ContextAssembler, ContextKind, ContextMetadata, DEFAULT_LAST_N,
    DEFAULT_TOKEN_BUDGET,
};
pub use token::estimate_tokens;
