//! LLM invocation: the provider capability, request shaping, stream frame
//! parsing, single-backend invocation, config resolution, retry and the
//! cross-backend fallback state machine.

pub mod box_provider;
pub mod fallback;
pub mod frame;
pub mod invoker;
pub mod provider;
pub mod request;
pub mod resolver;
pub mod retry;
