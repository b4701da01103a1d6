//! API translation between the `OpenAI` dialect and Gemini.
//!
//! The core of the proxy: converts requests into gateway calls and gateway
//! responses back into the caller's wire shape. All translation functions are
//! pure (no I/O).

pub mod history;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod tools;
