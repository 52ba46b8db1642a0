//! 请求校验
//!
//! Webhook 签名 extractor

pub mod signature;

pub use signature::{verify_signature, SignedPayload, TriggerGate};
