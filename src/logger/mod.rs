//! Background event logging: append-only JSONL with graceful degradation.

pub mod dual;
pub mod jsonl;
