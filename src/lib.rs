//! parley: a small OpenAI-compatible chat-completion service.
//!
//! The serving stack is built from scratch: a listener thread and a
//! worker pool over blocking sockets ([`net`]), a strict HTTP/1.1
//! request parser and stateful response writer ([`http`]), a
//! hand-written JSON codec ([`json`]), and the route wiring plus a
//! placeholder generator on top ([`service`], [`inference`]).

pub mod config;
pub mod http;
pub mod inference;
pub mod json;
pub mod net;
pub mod service;
