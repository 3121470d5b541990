//! Modular Host Library
//!
//! A node-graph audio host: processors connected through typed ports,
//! compiled into execution plans and run by a lock-free real-time engine.

pub mod config;
pub mod dsp;
pub mod engine;
pub mod graph;
pub mod modules;
pub mod persistence;
pub mod plugin;
pub mod world;
