//! Draw a cube whose fragment shader is specialized at pipeline creation.
//!
//! The interesting part is [`specialization`]: it packs `(constant_id, value)`
//! pairs into the data block and map entries Vulkan expects, and checks them
//! against the constants a SPIR-V module actually declares. Everything else
//! is the window, device and pipeline plumbing around it.

pub mod backend;
pub mod capture;
pub mod cli;
pub mod config;
pub mod cube;
pub mod sample;
pub mod shader;
pub mod specialization;
