// src/config/mod.rs
// This module handles configuration parsing and validation.

pub mod de; // Deserialization helpers
pub mod processed; // Structs representing validated and processed configuration
pub mod raw; // Structs directly mapping to the YAML structure
