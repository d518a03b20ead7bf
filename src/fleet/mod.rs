//! Model fleet management
//!
//! Discovery, liveness, VRAM accounting, and load/unload under a budget.

pub mod manager;
pub mod model;
pub mod vram;

pub use manager::{FleetManager, MemoryStatus, ProviderHandle};
pub use model::{ModelCapabilities, ModelEntry, ModelKey, ModelType, SizeClass};
pub use vram::{estimate_vram_mb, DEFAULT_MAX_VRAM_MB};
