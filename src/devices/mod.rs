//! Built-in device types: normalizer + executor pairs keyed in the registry.

pub mod depth;
pub mod uuv;
pub mod wind;
