//! Small utilities without functionality specific to Rudder,
//! for small Rust-specific tasks.

mod inspect_none;
mod u64_to_usize;


pub use self::{
    inspect_none::InspectNone,
    u64_to_usize::u64_to_usize,
};
