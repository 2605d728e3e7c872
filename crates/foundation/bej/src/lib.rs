//! Decoding of Binary Encoded JSON (BEJ) per DMTF DSP0218.
//!
//! BEJ is the compact wire encoding Redfish uses for schema-constrained JSON
//! payloads. Property names are not on the wire; they are recovered from a
//! companion schema dictionary blob, which [`Dictionary`] parses and
//! [`decode`] consults while walking the tuple stream.

mod cursor;
mod dict;
mod json;
mod settings;

pub mod decode;


pub use self::{
    cursor::ByteCursor,
    dict::{Cluster, DictEntry, DictError, Dictionary},
    json::{JsonSink, JsonWriter},
    settings::{DecodeOptions, DepthLimit},
};
pub use self::decode::{BejError, decode_to_json};
