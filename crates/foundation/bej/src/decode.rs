//! The BEJ stream decoder: a recursive descent over length-prefixed tuples,
//! carrying the dictionary cluster that names the members of the Set
//! currently being decoded.

use std::io;

use byteorder::{ByteOrder as _, LittleEndian};
use thiserror::Error;

use rudder_util::{InspectNone as _, u64_to_usize};

use crate::cursor::ByteCursor;
use crate::dict::{Cluster, DictEntry, Dictionary};
use crate::json::JsonSink;
use crate::settings::{DecodeOptions, DepthLimit};


/// The Set value format nibble (upper 4 bits of the tuple format byte).
pub const SET_FMT: u8 = 0x0;
/// The Array value format nibble.
pub const ARRAY_FMT: u8 = 0x1;
/// The Null value format nibble.
pub const NULL_FMT: u8 = 0x2;
/// The Integer value format nibble.
pub const INT_FMT: u8 = 0x3;
/// The Enum value format nibble.
pub const ENUM_FMT: u8 = 0x4;
/// The String value format nibble.
pub const STRING_FMT: u8 = 0x5;

/// Describes an error which occurred while decoding a BEJ stream.
///
/// Everything here means the stream (not the dictionary) is unusable;
/// dictionary misses are handled with synthetic names and placeholders
/// instead of errors.
#[derive(Error, Debug)]
pub enum BejError {
    /// A native I/O error from the JSON sink.
    #[error(transparent)]
    StdIo(#[from] io::Error),
    /// The stream ended in the middle of a header, tuple, or payload.
    #[error("BEJ stream ended before a tuple or payload was complete")]
    EndOfInput,
    /// An nnint or integer payload declared more than eight value bytes.
    #[error("BEJ integer declares more than eight bytes")]
    Overflow,
    /// A seek target lay past the end of the stream.
    #[error("seek past the end of the BEJ stream")]
    OutOfRange,
    /// The top-level tuple must be a Set.
    #[error("top-level BEJ tuple has format 0x{0:X}, expected a Set")]
    UnexpectedFormat(u8),
    /// The limit on recursive nesting depth of Sets was exceeded.
    #[error("exceeded depth limit {} for nested Sets", limit.limit())]
    DepthExceeded {
        /// The limit which was exceeded.
        limit: DepthLimit,
    },
}

/// The header of one tuple: sequence field, format byte, payload length.
///
/// The payload's shape depends on the format nibble, but its length is
/// always authoritative for skipping.
#[derive(Debug, Clone, Copy)]
struct TupleHead {
    seq:           u16,
    is_annotation: bool,
    fmt:           u8,
    length:        u64,
}

impl TupleHead {
    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self, BejError> {
        let seq_field = cursor.read_nnint()?;
        let fmt_byte = cursor.read_u8()?;
        let length = cursor.read_nnint()?;

        Ok(Self {
            // The low bit of the sequence field flags an annotation member.
            seq:           (seq_field >> 1) as u16,
            is_annotation: seq_field & 1 != 0,
            fmt:           fmt_byte >> 4,
            length,
        })
    }
}

/// Decode a complete BEJ stream and emit the corresponding JSON document
/// to `sink`.
///
/// The stream must open with a bejEncoding header (version, flags, and
/// schema class, all read and ignored) followed by exactly one top-level
/// Set tuple. Members are named through `dict`; a missing dictionary entry
/// yields a synthetic `seq_<n>` key rather than an error.
pub fn decode_to_json<S: JsonSink>(
    stream: &[u8],
    dict:   &Dictionary<'_>,
    sink:   &mut S,
    opts:   DecodeOptions,
) -> Result<(), BejError> {
    let mut cursor = ByteCursor::new(stream);

    // bejEncoding header: version (4), flags (2), schema class (1).
    let _version = LittleEndian::read_u32(cursor.read_bytes(4)?);
    let _flags = LittleEndian::read_u16(cursor.read_bytes(2)?);
    let _schema_class = cursor.read_u8()?;

    // The members of the top-level Set are defined by the root entry's
    // child cluster. An empty dictionary decodes every member with a
    // synthetic name.
    let root_cluster = match dict.root() {
        Some(&root) => dict.child_cluster(root),
        None        => Cluster::empty(),
    };

    let head = TupleHead::read(&mut cursor)?;
    if head.fmt != SET_FMT {
        return Err(BejError::UnexpectedFormat(head.fmt));
    }

    decode_set(&mut cursor, dict, root_cluster, sink, opts, 0)
}

/// Decode a Set payload (member count, then that many tuples) as a JSON
/// object. `cluster` defines the member sequence numbers of this Set.
fn decode_set<S: JsonSink>(
    cursor:        &mut ByteCursor<'_>,
    dict:          &Dictionary<'_>,
    cluster:       Cluster,
    sink:          &mut S,
    opts:          DecodeOptions,
    current_depth: u32,
) -> Result<(), BejError> {
    if current_depth >= opts.depth_limit.limit() {
        return Err(BejError::DepthExceeded {
            limit: opts.depth_limit,
        });
    }

    let member_count = cursor.read_nnint()?;
    sink.begin_object()?;

    for _ in 0..member_count {
        let head = TupleHead::read(cursor)?;

        if head.is_annotation {
            // Annotation members are skipped wholesale, at every depth.
            cursor.skip(head.length)?;
            continue;
        }

        let entry = dict
            .lookup(cluster, head.seq)
            .copied()
            .inspect_none(|| log::debug!("no dictionary entry for sequence {}", head.seq));

        match entry.and_then(|entry| dict.name_at(entry.name_off)) {
            Some(name) => sink.key(name)?,
            None       => sink.key(&format!("seq_{}", head.seq))?,
        }

        match head.fmt {
            INT_FMT    => decode_integer(cursor, sink, head.length, opts)?,
            STRING_FMT => decode_string(cursor, sink, head.length)?,
            SET_FMT => {
                let child = match entry {
                    Some(entry) => dict.child_cluster(entry),
                    None        => Cluster::empty(),
                };
                decode_set(cursor, dict, child, sink, opts, current_depth + 1)?;
            }
            ARRAY_FMT => decode_array(cursor, sink, opts)?,
            ENUM_FMT  => decode_enum(cursor, dict, entry, sink, head.length)?,
            // Null, and every format nibble this decoder does not
            // interpret: step over the declared payload and render null.
            _ => {
                cursor.skip(head.length)?;
                sink.null_value()?;
            }
        }
    }

    sink.end_object()?;
    Ok(())
}

/// Decode an Integer payload of `length` little-endian bytes.
fn decode_integer<S: JsonSink>(
    cursor: &mut ByteCursor<'_>,
    sink:   &mut S,
    length: u64,
    opts:   DecodeOptions,
) -> Result<(), BejError> {
    if length > 8 {
        return Err(BejError::Overflow);
    }

    let value = if length == 0 {
        0
    } else {
        let bytes = cursor.read_bytes(length as usize)?;
        if opts.twos_complement_integers {
            LittleEndian::read_int(bytes, bytes.len())
        } else {
            LittleEndian::read_uint(bytes, bytes.len()) as i64
        }
    };

    sink.int_value(value)?;
    Ok(())
}

/// Decode a String payload of exactly `length` bytes.
fn decode_string<S: JsonSink>(
    cursor: &mut ByteCursor<'_>,
    sink:   &mut S,
    length: u64,
) -> Result<(), BejError> {
    let length = u64_to_usize(length).ok_or(BejError::EndOfInput)?;
    let mut bytes = cursor.read_bytes(length)?;

    // Encoders include the NUL terminator in the payload; it (and any
    // further trailing NULs) is not part of the string value.
    while let [rest @ .., 0] = bytes {
        bytes = rest;
    }

    sink.string_value(&String::from_utf8_lossy(bytes))?;
    Ok(())
}

/// Decode an Array payload: an element count, then that many element
/// tuples, emitted as a positional JSON array.
///
/// Only Integer and String elements are interpreted; anything else is
/// skipped by its declared length with a null holding its position.
/// Element sequence numbers encode the ordinal position and are not
/// consulted.
fn decode_array<S: JsonSink>(
    cursor: &mut ByteCursor<'_>,
    sink:   &mut S,
    opts:   DecodeOptions,
) -> Result<(), BejError> {
    let element_count = cursor.read_nnint()?;
    sink.begin_array()?;

    for _ in 0..element_count {
        let head = TupleHead::read(cursor)?;

        match head.fmt {
            INT_FMT    => decode_integer(cursor, sink, head.length, opts)?,
            STRING_FMT => decode_string(cursor, sink, head.length)?,
            _ => {
                cursor.skip(head.length)?;
                sink.null_value()?;
            }
        }
    }

    sink.end_array()?;
    Ok(())
}

/// Decode an Enum payload: an nnint ordinal resolved to an option name
/// through the entry's child cluster, emitted as a JSON string.
fn decode_enum<S: JsonSink>(
    cursor: &mut ByteCursor<'_>,
    dict:   &Dictionary<'_>,
    entry:  Option<DictEntry>,
    sink:   &mut S,
    length: u64,
) -> Result<(), BejError> {
    // The ordinal sits at the start of the payload, but the declared tuple
    // length is what advances the cursor, whether or not they agree.
    let payload_start = cursor.position();
    let mut peek = cursor.clone();
    let ordinal = peek.read_nnint()?;
    let ordinal_len = peek.position() - payload_start;

    cursor.skip(length)?;

    if ordinal_len as u64 != length {
        log::warn!(
            "enum ordinal encoded in {ordinal_len} bytes inside a payload declaring {length}",
        );
    }

    let name = entry
        .map(|entry| dict.child_cluster(entry))
        .and_then(|options| dict.lookup(options, ordinal as u16))
        .and_then(|option| dict.name_at(option.name_off));

    sink.string_value(name.unwrap_or("EnumOption"))?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use crate::json::JsonWriter;

    use super::*;

    // ================================
    //  Wire builders
    // ================================

    fn push_nnint(out: &mut Vec<u8>, value: u64) {
        let mut le = value.to_le_bytes().to_vec();
        while le.len() > 1 && le.ends_with(&[0]) {
            le.pop();
        }
        out.push(le.len() as u8);
        out.extend_from_slice(&le);
    }

    /// One member tuple with the annotation bit clear.
    fn member(seq: u16, fmt: u8, payload: &[u8]) -> Vec<u8> {
        let mut tuple = Vec::new();
        push_nnint(&mut tuple, u64::from(seq) << 1);
        tuple.push(fmt << 4);
        push_nnint(&mut tuple, payload.len() as u64);
        tuple.extend_from_slice(payload);
        tuple
    }

    /// One member tuple with the annotation bit set.
    fn annotation(seq: u16, fmt: u8, payload: &[u8]) -> Vec<u8> {
        let mut tuple = Vec::new();
        push_nnint(&mut tuple, (u64::from(seq) << 1) | 1);
        tuple.push(fmt << 4);
        push_nnint(&mut tuple, payload.len() as u64);
        tuple.extend_from_slice(payload);
        tuple
    }

    /// A Set payload: member count, then the member tuples back to back.
    fn set_payload(members: &[Vec<u8>]) -> Vec<u8> {
        let mut payload = Vec::new();
        push_nnint(&mut payload, members.len() as u64);
        for member in members {
            payload.extend_from_slice(member);
        }
        payload
    }

    /// An Array payload: element count, then the element tuples.
    fn array_payload(elements: &[Vec<u8>]) -> Vec<u8> {
        set_payload(elements)
    }

    /// A full stream: zeroed bejEncoding header, then one top-level Set
    /// tuple with the given payload.
    fn stream(set: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0; 7];
        bytes.extend_from_slice(&member(0, SET_FMT, set));
        bytes
    }

    // ================================
    //  Dictionary builder
    // ================================

    struct TestEntry {
        fmt:       u8,
        seq:       u16,
        children:  Option<(usize, u16)>,
        name:      Option<&'static str>,
    }

    impl TestEntry {
        fn named(fmt: u8, seq: u16, name: &'static str) -> Self {
            Self { fmt, seq, children: None, name: Some(name) }
        }

        /// `first_child` is the entry-table index of the first child.
        fn parent(
            fmt:         u8,
            seq:         u16,
            name:        &'static str,
            first_child: usize,
            child_cnt:   u16,
        ) -> Self {
            Self {
                fmt,
                seq,
                children: Some((first_child, child_cnt)),
                name: Some(name),
            }
        }
    }

    fn build_dict(entries: &[TestEntry]) -> Vec<u8> {
        let names_offset = 12 + 10 * entries.len();

        let mut blob = vec![0x01, 0x00];
        blob.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        blob.extend_from_slice(&0u32.to_le_bytes());
        blob.extend_from_slice(&0u32.to_le_bytes());

        let mut names: Vec<u8> = Vec::new();
        for entry in entries {
            let (child_off, child_cnt) = match entry.children {
                Some((first_child, count)) => ((12 + 10 * first_child) as u16, count),
                None                       => (0, 0),
            };
            let (name_off, name_len) = match entry.name {
                Some(name) => {
                    let off = (names_offset + names.len()) as u16;
                    names.extend_from_slice(name.as_bytes());
                    names.push(0);
                    (off, (name.len() + 1) as u8)
                }
                None => (0, 0),
            };

            blob.push(entry.fmt);
            blob.extend_from_slice(&entry.seq.to_le_bytes());
            blob.extend_from_slice(&child_off.to_le_bytes());
            blob.extend_from_slice(&child_cnt.to_le_bytes());
            blob.push(name_len);
            blob.extend_from_slice(&name_off.to_le_bytes());
        }

        blob.extend_from_slice(&names);
        blob
    }

    /// Root entry whose children start at entry 1.
    fn root(child_cnt: u16) -> TestEntry {
        TestEntry::parent(0x00, 0, "Root", 1, child_cnt)
    }

    // ================================
    //  Decode helpers
    // ================================

    fn try_decode(
        dict_blob: &[u8],
        stream:    &[u8],
        opts:      DecodeOptions,
    ) -> Result<Value, BejError> {
        let dict = Dictionary::load(dict_blob).unwrap();
        let mut out = Vec::new();
        let mut sink = JsonWriter::new(&mut out);

        decode_to_json(stream, &dict, &mut sink, opts)?;
        Ok(serde_json::from_slice(&out).unwrap())
    }

    fn decode(dict_blob: &[u8], stream: &[u8]) -> Value {
        try_decode(dict_blob, stream, DecodeOptions::default()).unwrap()
    }

    // ================================
    //  End-to-end scenarios
    // ================================

    #[test]
    fn single_integer_field() {
        let dict = build_dict(&[root(1), TestEntry::named(0x30, 0, "N")]);
        let bej = stream(&set_payload(&[member(0, INT_FMT, &[0x2A])]));

        assert_eq!(decode(&dict, &bej), json!({"N": 42}));
    }

    #[test]
    fn nested_set() {
        let dict = build_dict(&[
            root(1),
            TestEntry::parent(0x00, 0, "N", 2, 1),
            TestEntry::named(0x30, 0, "X"),
        ]);
        let inner = set_payload(&[member(0, INT_FMT, &[7])]);
        let bej = stream(&set_payload(&[member(0, SET_FMT, &inner)]));

        assert_eq!(decode(&dict, &bej), json!({"N": {"X": 7}}));
    }

    #[test]
    fn array_of_integers() {
        let dict = build_dict(&[root(1), TestEntry::named(0x10, 0, "Arr")]);
        let elements = array_payload(&[
            member(0, INT_FMT, &[1]),
            member(1, INT_FMT, &[2]),
            member(2, INT_FMT, &[3]),
        ]);
        let bej = stream(&set_payload(&[member(0, ARRAY_FMT, &elements)]));

        assert_eq!(decode(&dict, &bej), json!({"Arr": [1, 2, 3]}));
    }

    #[test]
    fn enum_resolves_to_option_name() {
        let dict = build_dict(&[
            root(1),
            TestEntry::parent(0x40, 0, "State", 2, 2),
            TestEntry::named(0x40, 0, "Off"),
            TestEntry::named(0x40, 1, "On"),
        ]);
        let mut ordinal = Vec::new();
        push_nnint(&mut ordinal, 1);
        let bej = stream(&set_payload(&[member(0, ENUM_FMT, &ordinal)]));

        assert_eq!(decode(&dict, &bej), json!({"State": "On"}));
    }

    #[test]
    fn annotations_are_invisible() {
        let dict = build_dict(&[root(1), TestEntry::named(0x30, 0, "N")]);

        let plain = stream(&set_payload(&[member(0, INT_FMT, &[5])]));
        let with_annotation = stream(&set_payload(&[
            member(0, INT_FMT, &[5]),
            annotation(3, STRING_FMT, b"ignored\0"),
        ]));

        assert_eq!(decode(&dict, &plain), json!({"N": 5}));
        assert_eq!(decode(&dict, &with_annotation), decode(&dict, &plain));
    }

    #[test]
    fn unknown_sequence_synthesizes_a_name() {
        let dict = build_dict(&[root(1), TestEntry::named(0x30, 0, "N")]);
        let bej = stream(&set_payload(&[member(99, INT_FMT, &[3])]));

        assert_eq!(decode(&dict, &bej), json!({"seq_99": 3}));
    }

    // ================================
    //  Boundary behaviors
    // ================================

    #[test]
    fn empty_set() {
        let dict = build_dict(&[root(0)]);
        let bej = stream(&set_payload(&[]));

        assert_eq!(decode(&dict, &bej), json!({}));
    }

    #[test]
    fn empty_string_and_zero_length_integer() {
        let dict = build_dict(&[
            root(2),
            TestEntry::named(0x50, 0, "S"),
            TestEntry::named(0x30, 1, "N"),
        ]);
        let bej = stream(&set_payload(&[
            member(0, STRING_FMT, &[]),
            member(1, INT_FMT, &[]),
        ]));

        assert_eq!(decode(&dict, &bej), json!({"S": "", "N": 0}));
    }

    #[test]
    fn empty_array() {
        let dict = build_dict(&[root(1), TestEntry::named(0x10, 0, "Arr")]);
        let bej = stream(&set_payload(&[member(0, ARRAY_FMT, &array_payload(&[]))]));

        assert_eq!(decode(&dict, &bej), json!({"Arr": []}));
    }

    #[test]
    fn unresolvable_enum_ordinal_is_a_placeholder() {
        let dict = build_dict(&[
            root(1),
            TestEntry::parent(0x40, 0, "State", 2, 1),
            TestEntry::named(0x40, 0, "Off"),
        ]);
        let mut ordinal = Vec::new();
        push_nnint(&mut ordinal, 9);
        let bej = stream(&set_payload(&[member(0, ENUM_FMT, &ordinal)]));

        assert_eq!(decode(&dict, &bej), json!({"State": "EnumOption"}));
    }

    #[test]
    fn string_trailing_nuls_are_elided() {
        let dict = build_dict(&[root(1), TestEntry::named(0x50, 0, "S")]);
        let bej = stream(&set_payload(&[member(0, STRING_FMT, b"hi\0\0")]));

        assert_eq!(decode(&dict, &bej), json!({"S": "hi"}));
    }

    #[test]
    fn non_utf8_strings_decode_lossily() {
        let dict = build_dict(&[root(1), TestEntry::named(0x50, 0, "S")]);
        let bej = stream(&set_payload(&[member(0, STRING_FMT, &[0xFF, 0x00])]));

        assert_eq!(decode(&dict, &bej), json!({"S": "\u{FFFD}"}));
    }

    // ================================
    //  Tolerated oddities
    // ================================

    #[test]
    fn unknown_format_payload_length_is_authoritative() {
        let dict = build_dict(&[
            root(2),
            TestEntry::named(0x70, 0, "Odd"),
            TestEntry::named(0x30, 1, "N"),
        ]);
        // An uninterpreted format nibble with a nonempty payload, followed
        // by a member that must still decode.
        let bej = stream(&set_payload(&[
            member(0, 0x7, &[0xDE, 0xAD, 0xBE, 0xEF]),
            member(1, INT_FMT, &[9]),
        ]));

        assert_eq!(decode(&dict, &bej), json!({"Odd": null, "N": 9}));
    }

    #[test]
    fn null_format_emits_null() {
        let dict = build_dict(&[root(1), TestEntry::named(0x20, 0, "Gone")]);
        let bej = stream(&set_payload(&[member(0, NULL_FMT, &[])]));

        assert_eq!(decode(&dict, &bej), json!({"Gone": null}));
    }

    #[test]
    fn array_elements_of_unknown_format_hold_their_position() {
        let dict = build_dict(&[root(1), TestEntry::named(0x10, 0, "Arr")]);
        let elements = array_payload(&[
            member(0, INT_FMT, &[1]),
            member(1, 0xB, &[0xAA, 0xBB]),
            member(2, STRING_FMT, b"end\0"),
        ]);
        let bej = stream(&set_payload(&[member(0, ARRAY_FMT, &elements)]));

        assert_eq!(decode(&dict, &bej), json!({"Arr": [1, null, "end"]}));
    }

    #[test]
    fn enum_ordinal_width_mismatch_is_absorbed() {
        let dict = build_dict(&[
            root(1),
            TestEntry::parent(0x40, 0, "State", 2, 2),
            TestEntry::named(0x40, 0, "Off"),
            TestEntry::named(0x40, 1, "On"),
        ]);
        // nnint(1) is two bytes, but the payload declares three; the extra
        // byte is stepped over.
        let bej = stream(&set_payload(&[member(0, ENUM_FMT, &[0x01, 0x01, 0x00])]));

        assert_eq!(decode(&dict, &bej), json!({"State": "On"}));
    }

    #[test]
    fn empty_dictionary_names_everything_synthetically() {
        let dict = build_dict(&[]);
        let bej = stream(&set_payload(&[member(4, INT_FMT, &[1])]));

        assert_eq!(decode(&dict, &bej), json!({"seq_4": 1}));
    }

    #[test]
    fn integers_default_to_unsigned_magnitude() {
        let dict = build_dict(&[root(1), TestEntry::named(0x30, 0, "N")]);
        let bej = stream(&set_payload(&[member(0, INT_FMT, &[0xFF])]));

        assert_eq!(decode(&dict, &bej), json!({"N": 255}));
    }

    #[test]
    fn integers_can_opt_into_twos_complement() {
        let dict = build_dict(&[root(1), TestEntry::named(0x30, 0, "N")]);
        let bej = stream(&set_payload(&[member(0, INT_FMT, &[0xFF])]));

        let opts = DecodeOptions {
            twos_complement_integers: true,
            ..DecodeOptions::default()
        };
        assert_eq!(try_decode(&dict, &bej, opts).unwrap(), json!({"N": -1}));
    }

    // ================================
    //  Failure modes
    // ================================

    #[test]
    fn top_level_tuple_must_be_a_set() {
        let dict = build_dict(&[root(0)]);
        let mut bej = vec![0; 7];
        bej.extend_from_slice(&member(0, INT_FMT, &[1]));

        let result = try_decode(&dict, &bej, DecodeOptions::default());
        assert!(matches!(result, Err(BejError::UnexpectedFormat(fmt)) if fmt == INT_FMT));
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let dict = build_dict(&[root(1), TestEntry::named(0x30, 0, "N")]);
        let mut bej = stream(&set_payload(&[member(0, INT_FMT, &[1, 2, 3, 4])]));
        bej.truncate(bej.len() - 2);

        let result = try_decode(&dict, &bej, DecodeOptions::default());
        assert!(matches!(result, Err(BejError::EndOfInput)));
    }

    #[test]
    fn oversized_integer_payload_is_an_error() {
        let dict = build_dict(&[root(1), TestEntry::named(0x30, 0, "N")]);
        let bej = stream(&set_payload(&[member(0, INT_FMT, &[0; 9])]));

        let result = try_decode(&dict, &bej, DecodeOptions::default());
        assert!(matches!(result, Err(BejError::Overflow)));
    }

    #[test]
    fn nesting_past_the_depth_limit_is_an_error() {
        let dict = build_dict(&[root(0)]);

        // Sets nested four deep, against a limit of three.
        let mut payload = set_payload(&[]);
        for _ in 0..3 {
            payload = set_payload(&[member(0, SET_FMT, &payload)]);
        }
        let bej = stream(&payload);

        let opts = DecodeOptions {
            depth_limit: DepthLimit::new(3),
            ..DecodeOptions::default()
        };
        assert!(matches!(
            try_decode(&dict, &bej, opts),
            Err(BejError::DepthExceeded { .. }),
        ));

        // The same stream decodes under the default limit.
        assert_eq!(
            decode(&dict, &bej),
            json!({"seq_0": {"seq_0": {"seq_0": {}}}}),
        );
    }
}
