use std::str;

use subslice_to_array::SubsliceToArray as _;
use thiserror::Error;


/// Size in bytes of the fixed dictionary header.
const HEADER_LEN: usize = 12;
/// Size in bytes of one packed entry record.
const ENTRY_LEN: usize = 10;

/// Describes an error which occurred while loading a schema dictionary blob.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictError {
    /// The blob ended before the header, or before the entry table the
    /// header declares.
    #[error("schema dictionary blob is shorter than its header declares")]
    Truncated,
}

/// One record of the schema dictionary's entry table.
///
/// All offsets are absolute, measured from the start of the dictionary blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictEntry {
    /// Value format in the upper nibble. The lower bits carry per-entry
    /// flags which the decoder does not consult.
    pub fmt:       u8,
    /// Sequence number identifying this entry within its parent cluster.
    pub seq:       u16,
    /// Offset of the first entry of this entry's child cluster; 0 means
    /// no children.
    pub child_off: u16,
    /// Number of entries in the child cluster.
    pub child_cnt: u16,
    /// Length of the name including its NUL terminator.
    pub name_len:  u8,
    /// Offset of the NUL-terminated UTF-8 name; 0 means unnamed.
    pub name_off:  u16,
}

impl DictEntry {
    fn parse(record: &[u8]) -> Self {
        Self {
            fmt:       record[0],
            seq:       u16::from_le_bytes(record.subslice_to_array::<1, 3>()),
            child_off: u16::from_le_bytes(record.subslice_to_array::<3, 5>()),
            child_cnt: u16::from_le_bytes(record.subslice_to_array::<5, 7>()),
            name_len:  record[7],
            name_off:  u16::from_le_bytes(record.subslice_to_array::<8, 10>()),
        }
    }
}

/// A contiguous range of dictionary entries forming the members of a parent
/// entity (the schema root, a Set, or an Enum's options).
///
/// Clusters are derived from a parent entry on demand and never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cluster {
    /// Index into the entry table of the cluster's first entry.
    pub start_idx: usize,
    /// Number of entries in the cluster.
    pub count:     usize,
}

impl Cluster {
    /// The cluster of an entry with no children.
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A parsed Redfish schema dictionary, per DSP0218's binary dictionary
/// layout.
///
/// Entry records are parsed eagerly into a table; property names stay in the
/// borrowed blob and are resolved on demand, so the blob must outlive the
/// dictionary. Entry 0 is conventionally the schema root.
#[derive(Debug, Clone)]
pub struct Dictionary<'a> {
    entries:        Vec<DictEntry>,
    entries_offset: usize,
    names_offset:   usize,
    blob:           &'a [u8],
}

impl<'a> Dictionary<'a> {
    /// Parse a dictionary blob.
    ///
    /// The header's version tag, flags, schema version, and advisory size
    /// fields are not interpreted; only the entry count is. Fails when the
    /// blob cannot hold the header and the declared entry table.
    pub fn load(blob: &'a [u8]) -> Result<Self, DictError> {
        if blob.len() < HEADER_LEN {
            return Err(DictError::Truncated);
        }

        let entry_count = usize::from(u16::from_le_bytes(blob.subslice_to_array::<2, 4>()));
        let names_offset = HEADER_LEN + entry_count * ENTRY_LEN;
        if blob.len() < names_offset {
            return Err(DictError::Truncated);
        }

        let entries = blob[HEADER_LEN..names_offset]
            .chunks_exact(ENTRY_LEN)
            .map(DictEntry::parse)
            .collect();

        Ok(Self {
            entries,
            entries_offset: HEADER_LEN,
            names_offset,
            blob,
        })
    }

    /// The parsed entry table, in blob order.
    #[inline]
    pub fn entries(&self) -> &[DictEntry] {
        &self.entries
    }

    /// Absolute blob offset at which the entry table starts.
    #[inline]
    pub fn entries_offset(&self) -> usize {
        self.entries_offset
    }

    /// Absolute blob offset at which the names pool starts, immediately
    /// after the entry table.
    #[inline]
    pub fn names_offset(&self) -> usize {
        self.names_offset
    }

    /// The schema root entry, when the dictionary has any entries at all.
    #[inline]
    pub fn root(&self) -> Option<&DictEntry> {
        self.entries.first()
    }

    /// Resolve the NUL-terminated name at an absolute blob offset.
    ///
    /// Offset 0 is the "unnamed" sentinel. Any offset that does not point at
    /// a NUL-terminated UTF-8 run inside the blob resolves to `None` rather
    /// than failing; missing names never abort a decode.
    pub fn name_at(&self, name_off: u16) -> Option<&'a str> {
        let start = usize::from(name_off);
        if start == 0 || start >= self.blob.len() {
            return None;
        }

        let tail = &self.blob[start..];
        let len = tail.iter().position(|&byte| byte == 0)?;
        str::from_utf8(&tail[..len]).ok()
    }

    /// Find the entry with the given sequence number within a cluster.
    ///
    /// A linear scan. Clusters are typically a handful of entries and their
    /// on-wire order is not required to be sorted, so nothing faster is
    /// warranted. The scanned range is trimmed to the entry table.
    pub fn lookup(&self, cluster: Cluster, seq: u16) -> Option<&DictEntry> {
        let end = cluster
            .start_idx
            .saturating_add(cluster.count)
            .min(self.entries.len());

        self.entries
            .get(cluster.start_idx..end)?
            .iter()
            .find(|entry| entry.seq == seq)
    }

    /// The cluster holding an entry's children, or the empty cluster when it
    /// has none.
    ///
    /// Children are not necessarily contiguous with their parent; the
    /// entry's child offset is authoritative. An offset below the entry
    /// table is treated as childless.
    pub fn child_cluster(&self, entry: DictEntry) -> Cluster {
        let child_off = usize::from(entry.child_off);
        if child_off < self.entries_offset {
            return Cluster::empty();
        }

        Cluster {
            start_idx: (child_off - self.entries_offset) / ENTRY_LEN,
            count:     usize::from(entry.child_cnt),
        }
    }
}
