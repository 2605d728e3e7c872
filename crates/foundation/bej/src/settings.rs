/// A limit on how deeply Sets may be nested within a BEJ stream.
///
/// The decoder recurses through nested Sets; without a bound, hostile input
/// could nest tuples deeply enough to exhaust the stack. The schema depth of
/// real Redfish resources is small, so the default of 64 leaves plenty of
/// headroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthLimit(u32);

impl Default for DepthLimit {
    fn default() -> Self {
        Self(64)
    }
}

impl DepthLimit {
    #[inline]
    pub fn new(limit: u32) -> Self {
        Self(limit)
    }

    #[inline]
    pub fn limit(self) -> u32 {
        self.0
    }
}

/// Options for decoding a BEJ stream into JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// The maximum number of Sets that may be nested, counting the
    /// top-level Set.
    ///
    /// Default: 64.
    pub depth_limit: DepthLimit,
    /// Interpret integer payloads as two's-complement signed values, the
    /// interpretation DSP0218 specifies for signed types. When disabled,
    /// integer payloads are read as an unsigned magnitude zero-extended
    /// into an `i64`, which matches the output of existing tooling but
    /// mis-renders genuinely negative values.
    ///
    /// Default: false.
    pub twos_complement_integers: bool,
}
