/// Address of a linked operation: an index into a program's address table.
///
/// Address `0` is the program's reserved no-op entry and doubles as the
/// absent-child sentinel inside argument records.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct OpAddress(pub u32);

impl OpAddress {
    /// The reserved null address.
    pub const NONE: OpAddress = OpAddress(0);

    /// Return `true` for the reserved null address.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Index into a program's range descriptor table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct RangeIndex(pub u16);
