use std::fmt;

/// The type classification of a column, totally ordered for widening
/// decisions. Variant order is the order: a column may only ever move to a
/// strictly greater rank, and only within the ordinary zone.
///
/// Three disjoint zones plus two special ranks:
/// * `Null` classifies the null value; it never drives schema decisions.
/// * The ordinary zone (`Bool` through `TextLong`) holds the widenable
///   ranks. Each dialect emits a subset of these.
/// * The static zone (`DateTime` through `Blob`) holds fixed native types
///   that are created as-is and never altered afterwards.
/// * `Custom` marks a column whose SQL type cannot be inferred or
///   auto-created; such columns are left entirely alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    Null,
    Bool,
    Int8,
    Int32,
    Int64,
    Double,
    Numeric,
    TextShort,
    TextMedium,
    TextLong,
    DateTime,
    DateTimeOffset,
    Guid,
    Blob,
    Custom,
}

impl Rank {
    pub fn is_null(self) -> bool {
        self == Rank::Null
    }
    pub fn is_custom(self) -> bool {
        self == Rank::Custom
    }
    /// Ranks in the widenable zone.
    pub fn is_ordinary(self) -> bool {
        self >= Rank::Bool && self <= Rank::TextLong
    }
    /// Fixed native types, created but never altered.
    pub fn is_static(self) -> bool {
        self >= Rank::DateTime && self <= Rank::Blob
    }
    /// Widening is only attempted between two ordinary ranks, and only
    /// upwards. Static-zone and custom columns are never auto-altered.
    pub fn can_widen_to(self, target: Rank) -> bool {
        self.is_ordinary() && target.is_ordinary() && target > self
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Rank::Null => "null",
            Rank::Bool => "boolean",
            Rank::Int8 => "8-bit integer",
            Rank::Int32 => "32-bit integer",
            Rank::Int64 => "64-bit integer",
            Rank::Double => "double",
            Rank::Numeric => "numeric",
            Rank::TextShort => "short text",
            Rank::TextMedium => "medium text",
            Rank::TextLong => "long text",
            Rank::DateTime => "datetime",
            Rank::DateTimeOffset => "datetime with offset",
            Rank::Guid => "guid",
            Rank::Blob => "blob",
            Rank::Custom => "custom",
        };
        write!(f, "{}", name)
    }
}
