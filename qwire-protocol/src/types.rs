//! Type tag registry.
//!
//! Every payload value starts with a signed type byte:
//!
//! ```text
//!  -128        error atom (responses only)
//!  -19..=-1    atom of kind |t|
//!  0           general list
//!  1..=19      vector of kind t
//!  98          table
//!  99          dictionary
//!  100..=112   function family (lambda, primitives, iterators, ...)
//! ```
//!
//! Atoms and vectors share one [`Kind`] table: the vector tag is the kind's
//! code and the atom tag its negation, so element widths and version gates
//! are defined once for both directions of the codec.

use crate::error::ProtocolError;

/// Tag of a general (heterogeneous) list.
pub const LIST_TAG: i8 = 0;

/// Tag of a table.
pub const TABLE_TAG: i8 = 98;

/// Tag of a dictionary.
pub const DICT_TAG: i8 = 99;

/// Tag of an error atom.
pub const ERROR_TAG: i8 = -128;

/// Element kind of an atom or a homogeneous vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum Kind {
    Boolean = 1,
    Guid = 2,
    Byte = 4,
    Short = 5,
    Int = 6,
    Long = 7,
    Real = 8,
    Float = 9,
    Char = 10,
    Symbol = 11,
    Timestamp = 12,
    Month = 13,
    Date = 14,
    Datetime = 15,
    Timespan = 16,
    Minute = 17,
    Second = 18,
    Time = 19,
}

/// Kinds indexed by their code. Code 3 is unassigned on the wire.
const KIND_TABLE: [Option<Kind>; 20] = [
    None,
    Some(Kind::Boolean),
    Some(Kind::Guid),
    None,
    Some(Kind::Byte),
    Some(Kind::Short),
    Some(Kind::Int),
    Some(Kind::Long),
    Some(Kind::Real),
    Some(Kind::Float),
    Some(Kind::Char),
    Some(Kind::Symbol),
    Some(Kind::Timestamp),
    Some(Kind::Month),
    Some(Kind::Date),
    Some(Kind::Datetime),
    Some(Kind::Timespan),
    Some(Kind::Minute),
    Some(Kind::Second),
    Some(Kind::Time),
];

impl Kind {
    /// Resolves a kind from its unsigned code.
    pub const fn from_code(code: i8) -> Option<Kind> {
        if code < 0 || code as usize >= KIND_TABLE.len() {
            return None;
        }
        KIND_TABLE[code as usize]
    }

    /// The vector tag for this kind.
    pub const fn code(self) -> i8 {
        self as i8
    }

    /// Encoded width of one element in bytes; `0` for null-terminated symbols.
    pub const fn width(self) -> usize {
        match self {
            Kind::Boolean | Kind::Byte | Kind::Char => 1,
            Kind::Short => 2,
            Kind::Int
            | Kind::Real
            | Kind::Month
            | Kind::Date
            | Kind::Minute
            | Kind::Second
            | Kind::Time => 4,
            Kind::Long | Kind::Float | Kind::Timestamp | Kind::Datetime | Kind::Timespan => 8,
            Kind::Guid => 16,
            Kind::Symbol => 0,
        }
    }

    /// Lowest negotiated protocol version allowed to carry this kind.
    pub const fn required_version(self) -> u8 {
        match self {
            Kind::Guid => 3,
            Kind::Timestamp | Kind::Timespan => 1,
            _ => 0,
        }
    }

    /// Lower-case name used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            Kind::Boolean => "boolean",
            Kind::Guid => "guid",
            Kind::Byte => "byte",
            Kind::Short => "short",
            Kind::Int => "int",
            Kind::Long => "long",
            Kind::Real => "real",
            Kind::Float => "float",
            Kind::Char => "char",
            Kind::Symbol => "symbol",
            Kind::Timestamp => "timestamp",
            Kind::Month => "month",
            Kind::Date => "date",
            Kind::Datetime => "datetime",
            Kind::Timespan => "timespan",
            Kind::Minute => "minute",
            Kind::Second => "second",
            Kind::Time => "time",
        }
    }
}

/// Function-like payloads the client consumes but cannot represent as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionKind {
    Lambda = 100,
    UnaryPrimitive = 101,
    Operator = 102,
    Iterator = 103,
    Projection = 104,
    Composition = 105,
    Each = 106,
    Over = 107,
    Scan = 108,
    EachPrior = 109,
    EachRight = 110,
    EachLeft = 111,
    DynamicLoad = 112,
}

impl FunctionKind {
    pub const fn from_code(code: i8) -> Option<FunctionKind> {
        Some(match code {
            100 => FunctionKind::Lambda,
            101 => FunctionKind::UnaryPrimitive,
            102 => FunctionKind::Operator,
            103 => FunctionKind::Iterator,
            104 => FunctionKind::Projection,
            105 => FunctionKind::Composition,
            106 => FunctionKind::Each,
            107 => FunctionKind::Over,
            108 => FunctionKind::Scan,
            109 => FunctionKind::EachPrior,
            110 => FunctionKind::EachRight,
            111 => FunctionKind::EachLeft,
            112 => FunctionKind::DynamicLoad,
            _ => return None,
        })
    }

    pub const fn code(self) -> i8 {
        self as u8 as i8
    }
}

/// A resolved wire type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Atom(Kind),
    Vector(Kind),
    List,
    Table,
    Dict,
    Function(FunctionKind),
    Error,
}

impl TypeTag {
    /// Resolves a type byte read from the wire.
    pub fn lookup(code: i8) -> Result<TypeTag, ProtocolError> {
        let tag = match code {
            ERROR_TAG => Some(TypeTag::Error),
            LIST_TAG => Some(TypeTag::List),
            TABLE_TAG => Some(TypeTag::Table),
            DICT_TAG => Some(TypeTag::Dict),
            c if c < 0 => Kind::from_code(-c).map(TypeTag::Atom),
            c if c < TABLE_TAG => Kind::from_code(c).map(TypeTag::Vector),
            c => FunctionKind::from_code(c).map(TypeTag::Function),
        };
        tag.ok_or(ProtocolError::UnknownTypeTag(code))
    }

    /// The type byte written on the wire.
    pub const fn code(self) -> i8 {
        match self {
            TypeTag::Atom(kind) => -kind.code(),
            TypeTag::Vector(kind) => kind.code(),
            TypeTag::List => LIST_TAG,
            TypeTag::Table => TABLE_TAG,
            TypeTag::Dict => DICT_TAG,
            TypeTag::Function(kind) => kind.code(),
            TypeTag::Error => ERROR_TAG,
        }
    }

    pub const fn is_atom(self) -> bool {
        matches!(self, TypeTag::Atom(_) | TypeTag::Error)
    }
}
