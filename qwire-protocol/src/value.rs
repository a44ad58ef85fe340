//! Value model carried by IPC messages.
//!
//! [`Value`] is a closed sum type: every shape the codec can write or read
//! has its own variant, and function-like payloads the client can only skip
//! over collapse into [`Value::Function`].

use crate::error::ProtocolError;
use crate::temporal::{self, Minute, Month, Second, Timespan, NULL_INT, NULL_LONG};
use crate::types::{FunctionKind, Kind, TypeTag};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::fmt;
use uuid::Uuid;

/// A single scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Boolean(bool),
    Guid(Uuid),
    Byte(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    Real(f32),
    Float(f64),
    Char(u8),
    Symbol(String),
    Timestamp(DateTime<Utc>),
    Month(Month),
    Date(NaiveDate),
    Datetime(NaiveDateTime),
    Timespan(Timespan),
    Minute(Minute),
    Second(Second),
    Time(NaiveTime),
}

/// A homogeneous vector. Character vectors are held as one string.
#[derive(Debug, Clone, PartialEq)]
pub enum Vector {
    Boolean(Vec<bool>),
    Guid(Vec<Uuid>),
    Byte(Vec<u8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Real(Vec<f32>),
    Float(Vec<f64>),
    Char(String),
    Symbol(Vec<String>),
    Timestamp(Vec<DateTime<Utc>>),
    Month(Vec<Month>),
    Date(Vec<NaiveDate>),
    Datetime(Vec<NaiveDateTime>),
    Timespan(Vec<Timespan>),
    Minute(Vec<Minute>),
    Second(Vec<Second>),
    Time(Vec<NaiveTime>),
}

/// Any value that can travel in a message payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The generic null `::`.
    Null,
    Atom(Atom),
    Vector(Vector),
    /// A heterogeneous list.
    List(Vec<Value>),
    Dict(Dict),
    Table(Table),
    /// A function-like payload that was consumed but not represented.
    Function(FunctionKind),
}

/// Parallel key and value sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct Dict {
    pub keys: Box<Value>,
    pub values: Box<Value>,
}

/// Named columns of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub data: Vec<Value>,
}

impl Atom {
    pub fn kind(&self) -> Kind {
        match self {
            Atom::Boolean(_) => Kind::Boolean,
            Atom::Guid(_) => Kind::Guid,
            Atom::Byte(_) => Kind::Byte,
            Atom::Short(_) => Kind::Short,
            Atom::Int(_) => Kind::Int,
            Atom::Long(_) => Kind::Long,
            Atom::Real(_) => Kind::Real,
            Atom::Float(_) => Kind::Float,
            Atom::Char(_) => Kind::Char,
            Atom::Symbol(_) => Kind::Symbol,
            Atom::Timestamp(_) => Kind::Timestamp,
            Atom::Month(_) => Kind::Month,
            Atom::Date(_) => Kind::Date,
            Atom::Datetime(_) => Kind::Datetime,
            Atom::Timespan(_) => Kind::Timespan,
            Atom::Minute(_) => Kind::Minute,
            Atom::Second(_) => Kind::Second,
            Atom::Time(_) => Kind::Time,
        }
    }

    /// Returns whether this atom holds its kind's null sentinel.
    pub fn is_null(&self) -> bool {
        match self {
            Atom::Boolean(_) | Atom::Byte(_) | Atom::Symbol(_) | Atom::Char(_) => false,
            Atom::Guid(g) => g.is_nil(),
            Atom::Short(v) => *v == i16::MIN,
            Atom::Int(v) => *v == NULL_INT,
            Atom::Long(v) => *v == NULL_LONG,
            Atom::Real(v) => v.is_nan(),
            Atom::Float(v) => v.is_nan(),
            Atom::Timestamp(v) => *v == temporal::NULL_TIMESTAMP,
            Atom::Month(v) => v.is_null(),
            Atom::Date(v) => *v == temporal::NULL_DATE,
            Atom::Datetime(v) => *v == temporal::NULL_DATETIME,
            Atom::Timespan(v) => v.is_null(),
            Atom::Minute(v) => v.is_null(),
            Atom::Second(v) => v.is_null(),
            Atom::Time(v) => *v == temporal::null_time(),
        }
    }
}

/// Applies `$body` to the inner vec of every variant except `Char`.
macro_rules! each_vec {
    ($v:expr, $inner:ident => $body:expr, $chars:ident => $char_body:expr) => {
        match $v {
            Vector::Boolean($inner) => $body,
            Vector::Guid($inner) => $body,
            Vector::Byte($inner) => $body,
            Vector::Short($inner) => $body,
            Vector::Int($inner) => $body,
            Vector::Long($inner) => $body,
            Vector::Real($inner) => $body,
            Vector::Float($inner) => $body,
            Vector::Symbol($inner) => $body,
            Vector::Timestamp($inner) => $body,
            Vector::Month($inner) => $body,
            Vector::Date($inner) => $body,
            Vector::Datetime($inner) => $body,
            Vector::Timespan($inner) => $body,
            Vector::Minute($inner) => $body,
            Vector::Second($inner) => $body,
            Vector::Time($inner) => $body,
            Vector::Char($chars) => $char_body,
        }
    };
}

impl Vector {
    pub fn kind(&self) -> Kind {
        match self {
            Vector::Boolean(_) => Kind::Boolean,
            Vector::Guid(_) => Kind::Guid,
            Vector::Byte(_) => Kind::Byte,
            Vector::Short(_) => Kind::Short,
            Vector::Int(_) => Kind::Int,
            Vector::Long(_) => Kind::Long,
            Vector::Real(_) => Kind::Real,
            Vector::Float(_) => Kind::Float,
            Vector::Char(_) => Kind::Char,
            Vector::Symbol(_) => Kind::Symbol,
            Vector::Timestamp(_) => Kind::Timestamp,
            Vector::Month(_) => Kind::Month,
            Vector::Date(_) => Kind::Date,
            Vector::Datetime(_) => Kind::Datetime,
            Vector::Timespan(_) => Kind::Timespan,
            Vector::Minute(_) => Kind::Minute,
            Vector::Second(_) => Kind::Second,
            Vector::Time(_) => Kind::Time,
        }
    }

    /// Element count. For character vectors this is the number of
    /// characters, not the encoded byte length.
    pub fn len(&self) -> usize {
        each_vec!(self, v => v.len(), s => s.chars().count())
    }

    pub fn is_empty(&self) -> bool {
        each_vec!(self, v => v.is_empty(), s => s.is_empty())
    }

    /// Element `index` as an atom. Characters outside Latin-1 come back
    /// as `?`.
    pub fn get(&self, index: usize) -> Option<Atom> {
        match self {
            Vector::Boolean(v) => v.get(index).copied().map(Atom::Boolean),
            Vector::Guid(v) => v.get(index).copied().map(Atom::Guid),
            Vector::Byte(v) => v.get(index).copied().map(Atom::Byte),
            Vector::Short(v) => v.get(index).copied().map(Atom::Short),
            Vector::Int(v) => v.get(index).copied().map(Atom::Int),
            Vector::Long(v) => v.get(index).copied().map(Atom::Long),
            Vector::Real(v) => v.get(index).copied().map(Atom::Real),
            Vector::Float(v) => v.get(index).copied().map(Atom::Float),
            Vector::Char(s) => s
                .chars()
                .nth(index)
                .map(|c| Atom::Char(u8::try_from(c).unwrap_or(b'?'))),
            Vector::Symbol(v) => v.get(index).cloned().map(Atom::Symbol),
            Vector::Timestamp(v) => v.get(index).copied().map(Atom::Timestamp),
            Vector::Month(v) => v.get(index).copied().map(Atom::Month),
            Vector::Date(v) => v.get(index).copied().map(Atom::Date),
            Vector::Datetime(v) => v.get(index).copied().map(Atom::Datetime),
            Vector::Timespan(v) => v.get(index).copied().map(Atom::Timespan),
            Vector::Minute(v) => v.get(index).copied().map(Atom::Minute),
            Vector::Second(v) => v.get(index).copied().map(Atom::Second),
            Vector::Time(v) => v.get(index).copied().map(Atom::Time),
        }
    }

    /// Iterates over the elements as atoms.
    pub fn atoms(&self) -> impl Iterator<Item = Atom> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// An empty vector of `kind`.
    pub fn empty(kind: Kind) -> Vector {
        match kind {
            Kind::Boolean => Vector::Boolean(Vec::new()),
            Kind::Guid => Vector::Guid(Vec::new()),
            Kind::Byte => Vector::Byte(Vec::new()),
            Kind::Short => Vector::Short(Vec::new()),
            Kind::Int => Vector::Int(Vec::new()),
            Kind::Long => Vector::Long(Vec::new()),
            Kind::Real => Vector::Real(Vec::new()),
            Kind::Float => Vector::Float(Vec::new()),
            Kind::Char => Vector::Char(String::new()),
            Kind::Symbol => Vector::Symbol(Vec::new()),
            Kind::Timestamp => Vector::Timestamp(Vec::new()),
            Kind::Month => Vector::Month(Vec::new()),
            Kind::Date => Vector::Date(Vec::new()),
            Kind::Datetime => Vector::Datetime(Vec::new()),
            Kind::Timespan => Vector::Timespan(Vec::new()),
            Kind::Minute => Vector::Minute(Vec::new()),
            Kind::Second => Vector::Second(Vec::new()),
            Kind::Time => Vector::Time(Vec::new()),
        }
    }
}

impl Value {
    /// Wire type tag of this value.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Function(FunctionKind::UnaryPrimitive),
            Value::Atom(a) => TypeTag::Atom(a.kind()),
            Value::Vector(v) => TypeTag::Vector(v.kind()),
            Value::List(_) => TypeTag::List,
            Value::Dict(_) => TypeTag::Dict,
            Value::Table(_) => TypeTag::Table,
            Value::Function(f) => TypeTag::Function(*f),
        }
    }

    /// Element count as q's `count` reports it: 1 for atoms, rows for
    /// tables, keys for dictionaries.
    pub fn count(&self) -> usize {
        match self {
            Value::Null | Value::Atom(_) | Value::Function(_) => 1,
            Value::Vector(v) => v.len(),
            Value::List(items) => items.len(),
            Value::Dict(d) => d.keys.count(),
            Value::Table(t) => t.row_count(),
        }
    }

    /// A symbol atom.
    pub fn symbol(s: impl Into<String>) -> Value {
        Value::Atom(Atom::Symbol(s.into()))
    }

    /// A character vector, the q representation of a string.
    pub fn chars(s: impl Into<String>) -> Value {
        Value::Vector(Vector::Char(s.into()))
    }

    /// A symbol vector.
    pub fn symbols<I, S>(items: I) -> Value
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Vector(Vector::Symbol(items.into_iter().map(Into::into).collect()))
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Value::Atom(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&Vector> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }
}

impl Dict {
    /// Pairs `keys` with `values`, which must have the same count.
    pub fn new(keys: Value, values: Value) -> Result<Self, ProtocolError> {
        let (left, right) = (keys.count(), values.count());
        if left != right {
            return Err(ProtocolError::LengthMismatch { left, right });
        }
        Ok(Self {
            keys: Box::new(keys),
            values: Box::new(values),
        })
    }

    pub fn len(&self) -> usize {
        self.keys.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Table {
    /// Builds a table from column names and one value per column.
    pub fn new(columns: Vec<String>, data: Vec<Value>) -> Result<Self, ProtocolError> {
        if columns.len() != data.len() {
            return Err(ProtocolError::LengthMismatch {
                left: columns.len(),
                right: data.len(),
            });
        }
        Ok(Self { columns, data })
    }

    /// Number of rows, taken from the first column.
    pub fn row_count(&self) -> usize {
        self.data.first().map(Value::count).unwrap_or(0)
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.data.get(i))
    }

    /// The dictionary a table is a flip of: symbol keys over a general list.
    pub fn into_dict(self) -> Dict {
        Dict {
            keys: Box::new(Value::Vector(Vector::Symbol(self.columns))),
            values: Box::new(Value::List(self.data)),
        }
    }
}

impl TryFrom<Dict> for Table {
    type Error = ProtocolError;

    fn try_from(dict: Dict) -> Result<Self, Self::Error> {
        let columns = match *dict.keys {
            Value::Vector(Vector::Symbol(names)) => names,
            _ => return Err(ProtocolError::InvalidTable("column names must be symbols")),
        };
        let data = match *dict.values {
            Value::List(items) => items,
            Value::Vector(v) if v.is_empty() && columns.is_empty() => Vec::new(),
            _ => return Err(ProtocolError::InvalidTable("columns must be a general list")),
        };
        Table::new(columns, data)
    }
}

macro_rules! impl_from_atom {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Atom(Atom::$variant(v))
                }
            }

            impl From<Vec<$ty>> for Value {
                fn from(v: Vec<$ty>) -> Self {
                    Value::Vector(Vector::$variant(v))
                }
            }
        )*
    };
}

impl_from_atom! {
    bool => Boolean,
    Uuid => Guid,
    u8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Real,
    f64 => Float,
    String => Symbol,
    DateTime<Utc> => Timestamp,
    Month => Month,
    NaiveDate => Date,
    NaiveDateTime => Datetime,
    Timespan => Timespan,
    Minute => Minute,
    Second => Second,
    NaiveTime => Time,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::symbol(s)
    }
}

impl From<Atom> for Value {
    fn from(a: Atom) -> Self {
        Value::Atom(a)
    }
}

impl From<Vector> for Value {
    fn from(v: Vector) -> Self {
        Value::Vector(v)
    }
}

impl From<Dict> for Value {
    fn from(d: Dict) -> Self {
        Value::Dict(d)
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(t)
    }
}

// ============================================================================
// Display: q console-like rendering
// ============================================================================

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return match self {
                Atom::Guid(_) => write!(f, "0Ng"),
                Atom::Short(_) => write!(f, "0Nh"),
                Atom::Int(_) => write!(f, "0Ni"),
                Atom::Long(_) => write!(f, "0N"),
                Atom::Real(_) => write!(f, "0Ne"),
                Atom::Float(_) => write!(f, "0n"),
                Atom::Timestamp(_) => write!(f, "0Np"),
                Atom::Month(_) => write!(f, "0Nm"),
                Atom::Date(_) => write!(f, "0Nd"),
                Atom::Datetime(_) => write!(f, "0Nz"),
                Atom::Timespan(_) => write!(f, "0Nn"),
                Atom::Minute(_) => write!(f, "0Nu"),
                Atom::Second(_) => write!(f, "0Nv"),
                _ => write!(f, "0Nt"),
            };
        }
        match self {
            Atom::Boolean(b) => write!(f, "{}b", u8::from(*b)),
            Atom::Guid(g) => write!(f, "{}", g.hyphenated()),
            Atom::Byte(b) => write!(f, "0x{b:02x}"),
            Atom::Short(v) => write!(f, "{v}h"),
            Atom::Int(v) => write!(f, "{v}i"),
            Atom::Long(v) => write!(f, "{v}"),
            Atom::Real(v) => write!(f, "{v}e"),
            Atom::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v}f"),
            Atom::Float(v) => write!(f, "{v}"),
            Atom::Char(c) => write!(f, "\"{}\"", char::from(*c)),
            Atom::Symbol(s) => write!(f, "`{s}"),
            Atom::Timestamp(ts) => write!(f, "{}", ts.format("%Y.%m.%dD%H:%M:%S%.9f")),
            Atom::Month(m) => write!(f, "{m}m"),
            Atom::Date(d) if *d == temporal::INF_DATE => write!(f, "0Wd"),
            Atom::Date(d) if *d == temporal::neg_inf_date() => write!(f, "-0Wd"),
            Atom::Date(d) => write!(f, "{}", d.format("%Y.%m.%d")),
            Atom::Datetime(dt) if *dt == temporal::INF_DATETIME => write!(f, "0wz"),
            Atom::Datetime(dt) if *dt == temporal::neg_inf_datetime() => write!(f, "-0wz"),
            Atom::Datetime(dt) => write!(f, "{}", dt.format("%Y.%m.%dT%H:%M:%S%.3f")),
            Atom::Timespan(n) => write!(f, "{n}"),
            Atom::Minute(u) => write!(f, "{u}"),
            Atom::Second(v) => write!(f, "{v}"),
            Atom::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.3f")),
        }
    }
}

fn write_items<T>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    atom: impl Fn(&T) -> Atom,
) -> fmt::Result {
    if items.len() == 1 {
        f.write_str(",")?;
    }
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{}", atom(item))?;
    }
    Ok(())
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return match self {
                Vector::Char(_) => write!(f, "\"\""),
                Vector::Symbol(_) => write!(f, "`symbol$()"),
                other => write!(f, "`{}$()", other.kind().name()),
            };
        }
        match self {
            Vector::Char(s) => write!(f, "\"{s}\""),
            Vector::Symbol(items) => {
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                items.iter().try_for_each(|s| write!(f, "`{s}"))
            }
            Vector::Boolean(items) => {
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                items.iter().try_for_each(|b| write!(f, "{}", u8::from(*b)))?;
                f.write_str("b")
            }
            Vector::Guid(items) => write_items(f, items, |g| Atom::Guid(*g)),
            Vector::Byte(items) => {
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str("0x")?;
                items.iter().try_for_each(|b| write!(f, "{b:02x}"))
            }
            Vector::Short(items) => write_items(f, items, |v| Atom::Short(*v)),
            Vector::Int(items) => write_items(f, items, |v| Atom::Int(*v)),
            Vector::Long(items) => write_items(f, items, |v| Atom::Long(*v)),
            Vector::Real(items) => write_items(f, items, |v| Atom::Real(*v)),
            Vector::Float(items) => write_items(f, items, |v| Atom::Float(*v)),
            Vector::Timestamp(items) => write_items(f, items, |v| Atom::Timestamp(*v)),
            Vector::Month(items) => write_items(f, items, |v| Atom::Month(*v)),
            Vector::Date(items) => write_items(f, items, |v| Atom::Date(*v)),
            Vector::Datetime(items) => write_items(f, items, |v| Atom::Datetime(*v)),
            Vector::Timespan(items) => write_items(f, items, |v| Atom::Timespan(*v)),
            Vector::Minute(items) => write_items(f, items, |v| Atom::Minute(*v)),
            Vector::Second(items) => write_items(f, items, |v| Atom::Second(*v)),
            Vector::Time(items) => write_items(f, items, |v| Atom::Time(*v)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "::"),
            Value::Atom(a) => write!(f, "{a}"),
            Value::Vector(v) => write!(f, "{v}"),
            Value::List(items) => {
                if items.len() == 1 {
                    f.write_str(",")?;
                    return write!(f, "{}", items[0]);
                }
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Value::Dict(d) => write!(f, "{d}"),
            Value::Table(t) => write!(f, "{t}"),
            Value::Function(kind) => write!(f, "<{kind:?}>"),
        }
    }
}

impl fmt::Display for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.keys, self.values)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("+")?;
        if self.columns.is_empty() {
            return f.write_str("()!()");
        }
        self.columns.iter().try_for_each(|c| write!(f, "`{c}"))?;
        f.write_str("!")?;
        write!(f, "{}", Value::List(self.data.clone()))
    }
}
