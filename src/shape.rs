//! Partial shapes and element types of graph tensors.

use std::fmt;
use std::str::FromStr;

/// Size of one dimension of a tensor whose shape may be only partially known.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// A dimension whose size is fixed and specified as part of the model.
    Fixed(usize),

    /// A dimension whose size is determined at runtime. The symbol provides
    /// a name to identify when different values share a size.
    Symbolic(String),

    /// A dimension about which nothing is known.
    Unknown,
}

impl Dimension {
    /// Return the size of this dimension if it is fixed.
    pub fn fixed(&self) -> Option<usize> {
        match self {
            Dimension::Fixed(size) => Some(*size),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Dimension::Unknown)
    }
}

impl From<usize> for Dimension {
    fn from(val: usize) -> Dimension {
        Dimension::Fixed(val)
    }
}

impl From<&str> for Dimension {
    fn from(name: &str) -> Dimension {
        Dimension::Symbolic(name.to_string())
    }
}

impl From<String> for Dimension {
    fn from(name: String) -> Dimension {
        Dimension::Symbolic(name)
    }
}

impl fmt::Debug for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(size) => write!(f, "{}", size),
            Self::Symbolic(name) => write!(f, "\"{}\"", name),
            Self::Unknown => write!(f, "?"),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(size) => write!(f, "{}", size),
            Self::Symbolic(name) => write!(f, "{}", name),
            Self::Unknown => write!(f, "?"),
        }
    }
}

/// Shape of a tensor whose rank and dimension sizes may be unknown.
///
/// Each dimension of a ranked shape is independently fixed, symbolic or
/// unknown. A shape whose rank is not known is [`PartialShape::Dynamic`].
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub enum PartialShape {
    /// Neither the rank nor the dimension sizes are known.
    #[default]
    Dynamic,

    /// The rank is known. Individual dimensions may still be unknown.
    Ranked(Vec<Dimension>),
}

impl PartialShape {
    /// Create a shape where every dimension has a fixed size.
    pub fn fixed(dims: &[usize]) -> PartialShape {
        PartialShape::Ranked(dims.iter().copied().map(Dimension::Fixed).collect())
    }

    /// Create a shape with a known rank but no known dimension sizes.
    pub fn unknown_dims(rank: usize) -> PartialShape {
        PartialShape::Ranked(vec![Dimension::Unknown; rank])
    }

    /// Return the rank of the shape, if known.
    pub fn rank(&self) -> Option<usize> {
        self.dims().map(|dims| dims.len())
    }

    /// Return the dimensions of the shape, if the rank is known.
    pub fn dims(&self) -> Option<&[Dimension]> {
        match self {
            PartialShape::Dynamic => None,
            PartialShape::Ranked(dims) => Some(dims),
        }
    }

    /// Return the dimension at `index`, or `None` if the rank is unknown or
    /// `index` is out of range.
    pub fn dim(&self, index: usize) -> Option<&Dimension> {
        self.dims().and_then(|dims| dims.get(index))
    }

    /// Return true if the rank and all dimension sizes are fixed.
    pub fn is_static(&self) -> bool {
        self.dims()
            .is_some_and(|dims| dims.iter().all(|d| matches!(d, Dimension::Fixed(_))))
    }

    /// Return the fixed sizes of all dimensions, if the shape is static.
    pub fn to_fixed(&self) -> Option<Vec<usize>> {
        self.dims()?.iter().map(|d| d.fixed()).collect()
    }
}

impl From<Vec<Dimension>> for PartialShape {
    fn from(dims: Vec<Dimension>) -> PartialShape {
        PartialShape::Ranked(dims)
    }
}

impl<const N: usize> From<[Dimension; N]> for PartialShape {
    fn from(dims: [Dimension; N]) -> PartialShape {
        PartialShape::Ranked(dims.into())
    }
}

impl fmt::Debug for PartialShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartialShape::Dynamic => write!(f, "[...]"),
            PartialShape::Ranked(dims) => f.debug_list().entries(dims).finish(),
        }
    }
}

impl fmt::Display for PartialShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartialShape::Dynamic => write!(f, "[...]"),
            PartialShape::Ranked(dims) => {
                write!(f, "[")?;
                for (i, dim) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", dim)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Create a [`PartialShape`] from a list of fixed sizes and symbolic names.
///
/// ```
/// use rten_edit::{dims, PartialShape};
///
/// let shape: PartialShape = dims!["batch", 3, 224, 224];
/// assert_eq!(shape.rank(), Some(4));
/// ```
#[macro_export]
macro_rules! dims {
    ($($x:expr),* $(,)?) => {
        $crate::PartialShape::Ranked(vec![$($crate::Dimension::from($x)),*])
    };
}

/// Element type of a tensor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    Float32,
    Float16,
    Float64,
    Int64,
    Int32,
    Int8,
    UInt8,
    Bool,
}

impl ElementType {
    /// Return the size of elements of this type in bytes.
    pub fn size(self) -> u8 {
        match self {
            ElementType::Float64 | ElementType::Int64 => 8,
            ElementType::Float32 | ElementType::Int32 => 4,
            ElementType::Float16 => 2,
            ElementType::Int8 | ElementType::UInt8 | ElementType::Bool => 1,
        }
    }
}

impl fmt::Display for ElementType {
    /// Format this enum value in the style of the corresponding Rust type (eg.
    /// "i32" for `ElementType::Int32`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Float32 => "f32",
            ElementType::Float16 => "f16",
            ElementType::Float64 => "f64",
            ElementType::Int64 => "i64",
            ElementType::Int32 => "i32",
            ElementType::Int8 => "i8",
            ElementType::UInt8 => "u8",
            ElementType::Bool => "bool",
        };
        write!(f, "{}", name)
    }
}

/// Error returned when parsing an unrecognized element type name.
#[derive(Clone, Debug, PartialEq)]
pub struct UnknownElementType(pub String);

impl fmt::Display for UnknownElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown element type \"{}\"", self.0)
    }
}

impl std::error::Error for UnknownElementType {}

impl FromStr for ElementType {
    type Err = UnknownElementType;

    /// Parse an element type from either its Rust-style name ("f32") or its
    /// ONNX name ("float").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dtype = match s.to_ascii_lowercase().as_str() {
            "f32" | "float" | "float32" => ElementType::Float32,
            "f16" | "float16" => ElementType::Float16,
            "f64" | "double" | "float64" => ElementType::Float64,
            "i64" | "int64" => ElementType::Int64,
            "i32" | "int32" => ElementType::Int32,
            "i8" | "int8" => ElementType::Int8,
            "u8" | "uint8" => ElementType::UInt8,
            "bool" => ElementType::Bool,
            _ => return Err(UnknownElementType(s.to_string())),
        };
        Ok(dtype)
    }
}
