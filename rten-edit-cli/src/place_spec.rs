use rten_edit::{Dimension, InputModel, PartialShape, PlaceId};

/// Identifies a place in a model by name.
///
/// The syntax is:
///
/// - `name` - A tensor
/// - `op.in.N` - Input port N of operation `op`
/// - `op.out.N` - Output port N of operation `op`
/// - `op.op` - The operation `op`
///
/// Names containing dots can be quoted, eg. `"layer.0".in.0`.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaceSpec {
    Tensor(String),
    InputPort { op: String, index: usize },
    OutputPort { op: String, index: usize },
    Operation(String),
}

impl PlaceSpec {
    pub fn parse(spec: &str) -> Result<PlaceSpec, ParseError> {
        let tokens = tokenize(spec);
        match &tokens[..] {
            [Token::Text(name)] => Ok(PlaceSpec::Tensor(name.clone())),
            [Token::Text(op), Token::Dot, Token::Text(kind)] if kind == "op" => {
                Ok(PlaceSpec::Operation(op.clone()))
            }
            [Token::Text(op), Token::Dot, Token::Text(kind), Token::Dot, Token::Text(index)] => {
                let index: usize = index
                    .parse()
                    .map_err(|_| ParseError::new(spec, ParseErrorKind::InvalidIndex))?;
                match kind.as_str() {
                    "in" => Ok(PlaceSpec::InputPort {
                        op: op.clone(),
                        index,
                    }),
                    "out" => Ok(PlaceSpec::OutputPort {
                        op: op.clone(),
                        index,
                    }),
                    _ => Err(ParseError::new(spec, ParseErrorKind::InvalidName)),
                }
            }
            _ => Err(ParseError::new(spec, ParseErrorKind::InvalidName)),
        }
    }

    /// Find the place in `model`.
    pub fn resolve(&self, model: &InputModel) -> Option<PlaceId> {
        let place = match self {
            PlaceSpec::Tensor(name) => model.place_by_tensor_name(name),
            PlaceSpec::InputPort { op, index } => {
                model.place_by_operation_name_and_input_port(op, *index)
            }
            PlaceSpec::OutputPort { op, index } => {
                model.place_by_operation_name_and_output_port(op, *index)
            }
            PlaceSpec::Operation(op) => model.place_by_operation_name(op),
        };
        place.map(|p| p.id())
    }
}

impl std::fmt::Display for PlaceSpec {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaceSpec::Tensor(name) => write!(fmt, "{}", name),
            PlaceSpec::InputPort { op, index } => write!(fmt, "{}.in.{}", op, index),
            PlaceSpec::OutputPort { op, index } => write!(fmt, "{}.out.{}", op, index),
            PlaceSpec::Operation(op) => write!(fmt, "{}.op", op),
        }
    }
}

/// Specifies the shape of a tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeSpec {
    /// Name of the tensor.
    pub tensor: String,

    pub shape: PartialShape,
}

impl ShapeSpec {
    /// Parse a shape specifier in the form `name=d0,d1,...`.
    ///
    /// Each dimension is a size, `?` for an unknown size or a symbol name. A
    /// shape of `...` has an unknown rank and an empty shape is a scalar.
    pub fn parse(spec: &str) -> Result<ShapeSpec, ParseError> {
        let tokens = tokenize(spec);
        let Some(eq_pos) = tokens.iter().position(|tok| matches!(tok, Token::Equals)) else {
            return Err(ParseError::new(
                spec,
                ParseErrorKind::InvalidFormat {
                    message: "expected <name>=<shape> but no '=' was found".into(),
                },
            ));
        };

        let (name_spec, shape_spec) = tokens.split_at(eq_pos);
        let [Token::Text(tensor)] = name_spec else {
            return Err(ParseError::new(spec, ParseErrorKind::InvalidName));
        };
        let shape_spec = &shape_spec[1..];

        let shape = match shape_spec {
            [] => PartialShape::Ranked(Vec::new()),
            [Token::Dot, Token::Dot, Token::Dot] => PartialShape::Dynamic,
            _ => {
                let dims = shape_spec
                    .split(|tok| matches!(tok, Token::Comma))
                    .map(|dim| match dim {
                        [Token::Text(text)] if text == "?" => Ok(Dimension::Unknown),
                        [Token::Text(text)] => Ok(match text.parse::<usize>() {
                            Ok(size) => Dimension::Fixed(size),
                            Err(_) => Dimension::Symbolic(text.clone()),
                        }),
                        _ => Err(ParseError::new(spec, ParseErrorKind::InvalidDimension)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                PartialShape::Ranked(dims)
            }
        };

        Ok(ShapeSpec {
            tensor: tensor.clone(),
            shape,
        })
    }
}

enum Token {
    Equals,
    Dot,
    Comma,
    Text(String),
}

fn tokenize(spec: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut in_quote = false;

    for ch in spec.chars() {
        match ch {
            '=' if !in_quote => tokens.push(Token::Equals),
            '.' if !in_quote => tokens.push(Token::Dot),
            ',' if !in_quote => tokens.push(Token::Comma),
            '"' => in_quote = !in_quote,
            ch => match tokens.last_mut() {
                Some(Token::Text(text)) => text.push(ch),
                _ => tokens.push(Token::Text(ch.into())),
            },
        }
    }

    tokens
}

#[derive(Clone, Debug, PartialEq)]
#[allow(clippy::enum_variant_names)] // Don't warn about all variants having "Invalid" prefix.
enum ParseErrorKind {
    /// Shape spec doesn't match "name=shape"
    InvalidFormat { message: String },
    /// Spec has an invalid tensor, operation or port name
    InvalidName,
    /// Port index is not a non-negative integer
    InvalidIndex,
    /// Shape spec has an empty or malformed dimension
    InvalidDimension,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParseError {
    spec: String,
    kind: ParseErrorKind,
}

impl ParseError {
    fn new(spec: &str, kind: ParseErrorKind) -> ParseError {
        ParseError {
            spec: spec.to_string(),
            kind,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ParseErrorKind::InvalidFormat { message } => {
                write!(fmt, "invalid format for spec \"{}\": {}", self.spec, message)
            }
            ParseErrorKind::InvalidName => write!(
                fmt,
                "invalid place \"{}\". Expected <tensor>, <op>.in.<N>, <op>.out.<N> or <op>.op",
                self.spec
            ),
            ParseErrorKind::InvalidIndex => write!(
                fmt,
                "invalid port index in \"{}\". Must be a non-negative integer.",
                self.spec
            ),
            ParseErrorKind::InvalidDimension => {
                write!(fmt, "invalid dimension in shape spec \"{}\"", self.spec)
            }
        }
    }
}

impl std::error::Error for ParseError {}
