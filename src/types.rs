use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// Describes the shape of a [`Value`] accepted or produced by a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Type {
    Any,
    Nil,
    Bool,
    Int,
    String,
    Bytes,
    List(Box<Type>),
}

impl Type {
    fn name(&self) -> &'static str {
        use Type::*;
        match self {
            Any => "Any",
            Nil => "Nil",
            Bool => "Bool",
            Int => "Int",
            String => "String",
            Bytes => "Bytes",
            List(_) => "List",
        }
    }

    pub fn list_of(item: Type) -> Self {
        Type::List(Box::new(item))
    }

    /// True when values of this type are plain text.
    pub fn is_textual(&self) -> bool {
        matches!(self, Type::String)
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Any, _)
            | (Type::Nil, Value::Nil)
            | (Type::Bool, Value::Bool(_))
            | (Type::Int, Value::Int(_))
            | (Type::String, Value::String(_))
            | (Type::Bytes, Value::Bytes(_)) => true,
            (Type::List(item), Value::List(values)) => values.iter().all(|v| item.accepts(v)),
            _ => false,
        }
    }

    pub fn check(&self, value: &Value) -> Result<(), TypeMismatch> {
        if self.accepts(value) {
            Ok(())
        } else {
            Err(TypeMismatch::new(value.clone(), self.clone()))
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())?;
        if let Type::List(item) = self {
            write!(f, "({item})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::List(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nil
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

pub trait Typed {
    fn rpc_type() -> Type;
}

pub trait Encode {
    fn encode(val: Self) -> Value;
}

pub trait Decode: Sized {
    fn decode(val: Value) -> Result<Self, TypeMismatch>;
}

macro_rules! impl_encode_decode {
    ($rust_type:ty, $rpc_type:expr, $encode_name:pat => $encode_expr:expr, $($from_rpc_arm:tt)*) => {
        impl Typed for $rust_type {
            fn rpc_type() -> Type {
                $rpc_type
            }
        }

        impl Encode for $rust_type {
            fn encode($encode_name: $rust_type) -> Value {
                $encode_expr
            }
        }

        impl Decode for $rust_type {
            fn decode(val: Value) -> Result<Self, TypeMismatch> {
                Ok(match val {
                    $($from_rpc_arm)*,
                    _ => return Err(TypeMismatch::new(val, <Self as Typed>::rpc_type()))
                })
            }
        }
    };
}

impl_encode_decode!((), Type::Nil, () => Value::Nil, Value::Nil => ());
impl_encode_decode!(bool, Type::Bool, b => Value::Bool(b), Value::Bool(b) => b);
impl_encode_decode!(i64, Type::Int, n => Value::Int(n), Value::Int(n) => n);
impl_encode_decode!(String, Type::String, s => Value::String(s), Value::String(s) => s);
impl_encode_decode!(Vec<u8>, Type::Bytes, b => Value::Bytes(b), Value::Bytes(b) => b);
impl_encode_decode!(Vec<Value>, Type::list_of(Type::Any), l => Value::List(l), Value::List(l) => l);

impl Typed for Value {
    fn rpc_type() -> Type {
        Type::Any
    }
}

impl Encode for Value {
    fn encode(val: Value) -> Value {
        val
    }
}

impl Decode for Value {
    fn decode(val: Value) -> Result<Self, TypeMismatch> {
        Ok(val)
    }
}

#[derive(Debug, Clone)]
pub struct TypeMismatch {
    value: Value,
    expected_type: Type,
}

impl TypeMismatch {
    fn new(value: Value, expected_type: Type) -> Self {
        Self {
            value,
            expected_type,
        }
    }

    pub fn expected_type(&self) -> &Type {
        &self.expected_type
    }
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Type error: {:?} :/: {}", self.value, self.expected_type)
    }
}

impl Error for TypeMismatch {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_type_checks_every_item() {
        let ints = Type::list_of(Type::Int);
        assert!(ints.accepts(&Value::List(vec![1.into(), 2.into()])));
        assert!(!ints.accepts(&Value::List(vec![1.into(), "two".into()])));
        assert!(ints.accepts(&Value::List(vec![])));
    }

    #[test]
    fn only_strings_are_textual() {
        assert!(Type::String.is_textual());
        for typ in [Type::Any, Type::Nil, Type::Int, Type::Bytes, Type::list_of(Type::String)] {
            assert!(!typ.is_textual(), "{typ} should not be textual");
        }
    }

    #[test]
    fn decode_rejects_wrong_variant() {
        let err = String::decode(Value::Int(3)).unwrap_err();
        assert_eq!(err.expected_type(), &Type::String);
        assert_eq!(i64::decode(Value::Int(3)).unwrap(), 3);
    }

    #[test]
    fn display_renders_nested_lists() {
        let value = Value::List(vec!["a".into(), Value::List(vec![1.into()]), Value::Nil]);
        assert_eq!(value.to_string(), "[a, [1], nil]");
        assert_eq!(Type::list_of(Type::Int).to_string(), "List(Int)");
    }
}
