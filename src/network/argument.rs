use std::collections::HashMap;

use crate::utils::error::{Result, ShadowError};

/// A typed operator or network argument value.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    Float(f32),
    Int(i64),
    Bool(bool),
    Str(String),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Bools(Vec<bool>),
    Strs(Vec<String>),
}

impl ArgValue {
    fn kind(&self) -> &'static str {
        match self {
            ArgValue::Float(_) => "float",
            ArgValue::Int(_) => "int",
            ArgValue::Bool(_) => "bool",
            ArgValue::Str(_) => "string",
            ArgValue::Floats(_) => "repeated float",
            ArgValue::Ints(_) => "repeated int",
            ArgValue::Bools(_) => "repeated bool",
            ArgValue::Strs(_) => "repeated string",
        }
    }
}

macro_rules! impl_from_arg_value {
    ($($t:ty => |$v:ident| $e:expr),* $(,)?) => {
        $(impl From<$t> for ArgValue {
            fn from($v: $t) -> Self {
                $e
            }
        })*
    };
}

impl_from_arg_value! {
    f32 => |v| ArgValue::Float(v),
    f64 => |v| ArgValue::Float(v as f32),
    i64 => |v| ArgValue::Int(v),
    i32 => |v| ArgValue::Int(v as i64),
    usize => |v| ArgValue::Int(v as i64),
    bool => |v| ArgValue::Bool(v),
    &str => |v| ArgValue::Str(v.to_string()),
    String => |v| ArgValue::Str(v),
    Vec<f32> => |v| ArgValue::Floats(v),
    Vec<f64> => |v| ArgValue::Floats(v.into_iter().map(|x| x as f32).collect()),
    Vec<i64> => |v| ArgValue::Ints(v),
    Vec<i32> => |v| ArgValue::Ints(v.into_iter().map(i64::from).collect()),
    Vec<bool> => |v| ArgValue::Bools(v),
    Vec<String> => |v| ArgValue::Strs(v),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Argument {
    pub name: String,
    pub value: ArgValue,
}

impl Argument {
    pub fn new(name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Conversion out of an [`ArgValue`] for typed lookups.
pub trait ArgType: Sized {
    const TYPE_NAME: &'static str;

    fn from_single(value: &ArgValue) -> Option<Self>;

    fn from_repeated(value: &ArgValue) -> Option<Vec<Self>>;
}

impl ArgType for f32 {
    const TYPE_NAME: &'static str = "float";

    fn from_single(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn from_repeated(value: &ArgValue) -> Option<Vec<Self>> {
        match value {
            ArgValue::Floats(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl ArgType for i64 {
    const TYPE_NAME: &'static str = "int";

    fn from_single(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn from_repeated(value: &ArgValue) -> Option<Vec<Self>> {
        match value {
            ArgValue::Ints(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl ArgType for i32 {
    const TYPE_NAME: &'static str = "int";

    fn from_single(value: &ArgValue) -> Option<Self> {
        i64::from_single(value).and_then(|v| i32::try_from(v).ok())
    }

    fn from_repeated(value: &ArgValue) -> Option<Vec<Self>> {
        i64::from_repeated(value)?
            .into_iter()
            .map(|v| i32::try_from(v).ok())
            .collect()
    }
}

impl ArgType for usize {
    const TYPE_NAME: &'static str = "non-negative int";

    fn from_single(value: &ArgValue) -> Option<Self> {
        i64::from_single(value).and_then(|v| usize::try_from(v).ok())
    }

    fn from_repeated(value: &ArgValue) -> Option<Vec<Self>> {
        i64::from_repeated(value)?
            .into_iter()
            .map(|v| usize::try_from(v).ok())
            .collect()
    }
}

// Booleans are commonly serialised as ints, accept both.
impl ArgType for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_single(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Bool(v) => Some(*v),
            ArgValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    fn from_repeated(value: &ArgValue) -> Option<Vec<Self>> {
        match value {
            ArgValue::Bools(v) => Some(v.clone()),
            ArgValue::Ints(v) => Some(v.iter().map(|x| *x != 0).collect()),
            _ => None,
        }
    }
}

impl ArgType for String {
    const TYPE_NAME: &'static str = "string";

    fn from_single(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Str(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn from_repeated(value: &ArgValue) -> Option<Vec<Self>> {
        match value {
            ArgValue::Strs(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Name-keyed, typed view over an argument list.
#[derive(Clone, Debug, Default)]
pub struct ArgumentHelper {
    arg_map: HashMap<String, ArgValue>,
}

impl ArgumentHelper {
    /// `owner` names the operator or network the arguments belong to, for diagnostics.
    pub fn new(args: &[Argument], owner: &str) -> Result<Self> {
        let mut arg_map = HashMap::with_capacity(args.len());
        for arg in args {
            if arg_map.insert(arg.name.clone(), arg.value.clone()).is_some() {
                return Err(ShadowError::Argument {
                    name: arg.name.clone(),
                    message: format!("duplicated argument found in {}", owner),
                });
            }
        }
        Ok(Self { arg_map })
    }

    pub fn has_argument(&self, name: &str) -> bool {
        self.arg_map.contains_key(name)
    }

    pub fn single<T: ArgType>(&self, name: &str, default: T) -> Result<T> {
        match self.arg_map.get(name) {
            None => Ok(default),
            Some(value) => T::from_single(value).ok_or_else(|| mismatch::<T>(name, value)),
        }
    }

    pub fn repeated<T: ArgType>(&self, name: &str, default: Vec<T>) -> Result<Vec<T>> {
        match self.arg_map.get(name) {
            None => Ok(default),
            Some(value) => T::from_repeated(value).ok_or_else(|| mismatch::<T>(name, value)),
        }
    }
}

fn mismatch<T: ArgType>(name: &str, value: &ArgValue) -> ShadowError {
    ShadowError::Argument {
        name: name.to_string(),
        message: format!("expected {}, found {}", T::TYPE_NAME, value.kind()),
    }
}
