// Licensed under the Apache-2.0 license

//! Elaborated parameter values and the arithmetic used when re-evaluating
//! parameter expressions.

use anyhow::bail;
use serde::Deserialize;

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    U64(u64),
    Bool(bool),
    String(String),
}

impl Value {
    /// Only unsigned integers can size an array.
    pub fn as_integer(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Value::U64(v) => *v == 0,
            Value::Bool(v) => !(*v),
            Value::String(_) => false,
        }
    }

    pub fn as_u64(&self) -> Result<u64, anyhow::Error> {
        match self {
            Value::U64(v) => Ok(*v),
            Value::Bool(v) => Ok(if *v { 1 } else { 0 }),
            _ => bail!("Cannot convert {:?} to integer", self),
        }
    }

    pub(crate) fn try_add(&self, rhs: &Value) -> Result<Value, anyhow::Error> {
        Ok(Value::U64(self.as_u64()?.wrapping_add(rhs.as_u64()?)))
    }

    pub(crate) fn try_sub(&self, rhs: &Value) -> Result<Value, anyhow::Error> {
        Ok(Value::U64(self.as_u64()?.wrapping_sub(rhs.as_u64()?)))
    }

    pub(crate) fn try_times(&self, rhs: &Value) -> Result<Value, anyhow::Error> {
        Ok(Value::U64(self.as_u64()?.wrapping_mul(rhs.as_u64()?)))
    }

    pub(crate) fn try_divide(&self, rhs: &Value) -> Result<Value, anyhow::Error> {
        let b = rhs.as_u64()?;
        if b == 0 {
            bail!("Division by zero");
        }
        Ok(Value::U64(self.as_u64()? / b))
    }

    pub(crate) fn try_modulus(&self, rhs: &Value) -> Result<Value, anyhow::Error> {
        let b = rhs.as_u64()?;
        if b == 0 {
            bail!("Modulus by zero");
        }
        Ok(Value::U64(self.as_u64()? % b))
    }

    pub(crate) fn try_lshift(&self, rhs: &Value) -> Result<Value, anyhow::Error> {
        let shift = rhs.as_u64()?;
        if shift >= 64 {
            bail!("Shift amount {} out of range", shift);
        }
        Ok(Value::U64(self.as_u64()? << shift))
    }

    pub(crate) fn try_rshift(&self, rhs: &Value) -> Result<Value, anyhow::Error> {
        let shift = rhs.as_u64()?;
        if shift >= 64 {
            bail!("Shift amount {} out of range", shift);
        }
        Ok(Value::U64(self.as_u64()? >> shift))
    }

    pub(crate) fn try_and(&self, rhs: &Value) -> Result<Value, anyhow::Error> {
        Ok(Value::U64(self.as_u64()? & rhs.as_u64()?))
    }

    pub(crate) fn try_or(&self, rhs: &Value) -> Result<Value, anyhow::Error> {
        Ok(Value::U64(self.as_u64()? | rhs.as_u64()?))
    }

    pub(crate) fn try_xor(&self, rhs: &Value) -> Result<Value, anyhow::Error> {
        Ok(Value::U64(self.as_u64()? ^ rhs.as_u64()?))
    }

    pub(crate) fn try_neg(&self) -> Result<Value, anyhow::Error> {
        Ok(Value::U64(self.as_u64()?.wrapping_neg()))
    }

    pub(crate) fn try_not(&self) -> Result<Value, anyhow::Error> {
        Ok(Value::U64(!self.as_u64()?))
    }

    pub(crate) fn logical_not(&self) -> Value {
        Value::Bool(self.is_zero())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::U64(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<u64> for Value {
    fn from(val: u64) -> Self {
        Value::U64(val)
    }
}
impl From<bool> for Value {
    fn from(val: bool) -> Self {
        Value::Bool(val)
    }
}
impl From<String> for Value {
    fn from(val: String) -> Self {
        Value::String(val)
    }
}
impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Value::String(val.into())
    }
}
