//! Decoding of array leaves in a pickled bundle
//!
//! A leaf is either a pickled NumPy array or a nested list of numbers.
//!
//! NumPy arrays reach us as the state their `__setstate__` would receive:
//! `(version, shape, dtype, is_fortran, raw_bytes)`. The reconstructor call
//! itself is dropped by the decoder, and so is the dtype descriptor, which
//! leaves the element width to be read off the byte count. Only `float32`
//! and `float64` data is accepted.
//!
//! Nested lists must be rectangular; their depth gives the array rank.

use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use serde_pickle::Value;

use crate::{Result, UniRepError};

/// Convert a bundle leaf into an `f32` array
pub fn value_to_array(value: &Value, label: &str) -> Result<ArrayD<f32>> {
    if let Some(state) = NdarrayState::from_value(value) {
        return state.decode(label);
    }

    let mut walker = Walker::default();
    walker.visit(value, 0, label)?;

    ArrayD::from_shape_vec(IxDyn(&walker.shape), walker.data)
        .map_err(|e| UniRepError::WeightFormat(format!("{}: {}", label, e)))
}

/// Length of the first axis of a numeric array of rank one or more
pub fn leading_dim(value: &Value, label: &str) -> Result<usize> {
    let array = value_to_array(value, label)?;
    array
        .shape()
        .first()
        .copied()
        .ok_or_else(|| UniRepError::WeightFormat(format!("{} is a scalar", label)))
}

/// Decoded `ndarray.__setstate__` arguments
struct NdarrayState<'a> {
    shape: &'a [Value],
    dtype: &'a Value,
    fortran: bool,
    raw: &'a [u8],
}

impl<'a> NdarrayState<'a> {
    fn from_value(value: &'a Value) -> Option<Self> {
        let items = match value {
            Value::Tuple(items) => items.as_slice(),
            _ => return None,
        };
        // Writers older than state version 1 leave the version out
        let fields = match items {
            [Value::I64(_), rest @ ..] if rest.len() == 4 => rest,
            _ if items.len() == 4 => items,
            _ => return None,
        };
        match fields {
            [Value::Tuple(shape) | Value::List(shape), dtype, Value::Bool(fortran), raw] => {
                let raw: &[u8] = match raw {
                    Value::Bytes(bytes) => bytes,
                    // Empty bytes pickled by protocol 2 come back as a reduce call
                    Value::None => &[],
                    _ => return None,
                };
                Some(Self {
                    shape: shape.as_slice(),
                    dtype,
                    fortran: *fortran,
                    raw,
                })
            }
            _ => None,
        }
    }

    fn decode(&self, label: &str) -> Result<ArrayD<f32>> {
        let shape = self
            .shape
            .iter()
            .map(|dim| match dim {
                Value::I64(n) if *n >= 0 => Ok(*n as usize),
                other => Err(UniRepError::WeightFormat(format!(
                    "{}: array shape holds {}",
                    label,
                    kind(other)
                ))),
            })
            .collect::<Result<Vec<usize>>>()?;

        let count: usize = shape.iter().product();
        let big_endian = byte_order(self.dtype) == Some(b'>');
        let data: Vec<f32> = match (count, self.raw.len()) {
            (0, _) => Vec::new(),
            (count, len) if len == count * 4 => self
                .raw
                .chunks_exact(4)
                .map(|chunk| {
                    let mut bytes = [0u8; 4];
                    bytes.copy_from_slice(chunk);
                    if big_endian {
                        f32::from_be_bytes(bytes)
                    } else {
                        f32::from_le_bytes(bytes)
                    }
                })
                .collect(),
            (count, len) if len == count * 8 => self
                .raw
                .chunks_exact(8)
                .map(|chunk| {
                    let mut bytes = [0u8; 8];
                    bytes.copy_from_slice(chunk);
                    let x = if big_endian {
                        f64::from_be_bytes(bytes)
                    } else {
                        f64::from_le_bytes(bytes)
                    };
                    x as f32
                })
                .collect(),
            (count, len) => {
                return Err(UniRepError::WeightFormat(format!(
                    "{}: {} bytes of data for {} elements, expected float32 or float64",
                    label, len, count
                )))
            }
        };

        let array = if self.fortran {
            ArrayD::from_shape_vec(IxDyn(&shape).f(), data)
        } else {
            ArrayD::from_shape_vec(IxDyn(&shape), data)
        }
        .map_err(|e| UniRepError::WeightFormat(format!("{}: {}", label, e)))?;
        Ok(array.as_standard_layout().into_owned())
    }
}

/// Byte order character from a dtype's pickled state, `(3, '<', ...)`
///
/// A dtype shared between arrays is pickled once; later references decode
/// to `None` and fall back to little-endian.
fn byte_order(dtype: &Value) -> Option<u8> {
    match dtype {
        Value::Tuple(items) => match items.get(1) {
            Some(Value::String(order)) => order.bytes().next(),
            Some(Value::Bytes(order)) => order.first().copied(),
            _ => None,
        },
        _ => None,
    }
}

#[derive(Default)]
struct Walker {
    shape: Vec<usize>,
    leaf_depth: Option<usize>,
    data: Vec<f32>,
}

impl Walker {
    fn visit(&mut self, value: &Value, depth: usize, label: &str) -> Result<()> {
        match value {
            Value::List(items) | Value::Tuple(items) => {
                if self.leaf_depth.is_some_and(|leaf| depth >= leaf) {
                    return Err(ragged(label));
                }
                match self.shape.get(depth) {
                    Some(&len) if len != items.len() => return Err(ragged(label)),
                    Some(_) => {}
                    None => self.shape.push(items.len()),
                }
                for item in items {
                    self.visit(item, depth + 1, label)?;
                }
                Ok(())
            }
            Value::F64(x) => self.leaf(*x as f32, depth, label),
            Value::I64(x) => self.leaf(*x as f32, depth, label),
            Value::Bool(b) => self.leaf(if *b { 1.0 } else { 0.0 }, depth, label),
            other => Err(UniRepError::WeightFormat(format!(
                "{}: expected a number, found {}",
                label,
                kind(other)
            ))),
        }
    }

    fn leaf(&mut self, x: f32, depth: usize, label: &str) -> Result<()> {
        match self.leaf_depth {
            Some(leaf) if leaf != depth => return Err(ragged(label)),
            Some(_) => {}
            None => {
                if depth != self.shape.len() {
                    return Err(ragged(label));
                }
                self.leaf_depth = Some(depth);
            }
        }
        self.data.push(x);
        Ok(())
    }
}

fn ragged(label: &str) -> UniRepError {
    UniRepError::WeightFormat(format!("{}: ragged nested array", label))
}

/// Short description of a pickle value for error messages
pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::None => "None",
        Value::Bool(_) => "bool",
        Value::I64(_) | Value::Int(_) => "int",
        Value::F64(_) => "float",
        Value::Bytes(_) => "bytes",
        Value::String(_) => "str",
        Value::List(_) => "list",
        Value::Tuple(_) => "tuple",
        Value::Set(_) | Value::FrozenSet(_) => "set",
        Value::Dict(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: Vec<Value>) -> Value {
        Value::List(items)
    }

    #[test]
    fn test_matrix() {
        let value = list(vec![
            list(vec![Value::F64(1.0), Value::F64(2.0), Value::F64(3.0)]),
            Value::Tuple(vec![Value::I64(4), Value::F64(5.0), Value::F64(6.0)]),
        ]);
        let array = value_to_array(&value, "m").unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array[[1, 0]], 4.0);
        assert_eq!(leading_dim(&value, "m").unwrap(), 2);
    }

    #[test]
    fn test_vector_and_empty() {
        let array = value_to_array(&list(vec![Value::F64(0.5)]), "v").unwrap();
        assert_eq!(array.shape(), &[1]);

        let empty = value_to_array(&list(vec![]), "e").unwrap();
        assert_eq!(empty.shape(), &[0]);
    }

    #[test]
    fn test_ragged_is_rejected() {
        let uneven = list(vec![
            list(vec![Value::F64(1.0), Value::F64(2.0)]),
            list(vec![Value::F64(3.0)]),
        ]);
        assert!(matches!(
            value_to_array(&uneven, "r"),
            Err(UniRepError::WeightFormat(_))
        ));

        let mixed_depth = list(vec![list(vec![Value::F64(1.0)]), Value::F64(2.0)]);
        assert!(value_to_array(&mixed_depth, "r").is_err());
    }

    fn ndarray(shape: &[i64], dtype: Value, fortran: bool, raw: Vec<u8>) -> Value {
        Value::Tuple(vec![
            Value::I64(1),
            Value::Tuple(shape.iter().map(|&d| Value::I64(d)).collect()),
            dtype,
            Value::Bool(fortran),
            Value::Bytes(raw),
        ])
    }

    fn little_endian() -> Value {
        Value::Tuple(vec![
            Value::I64(3),
            Value::String("<".to_string()),
            Value::None,
            Value::None,
            Value::None,
            Value::I64(-1),
            Value::I64(-1),
            Value::I64(0),
        ])
    }

    #[test]
    fn test_ndarray_state_float32() {
        let raw: Vec<u8> = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]
            .iter()
            .flat_map(|x| x.to_le_bytes())
            .collect();
        let value = ndarray(&[2, 3], little_endian(), false, raw);

        let array = value_to_array(&value, "w").unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array[[1, 2]], 6.0);
        assert_eq!(leading_dim(&value, "w").unwrap(), 2);
    }

    #[test]
    fn test_ndarray_state_float64_fortran_order() {
        // Column-major [[1, 2, 3], [4, 5, 6]]
        let raw: Vec<u8> = [1.0f64, 4.0, 2.0, 5.0, 3.0, 6.0]
            .iter()
            .flat_map(|x| x.to_le_bytes())
            .collect();
        // Shared dtype reference decoded to None
        let value = ndarray(&[2, 3], Value::None, true, raw);

        let array = value_to_array(&value, "w").unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array[[0, 1]], 2.0);
        assert_eq!(array[[1, 0]], 4.0);
    }

    #[test]
    fn test_ndarray_state_big_endian() {
        let mut dtype = little_endian();
        if let Value::Tuple(items) = &mut dtype {
            items[1] = Value::String(">".to_string());
        }
        let raw = 0.25f32.to_be_bytes().to_vec();
        let array = value_to_array(&ndarray(&[1], dtype, false, raw), "b").unwrap();
        assert_eq!(array[[0]], 0.25);
    }

    #[test]
    fn test_ndarray_state_rejects_other_widths() {
        // Six int16 elements
        let value = ndarray(&[2, 3], little_endian(), false, vec![0; 12]);
        let err = value_to_array(&value, "w").unwrap_err();
        assert!(err.to_string().contains("12 bytes of data for 6 elements"));
    }

    #[test]
    fn test_leading_dim_needs_a_numeric_array() {
        let tuple = Value::Tuple(vec![Value::I64(1), Value::String("x".to_string())]);
        assert!(leading_dim(&tuple, "w").is_err());
        assert!(leading_dim(&Value::F64(1.0), "w").is_err());
    }

    #[test]
    fn test_non_numeric_leaf() {
        let value = list(vec![Value::String("wx".to_string())]);
        let err = value_to_array(&value, "s").unwrap_err();
        assert!(err.to_string().contains("found str"));
    }
}
