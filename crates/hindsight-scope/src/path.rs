//! Path parsing and value navigation.
//!
//! A path names an assignable slot inside a scope's value namespace: dotted
//! segments, with numeric segments (or a `[n]` suffix) addressing array
//! elements.
//!
//! # Example
//!
//! ```
//! use hindsight_scope::path::{parse_path, Step};
//!
//! let steps = parse_path("items.1.name").unwrap();
//! assert_eq!(
//!     steps,
//!     vec![
//!         Step::Key("items".to_string()),
//!         Step::Index(1),
//!         Step::Key("name".to_string()),
//!     ]
//! );
//!
//! // `[n]` is equivalent to a numeric dotted segment.
//! assert_eq!(parse_path("items[1].name").unwrap(), steps);
//! ```

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("invalid path syntax in {path:?} at byte {at}")]
    Parse { path: String, at: usize },
    #[error("path {path:?} is not assignable: {reason}")]
    NotAssignable { path: String, reason: String },
}

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    Key(String),
    Index(usize),
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_continue(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

/// Parses a path string into steps.
///
/// Segments are identifiers (`[A-Za-z_$][A-Za-z0-9_$]*`) or unsigned
/// integers; integers become [`Step::Index`]. A segment may carry any number
/// of `[n]` index suffixes.
pub fn parse_path(path: &str) -> Result<Vec<Step>, PathError> {
    if path.trim().is_empty() {
        return Err(PathError::Empty);
    }
    let bytes = path.as_bytes();
    let mut steps = Vec::new();
    let mut i = 0;
    loop {
        let start = i;
        while i < bytes.len() && bytes[i] != b'.' && bytes[i] != b'[' {
            i += 1;
        }
        let seg = &path[start..i];
        if seg.is_empty() {
            return Err(PathError::Parse {
                path: path.to_string(),
                at: start,
            });
        }
        if seg.bytes().all(|b| b.is_ascii_digit()) {
            let idx = seg.parse().map_err(|_| PathError::Parse {
                path: path.to_string(),
                at: start,
            })?;
            steps.push(Step::Index(idx));
        } else if is_ident_start(seg.as_bytes()[0]) && seg.bytes().all(is_ident_continue) {
            steps.push(Step::Key(seg.to_string()));
        } else {
            return Err(PathError::Parse {
                path: path.to_string(),
                at: start,
            });
        }
        while i < bytes.len() && bytes[i] == b'[' {
            let open = i;
            i += 1;
            let digits_start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i == digits_start || i >= bytes.len() || bytes[i] != b']' {
                return Err(PathError::Parse {
                    path: path.to_string(),
                    at: open,
                });
            }
            let idx = path[digits_start..i].parse().map_err(|_| PathError::Parse {
                path: path.to_string(),
                at: digits_start,
            })?;
            steps.push(Step::Index(idx));
            i += 1;
        }
        if i == bytes.len() {
            break;
        }
        if bytes[i] != b'.' {
            return Err(PathError::Parse {
                path: path.to_string(),
                at: i,
            });
        }
        i += 1;
        if i == bytes.len() {
            return Err(PathError::Parse {
                path: path.to_string(),
                at: i,
            });
        }
    }
    Ok(steps)
}

/// Immutable navigation inside a value.
///
/// `Step::Index` against an object falls back to the decimal key, and
/// `Step::Key` against an array is accepted when the key parses as an index,
/// matching how dynamic hosts address collections.
pub fn value_at<'a>(mut value: &'a Value, steps: &[Step]) -> Option<&'a Value> {
    for step in steps {
        value = match (step, value) {
            (Step::Key(k), Value::Object(map)) => map.get(k)?,
            (Step::Key(k), Value::Array(arr)) => arr.get(k.parse::<usize>().ok()?)?,
            (Step::Index(i), Value::Array(arr)) => arr.get(*i)?,
            (Step::Index(i), Value::Object(map)) => map.get(&i.to_string())?,
            _ => return None,
        };
    }
    Some(value)
}

/// Mutable navigation that creates missing intermediates.
///
/// Nulls become objects (or arrays, for an index step); arrays are padded
/// with nulls up to the requested index. A scalar in the middle of the path
/// is not assignable.
pub fn value_at_mut_create<'a>(
    mut value: &'a mut Value,
    steps: &[Step],
    path: &str,
) -> Result<&'a mut Value, PathError> {
    for step in steps {
        match step {
            Step::Key(k) => {
                if value.is_null() {
                    *value = Value::Object(serde_json::Map::new());
                }
                value = match value {
                    Value::Object(map) => map.entry(k.clone()).or_insert(Value::Null),
                    Value::Array(arr) => {
                        let idx = k.parse::<usize>().map_err(|_| PathError::NotAssignable {
                            path: path.to_string(),
                            reason: format!("segment {k:?} does not index an array"),
                        })?;
                        while arr.len() <= idx {
                            arr.push(Value::Null);
                        }
                        &mut arr[idx]
                    }
                    _ => {
                        return Err(PathError::NotAssignable {
                            path: path.to_string(),
                            reason: format!("segment {k:?} traverses a scalar"),
                        })
                    }
                };
            }
            Step::Index(i) => {
                if value.is_null() {
                    *value = Value::Array(Vec::new());
                }
                value = match value {
                    Value::Array(arr) => {
                        while arr.len() <= *i {
                            arr.push(Value::Null);
                        }
                        &mut arr[*i]
                    }
                    Value::Object(map) => map.entry(i.to_string()).or_insert(Value::Null),
                    _ => {
                        return Err(PathError::NotAssignable {
                            path: path.to_string(),
                            reason: format!("segment [{i}] traverses a scalar"),
                        })
                    }
                };
            }
        }
    }
    Ok(value)
}
