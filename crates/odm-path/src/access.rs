//! Fragment-by-fragment traversal of metadata values
//!
//! [`access`] walks a JSON value along a fragment list. A trailing `*` or
//! `**` yields the direct children of the reached node keyed by their dotted
//! path; [`flatten`] drives repeated `**` expansion down to
//! [`TERMINAL_DEPTH`].

use crate::error::{PathError, PathResult};
use crate::path::{Fragment, TERMINAL_DEPTH};
use indexmap::IndexMap;
use serde_json::Value;

/// Outcome of a traversal
#[derive(Debug, Clone, PartialEq)]
pub enum Accessed<'a> {
    /// Value at the terminal fragment (`None` when absent)
    Leaf(Option<&'a Value>),
    /// Direct children of the node before a wildcard, keyed `prefix.child`
    Children(IndexMap<String, &'a Value>),
}

impl Accessed<'_> {
    /// Clone into an owned JSON value
    ///
    /// Leaves become the value itself (`null` when absent); children become
    /// an object keyed by dotted path.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Leaf(leaf) => leaf.cloned().unwrap_or(Value::Null),
            Self::Children(children) => Value::Object(
                children
                    .iter()
                    .map(|(k, v)| (k.clone(), (*v).clone()))
                    .collect(),
            ),
        }
    }
}

/// Walk `root` along `fragments`
///
/// Non-terminal fragments must reach an object or array. The terminal
/// fragment returns whatever is present, including `null`.
///
/// # Errors
/// - `UndefinedPath` when a non-terminal fragment is absent
/// - `NullTraversal` when a non-terminal fragment holds `null`
/// - `PrimitiveTraversal` when a non-terminal fragment holds a primitive
/// - `WildcardNotLast` when a wildcard is followed by more fragments
pub fn access<'a>(root: &'a Value, fragments: &[Fragment]) -> PathResult<Accessed<'a>> {
    let Some(last) = fragments.len().checked_sub(1) else {
        return Ok(Accessed::Leaf(Some(root)));
    };
    let mut current = root;

    for (i, fragment) in fragments.iter().enumerate() {
        let key = match fragment {
            Fragment::Key(key) => key,
            Fragment::Wildcard | Fragment::Recursive => {
                if i != last {
                    return Err(PathError::WildcardNotLast(bracketed(fragments, i)));
                }
                return children(current, &fragments[..i]).map(Accessed::Children);
            }
        };

        let next = child(current, key);
        if i == last {
            return Ok(Accessed::Leaf(next));
        }

        current = match next {
            None => return Err(PathError::UndefinedPath(bracketed(fragments, i))),
            Some(Value::Null) => return Err(PathError::NullTraversal(bracketed(fragments, i))),
            Some(v @ (Value::Object(_) | Value::Array(_))) => v,
            Some(_) => return Err(PathError::PrimitiveTraversal(bracketed(fragments, i))),
        };
    }

    Ok(Accessed::Leaf(Some(current)))
}

/// Expand `fragments` into a flat map from dotted path to value
///
/// - trailing `*`: one level of children
/// - trailing `**` or no wildcard: children are expanded repeatedly until
///   every key reaches [`TERMINAL_DEPTH`]
///
/// A terminal key list yields a single entry when the value exists.
///
/// # Errors
/// Propagates traversal errors from [`access`], including those hit while
/// expanding intermediate levels.
pub fn flatten<'a>(root: &'a Value, fragments: &[Fragment]) -> PathResult<IndexMap<String, &'a Value>> {
    let mut keys: Vec<Fragment> = fragments.to_vec();
    let wildcard = match keys.last() {
        Some(f) if f.is_wildcard() => keys.pop(),
        _ => None,
    };

    let mut out = IndexMap::new();
    if wildcard.is_none() && keys.len() >= TERMINAL_DEPTH {
        if let Accessed::Leaf(Some(value)) = access(root, &keys)? {
            out.insert(join(&keys), value);
        }
        return Ok(out);
    }

    let recursive = !matches!(wildcard, Some(Fragment::Wildcard));
    expand_into(root, keys, recursive, &mut out)?;
    Ok(out)
}

fn expand_into<'a>(
    root: &'a Value,
    mut keys: Vec<Fragment>,
    recursive: bool,
    out: &mut IndexMap<String, &'a Value>,
) -> PathResult<()> {
    keys.push(Fragment::Wildcard);
    let Accessed::Children(children) = access(root, &keys)? else {
        return Ok(());
    };
    keys.pop();

    for (path, value) in children {
        let depth = keys.len() + 1;
        if !recursive || depth >= TERMINAL_DEPTH {
            out.insert(path, value);
            continue;
        }
        let next: Vec<Fragment> = path.split('.').map(Fragment::key).collect();
        expand_into(root, next, true, out)?;
    }
    Ok(())
}

fn child<'a>(node: &'a Value, key: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn children<'a>(node: &'a Value, prefix: &[Fragment]) -> PathResult<IndexMap<String, &'a Value>> {
    let base = join(prefix);
    let qualify = |key: &str| {
        if base.is_empty() {
            key.to_string()
        } else {
            format!("{base}.{key}")
        }
    };

    match node {
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (qualify(k), v)).collect()),
        Value::Array(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(i, v)| (qualify(&i.to_string()), v))
            .collect()),
        Value::Null => Err(PathError::NullTraversal(format!("{base}[.*]"))),
        _ => Err(PathError::PrimitiveTraversal(format!("{base}[.*]"))),
    }
}

fn join(fragments: &[Fragment]) -> String {
    fragments
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Render `valid[.rest]`, bracketing everything from `index` onwards
fn bracketed(fragments: &[Fragment], index: usize) -> String {
    let valid = join(&fragments[..index]);
    let rest = join(&fragments[index..]);
    if valid.is_empty() {
        format!("[{rest}]")
    } else {
        format!("{valid}[.{rest}]")
    }
}
