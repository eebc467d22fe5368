//! Debug formatting helpers for [`custom_debug_derive`].

use std::fmt;

/// Print a fixed placeholder instead of the field's value.
///
/// Use with `#[debug(with = "crate::fmt::redacted")]` on secrets.
pub fn redacted<T>(_value: &T, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("<redacted>")
}
