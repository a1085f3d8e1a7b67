//! Textual field reference grammar: `name[arg]` or bare `name`.

use super::{FieldDescriptor, FieldFlags};
use crate::error::PluginError;

/// The parsed argument portion of a field reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldArg {
    None,
    Index(u64),
    Key(String),
}

/// Split `token` (already isolated from the rest of the filter expression,
/// i.e. terminated by end-of-string or a space) into the field name and the
/// raw bracketed argument text, if any.
///
/// Returns `(name, Option<raw_arg>)`. Does not validate anything about the
/// argument shape yet; that's [`parse_arg`]'s job once the matching field
/// descriptor is known.
pub fn split_token(token: &str) -> (&str, Option<&str>) {
    match token.find('[') {
        None => (token, None),
        Some(open) => match token[open + 1..].find(']') {
            Some(rel_close) => {
                let close = open + 1 + rel_close;
                (&token[..open], Some(&token[open + 1..close]))
            }
            None => (token, None),
        },
    }
}

/// Validate and parse a raw bracketed argument against a field's declared
/// argument flags.
pub fn parse_arg(plugin_name: &str, field: &FieldDescriptor, raw_arg: Option<&str>) -> Result<FieldArg, PluginError> {
    let flags = field.flags;
    match raw_arg {
        None => {
            if flags.contains(FieldFlags::ARG_REQUIRED) {
                Err(PluginError::argument(
                    plugin_name,
                    format!("field {:?} requires an argument", field.name),
                ))
            } else {
                Ok(FieldArg::None)
            }
        }
        Some(raw) => {
            if !flags.intersects(FieldFlags::ARG_ALLOWED | FieldFlags::ARG_REQUIRED) {
                return Err(PluginError::argument(
                    plugin_name,
                    format!("field {:?} does not accept an argument", field.name),
                ));
            }
            if flags.contains(FieldFlags::ARG_INDEX) {
                match parse_index(raw) {
                    Ok(idx) => return Ok(FieldArg::Index(idx)),
                    Err(e) if !flags.contains(FieldFlags::ARG_KEY) => {
                        return Err(PluginError::argument(
                            plugin_name,
                            format!("field {:?} argument {raw:?} {e}", field.name),
                        ))
                    }
                    Err(_) => { /* fall through: ARG_KEY is also allowed, try that */ }
                }
            }
            if flags.contains(FieldFlags::ARG_KEY) {
                return Ok(FieldArg::Key(raw.to_string()));
            }
            Err(PluginError::argument(
                plugin_name,
                format!("field {:?} argument {raw:?} is not a valid index", field.name),
            ))
        }
    }
}

/// Parse an `ARG_INDEX` argument: ASCII digits only, no leading zero unless
/// the whole string is `"0"`, fits in a `u64`.
fn parse_index(raw: &str) -> Result<u64, &'static str> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err("is not a valid non-negative integer");
    }
    if raw.len() > 1 && raw.starts_with('0') {
        return Err("starts with 0");
    }
    raw.parse::<u64>().map_err(|_| "does not fit in 64 bits")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValueType;

    fn field(flags: FieldFlags) -> FieldDescriptor {
        FieldDescriptor {
            name: "f".to_string(),
            display_name: None,
            description: "d".to_string(),
            value_type: FieldValueType::Uint64,
            flags,
        }
    }

    #[test]
    fn splits_bracketed_token() {
        assert_eq!(split_token("plugin.foo[42]"), ("plugin.foo", Some("42")));
        assert_eq!(split_token("plugin.bar[my-key]"), ("plugin.bar", Some("my-key")));
        assert_eq!(split_token("plugin.baz"), ("plugin.baz", None));
    }

    #[test]
    fn rejects_leading_zero_except_bare_zero() {
        let f = field(FieldFlags::ARG_REQUIRED | FieldFlags::ARG_INDEX | FieldFlags::ARG_ALLOWED);
        let err = parse_arg("p", &f, Some("01")).unwrap_err();
        assert!(err.to_string().contains("starts with 0"));

        let ok = parse_arg("p", &f, Some("0")).unwrap();
        assert_eq!(ok, FieldArg::Index(0));
    }

    #[test]
    fn required_without_argument_fails() {
        let f = field(FieldFlags::ARG_REQUIRED | FieldFlags::ARG_INDEX | FieldFlags::ARG_ALLOWED);
        let err = parse_arg("p", &f, None).unwrap_err();
        assert!(err.to_string().contains("requires an argument"));
    }

    #[test]
    fn key_taken_verbatim_including_digit_look() {
        let f = field(FieldFlags::ARG_KEY | FieldFlags::ARG_ALLOWED);
        let arg = parse_arg("p", &f, Some("007")).unwrap();
        assert_eq!(arg, FieldArg::Key("007".to_string()));
    }

    #[test]
    fn both_index_and_key_allowed_prefers_index_when_numeric() {
        let f = field(FieldFlags::ARG_INDEX | FieldFlags::ARG_KEY | FieldFlags::ARG_ALLOWED);
        assert_eq!(parse_arg("p", &f, Some("42")).unwrap(), FieldArg::Index(42));
        assert_eq!(parse_arg("p", &f, Some("forty-two")).unwrap(), FieldArg::Key("forty-two".to_string()));
    }

    #[test]
    fn bracket_present_but_not_allowed_fails() {
        let f = field(FieldFlags::empty());
        assert!(parse_arg("p", &f, Some("1")).is_err());
    }

    #[test]
    fn arg_index_round_trip_any_valid_integer() {
        let f = field(FieldFlags::ARG_INDEX | FieldFlags::ARG_ALLOWED);
        for n in [0u64, 1, 9, 10, 999_999_999] {
            let token = format!("f[{n}]");
            let (_, raw) = split_token(&token);
            assert_eq!(parse_arg("p", &f, raw).unwrap(), FieldArg::Index(n));
        }
    }
}
