//! Parses the plugin's field-declaration JSON.
//!
//! ```json
//! [
//!   {
//!     "name": "myplugin.foo",
//!     "type": "uint64",
//!     "desc": "the foo field",
//!     "display": "Foo",
//!     "isList": false,
//!     "properties": ["hidden"],
//!     "arg": {"isRequired": true, "isIndex": true}
//!   }
//! ]
//! ```

use super::{FieldCatalog, FieldDescriptor, FieldFlags, FieldValueType};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawArg {
    #[serde(default, rename = "isRequired")]
    is_required: bool,
    #[serde(default, rename = "isIndex")]
    is_index: bool,
    #[serde(default, rename = "isKey")]
    is_key: bool,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    desc: String,
    #[serde(default)]
    display: Option<String>,
    #[serde(default, rename = "isList")]
    is_list: bool,
    #[serde(default)]
    properties: Vec<String>,
    #[serde(default)]
    arg: Option<RawArg>,
}

/// Parse a plugin's `get_fields()` JSON into a validated [`FieldCatalog`].
///
/// Any invariant violation is fatal at load time: the whole catalog is
/// rejected rather than silently dropping the offending field, so the
/// caller can name the plugin and field in one error.
pub fn parse_field_json(plugin_name: &str, json: &str) -> Result<FieldCatalog, String> {
    let raw: Vec<RawField> = serde_json::from_str(json)
        .map_err(|e| format!("[{plugin_name}] field JSON is not a valid array of field objects: {e}"))?;

    let mut fields = Vec::with_capacity(raw.len());
    for r in raw {
        if r.name.trim().is_empty() {
            return Err(format!("[{plugin_name}] a field declaration has an empty \"name\""));
        }
        if r.desc.trim().is_empty() {
            return Err(format!("[{plugin_name}] field {:?} has an empty \"desc\"", r.name));
        }
        let value_type = FieldValueType::from_json_name(&r.ty).ok_or_else(|| {
            format!("[{plugin_name}] field {:?} has unknown type {:?}", r.name, r.ty)
        })?;

        let mut flags = FieldFlags::empty();
        if r.is_list {
            flags |= FieldFlags::IS_LIST;
        }
        for prop in &r.properties {
            match prop.as_str() {
                "hidden" => flags |= FieldFlags::TABLE_ONLY,
                "info" => flags |= FieldFlags::INFO,
                "conversation" => flags |= FieldFlags::CONVERSATION,
                _ => {} // unrecognized property names are ignored
            }
        }
        if let Some(arg) = &r.arg {
            if arg.is_required {
                flags |= FieldFlags::ARG_REQUIRED;
            }
            if arg.is_index {
                flags |= FieldFlags::ARG_INDEX;
            }
            if arg.is_key {
                flags |= FieldFlags::ARG_KEY;
            }
            if arg.is_required || arg.is_index || arg.is_key {
                flags |= FieldFlags::ARG_ALLOWED;
            }
        }

        let field = FieldDescriptor {
            name: r.name,
            display_name: r.display,
            description: r.desc,
            value_type,
            flags,
        };
        field.validate(plugin_name)?;
        fields.push(field);
    }

    Ok(FieldCatalog(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_field() {
        let json = r#"[{"name":"p.foo","type":"uint64","desc":"foo"}]"#;
        let cat = parse_field_json("p", json).unwrap();
        assert_eq!(cat.0.len(), 1);
        assert_eq!(cat.0[0].name, "p.foo");
        assert_eq!(cat.0[0].value_type, FieldValueType::Uint64);
        assert!(cat.0[0].flags.is_empty());
    }

    #[test]
    fn rejects_required_without_index_or_key() {
        let json = r#"[{"name":"p.foo","type":"uint64","desc":"foo","arg":{"isRequired":true}}]"#;
        // isRequired alone does not set ARG_INDEX/ARG_KEY, so this should fail validation.
        let err = parse_field_json("p", json).unwrap_err();
        assert!(err.contains("ARG_REQUIRED"));
    }

    #[test]
    fn arg_index_implies_allowed() {
        let json = r#"[{"name":"p.foo","type":"uint64","desc":"foo","arg":{"isIndex":true}}]"#;
        let cat = parse_field_json("p", json).unwrap();
        assert!(cat.0[0].flags.contains(FieldFlags::ARG_INDEX));
        assert!(cat.0[0].flags.contains(FieldFlags::ARG_ALLOWED));
    }

    #[test]
    fn rejects_unknown_type() {
        let json = r#"[{"name":"p.foo","type":"frobnicate","desc":"foo"}]"#;
        assert!(parse_field_json("p", json).is_err());
    }

    #[test]
    fn ignores_unrecognized_properties() {
        let json = r#"[{"name":"p.foo","type":"bool","desc":"foo","properties":["hidden","nonsense"]}]"#;
        let cat = parse_field_json("p", json).unwrap();
        assert!(cat.0[0].flags.contains(FieldFlags::TABLE_ONLY));
    }
}
