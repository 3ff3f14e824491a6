//! JSON documents: schema, entities and policies.
//!
//! Parsing only. Nothing here touches a registry or store; callers apply the
//! parsed values atomically.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::PolicyError;
use crate::schema::{ActionDef, EntityTypeDef, SchemaFragment};
use crate::types::{AttrDecl, AttrType, Entity, Policy};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FragmentDoc {
    #[serde(default)]
    entity_types: BTreeMap<String, EntityTypeDoc>,
    #[serde(default)]
    actions: BTreeMap<String, ActionDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityTypeDoc {
    #[serde(default)]
    member_of_types: Vec<String>,
    #[serde(default)]
    shape: Option<TypeDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionDoc {
    #[serde(default)]
    applies_to: Option<AppliesToDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppliesToDoc {
    #[serde(default)]
    principal_types: Vec<String>,
    #[serde(default)]
    resource_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TypeDoc {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    element: Option<Box<TypeDoc>>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, TypeDoc>,
    #[serde(default = "required_by_default")]
    required: bool,
}

fn required_by_default() -> bool {
    true
}

/// Parse a schema document.
///
/// Accepts either a bare fragment (`{"entityTypes": ..., "actions": ...}`)
/// or a map from namespace to fragment. Entity type names in a non-empty
/// namespace are qualified as `Namespace::Type` unless already qualified;
/// action names are never qualified.
pub fn parse_schema(text: &str) -> Result<SchemaFragment, PolicyError> {
    let value: Value = serde_json::from_str(text).map_err(schema_error)?;
    let Value::Object(map) = &value else {
        return Err(PolicyError::SchemaParseError(
            "schema document must be a JSON object".to_string(),
        ));
    };

    let bare = map.is_empty() || map.contains_key("entityTypes") || map.contains_key("actions");
    let namespaces: BTreeMap<String, FragmentDoc> = if bare {
        BTreeMap::from([(String::new(), serde_json::from_value(value).map_err(schema_error)?)])
    } else {
        serde_json::from_value(value).map_err(schema_error)?
    };

    let mut fragment = SchemaFragment::default();
    for (namespace, doc) in namespaces {
        for (name, ty) in doc.entity_types {
            let mut def = EntityTypeDef::new(qualify(&namespace, &name));
            for parent in &ty.member_of_types {
                def = def.member_of(qualify(&namespace, parent));
            }
            if let Some(shape) = ty.shape {
                if shape.kind != "Record" {
                    return Err(PolicyError::SchemaParseError(format!(
                        "shape of {name} must be a Record, found {}",
                        shape.kind
                    )));
                }
                for (attr, decl) in shape.attributes {
                    def = def.with_attribute(attr, attr_decl(&namespace, decl)?);
                }
            }
            fragment.entity_types.push(def);
        }
        for (name, action) in doc.actions {
            let mut def = ActionDef::new(name);
            if let Some(applies) = action.applies_to {
                for t in &applies.principal_types {
                    def = def.with_principal_type(qualify(&namespace, t));
                }
                for t in &applies.resource_types {
                    def = def.with_resource_type(qualify(&namespace, t));
                }
            }
            fragment.actions.push(def);
        }
    }
    Ok(fragment)
}

fn attr_decl(namespace: &str, doc: TypeDoc) -> Result<AttrDecl, PolicyError> {
    let required = doc.required;
    let ty = attr_type(namespace, doc)?;
    Ok(AttrDecl { ty, required })
}

fn attr_type(namespace: &str, doc: TypeDoc) -> Result<AttrType, PolicyError> {
    let ty = match doc.kind.as_str() {
        "Boolean" => AttrType::Boolean,
        "Long" => AttrType::Long,
        "String" => AttrType::String,
        "Set" => {
            let element = doc.element.ok_or_else(|| {
                PolicyError::SchemaParseError("Set type requires an element".to_string())
            })?;
            AttrType::Set(Box::new(attr_type(namespace, *element)?))
        }
        "Entity" => {
            let name = doc.name.ok_or_else(|| {
                PolicyError::SchemaParseError("Entity type requires a name".to_string())
            })?;
            AttrType::Entity(qualify(namespace, &name))
        }
        "Record" => AttrType::Record(
            doc.attributes
                .into_iter()
                .map(|(k, v)| Ok((k, attr_decl(namespace, v)?)))
                .collect::<Result<_, PolicyError>>()?,
        ),
        other => {
            return Err(PolicyError::SchemaParseError(format!(
                "unknown attribute type '{other}'"
            )));
        }
    };
    Ok(ty)
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() || name.contains("::") {
        name.to_string()
    } else {
        format!("{namespace}::{name}")
    }
}

fn schema_error(err: serde_json::Error) -> PolicyError {
    PolicyError::SchemaParseError(err.to_string())
}

/// Parse an entity document: a JSON array of entities.
pub fn parse_entities(text: &str) -> Result<Vec<Entity>, PolicyError> {
    Ok(serde_json::from_str(text)?)
}

/// Parse a policy document: a JSON array of policies.
///
/// ```rust
/// use listgate_core::compile_policies;
/// let text = r#"[
///     {"id": "everyone", "effect": "permit"},
///     {"id": "no-bob", "effect": "forbid",
///      "principal": {"op": "==", "entity": {"type": "User", "id": "bob"}}}
/// ]"#;
/// let policies = compile_policies(text).unwrap();
/// assert_eq!(policies.len(), 2);
/// ```
pub fn compile_policies(text: &str) -> Result<Vec<Policy>, PolicyError> {
    serde_json::from_str(text).map_err(|e| PolicyError::PolicyParseError(e.to_string()))
}
