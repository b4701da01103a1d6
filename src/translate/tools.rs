//! Convert caller tool declarations (JSON-Schema flavoured) into Gemini function
//! declarations.
//!
//! Only a fixed set of primitive type names is accepted. An `anyOf` union is
//! narrowed to its first non-null branch, and a `null` branch makes the
//! parameter optional.

use std::collections::BTreeMap;

use super::openai_types::{ChatTool, ParameterSchema};
use crate::error::{ProxyError, Result};
use crate::gateway::types::{FunctionDeclaration, Schema, SchemaType, Tool};

/// Convert a tool list into a single tool-set entry. Absent or empty input
/// yields no tool-set at all.
pub fn convert_tools(tools: Option<&[ChatTool]>) -> Result<Vec<Tool>> {
    let Some(tools) = tools.filter(|t| !t.is_empty()) else {
        return Ok(Vec::new());
    };

    let function_declarations = tools
        .iter()
        .map(convert_function)
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(count = function_declarations.len(), "converted tool declarations");

    Ok(vec![Tool {
        function_declarations,
    }])
}

fn convert_function(tool: &ChatTool) -> Result<FunctionDeclaration> {
    let function = &tool.function;
    let mut properties = BTreeMap::new();
    let mut required = Vec::new();

    if let Some(ref params) = function.parameters {
        required.clone_from(&params.required);

        for (name, param) in &params.properties {
            if let Some(ref kind) = param.kind {
                properties.insert(name.clone(), convert_schema(name, kind, param)?);
            } else if let Some(ref branches) = param.any_of {
                let mut chosen = None;
                for branch in branches {
                    if branch.kind.as_deref() == Some("null") {
                        required.retain(|r| r != name);
                        continue;
                    }
                    if chosen.is_none() {
                        let kind = declared_type(name, branch)?;
                        let mut schema = convert_schema(name, kind, branch)?;
                        if param.description.is_some() {
                            schema.description.clone_from(&param.description);
                        }
                        chosen = Some(schema);
                    }
                }
                let schema = chosen.ok_or_else(|| {
                    ProxyError::invalid_request(format!(
                        "parameter `{name}` of `{}` has no non-null anyOf branch",
                        function.name
                    ))
                })?;
                properties.insert(name.clone(), schema);
            }
        }
    }

    required.retain(|r| properties.contains_key(r));

    let parameters = if properties.is_empty() {
        None
    } else {
        Some(Schema {
            schema_type: SchemaType::Object,
            description: function.description.clone(),
            items: None,
            required: Some(required),
            properties: Some(properties),
        })
    };

    Ok(FunctionDeclaration {
        name: function.name.clone(),
        description: function.description.clone(),
        parameters,
    })
}

fn convert_schema(name: &str, kind: &str, param: &ParameterSchema) -> Result<Schema> {
    let mut schema = Schema::of(schema_type(kind)?);
    schema.description.clone_from(&param.description);

    if schema.schema_type == SchemaType::Array {
        let items = param.items.as_deref().ok_or_else(|| {
            ProxyError::invalid_request(format!("array parameter `{name}` is missing `items`"))
        })?;
        let item_kind = declared_type(name, items)?;
        schema.items = Some(Box::new(convert_schema(name, item_kind, items)?));
    }

    Ok(schema)
}

fn declared_type<'a>(name: &str, param: &'a ParameterSchema) -> Result<&'a str> {
    param.kind.as_deref().ok_or_else(|| {
        ProxyError::invalid_request(format!("parameter `{name}` declares no type"))
    })
}

fn schema_type(type_name: &str) -> Result<SchemaType> {
    match type_name {
        "string" => Ok(SchemaType::String),
        "integer" => Ok(SchemaType::Integer),
        "array" => Ok(SchemaType::Array),
        "number" => Ok(SchemaType::Number),
        other => Err(ProxyError::unsupported_type(other)),
    }
}
