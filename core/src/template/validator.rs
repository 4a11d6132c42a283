use alloy::primitives::Address;
use serde_json::Value;

use crate::error::TemplateError;
use crate::template::Template;
use crate::template::encoder::parse_interface;
use crate::template::placeholder::{PercentageSource, Placeholder, find_placeholders};

/// One-shot structural validation, run before any per-wallet work. A failure
/// here is a property of the template and aborts the whole dispatch before
/// any target is created.
pub fn validate_template(template: &Template) -> Result<(), TemplateError> {
    let address = template.contract_address();
    if address.parse::<Address>().is_err() {
        return Err(TemplateError::InvalidContractAddress {
            address: address.to_string(),
        });
    }

    match template {
        Template::Abi {
            interface,
            function_name,
            args,
            value,
            ..
        } => {
            if function_name.is_empty() {
                return Err(TemplateError::EmptyFunctionName);
            }
            let abi = parse_interface(interface).map_err(|e| TemplateError::InvalidInterface {
                message: e.to_string(),
            })?;
            if abi.function(function_name).map(Vec::as_slice).unwrap_or_default().is_empty() {
                return Err(TemplateError::FunctionNotInInterface {
                    name: function_name.clone(),
                });
            }
            for (i, arg) in args.iter().enumerate() {
                validate_value(arg, &format!("args[{i}]"))?;
            }
            validate_value(value, "value")
        }
        Template::Raw { data, value, .. } => {
            validate_value(value, "value")?;
            validate_raw_data(data)
        }
    }
}

/// Collects every token address the template's placeholders reference, so a
/// caller can fetch exactly those balances before resolving. Deduplicated,
/// first-seen order.
pub fn required_tokens(template: &Template) -> Result<Vec<Address>, TemplateError> {
    let mut tokens = Vec::new();
    match template {
        Template::Abi { args, value, .. } => {
            for (i, arg) in args.iter().enumerate() {
                collect_value_tokens(arg, &format!("args[{i}]"), &mut tokens)?;
            }
            collect_value_tokens(value, "value", &mut tokens)?;
        }
        Template::Raw { data, value, .. } => {
            collect_string_tokens(data, "data", &mut tokens)?;
            collect_value_tokens(value, "value", &mut tokens)?;
        }
    }
    Ok(tokens)
}

fn collect_value_tokens(value: &Value, path: &str, tokens: &mut Vec<Address>) -> Result<(), TemplateError> {
    match value {
        Value::String(s) => collect_string_tokens(s, path, tokens),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_value_tokens(item, &format!("{path}[{i}]"), tokens)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for (key, item) in map {
                collect_value_tokens(item, &format!("{path}.{key}"), tokens)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn collect_string_tokens(s: &str, path: &str, tokens: &mut Vec<Address>) -> Result<(), TemplateError> {
    let spans = find_placeholders(s).map_err(|source| TemplateError::Placeholder {
        path: path.to_string(),
        source,
    })?;
    for span in spans {
        let placeholder = Placeholder::parse(span.body).map_err(|source| TemplateError::Placeholder {
            path: path.to_string(),
            source,
        })?;
        let token = match placeholder {
            Placeholder::TokenBalance(addr) => Some(addr),
            Placeholder::Percentage {
                source: PercentageSource::Token(addr),
                ..
            } => Some(addr),
            _ => None,
        };
        if let Some(addr) = token
            && !tokens.contains(&addr)
        {
            tokens.push(addr);
        }
    }
    Ok(())
}

fn validate_value(value: &Value, path: &str) -> Result<(), TemplateError> {
    match value {
        Value::String(s) => validate_string(s, path),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                validate_value(item, &format!("{path}[{i}]"))?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for (key, item) in map {
                validate_value(item, &format!("{path}.{key}"))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn validate_string(s: &str, path: &str) -> Result<(), TemplateError> {
    let spans = find_placeholders(s).map_err(|source| TemplateError::Placeholder {
        path: path.to_string(),
        source,
    })?;
    for span in spans {
        Placeholder::parse(span.body).map_err(|source| TemplateError::Placeholder {
            path: path.to_string(),
            source,
        })?;
    }
    Ok(())
}

/// Raw-mode `data` must be well-formed hex once placeholders are stripped
/// out. Placeholder-resolved values vary in length, so only the literal
/// characters are checked here.
fn validate_raw_data(data: &str) -> Result<(), TemplateError> {
    validate_string(data, "data")?;

    let spans = find_placeholders(data).map_err(|source| TemplateError::Placeholder {
        path: "data".to_string(),
        source,
    })?;
    let mut literal = String::with_capacity(data.len());
    let mut cursor = 0;
    for span in spans {
        literal.push_str(&data[cursor..span.start]);
        cursor = span.end;
    }
    literal.push_str(&data[cursor..]);

    let stripped = literal.strip_prefix("0x").unwrap_or(&literal);
    if let Some(bad) = stripped.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(TemplateError::InvalidDataHex {
            message: format!("unexpected character {bad:?}"),
        });
    }
    Ok(())
}
