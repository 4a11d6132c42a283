use alloy::dyn_abi::{DynSolType, DynSolValue, JsonAbiExt};
use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, Bytes, U256};
use serde_json::Value;

use crate::error::EncodeError;
use crate::template::{ResolvedCall, Template};

/// Accepts either a JSON ABI document or an array of human-readable
/// signature strings ("function transfer(address,uint256) ...").
pub fn parse_interface(interface: &Value) -> Result<JsonAbi, EncodeError> {
    if let Value::Array(items) = interface
        && items.iter().all(|i| i.is_string())
    {
        let signatures: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
        return JsonAbi::parse(signatures).map_err(|e| EncodeError::InterfaceParse { message: e.to_string() });
    }
    serde_json::from_value::<JsonAbi>(interface.clone()).map_err(|e| EncodeError::InterfaceParse {
        message: e.to_string(),
    })
}

/// Turns an already-resolved template into the final `{to, data, value}`
/// triple. Any placeholder left unresolved fails coercion here rather than
/// slipping through.
pub fn encode_call(template: &Template) -> Result<ResolvedCall, EncodeError> {
    let to: Address = template
        .contract_address()
        .parse()
        .map_err(|_| EncodeError::InvalidAddress {
            address: template.contract_address().to_string(),
        })?;

    match template {
        Template::Abi {
            interface,
            function_name,
            args,
            value,
            ..
        } => {
            let abi = parse_interface(interface)?;
            let overloads = abi.function(function_name).ok_or_else(|| EncodeError::UnknownFunction {
                name: function_name.clone(),
            })?;
            let func = overloads
                .iter()
                .find(|f| f.inputs.len() == args.len())
                .ok_or_else(|| EncodeError::ArgCountMismatch {
                    name: function_name.clone(),
                    expected: overloads.first().map(|f| f.inputs.len()).unwrap_or_default(),
                    got: args.len(),
                })?;

            let mut values = Vec::with_capacity(args.len());
            for (index, (param, arg)) in func.inputs.iter().zip(args).enumerate() {
                let ty_str = param.selector_type().to_string();
                let ty: DynSolType = ty_str.parse().map_err(|e: alloy::dyn_abi::Error| EncodeError::ArgCoercion {
                    index,
                    ty: ty_str.clone(),
                    message: e.to_string(),
                })?;
                let value = json_to_sol(&ty, arg).map_err(|message| EncodeError::ArgCoercion {
                    index,
                    ty: ty_str,
                    message,
                })?;
                values.push(value);
            }

            let data = func
                .abi_encode_input(&values)
                .map_err(|e| EncodeError::Abi { message: e.to_string() })?;

            Ok(ResolvedCall {
                to,
                data: Bytes::from(data),
                value: coerce_amount(value)?,
            })
        }
        Template::Raw { data, value, .. } => {
            let raw = data.strip_prefix("0x").unwrap_or(data);
            let decoded = alloy::hex::decode(raw).map_err(|e| EncodeError::DataHex { message: e.to_string() })?;
            Ok(ResolvedCall {
                to,
                data: Bytes::from(decoded),
                value: coerce_amount(value)?,
            })
        }
    }
}

/// Coerces a resolved JSON value into a U256 amount. Null counts as zero.
fn coerce_amount(value: &Value) -> Result<U256, EncodeError> {
    match value {
        Value::Null => Ok(U256::ZERO),
        Value::String(s) => s.trim().parse::<U256>().map_err(|e| EncodeError::InvalidValue {
            value: s.clone(),
            message: e.to_string(),
        }),
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| EncodeError::InvalidValue {
                value: n.to_string(),
                message: "not an unsigned integer".to_string(),
            }),
        other => Err(EncodeError::InvalidValue {
            value: other.to_string(),
            message: "expected a string, number or null".to_string(),
        }),
    }
}

/// Coerces one resolved JSON value into the function's parameter type.
/// Scalars go through the string coercion path; compound JSON values are
/// walked against compound ABI types.
fn json_to_sol(ty: &DynSolType, value: &Value) -> Result<DynSolValue, String> {
    match value {
        Value::String(s) => ty.coerce_str(s).map_err(|e| e.to_string()),
        Value::Number(n) => ty.coerce_str(&n.to_string()).map_err(|e| e.to_string()),
        Value::Bool(b) => ty.coerce_str(if *b { "true" } else { "false" }).map_err(|e| e.to_string()),
        Value::Array(items) => match ty {
            DynSolType::Array(inner) => Ok(DynSolValue::Array(
                items.iter().map(|i| json_to_sol(inner, i)).collect::<Result<_, _>>()?,
            )),
            DynSolType::FixedArray(inner, len) => {
                if items.len() != *len {
                    return Err(format!("fixed array expects {len} elements, got {}", items.len()));
                }
                Ok(DynSolValue::FixedArray(
                    items.iter().map(|i| json_to_sol(inner, i)).collect::<Result<_, _>>()?,
                ))
            }
            DynSolType::Tuple(types) => {
                if items.len() != types.len() {
                    return Err(format!("tuple expects {} elements, got {}", types.len(), items.len()));
                }
                Ok(DynSolValue::Tuple(
                    types
                        .iter()
                        .zip(items)
                        .map(|(t, i)| json_to_sol(t, i))
                        .collect::<Result<_, _>>()?,
                ))
            }
            other => Err(format!("cannot coerce a JSON array into {other:?}")),
        },
        other => Err(format!("cannot coerce {other} into {ty:?}")),
    }
}
