use alloy::primitives::U256;
use serde_json::Value;

use crate::error::ResolveError;
use crate::math::{apply_slippage, percentage_of};
use crate::template::placeholder::{PercentageSource, Placeholder, find_placeholders, whole_placeholder};
use crate::template::{Template, WalletContext};

/// Resolution policy knobs. `fail_on_zero_amount` decides whether a
/// `percentage` over an empty balance fails the member's target or resolves
/// to a literal zero amount.
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub fail_on_zero_amount: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            fail_on_zero_amount: true,
        }
    }
}

/// Substitutes every placeholder in the template against one wallet's
/// context. Pure: same template + same context always yields the same
/// output. The contract address is never a placeholder and passes through
/// untouched.
pub fn resolve_template(
    template: &Template,
    ctx: &WalletContext,
    opts: &ResolveOptions,
) -> Result<Template, ResolveError> {
    match template {
        Template::Abi {
            contract_address,
            interface,
            function_name,
            args,
            value,
        } => {
            let resolved_args = args
                .iter()
                .enumerate()
                .map(|(i, arg)| resolve_value(arg, ctx, opts, &format!("args[{i}]")))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Template::Abi {
                contract_address: contract_address.clone(),
                interface: interface.clone(),
                function_name: function_name.clone(),
                args: resolved_args,
                value: resolve_value(value, ctx, opts, "value")?,
            })
        }
        Template::Raw {
            contract_address,
            data,
            value,
        } => Ok(Template::Raw {
            contract_address: contract_address.clone(),
            data: substitute_string(data, ctx, opts, "data")?,
            value: resolve_value(value, ctx, opts, "value")?,
        }),
    }
}

/// Recursive walk over an arbitrary JSON value. Scalars that are exactly one
/// placeholder are replaced whole; strings that merely contain placeholders
/// get substring substitution; objects and arrays are walked member-wise.
pub fn resolve_value(
    value: &Value,
    ctx: &WalletContext,
    opts: &ResolveOptions,
    path: &str,
) -> Result<Value, ResolveError> {
    match value {
        Value::String(s) => {
            if let Some(body) = whole_placeholder(s) {
                let placeholder = parse_at(body, path)?;
                return Ok(Value::String(eval(&placeholder, ctx, opts, path, Render::Whole)?));
            }
            Ok(Value::String(substitute_string(s, ctx, opts, path)?))
        }
        Value::Array(items) => {
            let resolved = items
                .iter()
                .enumerate()
                .map(|(i, item)| resolve_value(item, ctx, opts, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(resolved))
        }
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), resolve_value(item, ctx, opts, &format!("{path}.{key}"))?);
            }
            Ok(Value::Object(resolved))
        }
        // Numbers, booleans and null carry no placeholders.
        other => Ok(other.clone()),
    }
}

/// How a placeholder's replacement is rendered. A value standing alone keeps
/// its natural form; a value spliced into surrounding text (raw-mode call
/// data) must read as bare hex digits, so the wallet address drops its `0x`
/// prefix there.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Render {
    Whole,
    Spliced,
}

/// In-place substring substitution for strings that embed placeholders
/// (raw-mode call data).
fn substitute_string(
    s: &str,
    ctx: &WalletContext,
    opts: &ResolveOptions,
    path: &str,
) -> Result<String, ResolveError> {
    let spans = find_placeholders(s).map_err(|source| ResolveError::Placeholder {
        path: path.to_string(),
        source,
    })?;
    if spans.is_empty() {
        return Ok(s.to_string());
    }

    let mut out = String::with_capacity(s.len());
    let mut cursor = 0;
    for span in spans {
        out.push_str(&s[cursor..span.start]);
        let placeholder = parse_at(span.body, path)?;
        out.push_str(&eval(&placeholder, ctx, opts, path, Render::Spliced)?);
        cursor = span.end;
    }
    out.push_str(&s[cursor..]);
    Ok(out)
}

fn parse_at(body: &str, path: &str) -> Result<Placeholder, ResolveError> {
    Placeholder::parse(body).map_err(|source| ResolveError::Placeholder {
        path: path.to_string(),
        source,
    })
}

fn eval(
    placeholder: &Placeholder,
    ctx: &WalletContext,
    opts: &ResolveOptions,
    path: &str,
    render: Render,
) -> Result<String, ResolveError> {
    match placeholder {
        Placeholder::WalletAddress => Ok(match render {
            Render::Whole => format!("{:#x}", ctx.wallet_address),
            Render::Spliced => format!("{:x}", ctx.wallet_address),
        }),
        Placeholder::EthBalance => Ok(ctx.native_balance.to_string()),
        Placeholder::BlockTimestamp => Ok(ctx.block_timestamp.to_string()),
        Placeholder::TokenBalance(token) => Ok(token_balance(ctx, *token, path)?.to_string()),
        Placeholder::Deadline(secs) => {
            let deadline = ctx
                .block_timestamp
                .checked_add(*secs)
                .ok_or_else(|| ResolveError::Overflow {
                    path: path.to_string(),
                    message: format!("deadline {} + {} exceeds u64", ctx.block_timestamp, secs),
                })?;
            Ok(deadline.to_string())
        }
        Placeholder::Percentage { source, pct } => {
            let (balance, desc) = match source {
                PercentageSource::Native => (ctx.native_balance, "ethBalance".to_string()),
                PercentageSource::Token(token) => {
                    (token_balance(ctx, *token, path)?, format!("tokenBalance:{token:#x}"))
                }
            };
            if balance.is_zero() && opts.fail_on_zero_amount {
                return Err(ResolveError::ZeroBalance { source_desc: desc });
            }
            let amount = percentage_of(balance, *pct).ok_or_else(|| ResolveError::Overflow {
                path: path.to_string(),
                message: format!("percentage:{desc}:{pct} overflows"),
            })?;
            Ok(amount.to_string())
        }
        Placeholder::Slippage { amount, pct } => {
            let adjusted = apply_slippage(*amount, *pct).ok_or_else(|| ResolveError::Overflow {
                path: path.to_string(),
                message: format!("slippage:{amount}:{pct} overflows"),
            })?;
            Ok(adjusted.to_string())
        }
    }
}

fn token_balance(ctx: &WalletContext, token: alloy::primitives::Address, path: &str) -> Result<U256, ResolveError> {
    ctx.token_balances
        .get(&token)
        .copied()
        .ok_or_else(|| ResolveError::MissingTokenBalance {
            token,
            path: path.to_string(),
        })
}
