use alloy::primitives::{Address, U256};

use crate::error::PlaceholderError;

/// Balance source for a `percentage` placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PercentageSource {
    Native,
    Token(Address),
}

/// The closed set of recognized placeholder kinds. Unknown names and wrong
/// arities are rejected at parse time; there is no string dispatch past this
/// point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    WalletAddress,
    EthBalance,
    TokenBalance(Address),
    BlockTimestamp,
    Deadline(u64),
    Percentage { source: PercentageSource, pct: u32 },
    Slippage { amount: U256, pct: u32 },
}

/// One `{{...}}` occurrence inside a larger string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderSpan<'a> {
    /// Byte offset of the opening `{{`.
    pub start: usize,
    /// Byte offset one past the closing `}}`.
    pub end: usize,
    pub body: &'a str,
}

/// Returns the body if the whole string is exactly one placeholder.
pub fn whole_placeholder(s: &str) -> Option<&str> {
    if s.len() < 4 || !s.starts_with("{{") || !s.ends_with("}}") {
        return None;
    }
    let body = &s[2..s.len() - 2];
    if body.contains("{{") || body.contains("}}") {
        return None;
    }
    Some(body)
}

/// Scans a string for embedded `{{...}}` occurrences. An opening `{{`
/// without a closing `}}` is an error, not a silent literal.
pub fn find_placeholders(s: &str) -> Result<Vec<PlaceholderSpan<'_>>, PlaceholderError> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    while let Some(rel) = s[cursor..].find("{{") {
        let start = cursor + rel;
        let body_start = start + 2;
        let Some(close_rel) = s[body_start..].find("}}") else {
            return Err(PlaceholderError::Unterminated { offset: start });
        };
        let body_end = body_start + close_rel;
        spans.push(PlaceholderSpan {
            start,
            end: body_end + 2,
            body: &s[body_start..body_end],
        });
        cursor = body_end + 2;
    }
    Ok(spans)
}

impl Placeholder {
    /// Parses one placeholder body (the text between `{{` and `}}`).
    /// Segment 0 is the name; the rest are positional literal arguments,
    /// never nested placeholders.
    pub fn parse(body: &str) -> Result<Self, PlaceholderError> {
        let segments: Vec<&str> = body.split(':').collect();
        let name = segments[0];
        let args = &segments[1..];

        match name {
            "walletAddress" => {
                expect_arity("walletAddress", args, 0)?;
                Ok(Placeholder::WalletAddress)
            }
            "ethBalance" => {
                expect_arity("ethBalance", args, 0)?;
                Ok(Placeholder::EthBalance)
            }
            "blockTimestamp" => {
                expect_arity("blockTimestamp", args, 0)?;
                Ok(Placeholder::BlockTimestamp)
            }
            "tokenBalance" => {
                expect_arity("tokenBalance", args, 1)?;
                Ok(Placeholder::TokenBalance(parse_address("tokenBalance", args[0])?))
            }
            "deadline" => {
                expect_arity("deadline", args, 1)?;
                let secs = args[0].parse::<u64>().map_err(|e| PlaceholderError::InvalidArgument {
                    name: "deadline",
                    arg: args[0].to_string(),
                    message: e.to_string(),
                })?;
                Ok(Placeholder::Deadline(secs))
            }
            "percentage" => match args {
                ["ethBalance", pct] => Ok(Placeholder::Percentage {
                    source: PercentageSource::Native,
                    pct: parse_pct("percentage", pct)?,
                }),
                ["tokenBalance", token, pct] => Ok(Placeholder::Percentage {
                    source: PercentageSource::Token(parse_address("percentage", token)?),
                    pct: parse_pct("percentage", pct)?,
                }),
                _ => Err(PlaceholderError::WrongArity {
                    name: "percentage",
                    expected: 2,
                    got: args.len(),
                }),
            },
            "slippage" => {
                expect_arity("slippage", args, 2)?;
                let amount = args[0].parse::<U256>().map_err(|e| PlaceholderError::InvalidArgument {
                    name: "slippage",
                    arg: args[0].to_string(),
                    message: e.to_string(),
                })?;
                let pct = parse_pct("slippage", args[1])?;
                if pct > 100 {
                    return Err(PlaceholderError::InvalidArgument {
                        name: "slippage",
                        arg: args[1].to_string(),
                        message: "slippage percent must be 0..=100".to_string(),
                    });
                }
                Ok(Placeholder::Slippage { amount, pct })
            }
            other => Err(PlaceholderError::UnknownName { name: other.to_string() }),
        }
    }
}

fn expect_arity(name: &'static str, args: &[&str], expected: usize) -> Result<(), PlaceholderError> {
    if args.len() != expected {
        return Err(PlaceholderError::WrongArity {
            name,
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn parse_address(name: &'static str, arg: &str) -> Result<Address, PlaceholderError> {
    arg.parse::<Address>().map_err(|e| PlaceholderError::InvalidArgument {
        name,
        arg: arg.to_string(),
        message: e.to_string(),
    })
}

fn parse_pct(name: &'static str, arg: &str) -> Result<u32, PlaceholderError> {
    arg.parse::<u32>().map_err(|e| PlaceholderError::InvalidArgument {
        name,
        arg: arg.to_string(),
        message: e.to_string(),
    })
}
