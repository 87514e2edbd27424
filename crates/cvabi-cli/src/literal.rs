use anyhow::{Context, Result};
use cvabi_descriptor::FieldId;
use serde::Deserialize;

/// An integer written either as a JSON number or as a string
/// (`"0x8203"`, `"42"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IntLiteral {
    Num(u64),
    Text(String),
}

impl IntLiteral {
    pub fn value(&self) -> Result<u64> {
        match self {
            IntLiteral::Num(n) => Ok(*n),
            IntLiteral::Text(s) => parse_u64(s),
        }
    }

    pub fn field_id(&self) -> Result<FieldId> {
        let v = self.value()?;
        let id = u16::try_from(v).with_context(|| format!("field id out of range: {v:#x}"))?;
        Ok(FieldId(id))
    }
}

pub fn parse_u64(s: &str) -> Result<u64> {
    let t = s.trim();
    let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => t.replace('_', "").parse::<u64>(),
    };
    parsed.with_context(|| format!("invalid integer literal: {s:?}"))
}

pub fn parse_field_id(s: &str) -> Result<FieldId> {
    IntLiteral::Text(s.to_string()).field_id()
}
