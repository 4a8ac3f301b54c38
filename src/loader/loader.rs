use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;

use crate::instructions::instructions::{get_opcode, IssueRequest, MemoryType, Opcode, RegisterType, WordType, REG_COUNT};

/// One issue command as written in a program file. Everything is kept loose
/// here and checked by [`parse_request`].
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct RawInstr {
    pub op: String,
    pub dest: Option<String>,
    pub src1: Option<String>,
    pub src2: Option<String>,
    pub address: Option<Value>,
    pub immediate: Option<Value>,
}

#[derive(Debug)]
pub enum LoadError {
    ParseError(String),
    AnalysisError(Vec<String>),
    NotFoundError(String),
    IOError(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::ParseError(msg) => write!(f, "{}", msg),
            LoadError::AnalysisError(msgs) => write!(f, "{}", msgs.join("\n")),
            LoadError::NotFoundError(msg) => write!(f, "{}", msg),
            LoadError::IOError(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for LoadError {}

fn register_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?i)R(\d+)$").expect("register pattern is valid"))
}

pub fn get_register(name: &str) -> Option<RegisterType> {
    let captures = register_regex().captures(name.trim())?;
    let reg: u32 = captures[1].parse().ok()?;

    if reg >= REG_COUNT as u32 {
        return None;
    }
    Some(reg as RegisterType)
}

fn parse_register(field: &str, name: &Option<String>) -> Result<Option<RegisterType>, String> {
    match name {
        None => Ok(None),
        Some(name) if name.trim().is_empty() => Ok(None),
        Some(name) => match get_register(name) {
            Some(reg) => Ok(Some(reg)),
            None => Err(format!("{} '{}' is not a register (R0-R{})", field, name, REG_COUNT - 1)),
        },
    }
}

fn parse_address(value: &Option<Value>) -> Result<Option<MemoryType>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| format!("memory address {} is not a non-negative integer", n)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<MemoryType>()
            .map(Some)
            .map_err(|_| format!("memory address '{}' is not numeric", s)),
        Some(other) => Err(format!("memory address {:?} is not numeric", other)),
    }
}

fn parse_immediate(value: &Option<Value>) -> Result<Option<WordType>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("immediate {} is not an integer", n)),
        Some(Value::String(s)) => s
            .trim()
            .trim_start_matches('#')
            .parse::<WordType>()
            .map(Some)
            .map_err(|_| format!("immediate '{}' is not numeric", s)),
        Some(other) => Err(format!("immediate {:?} is not numeric", other)),
    }
}

/// Turns a raw command into an [`IssueRequest`], rejecting unknown opcodes,
/// unknown register names and non-numeric addresses or immediates.
pub fn parse_request(raw: &RawInstr) -> Result<IssueRequest, String> {
    let opcode = get_opcode(&raw.op).ok_or_else(|| format!("unknown operation '{}'", raw.op))?;

    let request = IssueRequest {
        opcode,
        dest: parse_register("dest", &raw.dest)?,
        src1: parse_register("src1", &raw.src1)?,
        src2: match opcode {
            Opcode::LOAD | Opcode::STORE => None,
            _ => parse_register("src2", &raw.src2)?,
        },
        address: parse_address(&raw.address)?,
        immediate: parse_immediate(&raw.immediate)?,
    };

    Ok(request)
}

pub fn load_from_string(src: &str) -> Result<Vec<IssueRequest>, LoadError> {
    let raw_instrs: Vec<RawInstr> = serde_yaml::from_str(src)
        .map_err(|err| LoadError::ParseError(format!("Parsing error: {}", err)))?;

    let mut requests = Vec::with_capacity(raw_instrs.len());
    let mut errors = Vec::new();
    for (index, raw) in raw_instrs.iter().enumerate() {
        match parse_request(raw) {
            Ok(request) => requests.push(request),
            Err(msg) => errors.push(format!("instruction {}: {}", index, msg)),
        }
    }

    if !errors.is_empty() {
        return Err(LoadError::AnalysisError(errors));
    }

    Ok(requests)
}

pub fn load(path: &str) -> Result<Vec<IssueRequest>, LoadError> {
    if !Path::new(path).exists() {
        return Err(LoadError::NotFoundError(format!("File '{}' does not exist.", path)));
    }

    let src = fs::read_to_string(path)
        .map_err(|err| LoadError::IOError(format!("Error reading file '{}': {}", path, err)))?;

    load_from_string(&src)
}
