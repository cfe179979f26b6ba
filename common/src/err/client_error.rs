use std::fmt::Display;
use std::str::Utf8Error;
use std::string::FromUtf8Error;
use std::{fmt, io};

use thiserror::Error;

/// 客户端统一异常定义
#[derive(Debug)]
pub enum ClientError {
    //////////////////////
    // Builder / 配置
    //////////////////////
    /// 互斥的认证方式被同时配置
    ExclusiveAuth(String),
    /// 配置文件中出现无法识别的配置项
    UnknownOption(String),

    //////////////////////
    // Schema
    //////////////////////
    /// 类型串无法解析
    SchemaParseError(String),
    /// 服务端返回了未知的列类型名
    UnknownType(String),
    /// Nullable 包裹了不允许的内部类型
    IllegalNullable(String),
    UnknownColumn(String),

    //////////////////////
    // 编解码
    //////////////////////
    Encode(EncodeFault),
    Decode(DecodeFault),
    Value(ValueFault),

    //////////////////////
    // 传输
    //////////////////////
    /// 等待连接池空闲连接超时
    ConnectionRequestTimeout(String),
    SocketTimeout(String),
    /// 服务端未返回任何字节
    NoResponse(String),
    ConnectionReset(String),
    ConnectionError(String),

    /// server 返回的异常。code 取自 X-ClickHouse-Exception-Code 或 body 前缀
    Server { code: i32, message: String },
    /// 认证失败, code 516
    Auth { code: i32, message: String },

    //////////////////////
    // IO
    //////////////////////
    IoError(io::Error),
    Utf8Error(Utf8Error),
    FromUtf8Error(FromUtf8Error),
    String(String),
}

impl Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> fmt::Result {
        match self {
            ClientError::ExclusiveAuth(s)
            | ClientError::UnknownOption(s)
            | ClientError::SchemaParseError(s)
            | ClientError::UnknownType(s)
            | ClientError::IllegalNullable(s)
            | ClientError::UnknownColumn(s)
            | ClientError::ConnectionRequestTimeout(s)
            | ClientError::SocketTimeout(s)
            | ClientError::NoResponse(s)
            | ClientError::ConnectionReset(s)
            | ClientError::ConnectionError(s)
            | ClientError::String(s) => {
                write!(f, "{}", s)
            }
            ClientError::Encode(fault) => {
                write!(f, "{}", fault)
            }
            ClientError::Decode(fault) => {
                write!(f, "{}", fault)
            }
            ClientError::Value(fault) => {
                write!(f, "{}", fault)
            }
            ClientError::Server { code, message } | ClientError::Auth { code, message } => {
                write!(f, "Code: {}. {}", code, message)
            }
            ClientError::IoError(err) => {
                write!(f, "{}", err)
            }
            ClientError::Utf8Error(err) => {
                write!(f, "{}", err)
            }
            ClientError::FromUtf8Error(err) => {
                write!(f, "{}", err)
            }
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(error: io::Error) -> Self {
        ClientError::IoError(error)
    }
}

impl From<Utf8Error> for ClientError {
    fn from(error: Utf8Error) -> Self {
        ClientError::Utf8Error(error)
    }
}

impl From<FromUtf8Error> for ClientError {
    fn from(error: FromUtf8Error) -> Self {
        ClientError::FromUtf8Error(error)
    }
}

impl From<EncodeFault> for ClientError {
    fn from(fault: EncodeFault) -> Self {
        ClientError::Encode(fault)
    }
}

impl From<DecodeFault> for ClientError {
    fn from(fault: DecodeFault) -> Self {
        ClientError::Decode(fault)
    }
}

impl From<ValueFault> for ClientError {
    fn from(fault: ValueFault) -> Self {
        ClientError::Value(fault)
    }
}

impl ClientError {
    pub fn is_server_error(&self) -> bool {
        matches!(self, ClientError::Server { .. } | ClientError::Auth { .. })
    }

    pub fn server_code(&self) -> Option<i32> {
        match self {
            ClientError::Server { code, .. } | ClientError::Auth { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// 编码过程的异常
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeFault {
    #[error("unexpected null for non-nullable column {0}")]
    UnexpectedNull(String),

    #[error("fixed string overflow on column {column}: {len} bytes > FixedString({fixed})")]
    FixedStringOverflow {
        column: String,
        len: usize,
        fixed: usize,
    },

    #[error("column {0} has no value and no server default")]
    MissingRequired(String),

    #[error("value {value} is not a declared member of enum column {column}")]
    EnumValueOutOfRange { column: String, value: i64 },

    #[error("column {column} can not encode {got}")]
    TypeMismatch { column: String, got: String },
}

/// 解码过程的异常
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFault {
    /// Byte stream is incomplete
    #[error("truncated stream")]
    Truncated,

    #[error("unexpected tag byte {0:#04x}")]
    UnexpectedTag(u8),

    #[error("invalid utf8 in string field")]
    InvalidUtf8,

    #[error("{0}")]
    InvalidData(String),
}

/// Value 访问转换的异常
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueFault {
    #[error("value is null")]
    Null,

    #[error("numeric overflow: {0}")]
    Overflow(String),

    #[error("type mismatch: expected {expect}, value holds {got}")]
    TypeMismatch {
        expect: &'static str,
        got: &'static str,
    },
}
